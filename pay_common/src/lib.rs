//! Shared money types and helpers used across the reconciliation workspace.
//!
//! * [`Rial`] is the store currency, always held in its minor unit. [`Rial::to_toman`] and [`Rial::from_toman`]
//!   convert to and from the display unit.
//! * [`MicroUnits`] holds amounts of the crypto settlement asset with six decimal places.
pub mod helpers;
mod micro_units;
pub mod op;
mod rial;
mod secret;

pub use micro_units::{MicroUnits, MICRO_UNITS_PER_UNIT};
pub use rial::{AmountParseError, Rial, RIALS_PER_TOMAN, RIAL_CURRENCY_CODE};
pub use secret::Secret;
