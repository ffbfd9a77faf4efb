pub mod settlement_api;
pub mod tolerance;
