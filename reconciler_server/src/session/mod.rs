//! Banking-portal session lifecycle for the statement reconciler.
mod session_manager;

pub use session_manager::{login_delays, session_is_valid, to_portal_session, SessionManager, BANK_PORTAL_CHANNEL};
