//! Client session
//!
//! Owns the control connection: connect, login, encoding negotiation and
//! raw command issuance.

pub mod control;
pub mod session;

pub use session::{ConnectionState, Credentials, DirStatus, Session, SharedSession, WelcomeMessage};
