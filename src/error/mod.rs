//! Error handling
//!
//! Defines the error taxonomy for the transfer engine and the server.

pub mod handlers;
pub mod types;

pub use types::*;
