//! Server core functionality
//!
//! A small async FTP server: per-user home directories, permission strings,
//! passive-mode data connections and the command subset the transfer engine
//! relies on.

pub mod accounts;
pub mod core;
pub mod handler;
pub mod listing;
pub mod storage;

pub use accounts::{AccountStore, Permissions, UserAccount};
pub use core::Server;
