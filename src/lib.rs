//! ftp-mirror
//!
//! Mirrors directory trees between a local filesystem and an FTP server,
//! with progress events, cancellation and partial-failure reporting. The
//! crate also carries the small FTP server the `ftp-mirror-server` binary
//! runs.

pub mod client;
pub mod config;
pub mod error;
pub mod listing;
pub mod protocol;
pub mod server;
pub mod transfer;

pub use client::{Session, SharedSession};
pub use server::Server;
pub use transfer::{TransferOrchestrator, TransferTask};
