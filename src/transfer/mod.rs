//! Transfer engine
//!
//! Passive-mode data connections, single-file streaming, the tree walker and
//! the orchestrator that runs transfers on background workers with progress
//! events and cancellation.

pub mod data_channel;
pub mod file_ops;
pub mod orchestrator;
pub mod paths;
pub mod progress;
pub mod results;
pub mod walker;

// Re-export key types and functions
pub use file_ops::{download_path, receive_file, send_file, upload_path};
pub use orchestrator::{TransferHandle, TransferOrchestrator, transfer_file, transfer_tree};
pub use paths::{join_remote, normalize_remote};
pub use progress::{CancelHandle, TransferEvent, TransferProgress};
pub use results::{Direction, ItemOutcome, ItemStatus, Outcome, TransferResult, TransferTask};
pub use walker::{DEFAULT_MAX_DEPTH, WalkOptions, list_local};
