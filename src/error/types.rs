//! Error types
//!
//! One enum per layer of the engine: control connection setup, login,
//! command issuance, single-file transfers and per-item walk failures.

use std::fmt;
use std::io;

/// Failure to establish the control connection.
#[derive(Debug)]
pub enum ConnectError {
    Timeout(String),
    Unreachable(io::Error),
    Greeting { code: u16, message: String },
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::Timeout(addr) => write!(f, "Timed out connecting to {}", addr),
            ConnectError::Unreachable(e) => write!(f, "Server unreachable: {}", e),
            ConnectError::Greeting { code, message } => {
                write!(f, "Server refused session: {} {}", code, message)
            }
        }
    }
}

impl std::error::Error for ConnectError {}

/// Failure during the USER/PASS exchange.
#[derive(Debug)]
pub enum AuthError {
    NotConnected,
    Rejected { code: u16, message: String },
    ProtocolError(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::NotConnected => write!(f, "Not connected"),
            AuthError::Rejected { code, message } => {
                write!(f, "Login rejected: {} {}", code, message)
            }
            AuthError::ProtocolError(msg) => write!(f, "Protocol error during login: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Failure of a single control-channel command.
#[derive(Debug)]
pub enum CommandError {
    NotConnected,
    RemoteRejected { code: u16, message: String },
    /// The control connection broke; the session is no longer usable.
    Io(io::Error),
}

impl CommandError {
    /// Whether this error left the session invalidated.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CommandError::NotConnected | CommandError::Io(_))
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::NotConnected => write!(f, "Session is not connected"),
            CommandError::RemoteRejected { code, message } => {
                write!(f, "Server rejected command: {} {}", code, message)
            }
            CommandError::Io(e) => write!(f, "Control connection lost: {}", e),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<io::Error> for CommandError {
    fn from(error: io::Error) -> Self {
        CommandError::Io(error)
    }
}

/// Failure while moving one file's bytes over a data connection.
#[derive(Debug)]
pub enum TransferError {
    /// Local read or write failed.
    Io(io::Error),
    ConnectionRefused(String),
    RemoteRejected { code: u16, message: String },
    Control(CommandError),
}

impl TransferError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransferError::Control(e) if e.is_fatal())
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Io(e) => write!(f, "Local I/O error: {}", e),
            TransferError::ConnectionRefused(msg) => {
                write!(f, "Data connection failed: {}", msg)
            }
            TransferError::RemoteRejected { code, message } => {
                write!(f, "Server rejected transfer: {} {}", code, message)
            }
            TransferError::Control(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TransferError {}

impl From<CommandError> for TransferError {
    fn from(error: CommandError) -> Self {
        match error {
            CommandError::RemoteRejected { code, message } => {
                TransferError::RemoteRejected { code, message }
            }
            other => TransferError::Control(other),
        }
    }
}

/// Per-item failure during a tree walk. Recorded, never propagated.
#[derive(Debug)]
pub enum WalkError {
    Transfer(TransferError),
    CreateDirectory { path: String, cause: String },
    ListDirectory { path: String, cause: String },
    DepthExceeded(usize),
    NotConnected,
}

impl WalkError {
    pub fn is_fatal(&self) -> bool {
        match self {
            WalkError::Transfer(e) => e.is_fatal(),
            WalkError::NotConnected => true,
            _ => false,
        }
    }
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkError::Transfer(e) => write!(f, "{}", e),
            WalkError::CreateDirectory { path, cause } => {
                write!(f, "Cannot create directory {}: {}", path, cause)
            }
            WalkError::ListDirectory { path, cause } => {
                write!(f, "Cannot list directory {}: {}", path, cause)
            }
            WalkError::DepthExceeded(max) => {
                write!(f, "Directory nesting deeper than {} levels", max)
            }
            WalkError::NotConnected => write!(f, "Session is not connected"),
        }
    }
}

impl std::error::Error for WalkError {}

impl From<TransferError> for WalkError {
    fn from(error: TransferError) -> Self {
        WalkError::Transfer(error)
    }
}

/// Non-fatal outcome of encoding negotiation.
#[derive(Debug)]
pub struct Warning(pub String);

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Warning: {}", self.0)
    }
}

impl std::error::Error for Warning {}

/// Server-side failures while serving a command.
#[derive(Debug)]
pub enum StorageError {
    NotFound(String),
    AlreadyExists(String),
    NotADirectory(String),
    PathTraversal(String),
    PermissionDenied(char),
    IoError(io::Error),
}

impl StorageError {
    /// Reply code sent to the client for this failure.
    pub fn ftp_code(&self) -> u16 {
        match self {
            StorageError::IoError(_) => 451,
            _ => 550,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(p) => write!(f, "No such file or directory: {}", p),
            StorageError::AlreadyExists(p) => write!(f, "Directory already exists: {}", p),
            StorageError::NotADirectory(p) => write!(f, "Not a directory: {}", p),
            StorageError::PathTraversal(p) => write!(f, "Path outside home directory: {}", p),
            StorageError::PermissionDenied(perm) => {
                write!(f, "Permission denied (requires '{}')", perm)
            }
            StorageError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(error.to_string()),
            _ => StorageError::IoError(error),
        }
    }
}

/// A spawned transfer task panicked or was cancelled by the runtime.
#[derive(Debug)]
pub struct TransferJoinError(pub String);

impl fmt::Display for TransferJoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transfer task did not complete: {}", self.0)
    }
}

impl std::error::Error for TransferJoinError {}

impl From<tokio::task::JoinError> for TransferJoinError {
    fn from(error: tokio::task::JoinError) -> Self {
        TransferJoinError(error.to_string())
    }
}
