//! Error handlers
//!
//! Maps errors onto outcome categories and log output.

use crate::error::types::{CommandError, TransferError, WalkError};
use log::{error, warn};

/// Log a per-item walk failure. Fatal ones are logged at error level.
pub fn log_walk_error(path: &str, err: &WalkError) {
    if err.is_fatal() {
        error!("Transfer aborted at {}: {}", path, err);
    } else {
        warn!("Item failed {}: {}", path, err);
    }
}

/// Reply code carried by an error, if the server produced one.
pub fn reply_code(err: &WalkError) -> Option<u16> {
    match err {
        WalkError::Transfer(TransferError::RemoteRejected { code, .. }) => Some(*code),
        WalkError::Transfer(TransferError::Control(CommandError::RemoteRejected {
            code, ..
        })) => Some(*code),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_reply_code_extraction() {
        let err = WalkError::Transfer(TransferError::RemoteRejected {
            code: 550,
            message: "nope".into(),
        });
        assert_eq!(reply_code(&err), Some(550));
        assert_eq!(reply_code(&WalkError::DepthExceeded(3)), None);
    }

    #[test]
    fn test_control_loss_is_fatal() {
        let lost = WalkError::Transfer(TransferError::Control(CommandError::Io(
            io::Error::new(io::ErrorKind::BrokenPipe, "gone"),
        )));
        assert!(lost.is_fatal());

        let rejected: TransferError = CommandError::RemoteRejected {
            code: 553,
            message: "bad name".into(),
        }
        .into();
        assert!(!WalkError::Transfer(rejected).is_fatal());
    }
}
