//! Transfer tasks and result types
//!
//! A `TransferResult` is built item by item while a walk runs and is handed
//! out only once the walk has finished.

use std::fmt;
use std::path::PathBuf;

use crate::error::WalkError;
use crate::listing::EntryKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

/// One user-initiated transfer. For uploads the source is local and the
/// destination remote; downloads are the reverse.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferTask {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub direction: Direction,
    pub kind: EntryKind,
}

impl TransferTask {
    pub fn upload(local: impl Into<PathBuf>, remote: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            local_path: local.into(),
            remote_path: remote.into(),
            direction: Direction::Upload,
            kind,
        }
    }

    pub fn download(remote: impl Into<String>, local: impl Into<PathBuf>, kind: EntryKind) -> Self {
        Self {
            local_path: local.into(),
            remote_path: remote.into(),
            direction: Direction::Download,
            kind,
        }
    }

    pub fn source(&self) -> String {
        match self.direction {
            Direction::Upload => self.local_path.display().to_string(),
            Direction::Download => self.remote_path.clone(),
        }
    }

    pub fn destination(&self) -> String {
        match self.direction {
            Direction::Upload => self.remote_path.clone(),
            Direction::Download => self.local_path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Succeeded { bytes: u64 },
    Failed(String),
    /// Never started: the walk was cancelled or aborted first.
    Skipped,
}

/// What happened to one file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub source: String,
    pub destination: String,
    pub kind: EntryKind,
    pub status: ItemStatus,
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            ItemStatus::Succeeded { bytes } if self.kind == EntryKind::File => {
                write!(f, "ok      {} -> {} ({} bytes)", self.source, self.destination, bytes)
            }
            ItemStatus::Succeeded { .. } => {
                write!(f, "ok      {} -> {}", self.source, self.destination)
            }
            ItemStatus::Failed(cause) => write!(f, "failed  {}: {}", self.source, cause),
            ItemStatus::Skipped => write!(f, "skipped {}", self.source),
        }
    }
}

/// Overall classification of a finished transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    PartialFailure,
    Failed,
}

#[derive(Debug)]
pub struct TransferResult {
    pub task: TransferTask,
    pub bytes_transferred: u64,
    pub items_succeeded: usize,
    pub items_failed: usize,
    pub items_skipped: usize,
    pub errors: Vec<(String, WalkError)>,
    pub outcomes: Vec<ItemOutcome>,
    pub cancelled: bool,
    /// Set when the walk stopped because the session was lost.
    pub aborted: Option<WalkError>,
}

impl TransferResult {
    pub fn new(task: TransferTask) -> Self {
        Self {
            task,
            bytes_transferred: 0,
            items_succeeded: 0,
            items_failed: 0,
            items_skipped: 0,
            errors: Vec::new(),
            outcomes: Vec::new(),
            cancelled: false,
            aborted: None,
        }
    }

    /// Record a transferred file. Directory creations are kept in
    /// `outcomes` but do not count as succeeded items.
    pub(crate) fn record_success(&mut self, outcome: ItemOutcome) {
        if let ItemStatus::Succeeded { bytes } = outcome.status {
            if outcome.kind == EntryKind::File {
                self.items_succeeded += 1;
                self.bytes_transferred += bytes;
            }
        }
        self.outcomes.push(outcome);
    }

    pub(crate) fn record_failure(&mut self, outcome: ItemOutcome, error: WalkError) {
        self.items_failed += 1;
        self.errors.push((outcome.source.clone(), error));
        self.outcomes.push(outcome);
    }

    pub(crate) fn record_skipped(&mut self, outcome: ItemOutcome) {
        self.items_skipped += 1;
        self.outcomes.push(outcome);
    }

    pub fn outcome(&self) -> Outcome {
        if self.aborted.is_some() && self.items_succeeded == 0 {
            return Outcome::Failed;
        }
        match (self.items_succeeded, self.items_failed) {
            (_, 0) if self.aborted.is_none() => Outcome::Succeeded,
            (0, _) => Outcome::Failed,
            _ => Outcome::PartialFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, kind: EntryKind, status: ItemStatus) -> ItemOutcome {
        ItemOutcome {
            source: name.into(),
            destination: name.into(),
            kind,
            status,
        }
    }

    fn task() -> TransferTask {
        TransferTask::upload("src", "dst", EntryKind::Directory)
    }

    #[test]
    fn test_empty_walk_is_success() {
        let result = TransferResult::new(task());
        assert_eq!(result.outcome(), Outcome::Succeeded);
    }

    #[test]
    fn test_directory_success_not_counted() {
        let mut result = TransferResult::new(task());
        result.record_success(item("d", EntryKind::Directory, ItemStatus::Succeeded { bytes: 0 }));
        result.record_success(item("f", EntryKind::File, ItemStatus::Succeeded { bytes: 10 }));
        assert_eq!(result.items_succeeded, 1);
        assert_eq!(result.bytes_transferred, 10);
        assert_eq!(result.outcomes.len(), 2);
    }

    #[test]
    fn test_partial_and_full_failure() {
        let mut result = TransferResult::new(task());
        result.record_failure(
            item("a", EntryKind::File, ItemStatus::Failed("x".into())),
            WalkError::DepthExceeded(1),
        );
        assert_eq!(result.outcome(), Outcome::Failed);

        result.record_success(item("b", EntryKind::File, ItemStatus::Succeeded { bytes: 1 }));
        assert_eq!(result.outcome(), Outcome::PartialFailure);
        assert_eq!(result.errors[0].0, "a");
    }

    #[test]
    fn test_aborted_with_successes_is_partial() {
        let mut result = TransferResult::new(task());
        result.record_success(item("b", EntryKind::File, ItemStatus::Succeeded { bytes: 1 }));
        result.aborted = Some(WalkError::NotConnected);
        assert_eq!(result.outcome(), Outcome::PartialFailure);
    }

    #[test]
    fn test_skipped_does_not_fail() {
        let mut result = TransferResult::new(task());
        result.record_success(item("a", EntryKind::File, ItemStatus::Succeeded { bytes: 1 }));
        result.record_skipped(item("b", EntryKind::File, ItemStatus::Skipped));
        result.cancelled = true;
        assert_eq!(result.items_skipped, 1);
        assert_eq!(result.outcome(), Outcome::Succeeded);
    }
}
