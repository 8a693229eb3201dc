//! Module `walker`
//!
//! Mirrors a directory tree in either direction. The walk keeps an explicit
//! stack of frames instead of recursing, so nesting depth never grows the
//! async call stack and cancellation can sweep every queued entry at once.
//!
//! Per-item failures are recorded and the walk moves on to the next sibling.
//! Only a lost control connection stops the walk early.

use log::{debug, info, warn};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::client::{DirStatus, Session};
use crate::error::handlers::log_walk_error;
use crate::error::{CommandError, TransferError, WalkError};
use crate::listing::entry::is_acceptable_name;
use crate::listing::{EntryKind, ListingEntry};
use crate::transfer::file_ops;
use crate::transfer::paths::{join_remote, normalize_remote};
use crate::transfer::progress::{CancelHandle, TransferEvent};
use crate::transfer::results::{Direction, ItemOutcome, ItemStatus, TransferResult, TransferTask};

pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Receives every per-item event as it happens.
pub type Observer<'a> = dyn FnMut(&TransferEvent) + Send + 'a;

#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Deepest directory level that will be entered below the root.
    pub max_depth: usize,
    /// Use MLSD for remote listings when the server offers it.
    pub prefer_structured: bool,
    /// Download into a temporary sibling and rename on success.
    pub atomic_downloads: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            prefer_structured: true,
            atomic_downloads: false,
        }
    }
}

/// Local and remote location of one item.
#[derive(Debug, Clone)]
struct ItemPaths {
    local: PathBuf,
    remote: String,
    kind: EntryKind,
}

impl ItemPaths {
    fn child(&self, entry: &ListingEntry) -> ItemPaths {
        ItemPaths {
            local: self.local.join(&entry.name),
            remote: join_remote(&self.remote, &entry.name),
            kind: entry.kind,
        }
    }

    fn outcome(&self, direction: Direction, status: ItemStatus) -> ItemOutcome {
        let local = self.local.display().to_string();
        let (source, destination) = match direction {
            Direction::Upload => (local, self.remote.clone()),
            Direction::Download => (self.remote.clone(), local),
        };
        ItemOutcome {
            source,
            destination,
            kind: self.kind,
            status,
        }
    }
}

struct Frame {
    dir: ItemPaths,
    depth: usize,
    entries: VecDeque<ListingEntry>,
}

/// Run `task` to completion and return the aggregate result.
pub async fn walk(
    session: &mut Session,
    task: TransferTask,
    options: &WalkOptions,
    cancel: &CancelHandle,
    observer: &mut Observer<'_>,
) -> TransferResult {
    let walker = Walker {
        direction: task.direction,
        result: TransferResult::new(task),
        session,
        options,
        cancel,
        observer,
    };
    walker.run().await
}

struct Walker<'a, 'o> {
    session: &'a mut Session,
    options: &'a WalkOptions,
    cancel: &'a CancelHandle,
    observer: &'a mut Observer<'o>,
    direction: Direction,
    result: TransferResult,
}

impl Walker<'_, '_> {
    async fn run(mut self) -> TransferResult {
        let root = ItemPaths {
            local: self.result.task.local_path.clone(),
            remote: normalize_remote(&self.result.task.remote_path),
            kind: self.result.task.kind,
        };

        if !self.session.is_authenticated() {
            warn!(
                "Transfer of {} not started: session is not connected",
                self.result.task.source()
            );
            self.result.aborted = Some(WalkError::NotConnected);
            return self.result;
        }
        if self.cancel.is_cancelled() {
            self.result.cancelled = true;
            self.skip(&root);
            return self.result;
        }

        match root.kind {
            EntryKind::File => self.transfer_file(&root).await,
            EntryKind::Directory => self.walk_tree(root).await,
        }

        info!(
            "Transfer {} -> {} done: {} ok, {} failed, {} skipped, {} bytes",
            self.result.task.source(),
            self.result.task.destination(),
            self.result.items_succeeded,
            self.result.items_failed,
            self.result.items_skipped,
            self.result.bytes_transferred
        );
        self.result
    }

    async fn walk_tree(&mut self, root: ItemPaths) {
        let Some(entries) = self.open_directory(&root, true).await else {
            return;
        };

        let mut stack = vec![Frame {
            dir: root,
            depth: 0,
            entries,
        }];

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            if frame.entries.is_empty() {
                stack.pop();
                continue;
            }
            if self.cancel.is_cancelled() {
                info!("Transfer cancelled; skipping remaining entries");
                self.result.cancelled = true;
                break;
            }

            let Some(entry) = frame.entries.pop_front() else {
                continue;
            };
            let item = frame.dir.child(&entry);
            let depth = frame.depth + 1;

            match item.kind {
                EntryKind::File => self.transfer_file(&item).await,
                EntryKind::Directory if depth > self.options.max_depth => {
                    self.fail(&item, WalkError::DepthExceeded(self.options.max_depth));
                }
                EntryKind::Directory => {
                    if let Some(entries) = self.open_directory(&item, false).await {
                        stack.push(Frame {
                            dir: item,
                            depth,
                            entries,
                        });
                    }
                }
            }

            if self.result.aborted.is_some() {
                break;
            }
        }

        // Deepest frame first keeps skipped items in walk order.
        while let Some(frame) = stack.pop() {
            for entry in &frame.entries {
                self.skip(&frame.dir.child(entry));
            }
        }
    }

    /// Ensure the destination directory exists and list the source one.
    /// Reports the directory as one item either way. Only the root may need
    /// missing parents created.
    async fn open_directory(
        &mut self,
        dir: &ItemPaths,
        root: bool,
    ) -> Option<VecDeque<ListingEntry>> {
        if let Err(e) = self.ensure_destination(dir, root).await {
            self.fail(dir, e);
            return None;
        }
        match self.list_source(dir).await {
            Ok(entries) => {
                self.succeed(dir, 0);
                Some(entries.into())
            }
            Err(e) => {
                self.fail(dir, e);
                None
            }
        }
    }

    async fn ensure_destination(&mut self, dir: &ItemPaths, root: bool) -> Result<(), WalkError> {
        match self.direction {
            Direction::Upload => {
                let created = if root {
                    self.session.make_dir_all(&dir.remote).await
                } else {
                    self.session.make_dir(&dir.remote).await
                };
                remote_dir_ready(dir, created)
            }
            Direction::Download => {
                create_local_dir(&dir.local)
                    .await
                    .map_err(|e| WalkError::CreateDirectory {
                        path: dir.local.display().to_string(),
                        cause: e.to_string(),
                    })
            }
        }
    }

    async fn list_source(&mut self, dir: &ItemPaths) -> Result<Vec<ListingEntry>, WalkError> {
        match self.direction {
            Direction::Upload => {
                list_local(&dir.local)
                    .await
                    .map_err(|e| WalkError::ListDirectory {
                        path: dir.local.display().to_string(),
                        cause: e.to_string(),
                    })
            }
            Direction::Download => {
                let format = self.session.listing_format(self.options.prefer_structured);
                match self.session.list(Some(dir.remote.as_str()), format).await {
                    Ok(entries) => Ok(entries),
                    Err(e) if e.is_fatal() => Err(WalkError::Transfer(e)),
                    Err(e) => Err(WalkError::ListDirectory {
                        path: dir.remote.clone(),
                        cause: e.to_string(),
                    }),
                }
            }
        }
    }

    async fn transfer_file(&mut self, item: &ItemPaths) {
        let transferred = match self.direction {
            Direction::Upload => {
                file_ops::upload_path(self.session, &item.local, &item.remote).await
            }
            Direction::Download => {
                file_ops::download_path(
                    self.session,
                    &item.remote,
                    &item.local,
                    self.options.atomic_downloads,
                )
                .await
            }
        };
        match transferred {
            Ok(bytes) => self.succeed(item, bytes),
            Err(e) => self.fail(item, WalkError::Transfer(e)),
        }
    }

    // --------------------
    // Recording
    // --------------------

    fn succeed(&mut self, item: &ItemPaths, bytes: u64) {
        let outcome = item.outcome(self.direction, ItemStatus::Succeeded { bytes });
        (self.observer)(&TransferEvent::Item(outcome.clone()));
        self.result.record_success(outcome);
    }

    fn fail(&mut self, item: &ItemPaths, error: WalkError) {
        let outcome = item.outcome(self.direction, ItemStatus::Failed(error.to_string()));
        log_walk_error(&outcome.source, &error);
        (self.observer)(&TransferEvent::Item(outcome.clone()));
        self.result.record_failure(outcome, error);

        if !self.session.is_authenticated() && self.result.aborted.is_none() {
            self.result.aborted = Some(WalkError::NotConnected);
        }
    }

    fn skip(&mut self, item: &ItemPaths) {
        let outcome = item.outcome(self.direction, ItemStatus::Skipped);
        (self.observer)(&TransferEvent::Item(outcome.clone()));
        self.result.record_skipped(outcome);
    }
}

fn remote_dir_ready(
    dir: &ItemPaths,
    created: Result<DirStatus, CommandError>,
) -> Result<(), WalkError> {
    match created {
        Ok(status) => {
            debug!("Remote directory {}: {:?}", dir.remote, status);
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(WalkError::Transfer(TransferError::Control(e))),
        Err(e) => Err(WalkError::CreateDirectory {
            path: dir.remote.clone(),
            cause: e.to_string(),
        }),
    }
}

/// Create a local directory; an existing directory is fine.
async fn create_local_dir(path: &Path) -> io::Result<()> {
    match fs::create_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if fs::metadata(path).await?.is_dir() {
                Ok(())
            } else {
                Err(e)
            }
        }
        Err(e) => Err(e),
    }
}

/// Regular files and directories of `dir`, sorted by name. Symlinks and
/// other entry types are left out.
pub async fn list_local(dir: &Path) -> io::Result<Vec<ListingEntry>> {
    let mut reader = fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let file_type = entry.file_type().await?;
        let kind = if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            debug!("Skipping {}: not a file or directory", entry.path().display());
            continue;
        };

        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!("Skipping {:?}: name is not valid UTF-8", raw);
                continue;
            }
        };
        if !is_acceptable_name(&name) {
            warn!("Skipping {}: name cannot be mirrored", entry.path().display());
            continue;
        }

        let size = match kind {
            EntryKind::File => entry.metadata().await.map(|m| m.len()).unwrap_or(0),
            EntryKind::Directory => 0,
        };
        entries.push(ListingEntry::new(name, kind, size));
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_list_local_sorted_and_typed() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let entries = list_local(dir.path()).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt", "sub"]);
        assert_eq!(entries[1].size, 5);
        assert!(entries[2].is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_local_excludes_symlinks() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let entries = list_local(dir.path()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "real");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_local_skips_names_with_separators() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("..\\evil.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("plain.txt"), b"x").unwrap();

        let entries = list_local(dir.path()).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["plain.txt"]);
    }

    #[tokio::test]
    async fn test_create_local_dir_is_idempotent() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("x/y");
        create_local_dir(&target).await.unwrap();
        create_local_dir(&target).await.unwrap();
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn test_walk_without_session_is_aborted() {
        let mut session = Session::new();
        let task = TransferTask::upload("/nonexistent", "/dst", EntryKind::Directory);
        let mut events = Vec::new();
        let mut observer = |e: &TransferEvent| events.push(e.clone());
        let result = walk(
            &mut session,
            task,
            &WalkOptions::default(),
            &CancelHandle::new(),
            &mut observer,
        )
        .await;
        assert!(matches!(result.aborted, Some(WalkError::NotConnected)));
        assert_eq!(result.items_failed, 0);
        assert!(events.is_empty());
    }
}
