//! Module `orchestrator`
//!
//! Entry points for single-file and whole-tree transfers. A transfer started
//! through `TransferOrchestrator` runs on its own tokio task and holds the
//! session lock until it finishes, so at most one transfer uses a session at
//! a time while the caller stays free to do other work.

use log::info;
use tokio::task::JoinHandle;

use crate::client::{Session, SharedSession};
use crate::error::TransferJoinError;
use crate::listing::EntryKind;
use crate::transfer::progress::{CancelHandle, TransferEvent, TransferProgress};
use crate::transfer::results::{TransferResult, TransferTask};
use crate::transfer::walker::{self, Observer, WalkOptions};

/// Transfer one file. Any failure ends up in the returned result.
pub async fn transfer_file(
    session: &mut Session,
    mut task: TransferTask,
    observer: &mut Observer<'_>,
) -> TransferResult {
    task.kind = EntryKind::File;
    run_task(
        session,
        task,
        &WalkOptions::default(),
        &CancelHandle::new(),
        observer,
    )
    .await
}

/// Mirror a directory tree. Returns once every entry was visited, skipped
/// or the session was lost.
pub async fn transfer_tree(
    session: &mut Session,
    mut task: TransferTask,
    options: &WalkOptions,
    cancel: &CancelHandle,
    observer: &mut Observer<'_>,
) -> TransferResult {
    task.kind = EntryKind::Directory;
    run_task(session, task, options, cancel, observer).await
}

async fn run_task(
    session: &mut Session,
    task: TransferTask,
    options: &WalkOptions,
    cancel: &CancelHandle,
    observer: &mut Observer<'_>,
) -> TransferResult {
    observer(&TransferEvent::Started(task.clone()));
    let result = walker::walk(session, task, options, cancel, observer).await;
    observer(&TransferEvent::Finished {
        outcome: result.outcome(),
        cancelled: result.cancelled,
    });
    result
}

/// Runs transfers against one shared session.
pub struct TransferOrchestrator {
    session: SharedSession,
    options: WalkOptions,
}

impl TransferOrchestrator {
    pub fn new(session: SharedSession, options: WalkOptions) -> Self {
        Self { session, options }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// Spawn `task` on its own worker. The task waits for the session lock
    /// if another transfer is still running.
    pub fn start(&self, task: TransferTask) -> TransferHandle {
        let session = self.session.clone();
        let options = self.options.clone();
        let cancel = CancelHandle::new();
        let worker_cancel = cancel.clone();
        let (sender, progress) = TransferProgress::channel();

        info!("Queued transfer {} -> {}", task.source(), task.destination());
        let join = tokio::spawn(async move {
            let mut session = session.lock().await;
            // A caller that dropped its progress stream just stops hearing events.
            let mut observer = |event: &TransferEvent| {
                let _ = sender.send(event.clone());
            };
            // The task's own kind picks the walk; options apply to both.
            run_task(&mut session, task, &options, &worker_cancel, &mut observer).await
        });

        TransferHandle {
            cancel,
            progress: Some(progress),
            join,
        }
    }
}

/// Control over one running transfer.
pub struct TransferHandle {
    cancel: CancelHandle,
    progress: Option<TransferProgress>,
    join: JoinHandle<TransferResult>,
}

impl TransferHandle {
    /// Stop before the next entry. The file in flight is finished first.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// The event stream. Available once; later calls return `None`.
    pub fn progress(&mut self) -> Option<TransferProgress> {
        self.progress.take()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> Result<TransferResult, TransferJoinError> {
        Ok(self.join.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::results::Outcome;

    #[tokio::test]
    async fn test_progress_taken_once() {
        let orchestrator =
            TransferOrchestrator::new(Session::new().into_shared(), WalkOptions::default());
        let mut handle = orchestrator.start(TransferTask::upload("a", "b", EntryKind::File));
        assert!(handle.progress().is_some());
        assert!(handle.progress().is_none());
        let result = handle.wait().await.unwrap();
        assert!(result.aborted.is_some());
    }

    #[tokio::test]
    async fn test_events_bracket_the_walk() {
        let orchestrator =
            TransferOrchestrator::new(Session::new().into_shared(), WalkOptions::default());
        let mut handle = orchestrator.start(TransferTask::download("x", "y", EntryKind::Directory));
        let mut progress = handle.progress().unwrap();
        let result = handle.wait().await.unwrap();

        assert!(matches!(progress.next().await, Some(TransferEvent::Started(_))));
        assert!(matches!(
            progress.next().await,
            Some(TransferEvent::Finished {
                outcome: Outcome::Failed,
                cancelled: false
            })
        ));
        assert!(progress.next().await.is_none());
        assert_eq!(result.items_failed, 0);
    }
}
