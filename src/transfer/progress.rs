//! Progress events and cancellation

use tokio::sync::{mpsc, watch};

use crate::transfer::results::{ItemOutcome, Outcome, TransferTask};

/// Events produced by one transfer, in walk order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    Started(TransferTask),
    Item(ItemOutcome),
    Finished {
        outcome: Outcome,
        cancelled: bool,
    },
}

/// The event stream of one transfer. It ends after `Finished` and cannot be
/// replayed.
#[derive(Debug)]
pub struct TransferProgress {
    receiver: mpsc::UnboundedReceiver<TransferEvent>,
}

impl TransferProgress {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<TransferEvent>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }

    /// Next event, or `None` once the transfer has finished and every event
    /// has been taken.
    pub async fn next(&mut self) -> Option<TransferEvent> {
        self.receiver.recv().await
    }
}

/// Requests that a running walk stop before its next entry. Clones share
/// the same flag.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}
