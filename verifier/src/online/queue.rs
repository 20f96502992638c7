use crate::filter::MsgTypeFilter;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use fixlab_common::FixMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Producer half of the bounded receive queue. Lives inside the
/// transport callback: filter, try to enqueue, count overflow. Nothing
/// else runs on the transport's thread.
#[derive(Clone)]
pub struct QueueProducer {
    tx: Sender<FixMessage>,
    filter: MsgTypeFilter,
    dropped: Arc<AtomicU64>,
}

impl QueueProducer {
    /// Non-blocking push. Messages rejected by the filter are ignored;
    /// overflow increments the dropped counter.
    pub fn offer(&self, message: FixMessage) {
        if !self.filter.accepts(&message) {
            return;
        }
        if let Err(TrySendError::Full(_)) = self.tx.try_send(message) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Consumer half, owned by the runner thread.
pub struct QueueConsumer {
    rx: Receiver<FixMessage>,
    dropped: Arc<AtomicU64>,
}

impl QueueConsumer {
    /// Timed poll; None on timeout or when every producer is gone.
    pub fn poll(&self, timeout: Duration) -> Option<FixMessage> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Build the MPSC pair shared between the transport callback and the
/// runner.
pub fn receive_queue(capacity: usize, filter: MsgTypeFilter) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = bounded(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        QueueProducer {
            tx,
            filter,
            dropped: Arc::clone(&dropped),
        },
        QueueConsumer { rx, dropped },
    )
}
