use crate::protocol::Message;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Bound on queued-but-undelivered updates per path
const UPDATE_QUEUE_CAPACITY: usize = 100;

/// Callback invoked with each push update on a subscribed path
pub type UpdateHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

struct Lane {
    queue: mpsc::Sender<Message>,
    worker: JoinHandle<()>,
}

/// Routes push updates to per-path workers.
///
/// Each subscribed path gets a bounded FIFO queue and one worker task,
/// created lazily on the first update for the path. The worker awaits the
/// handler to completion before dequeuing the next message, so updates on
/// one path are delivered strictly in arrival order with no overlap, while
/// a slow handler never stalls other paths or the read loop.
pub(crate) struct Multiplexer {
    lanes: Mutex<HashMap<String, Lane>>,
}

impl Multiplexer {
    pub(crate) fn new() -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueue an update for its path's worker. When the queue is full the
    /// update is dropped rather than blocking the read loop.
    pub(crate) fn dispatch(&self, message: Message, handler: UpdateHandler) {
        let path = message.path.clone();
        let mut lanes = self.lanes.lock().unwrap();
        let lane = lanes.entry(path.clone()).or_insert_with(|| {
            let (queue, mut updates) = mpsc::channel(UPDATE_QUEUE_CAPACITY);
            let worker = tokio::spawn(async move {
                while let Some(message) = updates.recv().await {
                    handler(message).await;
                }
            });
            Lane { queue, worker }
        });
        if lane.queue.try_send(message).is_err() {
            tracing::warn!("Update queue full on {}, dropping message", path);
        }
    }

    /// Tear down one path's queue and worker; idempotent
    pub(crate) fn remove(&self, path: &str) {
        if let Some(lane) = self.lanes.lock().unwrap().remove(path) {
            lane.worker.abort();
        }
    }

    /// Cancel all workers and discard queued-but-undelivered updates
    pub(crate) fn teardown(&self) {
        let mut lanes = self.lanes.lock().unwrap();
        for (_, lane) in lanes.drain() {
            lane.worker.abort();
        }
    }
}
