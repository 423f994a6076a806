use crate::correlator::Correlator;
use crate::error::{Result, StreamMagicError};
use crate::protocol::{self, Message, MessageType};
use crate::subscription::{Multiplexer, UpdateHandler};
use crate::transport::Transport;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Removes the pending slot when a request future is dropped before its
/// response arrives; a no-op if the slot was already resolved.
struct PendingGuard<'a> {
    correlator: &'a Correlator,
    path: &'a str,
    token: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.cancel(self.path, self.token);
    }
}

/// One connection epoch: a transport, its read loop, the pending-request
/// table, and the per-path update workers. A `Link` is created fresh on
/// every (re)connect and never reused; losing the transport invalidates
/// everything rooted here.
pub(crate) struct Link {
    correlator: Arc<Correlator>,
    multiplexer: Arc<Multiplexer>,
    reader: Mutex<Option<JoinHandle<()>>>,
    closed: watch::Receiver<bool>,
}

impl Link {
    /// Take ownership of a transport and start its read loop. Updates are
    /// routed through `subscriptions`, which outlives any single epoch.
    pub(crate) fn spawn(
        transport: Transport,
        subscriptions: Arc<Mutex<HashMap<String, UpdateHandler>>>,
    ) -> Arc<Self> {
        let (outgoing, mut incoming) = transport.into_parts();
        let correlator = Arc::new(Correlator::new(outgoing));
        let multiplexer = Arc::new(Multiplexer::new());
        let (closed_tx, closed_rx) = watch::channel(false);

        let reader = {
            let correlator = Arc::clone(&correlator);
            let multiplexer = Arc::clone(&multiplexer);
            tokio::spawn(async move {
                while let Some(frame) = incoming.recv().await {
                    tracing::debug!("Received: {}", frame);
                    let message = match protocol::parse(&frame) {
                        Ok(message) => message,
                        Err(err) => {
                            tracing::warn!("Dropping malformed frame: {}", err);
                            continue;
                        }
                    };
                    match message.kind {
                        MessageType::Response => correlator.resolve(message),
                        MessageType::Update => {
                            let handler =
                                subscriptions.lock().unwrap().get(&message.path).cloned();
                            if let Some(handler) = handler {
                                multiplexer.dispatch(message, handler);
                            }
                        }
                        MessageType::Request => {
                            tracing::debug!(
                                "Ignoring request frame from device on {}",
                                message.path
                            );
                        }
                    }
                }
                tracing::info!("Read loop ended, connection lost");
                correlator.fail_all();
                multiplexer.teardown();
                let _ = closed_tx.send(true);
            })
        };

        Arc::new(Self {
            correlator,
            multiplexer,
            reader: Mutex::new(Some(reader)),
            closed: closed_rx,
        })
    }

    /// Send a request and wait for the matching response. A non-success
    /// result code fails with `DeviceRejected`; an elapsed `limit` cancels
    /// the pending slot and fails with `RequestTimeout`.
    pub(crate) async fn request(
        &self,
        path: &str,
        params: Value,
        limit: Option<Duration>,
    ) -> Result<Message> {
        let frame = protocol::encode(path, params)?;
        tracing::debug!("Sending: {}", frame);
        let (token, rx) = self.correlator.send_request(path, frame)?;
        let _guard = PendingGuard {
            correlator: self.correlator.as_ref(),
            path,
            token,
        };

        let message = match limit {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome.map_err(|_| StreamMagicError::ConnectionLost)?,
                Err(_) => return Err(StreamMagicError::RequestTimeout),
            },
            None => rx.await.map_err(|_| StreamMagicError::ConnectionLost)?,
        };

        let code = message.result.ok_or_else(|| {
            StreamMagicError::InvalidResponse(format!("response on {} missing result code", path))
        })?;
        if code != protocol::SUCCESS_RESULT {
            return Err(StreamMagicError::DeviceRejected {
                code,
                message: message.text.unwrap_or_default(),
            });
        }
        Ok(message)
    }

    /// Ask the device for periodic push updates on `path`
    pub(crate) async fn subscribe(&self, path: &str) -> Result<Message> {
        self.request(
            path,
            json!({ "update": protocol::SUBSCRIBE_UPDATE_RATE, "zone": protocol::ZONE }),
            None,
        )
        .await
    }

    /// Drop the queue/worker for one path, if any
    pub(crate) fn remove_subscriber(&self, path: &str) {
        self.multiplexer.remove(path);
    }

    /// Wait until the read loop has ended
    pub(crate) async fn wait_closed(&self) {
        let mut closed = self.closed.clone();
        // An error means the reader was aborted, which is also closed
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Cancel the read loop, fail outstanding requests, and discard
    /// undelivered updates; idempotent.
    pub(crate) fn shutdown(&self) {
        if let Some(reader) = self.reader.lock().unwrap().take() {
            reader.abort();
        }
        self.correlator.fail_all();
        self.multiplexer.teardown();
    }
}
