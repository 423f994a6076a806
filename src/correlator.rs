use crate::error::{Result, StreamMagicError};
use crate::protocol::Message;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

struct Slot {
    token: u64,
    tx: oneshot::Sender<Message>,
}

struct Table {
    next_token: u64,
    pending: HashMap<String, VecDeque<Slot>>,
    /// Outgoing frame sender; `None` once the connection is torn down
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

/// Tracks outstanding requests and matches response frames back to callers.
///
/// The protocol has no request IDs, so correlation is by path alone: a
/// response on a path resolves the oldest still-pending request for it.
/// Registration and the transport write happen under one lock, so FIFO
/// resolution order is exactly the order frames hit the wire.
pub(crate) struct Correlator {
    inner: Mutex<Table>,
}

impl Correlator {
    pub(crate) fn new(outgoing: mpsc::UnboundedSender<String>) -> Self {
        Self {
            inner: Mutex::new(Table {
                next_token: 0,
                pending: HashMap::new(),
                outgoing: Some(outgoing),
            }),
        }
    }

    /// Write `frame` and register a pending slot for `path`. The returned
    /// token identifies the slot for [`cancel`](Self::cancel).
    pub(crate) fn send_request(
        &self,
        path: &str,
        frame: String,
    ) -> Result<(u64, oneshot::Receiver<Message>)> {
        let mut table = self.inner.lock().unwrap();
        let Some(outgoing) = table.outgoing.as_ref() else {
            return Err(StreamMagicError::ConnectionLost);
        };
        outgoing
            .send(frame)
            .map_err(|_| StreamMagicError::ConnectionLost)?;

        let token = table.next_token;
        table.next_token += 1;
        let (tx, rx) = oneshot::channel();
        table
            .pending
            .entry(path.to_string())
            .or_default()
            .push_back(Slot { token, tx });
        Ok((token, rx))
    }

    /// Complete the oldest live pending request for the message's path.
    /// Responses with no matching caller are dropped; late responses after
    /// a timeout or across a reconnect race are normal.
    pub(crate) fn resolve(&self, message: Message) {
        let mut table = self.inner.lock().unwrap();
        let path = message.path.clone();
        let Some(queue) = table.pending.get_mut(&path) else {
            tracing::debug!("Dropping response with no pending request on {}", path);
            return;
        };

        let mut message = message;
        let mut delivered = false;
        while let Some(slot) = queue.pop_front() {
            match slot.tx.send(message) {
                Ok(()) => {
                    delivered = true;
                    break;
                }
                // Receiver already gone; hand the response to the next oldest
                Err(returned) => message = returned,
            }
        }
        let drained = queue.is_empty();
        if drained {
            table.pending.remove(&path);
        }
        if !delivered {
            tracing::debug!("Dropping response with no live waiter on {}", path);
        }
    }

    /// Remove one pending slot. Called on timeout or caller cancellation;
    /// a no-op if the slot was already resolved.
    pub(crate) fn cancel(&self, path: &str, token: u64) {
        let mut table = self.inner.lock().unwrap();
        if let Some(queue) = table.pending.get_mut(path) {
            queue.retain(|slot| slot.token != token);
            if queue.is_empty() {
                table.pending.remove(path);
            }
        }
    }

    /// Tear down the table: every outstanding waiter observes the dropped
    /// channel as `ConnectionLost`, and later sends are refused.
    pub(crate) fn fail_all(&self) {
        let mut table = self.inner.lock().unwrap();
        table.outgoing = None;
        table.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageType;
    use serde_json::{json, Value};

    fn response(path: &str, marker: i64) -> Message {
        let params = match json!({ "n": marker }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        Message {
            path: path.to_string(),
            kind: MessageType::Response,
            params,
            result: Some(200),
            text: None,
        }
    }

    fn correlator() -> (Correlator, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Correlator::new(tx), rx)
    }

    #[tokio::test]
    async fn resolves_same_path_requests_in_fifo_order() {
        let (correlator, _wire) = correlator();
        let (_t1, rx1) = correlator.send_request("/a", "{}".into()).unwrap();
        let (_t2, rx2) = correlator.send_request("/a", "{}".into()).unwrap();

        correlator.resolve(response("/a", 1));
        correlator.resolve(response("/a", 2));

        assert_eq!(rx1.await.unwrap().params["n"], 1);
        assert_eq!(rx2.await.unwrap().params["n"], 2);
    }

    #[tokio::test]
    async fn paths_are_correlated_independently() {
        let (correlator, _wire) = correlator();
        let (_ta, rx_a) = correlator.send_request("/a", "{}".into()).unwrap();
        let (_tb, rx_b) = correlator.send_request("/b", "{}".into()).unwrap();

        correlator.resolve(response("/b", 2));
        correlator.resolve(response("/a", 1));

        assert_eq!(rx_a.await.unwrap().params["n"], 1);
        assert_eq!(rx_b.await.unwrap().params["n"], 2);
    }

    #[tokio::test]
    async fn cancelled_slot_is_skipped() {
        let (correlator, _wire) = correlator();
        let (t1, _rx1) = correlator.send_request("/a", "{}".into()).unwrap();
        let (_t2, rx2) = correlator.send_request("/a", "{}".into()).unwrap();

        correlator.cancel("/a", t1);
        correlator.resolve(response("/a", 1));

        assert_eq!(rx2.await.unwrap().params["n"], 1);
    }

    #[tokio::test]
    async fn dead_waiter_does_not_swallow_the_response() {
        let (correlator, _wire) = correlator();
        let (_t1, rx1) = correlator.send_request("/a", "{}".into()).unwrap();
        let (_t2, rx2) = correlator.send_request("/a", "{}".into()).unwrap();

        drop(rx1);
        correlator.resolve(response("/a", 1));

        assert_eq!(rx2.await.unwrap().params["n"], 1);
    }

    #[tokio::test]
    async fn fail_all_drops_every_waiter_and_refuses_new_requests() {
        let (correlator, _wire) = correlator();
        let (_t1, rx1) = correlator.send_request("/a", "{}".into()).unwrap();
        let (_t2, rx2) = correlator.send_request("/b", "{}".into()).unwrap();

        correlator.fail_all();

        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
        assert!(matches!(
            correlator.send_request("/a", "{}".into()),
            Err(StreamMagicError::ConnectionLost)
        ));
    }

    #[tokio::test]
    async fn unmatched_response_is_dropped() {
        let (correlator, _wire) = correlator();
        correlator.resolve(response("/nobody/home", 1));
    }
}
