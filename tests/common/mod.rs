//! In-process mock device for driving a full session over channel-backed
//! transports.

use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use streammagic::{ConnectionState, Connector, Result, StreamMagicClient, StreamMagicError, Transport};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Server side of one accepted mock connection. Dropping it closes both
/// directions, which the client observes as a lost connection.
pub struct MockConn {
    pub from_client: mpsc::UnboundedReceiver<String>,
    pub to_client: mpsc::UnboundedSender<String>,
}

impl MockConn {
    /// Next frame the client wrote, parsed as JSON
    pub async fn recv(&mut self) -> Value {
        let frame = self
            .from_client
            .recv()
            .await
            .expect("client closed the connection");
        serde_json::from_str(&frame).expect("client sent invalid JSON")
    }

    pub fn send(&self, frame: &Value) {
        let _ = self.to_client.send(frame.to_string());
    }

    pub fn send_raw(&self, frame: &str) {
        let _ = self.to_client.send(frame.to_string());
    }

    /// Successful response carrying a data payload
    pub fn respond_ok(&self, path: &str, data: Value) {
        self.send(&json!({
            "path": path,
            "type": "response",
            "result": 200,
            "message": "OK",
            "params": { "data": data },
        }));
    }

    /// Successful response with no payload (e.g. a subscription ack)
    pub fn ack(&self, path: &str) {
        self.send(&json!({
            "path": path,
            "type": "response",
            "result": 200,
            "message": "OK",
            "params": {},
        }));
    }

    /// Rejection response
    pub fn respond_err(&self, path: &str, result: i64, message: &str) {
        self.send(&json!({
            "path": path,
            "type": "response",
            "result": result,
            "message": message,
            "params": {},
        }));
    }

    /// Unsolicited update carrying a data payload
    pub fn push(&self, path: &str, data: Value) {
        self.send(&json!({
            "path": path,
            "type": "update",
            "params": { "data": data },
        }));
    }

    /// Unsolicited update with no payload body
    pub fn push_empty(&self, path: &str) {
        self.send(&json!({
            "path": path,
            "type": "update",
            "params": {},
        }));
    }
}

/// Connector handing out channel-backed transports. Each accepted
/// connection's server side is delivered through the harness's `accepted`
/// receiver.
pub struct MockConnector {
    accept_tx: mpsc::UnboundedSender<MockConn>,
    attempts: Arc<AtomicUsize>,
    fail_next: Arc<AtomicUsize>,
    attempt_times: Arc<Mutex<Vec<Instant>>>,
}

impl Connector for MockConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Transport>> {
        let accept_tx = self.accept_tx.clone();
        let attempts = Arc::clone(&self.attempts);
        let fail_next = Arc::clone(&self.fail_next);
        let attempt_times = Arc::clone(&self.attempt_times);
        Box::pin(async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            attempt_times.lock().unwrap().push(Instant::now());
            if fail_next.load(Ordering::SeqCst) > 0 {
                fail_next.fetch_sub(1, Ordering::SeqCst);
                return Err(StreamMagicError::ConnectionLost);
            }
            let (client_tx, server_rx) = mpsc::unbounded_channel();
            let (server_tx, client_rx) = mpsc::unbounded_channel();
            accept_tx
                .send(MockConn {
                    from_client: server_rx,
                    to_client: server_tx,
                })
                .map_err(|_| StreamMagicError::ConnectionLost)?;
            Ok(Transport::new(client_tx, client_rx))
        })
    }
}

pub struct Harness {
    pub client: StreamMagicClient,
    pub accepted: mpsc::UnboundedReceiver<MockConn>,
    pub attempts: Arc<AtomicUsize>,
    pub fail_next: Arc<AtomicUsize>,
    pub attempt_times: Arc<Mutex<Vec<Instant>>>,
}

pub fn harness() -> Harness {
    let (accept_tx, accepted) = mpsc::unbounded_channel();
    let attempts = Arc::new(AtomicUsize::new(0));
    let fail_next = Arc::new(AtomicUsize::new(0));
    let attempt_times = Arc::new(Mutex::new(Vec::new()));
    let connector = MockConnector {
        accept_tx,
        attempts: Arc::clone(&attempts),
        fail_next: Arc::clone(&fail_next),
        attempt_times: Arc::clone(&attempt_times),
    };
    Harness {
        client: StreamMagicClient::with_connector(Box::new(connector)),
        accepted,
        attempts,
        fail_next,
        attempt_times,
    }
}

/// Canned fetch payloads for the tracked resources
pub fn canned_data(path: &str) -> Value {
    match path {
        "/system/info" => json!({
            "name": "Living Room",
            "model": "CXNv2",
            "timezone": "Europe/London",
            "locale": "en_GB",
            "udn": "uuid:0001",
            "unit_id": "ABC123",
            "api": "1.8",
        }),
        "/system/sources" => json!({
            "sources": [{
                "id": "SPOTIFY",
                "name": "Spotify",
                "default_name": "Spotify",
                "nameable": false,
                "ui_selectable": true,
                "description": "Spotify Connect",
                "description_locale": "en",
            }],
        }),
        "/zone/state" => json!({
            "source": "SPOTIFY",
            "power": true,
            "pre_amp_mode": false,
            "pre_amp_state": false,
            "volume_percent": 30,
            "mute": false,
        }),
        "/zone/play_state" => json!({
            "state": "play",
            "position": 10,
            "metadata": { "title": "Song", "artist": "Artist" },
        }),
        "/zone/now_playing" => json!({
            "controls": ["play", "pause", "track_next"],
        }),
        _ => json!({}),
    }
}

/// Answer one client frame: subscription requests get a bare ack, resource
/// fetches get canned data.
pub fn answer(conn: &MockConn, frame: &Value) {
    let path = frame["path"].as_str().expect("frame without path");
    if frame["params"].get("update").is_some() {
        conn.ack(path);
    } else {
        conn.respond_ok(path, canned_data(path));
    }
}

/// Drive one connect handshake: five resource fetches, then the
/// subscription replay (six tracked paths plus any user subscriptions).
pub async fn complete_handshake_n(conn: &mut MockConn, frames: usize) {
    for _ in 0..frames {
        let frame = conn.recv().await;
        answer(conn, &frame);
    }
}

pub async fn complete_handshake(conn: &mut MockConn) {
    complete_handshake_n(conn, 11).await;
}

/// Connect the client while serving the handshake from the mock side
pub async fn connect_and_handshake(
    client: &StreamMagicClient,
    accepted: &mut mpsc::UnboundedReceiver<MockConn>,
) -> MockConn {
    let (outcome, conn) = tokio::join!(client.connect(), async {
        let mut conn = accepted.recv().await.expect("no connection attempt");
        complete_handshake(&mut conn).await;
        conn
    });
    outcome.expect("connect failed");
    conn
}

/// Poll until the client reaches `state`
pub async fn wait_for_state(client: &StreamMagicClient, state: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.connection_state() != state {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("client never reached {:?}", state));
}
