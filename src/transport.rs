use crate::error::Result;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};

/// One established duplex text-frame connection, reduced to a pair of
/// channels: frames pushed into `outgoing` are written to the peer, frames
/// read from the peer arrive on `incoming`. The incoming channel closing
/// means the connection is gone.
pub struct Transport {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<String>,
}

impl Transport {
    /// Wrap a channel pair into a transport
    pub fn new(
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self { outgoing, incoming }
    }

    pub(crate) fn into_parts(self) -> (mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>) {
        (self.outgoing, self.incoming)
    }
}

/// Strategy for establishing a [`Transport`].
///
/// The session calls this once per connection attempt, so every reconnect
/// gets a fresh transport. Any duplex message-socket implementation works;
/// tests drive a session over plain in-process channels.
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to the device
    fn connect(&self) -> BoxFuture<'static, Result<Transport>>;
}

/// WebSocket connector for the device's `/smoip` endpoint
pub struct WsConnector {
    host: String,
}

impl WsConnector {
    /// Connector for a device reachable at `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

fn header_value(value: String) -> Result<HeaderValue> {
    HeaderValue::from_str(&value).map_err(|err| {
        tungstenite::Error::from(tungstenite::http::Error::from(err)).into()
    })
}

impl Connector for WsConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Transport>> {
        let host = self.host.clone();
        Box::pin(async move {
            let url = format!("ws://{}/smoip", host);
            tracing::info!("Connecting to {}", url);

            // The device only accepts handshakes that carry these headers.
            let mut request = url.as_str().into_client_request()?;
            request
                .headers_mut()
                .insert(header::ORIGIN, header_value(format!("ws://{}", host))?);
            request
                .headers_mut()
                .insert(header::HOST, header_value(format!("{}:80", host))?);

            let (stream, _) = connect_async(request).await?;
            let (mut write, mut read) = stream.split();

            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

            // Forward outgoing frames to the socket
            tokio::spawn(async move {
                while let Some(frame) = out_rx.recv().await {
                    if let Err(err) = write.send(WsMessage::Text(frame)).await {
                        tracing::error!("Failed to send frame: {}", err);
                        break;
                    }
                }
            });

            // Forward incoming text frames; dropping in_tx signals loss
            tokio::spawn(async move {
                while let Some(result) = read.next().await {
                    match result {
                        Ok(WsMessage::Text(text)) => {
                            if in_tx.send(text).is_err() {
                                break;
                            }
                        }
                        Ok(WsMessage::Close(_)) => {
                            tracing::info!("WebSocket connection closed");
                            break;
                        }
                        Err(err) => {
                            tracing::error!("WebSocket error: {}", err);
                            break;
                        }
                        _ => {}
                    }
                }
            });

            Ok(Transport::new(out_tx, in_rx))
        })
    }
}
