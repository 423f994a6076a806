//! Rust library for controlling Cambridge Audio StreamMagic network audio players
//!
//! This library maintains one persistent WebSocket connection to a StreamMagic
//! device and provides an async API on top of it. It supports:
//!
//! - Request/response commands correlated over the shared connection
//! - Push-update subscriptions with strict per-path ordering
//! - Automatic reconnection with exponential backoff and subscription replay
//! - Cached snapshots of device info, sources, zone state, playback state,
//!   and transport controls
//! - Playback, volume, source, and EQ control commands
//!
//! # Quick Start
//!
//! ```no_run
//! use streammagic::StreamMagicClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StreamMagicClient::new("192.168.1.40");
//!     client.connect().await?;
//!
//!     if let Some(info) = client.info() {
//!         println!("Model: {}", info.model);
//!     }
//!     for source in client.sources() {
//!         println!("Source: {} ({})", source.name, source.id);
//!     }
//!
//!     client.play_pause().await?;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Watching for changes
//!
//! ```no_run
//! use streammagic::{Event, StreamMagicClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StreamMagicClient::new("192.168.1.40");
//!     let watcher = client.clone();
//!     client
//!         .register_observer(move |event| {
//!             let watcher = watcher.clone();
//!             async move {
//!                 if let (Event::StateChanged, Some(play_state)) =
//!                     (event, watcher.play_state())
//!                 {
//!                     println!("play state: {}", play_state.state);
//!                 }
//!             }
//!         })
//!         .await;
//!     client.connect().await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Client**: public API surface and control commands
//! - **Session**: connection state machine, reconnection supervisor,
//!   observer fan-out, and state snapshots
//! - **Connection**: one connection epoch — read loop, request correlation,
//!   and per-path update dispatch
//! - **Transport**: pluggable connection establishment (WebSocket by
//!   default, anything frame-shaped in tests)
//! - **Protocol**: the JSON frame format
//! - **Models**: typed records for the device's resources

mod backoff;
mod client;
mod connection;
mod correlator;
pub mod endpoints;
mod error;
mod models;
mod protocol;
mod session;
mod subscription;
mod transport;
mod util;

// Public exports
pub use client::StreamMagicClient;
pub use error::{Result, StreamMagicError};
pub use models::{
    eq_preset, ControlBusMode, EqBand, EqFilter, Info, NowPlaying, PlayState, PlayStateMetadata,
    RepeatMode, ShuffleMode, Source, StandbyMode, State, TransportControl, EQ_GAIN_MAX,
    EQ_GAIN_MIN, EQ_PRESETS,
};
pub use protocol::{Message, MessageType};
pub use session::{ConnectionState, Event, ObserverId};
pub use subscription::UpdateHandler;
pub use transport::{Connector, Transport, WsConnector};
pub use util::eq_bands_to_param_string;
