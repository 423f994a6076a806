use crate::endpoints;
use crate::error::{Result, StreamMagicError};
use crate::models::{
    EqBand, Info, NowPlaying, PlayState, RepeatMode, ShuffleMode, Source, State, EQ_GAIN_MAX,
    EQ_GAIN_MIN,
};
use crate::protocol::{Message, ZONE};
use crate::session::{payload, ConnectionState, Event, Observer, ObserverId, Session, SourcesPayload};
use crate::subscription::UpdateHandler;
use crate::transport::{Connector, WsConnector};
use crate::{models, util};
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Client for StreamMagic enabled devices
///
/// A `StreamMagicClient` holds one persistent connection to a device and
/// keeps it alive: requests are correlated to their responses, push updates
/// are routed to per-path subscribers, and a lost connection is re-dialed
/// with backoff while the subscription set is replayed. Cloning the client
/// is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct StreamMagicClient {
    session: Arc<Session>,
}

impl StreamMagicClient {
    /// Client for the device reachable at `host`
    ///
    /// No I/O happens until [`connect`](Self::connect) is called.
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_connector(Box::new(WsConnector::new(host)))
    }

    /// Client over a custom transport strategy
    pub fn with_connector(connector: Box<dyn Connector>) -> Self {
        Self {
            session: Session::new(connector),
        }
    }

    /// Connect to the device.
    ///
    /// Waits until the connection is established, the tracked resources are
    /// fetched, and every subscription is accepted. Once the first attempt
    /// has succeeded, later connection losses are retried in the background
    /// with exponential backoff until [`disconnect`](Self::disconnect); a
    /// failure before the first success is returned here and not retried.
    /// Calling `connect` while already connecting or connected joins the
    /// in-flight outcome instead of starting a second attempt.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use streammagic::StreamMagicClient;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = StreamMagicClient::new("192.168.1.40");
    ///     client.connect().await?;
    ///     if let Some(info) = client.info() {
    ///         println!("connected to {} ({})", info.name, info.model);
    ///     }
    ///     client.disconnect().await;
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    /// Disconnect and stop reconnecting.
    ///
    /// All in-flight requests fail with `ConnectionLost` and undelivered
    /// push updates are discarded. Safe to call when not connected.
    pub async fn disconnect(&self) {
        self.session.disconnect().await
    }

    /// Whether the session is currently connected
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Current lifecycle state of the connection
    pub fn connection_state(&self) -> ConnectionState {
        self.session.connection_state()
    }

    /// Send a request on `path` and wait for the device's response.
    ///
    /// `params` must be a JSON object or `Value::Null`. A non-success
    /// result code fails with `DeviceRejected`.
    pub async fn request(&self, path: &str, params: Value) -> Result<Message> {
        self.session.request(path, params, None).await
    }

    /// Like [`request`](Self::request) but gives up after `limit`,
    /// cancelling the pending request and failing with `RequestTimeout`.
    pub async fn request_with_timeout(
        &self,
        path: &str,
        params: Value,
        limit: Duration,
    ) -> Result<Message> {
        self.session.request(path, params, Some(limit)).await
    }

    /// Subscribe to push updates on `path`.
    ///
    /// The handler is invoked once per update, in arrival order, never
    /// concurrently with itself; a slow handler delays only its own path.
    /// At most one subscription exists per path — subscribing again
    /// replaces the handler. The subscription is replayed automatically
    /// after a reconnect.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use streammagic::StreamMagicClient;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = StreamMagicClient::new("192.168.1.40");
    /// # client.connect().await?;
    /// client
    ///     .subscribe("/zone/play_state", |message| async move {
    ///         println!("play state: {:?}", message.data());
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn subscribe<F, Fut>(&self, path: &str, handler: F) -> Result<()>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: UpdateHandler = Arc::new(move |message: Message| -> BoxFuture<'static, ()> {
            Box::pin(handler(message))
        });
        self.session.subscribe(path, handler).await
    }

    /// Remove the subscription on `path`, if any; idempotent
    pub fn unsubscribe(&self, path: &str) {
        self.session.unsubscribe(path)
    }

    /// Register an observer for state and connectivity changes.
    ///
    /// Observers are invoked concurrently with each other and awaited; if
    /// the session is already connected the observer receives an immediate
    /// state event. Returns an id for
    /// [`unregister_observer`](Self::unregister_observer).
    pub async fn register_observer<F, Fut>(&self, observer: F) -> ObserverId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let observer: Observer = Arc::new(move |event: Event| -> BoxFuture<'static, ()> {
            Box::pin(observer(event))
        });
        self.session.register_observer(observer).await
    }

    /// Remove a previously registered observer; idempotent
    pub fn unregister_observer(&self, id: ObserverId) {
        self.session.unregister_observer(id)
    }

    /// Remove every registered observer
    pub fn clear_observers(&self) {
        self.session.clear_observers()
    }

    /// Latest known device information
    pub fn info(&self) -> Option<Info> {
        self.session.info()
    }

    /// Latest known input sources
    pub fn sources(&self) -> Vec<Source> {
        self.session.sources()
    }

    /// Latest known zone state
    pub fn state(&self) -> Option<State> {
        self.session.state()
    }

    /// Latest known playback state
    pub fn play_state(&self) -> Option<PlayState> {
        self.session.play_state()
    }

    /// Latest known transport controls
    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.session.now_playing()
    }

    /// When the playback position was last reported
    pub fn position_last_updated(&self) -> Option<Instant> {
        self.session.position_last_updated()
    }

    /// Fetch device information from the device
    pub async fn fetch_info(&self) -> Result<Info> {
        let response = self.session.request(endpoints::INFO, Value::Null, None).await?;
        payload(&response)
    }

    /// Fetch the input sources from the device
    pub async fn fetch_sources(&self) -> Result<Vec<Source>> {
        let response = self
            .session
            .request(endpoints::SOURCES, Value::Null, None)
            .await?;
        Ok(payload::<SourcesPayload>(&response)?.sources)
    }

    /// Fetch the zone state from the device
    pub async fn fetch_state(&self) -> Result<State> {
        let response = self
            .session
            .request(endpoints::ZONE_STATE, Value::Null, None)
            .await?;
        payload(&response)
    }

    /// Fetch the playback state from the device
    pub async fn fetch_play_state(&self) -> Result<PlayState> {
        let response = self
            .session
            .request(endpoints::PLAY_STATE, Value::Null, None)
            .await?;
        payload(&response)
    }

    /// Fetch the available transport controls from the device
    pub async fn fetch_now_playing(&self) -> Result<NowPlaying> {
        let response = self
            .session
            .request(endpoints::NOW_PLAYING, Value::Null, None)
            .await?;
        payload(&response)
    }

    async fn command(&self, path: &str, params: Value) -> Result<()> {
        self.session.request(path, params, None).await.map(|_| ())
    }

    /// Power the device on
    pub async fn power_on(&self) -> Result<()> {
        self.command(endpoints::POWER, json!({ "power": "ON" })).await
    }

    /// Put the device into network standby
    pub async fn power_off(&self) -> Result<()> {
        self.command(endpoints::POWER, json!({ "power": "NETWORK" }))
            .await
    }

    /// Raise the volume by one step
    pub async fn volume_up(&self) -> Result<()> {
        self.command(
            endpoints::ZONE_STATE,
            json!({ "zone": ZONE, "volume_step_change": 1 }),
        )
        .await
    }

    /// Lower the volume by one step
    pub async fn volume_down(&self) -> Result<()> {
        self.command(
            endpoints::ZONE_STATE,
            json!({ "zone": ZONE, "volume_step_change": -1 }),
        )
        .await
    }

    /// Set the volume as a percentage (0-100)
    pub async fn set_volume(&self, volume: u8) -> Result<()> {
        if volume > 100 {
            return Err(StreamMagicError::InvalidParameter(
                "volume must be between 0 and 100".to_string(),
            ));
        }
        self.command(
            endpoints::ZONE_STATE,
            json!({ "zone": ZONE, "volume_percent": volume }),
        )
        .await
    }

    /// Mute or unmute the device
    pub async fn set_mute(&self, mute: bool) -> Result<()> {
        self.command(endpoints::ZONE_STATE, json!({ "zone": ZONE, "mute": mute }))
            .await
    }

    /// Select an input source
    pub async fn set_source(&self, source: &Source) -> Result<()> {
        self.set_source_by_id(&source.id).await
    }

    /// Select an input source by its id
    pub async fn set_source_by_id(&self, source_id: &str) -> Result<()> {
        self.command(
            endpoints::ZONE_STATE,
            json!({ "zone": ZONE, "source": source_id }),
        )
        .await
    }

    /// Seek to a position in the current track, in seconds
    pub async fn media_seek(&self, position: u64) -> Result<()> {
        self.command(
            endpoints::PLAY_CONTROL,
            json!({ "zone": ZONE, "position": position }),
        )
        .await
    }

    /// Skip to the next track
    pub async fn next_track(&self) -> Result<()> {
        self.command(
            endpoints::PLAY_CONTROL,
            json!({ "match": "none", "zone": ZONE, "skip_track": 1 }),
        )
        .await
    }

    /// Skip to the previous track
    pub async fn previous_track(&self) -> Result<()> {
        self.command(
            endpoints::PLAY_CONTROL,
            json!({ "match": "none", "zone": ZONE, "skip_track": -1 }),
        )
        .await
    }

    /// Toggle between play and pause
    pub async fn play_pause(&self) -> Result<()> {
        self.command(
            endpoints::PLAY_CONTROL,
            json!({ "match": "none", "zone": ZONE, "action": "toggle" }),
        )
        .await
    }

    /// Resume playback
    pub async fn play(&self) -> Result<()> {
        self.command(
            endpoints::PLAY_CONTROL,
            json!({ "match": "none", "zone": ZONE, "action": "play" }),
        )
        .await
    }

    /// Pause playback
    pub async fn pause(&self) -> Result<()> {
        self.command(
            endpoints::PLAY_CONTROL,
            json!({ "match": "none", "zone": ZONE, "action": "pause" }),
        )
        .await
    }

    /// Stop playback
    pub async fn stop(&self) -> Result<()> {
        self.command(
            endpoints::PLAY_CONTROL,
            json!({ "match": "none", "zone": ZONE, "action": "stop" }),
        )
        .await
    }

    /// Set the shuffle mode
    pub async fn set_shuffle(&self, shuffle: ShuffleMode) -> Result<()> {
        self.command(
            endpoints::PLAY_CONTROL,
            json!({ "match": "none", "zone": ZONE, "mode_shuffle": shuffle }),
        )
        .await
    }

    /// Set the repeat mode
    pub async fn set_repeat(&self, repeat: RepeatMode) -> Result<()> {
        self.command(
            endpoints::PLAY_CONTROL,
            json!({ "match": "none", "zone": ZONE, "mode_repeat": repeat }),
        )
        .await
    }

    /// Apply custom user EQ bands.
    ///
    /// Gains must stay within the device's accepted range of
    /// [`EQ_GAIN_MIN`] to [`EQ_GAIN_MAX`] dB.
    pub async fn set_equalizer_params(&self, bands: &[EqBand]) -> Result<()> {
        for band in bands {
            if let Some(gain) = band.gain {
                if !(EQ_GAIN_MIN..=EQ_GAIN_MAX).contains(&gain) {
                    return Err(StreamMagicError::InvalidParameter(format!(
                        "EQ gain {} on band {} out of range ({} to {})",
                        gain, band.index, EQ_GAIN_MIN, EQ_GAIN_MAX
                    )));
                }
            }
        }
        self.command(
            endpoints::AUDIO,
            json!({ "zone": ZONE, "user_eq_params": util::eq_bands_to_param_string(bands) }),
        )
        .await
    }

    /// Apply one of the named EQ presets from [`crate::EQ_PRESETS`]
    pub async fn set_equalizer_preset(&self, name: &str) -> Result<()> {
        let gains = models::eq_preset(name).ok_or_else(|| {
            StreamMagicError::InvalidParameter(format!("unknown EQ preset: {}", name))
        })?;
        let bands: Vec<EqBand> = gains
            .iter()
            .enumerate()
            .map(|(index, gain)| EqBand {
                index: index as u32,
                filter: None,
                freq: None,
                gain: Some(*gain),
                q: None,
            })
            .collect();
        self.set_equalizer_params(&bands).await
    }
}
