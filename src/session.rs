use crate::backoff::Backoff;
use crate::connection::Link;
use crate::endpoints;
use crate::error::{Result, StreamMagicError};
use crate::models::{Info, NowPlaying, PlayState, Source, State};
use crate::protocol::Message;
use crate::subscription::UpdateHandler;
use crate::transport::Connector;
use futures_util::future::{join_all, try_join_all, BoxFuture};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no reconnection pending
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// Connected, initial state fetched, subscriptions active
    Connected,
    /// Connection was lost; a retry is scheduled
    Reconnecting,
}

/// Events delivered to registered observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A resource snapshot changed
    StateChanged,
    /// Connectivity changed
    ConnectionChanged(ConnectionState),
}

/// Handle returned by observer registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

pub(crate) type Observer = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// Latest known device state, replaced wholesale on every reconnect
#[derive(Default)]
struct Snapshot {
    info: Option<Info>,
    sources: Vec<Source>,
    state: Option<State>,
    play_state: Option<PlayState>,
    now_playing: Option<NowPlaying>,
    position_last_updated: Option<Instant>,
}

/// The tracked resources whose snapshots the session maintains
#[derive(Clone, Copy)]
enum Tracked {
    Info,
    Sources,
    State,
    PlayState,
    Position,
    NowPlaying,
}

#[derive(Deserialize)]
pub(crate) struct SourcesPayload {
    pub(crate) sources: Vec<Source>,
}

/// Extract and deserialize the `params.data` body of a response
pub(crate) fn payload<T: serde::de::DeserializeOwned>(message: &Message) -> Result<T> {
    let data = message.data().ok_or_else(|| {
        StreamMagicError::InvalidResponse(format!("no data in response for {}", message.path))
    })?;
    serde_json::from_value(data.clone()).map_err(|err| {
        StreamMagicError::InvalidResponse(format!(
            "unexpected payload for {}: {}",
            message.path, err
        ))
    })
}

/// The connection state machine.
///
/// Owns exactly one [`Link`] at a time, the reconnection supervisor task,
/// the subscription handler registry (which outlives individual
/// connections), the observer registry, and the public state snapshot.
pub(crate) struct Session {
    connector: Box<dyn Connector>,
    weak: Weak<Session>,
    snapshot: Mutex<Snapshot>,
    observers: Mutex<Vec<(ObserverId, Observer)>>,
    next_observer_id: AtomicU64,
    subscriptions: Arc<Mutex<HashMap<String, UpdateHandler>>>,
    link: Mutex<Option<Arc<Link>>>,
    supervisor: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    status: watch::Sender<ConnectionState>,
}

impl Session {
    pub(crate) fn new(connector: Box<dyn Connector>) -> Arc<Self> {
        let (status, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new_cyclic(|weak| Self {
            connector,
            weak: weak.clone(),
            snapshot: Mutex::new(Snapshot::default()),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(0),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            link: Mutex::new(None),
            supervisor: tokio::sync::Mutex::new(None),
            status,
        })
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Start the reconnection supervisor and wait for the first attempt.
    ///
    /// Idempotent: while a supervisor is running, further callers wait for
    /// the in-flight attempt to settle instead of starting another one.
    pub(crate) async fn connect(self: &Arc<Self>) -> Result<()> {
        let mut supervisor = self.supervisor.lock().await;
        if let Some(task) = supervisor.as_ref() {
            if !task.is_finished() {
                drop(supervisor);
                let mut status = self.status.subscribe();
                let settled = status
                    .wait_for(|state| {
                        matches!(
                            state,
                            ConnectionState::Connected | ConnectionState::Disconnected
                        )
                    })
                    .await;
                return match settled {
                    Ok(state) if *state == ConnectionState::Connected => Ok(()),
                    _ => Err(StreamMagicError::ConnectionLost),
                };
            }
        }

        let (first_tx, first_rx) = oneshot::channel();
        self.status.send_replace(ConnectionState::Connecting);
        let session = Arc::clone(self);
        *supervisor = Some(tokio::spawn(session.run_supervisor(first_tx)));
        drop(supervisor);

        first_rx.await.map_err(|_| StreamMagicError::ConnectionLost)?
    }

    /// Stop the supervisor, tear down the current connection, and fail all
    /// in-flight requests and subscriptions. Safe to call when not
    /// connected.
    pub(crate) async fn disconnect(&self) {
        let mut supervisor = self.supervisor.lock().await;
        let Some(task) = supervisor.take() else {
            return;
        };
        if task.is_finished() && self.connection_state() == ConnectionState::Disconnected {
            return;
        }
        task.abort();
        let _ = task.await;

        if let Some(link) = self.link.lock().unwrap().take() {
            link.shutdown();
        }
        self.status.send_replace(ConnectionState::Disconnected);
        drop(supervisor);

        self.notify(Event::ConnectionChanged(ConnectionState::Disconnected))
            .await;
    }

    /// Retry loop around connection establishment. The first-ever attempt
    /// failing is terminal and surfaces to the original `connect()` caller;
    /// after a first success, losses retry indefinitely with backoff until
    /// `disconnect()`.
    async fn run_supervisor(self: Arc<Self>, first: oneshot::Sender<Result<()>>) {
        let mut first = Some(first);
        let mut backoff = Backoff::new();
        loop {
            match self.establish().await {
                Ok(link) => {
                    backoff.reset();
                    self.status.send_replace(ConnectionState::Connected);
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Ok(()));
                    }
                    self.notify(Event::ConnectionChanged(ConnectionState::Connected))
                        .await;
                    self.notify(Event::StateChanged).await;

                    link.wait_closed().await;
                    tracing::warn!("Connection lost, scheduling reconnect");
                    link.shutdown();
                    *self.link.lock().unwrap() = None;
                    self.status.send_replace(ConnectionState::Reconnecting);
                    self.notify(Event::ConnectionChanged(ConnectionState::Reconnecting))
                        .await;
                }
                Err(err) => {
                    if let Some(tx) = first.take() {
                        self.status.send_replace(ConnectionState::Disconnected);
                        let _ = tx.send(Err(err));
                        return;
                    }
                    tracing::warn!("Reconnect attempt failed: {}", err);
                    self.status.send_replace(ConnectionState::Reconnecting);
                    self.notify(Event::ConnectionChanged(ConnectionState::Reconnecting))
                        .await;
                }
            }
            tokio::time::sleep(backoff.next_delay()).await;
            self.status.send_replace(ConnectionState::Connecting);
        }
    }

    /// One connection attempt: open a transport, start the read loop, fetch
    /// the tracked resources, replay the subscription set, then publish the
    /// snapshot.
    async fn establish(self: &Arc<Self>) -> Result<Arc<Link>> {
        let transport = self.connector.connect().await?;
        let link = Link::spawn(transport, Arc::clone(&self.subscriptions));
        *self.link.lock().unwrap() = Some(Arc::clone(&link));

        match self.initialize(&link).await {
            Ok(()) => Ok(link),
            Err(err) => {
                link.shutdown();
                *self.link.lock().unwrap() = None;
                Err(err)
            }
        }
    }

    async fn initialize(self: &Arc<Self>, link: &Arc<Link>) -> Result<()> {
        let (info, sources, state, play_state, now_playing) = tokio::try_join!(
            link.request(endpoints::INFO, Value::Null, None),
            link.request(endpoints::SOURCES, Value::Null, None),
            link.request(endpoints::ZONE_STATE, Value::Null, None),
            link.request(endpoints::PLAY_STATE, Value::Null, None),
            link.request(endpoints::NOW_PLAYING, Value::Null, None),
        )?;
        let info: Info = payload(&info)?;
        let sources = payload::<SourcesPayload>(&sources)?.sources;
        let state: State = payload(&state)?;
        let play_state: PlayState = payload(&play_state)?;
        let now_playing: NowPlaying = payload(&now_playing)?;

        self.install_snapshot_handlers();
        let paths: Vec<String> = self
            .subscriptions
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        try_join_all(paths.into_iter().map(|path| {
            let link = Arc::clone(link);
            async move {
                link.subscribe(&path).await.map_err(|err| match err {
                    StreamMagicError::DeviceRejected { code, message } => {
                        StreamMagicError::SubscriptionRejected {
                            path: path.clone(),
                            code,
                            message,
                        }
                    }
                    other => other,
                })
            }
        }))
        .await?;

        let mut snapshot = self.snapshot.lock().unwrap();
        snapshot.info = Some(info);
        snapshot.sources = sources;
        snapshot.state = Some(state);
        snapshot.play_state = Some(play_state);
        snapshot.now_playing = Some(now_playing);
        snapshot.position_last_updated = Some(Instant::now());
        Ok(())
    }

    /// (Re)register the built-in handlers that keep the snapshot current.
    /// Runs on every establish, so a user handler that displaced one of
    /// them lasts only until the next reconnect.
    fn install_snapshot_handlers(&self) {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        for (path, tracked) in [
            (endpoints::INFO, Tracked::Info),
            (endpoints::SOURCES, Tracked::Sources),
            (endpoints::ZONE_STATE, Tracked::State),
            (endpoints::PLAY_STATE, Tracked::PlayState),
            (endpoints::POSITION, Tracked::Position),
            (endpoints::NOW_PLAYING, Tracked::NowPlaying),
        ] {
            subscriptions.insert(path.to_string(), self.snapshot_handler(tracked));
        }
    }

    fn snapshot_handler(&self, tracked: Tracked) -> UpdateHandler {
        let weak = self.weak.clone();
        Arc::new(move |message: Message| -> BoxFuture<'static, ()> {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(session) = weak.upgrade() {
                    session.apply_update(tracked, message).await;
                }
            })
        })
    }

    /// Apply one push update to the snapshot and notify observers. An
    /// update without a data body leaves the snapshot unchanged.
    async fn apply_update(&self, tracked: Tracked, message: Message) {
        {
            let mut snapshot = self.snapshot.lock().unwrap();
            match (tracked, message.data()) {
                (Tracked::Info, Some(data)) => match serde_json::from_value(data.clone()) {
                    Ok(info) => snapshot.info = Some(info),
                    Err(err) => tracing::warn!("Ignoring bad info update: {}", err),
                },
                (Tracked::Sources, Some(data)) => {
                    match serde_json::from_value::<SourcesPayload>(data.clone()) {
                        Ok(payload) => snapshot.sources = payload.sources,
                        Err(err) => tracing::warn!("Ignoring bad sources update: {}", err),
                    }
                }
                (Tracked::State, Some(data)) => match serde_json::from_value(data.clone()) {
                    Ok(state) => snapshot.state = Some(state),
                    Err(err) => tracing::warn!("Ignoring bad state update: {}", err),
                },
                (Tracked::PlayState, Some(data)) => match serde_json::from_value(data.clone()) {
                    Ok(play_state) => {
                        snapshot.play_state = Some(play_state);
                        snapshot.position_last_updated = Some(Instant::now());
                    }
                    Err(err) => tracing::warn!("Ignoring bad play state update: {}", err),
                },
                (Tracked::Position, Some(data)) => {
                    if let Some(position) = data.get("position").and_then(Value::as_u64) {
                        if let Some(play_state) = snapshot.play_state.as_mut() {
                            play_state.position = Some(position);
                            snapshot.position_last_updated = Some(Instant::now());
                        }
                    }
                }
                (Tracked::NowPlaying, Some(data)) => match serde_json::from_value(data.clone()) {
                    Ok(now_playing) => snapshot.now_playing = Some(now_playing),
                    Err(err) => tracing::warn!("Ignoring bad now playing update: {}", err),
                },
                (_, None) => {}
            }
        }
        self.notify(Event::StateChanged).await;
    }

    /// Invoke every registered observer concurrently and wait for all of
    /// them. The registry is snapshotted first, so observers registered or
    /// removed during a notification take effect on the next one.
    pub(crate) async fn notify(&self, event: Event) {
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        if observers.is_empty() {
            return;
        }
        join_all(observers.iter().map(|observer| observer(event))).await;
    }

    pub(crate) async fn register_observer(&self, observer: Observer) -> ObserverId {
        let id = ObserverId(self.next_observer_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap()
            .push((id, Arc::clone(&observer)));
        // Late registrants on a live session get the current state at once
        if self.is_connected() {
            observer(Event::StateChanged).await;
        }
        id
    }

    pub(crate) fn unregister_observer(&self, id: ObserverId) {
        self.observers
            .lock()
            .unwrap()
            .retain(|(observer_id, _)| *observer_id != id);
    }

    pub(crate) fn clear_observers(&self) {
        self.observers.lock().unwrap().clear();
    }

    pub(crate) async fn request(
        &self,
        path: &str,
        params: Value,
        limit: Option<Duration>,
    ) -> Result<Message> {
        let link = { self.link.lock().unwrap().clone() };
        let link = link.ok_or(StreamMagicError::NotConnected)?;
        link.request(path, params, limit).await
    }

    /// Register a push handler for `path` and ask the device for updates.
    /// Replaces any existing subscription on the path; rolled back if the
    /// device refuses.
    pub(crate) async fn subscribe(&self, path: &str, handler: UpdateHandler) -> Result<()> {
        let link = { self.link.lock().unwrap().clone() };
        let link = link.ok_or(StreamMagicError::NotConnected)?;
        self.subscriptions
            .lock()
            .unwrap()
            .insert(path.to_string(), handler);
        if let Err(err) = link.subscribe(path).await {
            self.subscriptions.lock().unwrap().remove(path);
            return Err(err);
        }
        Ok(())
    }

    /// Remove the subscription for `path`, if any; idempotent
    pub(crate) fn unsubscribe(&self, path: &str) {
        self.subscriptions.lock().unwrap().remove(path);
        if let Some(link) = self.link.lock().unwrap().as_ref() {
            link.remove_subscriber(path);
        }
    }

    pub(crate) fn info(&self) -> Option<Info> {
        self.snapshot.lock().unwrap().info.clone()
    }

    pub(crate) fn sources(&self) -> Vec<Source> {
        self.snapshot.lock().unwrap().sources.clone()
    }

    pub(crate) fn state(&self) -> Option<State> {
        self.snapshot.lock().unwrap().state.clone()
    }

    pub(crate) fn play_state(&self) -> Option<PlayState> {
        self.snapshot.lock().unwrap().play_state.clone()
    }

    pub(crate) fn now_playing(&self) -> Option<NowPlaying> {
        self.snapshot.lock().unwrap().now_playing.clone()
    }

    pub(crate) fn position_last_updated(&self) -> Option<Instant> {
        self.snapshot.lock().unwrap().position_last_updated
    }
}
