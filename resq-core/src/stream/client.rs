//! Live stream client.
//!
//! A [`StreamClient`] owns one background worker that loops
//! connect → receive → (close → fixed delay → reconnect) until the
//! client is disposed. The worker publishes a [`StreamObservation`] and
//! the raw [`ConnectionState`] through `tokio::sync::watch` channels so
//! presentation code can read the latest state without blocking the
//! receive loop.
//!
//! Every publication goes through a gate that [`StreamClient::dispose`]
//! closes under the same lock, so once `dispose` has returned nothing
//! the worker does can reach subscribers, even if it was already in the
//! middle of handling an event.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::StreamError;
use crate::state::ConnectionState;
use crate::stream::decoder;
use crate::stream::rate::{RATE_WINDOW, RateCounter};
use crate::stream::transport::{Payload, Session, Transport, WebSocketTransport};
use crate::stream::types::StreamObservation;

/// Endpoint of a perception process running next to the dashboard.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8765";
/// Delay between a disconnect and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2000);
/// How long a graceful close may take on disposal before the socket is
/// simply dropped.
const CLOSE_GRACE: Duration = Duration::from_millis(250);

// ── StreamConfig ─────────────────────────────────────────────────

/// Connection settings for a [`StreamClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Websocket URL of the stream sender.
    pub endpoint: String,
    /// Fixed delay before every reconnect attempt.
    pub reconnect_delay: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl StreamConfig {
    /// Config for `endpoint` with the default reconnect delay.
    pub fn new(endpoint: impl AsRef<str>) -> Self {
        Self::default().with_endpoint(endpoint)
    }

    /// Sets the endpoint. A bare `host:port` gets a `ws://` scheme.
    pub fn with_endpoint(mut self, endpoint: impl AsRef<str>) -> Self {
        self.endpoint = normalize_endpoint(endpoint.as_ref());
        self
    }

    /// Sets the fixed delay before each reconnect attempt.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Same as [`with_reconnect_delay`](Self::with_reconnect_delay), in milliseconds.
    pub fn with_reconnect_delay_ms(self, delay_ms: u64) -> Self {
        self.with_reconnect_delay(Duration::from_millis(delay_ms))
    }

    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.endpoint.trim().is_empty() {
            return Err(StreamError::InvalidConfig("endpoint is empty".into()));
        }
        if self.reconnect_delay.is_zero() {
            return Err(StreamError::InvalidConfig(
                "reconnect delay must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Trim `raw` and add a `ws://` scheme when it has none.
pub fn normalize_endpoint(raw: &str) -> String {
    let endpoint = raw.trim();
    if endpoint.is_empty() || endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    }
}

// ── Shared ───────────────────────────────────────────────────────

/// Publication side of the watch channels, behind the disposal gate.
struct Shared {
    /// `true` once disposed.
    gate: Mutex<bool>,
    observation: watch::Sender<StreamObservation>,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn new() -> Self {
        Self {
            gate: Mutex::new(false),
            observation: watch::Sender::new(StreamObservation::default()),
            state: watch::Sender::new(ConnectionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the gate. Returns `true` only for the first call.
    fn close(&self) -> bool {
        let mut disposed = self.lock();
        !std::mem::replace(&mut *disposed, true)
    }

    fn is_closed(&self) -> bool {
        *self.lock()
    }

    /// Mutate the observation unless disposed. `f` returns whether it
    /// changed anything; subscribers are only woken if it did.
    ///
    /// Returns `false` when the gate is closed.
    fn observe(&self, f: impl FnOnce(&mut StreamObservation) -> bool) -> bool {
        let disposed = self.lock();
        if *disposed {
            return false;
        }
        self.observation.send_if_modified(f);
        true
    }

    /// Publish a connection state unless disposed.
    fn set_state(&self, state: ConnectionState) -> bool {
        let disposed = self.lock();
        if *disposed {
            return false;
        }
        self.state.send_replace(state);
        let connected = state.is_connected();
        self.observation.send_if_modified(|obs| {
            let changed = obs.connected != connected;
            obs.connected = connected;
            changed
        });
        true
    }
}

// ── StreamClient ─────────────────────────────────────────────────

/// Receive-only client for the robot's camera/telemetry stream.
///
/// Live from construction until [`dispose`](Self::dispose) (or drop).
/// Connection failures never surface as errors: `connected` goes false
/// and the client retries every `reconnect_delay`, forever.
pub struct StreamClient {
    config: StreamConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StreamClient {
    /// Start a websocket client.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: StreamConfig) -> Result<Self, StreamError> {
        Self::spawn_with_transport(config, WebSocketTransport)
    }

    /// Start a client over a custom transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_with_transport<T: Transport>(
        config: StreamConfig,
        transport: T,
    ) -> Result<Self, StreamError> {
        config.validate()?;

        let shared = Arc::new(Shared::new());
        let cancel = CancellationToken::new();

        let worker = Worker {
            endpoint: config.endpoint.clone(),
            reconnect_delay: config.reconnect_delay,
            transport: Arc::new(transport),
            shared: Arc::clone(&shared),
            cancel: cancel.clone(),
            state: ConnectionState::Disconnected,
            rate: RateCounter::new(),
        };
        let handle = tokio::spawn(worker.run());

        Ok(Self {
            config,
            shared,
            cancel,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Settings the client was spawned with.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Snapshot of the latest observation.
    pub fn observation(&self) -> StreamObservation {
        self.shared.observation.borrow().clone()
    }

    /// Receiver that is notified on every observation change.
    pub fn subscribe(&self) -> watch::Receiver<StreamObservation> {
        self.shared.observation.subscribe()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that is notified on every connection-state transition.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Stop the client.
    ///
    /// Closes the active transport, cancels any pending reconnect and the
    /// rate timer, and freezes the published state as it is. Safe to call
    /// any number of times.
    pub fn dispose(&self) {
        if self.shared.close() {
            info!(endpoint = %self.config.endpoint, "stream client disposed");
        }
        self.cancel.cancel();
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Dispose and wait for the background worker to exit.
    pub async fn shutdown(self) {
        self.dispose();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("stream worker ended abnormally: {e}");
            }
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("config", &self.config)
            .field("state", &self.connection_state())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ── Worker ───────────────────────────────────────────────────────

enum Outcome {
    /// The session ended; schedule a reconnect.
    Closed,
    /// The client was disposed; stop.
    Cancelled,
}

/// Background task owning the transport session, the reconnect delay
/// and the rate timer. Only one session exists at a time.
struct Worker {
    endpoint: String,
    reconnect_delay: Duration,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    state: ConnectionState,
    rate: RateCounter,
}

impl Worker {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + RATE_WINDOW, RATE_WINDOW);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if !self.transition(ConnectionState::begin_connect) {
                break;
            }
            debug!(endpoint = %self.endpoint, "connecting");

            let outcome = match self.open(&mut ticker).await {
                Some(Ok(session)) => self.receive(session, &mut ticker).await,
                Some(Err(e)) => {
                    warn!(endpoint = %self.endpoint, "connect failed: {e}");
                    Outcome::Closed
                }
                None => Outcome::Cancelled,
            };

            if matches!(outcome, Outcome::Cancelled)
                || !self.transition(ConnectionState::finish_disconnect)
            {
                break;
            }
            info!(
                endpoint = %self.endpoint,
                "disconnected; reconnecting in {:?}", self.reconnect_delay
            );

            if !self.wait(self.reconnect_delay, &mut ticker).await {
                break;
            }
        }

        debug!(endpoint = %self.endpoint, "stream worker stopped");
    }

    /// Open a session while keeping the rate timer running.
    ///
    /// `None` if cancelled first.
    async fn open(
        &mut self,
        ticker: &mut Interval,
    ) -> Option<Result<Box<dyn Session>, StreamError>> {
        let transport = Arc::clone(&self.transport);
        let endpoint = self.endpoint.clone();
        let open = transport.open(&endpoint);
        tokio::pin!(open);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                _ = ticker.tick() => self.report_rate(),
                result = &mut open => return Some(result),
            }
        }
    }

    /// Pump messages until the session ends or the client is disposed.
    async fn receive(&mut self, mut session: Box<dyn Session>, ticker: &mut Interval) -> Outcome {
        if !self.transition(ConnectionState::complete_connect) {
            close_session(session.as_mut()).await;
            return Outcome::Cancelled;
        }
        info!(endpoint = %self.endpoint, "connected");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    close_session(session.as_mut()).await;
                    return Outcome::Cancelled;
                }
                _ = ticker.tick() => self.report_rate(),
                next = session.next_payload() => match next {
                    Some(Ok(payload)) => {
                        if !self.dispatch(&payload) {
                            close_session(session.as_mut()).await;
                            return Outcome::Cancelled;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(endpoint = %self.endpoint, "transport error: {e}");
                        close_session(session.as_mut()).await;
                        return Outcome::Closed;
                    }
                    None => return Outcome::Closed,
                },
            }
        }
    }

    /// Sleep for `delay` while keeping the rate timer running.
    ///
    /// `false` if cancelled first.
    async fn wait(&mut self, delay: Duration, ticker: &mut Interval) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                _ = ticker.tick() => self.report_rate(),
                _ = &mut sleep => return true,
            }
        }
    }

    /// Decode one message into the observation and count the arrival.
    ///
    /// `false` if the client has been disposed.
    fn dispatch(&mut self, payload: &Payload) -> bool {
        let update = decoder::decode(payload);
        if update.legacy {
            trace!("legacy frame payload");
        }
        self.rate.record();
        self.shared.observe(|obs| update.apply(obs))
    }

    fn report_rate(&mut self) {
        let fps = self.rate.take();
        self.shared.observe(|obs| {
            let changed = obs.frames_per_second != fps;
            obs.frames_per_second = fps;
            changed
        });
    }

    /// Apply a state transition and publish it.
    ///
    /// `false` if the client has been disposed.
    fn transition(&mut self, step: fn(&mut ConnectionState) -> Result<(), StreamError>) -> bool {
        if let Err(e) = step(&mut self.state) {
            error!(state = %self.state, "{e}");
        }
        self.shared.set_state(self.state)
    }
}

async fn close_session(session: &mut dyn Session) {
    if tokio::time::timeout(CLOSE_GRACE, session.close()).await.is_err() {
        debug!("close did not finish within {CLOSE_GRACE:?}; dropping session");
    }
}

// ── Tests ────────────────────────────────────────────────────────
