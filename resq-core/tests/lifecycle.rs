//! Lifecycle tests for reconnect timing, rate buckets and disposal, driven
//! through a scripted transport on a paused clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use resq_core::{
    AnalysisStatus, ConnectionState, Payload, Session, StreamClient, StreamConfig, StreamError,
    StreamObservation, Transport,
};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

const DELAY: Duration = Duration::from_millis(2000);

// ── Scripted transport ───────────────────────────────────────────

enum Plan {
    Refuse,
    Accept(mpsc::UnboundedReceiver<Result<Payload, StreamError>>),
}

#[derive(Default)]
struct Script {
    plans: Mutex<VecDeque<Plan>>,
    opens: Mutex<Vec<Instant>>,
    /// Sessions open or being opened right now.
    live: AtomicUsize,
    max_live: AtomicUsize,
    closes: AtomicUsize,
}

/// Transport whose open results are queued up front by the test. Once
/// the queue is empty every open is refused.
#[derive(Clone, Default)]
struct ScriptedTransport(Arc<Script>);

/// Test-side handle feeding one accepted session.
struct Feed(mpsc::UnboundedSender<Result<Payload, StreamError>>);

impl Feed {
    fn text(&self, text: &str) {
        self.0.send(Ok(Payload::Text(text.to_string()))).unwrap();
    }

    fn fail(&self) {
        self.0.send(Err("connection reset".into())).unwrap();
    }
}

impl ScriptedTransport {
    fn accept(&self) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.0.plans.lock().unwrap().push_back(Plan::Accept(rx));
        Feed(tx)
    }

    fn refuse(&self) {
        self.0.plans.lock().unwrap().push_back(Plan::Refuse);
    }

    fn opens(&self) -> Vec<Instant> {
        self.0.opens.lock().unwrap().clone()
    }

    fn live(&self) -> usize {
        self.0.live.load(Ordering::SeqCst)
    }

    fn max_live(&self) -> usize {
        self.0.max_live.load(Ordering::SeqCst)
    }

    fn closes(&self) -> usize {
        self.0.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _endpoint: &str) -> Result<Box<dyn Session>, StreamError> {
        self.0.opens.lock().unwrap().push(Instant::now());
        let live = self.0.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.max_live.fetch_max(live, Ordering::SeqCst);

        let plan = self.0.plans.lock().unwrap().pop_front();
        match plan {
            Some(Plan::Accept(rx)) => Ok(Box::new(ScriptedSession {
                rx,
                script: Arc::clone(&self.0),
            })),
            Some(Plan::Refuse) | None => {
                self.0.live.fetch_sub(1, Ordering::SeqCst);
                Err("connection refused".into())
            }
        }
    }
}

struct ScriptedSession {
    rx: mpsc::UnboundedReceiver<Result<Payload, StreamError>>,
    script: Arc<Script>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn next_payload(&mut self) -> Option<Result<Payload, StreamError>> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.rx.close();
        self.script.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.script.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn start(transport: &ScriptedTransport) -> StreamClient {
    let config = StreamConfig::new("ws://robot.test:8765").with_reconnect_delay(DELAY);
    assert_ok!(StreamClient::spawn_with_transport(config, transport.clone()))
}

/// Wait until the observation satisfies `f` and return it.
async fn wait_until(
    rx: &mut watch::Receiver<StreamObservation>,
    f: impl FnMut(&StreamObservation) -> bool,
) -> StreamObservation {
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(f))
        .await
        .expect("timeout")
        .expect("client dropped")
        .clone()
}

fn frame_seq(obs: &StreamObservation) -> u64 {
    obs.frame.as_ref().map_or(0, |f| f.sequence())
}

fn assert_gaps(opens: &[Instant], delay: Duration) {
    for pair in opens.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= delay, "retry after {gap:?}, before the {delay:?} delay");
        assert!(
            gap < delay + Duration::from_millis(50),
            "retry after {gap:?}, long after the {delay:?} delay"
        );
    }
}

// ── Connection state machine ─────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unreachable_endpoint_retries_every_delay() {
    let transport = ScriptedTransport::default();
    let client = start(&transport);

    tokio::time::sleep(Duration::from_millis(10_500)).await;

    let opens = transport.opens();
    assert_eq!(opens.len(), 6, "attempts at 0, 2, 4, 6, 8 and 10 s");
    assert_gaps(&opens, DELAY);
    assert_eq!(transport.max_live(), 1);

    assert_eq!(client.observation(), StreamObservation::default());
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn single_attempt_across_close_refuse_and_error() {
    let transport = ScriptedTransport::default();
    let first = transport.accept();
    transport.refuse();
    let second = transport.accept();

    let client = start(&transport);
    let mut rx = client.subscribe();

    wait_until(&mut rx, |o| o.connected).await;
    first.text(r#"{"frame":"AAAA","victim":true,"ai_status":"scanning"}"#);
    wait_until(&mut rx, |o| frame_seq(o) == 1).await;

    // Clean close: state is kept, only `connected` drops.
    drop(first);
    let stale = wait_until(&mut rx, |o| !o.connected).await;
    assert_eq!(frame_seq(&stale), 1);
    assert!(stale.victim_detected);
    assert_eq!(stale.analysis_status, AnalysisStatus::Scanning);

    // Refused once, then accepted on the attempt after.
    wait_until(&mut rx, |o| o.connected).await;
    assert_eq!(transport.opens().len(), 3);

    // Transport error is handled like a close.
    second.fail();
    wait_until(&mut rx, |o| !o.connected).await;
    assert_eq!(transport.closes(), 1);

    tokio::time::sleep(Duration::from_millis(4_500)).await;

    let opens = transport.opens();
    assert_eq!(opens.len(), 5);
    assert_eq!(transport.max_live(), 1);
    assert_eq!(transport.live(), 0);
    assert_eq!(frame_seq(&client.observation()), 1);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn state_receiver_sees_transitions() {
    let transport = ScriptedTransport::default();
    let feed = transport.accept();
    let client = start(&transport);
    let mut states = client.state_receiver();

    let connected = states.wait_for(|s| s.is_connected()).await.map(|s| *s);
    assert_eq!(connected.unwrap(), ConnectionState::Connected);

    drop(feed);
    let down = states.wait_for(|s| s.is_disconnected()).await.map(|s| *s);
    assert_eq!(down.unwrap(), ConnectionState::Disconnected);

    tokio::time::sleep(DELAY + Duration::from_millis(100)).await;
    assert_eq!(transport.opens().len(), 2);

    client.shutdown().await;
}

// ── Decoding through the client ──────────────────────────────────

#[tokio::test(start_paused = true)]
async fn structured_frame_with_detection() {
    let transport = ScriptedTransport::default();
    let feed = transport.accept();
    let client = start(&transport);
    let mut rx = client.subscribe();

    wait_until(&mut rx, |o| o.connected).await;
    feed.text(r#"{"frame":"/9j/4AAQ","victim":true}"#);

    let obs = wait_until(&mut rx, |o| o.frame.is_some()).await;
    assert!(obs.connected);
    assert!(obs.victim_detected);
    assert_eq!(obs.analysis_status, AnalysisStatus::Idle);
    assert_eq!(
        obs.frame.unwrap().data_uri(),
        "data:image/jpeg;base64,/9j/4AAQ"
    );

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn legacy_payload_only_replaces_frame() {
    let transport = ScriptedTransport::default();
    let feed = transport.accept();
    let client = start(&transport);
    let mut rx = client.subscribe();

    wait_until(&mut rx, |o| o.connected).await;
    feed.text(r#"{"victim":true,"ai_status":"cooldown","ai_response":"two people"}"#);
    let before = wait_until(&mut rx, |o| o.victim_detected).await;

    feed.text("/9j/4AAQSkZJRgABAQ");
    let after = wait_until(&mut rx, |o| o.frame.is_some()).await;

    assert_eq!(after.frame.unwrap().as_base64(), "/9j/4AAQSkZJRgABAQ");
    assert_eq!(after.victim_detected, before.victim_detected);
    assert_eq!(after.analysis_status, before.analysis_status);
    assert_eq!(after.analysis_narrative, "two people");

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn status_only_record_is_a_partial_update() {
    let transport = ScriptedTransport::default();
    let feed = transport.accept();
    let client = start(&transport);
    let mut rx = client.subscribe();

    wait_until(&mut rx, |o| o.connected).await;
    feed.text(r#"{"frame":"AAAA","victim":true,"ai_response":"searching"}"#);
    let before = wait_until(&mut rx, |o| o.frame.is_some()).await;

    feed.text(r#"{"ai_status":"thermal-sweep"}"#);
    let after = wait_until(&mut rx, |o| o.analysis_status != AnalysisStatus::Idle).await;

    assert_eq!(
        after.analysis_status,
        AnalysisStatus::Unknown("thermal-sweep".into())
    );
    assert_eq!(after.frame, before.frame);
    assert_eq!(after.victim_detected, before.victim_detected);
    assert_eq!(after.analysis_narrative, before.analysis_narrative);

    client.shutdown().await;
}

// ── Frame-rate accounting ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rate_reports_bucket_then_zero() {
    let transport = ScriptedTransport::default();
    let feed = transport.accept();
    let client = start(&transport);
    let mut rx = client.subscribe();

    wait_until(&mut rx, |o| o.connected).await;
    for _ in 0..15 {
        feed.text(r#"{"frame":"AAAA"}"#);
    }
    wait_until(&mut rx, |o| frame_seq(o) == 15).await;

    let mut seen = Vec::new();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    seen.push(client.observation().frames_per_second);
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    seen.push(client.observation().frames_per_second);
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    seen.push(client.observation().frames_per_second);

    assert_eq!(seen, vec![15, 0, 0]);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn every_arrival_counts_toward_rate() {
    let transport = ScriptedTransport::default();
    let feed = transport.accept();
    let client = start(&transport);
    let mut rx = client.subscribe();

    wait_until(&mut rx, |o| o.connected).await;
    feed.text("{}");
    feed.text(r#"{"unrelated":1}"#);
    feed.text(r#"{"victim":false}"#);
    feed.text("raw-frame");
    wait_until(&mut rx, |o| o.frame.is_some()).await;

    let obs = wait_until(&mut rx, |o| o.frames_per_second > 0).await;
    assert_eq!(obs.frames_per_second, 4);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rate_decays_while_disconnected() {
    let transport = ScriptedTransport::default();
    let feed = transport.accept();
    let client = start(&transport);
    let mut rx = client.subscribe();

    wait_until(&mut rx, |o| o.connected).await;
    feed.text("AAAA");
    feed.text("BBBB");
    wait_until(&mut rx, |o| frame_seq(o) == 2).await;
    drop(feed);
    wait_until(&mut rx, |o| !o.connected).await;

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(client.observation().frames_per_second, 2);
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(client.observation().frames_per_second, 0);

    client.shutdown().await;
}

// ── Disposal ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn dispose_while_reconnect_pending() {
    let transport = ScriptedTransport::default();
    let client = start(&transport);

    // First attempt is refused; the worker is now inside the delay.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.opens().len(), 1);

    let mut states = client.state_receiver();
    client.dispose();

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(transport.opens().len(), 1);
    assert!(!states.has_changed().unwrap());
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn queued_message_after_dispose_is_a_no_op() {
    let transport = ScriptedTransport::default();
    let feed = transport.accept();
    let client = start(&transport);
    let mut rx = client.subscribe();

    wait_until(&mut rx, |o| o.connected).await;

    // Queued before disposal, delivered after it.
    feed.text(r#"{"frame":"AAAA","victim":true}"#);
    client.dispose();

    tokio::time::sleep(Duration::from_secs(5)).await;

    let obs = client.observation();
    assert!(obs.frame.is_none());
    assert!(!obs.victim_detected);
    assert_eq!(obs.frames_per_second, 0);
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert!(!rx.has_changed().unwrap());

    assert_eq!(transport.closes(), 1);
    assert_eq!(transport.live(), 0);
    assert_eq!(transport.opens().len(), 1);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dispose_is_idempotent() {
    let transport = ScriptedTransport::default();
    let client = start(&transport);

    assert!(!client.is_disposed());
    client.dispose();
    client.dispose();
    assert!(client.is_disposed());

    client.shutdown().await;
    assert!(transport.opens().len() <= 1);
}

#[tokio::test(start_paused = true)]
async fn drop_disposes() {
    let transport = ScriptedTransport::default();
    let feed = transport.accept();
    let client = start(&transport);
    let mut rx = client.subscribe();

    wait_until(&mut rx, |o| o.connected).await;
    drop(client);

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(transport.opens().len(), 1);
    assert_eq!(transport.live(), 0);
    assert_eq!(transport.closes(), 1);
    assert!(feed.0.is_closed());
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let config = StreamConfig::default().with_reconnect_delay(Duration::ZERO);
    let err = assert_err!(StreamClient::spawn_with_transport(
        config,
        ScriptedTransport::default()
    ));
    assert!(matches!(err, StreamError::InvalidConfig(_)));
}
