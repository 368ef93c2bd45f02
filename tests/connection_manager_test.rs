use async_trait::async_trait;
use dashboard_live::core::reconnect::ReconnectPolicy;
use dashboard_live::domain::model::{
    DisconnectReason, Kpis, Listing, ListingPage, RecordId, TransportEvent,
};
use dashboard_live::domain::ports::{DashboardApi, EventHandler, Session, Transport};
use dashboard_live::utils::error::{AuthSource, LiveError, Result};
use dashboard_live::{
    ConnectionManager, ConnectionOptions, ConnectionReport, ConnectionStatus, Dashboard,
    DashboardEvent, DashboardKind,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Accept,
    Fail,
    Unauthorized,
    // Handshake never completes.
    Hang,
}

/// Transport whose open() results are scripted by the test. Accepted sessions
/// hand their event sender back so the test can push frames or hang up.
#[derive(Clone, Default)]
struct ScriptedTransport {
    outcomes: Arc<Mutex<VecDeque<Outcome>>>,
    opens: Arc<Mutex<Vec<Instant>>>,
    sessions: Arc<Mutex<Vec<mpsc::Sender<TransportEvent>>>>,
    closes: Arc<Mutex<Vec<oneshot::Receiver<()>>>>,
}

impl ScriptedTransport {
    fn with(outcomes: &[Outcome]) -> Self {
        let transport = Self::default();
        transport.push(outcomes);
        transport
    }

    fn push(&self, outcomes: &[Outcome]) {
        self.outcomes.lock().unwrap().extend(outcomes.iter().copied());
    }

    fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().clone()
    }

    fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    fn latest_session(&self) -> mpsc::Sender<TransportEvent> {
        self.sessions
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no session was accepted")
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self) -> Result<Session> {
        self.opens.lock().unwrap().push(Instant::now());
        let outcome = self.outcomes.lock().unwrap().pop_front().unwrap_or(Outcome::Fail);

        match outcome {
            Outcome::Accept => {
                let (tx, rx) = mpsc::channel(32);
                let (close_tx, close_rx) = oneshot::channel();
                self.sessions.lock().unwrap().push(tx);
                self.closes.lock().unwrap().push(close_rx);
                Ok(Session::new(rx, close_tx))
            }
            Outcome::Fail => Err(LiveError::connect("connection refused")),
            Outcome::Unauthorized => Err(LiveError::unauthorized(
                AuthSource::Transport,
                "Not authorized",
            )),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

#[derive(Default)]
struct CountingApi {
    kpi_calls: AtomicUsize,
    unauthorized: AtomicBool,
}

#[async_trait]
impl DashboardApi for CountingApi {
    async fn fetch_kpis(&self) -> Result<Kpis> {
        let n = self.kpi_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(LiveError::unauthorized(AuthSource::Metrics, "HTTP 401"));
        }
        let mut kpis = Kpis::new();
        kpis.insert("poll".to_string(), json!(n));
        Ok(kpis)
    }

    async fn fetch_listings(&self) -> Result<ListingPage> {
        Ok(ListingPage {
            items: Vec::new(),
            total: 0,
        })
    }
}

/// KPI endpoint that takes ten seconds to answer.
#[derive(Default)]
struct SlowApi {
    kpi_calls: AtomicUsize,
}

#[async_trait]
impl DashboardApi for SlowApi {
    async fn fetch_kpis(&self) -> Result<Kpis> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        let n = self.kpi_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut kpis = Kpis::new();
        kpis.insert("slow".to_string(), json!(n));
        Ok(kpis)
    }

    async fn fetch_listings(&self) -> Result<ListingPage> {
        Ok(ListingPage {
            items: Vec::new(),
            total: 0,
        })
    }
}

#[derive(Clone, Default)]
struct RecordingHandler {
    events: Arc<Mutex<Vec<DashboardEvent>>>,
}

impl RecordingHandler {
    fn events(&self) -> Vec<DashboardEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_event(&mut self, event: DashboardEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn options() -> ConnectionOptions {
    ConnectionOptions::new(DashboardKind::Property, "landlord-42")
}

async fn wait_for_status(
    reports: &mut watch::Receiver<ConnectionReport>,
    status: ConnectionStatus,
) -> ConnectionReport {
    reports
        .wait_for(|report| report.status == status)
        .await
        .expect("driver stopped")
        .clone()
}

fn assert_gap(earlier: Instant, later: Instant, expected_ms: u64) {
    let gap = (later - earlier).as_millis() as u64;
    assert!(
        gap >= expected_ms && gap <= expected_ms + 1,
        "expected ~{}ms between attempts, got {}ms",
        expected_ms,
        gap
    );
}

async fn exhaust_reconnects(
    transport: &ScriptedTransport,
    reports: &mut watch::Receiver<ConnectionReport>,
) {
    wait_for_status(reports, ConnectionStatus::Connected).await;
    transport
        .latest_session()
        .send(TransportEvent::Disconnected(DisconnectReason::TransportClose))
        .await
        .unwrap();
    wait_for_status(reports, ConnectionStatus::Polling).await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_delays_then_polling() {
    let transport = ScriptedTransport::with(&[Outcome::Accept]);
    let api = Arc::new(CountingApi::default());
    let manager = ConnectionManager::spawn(
        transport.clone(),
        api.clone(),
        RecordingHandler::default(),
        options(),
    );
    let mut reports = manager.subscribe();

    wait_for_status(&mut reports, ConnectionStatus::Connected).await;
    let dropped_at = Instant::now();
    transport
        .latest_session()
        .send(TransportEvent::Disconnected(DisconnectReason::ServerClose))
        .await
        .unwrap();

    let report = wait_for_status(&mut reports, ConnectionStatus::Polling).await;
    assert_eq!(report.reconnect_attempts, 3);
    assert!(report.last_error.is_some());

    // 1 initial open + 3 reconnect attempts, spaced 1s, 2s, 4s.
    let opens = transport.open_times();
    assert_eq!(opens.len(), 4);
    assert_gap(dropped_at, opens[1], 1000);
    assert_gap(opens[1], opens[2], 2000);
    assert_gap(opens[2], opens[3], 4000);

    // Poller is active: first fetch one interval after polling started.
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(api.kpi_calls.load(Ordering::SeqCst), 1);

    // And the transport is not retried while polling.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 4);
    assert_eq!(api.kpi_calls.load(Ordering::SeqCst), 3);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_polled_kpis_reach_the_same_handler() {
    let transport = ScriptedTransport::with(&[Outcome::Accept]);
    let handler = RecordingHandler::default();
    let manager = ConnectionManager::spawn(
        transport.clone(),
        Arc::new(CountingApi::default()),
        handler.clone(),
        options(),
    );
    let mut reports = manager.subscribe();

    wait_for_status(&mut reports, ConnectionStatus::Connected).await;
    transport
        .latest_session()
        .send(TransportEvent::Event {
            name: "dashboard:kpi_update".to_string(),
            payload: json!({"pushed": true}),
        })
        .await
        .unwrap();

    exhaust_reconnects(&transport, &mut reports).await;
    tokio::time::sleep(Duration::from_secs(31)).await;

    let events = handler.events();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|event| matches!(event, DashboardEvent::KpiUpdate(_))));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_polling_stops_poller() {
    let transport = ScriptedTransport::with(&[Outcome::Accept]);
    let api = Arc::new(CountingApi::default());
    let manager = ConnectionManager::spawn(
        transport.clone(),
        api.clone(),
        RecordingHandler::default(),
        options(),
    );
    let mut reports = manager.subscribe();
    exhaust_reconnects(&transport, &mut reports).await;

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(api.kpi_calls.load(Ordering::SeqCst), 1);

    transport.push(&[Outcome::Accept]);
    manager.refresh().await;
    let report = wait_for_status(&mut reports, ConnectionStatus::Connected).await;
    assert_eq!(report.reconnect_attempts, 0);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(api.kpi_calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_manual_connect_keeps_polling() {
    let transport = ScriptedTransport::with(&[Outcome::Accept]);
    let api = Arc::new(CountingApi::default());
    let manager = ConnectionManager::spawn(
        transport.clone(),
        api.clone(),
        RecordingHandler::default(),
        options(),
    );
    let mut reports = manager.subscribe();
    exhaust_reconnects(&transport, &mut reports).await;

    manager.refresh().await;
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(transport.open_count(), 5);
    assert_eq!(manager.status(), ConnectionStatus::Polling);
    assert_eq!(api.kpi_calls.load(Ordering::SeqCst), 1);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_polling_leaves_no_timer() {
    let transport = ScriptedTransport::with(&[Outcome::Accept]);
    let api = Arc::new(CountingApi::default());
    let handler = RecordingHandler::default();
    let manager = ConnectionManager::spawn(
        transport.clone(),
        api.clone(),
        handler.clone(),
        options(),
    );
    let mut reports = manager.subscribe();
    exhaust_reconnects(&transport, &mut reports).await;

    tokio::time::sleep(Duration::from_secs(31)).await;
    let calls_before = api.kpi_calls.load(Ordering::SeqCst);
    let events_before = handler.events().len();

    manager.shutdown().await;
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(api.kpi_calls.load(Ordering::SeqCst), calls_before);
    assert_eq!(handler.events().len(), events_before);
    assert_eq!(transport.open_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_transport_auth_failure_is_terminal_until_refresh() {
    let transport = ScriptedTransport::with(&[Outcome::Unauthorized]);
    let api = Arc::new(CountingApi::default());
    let manager = ConnectionManager::spawn(
        transport.clone(),
        api.clone(),
        RecordingHandler::default(),
        options(),
    );
    let mut reports = manager.subscribe();

    let report = reports
        .wait_for(|report| report.auth_required)
        .await
        .unwrap()
        .clone();
    assert_eq!(report.status, ConnectionStatus::Disconnected);
    assert!(report.last_error.is_some());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.open_count(), 1);
    assert_eq!(api.kpi_calls.load(Ordering::SeqCst), 0);

    transport.push(&[Outcome::Accept]);
    manager.refresh().await;
    let report = wait_for_status(&mut reports, ConnectionStatus::Connected).await;
    assert!(!report.auth_required);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_poll_auth_failure_stops_poller() {
    let transport = ScriptedTransport::with(&[Outcome::Accept]);
    let api = Arc::new(CountingApi::default());
    api.unauthorized.store(true, Ordering::SeqCst);
    let manager = ConnectionManager::spawn(
        transport.clone(),
        api.clone(),
        RecordingHandler::default(),
        options(),
    );
    let mut reports = manager.subscribe();
    exhaust_reconnects(&transport, &mut reports).await;

    let report = reports
        .wait_for(|report| report.auth_required)
        .await
        .unwrap()
        .clone();
    assert_eq!(report.status, ConnectionStatus::Disconnected);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(api.kpi_calls.load(Ordering::SeqCst), 1);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_disabled_manager_never_connects() {
    let transport = ScriptedTransport::with(&[Outcome::Accept]);
    let manager = ConnectionManager::spawn(
        transport.clone(),
        Arc::new(CountingApi::default()),
        RecordingHandler::default(),
        ConnectionOptions {
            identity: None,
            ..options()
        },
    );

    manager.refresh().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(transport.open_count(), 0);
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_live_events_update_dashboard_in_order() {
    let transport = ScriptedTransport::with(&[Outcome::Accept]);
    let api = Arc::new(CountingApi::default());
    let dashboard = Dashboard::with_shared_api(api.clone());
    let manager = ConnectionManager::spawn(
        transport.clone(),
        api.clone(),
        dashboard.clone(),
        options(),
    );
    let mut reports = manager.subscribe();
    wait_for_status(&mut reports, ConnectionStatus::Connected).await;

    let session = transport.latest_session();
    let frames = [
        ("property:created", json!({"id": 1, "status": "draft", "title": "Corner retail"})),
        ("property:created", json!({"id": 2, "status": "draft"})),
        ("property:status_changed", json!({"id": 1, "status": "active"})),
        ("property:deleted", json!({"id": 2})),
        ("property:deleted", json!({"id": 99})),
        ("broker_listing:created", json!({"id": 3})),
        ("property:created", json!({"oops": true})),
    ];
    for (name, payload) in frames {
        session
            .send(TransportEvent::Event {
                name: name.to_string(),
                payload,
            })
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    let snapshot = dashboard.snapshot().await;
    assert_eq!(snapshot.total, 1);
    assert_eq!(snapshot.listings.len(), 1);
    let listing: &Listing = &snapshot.listings[0];
    assert_eq!(listing.id, RecordId::from(1));
    assert_eq!(listing.status.as_deref(), Some("active"));
    assert_eq!(listing.fields["title"], json!("Corner retail"));

    // created, created, status_changed, deleted each asked for a refresh;
    // requests made during an in-flight fetch are folded into the next one.
    let calls = api.kpi_calls.load(Ordering::SeqCst);
    assert!((1..=4).contains(&calls), "unexpected refresh count {}", calls);
    assert_eq!(snapshot.kpis["poll"], json!(calls));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_client_close_does_not_reconnect() {
    let transport = ScriptedTransport::with(&[Outcome::Accept]);
    let manager = ConnectionManager::spawn(
        transport.clone(),
        Arc::new(CountingApi::default()),
        RecordingHandler::default(),
        options(),
    );
    let mut reports = manager.subscribe();
    wait_for_status(&mut reports, ConnectionStatus::Connected).await;

    transport
        .latest_session()
        .send(TransportEvent::Disconnected(DisconnectReason::ClientClose))
        .await
        .unwrap();
    wait_for_status(&mut reports, ConnectionStatus::Disconnected).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.open_count(), 1);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_custom_policy_is_honoured() {
    let transport = ScriptedTransport::with(&[Outcome::Accept]);
    let manager = ConnectionManager::spawn(
        transport.clone(),
        Arc::new(CountingApi::default()),
        RecordingHandler::default(),
        ConnectionOptions {
            policy: ReconnectPolicy::new(1, &[500]),
            ..options()
        },
    );
    let mut reports = manager.subscribe();
    exhaust_reconnects(&transport, &mut reports).await;

    let opens = transport.open_times();
    assert_eq!(opens.len(), 2);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_not_held_up_by_kpi_refresh() {
    let transport = ScriptedTransport::with(&[Outcome::Accept]);
    let api = Arc::new(SlowApi::default());
    let dashboard = Dashboard::with_shared_api(api.clone());
    let manager = ConnectionManager::spawn(
        transport.clone(),
        api.clone(),
        dashboard.clone(),
        options(),
    );
    let mut reports = manager.subscribe();
    wait_for_status(&mut reports, ConnectionStatus::Connected).await;

    transport
        .latest_session()
        .send(TransportEvent::Event {
            name: "property:created".to_string(),
            payload: json!({"id": 1, "status": "draft"}),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The list is updated before the KPI fetch comes back.
    assert_eq!(dashboard.snapshot().await.total, 1);
    assert_eq!(api.kpi_calls.load(Ordering::SeqCst), 0);

    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(2), manager.shutdown())
        .await
        .expect("shutdown waited for the KPI refresh");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_handshake_abandons_it() {
    let transport = ScriptedTransport::with(&[Outcome::Hang]);
    let manager = ConnectionManager::spawn(
        transport.clone(),
        Arc::new(CountingApi::default()),
        RecordingHandler::default(),
        options(),
    );
    let mut reports = manager.subscribe();
    wait_for_status(&mut reports, ConnectionStatus::Connecting).await;
    assert_eq!(transport.open_count(), 1);

    tokio::time::timeout(Duration::from_secs(2), manager.shutdown())
        .await
        .expect("shutdown waited for the handshake");
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_during_slow_poll_still_reconnects() {
    let transport = ScriptedTransport::with(&[Outcome::Accept]);
    let api = Arc::new(SlowApi::default());
    let manager = ConnectionManager::spawn(
        transport.clone(),
        api.clone(),
        RecordingHandler::default(),
        options(),
    );
    let mut reports = manager.subscribe();
    exhaust_reconnects(&transport, &mut reports).await;

    // First poll tick fires at 30s and its fetch is still running at 31s.
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(api.kpi_calls.load(Ordering::SeqCst), 0);

    transport.push(&[Outcome::Accept]);
    manager.refresh().await;
    let report = wait_for_status(&mut reports, ConnectionStatus::Connected).await;
    assert_eq!(report.reconnect_attempts, 0);
    assert_eq!(transport.open_count(), 5);

    manager.shutdown().await;
}
