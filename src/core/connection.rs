use crate::core::dispatch::EventDispatcher;
use crate::core::machine::{ConnectionMachine, Effect, Input};
use crate::core::reconnect::ReconnectPolicy;
use crate::domain::model::{
    ConnectionStatus, DashboardEvent, DashboardKind, DisconnectReason, TransportEvent,
};
use crate::domain::ports::{DashboardApi, EventHandler, Session, Transport};
use crate::utils::error::{ErrorCategory, LiveError};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub kind: DashboardKind,
    pub identity: Option<String>,
    pub enabled: bool,
    pub policy: ReconnectPolicy,
    pub poll_interval: Duration,
}

impl ConnectionOptions {
    pub fn new(kind: DashboardKind, identity: impl Into<String>) -> Self {
        Self {
            kind,
            identity: Some(identity.into()),
            enabled: true,
            policy: ReconnectPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Live updates need a signed-in identity and the feature switched on.
    pub fn should_connect(&self) -> bool {
        self.enabled
            && self
                .identity
                .as_deref()
                .map(|id| !id.trim().is_empty())
                .unwrap_or(false)
    }
}

/// Structured copy of the most recent failure.
#[derive(Debug, Clone, PartialEq)]
pub struct LastError {
    pub category: ErrorCategory,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl LastError {
    fn from_error(error: &LiveError) -> Self {
        Self {
            category: error.category(),
            message: error.to_string(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionReport {
    pub status: ConnectionStatus,
    pub auth_required: bool,
    pub reconnect_attempts: u32,
    pub last_error: Option<LastError>,
}

impl Default for ConnectionReport {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            auth_required: false,
            reconnect_attempts: 0,
            last_error: None,
        }
    }
}

#[derive(Debug)]
enum Command {
    Refresh,
    Shutdown,
}

/// Owner handle of one dashboard's live channel.
///
/// All connection state lives in a single driver task; this handle only sends
/// commands and reads the published [`ConnectionReport`]. Dropping the handle
/// aborts the task, which closes the session and clears both timers.
pub struct ConnectionManager {
    commands: mpsc::Sender<Command>,
    report: watch::Receiver<ConnectionReport>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn spawn<T, A, H>(transport: T, api: Arc<A>, handler: H, options: ConnectionOptions) -> Self
    where
        T: Transport + 'static,
        A: DashboardApi + 'static,
        H: EventHandler + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (report_tx, report_rx) = watch::channel(ConnectionReport::default());

        let live = options.should_connect();
        let driver = Driver {
            transport,
            api,
            handler,
            dispatcher: EventDispatcher::new(options.kind),
            machine: ConnectionMachine::new(options.policy),
            live,
            commands: commands_rx,
            stopping: false,
            refresh_deferred: false,
            session: None,
            reconnect_at: None,
            poller: None,
            poll_interval: options.poll_interval,
            last_error: None,
            report: report_tx,
        };

        let task = tokio::spawn(driver.run());

        Self {
            commands: commands_tx,
            report: report_rx,
            task: Some(task),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.report.borrow().status
    }

    pub fn report(&self) -> ConnectionReport {
        self.report.borrow().clone()
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.report.borrow().last_error.clone()
    }

    pub fn auth_required(&self) -> bool {
        self.report.borrow().auth_required
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionReport> {
        self.report.clone()
    }

    /// Manual refresh: retry the transport with a fresh reconnection budget.
    pub async fn refresh(&self) {
        if self.commands.send(Command::Refresh).await.is_err() {
            tracing::warn!("Refresh requested after the live channel stopped");
        }
    }

    /// Close the session, cancel timers and wait for the driver to exit.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Live channel task failed: {}", e);
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Driver<T, A, H> {
    transport: T,
    api: Arc<A>,
    handler: H,
    dispatcher: EventDispatcher,
    machine: ConnectionMachine,
    live: bool,
    commands: mpsc::Receiver<Command>,
    stopping: bool,
    // Refresh that arrived while a connect or poll was in flight.
    refresh_deferred: bool,
    session: Option<Session>,
    reconnect_at: Option<Instant>,
    poller: Option<Interval>,
    poll_interval: Duration,
    last_error: Option<LastError>,
    report: watch::Sender<ConnectionReport>,
}

impl<T, A, H> Driver<T, A, H>
where
    T: Transport,
    A: DashboardApi,
    H: EventHandler,
{
    async fn run(mut self) {
        if self.live {
            tracing::info!(
                "🔌 Starting live updates for {:?} dashboard",
                self.dispatcher.kind()
            );
            tracing::debug!(
                "Listening for {}",
                self.dispatcher.event_names().join(", ")
            );
            self.feed(Input::Start).await;
        } else {
            tracing::info!("Live updates disabled (no identity or switched off)");
        }

        while !self.stopping {
            if std::mem::take(&mut self.refresh_deferred) {
                self.on_refresh().await;
                continue;
            }

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Refresh) => self.on_refresh().await,
                    Some(Command::Shutdown) | None => self.stop().await,
                },
                event = next_session_event(&mut self.session) => {
                    self.on_transport_event(event).await;
                }
                _ = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.feed(Input::ReconnectDue).await;
                }
                _ = next_poll_tick(&mut self.poller) => {
                    self.poll_once().await;
                }
            }
        }

        tracing::info!("⏹️ Live updates stopped");
    }

    async fn on_refresh(&mut self) {
        if self.live {
            tracing::info!("🔄 Manual refresh requested");
            self.feed(Input::Refresh).await;
        } else {
            tracing::debug!("Ignoring refresh while live updates are disabled");
        }
    }

    async fn stop(&mut self) {
        self.stopping = true;
        self.feed(Input::Stop).await;
    }

    async fn feed(&mut self, input: Input) {
        let mut pending = VecDeque::from([input]);

        while let Some(input) = pending.pop_front() {
            let before = self.machine.status();
            let effects = self.machine.handle(input);
            let after = self.machine.status();
            if before != after {
                tracing::info!("Live channel {} → {}", before, after);
            }
            self.publish();

            for effect in effects {
                if let Some(next) = self.apply(effect).await {
                    pending.push_back(next);
                }
            }
        }
    }

    async fn apply(&mut self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::OpenTransport => {
                self.close_session();
                let opened = answer_commands(
                    &mut self.commands,
                    &mut self.refresh_deferred,
                    self.transport.open(),
                )
                .await;
                let Some(opened) = opened else {
                    tracing::info!("Shutdown requested while connecting, abandoning handshake");
                    self.stopping = true;
                    return Some(Input::Stop);
                };
                match opened {
                    Ok(session) => {
                        tracing::info!("🟢 Live channel connected");
                        self.session = Some(session);
                        // 剛建立的連線已滿足等待中的手動重新整理
                        self.refresh_deferred = false;
                        Some(Input::Opened)
                    }
                    Err(e) if e.is_auth_failure() => {
                        tracing::error!("🔒 Live channel rejected credentials: {}", e);
                        self.record_error(&e);
                        Some(Input::AuthRejected)
                    }
                    Err(e) => {
                        tracing::warn!("Live channel connect failed: {}", e);
                        self.record_error(&e);
                        Some(Input::ConnectFailed)
                    }
                }
            }
            Effect::CloseTransport => {
                self.close_session();
                None
            }
            Effect::ScheduleReconnect(delay) => {
                tracing::info!(
                    "⏳ Reconnecting in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    self.machine.policy().attempts() + 1,
                    self.machine.policy().max_attempts()
                );
                self.reconnect_at = Some(Instant::now() + delay);
                None
            }
            Effect::CancelReconnect => {
                self.reconnect_at = None;
                None
            }
            Effect::StartPolling => {
                tracing::warn!(
                    "📡 Reconnection exhausted, polling metrics every {}s",
                    self.poll_interval.as_secs()
                );
                let mut interval = tokio::time::interval_at(
                    Instant::now() + self.poll_interval,
                    self.poll_interval,
                );
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.poller = Some(interval);
                None
            }
            Effect::StopPolling => {
                tracing::info!("Stopped metrics polling");
                self.poller = None;
                None
            }
        }
    }

    async fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Event { name, payload }) => {
                match self.dispatcher.decode(&name, payload) {
                    Ok(Some(event)) => self.deliver(event).await,
                    Ok(None) => tracing::debug!("Ignoring unknown event '{}'", name),
                    Err(e) => tracing::warn!("Dropping '{}' event: {}", name, e),
                }
            }
            Some(TransportEvent::Disconnected(reason)) => self.on_disconnect(reason).await,
            // Reader went away without a goodbye.
            None => self.on_disconnect(DisconnectReason::TransportClose).await,
        }
    }

    async fn on_disconnect(&mut self, reason: DisconnectReason) {
        self.session = None;
        if !reason.is_client_close() {
            tracing::warn!("🔴 Live channel disconnected: {:?}", reason);
            self.last_error = Some(LastError {
                category: ErrorCategory::Network,
                message: format!("disconnected: {:?}", reason),
                at: Utc::now(),
            });
        }
        self.feed(Input::Disconnected(reason)).await;
    }

    async fn poll_once(&mut self) {
        let polled = answer_commands(
            &mut self.commands,
            &mut self.refresh_deferred,
            self.api.fetch_kpis(),
        )
        .await;
        let Some(polled) = polled else {
            self.stop().await;
            return;
        };
        match polled {
            Ok(kpis) => {
                tracing::debug!("Polled {} KPIs", kpis.len());
                self.deliver(DashboardEvent::KpiUpdate(kpis)).await;
            }
            Err(e) if e.is_auth_failure() => {
                tracing::error!("🔒 Metrics polling unauthorized, stopping: {}", e);
                self.record_error(&e);
                self.feed(Input::PollUnauthorized).await;
            }
            Err(e) => {
                tracing::warn!("Metrics poll failed: {}", e);
                self.record_error(&e);
                self.publish();
            }
        }
    }

    async fn deliver(&mut self, event: DashboardEvent) {
        self.handler.on_event(event).await;
    }

    fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
    }

    fn record_error(&mut self, error: &LiveError) {
        self.last_error = Some(LastError::from_error(error));
    }

    fn publish(&self) {
        let report = ConnectionReport {
            status: self.machine.status(),
            auth_required: self.machine.auth_required(),
            reconnect_attempts: self.machine.policy().attempts(),
            last_error: self.last_error.clone(),
        };
        self.report.send_if_modified(|current| {
            if *current == report {
                false
            } else {
                *current = report;
                true
            }
        });
    }
}

/// Drive `work` to completion while still reading commands. A refresh is
/// remembered in `refresh_deferred`; shutdown abandons the work and yields None.
async fn answer_commands<F: Future>(
    commands: &mut mpsc::Receiver<Command>,
    refresh_deferred: &mut bool,
    work: F,
) -> Option<F::Output> {
    tokio::pin!(work);
    loop {
        tokio::select! {
            output = &mut work => return Some(output),
            command = commands.recv() => match command {
                Some(Command::Refresh) => *refresh_deferred = true,
                Some(Command::Shutdown) | None => return None,
            },
        }
    }
}

async fn next_session_event(session: &mut Option<Session>) -> Option<TransportEvent> {
    match session {
        Some(session) => session.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_poll_tick(poller: &mut Option<Interval>) {
    match poller {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
