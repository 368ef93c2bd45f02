//! Connection state machine shared by every dashboard kind.
//!
//! Pure: it consumes [`Input`]s and answers with [`Effect`]s for the driver
//! in `core::connection` to carry out. No timers or sockets live here.

use crate::core::reconnect::ReconnectPolicy;
use crate::domain::model::{ConnectionStatus, DisconnectReason};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Mounted with a valid identity and the channel enabled.
    Start,
    /// Transport handshake accepted.
    Opened,
    /// Transport open failed for a non-auth reason.
    ConnectFailed,
    /// Transport rejected our credentials.
    AuthRejected,
    Disconnected(DisconnectReason),
    ReconnectDue,
    /// KPI poll came back 401/403.
    PollUnauthorized,
    Refresh,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenTransport,
    CloseTransport,
    ScheduleReconnect(Duration),
    CancelReconnect,
    StartPolling,
    StopPolling,
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    status: ConnectionStatus,
    policy: ReconnectPolicy,
    reconnect_pending: bool,
    polling: bool,
    auth_required: bool,
    stopped: bool,
}

impl ConnectionMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            policy,
            reconnect_pending: false,
            polling: false,
            auth_required: false,
            stopped: false,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Terminal state after an auth failure; only a manual refresh leaves it.
    pub fn auth_required(&self) -> bool {
        self.auth_required
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        if self.stopped {
            return Vec::new();
        }

        match input {
            Input::Start => self.on_start(),
            Input::Opened => self.on_opened(),
            Input::ConnectFailed => self.on_connection_lost(),
            Input::Disconnected(reason) if reason.is_client_close() => {
                if self.status != ConnectionStatus::Polling {
                    self.status = ConnectionStatus::Disconnected;
                }
                Vec::new()
            }
            Input::Disconnected(_) => self.on_connection_lost(),
            Input::AuthRejected => self.on_auth_failure(),
            Input::ReconnectDue => self.on_reconnect_due(),
            Input::PollUnauthorized => {
                if self.polling {
                    self.on_auth_failure()
                } else {
                    Vec::new()
                }
            }
            Input::Refresh => self.on_refresh(),
            Input::Stop => self.on_stop(),
        }
    }

    fn on_start(&mut self) -> Vec<Effect> {
        if self.status != ConnectionStatus::Disconnected || self.auth_required {
            return Vec::new();
        }
        self.status = ConnectionStatus::Connecting;
        vec![Effect::OpenTransport]
    }

    fn on_opened(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            effects.push(Effect::CancelReconnect);
        }
        if self.polling {
            self.polling = false;
            effects.push(Effect::StopPolling);
        }
        self.policy.reset();
        self.auth_required = false;
        self.status = ConnectionStatus::Connected;
        effects
    }

    fn on_connection_lost(&mut self) -> Vec<Effect> {
        match self.status {
            // 輪詢中手動探測失敗：維持輪詢
            ConnectionStatus::Polling | ConnectionStatus::Disconnected => Vec::new(),
            _ => match self.policy.next_delay() {
                Some(delay) => {
                    self.status = ConnectionStatus::Reconnecting;
                    self.reconnect_pending = true;
                    vec![Effect::ScheduleReconnect(delay)]
                }
                None => {
                    self.status = ConnectionStatus::Polling;
                    self.polling = true;
                    vec![Effect::StartPolling]
                }
            },
        }
    }

    fn on_reconnect_due(&mut self) -> Vec<Effect> {
        if !self.reconnect_pending || self.status != ConnectionStatus::Reconnecting {
            return Vec::new();
        }
        self.reconnect_pending = false;
        self.policy.record_attempt();
        vec![Effect::OpenTransport]
    }

    fn on_auth_failure(&mut self) -> Vec<Effect> {
        let mut effects = self.wind_down();
        effects.push(Effect::CloseTransport);
        self.auth_required = true;
        self.status = ConnectionStatus::Disconnected;
        effects
    }

    fn on_refresh(&mut self) -> Vec<Effect> {
        if self.status == ConnectionStatus::Polling {
            // Try once; the poller keeps running until the transport is back.
            return vec![Effect::OpenTransport];
        }

        let mut effects = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            effects.push(Effect::CancelReconnect);
        }
        effects.push(Effect::CloseTransport);
        effects.push(Effect::OpenTransport);
        self.policy.reset();
        self.auth_required = false;
        self.status = ConnectionStatus::Connecting;
        effects
    }

    fn on_stop(&mut self) -> Vec<Effect> {
        let mut effects = self.wind_down();
        effects.push(Effect::CloseTransport);
        self.status = ConnectionStatus::Disconnected;
        self.stopped = true;
        effects
    }

    fn wind_down(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            effects.push(Effect::CancelReconnect);
        }
        if self.polling {
            self.polling = false;
            effects.push(Effect::StopPolling);
        }
        effects
    }
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
