use crate::domain::model::{DashboardEvent, Kpis, ListingPage, TransportEvent};
use crate::utils::error::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// An open live session. Events arrive on `events` in delivery order; the
/// reader behind it stops when the session is closed or dropped.
pub struct Session {
    pub events: mpsc::Receiver<TransportEvent>,
    close_tx: Option<oneshot::Sender<()>>,
}

impl Session {
    pub fn new(events: mpsc::Receiver<TransportEvent>, close_tx: oneshot::Sender<()>) -> Self {
        Self {
            events,
            close_tx: Some(close_tx),
        }
    }

    /// Ask the reader to say goodbye to the server and stop.
    pub fn close(mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.close_tx.is_some())
            .finish()
    }
}

/// Live transport handle. `open` resolves once the namespace handshake is
/// accepted; auth rejections come back as `LiveError::Unauthorized`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self) -> Result<Session>;
}

/// REST side of a dashboard: aggregate metrics and the listing page.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn fetch_kpis(&self) -> Result<Kpis>;
    async fn fetch_listings(&self) -> Result<ListingPage>;
}

/// The single typed consumer of live and polled updates.
#[async_trait]
pub trait EventHandler: Send {
    async fn on_event(&mut self, event: DashboardEvent);
}

pub trait ConfigProvider: Send + Sync {
    fn base_url(&self) -> &str;
    fn namespace(&self) -> &str;
    fn metrics_path(&self) -> &str;
    fn listings_path(&self) -> &str;
    fn cookie(&self) -> Option<&str>;
    fn identity(&self) -> Option<&str>;
}
