use crate::domain::model::{DashboardEvent, Kpis, Listing, ListingPage, RecordId};
use crate::domain::ports::{DashboardApi, EventHandler};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;

/// Local view of one dashboard: the listing page, its total and the KPIs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub listings: Vec<Listing>,
    pub total: u64,
    pub kpis: Kpis,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl DashboardState {
    pub fn from_page(page: ListingPage) -> Self {
        Self {
            listings: page.items,
            total: page.total,
            ..Self::default()
        }
    }

    pub fn get(&self, id: &RecordId) -> Option<&Listing> {
        self.listings.iter().find(|l| &l.id == id)
    }

    fn position(&self, id: &RecordId) -> Option<usize> {
        self.listings.iter().position(|l| &l.id == id)
    }

    /// Apply one event. Returns true when the list changed, which means the
    /// KPIs must be fetched again from the server.
    pub fn apply(&mut self, event: DashboardEvent) -> bool {
        match event {
            DashboardEvent::KpiUpdate(kpis) => {
                self.kpis = kpis;
                false
            }
            DashboardEvent::Created(listing) => {
                match self.position(&listing.id) {
                    // 重複送達：原地取代，不重複計數
                    Some(index) => self.listings[index] = listing,
                    None => {
                        self.listings.insert(0, listing);
                        self.total += 1;
                    }
                }
                true
            }
            DashboardEvent::Updated(listing) => match self.position(&listing.id) {
                Some(index) => {
                    self.listings[index] = listing;
                    true
                }
                None => false,
            },
            DashboardEvent::Deleted { id } => match self.position(&id) {
                Some(index) => {
                    self.listings.remove(index);
                    self.total = self.total.saturating_sub(1);
                    true
                }
                None => false,
            },
            DashboardEvent::StatusChanged { id, status } => match self.position(&id) {
                Some(index) => {
                    self.listings[index].status = Some(status);
                    true
                }
                None => false,
            },
        }
    }
}

/// Event handler that keeps a [`DashboardState`] in sync and refreshes KPIs
/// after every list mutation. Clones share the same state.
///
/// KPI refreshes run on a background task so applying an event never waits on
/// the network. Mutations that land while a fetch is in flight collapse into a
/// single follow-up fetch.
pub struct Dashboard<A: DashboardApi> {
    api: Arc<A>,
    state: Arc<RwLock<DashboardState>>,
    refresher: Arc<KpiRefresher>,
}

impl<A: DashboardApi> Clone for Dashboard<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            state: Arc::clone(&self.state),
            refresher: Arc::clone(&self.refresher),
        }
    }
}

/// 背景 KPI 重新整理，最後一個 Dashboard 被丟棄時中止
#[derive(Default)]
struct KpiRefresher {
    trigger: Arc<Notify>,
    task: OnceLock<JoinHandle<()>>,
}

impl Drop for KpiRefresher {
    fn drop(&mut self) {
        if let Some(task) = self.task.get() {
            task.abort();
        }
    }
}

impl<A: DashboardApi> Dashboard<A> {
    pub fn new(api: A) -> Self {
        Self::with_shared_api(Arc::new(api))
    }

    pub fn with_shared_api(api: Arc<A>) -> Self {
        Self {
            api,
            state: Arc::new(RwLock::new(DashboardState::default())),
            refresher: Arc::new(KpiRefresher::default()),
        }
    }

    /// Initial REST load of the listing page and KPIs.
    pub async fn load(&self) -> Result<()> {
        let page = self.api.fetch_listings().await?;
        let kpis = self.api.fetch_kpis().await?;

        tracing::info!(
            "📥 Loaded {} listings (total {}) and {} KPIs",
            page.items.len(),
            page.total,
            kpis.len()
        );

        let mut state = self.state.write().await;
        *state = DashboardState::from_page(page);
        state.kpis = kpis;
        Ok(())
    }

    pub async fn snapshot(&self) -> DashboardState {
        self.state.read().await.clone()
    }
}

impl<A: DashboardApi + 'static> Dashboard<A> {
    /// Queue a KPI refresh and return immediately. Needs a tokio runtime.
    pub fn request_kpi_refresh(&self) {
        self.refresher.task.get_or_init(|| {
            let api = Arc::clone(&self.api);
            let state = Arc::clone(&self.state);
            let trigger = Arc::clone(&self.refresher.trigger);
            tokio::spawn(async move {
                loop {
                    trigger.notified().await;
                    refresh_kpis(api.as_ref(), &state).await;
                }
            })
        });
        self.refresher.trigger.notify_one();
    }
}

async fn refresh_kpis<A: DashboardApi>(api: &A, state: &RwLock<DashboardState>) {
    match api.fetch_kpis().await {
        Ok(kpis) => state.write().await.kpis = kpis,
        Err(e) => tracing::warn!("KPI refresh failed, keeping previous values: {}", e),
    }
}

#[async_trait]
impl<A: DashboardApi + 'static> EventHandler for Dashboard<A> {
    async fn on_event(&mut self, event: DashboardEvent) {
        let label = event.kind_label();
        let changed = {
            let mut state = self.state.write().await;
            state.last_event_at = Some(Utc::now());
            state.apply(event)
        };

        tracing::debug!("Applied {} event (list changed: {})", label, changed);

        if changed {
            self.request_kpi_refresh();
        }
    }
}
