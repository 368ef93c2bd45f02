use crate::domain::model::{DashboardEvent, DashboardKind, Listing, RecordId};
use crate::utils::error::{LiveError, Result};
use serde::Deserialize;

pub const KPI_UPDATE_EVENT: &str = "dashboard:kpi_update";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    KpiUpdate,
    Created,
    Updated,
    Deleted,
    StatusChanged,
}

#[derive(Deserialize)]
struct IdPayload {
    id: RecordId,
}

#[derive(Deserialize)]
struct StatusPayload {
    id: RecordId,
    status: String,
}

/// Maps wire event names of one dashboard kind onto [`DashboardEvent`].
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    kind: DashboardKind,
}

impl EventDispatcher {
    pub fn new(kind: DashboardKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> DashboardKind {
        self.kind
    }

    /// Wire names this dashboard listens to.
    pub fn event_names(&self) -> Vec<String> {
        let prefix = self.kind.entity_prefix();
        let mut names = vec![KPI_UPDATE_EVENT.to_string()];
        for suffix in ["created", "updated", "deleted", "status_changed"] {
            names.push(format!("{}:{}", prefix, suffix));
        }
        names
    }

    fn classify(&self, name: &str) -> Option<EventKind> {
        if name == KPI_UPDATE_EVENT {
            return Some(EventKind::KpiUpdate);
        }
        let suffix = name
            .strip_prefix(self.kind.entity_prefix())?
            .strip_prefix(':')?;
        match suffix {
            "created" => Some(EventKind::Created),
            "updated" => Some(EventKind::Updated),
            "deleted" => Some(EventKind::Deleted),
            "status_changed" => Some(EventKind::StatusChanged),
            _ => None,
        }
    }

    /// `Ok(None)` for events this dashboard does not care about.
    pub fn decode(&self, name: &str, payload: serde_json::Value) -> Result<Option<DashboardEvent>> {
        let Some(kind) = self.classify(name) else {
            return Ok(None);
        };

        let event = match kind {
            EventKind::KpiUpdate => match payload {
                serde_json::Value::Object(map) => DashboardEvent::KpiUpdate(map),
                other => {
                    return Err(LiveError::protocol(format!(
                        "{} payload must be an object, got {}",
                        name, other
                    )))
                }
            },
            EventKind::Created => DashboardEvent::Created(serde_json::from_value::<Listing>(payload)?),
            EventKind::Updated => DashboardEvent::Updated(serde_json::from_value::<Listing>(payload)?),
            EventKind::Deleted => {
                let IdPayload { id } = serde_json::from_value(payload)?;
                DashboardEvent::Deleted { id }
            }
            EventKind::StatusChanged => {
                let StatusPayload { id, status } = serde_json::from_value(payload)?;
                DashboardEvent::StatusChanged { id, status }
            }
        };

        Ok(Some(event))
    }
}
