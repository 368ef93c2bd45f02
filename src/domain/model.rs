use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Polling,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Polling => "polling",
        };
        f.write_str(label)
    }
}

/// The three dashboards share one live channel implementation; the kind only
/// picks names and paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardKind {
    Property,
    Broker,
    Business,
}

impl DashboardKind {
    /// 事件名稱前綴，例如 `property:created`
    pub fn entity_prefix(&self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Broker => "broker_listing",
            Self::Business => "business",
        }
    }

    pub fn default_namespace(&self) -> &'static str {
        match self {
            Self::Property => "/dashboard/property",
            Self::Broker => "/dashboard/broker",
            Self::Business => "/dashboard/business",
        }
    }

    pub fn default_metrics_path(&self) -> &'static str {
        match self {
            Self::Property => "/api/dashboard/property/metrics",
            Self::Broker => "/api/dashboard/broker/metrics",
            Self::Business => "/api/dashboard/business/metrics",
        }
    }

    pub fn default_listings_path(&self) -> &'static str {
        match self {
            Self::Property => "/api/properties",
            Self::Broker => "/api/broker/listings",
            Self::Business => "/api/businesses",
        }
    }
}

impl std::str::FromStr for DashboardKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "property" => Ok(Self::Property),
            "broker" => Ok(Self::Broker),
            "business" => Ok(Self::Business),
            other => Err(format!(
                "unknown dashboard kind '{}', expected property, broker or business",
                other
            )),
        }
    }
}

/// Record identifier. The REST resources use both integer keys and UUIDs, so
/// either JSON form is accepted and kept as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WireId {
            Text(String),
            Int(i64),
            Uint(u64),
        }

        Ok(match WireId::deserialize(deserializer)? {
            WireId::Text(s) => RecordId(s),
            WireId::Int(i) => RecordId(i.to_string()),
            WireId::Uint(u) => RecordId(u.to_string()),
        })
    }
}

/// A listing row as served by the REST API. Fields other than `id` and
/// `status` are carried verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Listing {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            status: None,
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn with_field(mut self, key: &str, value: serde_json::Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

/// Aggregate metrics; replaced wholesale on every update.
pub type Kpis = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingPage {
    pub items: Vec<Listing>,
    pub total: u64,
}

impl<'de> Deserialize<'de> for ListingPage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WirePage {
            Paged {
                items: Vec<Listing>,
                total: Option<u64>,
            },
            Bare(Vec<Listing>),
        }

        Ok(match WirePage::deserialize(deserializer)? {
            WirePage::Paged { items, total } => {
                let total = total.unwrap_or(items.len() as u64);
                ListingPage { items, total }
            }
            WirePage::Bare(items) => ListingPage {
                total: items.len() as u64,
                items,
            },
        })
    }
}

/// Domain events pushed over the live channel (and KPI results from polling).
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    KpiUpdate(Kpis),
    Created(Listing),
    Updated(Listing),
    Deleted { id: RecordId },
    StatusChanged { id: RecordId, status: String },
}

impl DashboardEvent {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::KpiUpdate(_) => "kpi_update",
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Deleted { .. } => "deleted",
            Self::StatusChanged { .. } => "status_changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// We closed the session ourselves; never triggers reconnection.
    ClientClose,
    ServerClose,
    TransportClose,
    TransportError(String),
    PingTimeout,
}

impl DisconnectReason {
    pub fn is_client_close(&self) -> bool {
        matches!(self, Self::ClientClose)
    }
}

/// Output of a transport session reader.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Event {
        name: String,
        payload: serde_json::Value,
    },
    Disconnected(DisconnectReason),
}
