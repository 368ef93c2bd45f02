pub mod connection;
pub mod dashboard;
pub mod dispatch;
pub mod machine;
pub mod reconnect;

pub use crate::domain::model::{ConnectionStatus, DashboardEvent, DashboardKind, Kpis, Listing};
pub use crate::domain::ports::{ConfigProvider, DashboardApi, EventHandler, Session, Transport};
pub use crate::utils::error::Result;
