pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use adapters::{http::ApiClient, websocket::SocketIoTransport};
pub use config::LiveConfig;
pub use core::connection::{ConnectionManager, ConnectionOptions, ConnectionReport};
pub use core::dashboard::{Dashboard, DashboardState};
pub use domain::model::{ConnectionStatus, DashboardEvent, DashboardKind};
pub use utils::error::{LiveError, Result};
