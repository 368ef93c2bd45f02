pub mod toml_config;

#[cfg(feature = "cli")]
use clap::Parser;

pub use toml_config::LiveConfig;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "dashboard-live")]
#[command(about = "Follow a marketplace dashboard's live updates with polling fallback")]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "dashboard-live.toml")]
    pub config: String,

    /// Override the dashboard kind from config (property, broker, business)
    #[arg(long)]
    pub kind: Option<crate::domain::model::DashboardKind>,

    /// Override the identity from config
    #[arg(long)]
    pub identity: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Validate configuration and print the resolved endpoints without connecting
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(feature = "cli")]
impl CliArgs {
    /// 應用命令列覆蓋設定
    pub fn apply_overrides(&self, config: &mut LiveConfig) {
        if let Some(kind) = self.kind {
            tracing::info!("🔧 Dashboard kind overridden to: {:?}", kind);
            config.dashboard.kind = kind;
        }
        if let Some(identity) = &self.identity {
            tracing::info!("🔧 Identity overridden to: {}", identity);
            config.dashboard.identity = Some(identity.clone());
        }
    }
}
