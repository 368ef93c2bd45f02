use anyhow::Context;
use clap::Parser;
use dashboard_live::core::ConfigProvider;
use dashboard_live::utils::error::ErrorSeverity;
use dashboard_live::utils::{logger, validation::Validate};
use dashboard_live::{
    ApiClient, CliArgs, ConnectionManager, ConnectionStatus, Dashboard, LiveConfig,
    SocketIoTransport,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting dashboard-live");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = match LiveConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };
    args.apply_overrides(&mut config);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    display_config_summary(&config);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - not connecting");
        return Ok(());
    }

    let api = Arc::new(
        ApiClient::from_config(&config, config.request_timeout())
            .context("building REST client")?,
    );
    let dashboard = Dashboard::with_shared_api(Arc::clone(&api));

    if let Err(e) = dashboard.load().await {
        tracing::error!(
            "❌ Initial load failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        if e.severity() >= ErrorSeverity::High {
            std::process::exit(exit_code(e.severity()));
        }
    }

    let transport = SocketIoTransport::new(config.base_url(), config.namespace())
        .context("building live transport")?
        .with_cookie(config.cookie().map(str::to_string))
        .with_identity(config.identity().map(str::to_string))
        .with_connect_timeout(config.connect_timeout());

    let manager = ConnectionManager::spawn(
        transport,
        api,
        dashboard.clone(),
        config.connection_options(),
    );
    let mut reports = manager.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down");
                break;
            }
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                let snapshot = dashboard.snapshot().await;
                println!(
                    "📶 {} | listings: {} (total {}) | KPIs: {}",
                    report.status,
                    snapshot.listings.len(),
                    snapshot.total,
                    snapshot.kpis.len()
                );

                if report.auth_required {
                    eprintln!("🔒 Session no longer authorized; sign in again and restart");
                }
                if report.status == ConnectionStatus::Polling {
                    if let Some(last) = &report.last_error {
                        eprintln!("📡 Live channel unavailable ({}), polling metrics", last.message);
                    }
                }
            }
        }
    }

    manager.shutdown().await;

    let snapshot = dashboard.snapshot().await;
    println!(
        "✅ Stopped. Final view: {} listings (total {}), {} KPIs",
        snapshot.listings.len(),
        snapshot.total,
        snapshot.kpis.len()
    );

    Ok(())
}

fn exit_code(severity: ErrorSeverity) -> i32 {
    match severity {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn display_config_summary(config: &LiveConfig) {
    println!("📋 Configuration Summary:");
    println!("  Dashboard: {:?}", config.kind());
    println!("  Server: {}", config.base_url());
    println!("  Namespace: {}", config.namespace());
    println!("  Metrics: {}", config.metrics_path());
    println!("  Listings: {}", config.listings_path());
    println!("  Live updates: {}", config.live_enabled());
    println!(
        "  Reconnect: {} attempts, poll every {}s",
        config.reconnect_policy().max_attempts(),
        config.poll_interval().as_secs()
    );
}
