use crate::core::connection::ConnectionOptions;
use crate::core::reconnect::{ReconnectPolicy, DEFAULT_DELAYS_MS, DEFAULT_MAX_ATTEMPTS};
use crate::core::ConfigProvider;
use crate::domain::model::DashboardKind;
use crate::utils::error::{LiveError, Result};
use crate::utils::validation::{
    validate_absolute_path, validate_non_empty_string, validate_positive_number, validate_range,
    validate_required_field, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    pub server: ServerConfig,
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
    /// Session cookie sent with the websocket handshake and REST calls.
    pub cookie: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub kind: DashboardKind,
    pub identity: Option<String>,
    pub enabled: Option<bool>,
    pub namespace: Option<String>,
    pub metrics_path: Option<String>,
    pub listings_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub max_attempts: Option<u32>,
    pub delays_ms: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_secs: Option<u64>,
}

impl LiveConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(LiveError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| LiveError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${SESSION_COOKIE})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| LiveError::ConfigError {
            message: format!("env substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_url("server.base_url", &self.server.base_url)?;

        if let Some(cookie) = &self.server.cookie {
            if cookie.contains("${") {
                return Err(LiveError::InvalidConfigValueError {
                    field: "server.cookie".to_string(),
                    value: cookie.clone(),
                    reason: "environment variable is not set".to_string(),
                });
            }
        }

        if self.live_enabled() {
            let identity = validate_required_field("dashboard.identity", &self.dashboard.identity)?;
            validate_non_empty_string("dashboard.identity", identity)?;
        }

        validate_absolute_path("dashboard.namespace", self.namespace())?;
        validate_absolute_path("dashboard.metrics_path", self.metrics_path())?;
        validate_absolute_path("dashboard.listings_path", self.listings_path())?;

        if let Some(attempts) = self.reconnect.max_attempts {
            validate_positive_number("reconnect.max_attempts", attempts as usize, 1)?;
        }
        if let Some(delays) = &self.reconnect.delays_ms {
            if delays.is_empty() {
                return Err(LiveError::InvalidConfigValueError {
                    field: "reconnect.delays_ms".to_string(),
                    value: "[]".to_string(),
                    reason: "At least one delay is required".to_string(),
                });
            }
            for delay in delays {
                validate_range("reconnect.delays_ms", *delay, 1, 300_000)?;
            }
        }

        validate_range("polling.interval_secs", self.poll_interval().as_secs(), 1, 3600)?;
        validate_range("transport.connect_timeout_secs", self.connect_timeout().as_secs(), 1, 300)?;
        validate_range("server.request_timeout_secs", self.request_timeout().as_secs(), 1, 300)?;

        Ok(())
    }

    pub fn kind(&self) -> DashboardKind {
        self.dashboard.kind
    }

    pub fn live_enabled(&self) -> bool {
        self.dashboard.enabled.unwrap_or(true)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.connect_timeout_secs.unwrap_or(10))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs.unwrap_or(10))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs.unwrap_or(30))
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let max_attempts = self.reconnect.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        match &self.reconnect.delays_ms {
            Some(delays) => ReconnectPolicy::new(max_attempts, delays),
            None => ReconnectPolicy::new(max_attempts, &DEFAULT_DELAYS_MS),
        }
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            kind: self.kind(),
            identity: self.dashboard.identity.clone(),
            enabled: self.live_enabled(),
            policy: self.reconnect_policy(),
            poll_interval: self.poll_interval(),
        }
    }
}

impl ConfigProvider for LiveConfig {
    fn base_url(&self) -> &str {
        &self.server.base_url
    }

    fn namespace(&self) -> &str {
        self.dashboard
            .namespace
            .as_deref()
            .unwrap_or_else(|| self.dashboard.kind.default_namespace())
    }

    fn metrics_path(&self) -> &str {
        self.dashboard
            .metrics_path
            .as_deref()
            .unwrap_or_else(|| self.dashboard.kind.default_metrics_path())
    }

    fn listings_path(&self) -> &str {
        self.dashboard
            .listings_path
            .as_deref()
            .unwrap_or_else(|| self.dashboard.kind.default_listings_path())
    }

    fn cookie(&self) -> Option<&str> {
        self.server.cookie.as_deref()
    }

    fn identity(&self) -> Option<&str> {
        self.dashboard.identity.as_deref()
    }
}

impl Validate for LiveConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
