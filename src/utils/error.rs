use thiserror::Error;

/// Which endpoint rejected our credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    Transport,
    Metrics,
    Listings,
}

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Transport connect failed: {message}")]
    ConnectError { message: String },

    #[error("Not authorized ({source_kind:?}): {message}")]
    Unauthorized {
        source_kind: AuthSource,
        message: String,
    },

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("API returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Protocol error: {message}")]
    ProtocolError { message: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Timed out after {seconds}s while {operation}")]
    Timeout { operation: String, seconds: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Authentication,
    Protocol,
    Configuration,
    Data,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl LiveError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self::ConnectError {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    pub fn unauthorized(source_kind: AuthSource, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            source_kind,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectError { .. }
            | Self::WebSocketError(_)
            | Self::ApiError(_)
            | Self::HttpStatus { .. }
            | Self::Timeout { .. } => ErrorCategory::Network,
            Self::Unauthorized { .. } => ErrorCategory::Authentication,
            Self::ProtocolError { .. } => ErrorCategory::Protocol,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::SerializationError(_) => ErrorCategory::Data,
            Self::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // 網路錯誤由重連策略處理
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Protocol | ErrorCategory::Data => ErrorSeverity::Low,
            ErrorCategory::Authentication | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// Auth failures put the connection into the terminal "re-authenticate" state.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Check network connectivity and that the server is reachable",
            ErrorCategory::Authentication => "Sign in again and refresh the session cookie",
            ErrorCategory::Protocol => "Check that the server speaks Socket.IO v5 (Engine.IO v4)",
            ErrorCategory::Configuration => "Review the configuration file and fix the reported field",
            ErrorCategory::Data => "Check that the server payload matches the listing resource shape",
            ErrorCategory::System => "Check file permissions and available system resources",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Unauthorized { .. } => {
                "Your session is no longer authorized; live updates are paused".to_string()
            }
            Self::ConnectError { .. } | Self::WebSocketError(_) | Self::Timeout { .. } => {
                "Live updates are unavailable right now".to_string()
            }
            Self::ApiError(_) | Self::HttpStatus { .. } => {
                "Could not refresh dashboard data".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Status-code classification for REST calls; `source` names the endpoint.
pub fn status_error(status: reqwest::StatusCode, url: &str, source: AuthSource) -> LiveError {
    match status.as_u16() {
        401 | 403 => LiveError::unauthorized(
            source,
            format!("HTTP {} from {}", status.as_u16(), url),
        ),
        code => LiveError::HttpStatus {
            status: code,
            url: url.to_string(),
        },
    }
}

pub type Result<T> = std::result::Result<T, LiveError>;
