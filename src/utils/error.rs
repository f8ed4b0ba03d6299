use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// 平台回報呼叫額度已用完
    #[error("Rate limited by platform (code {code:?}): {message}")]
    RateLimited { code: Option<i64>, message: String },

    /// 平台拒絕請求內容，重試沒有意義
    #[error("Request rejected by platform (code {code:?}): {message}")]
    InvalidInput { code: Option<i64>, message: String },

    /// 網路或 5xx 錯誤
    #[error("Transport error: {message}")]
    TransportError { message: String },

    #[error(
        "The {kind} you specified ({name}) is not available, maybe you misspelled it. \
         Run with --list-{kind}s to see the full list."
    )]
    UnknownTarget { kind: String, name: String },

    #[error("Interrupted by user")]
    Interrupted,

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    RateLimit,
    Configuration,
    Data,
    Storage,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// 批次迴圈用來決定下一步的錯誤分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Transport,
    Fatal,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::RateLimited { .. } => ErrorCategory::RateLimit,
            EtlError::ApiError(_) | EtlError::TransportError { .. } => ErrorCategory::Network,
            EtlError::InvalidInput { .. }
            | EtlError::UnknownTarget { .. }
            | EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => ErrorCategory::Configuration,
            EtlError::CsvError(_)
            | EtlError::SerializationError(_)
            | EtlError::ProcessingError { .. }
            | EtlError::ValidationError { .. } => ErrorCategory::Data,
            EtlError::IoError(_) | EtlError::ZipError(_) => ErrorCategory::Storage,
            EtlError::Interrupted => ErrorCategory::User,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::User => ErrorSeverity::Low,
            ErrorCategory::RateLimit | ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Data => ErrorSeverity::High,
            ErrorCategory::Storage => ErrorSeverity::Critical,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            EtlError::RateLimited { .. } => FailureKind::RateLimited,
            EtlError::TransportError { .. } => FailureKind::Transport,
            EtlError::ApiError(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                FailureKind::Transport
            }
            _ => FailureKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.failure_kind() != FailureKind::Fatal
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EtlError::RateLimited { .. } => {
                "Wait for the rate-limit window to reset, or raise batch.pause_seconds / batch.call_delay_ms"
            }
            EtlError::ApiError(_) | EtlError::TransportError { .. } => {
                "Check network connectivity and the api.base_url setting"
            }
            EtlError::InvalidInput { .. } => {
                "Check api.access_token, api.account_id and the query settings"
            }
            EtlError::UnknownTarget { .. } => {
                "Use --list-destinations or --list-origins to see the accepted names"
            }
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => "Fix the configuration file and try again",
            EtlError::IoError(_) | EtlError::ZipError(_) => {
                "Check that the output directory is writable and has free space"
            }
            EtlError::CsvError(_) | EtlError::SerializationError(_) => {
                "Check that the input file was produced by mig-reach"
            }
            EtlError::ProcessingError { .. } | EtlError::ValidationError { .. } => {
                "Re-run with --verbose for details"
            }
            EtlError::Interrupted => "Re-run with --resume to fetch only the missing estimates",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::RateLimited { .. } => {
                "The advertising platform rate limit was reached".to_string()
            }
            EtlError::ApiError(_) | EtlError::TransportError { .. } => {
                format!("Could not reach the advertising platform: {}", self)
            }
            EtlError::Interrupted => {
                "Run interrupted, partial tables were exported".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_classification() {
        let rate = EtlError::RateLimited {
            code: Some(17),
            message: "User request limit reached".to_string(),
        };
        assert_eq!(rate.failure_kind(), FailureKind::RateLimited);
        assert!(rate.is_retryable());

        let transport = EtlError::TransportError {
            message: "502 Bad Gateway".to_string(),
        };
        assert_eq!(transport.failure_kind(), FailureKind::Transport);

        let invalid = EtlError::InvalidInput {
            code: Some(100),
            message: "Invalid parameter".to_string(),
        };
        assert_eq!(invalid.failure_kind(), FailureKind::Fatal);
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_unknown_target_message_names_offender() {
        let err = EtlError::UnknownTarget {
            kind: "destination".to_string(),
            name: "Atlantis".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("Atlantis"));
        assert!(message.contains("--list-destinations"));
        assert_eq!(err.severity(), ErrorSeverity::High);
    }

    #[test]
    fn test_interrupt_is_low_severity() {
        assert_eq!(EtlError::Interrupted.severity(), ErrorSeverity::Low);
    }
}
