//! Error types for the PetKit feeder monitor
//!
//! Every failure the monitor can observe is expressed as a [`PetkitError`].
//! Fetch failures are further classified into the four [`FailureKind`]s the
//! refresh cycle cares about: credential and region problems need a human to
//! reconfigure the integration, server and generic problems are retried on
//! the next poll.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for PetKit operations
pub type Result<T> = std::result::Result<T, PetkitError>;

/// Error types for PetKit monitor operations
#[derive(Error, Debug)]
pub enum PetkitError {
    /// Credentials rejected by the vendor
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Configured region could not be resolved to an API gateway
    #[error("Region error: {0}")]
    Region(String),

    /// Vendor-side failure (5xx or explicit server error reply)
    #[error("Server error: {0}")]
    Server(String),

    /// Any other vendor or client failure
    #[error("PetKit error: {0}")]
    Generic(String),

    /// Fetch exceeded its timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Network errors
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed device data
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// The four failure classes surfaced by a refresh cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Invalid credentials
    Auth,
    /// Invalid region selection
    Region,
    /// Transient vendor-side failure
    Server,
    /// Everything else, including timeouts and malformed data
    Generic,
}

impl FailureKind {
    /// Whether polling must stop until the user reconfigures
    pub fn requires_reconfiguration(self) -> bool {
        matches!(self, FailureKind::Auth | FailureKind::Region)
    }
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Connection errors (1000-1099)
    ConnectionTimeout,
    NetworkUnreachable,

    // Authentication errors (1100-1199)
    InvalidCredentials,
    RegionUnknown,

    // Configuration errors (1200-1299)
    ConfigurationInvalid,

    // Data errors (1400-1499)
    ParsingFailed,

    // Service errors (1600-1699)
    ServiceUnavailable,
    ExternalServiceError,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::ConnectionTimeout => 1001,
            ErrorCode::NetworkUnreachable => 1004,

            ErrorCode::InvalidCredentials => 1101,
            ErrorCode::RegionUnknown => 1105,

            ErrorCode::ConfigurationInvalid => 1202,

            ErrorCode::ParsingFailed => 1401,

            ErrorCode::ServiceUnavailable => 1601,
            ErrorCode::ExternalServiceError => 1603,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1000..=1099 => "connection",
            1100..=1199 => "authentication",
            1200..=1299 => "configuration",
            1400..=1499 => "data",
            1600..=1699 => "service",
            _ => "unknown",
        }
    }
}

/// Error severity levels for log routing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Medium severity - the next poll will likely recover
    Warning,
    /// High severity - error condition
    Error,
    /// Critical severity - polling cannot continue without user action
    Critical,
}

/// Structured error context with additional metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Error code for machine processing
    pub code: ErrorCode,
    /// Component that generated the error
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional metadata about the error
    pub metadata: HashMap<String, serde_json::Value>,
    /// Timestamp when error occurred
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Refresh cycle ID for correlation
    pub correlation_id: Option<String>,
}

impl ErrorContext {
    /// Create new error context
    pub fn new(code: ErrorCode, component: &str, operation: &str) -> Self {
        Self {
            code,
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now(),
            correlation_id: None,
        }
    }

    /// Add metadata to error context
    pub fn with_metadata<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set correlation ID for cycle tracking
    pub fn with_correlation_id<S: Into<String>>(mut self, id: S) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Enhanced error representation for logging and status output
#[derive(Debug, Clone, Serialize)]
pub struct StructuredError {
    pub code: ErrorCode,
    pub code_number: u32,
    pub category: &'static str,
    pub failure_kind: FailureKind,
    pub message: String,
    pub is_retryable: bool,
    pub requires_reconfiguration: bool,
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub severity: ErrorSeverity,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub correlation_id: Option<String>,
}

impl PetkitError {
    /// Create an authentication error
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a region error
    pub fn region<S: Into<String>>(msg: S) -> Self {
        Self::Region(msg.into())
    }

    /// Create a server error
    pub fn server<S: Into<String>>(msg: S) -> Self {
        Self::Server(msg.into())
    }

    /// Create a generic vendor error
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create a parsing error
    pub fn parsing<S: Into<String>>(msg: S) -> Self {
        Self::Parsing(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Classify into one of the four refresh failure classes
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PetkitError::Authentication(_) => FailureKind::Auth,
            PetkitError::Region(_) => FailureKind::Region,
            PetkitError::Server(_) => FailureKind::Server,
            PetkitError::Http(e) if e.status().is_some_and(|s| s.is_server_error()) => {
                FailureKind::Server
            }
            PetkitError::Http(_)
            | PetkitError::Generic(_)
            | PetkitError::Timeout(_)
            | PetkitError::Network(_)
            | PetkitError::Json(_)
            | PetkitError::Parsing(_)
            | PetkitError::Config(_) => FailureKind::Generic,
        }
    }

    /// Check if polling must stop until the user reconfigures
    pub fn requires_reconfiguration(&self) -> bool {
        matches!(self, PetkitError::Config(_)) || self.failure_kind().requires_reconfiguration()
    }

    /// Check if the next poll may succeed without intervention
    pub fn is_retryable(&self) -> bool {
        !self.requires_reconfiguration()
    }

    /// Map PetkitError to structured error code
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            PetkitError::Authentication(_) => ErrorCode::InvalidCredentials,
            PetkitError::Region(_) => ErrorCode::RegionUnknown,
            PetkitError::Server(_) => ErrorCode::ServiceUnavailable,
            PetkitError::Generic(_) | PetkitError::Http(_) => ErrorCode::ExternalServiceError,
            PetkitError::Timeout(_) => ErrorCode::ConnectionTimeout,
            PetkitError::Network(_) => ErrorCode::NetworkUnreachable,
            PetkitError::Json(_) | PetkitError::Parsing(_) => ErrorCode::ParsingFailed,
            PetkitError::Config(_) => ErrorCode::ConfigurationInvalid,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PetkitError::Authentication(_) | PetkitError::Region(_) | PetkitError::Config(_) => {
                ErrorSeverity::Critical
            }
            PetkitError::Server(_)
            | PetkitError::Timeout(_)
            | PetkitError::Network(_)
            | PetkitError::Http(_) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Create a structured error from this PetkitError
    pub fn to_structured_error(&self, context: Option<ErrorContext>) -> StructuredError {
        let error_code = self.to_error_code();
        let base_context =
            context.unwrap_or_else(|| ErrorContext::new(error_code.clone(), "unknown", "unknown"));

        StructuredError {
            code: error_code.clone(),
            code_number: error_code.as_number(),
            category: error_code.category(),
            failure_kind: self.failure_kind(),
            message: self.sanitized_message(),
            is_retryable: self.is_retryable(),
            requires_reconfiguration: self.requires_reconfiguration(),
            component: base_context.component,
            operation: base_context.operation,
            metadata: base_context.metadata,
            severity: self.severity(),
            timestamp: base_context.timestamp,
            correlation_id: base_context.correlation_id,
        }
    }

    /// Get a log-safe error message
    ///
    /// Vendor replies to a failed login can echo the account name back, so
    /// release builds only describe the class of failure.
    pub fn sanitized_message(&self) -> String {
        #[cfg(debug_assertions)]
        {
            self.to_string()
        }
        #[cfg(not(debug_assertions))]
        {
            match self {
                PetkitError::Authentication(_) => "Authentication failed".to_string(),
                PetkitError::Region(_) => "Region could not be resolved".to_string(),
                PetkitError::Server(_) => "PetKit server error".to_string(),
                PetkitError::Generic(_) => "PetKit request failed".to_string(),
                PetkitError::Timeout(_) => "Operation timed out".to_string(),
                PetkitError::Network(_) => "Network operation failed".to_string(),
                PetkitError::Http(_) => "HTTP request failed".to_string(),
                PetkitError::Json(_) | PetkitError::Parsing(_) => {
                    "Data parsing error".to_string()
                }
                PetkitError::Config(_) => "Configuration error".to_string(),
            }
        }
    }
}

/// Error logging and reporting utilities
#[derive(Debug)]
pub struct ErrorReporter;

impl ErrorReporter {
    /// Log a structured error with appropriate severity
    pub fn log_error(error: &PetkitError, context: Option<ErrorContext>) {
        let structured = error.to_structured_error(context);

        match structured.severity {
            ErrorSeverity::Critical => {
                tracing::error!(
                    error_code = structured.code_number,
                    category = structured.category,
                    failure_kind = ?structured.failure_kind,
                    component = structured.component,
                    operation = structured.operation,
                    correlation_id = structured.correlation_id,
                    "Reconfiguration required: {}",
                    structured.message
                );
            }
            ErrorSeverity::Error => {
                tracing::error!(
                    error_code = structured.code_number,
                    category = structured.category,
                    failure_kind = ?structured.failure_kind,
                    component = structured.component,
                    operation = structured.operation,
                    correlation_id = structured.correlation_id,
                    "Error occurred: {}",
                    structured.message
                );
            }
            ErrorSeverity::Warning => {
                tracing::warn!(
                    error_code = structured.code_number,
                    category = structured.category,
                    failure_kind = ?structured.failure_kind,
                    component = structured.component,
                    operation = structured.operation,
                    correlation_id = structured.correlation_id,
                    "Warning: {}",
                    structured.message
                );
            }
        }
    }

    /// Render an error as the JSON document `check --json` prints
    pub fn format_api_error(
        error: &PetkitError,
        context: Option<ErrorContext>,
        include_details: bool,
    ) -> serde_json::Value {
        let structured = error.to_structured_error(context);

        let mut response = serde_json::json!({
            "error": {
                "code": structured.code_number,
                "category": structured.category,
                "kind": structured.failure_kind,
                "message": structured.message,
                "retryable": structured.is_retryable,
                "timestamp": structured.timestamp
            }
        });

        if include_details {
            response["error"]["component"] = serde_json::Value::String(structured.component);
            response["error"]["operation"] = serde_json::Value::String(structured.operation);
            response["error"]["requires_reconfiguration"] =
                serde_json::Value::Bool(structured.requires_reconfiguration);

            if let Some(correlation_id) = structured.correlation_id {
                response["error"]["correlation_id"] = serde_json::Value::String(correlation_id);
            }
        }

        response
    }
}

/// Log an error with a fresh context for `component`/`operation`
#[macro_export]
macro_rules! log_structured_error {
    ($error:expr, $component:expr, $operation:expr) => {
        $crate::error::ErrorReporter::log_error(
            &$error,
            Some($crate::error::ErrorContext::new(
                $error.to_error_code(),
                $component,
                $operation,
            )),
        )
    };
    ($error:expr, $component:expr, $operation:expr, $correlation_id:expr) => {
        $crate::error::ErrorReporter::log_error(
            &$error,
            Some(
                $crate::error::ErrorContext::new($error.to_error_code(), $component, $operation)
                    .with_correlation_id($correlation_id),
            ),
        )
    };
}

impl From<config::ConfigError> for PetkitError {
    fn from(err: config::ConfigError) -> Self {
        PetkitError::Config(err.to_string())
    }
}

impl From<url::ParseError> for PetkitError {
    fn from(err: url::ParseError) -> Self {
        PetkitError::Config(format!("Invalid URL: {err}"))
    }
}
