//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Errors are split into four caller-visible families:
//!
//! - **Validation**: malformed or missing input - reported immediately, never retried
//! - **Generation**: an external generation call failed - retried within a bounded
//!   policy, then surfaced as a terminal run failure
//! - **Conflict**: stale write, already-resolved suggestion, already-applied
//!   decision - recoverable; the caller re-fetches state and retries the intent
//! - **State**: operation requested against a run in the wrong state - reported,
//!   not retried, never fatal to the run
//!
//! Only an exhausted Generation failure is allowed to move a run to `Failed`;
//! everything else leaves the persisted run untouched.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Generation Failure Categories
// =============================================================================

/// Classified cause of a failed generation call, used for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationFailureKind {
    /// Provider returned output that failed parsing or model validation
    InvalidOutput,
    /// Rate limited - wait then retry
    RateLimit,
    /// Upstream provider unavailable
    Unavailable,
    /// Network/connectivity issues - retry with backoff
    Network,
    /// Call exceeded its deadline
    Timeout,
    /// Authentication failed - fail fast, don't retry
    Auth,
    /// Request itself was rejected - fix the request, don't retry
    BadRequest,
    /// Unknown cause - conservative retry
    Unknown,
}

impl std::fmt::Display for GenerationFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOutput => write!(f, "INVALID_OUTPUT"),
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::Network => write!(f, "NETWORK"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Auth => write!(f, "AUTH"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl GenerationFailureKind {
    /// Check if this failure kind is worth retrying against the same provider
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidOutput
                | Self::RateLimit
                | Self::Network
                | Self::Timeout
                | Self::Unavailable
                | Self::Unknown
        )
    }

    /// Get recommended retry delay for this kind
    pub fn recommended_delay(&self) -> Duration {
        match self {
            Self::RateLimit => Duration::from_secs(30),
            Self::Network | Self::Unavailable => Duration::from_secs(5),
            Self::Timeout => Duration::from_secs(2),
            Self::InvalidOutput => Duration::from_secs(1),
            _ => Duration::from_millis(500),
        }
    }
}

// =============================================================================
// Generation Error
// =============================================================================

/// Generation call failure with classified cause and retry hints
#[derive(Debug, Clone)]
pub struct GenerationError {
    /// Failure kind for retry decisions
    pub kind: GenerationFailureKind,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// Suggested wait time before retry (if applicable)
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.kind, self.message)
        } else {
            write!(f, "[{}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for GenerationError {}

impl GenerationError {
    /// Create a new generation error
    pub fn new(kind: GenerationFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    /// Create error with provider context
    pub fn with_provider(
        kind: GenerationFailureKind,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    /// Mark output as invalid (unparseable or failing model validation)
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::new(GenerationFailureKind::InvalidOutput, message)
    }

    /// Add suggested retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    /// Check if the call is worth retrying
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Get recommended retry delay
    pub fn recommended_delay(&self) -> Duration {
        self.retry_after
            .unwrap_or_else(|| self.kind.recommended_delay())
    }
}

// =============================================================================
// Failure Classifier
// =============================================================================

/// Classifies raw provider failures into [`GenerationFailureKind`]s
pub struct FailureClassifier;

impl FailureClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str, provider: &str) -> GenerationError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
        {
            return GenerationError::with_provider(
                GenerationFailureKind::RateLimit,
                message,
                provider,
            )
            .retry_after(Duration::from_secs(30));
        }

        if lower.contains("auth")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("unauthorized")
        {
            return GenerationError::with_provider(GenerationFailureKind::Auth, message, provider);
        }

        if lower.contains("timeout") || lower.contains("timed out") {
            return GenerationError::with_provider(
                GenerationFailureKind::Timeout,
                message,
                provider,
            );
        }

        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("unreachable")
        {
            return GenerationError::with_provider(
                GenerationFailureKind::Network,
                message,
                provider,
            )
            .retry_after(Duration::from_secs(5));
        }

        if lower.contains("503")
            || lower.contains("502")
            || lower.contains("service unavailable")
            || lower.contains("500")
            || lower.contains("internal error")
            || lower.contains("overloaded")
        {
            return GenerationError::with_provider(
                GenerationFailureKind::Unavailable,
                message,
                provider,
            );
        }

        if lower.contains("400") || lower.contains("bad request") || lower.contains("malformed") {
            return GenerationError::with_provider(
                GenerationFailureKind::BadRequest,
                message,
                provider,
            );
        }

        if lower.contains("parse")
            || lower.contains("json")
            || lower.contains("unexpected token")
            || lower.contains("schema")
        {
            return GenerationError::with_provider(
                GenerationFailureKind::InvalidOutput,
                message,
                provider,
            )
            .retry_after(Duration::from_secs(1));
        }

        GenerationError::with_provider(GenerationFailureKind::Unknown, message, provider)
    }

    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> GenerationError {
        match status {
            429 => {
                GenerationError::with_provider(GenerationFailureKind::RateLimit, message, provider)
                    .retry_after(Duration::from_secs(30))
            }
            401 | 403 => {
                GenerationError::with_provider(GenerationFailureKind::Auth, message, provider)
            }
            400 => GenerationError::with_provider(
                GenerationFailureKind::BadRequest,
                message,
                provider,
            ),
            500 | 502 | 503 | 504 => GenerationError::with_provider(
                GenerationFailureKind::Unavailable,
                message,
                provider,
            )
            .retry_after(Duration::from_secs(5)),
            _ => GenerationError::with_provider(GenerationFailureKind::Unknown, message, provider),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Validation error kinds, each surfaced distinctly to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    /// Target section does not exist
    SectionNotFound,
    /// Message id does not name a known suggestion
    MessageNotFound,
    /// Required field missing (e.g. neither content nor heading supplied)
    MissingField,
    /// Duplicate photo id within one section
    DuplicatePhotoId,
    /// Duplicate or conflicting report order
    DuplicateOrder,
    /// Generated plan violated the schema or model invariants
    Schema,
    /// General validation error
    General,
}

/// Structured validation error with context
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ValidationKind,
    /// Field or component that failed validation
    pub field: Option<String>,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "Validation failed for '{}': {}", field, self.message)
        } else {
            write!(f, "Validation failed: {}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn new(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: None,
            message: message.into(),
        }
    }

    /// Add field context
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn section_not_found(section_id: &str) -> Self {
        Self::new(
            ValidationKind::SectionNotFound,
            format!("section '{}' not found", section_id),
        )
        .with_field(section_id)
    }

    pub fn message_not_found(message_id: &str) -> Self {
        Self::new(
            ValidationKind::MessageNotFound,
            format!("no suggestion staged for message '{}'", message_id),
        )
        .with_field(message_id)
    }
}

// =============================================================================
// Conflict Error
// =============================================================================

/// Recoverable concurrency conflicts. The caller should re-fetch state and
/// retry the intent, not blindly resubmit the same payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// A versioned write lost the race against a concurrent writer
    StaleWrite { expected: i64, actual: i64 },
    /// Suggestion already transitioned out of `proposed`
    AlreadyResolved,
    /// Section content changed after the suggestion was staged and no
    /// longer contains the quoted original text
    SectionChanged,
    /// Approval decision already applied to this run
    DecisionAlreadyApplied,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleWrite { expected, actual } => write!(
                f,
                "stale write: expected version {}, found {}",
                expected, actual
            ),
            Self::AlreadyResolved => write!(f, "suggestion already resolved"),
            Self::SectionChanged => {
                write!(f, "section content changed since the suggestion was staged")
            }
            Self::DecisionAlreadyApplied => write!(f, "approval decision already applied"),
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ScribeError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    /// External generation call failed (retryable within the bounded policy)
    #[error("Generation failed: {0}")]
    Generation(GenerationError),

    #[error("{0}")]
    Validation(ValidationError),

    /// Recoverable concurrency conflict
    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    /// Operation requested against a run in the wrong state
    #[error("Run is {actual}, operation '{operation}' requires {expected}")]
    State {
        operation: String,
        expected: String,
        actual: String,
    },

    /// Operation timeout with context
    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<GenerationError> for ScribeError {
    fn from(err: GenerationError) -> Self {
        ScribeError::Generation(err)
    }
}

impl From<ValidationError> for ScribeError {
    fn from(err: ValidationError) -> Self {
        ScribeError::Validation(err)
    }
}

impl From<ConflictKind> for ScribeError {
    fn from(kind: ConflictKind) -> Self {
        ScribeError::Conflict(kind)
    }
}

pub type Result<T> = std::result::Result<T, ScribeError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl ScribeError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a state error
    pub fn state(
        operation: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::State {
            operation: operation.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Check if this error is recoverable by retrying the same call
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Generation(e) => e.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Check if this error names a concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| ScribeError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| ScribeError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(GenerationFailureKind::RateLimit.to_string(), "RATE_LIMIT");
        assert_eq!(
            GenerationFailureKind::InvalidOutput.to_string(),
            "INVALID_OUTPUT"
        );
        assert_eq!(GenerationFailureKind::Auth.to_string(), "AUTH");
    }

    #[test]
    fn test_failure_kind_retryable() {
        assert!(GenerationFailureKind::RateLimit.is_retryable());
        assert!(GenerationFailureKind::Network.is_retryable());
        assert!(GenerationFailureKind::InvalidOutput.is_retryable());
        assert!(GenerationFailureKind::Timeout.is_retryable());
        assert!(!GenerationFailureKind::Auth.is_retryable());
        assert!(!GenerationFailureKind::BadRequest.is_retryable());
    }

    #[test]
    fn test_classify_rate_limit() {
        let err = FailureClassifier::classify("Rate limit exceeded, please retry", "openai");
        assert_eq!(err.kind, GenerationFailureKind::RateLimit);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_auth() {
        let err = FailureClassifier::classify("Invalid API key provided", "openai");
        assert_eq!(err.kind, GenerationFailureKind::Auth);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_invalid_output() {
        let err = FailureClassifier::classify("response did not parse as JSON", "openai");
        assert_eq!(err.kind, GenerationFailureKind::InvalidOutput);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_http_status() {
        let rate_limit = FailureClassifier::classify_http_status(429, "Rate limited", "test");
        assert_eq!(rate_limit.kind, GenerationFailureKind::RateLimit);

        let auth = FailureClassifier::classify_http_status(401, "Unauthorized", "test");
        assert_eq!(auth.kind, GenerationFailureKind::Auth);

        let unavailable = FailureClassifier::classify_http_status(503, "Down", "test");
        assert_eq!(unavailable.kind, GenerationFailureKind::Unavailable);
    }

    #[test]
    fn test_recommended_delay() {
        let rate_limit = GenerationError::new(GenerationFailureKind::RateLimit, "test");
        assert!(rate_limit.recommended_delay() >= Duration::from_secs(30));

        let custom = GenerationError::new(GenerationFailureKind::Unknown, "test")
            .retry_after(Duration::from_secs(100));
        assert_eq!(custom.recommended_delay(), Duration::from_secs(100));
    }

    #[test]
    fn test_generation_error_display() {
        let err = GenerationError::with_provider(
            GenerationFailureKind::RateLimit,
            "Too many requests",
            "openai",
        );
        assert_eq!(err.to_string(), "[openai:RATE_LIMIT] Too many requests");
    }

    #[test]
    fn test_conflict_display() {
        let conflict = ConflictKind::StaleWrite {
            expected: 3,
            actual: 5,
        };
        assert_eq!(
            conflict.to_string(),
            "stale write: expected version 3, found 5"
        );
        assert_eq!(
            ConflictKind::AlreadyResolved.to_string(),
            "suggestion already resolved"
        );
    }

    #[test]
    fn test_is_recoverable() {
        let generation = ScribeError::Generation(GenerationError::new(
            GenerationFailureKind::Network,
            "connection reset",
        ));
        assert!(generation.is_recoverable());

        let conflict = ScribeError::Conflict(ConflictKind::AlreadyResolved);
        assert!(!conflict.is_recoverable());
        assert!(conflict.is_conflict());

        let validation = ScribeError::Validation(ValidationError::section_not_found("intro"));
        assert!(!validation.is_recoverable());
    }
}
