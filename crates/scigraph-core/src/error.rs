//! Shared error types for configuration, store, and model endpoints
//!
//! Each subsystem contains its own faults; cross-subsystem propagation goes
//! through these typed values only. There is no global error handler.

use crate::model::RelationType;

/// Configuration violations. All fatal at load time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("scoring weights must sum to 1.0 +/- 1e-3, got {sum}")]
    InvalidWeights { sum: f64 },
    #[error("{path}: value {value} outside [0, 1]")]
    ThresholdOutOfRange { path: String, value: f64 },
    #[error("{path}: lower threshold {lower} must be below upper {upper}")]
    ThresholdsInverted {
        path: String,
        lower: f64,
        upper: f64,
    },
    #[error("{path}: relation type {rel_type} has no definition")]
    UnknownRelationReference {
        path: String,
        rel_type: RelationType,
    },
    #[error("{path}: type set for {rel_type} must not be empty")]
    EmptyTypeSet {
        path: String,
        rel_type: RelationType,
    },
}

/// Failures from the graph or vector adapters.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("graph query failed: {0}")]
    Query(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("store returned malformed data: {0}")]
    MalformedResponse(String),
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Failures from chat-completion and embedding endpoints.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("admission rejected by local rate limiter")]
    AdmissionRejected,
    #[error("circuit breaker open")]
    CircuitOpen,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("call timed out after {0}s")]
    Timeout(u64),
}
