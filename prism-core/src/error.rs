//! Error types for prism operations

use thiserror::Error;

/// Record store and transaction errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found: {key}")]
    RecordNotFound { key: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Store backend error: {reason}")]
    Backend { reason: String },
}

/// A read from the normalized cache could not satisfy the requested shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheMissError {
    #[error("Cache miss: no record for key {key}")]
    MissingRecord { key: String },

    #[error("Cache miss: record {key} has no field {field}")]
    MissingField { key: String, field: String },

    #[error("Cache miss: record {key} field {field} is unusable: {reason}")]
    UnexpectedValue {
        key: String,
        field: String,
        reason: String,
    },
}

/// A response tree does not fit the operation's selection shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Required field missing at {path}")]
    MissingField { path: String },

    #[error("Null value for non-null field at {path}")]
    UnexpectedNull { path: String },

    #[error("Type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },
}

/// Transport-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport I/O failed: {reason}")]
    Io { reason: String },

    #[error("Server responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport call cancelled")]
    Cancelled,

    #[error("No cached response for request {signature}")]
    NotCached { signature: String },
}

/// Response bytes could not be parsed into a generic tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed response: {reason}")]
    Malformed { reason: String },

    #[error("Response carries neither data nor errors")]
    MissingData,
}

/// A generic tree could not be mapped into the operation's typed result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("Field missing from response: {field}")]
    MissingField { field: String },

    #[error("Field {field} is not a {expected}")]
    TypeMismatch { field: String, expected: String },

    #[error("No adapter registered for scalar {scalar}")]
    UnknownScalar { scalar: String },

    #[error("Adapter for scalar {scalar} failed: {reason}")]
    Adapter { scalar: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Coarse classification of a [`PrismError`], one per terminal call outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CacheMiss,
    TransportFailure,
    ParseFailure,
    NormalizeFailure,
    PolicyViolation,
    Cancelled,
    Storage,
    Mapping,
    Config,
}

/// Master error type for all prism errors.
#[derive(Debug, Clone, Error)]
pub enum PrismError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    CacheMiss(#[from] CacheMissError),

    #[error("Normalize error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Policy {policy} violated: {reason}")]
    PolicyViolation { policy: String, reason: String },

    #[error("Call cancelled")]
    Cancelled,
}

impl PrismError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(_) => ErrorKind::Storage,
            Self::CacheMiss(_) => ErrorKind::CacheMiss,
            Self::Normalize(_) => ErrorKind::NormalizeFailure,
            Self::Transport(TransportError::Cancelled) => ErrorKind::Cancelled,
            Self::Transport(_) => ErrorKind::TransportFailure,
            Self::Parse(_) => ErrorKind::ParseFailure,
            Self::Mapping(_) => ErrorKind::Mapping,
            Self::Config(_) => ErrorKind::Config,
            Self::PolicyViolation { .. } => ErrorKind::PolicyViolation,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether a cache-first policy may fall through to the network.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::CacheMiss(_))
    }
}

/// Result type alias for prism operations.
pub type PrismResult<T> = Result<T, PrismError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_miss_display_missing_field() {
        let err = CacheMissError::MissingField {
            key: "User:1".to_string(),
            field: "email".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("User:1"));
        assert!(msg.contains("email"));
    }

    #[test]
    fn test_normalize_error_display_type_mismatch() {
        let err = NormalizeError::TypeMismatch {
            path: "QUERY_ROOT.user".to_string(),
            expected: "object".to_string(),
            found: "string".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("QUERY_ROOT.user"));
        assert!(msg.contains("object"));
        assert!(msg.contains("string"));
    }

    #[test]
    fn test_config_error_display_incompatible() {
        let err = ConfigError::IncompatibleOptions {
            option_a: "http_cache_store".to_string(),
            option_b: "eviction_strategy".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("http_cache_store"));
        assert!(msg.contains("eviction_strategy"));
    }

    #[test]
    fn test_storage_error_display_lock_poisoned() {
        let msg = format!("{}", StorageError::LockPoisoned);
        assert!(msg.contains("lock poisoned"));
    }

    #[test]
    fn test_prism_error_kinds() {
        let miss = PrismError::from(CacheMissError::MissingRecord {
            key: "QUERY_ROOT".to_string(),
        });
        assert_eq!(miss.kind(), ErrorKind::CacheMiss);
        assert!(miss.is_cache_miss());

        let transport = PrismError::from(TransportError::Io {
            reason: "connection reset".to_string(),
        });
        assert_eq!(transport.kind(), ErrorKind::TransportFailure);
        assert!(!transport.is_cache_miss());

        let cancelled = PrismError::from(TransportError::Cancelled);
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);

        let parse = PrismError::from(ParseError::MissingData);
        assert_eq!(parse.kind(), ErrorKind::ParseFailure);

        let normalize = PrismError::from(NormalizeError::MissingField {
            path: "QUERY_ROOT.user".to_string(),
        });
        assert_eq!(normalize.kind(), ErrorKind::NormalizeFailure);

        let policy = PrismError::PolicyViolation {
            policy: "CACHE_ONLY".to_string(),
            reason: "miss".to_string(),
        };
        assert_eq!(policy.kind(), ErrorKind::PolicyViolation);
        assert_eq!(PrismError::Cancelled.kind(), ErrorKind::Cancelled);
    }
}
