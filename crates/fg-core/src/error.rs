//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A limit entry named no package
    #[error("Limit entry has an empty package identifier")]
    EmptyPackage,

    /// A limit entry carried a duration that cannot be enforced
    #[error("Invalid limit for {package}: {limit_ms}ms (expected > 0)")]
    NonPositiveLimit { package: String, limit_ms: i64 },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
