//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur when building domain values from untrusted input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Hardware category outside the known catalog
    #[error("Invalid hardware kind: {kind}")]
    InvalidKind { kind: String },

    /// Negative or out-of-range coordinate
    #[error("Invalid {field}: {value} (expected a non-negative integer)")]
    InvalidCoordinate { field: &'static str, value: i64 },

    /// Temperature that is not a finite number
    #[error("Invalid temperature for {sensor}: {value}")]
    InvalidTemperature { sensor: String, value: f64 },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
