use rust_decimal::Decimal;
use serde::Serialize;

use crate::compensation::Discrepancy;
use crate::store::StoreError;

/// Unified error type for every service operation.
///
/// The first four variants abort an operation before any remote write is
/// issued. `Store` means the remote row store rejected or failed a call and
/// the compensation policy ran to completion. `PartialConsistency` is
/// terminal: a compensating write itself failed and the attached
/// [`Discrepancy`] names exactly which rows are off and by how much, so an
/// operator can reconcile by hand.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock for item {inventory_id}: requested {requested}, available {available}")]
    InsufficientStock {
        inventory_id: i64,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Concurrent modification of {0}, retries exhausted")]
    Conflict(String),

    #[error("Order is not feasible: {0}")]
    Infeasible(crate::services::production::FeasibilityReport),

    #[error("Remote store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    PartialConsistency(Discrepancy),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// True when retrying the same call with the same input can succeed.
    /// `PartialConsistency` is deliberately excluded: retrying a half-applied
    /// compound write would double-apply the steps that did land.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Store(_))
    }

    /// Message suitable for direct display to the operator.
    pub fn operator_message(&self) -> String {
        self.to_string()
    }
}

/// Machine-readable error category, used by callers that need to route
/// errors to different UI treatments (inline form message vs. hard alert).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientStock,
    InvalidOperation,
    InvalidInput,
    Conflict,
    Infeasible,
    Store,
    PartialConsistency,
    Other,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationError(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Infeasible(_) => ErrorKind::Infeasible,
            Self::Store(_) => ErrorKind::Store,
            Self::PartialConsistency(_) => ErrorKind::PartialConsistency,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}
