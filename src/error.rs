//! Crate-wide error taxonomy

use crate::providers::FetchError;
use crate::storage::StorageError;
use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Timeout,
    Upstream,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Timeout => "QUERY_TIMEOUT",
            ErrorKind::Upstream => "UPSTREAM_ERROR",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("{operation} exceeded its {budget:?} budget")]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },

    #[error("provider {provider} failed: {source}")]
    Upstream {
        provider: String,
        #[source]
        source: FetchError,
    },

    #[error("{} of {attempted} providers failed to sync: {}", failed.len(), failed.join(", "))]
    ProvidersFailed {
        failed: Vec<String>,
        attempted: usize,
    },

    #[error("storage failure during {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Wrap a storage error, promoting its not-found case
    pub fn storage(operation: &'static str, source: StorageError) -> Self {
        match source {
            StorageError::NotFound { resource, id } => Error::NotFound { resource, id },
            StorageError::Invalid(msg) => Error::Validation(msg),
            source => Error::Storage { operation, source },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Upstream { .. } | Error::ProvidersFailed { .. } => ErrorKind::Upstream,
            Error::Storage { .. } | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show external callers. Internal detail stays in logs.
    pub fn public_message(&self) -> String {
        match self {
            Error::Validation(msg) => msg.clone(),
            Error::NotFound { resource, .. } => format!("{} not found", resource),
            Error::Timeout { operation, .. } => {
                format!("{} took too long, please try again", operation)
            }
            Error::Upstream { provider, .. } => format!("provider {} is unavailable", provider),
            Error::ProvidersFailed { failed, .. } => {
                format!("sync failed for: {}", failed.join(", "))
            }
            Error::Storage { .. } | Error::Internal(_) => "internal server error".to_string(),
        }
    }
}
