//! Domain error types.

use common::AggregateId;
use event_store::{EventStoreError, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::RegistryError;

/// Coarse classification of a [`DomainError`].
///
/// This is what crosses the command/query boundary, so callers can tell
/// stale data apart from bad input without matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    ConcurrencyConflict,
    UnsupportedType,
    Projection,
    Persistence,
    Internal,
}

impl ErrorKind {
    /// Stable label used for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::UnsupportedType => "unsupported_type",
            ErrorKind::Projection => "projection",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input or a business rule was rejected.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The aggregate was soft-deleted and accepts no further changes.
    #[error("{aggregate_type} {aggregate_id} is deleted")]
    AggregateDeleted {
        aggregate_type: String,
        aggregate_id: AggregateId,
    },

    /// Aggregate or read model not found.
    #[error("Not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// Another writer advanced the aggregate first.
    #[error(
        "Concurrency conflict for {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// No handler is registered for this command or query type.
    #[error("Unsupported {category} type: {type_name}")]
    UnsupportedType {
        category: &'static str,
        type_name: String,
    },

    /// Stored history for an aggregate is not a contiguous 1..N sequence.
    #[error("Corrupt history for {aggregate_id}: expected version {expected}, found {found}")]
    CorruptHistory {
        aggregate_id: AggregateId,
        expected: Version,
        found: Version,
    },

    /// An error occurred in the event store.
    #[error("Persistence error: {0}")]
    Persistence(EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A projection or the read store failed.
    #[error("Projection error: {0}")]
    Projection(String),

    /// A registry was used outside its register/freeze lifecycle.
    #[error("Registry error: {0}")]
    Registry(RegistryError),
}

impl DomainError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }

    /// Shorthand for a missing entity.
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) | DomainError::AggregateDeleted { .. } => {
                ErrorKind::Validation
            }
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            DomainError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            DomainError::Projection(_) => ErrorKind::Projection,
            DomainError::CorruptHistory { .. }
            | DomainError::Persistence(_)
            | DomainError::Serialization(_) => ErrorKind::Persistence,
            DomainError::Registry(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if this is an optimistic concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::ConcurrencyConflict
    }
}

/// Wire form of an error in command and query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&DomainError> for ErrorBody {
    fn from(e: &DomainError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<EventStoreError> for DomainError {
    fn from(e: EventStoreError) -> Self {
        match e {
            EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            },
            EventStoreError::Serialization(e) => DomainError::Serialization(e),
            other => DomainError::Persistence(other),
        }
    }
}

impl From<RegistryError> for DomainError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Unknown { category, key } => DomainError::UnsupportedType {
                category,
                type_name: key,
            },
            other => DomainError::Registry(other),
        }
    }
}

/// Failure of a business method on an [`AggregateRoot`](crate::AggregateRoot).
#[derive(Debug, Error)]
pub enum AggregateError<E: std::error::Error + 'static> {
    /// The aggregate is soft-deleted.
    #[error("{aggregate_type} {aggregate_id} is deleted")]
    Deleted {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// The aggregate type has no deletion event.
    #[error("{aggregate_type} does not support deletion")]
    DeleteUnsupported { aggregate_type: &'static str },

    /// A business rule rejected the operation.
    #[error(transparent)]
    Rule(E),
}

impl<E: std::error::Error + 'static> From<AggregateError<E>> for DomainError {
    fn from(e: AggregateError<E>) -> Self {
        match e {
            AggregateError::Deleted {
                aggregate_type,
                aggregate_id,
            } => DomainError::AggregateDeleted {
                aggregate_type: aggregate_type.to_string(),
                aggregate_id,
            },
            AggregateError::DeleteUnsupported { .. } => DomainError::Validation(e.to_string()),
            AggregateError::Rule(rule) => DomainError::Validation(rule.to_string()),
        }
    }
}
