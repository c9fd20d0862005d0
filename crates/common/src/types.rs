use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an aggregate instance.
///
/// Every event, command and aggregate-keyed read model refers to its
/// aggregate through this type rather than a bare UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// Creates a new random aggregate ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an aggregate ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string is not a valid aggregate ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAggregateIdError(String);

impl std::fmt::Display for ParseAggregateIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid aggregate id: {}", self.0)
    }
}

impl std::error::Error for ParseAggregateIdError {}

impl FromStr for AggregateId {
    type Err = ParseAggregateIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ParseAggregateIdError(s.to_string()))
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<AggregateId> for Uuid {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}

/// Who caused an event or submitted a command.
///
/// Serialized as `"system"` or `{"user": "<id>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Issuer {
    /// The engine itself, a migration or a scheduled job.
    #[default]
    System,

    /// An identified user.
    User(String),
}

impl Issuer {
    /// Creates an issuer for an identified user.
    pub fn user(id: impl Into<String>) -> Self {
        Issuer::User(id.into())
    }

    /// Builds an issuer from an optional user id, falling back to [`Issuer::System`].
    pub fn from_optional(id: Option<String>) -> Self {
        match id {
            Some(id) if !id.trim().is_empty() => Issuer::User(id),
            _ => Issuer::System,
        }
    }

    /// Returns the user id, or `None` for the system issuer.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Issuer::System => None,
            Issuer::User(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Issuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Issuer::System => write!(f, "system"),
            Issuer::User(id) => write!(f, "user:{id}"),
        }
    }
}
