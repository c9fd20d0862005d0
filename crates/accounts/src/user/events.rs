use chrono::{DateTime, Utc};
use domain::DomainEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Operator,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Viewer => "viewer",
            Role::Operator => "operator",
            Role::Admin => "admin",
        })
    }
}

/// Events recorded on a user aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UserEvent {
    UserRegistered {
        email: String,
        name: String,
        registered_at: DateTime<Utc>,
    },
    EmailChanged {
        old_email: String,
        new_email: String,
    },
    RoleAssigned {
        role: Role,
    },
    UserTagged {
        tag: String,
    },
    UserDeactivated {
        reason: Option<String>,
        deactivated_at: DateTime<Utc>,
    },
    UserReactivated {
        reactivated_at: DateTime<Utc>,
    },
    UserDeleted {
        deleted_at: DateTime<Utc>,
    },
}

impl UserEvent {
    pub const EVENT_TYPES: &'static [&'static str] = &[
        "UserRegistered",
        "EmailChanged",
        "RoleAssigned",
        "UserTagged",
        "UserDeactivated",
        "UserReactivated",
        "UserDeleted",
    ];
}

impl DomainEvent for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserRegistered { .. } => "UserRegistered",
            UserEvent::EmailChanged { .. } => "EmailChanged",
            UserEvent::RoleAssigned { .. } => "RoleAssigned",
            UserEvent::UserTagged { .. } => "UserTagged",
            UserEvent::UserDeactivated { .. } => "UserDeactivated",
            UserEvent::UserReactivated { .. } => "UserReactivated",
            UserEvent::UserDeleted { .. } => "UserDeleted",
        }
    }
}
