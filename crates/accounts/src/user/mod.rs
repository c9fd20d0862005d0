//! User aggregate and related types.

mod aggregate;
mod commands;
mod events;

pub use aggregate::{User, UserStatus};
pub use commands::UserCommand;
pub use events::{Role, UserEvent};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserError {
    #[error("user already registered")]
    AlreadyRegistered,

    #[error("user is not registered")]
    NotRegistered,

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("email is unchanged")]
    EmailUnchanged,

    #[error("role {0} already assigned")]
    RoleAlreadyAssigned(Role),

    #[error("already tagged {0}")]
    AlreadyTagged(String),

    #[error("user is already deactivated")]
    AlreadyDeactivated,

    #[error("user is not deactivated")]
    NotDeactivated,

    #[error("user is deactivated")]
    Inactive,
}
