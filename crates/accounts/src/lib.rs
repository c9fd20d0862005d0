//! Account domain: the User aggregate and its profile read model.

pub mod profile;
pub mod user;

pub use profile::{UserProfile, UserProfileProjection};
pub use user::{Role, User, UserCommand, UserError, UserEvent, UserStatus};
