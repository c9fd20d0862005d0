use domain::{AggregateError, AggregateRoot, Command, DomainError};
use serde::{Deserialize, Serialize};

use super::{Role, User, UserError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum UserCommand {
    Register {
        email: String,
        name: String,
    },
    ChangeEmail {
        email: String,
    },
    AssignRole {
        role: Role,
    },
    Tag {
        tag: String,
    },
    Deactivate {
        #[serde(default)]
        reason: Option<String>,
    },
    Reactivate {},
    Delete {},
}

impl Command for UserCommand {
    type Aggregate = User;

    const COMMAND_TYPES: &'static [&'static str] = &[
        "Register",
        "ChangeEmail",
        "AssignRole",
        "Tag",
        "Deactivate",
        "Reactivate",
        "Delete",
    ];

    fn command_type(&self) -> &'static str {
        match self {
            UserCommand::Register { .. } => "Register",
            UserCommand::ChangeEmail { .. } => "ChangeEmail",
            UserCommand::AssignRole { .. } => "AssignRole",
            UserCommand::Tag { .. } => "Tag",
            UserCommand::Deactivate { .. } => "Deactivate",
            UserCommand::Reactivate {} => "Reactivate",
            UserCommand::Delete {} => "Delete",
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, UserCommand::Register { .. })
    }

    fn validate(&self) -> Result<(), DomainError> {
        let (field, value) = match self {
            UserCommand::Register { email, name } => {
                if name.trim().is_empty() {
                    return Err(DomainError::validation("name is required"));
                }
                ("email", email)
            }
            UserCommand::ChangeEmail { email } => ("email", email),
            UserCommand::Tag { tag } => ("tag", tag),
            _ => return Ok(()),
        };
        if value.trim().is_empty() {
            return Err(DomainError::validation(format!("{field} is required")));
        }
        Ok(())
    }

    fn execute(&self, root: &mut AggregateRoot<User>) -> Result<(), AggregateError<UserError>> {
        let recorded = match self {
            UserCommand::Register { email, name } => root.execute(|u| u.register(email, name)),
            UserCommand::ChangeEmail { email } => root.execute(|u| u.change_email(email)),
            UserCommand::AssignRole { role } => root.execute(|u| u.assign_role(*role)),
            UserCommand::Tag { tag } => root.execute(|u| u.tag(tag)),
            UserCommand::Deactivate { reason } => {
                root.execute(|u| u.deactivate(reason.as_deref()))
            }
            UserCommand::Reactivate {} => root.execute(User::reactivate),
            UserCommand::Delete {} => return root.mark_as_deleted(),
        };
        recorded.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use common::AggregateId;
    use domain::CommandEnvelope;

    use super::*;

    #[test]
    fn wire_decoding() {
        let envelope = CommandEnvelope::new(
            "AssignRole",
            AggregateId::new(),
            "User",
            serde_json::json!({ "role": "admin" }),
        );
        assert_eq!(
            envelope.decode::<UserCommand>().unwrap(),
            UserCommand::AssignRole { role: Role::Admin }
        );

        let envelope = CommandEnvelope::new(
            "Deactivate",
            AggregateId::new(),
            "User",
            serde_json::Value::Null,
        );
        assert_eq!(
            envelope.decode::<UserCommand>().unwrap(),
            UserCommand::Deactivate { reason: None }
        );
    }

    #[test]
    fn wrong_aggregate_type_is_rejected() {
        let envelope = CommandEnvelope::new(
            "Tag",
            AggregateId::new(),
            "Cargo",
            serde_json::json!({ "tag": "x" }),
        );
        assert!(envelope.decode::<UserCommand>().is_err());
    }

    #[test]
    fn required_fields() {
        let missing_name = UserCommand::Register {
            email: "a@b.io".into(),
            name: "".into(),
        };
        assert!(missing_name.validate().is_err());
        assert!(UserCommand::Tag { tag: "  ".into() }.validate().is_err());
        assert!(UserCommand::Reactivate {}.validate().is_ok());
    }
}
