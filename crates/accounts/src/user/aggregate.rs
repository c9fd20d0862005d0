use std::collections::BTreeSet;

use chrono::Utc;
use domain::Aggregate;
use serde::{Deserialize, Serialize};

use super::{Role, UserError, UserEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Deactivated,
}

/// A user account.
///
/// Emails are stored lowercased. Deactivated users keep their data but
/// accept only reactivation or deletion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct User {
    registered: bool,
    email: String,
    name: String,
    status: UserStatus,
    roles: BTreeSet<Role>,
    tags: BTreeSet<String>,
}

impl Aggregate for User {
    type Event = UserEvent;
    type Error = UserError;

    fn aggregate_type() -> &'static str {
        "User"
    }

    fn apply(&mut self, event: &UserEvent) {
        match event {
            UserEvent::UserRegistered { email, name, .. } => {
                self.registered = true;
                self.email = email.clone();
                self.name = name.clone();
            }
            UserEvent::EmailChanged { new_email, .. } => self.email = new_email.clone(),
            UserEvent::RoleAssigned { role } => {
                self.roles.insert(*role);
            }
            UserEvent::UserTagged { tag } => {
                self.tags.insert(tag.clone());
            }
            UserEvent::UserDeactivated { .. } => self.status = UserStatus::Deactivated,
            UserEvent::UserReactivated { .. } => self.status = UserStatus::Active,
            UserEvent::UserDeleted { .. } => {}
        }
    }

    fn validate(&self) -> Result<(), UserError> {
        if !self.registered {
            return Err(UserError::NotRegistered);
        }
        if !is_valid_email(&self.email) {
            return Err(UserError::InvalidEmail(self.email.clone()));
        }
        Ok(())
    }

    fn is_deletion(event: &UserEvent) -> bool {
        matches!(event, UserEvent::UserDeleted { .. })
    }

    fn deletion_event(&self) -> Option<UserEvent> {
        Some(UserEvent::UserDeleted {
            deleted_at: Utc::now(),
        })
    }
}

impl User {
    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> UserStatus {
        self.status
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn register(&self, email: &str, name: &str) -> Result<Vec<UserEvent>, UserError> {
        if self.registered {
            return Err(UserError::AlreadyRegistered);
        }
        let email = normalize_email(email)?;

        Ok(vec![UserEvent::UserRegistered {
            email,
            name: name.trim().to_string(),
            registered_at: Utc::now(),
        }])
    }

    pub fn change_email(&self, email: &str) -> Result<Vec<UserEvent>, UserError> {
        self.ensure_active()?;
        let email = normalize_email(email)?;
        if email == self.email {
            return Err(UserError::EmailUnchanged);
        }

        Ok(vec![UserEvent::EmailChanged {
            old_email: self.email.clone(),
            new_email: email,
        }])
    }

    pub fn assign_role(&self, role: Role) -> Result<Vec<UserEvent>, UserError> {
        self.ensure_active()?;
        if self.roles.contains(&role) {
            return Err(UserError::RoleAlreadyAssigned(role));
        }
        Ok(vec![UserEvent::RoleAssigned { role }])
    }

    pub fn tag(&self, tag: &str) -> Result<Vec<UserEvent>, UserError> {
        self.ensure_active()?;
        let tag = tag.trim().to_lowercase();
        if self.tags.contains(&tag) {
            return Err(UserError::AlreadyTagged(tag));
        }
        Ok(vec![UserEvent::UserTagged { tag }])
    }

    pub fn deactivate(&self, reason: Option<&str>) -> Result<Vec<UserEvent>, UserError> {
        if !self.registered {
            return Err(UserError::NotRegistered);
        }
        if self.status == UserStatus::Deactivated {
            return Err(UserError::AlreadyDeactivated);
        }
        Ok(vec![UserEvent::UserDeactivated {
            reason: reason.map(str::to_string),
            deactivated_at: Utc::now(),
        }])
    }

    pub fn reactivate(&self) -> Result<Vec<UserEvent>, UserError> {
        if !self.registered {
            return Err(UserError::NotRegistered);
        }
        if self.status != UserStatus::Deactivated {
            return Err(UserError::NotDeactivated);
        }
        Ok(vec![UserEvent::UserReactivated {
            reactivated_at: Utc::now(),
        }])
    }

    fn ensure_active(&self) -> Result<(), UserError> {
        if !self.registered {
            return Err(UserError::NotRegistered);
        }
        if self.status == UserStatus::Deactivated {
            return Err(UserError::Inactive);
        }
        Ok(())
    }
}

fn normalize_email(email: &str) -> Result<String, UserError> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(UserError::InvalidEmail(email));
    }
    Ok(email)
}

/// `local@domain.tld`, no whitespace.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}
