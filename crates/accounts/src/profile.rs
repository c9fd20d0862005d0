//! User profile read model.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_store::{EventEnvelope, Version};
use projections::{
    Projection, ProjectionOutcome, ReadModel, ReadStore, ReadStoreExt, Result, is_next,
};
use serde::{Deserialize, Serialize};

use crate::user::{Role, UserEvent, UserStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub status: UserStatus,
    pub roles: Vec<Role>,
    pub tags: Vec<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl UserProfile {
    fn fold(&mut self, event: UserEvent) {
        match event {
            UserEvent::UserRegistered { .. } => {}
            UserEvent::EmailChanged { new_email, .. } => self.email = new_email,
            UserEvent::RoleAssigned { role } => insert_sorted(&mut self.roles, role),
            UserEvent::UserTagged { tag } => insert_sorted(&mut self.tags, tag),
            UserEvent::UserDeactivated { deactivated_at, .. } => {
                self.status = UserStatus::Deactivated;
                self.deactivated_at = Some(deactivated_at);
            }
            UserEvent::UserReactivated { .. } => {
                self.status = UserStatus::Active;
                self.deactivated_at = None;
            }
            UserEvent::UserDeleted { .. } => self.deleted = true,
        }
    }
}

fn insert_sorted<T: Ord>(items: &mut Vec<T>, item: T) {
    if let Err(at) = items.binary_search(&item) {
        items.insert(at, item);
    }
}

impl ReadModel for UserProfile {
    const MODEL_TYPE: &'static str = "UserProfile";

    fn id(&self) -> String {
        self.user_id.clone()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn searchable_text(&self) -> String {
        format!("{} {} {}", self.name, self.email, self.tags.join(" "))
    }
}

pub struct UserProfileProjection<R> {
    store: R,
}

impl<R: ReadStore> UserProfileProjection<R> {
    pub fn new(store: R) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<R: ReadStore + 'static> Projection for UserProfileProjection<R> {
    fn name(&self) -> &'static str {
        "user_profile"
    }

    fn aggregate_types(&self) -> &'static [&'static str] {
        &["User"]
    }

    fn can_handle(&self, event_type: &str) -> bool {
        UserEvent::EVENT_TYPES.contains(&event_type)
    }

    async fn project(&self, envelope: &EventEnvelope) -> Result<ProjectionOutcome> {
        let id = envelope.aggregate_id.to_string();
        let current: Option<UserProfile> = self.store.get_model(&id).await?;
        if !is_next(current.as_ref().map(|p| p.version), envelope)? {
            return Ok(ProjectionOutcome::Skipped);
        }

        let event: UserEvent = serde_json::from_value(envelope.payload.clone())?;
        let profile = match (event, current) {
            (
                UserEvent::UserRegistered {
                    email,
                    name,
                    registered_at,
                },
                _,
            ) => UserProfile {
                user_id: id,
                email,
                name,
                status: UserStatus::Active,
                roles: Vec::new(),
                tags: Vec::new(),
                deleted: false,
                created_at: registered_at,
                updated_at: envelope.timestamp,
                deactivated_at: None,
                version: envelope.version,
            },
            (event, Some(mut profile)) => {
                profile.fold(event);
                profile.updated_at = envelope.timestamp;
                profile.version = envelope.version;
                profile
            }
            (_, None) => {
                tracing::warn!(
                    user_id = %id,
                    version = %envelope.version,
                    "event for unregistered user"
                );
                return Ok(ProjectionOutcome::Ignored);
            }
        };

        self.store.save_model(&profile).await?;
        Ok(ProjectionOutcome::Applied)
    }

    async fn reset(&self) -> Result<()> {
        self.store.clear_type(UserProfile::MODEL_TYPE).await?;
        Ok(())
    }
}
