use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Task,
    Team,
    Organization,
    User,
    Comment,
    AuditLog,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Task,
        EntityType::Team,
        EntityType::Organization,
        EntityType::User,
        EntityType::Comment,
        EntityType::AuditLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Task => "Task",
            EntityType::Team => "Team",
            EntityType::Organization => "Organization",
            EntityType::User => "User",
            EntityType::Comment => "Comment",
            EntityType::AuditLog => "AuditLog",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::bad_request(format!("unknown entity type: {s}")))
    }
}

/// Read-only projection of the fields that scope an entity.
///
/// `organization_id` is the resolved, transitive organization: for a task it
/// is the organization of its team, for a comment that of its task's team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    #[serde(default)]
    pub owner_id: Option<Uuid>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
}

impl EntityDescriptor {
    pub fn new(entity_type: EntityType, entity_id: Uuid) -> Self {
        Self {
            entity_type,
            entity_id,
            owner_id: None,
            assignee_id: None,
            team_id: None,
            organization_id: None,
        }
    }

    pub fn task(task_id: Uuid) -> Self {
        Self::new(EntityType::Task, task_id)
    }

    pub fn team(team_id: Uuid, organization_id: Uuid) -> Self {
        Self::new(EntityType::Team, team_id).with_organization(organization_id)
    }

    /// An organization scopes itself.
    pub fn organization(organization_id: Uuid) -> Self {
        Self::new(EntityType::Organization, organization_id).with_organization(organization_id)
    }

    pub fn user(user_id: Uuid, organization_id: Option<Uuid>) -> Self {
        Self {
            organization_id,
            ..Self::new(EntityType::User, user_id)
        }
    }

    pub fn comment(comment_id: Uuid, author_id: Uuid) -> Self {
        Self::new(EntityType::Comment, comment_id).with_owner(author_id)
    }

    pub fn with_owner(mut self, owner_id: Uuid) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn with_assignee(mut self, assignee_id: Uuid) -> Self {
        self.assignee_id = Some(assignee_id);
        self
    }

    /// Sets the team together with the organization it belongs to.
    pub fn in_team(mut self, team_id: Uuid, organization_id: Uuid) -> Self {
        self.team_id = Some(team_id);
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_organization(mut self, organization_id: Uuid) -> Self {
        self.organization_id = Some(organization_id);
        self
    }
}
