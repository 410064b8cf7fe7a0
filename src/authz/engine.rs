use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::identity::IdentityContext;
use super::permission::{permission_source, PermissionSource};
use super::permissions;
use super::scope::{reach, Reach};
use crate::errors::AppError;
use crate::models::EntityDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    View,
    Create,
    Update,
    StatusChange,
    Assign,
    Delete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::View => "view",
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::StatusChange => "status_change",
            ActionKind::Assign => "assign",
            ActionKind::Delete => "delete",
        }
    }

    pub fn is_state_changing(&self) -> bool {
        !matches!(self, ActionKind::View)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "view" => Ok(ActionKind::View),
            "create" => Ok(ActionKind::Create),
            "update" => Ok(ActionKind::Update),
            "status_change" | "status" => Ok(ActionKind::StatusChange),
            "assign" => Ok(ActionKind::Assign),
            "delete" => Ok(ActionKind::Delete),
            other => Err(AppError::bad_request(format!("unknown action kind: {other}"))),
        }
    }
}

/// What the caller wants to do: a kind plus the named permission it requires, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub kind: ActionKind,
    pub permission: Option<String>,
}

impl ActionSpec {
    pub fn new(kind: ActionKind, permission: Option<&str>) -> Self {
        Self {
            kind,
            permission: permission.map(str::to_string),
        }
    }

    /// Scope-only visibility.
    pub fn view() -> Self {
        Self::new(ActionKind::View, None)
    }

    /// Scope-only state transition.
    pub fn status_change() -> Self {
        Self::new(ActionKind::StatusChange, None)
    }

    pub fn create_task() -> Self {
        Self::new(ActionKind::Create, Some(permissions::TASKS_CREATE))
    }

    pub fn update_task() -> Self {
        Self::new(ActionKind::Update, Some(permissions::TASKS_UPDATE))
    }

    pub fn assign_task() -> Self {
        Self::new(ActionKind::Assign, Some(permissions::TASKS_ASSIGN))
    }

    pub fn delete_task() -> Self {
        Self::new(ActionKind::Delete, Some(permissions::TASKS_DELETE))
    }

    pub fn manage_team() -> Self {
        Self::new(ActionKind::Update, Some(permissions::TEAMS_MANAGE))
    }

    pub fn list_users() -> Self {
        Self::new(ActionKind::View, Some(permissions::USERS_MANAGE))
    }

    pub fn view_audit_log() -> Self {
        Self::new(ActionKind::View, Some(permissions::AUDIT_VIEW))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    OwnerOrAdminOverride,
    PermissionGranted,
    ScopeMatch,
    AssigneeOrCreatorMatch,
    NoOrganization,
    Denied,
}

impl From<Reach> for DecisionReason {
    fn from(value: Reach) -> Self {
        match value {
            Reach::Override => DecisionReason::OwnerOrAdminOverride,
            Reach::Organization => DecisionReason::ScopeMatch,
            Reach::AssigneeOrCreator => DecisionReason::AssigneeOrCreatorMatch,
        }
    }
}

/// Outcome of one adjudication. The reason is for logs and audit only;
/// callers answer every denial the same way.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl AccessDecision {
    pub fn allow(reason: DecisionReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    pub fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

/// Policy seam for access decisions.
pub trait AccessPolicy: Send + Sync {
    fn authorize(
        &self,
        identity: &IdentityContext,
        action: &ActionSpec,
        target: Option<&EntityDescriptor>,
    ) -> AccessDecision;
}

/// Default decision engine.
///
/// 1. named permission, when the action carries one
/// 2. scope, when a target is supplied
/// 3. both must pass; an action that checks nothing is denied
///
/// Stateless: every call re-derives its answer from the inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine;

impl DecisionEngine {
    pub fn new() -> Self {
        Self
    }
}

impl AccessPolicy for DecisionEngine {
    fn authorize(
        &self,
        identity: &IdentityContext,
        action: &ActionSpec,
        target: Option<&EntityDescriptor>,
    ) -> AccessDecision {
        let granted_by = match action.permission.as_deref() {
            Some(permission) => match permission_source(identity, permission) {
                Some(source) => Some(source),
                None => {
                    tracing::debug!(
                        user_id = %identity.user_id(),
                        action = %action.kind,
                        permission = %permission,
                        "permission missing"
                    );
                    return AccessDecision::deny(DecisionReason::Denied);
                }
            },
            None => None,
        };

        let reached = match target {
            Some(target) => match reach(identity, target) {
                Some(reached) => Some(reached),
                None => {
                    tracing::debug!(
                        user_id = %identity.user_id(),
                        action = %action.kind,
                        entity_type = %target.entity_type,
                        entity_id = %target.entity_id,
                        "target out of scope"
                    );
                    let reason = if identity.organization_id().is_none() {
                        DecisionReason::NoOrganization
                    } else {
                        DecisionReason::Denied
                    };
                    return AccessDecision::deny(reason);
                }
            },
            None => None,
        };

        let reason = match (granted_by, reached) {
            (_, Some(reached)) => reached.into(),
            (Some(PermissionSource::Explicit), None) => DecisionReason::PermissionGranted,
            (Some(_), None) => DecisionReason::OwnerOrAdminOverride,
            (None, None) => {
                tracing::debug!(
                    user_id = %identity.user_id(),
                    action = %action.kind,
                    "nothing to check, denying"
                );
                return AccessDecision::deny(DecisionReason::Denied);
            }
        };

        tracing::debug!(
            user_id = %identity.user_id(),
            action = %action.kind,
            reason = ?reason,
            "access granted"
        );
        AccessDecision::allow(reason)
    }
}

/// Adjudicates with the default engine.
pub fn authorize(
    identity: &IdentityContext,
    action: &ActionSpec,
    target: Option<&EntityDescriptor>,
) -> AccessDecision {
    DecisionEngine.authorize(identity, action, target)
}
