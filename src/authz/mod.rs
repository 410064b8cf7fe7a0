//! Authorization module - decision engine
//!
//! This module implements the access decision core:
//! - Identity context built once per request from validated claims
//! - Permission resolution (explicit grants plus Owner/Admin implied grants)
//! - Scope resolution by organization, team and personal relationship
//! - Per-action decisions combining both

mod engine;
mod identity;
mod permission;
mod scope;

pub use engine::{
    authorize, AccessDecision, AccessPolicy, ActionKind, ActionSpec, DecisionEngine, DecisionReason,
};
pub use identity::{IdentityClaims, IdentityContext, IdentityError, Role};
pub use permission::{has_permission, is_restricted, permission_source, PermissionSource, RESTRICTED_PREFIX};
pub use scope::{can_reach, reach, reachable, Reach};

/// Well-known permission names
pub mod permissions {
    // Task
    pub const TASKS_CREATE: &str = "tasks.create";
    pub const TASKS_UPDATE: &str = "tasks.update";
    pub const TASKS_DELETE: &str = "tasks.delete";
    pub const TASKS_ASSIGN: &str = "tasks.assign";

    // Users and teams
    pub const USERS_MANAGE: &str = "users.manage";
    pub const TEAMS_MANAGE: &str = "teams.manage";

    // Audit
    pub const AUDIT_VIEW: &str = "audit.view";

    // Restricted
    pub const SYSTEM_ADMIN: &str = "system.admin";
}
