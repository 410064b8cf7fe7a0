use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Audited actions. Names are stable and stored verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CreateTask,
    UpdateTask,
    UpdateTaskStatus,
    AssignTask,
    DeleteTask,
    ViewTask,
    ViewTasks,
    ManageTeam,
    ViewTeam,
    ViewTeams,
    ViewUser,
    ViewUsers,
    ViewAuditLog,
    AccessDenied,
}

impl AuditAction {
    pub const ALL: [AuditAction; 14] = [
        AuditAction::CreateTask,
        AuditAction::UpdateTask,
        AuditAction::UpdateTaskStatus,
        AuditAction::AssignTask,
        AuditAction::DeleteTask,
        AuditAction::ViewTask,
        AuditAction::ViewTasks,
        AuditAction::ManageTeam,
        AuditAction::ViewTeam,
        AuditAction::ViewTeams,
        AuditAction::ViewUser,
        AuditAction::ViewUsers,
        AuditAction::ViewAuditLog,
        AuditAction::AccessDenied,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CreateTask => "CREATE_TASK",
            AuditAction::UpdateTask => "UPDATE_TASK",
            AuditAction::UpdateTaskStatus => "UPDATE_TASK_STATUS",
            AuditAction::AssignTask => "ASSIGN_TASK",
            AuditAction::DeleteTask => "DELETE_TASK",
            AuditAction::ViewTask => "VIEW_TASK",
            AuditAction::ViewTasks => "VIEW_TASKS",
            AuditAction::ManageTeam => "MANAGE_TEAM",
            AuditAction::ViewTeam => "VIEW_TEAM",
            AuditAction::ViewTeams => "VIEW_TEAMS",
            AuditAction::ViewUser => "VIEW_USER",
            AuditAction::ViewUsers => "VIEW_USERS",
            AuditAction::ViewAuditLog => "VIEW_AUDIT_LOG",
            AuditAction::AccessDenied => "ACCESS_DENIED",
        }
    }

    /// State changes and sensitive reads are always recorded; ordinary reads
    /// only when configured.
    pub fn is_mandatory(&self) -> bool {
        match self {
            AuditAction::CreateTask
            | AuditAction::UpdateTask
            | AuditAction::UpdateTaskStatus
            | AuditAction::AssignTask
            | AuditAction::DeleteTask
            | AuditAction::ManageTeam
            | AuditAction::AccessDenied => true,
            // sensitive reads
            AuditAction::ViewUser | AuditAction::ViewUsers | AuditAction::ViewAuditLog => true,
            AuditAction::ViewTask
            | AuditAction::ViewTasks
            | AuditAction::ViewTeam
            | AuditAction::ViewTeams => false,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| AppError::internal(format!("unknown audit action: {s}")))
    }
}
