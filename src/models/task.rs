use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::EntityDescriptor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Backlog,
    InProgress,
    Review,
    #[serde(rename = "WithQA")]
    WithQa,
    #[serde(rename = "UAT")]
    Uat,
    ReadyForProd,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "Backlog",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Review => "Review",
            TaskStatus::WithQa => "WithQA",
            TaskStatus::Uat => "UAT",
            TaskStatus::ReadyForProd => "ReadyForProd",
            TaskStatus::Done => "Done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub status: TaskStatus,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(title: impl Into<String>, created_by: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            status: TaskStatus::default(),
            created_by,
            assigned_to: None,
            team_id: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// Moves the task to `status` and returns the previous one.
    ///
    /// Entering the terminal state stamps `completed_at` unless it is already
    /// set; any non-terminal status clears it.
    pub fn apply_status(&mut self, status: TaskStatus, now: DateTime<Utc>) -> TaskStatus {
        let previous = self.status;
        self.status = status;

        if status.is_terminal() {
            if self.completed_at.is_none() {
                self.completed_at = Some(now);
            }
        } else {
            self.completed_at = None;
        }

        previous
    }

    /// Projection for access decisions. The organization comes from the task's team.
    pub fn descriptor(&self, team_organization: Option<Uuid>) -> EntityDescriptor {
        let mut descriptor = EntityDescriptor::task(self.id).with_owner(self.created_by);
        descriptor.assignee_id = self.assigned_to;
        descriptor.team_id = self.team_id;
        descriptor.organization_id = self.team_id.and(team_organization);
        descriptor
    }
}
