use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use mission_authz::audit::{AuditAction, AuditEntry, AuditRecorder, RequestContext};
use mission_authz::authz::{permissions, ActionSpec, DecisionReason, IdentityContext, Role};
use mission_authz::config::AuditConfig;
use mission_authz::errors::{AppError, AppResult};
use mission_authz::guard::{AccessGuard, EntityLookup};
use mission_authz::models::{EntityDescriptor, EntityType, Task, TaskStatus};

#[derive(Default)]
struct MemoryLookup {
    entities: HashMap<(EntityType, Uuid), EntityDescriptor>,
}

impl MemoryLookup {
    fn with(mut self, descriptor: EntityDescriptor) -> Self {
        self.entities
            .insert((descriptor.entity_type, descriptor.entity_id), descriptor);
        self
    }
}

#[async_trait]
impl EntityLookup for MemoryLookup {
    async fn describe(&self, entity_type: EntityType, entity_id: Uuid) -> AppResult<Option<EntityDescriptor>> {
        Ok(self.entities.get(&(entity_type, entity_id)).cloned())
    }
}

struct FailingLookup;

#[async_trait]
impl EntityLookup for FailingLookup {
    async fn describe(&self, _: EntityType, _: Uuid) -> AppResult<Option<EntityDescriptor>> {
        Err(AppError::internal("lookup unavailable"))
    }
}

#[derive(Default)]
struct CollectingRecorder {
    entries: Mutex<Vec<AuditEntry>>,
}

impl CollectingRecorder {
    fn actions(&self) -> Vec<AuditAction> {
        self.entries.lock().unwrap().iter().map(|e| e.action).collect()
    }
}

impl AuditRecorder for CollectingRecorder {
    fn record(&self, entry: AuditEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

struct Fixture {
    org: Uuid,
    task: EntityDescriptor,
    recorder: Arc<CollectingRecorder>,
    guard: AccessGuard,
}

fn fixture(config: AuditConfig) -> Fixture {
    let org = Uuid::new_v4();
    let task = EntityDescriptor::task(Uuid::new_v4())
        .in_team(Uuid::new_v4(), org)
        .with_owner(Uuid::new_v4());
    let lookup = MemoryLookup::default().with(task.clone());
    let recorder = Arc::new(CollectingRecorder::default());
    let guard = AccessGuard::new(Arc::new(lookup), recorder.clone(), config);
    Fixture {
        org,
        task,
        recorder,
        guard,
    }
}

fn member(role: Role, org: Uuid) -> IdentityContext {
    IdentityContext::new(Uuid::new_v4(), role)
        .expect("valid identity")
        .with_organization(org)
}

fn ctx() -> RequestContext {
    RequestContext::new().with_ip("10.0.0.1")
}

#[tokio::test]
async fn allowed_update_is_recorded_on_completion() -> Result<()> {
    let f = fixture(AuditConfig::default());
    let dev = member(Role::Developer, f.org).with_permissions([permissions::TASKS_UPDATE]);

    let permit = f
        .guard
        .authorize_entity(&dev, &ActionSpec::update_task(), AuditAction::UpdateTask, EntityType::Task, f.task.entity_id, &ctx())
        .await?;
    assert_eq!(permit.decision().reason, DecisionReason::ScopeMatch);
    assert_eq!(permit.target(), Some(&f.task));
    assert!(f.recorder.actions().is_empty());

    permit.complete_with("title changed");

    let entries = f.recorder.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::UpdateTask);
    assert_eq!(entries[0].actor_id, dev.user_id());
    assert_eq!(entries[0].entity_id, Some(f.task.entity_id));
    assert_eq!(entries[0].details.as_deref(), Some("title changed"));
    assert_eq!(entries[0].source_address.as_deref(), Some("10.0.0.1"));
    Ok(())
}

#[tokio::test]
async fn denial_is_uniform_and_audited() -> Result<()> {
    let f = fixture(AuditConfig::default());
    let outsider = member(Role::Developer, Uuid::new_v4()).with_permissions([permissions::TASKS_DELETE]);

    let err = f
        .guard
        .authorize_entity(&outsider, &ActionSpec::delete_task(), AuditAction::DeleteTask, EntityType::Task, f.task.entity_id, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(ref m) if m == "access denied"));

    let no_permission = member(Role::Developer, f.org);
    let err = f
        .guard
        .authorize_entity(&no_permission, &ActionSpec::delete_task(), AuditAction::DeleteTask, EntityType::Task, f.task.entity_id, &ctx())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "forbidden: access denied");

    let entries = f.recorder.entries.lock().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries.iter() {
        assert_eq!(entry.action, AuditAction::AccessDenied);
        assert_eq!(entry.entity_id, Some(f.task.entity_id));
        assert!(entry.details.as_deref().unwrap_or_default().starts_with("DELETE_TASK"));
    }
    Ok(())
}

#[tokio::test]
async fn missing_entity_is_not_found() -> Result<()> {
    let f = fixture(AuditConfig::default());
    let owner = member(Role::Owner, f.org);

    let err = f
        .guard
        .authorize_entity(&owner, &ActionSpec::view(), AuditAction::ViewTask, EntityType::Task, Uuid::new_v4(), &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(f.recorder.actions().is_empty());
    Ok(())
}

#[tokio::test]
async fn lookup_failures_propagate() -> Result<()> {
    let recorder = Arc::new(CollectingRecorder::default());
    let guard = AccessGuard::new(Arc::new(FailingLookup), recorder.clone(), AuditConfig::default());
    let owner = IdentityContext::new(Uuid::new_v4(), Role::Owner)?;

    let err = guard
        .authorize_entity(&owner, &ActionSpec::view(), AuditAction::ViewTask, EntityType::Task, Uuid::new_v4(), &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));
    assert!(recorder.actions().is_empty());
    Ok(())
}

#[tokio::test]
async fn status_change_by_assignee_completes_task() -> Result<()> {
    let org = Uuid::new_v4();
    let viewer = member(Role::Viewer, org);
    let mut task = Task::new("release notes", Uuid::new_v4(), Utc::now());
    task.assigned_to = Some(viewer.user_id());
    let team = Uuid::new_v4();
    task.team_id = Some(team);

    let lookup = MemoryLookup::default().with(task.descriptor(Some(org)));
    let recorder = Arc::new(CollectingRecorder::default());
    let guard = AccessGuard::new(Arc::new(lookup), recorder.clone(), AuditConfig::default());

    let permit = guard
        .authorize_entity(&viewer, &ActionSpec::status_change(), AuditAction::UpdateTaskStatus, EntityType::Task, task.id, &ctx())
        .await?;
    let previous = task.apply_status(TaskStatus::Done, Utc::now());
    permit.complete_with(format!("{} -> {}", previous.as_str(), task.status.as_str()));
    assert!(task.completed_at.is_some());

    let denied = guard
        .authorize_entity(&viewer, &ActionSpec::delete_task(), AuditAction::DeleteTask, EntityType::Task, task.id, &ctx())
        .await;
    assert!(denied.is_err());

    assert_eq!(
        recorder.actions(),
        vec![AuditAction::UpdateTaskStatus, AuditAction::AccessDenied]
    );
    let entries = recorder.entries.lock().unwrap();
    assert_eq!(entries[0].details.as_deref(), Some("Backlog -> Done"));
    Ok(())
}

#[tokio::test]
async fn creation_records_the_new_id() -> Result<()> {
    let f = fixture(AuditConfig::default());
    let business = member(Role::Business, f.org).with_permissions([permissions::TASKS_CREATE]);

    let permit = f
        .guard
        .authorize_action(&business, &ActionSpec::create_task(), AuditAction::CreateTask, EntityType::Task, &ctx())?;
    assert!(permit.target().is_none());
    let created = Uuid::new_v4();
    permit.complete_created(created, "title=quarterly review");

    let viewer = member(Role::Viewer, f.org);
    let denied = f
        .guard
        .authorize_action(&viewer, &ActionSpec::create_task(), AuditAction::CreateTask, EntityType::Task, &ctx());
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let entries = f.recorder.entries.lock().unwrap();
    assert_eq!(entries[0].entity_id, Some(created));
    assert_eq!(entries[1].action, AuditAction::AccessDenied);
    assert_eq!(entries[1].entity_id, None);
    Ok(())
}

#[tokio::test]
async fn ordinary_reads_follow_configuration() -> Result<()> {
    let quiet = fixture(AuditConfig::default());
    let dev = member(Role::Developer, quiet.org);
    let permit = quiet
        .guard
        .authorize_entity(&dev, &ActionSpec::view(), AuditAction::ViewTask, EntityType::Task, quiet.task.entity_id, &ctx())
        .await?;
    assert!(!permit.is_recorded());
    permit.complete();
    assert!(quiet.recorder.actions().is_empty());

    let verbose = fixture(AuditConfig {
        record_reads: true,
        ..AuditConfig::default()
    });
    let dev = member(Role::Developer, verbose.org);
    let permit = verbose
        .guard
        .authorize_entity(&dev, &ActionSpec::view(), AuditAction::ViewTask, EntityType::Task, verbose.task.entity_id, &ctx())
        .await?;
    assert!(permit.is_recorded());
    permit.complete();
    assert_eq!(verbose.recorder.actions(), vec![AuditAction::ViewTask]);
    Ok(())
}

#[tokio::test]
async fn sensitive_reads_are_always_recorded() -> Result<()> {
    let f = fixture(AuditConfig::default());
    let admin = member(Role::Admin, f.org);

    f.guard
        .authorize_action(&admin, &ActionSpec::view_audit_log(), AuditAction::ViewAuditLog, EntityType::AuditLog, &ctx())?
        .complete_with("page=1");

    let manager = member(Role::Manager, f.org);
    let denied = f
        .guard
        .authorize_action(&manager, &ActionSpec::view_audit_log(), AuditAction::ViewAuditLog, EntityType::AuditLog, &ctx());
    assert!(denied.is_err());

    assert_eq!(
        f.recorder.actions(),
        vec![AuditAction::ViewAuditLog, AuditAction::AccessDenied]
    );
    Ok(())
}

#[tokio::test]
async fn listings_are_filtered_by_scope() -> Result<()> {
    let f = fixture(AuditConfig::default());
    let dev = member(Role::Developer, f.org);
    let mine = EntityDescriptor::task(Uuid::new_v4()).with_assignee(dev.user_id());
    let foreign = EntityDescriptor::task(Uuid::new_v4()).in_team(Uuid::new_v4(), Uuid::new_v4());
    let candidates = vec![f.task.clone(), foreign, mine.clone()];

    let visible = f.guard.filter_listing(
        &dev,
        &ActionSpec::view(),
        AuditAction::ViewTasks,
        EntityType::Task,
        &candidates,
        &ctx(),
    )?;
    assert_eq!(visible, vec![&f.task, &mine]);
    assert!(f.recorder.actions().is_empty());
    Ok(())
}

#[tokio::test]
async fn user_listing_requires_users_manage() -> Result<()> {
    let f = fixture(AuditConfig::default());
    let dev = member(Role::Developer, f.org);
    let users = vec![
        EntityDescriptor::user(dev.user_id(), Some(f.org)),
        EntityDescriptor::user(Uuid::new_v4(), Some(f.org)),
        EntityDescriptor::user(Uuid::new_v4(), Some(Uuid::new_v4())),
    ];

    let denied = f.guard.filter_listing(
        &dev,
        &ActionSpec::list_users(),
        AuditAction::ViewUsers,
        EntityType::User,
        &users,
        &ctx(),
    );
    assert!(matches!(denied, Err(AppError::Forbidden(ref m)) if m == "access denied"));

    let manager = member(Role::Manager, f.org).with_permissions([permissions::USERS_MANAGE]);
    let visible = f.guard.filter_listing(
        &manager,
        &ActionSpec::list_users(),
        AuditAction::ViewUsers,
        EntityType::User,
        &users,
        &ctx(),
    )?;
    assert_eq!(visible.len(), 3);

    assert_eq!(
        f.recorder.actions(),
        vec![AuditAction::AccessDenied, AuditAction::ViewUsers]
    );
    let entries = f.recorder.entries.lock().unwrap();
    assert_eq!(entries[0].actor_id, dev.user_id());
    assert!(entries[0].details.as_deref().unwrap_or_default().starts_with("VIEW_USERS"));
    assert_eq!(entries[1].details.as_deref(), Some("3 of 3 visible"));
    Ok(())
}

#[tokio::test]
async fn colleagues_profiles_are_not_shared_by_organization() -> Result<()> {
    let org = Uuid::new_v4();
    let dev = member(Role::Developer, org);
    let colleague = EntityDescriptor::user(Uuid::new_v4(), Some(org));
    let lookup = MemoryLookup::default()
        .with(colleague.clone())
        .with(EntityDescriptor::user(dev.user_id(), Some(org)));
    let recorder = Arc::new(CollectingRecorder::default());
    let guard = AccessGuard::new(Arc::new(lookup), recorder.clone(), AuditConfig::default());

    let denied = guard
        .authorize_entity(&dev, &ActionSpec::view(), AuditAction::ViewUser, EntityType::User, colleague.entity_id, &ctx())
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let permit = guard
        .authorize_entity(&dev, &ActionSpec::view(), AuditAction::ViewUser, EntityType::User, dev.user_id(), &ctx())
        .await?;
    assert_eq!(permit.decision().reason, DecisionReason::AssigneeOrCreatorMatch);
    permit.complete();

    let admin = member(Role::Admin, Uuid::new_v4());
    guard
        .authorize_entity(&admin, &ActionSpec::view(), AuditAction::ViewUser, EntityType::User, colleague.entity_id, &ctx())
        .await?
        .complete();

    assert_eq!(
        recorder.actions(),
        vec![AuditAction::AccessDenied, AuditAction::ViewUser, AuditAction::ViewUser]
    );
    Ok(())
}

#[tokio::test]
async fn team_management_is_recorded() -> Result<()> {
    let org = Uuid::new_v4();
    let team = EntityDescriptor::team(Uuid::new_v4(), org);
    let lookup = MemoryLookup::default().with(team.clone());
    let recorder = Arc::new(CollectingRecorder::default());
    let guard = AccessGuard::new(Arc::new(lookup), recorder.clone(), AuditConfig::default());

    let manager = member(Role::Manager, org).with_permissions([permissions::TEAMS_MANAGE]);
    guard
        .authorize_entity(&manager, &ActionSpec::manage_team(), AuditAction::ManageTeam, EntityType::Team, team.entity_id, &ctx())
        .await?
        .complete_with("member added");

    let dev = member(Role::Developer, org);
    let denied = guard
        .authorize_entity(&dev, &ActionSpec::manage_team(), AuditAction::ManageTeam, EntityType::Team, team.entity_id, &ctx())
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    assert_eq!(
        recorder.actions(),
        vec![AuditAction::ManageTeam, AuditAction::AccessDenied]
    );
    let entries = recorder.entries.lock().unwrap();
    assert_eq!(entries[0].entity_id, Some(team.entity_id));
    assert_eq!(entries[0].action.as_str(), "MANAGE_TEAM");
    assert_eq!(entries[1].actor_id, dev.user_id());
    Ok(())
}
