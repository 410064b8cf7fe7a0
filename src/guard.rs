use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry, AuditRecorder, RequestContext};
use crate::authz::{reachable, AccessDecision, AccessPolicy, ActionSpec, DecisionEngine, IdentityContext};
use crate::config::AuditConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{EntityDescriptor, EntityType};

/// Resolves the scope-relevant fields of a stored entity.
#[async_trait]
pub trait EntityLookup: Send + Sync {
    /// `Ok(None)` when no such entity exists.
    async fn describe(&self, entity_type: EntityType, entity_id: Uuid) -> AppResult<Option<EntityDescriptor>>;
}

/// Command boundary: looks the target up, asks the policy, records the outcome.
///
/// Every denial surfaces as the same `Forbidden`; the decision reason only
/// reaches logs and the audit trail.
#[derive(Clone)]
pub struct AccessGuard {
    policy: Arc<dyn AccessPolicy>,
    lookup: Arc<dyn EntityLookup>,
    recorder: Arc<dyn AuditRecorder>,
    config: AuditConfig,
}

impl AccessGuard {
    pub fn new(lookup: Arc<dyn EntityLookup>, recorder: Arc<dyn AuditRecorder>, config: AuditConfig) -> Self {
        Self {
            policy: Arc::new(DecisionEngine::new()),
            lookup,
            recorder,
            config,
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// For actions without an existing target, such as creation.
    pub fn authorize_action(
        &self,
        identity: &IdentityContext,
        action: &ActionSpec,
        audit: AuditAction,
        entity_type: EntityType,
        context: &RequestContext,
    ) -> AppResult<Permit> {
        let decision = self.policy.authorize(identity, action, None);
        self.settle(identity, decision, audit, entity_type, None, context)
    }

    /// For actions on a stored entity. A missing entity is `NotFound`.
    pub async fn authorize_entity(
        &self,
        identity: &IdentityContext,
        action: &ActionSpec,
        audit: AuditAction,
        entity_type: EntityType,
        entity_id: Uuid,
        context: &RequestContext,
    ) -> AppResult<Permit> {
        let target = self
            .lookup
            .describe(entity_type, entity_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("{entity_type} not found")))?;

        let decision = self.policy.authorize(identity, action, Some(&target));
        self.settle(identity, decision, audit, entity_type, Some(target), context)
    }

    /// Narrows a listing to what the identity can reach, recording the read
    /// when the action calls for it. A listing whose action names a
    /// permission, such as [`ActionSpec::list_users`], is refused outright
    /// without it.
    pub fn filter_listing<'a>(
        &self,
        identity: &IdentityContext,
        action: &ActionSpec,
        audit: AuditAction,
        entity_type: EntityType,
        candidates: &'a [EntityDescriptor],
        context: &RequestContext,
    ) -> AppResult<Vec<&'a EntityDescriptor>> {
        if action.permission.is_some() {
            let decision = self.policy.authorize(identity, action, None);
            if !decision.is_allowed() {
                return Err(self.deny(identity, decision, audit, entity_type, None, context));
            }
        }

        let visible = reachable(identity, candidates.iter());
        if self.should_record(audit) {
            let entry = AuditEntry::new(identity.user_id(), audit, entity_type)
                .with_details(format!("{} of {} visible", visible.len(), candidates.len()))
                .with_context(context);
            self.recorder.record(entry);
        }
        Ok(visible)
    }

    fn should_record(&self, audit: AuditAction) -> bool {
        audit.is_mandatory() || self.config.record_reads
    }

    fn deny(
        &self,
        identity: &IdentityContext,
        decision: AccessDecision,
        audit: AuditAction,
        entity_type: EntityType,
        entity_id: Option<Uuid>,
        context: &RequestContext,
    ) -> AppError {
        tracing::warn!(
            user_id = %identity.user_id(),
            action = %audit,
            entity_type = %entity_type,
            entity_id = ?entity_id,
            reason = ?decision.reason,
            "access denied"
        );

        if self.should_record(audit) {
            let mut entry = AuditEntry::new(identity.user_id(), AuditAction::AccessDenied, entity_type)
                .with_details(format!("{audit} ({:?})", decision.reason))
                .with_context(context);
            entry.entity_id = entity_id;
            self.recorder.record(entry);
        }

        AppError::forbidden()
    }

    fn settle(
        &self,
        identity: &IdentityContext,
        decision: AccessDecision,
        audit: AuditAction,
        entity_type: EntityType,
        target: Option<EntityDescriptor>,
        context: &RequestContext,
    ) -> AppResult<Permit> {
        if !decision.is_allowed() {
            let entity_id = target.as_ref().map(|t| t.entity_id);
            return Err(self.deny(identity, decision, audit, entity_type, entity_id, context));
        }

        let recorder = self.should_record(audit).then(|| Arc::clone(&self.recorder));

        Ok(Permit {
            decision,
            actor_id: identity.user_id(),
            audit,
            entity_type,
            target,
            context: context.clone(),
            recorder,
        })
    }
}

/// Proof that an action was allowed. Completing it writes the audit entry
/// for the action, so complete it after the action has been carried out.
#[must_use = "complete the permit once the action has been carried out"]
pub struct Permit {
    decision: AccessDecision,
    actor_id: Uuid,
    audit: AuditAction,
    entity_type: EntityType,
    target: Option<EntityDescriptor>,
    context: RequestContext,
    recorder: Option<Arc<dyn AuditRecorder>>,
}

impl Permit {
    pub fn decision(&self) -> AccessDecision {
        self.decision
    }

    pub fn target(&self) -> Option<&EntityDescriptor> {
        self.target.as_ref()
    }

    /// Whether completing this permit writes an audit entry.
    pub fn is_recorded(&self) -> bool {
        self.recorder.is_some()
    }

    pub fn complete(self) {
        let entity_id = self.target.as_ref().map(|t| t.entity_id);
        self.finish(entity_id, None);
    }

    pub fn complete_with(self, details: impl Into<String>) {
        let entity_id = self.target.as_ref().map(|t| t.entity_id);
        self.finish(entity_id, Some(details.into()));
    }

    /// For creations, once the new entity has an id.
    pub fn complete_created(self, entity_id: Uuid, details: impl Into<String>) {
        self.finish(Some(entity_id), Some(details.into()));
    }

    fn finish(self, entity_id: Option<Uuid>, details: Option<String>) {
        let Some(recorder) = self.recorder else {
            return;
        };

        let mut entry = AuditEntry::new(self.actor_id, self.audit, self.entity_type).with_context(&self.context);
        entry.entity_id = entity_id;
        entry.details = details;
        recorder.record(entry);
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("decision", &self.decision)
            .field("actor_id", &self.actor_id)
            .field("audit", &self.audit)
            .field("entity_type", &self.entity_type)
            .field("target", &self.target)
            .field("recorded", &self.recorder.is_some())
            .finish()
    }
}
