//! Authorization decisions and audit trail for the MissionBoard task tracker.
//!
//! [`authz`] holds the pure decision core. [`guard`] is its caller at the
//! command boundary, backed by the lookups in [`db`] and the recorder in
//! [`audit`].

pub mod audit;
pub mod authz;
pub mod config;
pub mod db;
pub mod errors;
pub mod extract;
pub mod guard;
pub mod models;
pub mod telemetry;

pub use audit::{audit_channel, AuditAction, AuditEntry, AuditRecorder, ChannelAuditRecorder, RequestContext};
pub use authz::{authorize, has_permission, AccessDecision, ActionKind, ActionSpec, IdentityContext, Role};
pub use config::AuditConfig;
pub use errors::{AppError, AppResult};
pub use guard::{AccessGuard, EntityLookup, Permit};
pub use models::{EntityDescriptor, EntityType, Task, TaskStatus};
