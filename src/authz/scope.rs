use serde::Serialize;

use super::identity::{IdentityContext, Role};
use super::permission::has_permission;
use super::permissions;
use crate::models::{EntityDescriptor, EntityType};

/// How an identity reached an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reach {
    /// Administrative bypass: Owner/Admin role, or `users.manage` for users.
    Override,
    /// Same organization as the entity.
    Organization,
    /// The identity is the entity's assignee, creator, author or the user itself.
    AssigneeOrCreator,
}

/// Single scope policy for every entity type.
///
/// Order per type: role bypass, organization equality, then the personal
/// relationship. Organizations and the audit log have no personal escape hatch.
/// Users are never reached through a shared organization: only themselves,
/// or by holders of `users.manage`.
pub fn reach(identity: &IdentityContext, target: &EntityDescriptor) -> Option<Reach> {
    let role = identity.role();

    match target.entity_type {
        EntityType::Organization => {
            if role == Role::Owner {
                return Some(Reach::Override);
            }
            identity
                .is_member_of(Some(target.entity_id))
                .then_some(Reach::Organization)
        }
        EntityType::AuditLog => role.is_owner_or_admin().then_some(Reach::Override),
        EntityType::User => {
            if has_permission(identity, permissions::USERS_MANAGE) {
                return Some(Reach::Override);
            }
            personal_reach(identity, target)
        }
        EntityType::Task | EntityType::Team | EntityType::Comment => {
            if role.is_owner_or_admin() {
                return Some(Reach::Override);
            }
            if identity.is_member_of(target.organization_id) {
                return Some(Reach::Organization);
            }
            personal_reach(identity, target)
        }
    }
}

pub fn can_reach(identity: &IdentityContext, target: &EntityDescriptor) -> bool {
    reach(identity, target).is_some()
}

/// Keeps only the descriptors the identity can reach, preserving order.
pub fn reachable<'a, I>(identity: &IdentityContext, targets: I) -> Vec<&'a EntityDescriptor>
where
    I: IntoIterator<Item = &'a EntityDescriptor>,
{
    targets
        .into_iter()
        .filter(|target| can_reach(identity, target))
        .collect()
}

fn personal_reach(identity: &IdentityContext, target: &EntityDescriptor) -> Option<Reach> {
    let me = Some(identity.user_id());

    let related = match target.entity_type {
        EntityType::Task => target.assignee_id == me || target.owner_id == me,
        EntityType::Comment => target.owner_id == me,
        EntityType::User => target.entity_id == identity.user_id(),
        EntityType::Team | EntityType::Organization | EntityType::AuditLog => false,
    };

    related.then_some(Reach::AssigneeOrCreator)
}
