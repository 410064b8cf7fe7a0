use serde::Serialize;

use super::identity::{IdentityContext, Role};

/// Permissions under this prefix are never implied by the Admin role.
///
/// This is a naming convention: a restricted permission that is not named
/// with the prefix would be implied for Admins.
pub const RESTRICTED_PREFIX: &str = "system.";

/// Which rule granted a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionSource {
    Explicit,
    OwnerRole,
    AdminRole,
}

pub fn is_restricted(permission: &str) -> bool {
    permission.starts_with(RESTRICTED_PREFIX)
}

/// Resolution order: explicit grant, then Owner, then Admin for non-restricted names.
pub fn permission_source(identity: &IdentityContext, permission: &str) -> Option<PermissionSource> {
    if identity.has_explicit_permission(permission) {
        return Some(PermissionSource::Explicit);
    }

    match identity.role() {
        Role::Owner => Some(PermissionSource::OwnerRole),
        Role::Admin if !is_restricted(permission) => Some(PermissionSource::AdminRole),
        _ => None,
    }
}

pub fn has_permission(identity: &IdentityContext, permission: &str) -> bool {
    permission_source(identity, permission).is_some()
}
