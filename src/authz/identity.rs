use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of roles, most privileged first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Admin,
    Manager,
    Developer,
    #[serde(rename = "QA")]
    Qa,
    Business,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Owner,
        Role::Admin,
        Role::Manager,
        Role::Developer,
        Role::Qa,
        Role::Business,
        Role::Viewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "Owner",
            Role::Admin => "Admin",
            Role::Manager => "Manager",
            Role::Developer => "Developer",
            Role::Qa => "QA",
            Role::Business => "Business",
            Role::Viewer => "Viewer",
        }
    }

    /// Level used when the authentication layer supplies none.
    pub fn default_level(&self) -> u8 {
        match self {
            Role::Owner => 1,
            Role::Admin => 2,
            Role::Manager => 3,
            Role::Developer => 4,
            Role::Qa => 5,
            Role::Business => 6,
            Role::Viewer => 7,
        }
    }

    pub fn is_owner_or_admin(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| IdentityError::UnknownRole(trimmed.to_string()))
    }
}

/// Reasons an identity cannot be built. All of them mean "unauthenticated".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("identity subject missing")]
    MissingSubject,
    #[error("identity subject is not a valid user id: {0}")]
    InvalidSubject(String),
    #[error("identity role missing")]
    MissingRole,
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("role level must be at least 1")]
    InvalidRoleLevel,
    #[error("invalid {field} id: {value}")]
    InvalidScopeId { field: &'static str, value: String },
}

/// Claims as handed over by the authentication layer, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub role_level: Option<u8>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Validated snapshot of the authenticated principal for one request.
///
/// Fields are private so every instance has passed validation; the decision
/// logic never sees a nil user id or an unknown role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityContext {
    user_id: Uuid,
    role: Role,
    role_level: u8,
    organization_id: Option<Uuid>,
    team_id: Option<Uuid>,
    permissions: HashSet<String>,
}

impl IdentityContext {
    pub fn new(user_id: Uuid, role: Role) -> Result<Self, IdentityError> {
        if user_id.is_nil() {
            return Err(IdentityError::InvalidSubject(user_id.to_string()));
        }

        Ok(Self {
            user_id,
            role,
            role_level: role.default_level(),
            organization_id: None,
            team_id: None,
            permissions: HashSet::new(),
        })
    }

    pub fn from_claims(claims: IdentityClaims) -> Result<Self, IdentityError> {
        let sub = claims
            .sub
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(IdentityError::MissingSubject)?;
        let user_id =
            Uuid::parse_str(sub).map_err(|_| IdentityError::InvalidSubject(sub.to_string()))?;

        let role: Role = claims
            .role
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(IdentityError::MissingRole)?
            .parse()?;

        let mut identity = Self::new(user_id, role)?;
        if let Some(level) = claims.role_level {
            identity = identity.with_role_level(level)?;
        }

        identity.organization_id = parse_scope_id("organization", claims.organization)?;
        identity.team_id = parse_scope_id("team", claims.team)?;
        identity.permissions = claims
            .permissions
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        Ok(identity)
    }

    pub fn with_role_level(mut self, level: u8) -> Result<Self, IdentityError> {
        if level == 0 {
            return Err(IdentityError::InvalidRoleLevel);
        }
        self.role_level = level;
        Ok(self)
    }

    pub fn with_organization(mut self, organization_id: Uuid) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_team(mut self, team_id: Uuid) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub fn with_permissions<I, P>(mut self, perms: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.permissions = perms.into_iter().map(Into::into).collect();
        self
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn role_level(&self) -> u8 {
        self.role_level
    }

    pub fn organization_id(&self) -> Option<Uuid> {
        self.organization_id
    }

    pub fn team_id(&self) -> Option<Uuid> {
        self.team_id
    }

    pub fn permissions(&self) -> &HashSet<String> {
        &self.permissions
    }

    /// Explicit grant only; role-implied grants live in the permission resolver.
    pub fn has_explicit_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// True when the role is at least as privileged as `max_level`.
    pub fn has_role_level(&self, max_level: u8) -> bool {
        self.role_level <= max_level
    }

    /// Organization equality; an unaffiliated identity or an unscoped entity never matches.
    pub fn is_member_of(&self, organization_id: Option<Uuid>) -> bool {
        matches!(
            (self.organization_id, organization_id),
            (Some(mine), Some(theirs)) if mine == theirs
        )
    }
}

fn parse_scope_id(field: &'static str, value: Option<String>) -> Result<Option<Uuid>, IdentityError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| IdentityError::InvalidScopeId {
                field,
                value: raw.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, role: &str) -> IdentityClaims {
        IdentityClaims {
            sub: Some(sub.to_string()),
            role: Some(role.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn claims_build_a_full_identity() {
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let team = Uuid::new_v4();
        let identity = IdentityContext::from_claims(IdentityClaims {
            organization: Some(org.to_string()),
            team: Some(team.to_string()),
            role_level: Some(4),
            permissions: vec!["tasks.update".into(), " ".into()],
            ..claims(&user.to_string(), "developer")
        })
        .unwrap();

        assert_eq!(identity.user_id(), user);
        assert_eq!(identity.role(), Role::Developer);
        assert_eq!(identity.organization_id(), Some(org));
        assert_eq!(identity.team_id(), Some(team));
        assert_eq!(identity.permissions().len(), 1);
        assert!(identity.has_explicit_permission("tasks.update"));
    }

    #[test]
    fn malformed_subjects_are_rejected() {
        assert_eq!(
            IdentityContext::from_claims(IdentityClaims::default()),
            Err(IdentityError::MissingSubject)
        );
        assert!(matches!(
            IdentityContext::from_claims(claims("42", "Owner")),
            Err(IdentityError::InvalidSubject(_))
        ));
        assert!(matches!(
            IdentityContext::from_claims(claims(&Uuid::nil().to_string(), "Owner")),
            Err(IdentityError::InvalidSubject(_))
        ));
    }

    #[test]
    fn unknown_or_missing_role_is_rejected() {
        let sub = Uuid::new_v4().to_string();
        assert_eq!(
            IdentityContext::from_claims(claims(&sub, "Janitor")),
            Err(IdentityError::UnknownRole("Janitor".into()))
        );
        assert_eq!(
            IdentityContext::from_claims(IdentityClaims {
                sub: Some(sub),
                ..Default::default()
            }),
            Err(IdentityError::MissingRole)
        );
    }

    #[test]
    fn bad_scope_ids_and_levels_are_rejected() {
        let sub = Uuid::new_v4().to_string();
        assert!(matches!(
            IdentityContext::from_claims(IdentityClaims {
                organization: Some("acme".into()),
                ..claims(&sub, "Manager")
            }),
            Err(IdentityError::InvalidScopeId { field: "organization", .. })
        ));
        assert_eq!(
            IdentityContext::from_claims(IdentityClaims {
                role_level: Some(0),
                ..claims(&sub, "Manager")
            }),
            Err(IdentityError::InvalidRoleLevel)
        );
    }

    #[test]
    fn role_level_comparison() {
        let identity = IdentityContext::new(Uuid::new_v4(), Role::Manager).unwrap();
        assert_eq!(identity.role_level(), 3);
        assert!(identity.has_role_level(3));
        assert!(identity.has_role_level(7));
        assert!(!identity.has_role_level(2));
    }

    #[test]
    fn membership_requires_both_sides() {
        let org = Uuid::new_v4();
        let unaffiliated = IdentityContext::new(Uuid::new_v4(), Role::Viewer).unwrap();
        assert!(!unaffiliated.is_member_of(None));
        assert!(!unaffiliated.is_member_of(Some(org)));

        let member = unaffiliated.with_organization(org);
        assert!(member.is_member_of(Some(org)));
        assert!(!member.is_member_of(None));
        assert!(!member.is_member_of(Some(Uuid::new_v4())));
    }
}
