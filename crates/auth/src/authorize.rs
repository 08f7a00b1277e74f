use serde::Serialize;
use thiserror::Error;

use crate::{Permission, PrincipalId, Role, permissions_for_roles};

/// A fully resolved principal for authorization decisions.
///
/// Built by the transport layer from verified claims; holds the effective
/// permissions so checks need no further lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Resolve permissions from roles using the static role policy.
    pub fn from_roles(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self {
            principal_id,
            roles,
            permissions,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Proof that `principal_id` was granted `permission`.
///
/// Only [`authorize`] mints capabilities. Operations that need a permission
/// take a `&Capability` argument and check [`Capability::permits`], so the
/// grant travels explicitly with the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    principal_id: PrincipalId,
    permission: Permission,
}

impl Capability {
    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn permission(&self) -> &Permission {
        &self.permission
    }

    pub fn permits(&self, required: &Permission) -> bool {
        &self.permission == required
    }
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<Capability, AuthzError> {
    let granted = principal
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(Capability {
            principal_id: principal.principal_id,
            permission: required.clone(),
        })
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
