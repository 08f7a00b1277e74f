//! API-side authorization guard.
//!
//! Resolves the request principal against the static role policy and mints
//! the [`Capability`] that the scan service and order handlers require.

use shipcheck_auth::{AuthzError, Capability, Permission, Principal, authorize};

use crate::context::PrincipalContext;

/// Check `required` for the current request principal.
pub fn capability_for(
    principal: &PrincipalContext,
    required: &Permission,
) -> Result<Capability, AuthzError> {
    let principal = Principal::from_roles(principal.principal_id(), principal.roles().to_vec());
    authorize(&principal, required)
}

#[cfg(test)]
mod tests {
    use shipcheck_auth::{PrincipalId, Role};

    use super::*;

    #[test]
    fn warehouse_may_scan_but_not_delete() {
        let ctx = PrincipalContext::new(PrincipalId::new(), vec![Role::WAREHOUSE]);
        assert!(capability_for(&ctx, &Permission::DISPATCH_SCAN).is_ok());
        assert!(capability_for(&ctx, &Permission::ORDERS_DELETE).is_err());
    }

    #[test]
    fn no_roles_means_no_access() {
        let ctx = PrincipalContext::new(PrincipalId::new(), vec![]);
        assert!(matches!(
            capability_for(&ctx, &Permission::ORDERS_READ),
            Err(AuthzError::Forbidden(_))
        ));
    }
}
