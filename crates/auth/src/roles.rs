use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const WAREHOUSE: Role = Role(Cow::Borrowed("warehouse"));
    pub const SALES: Role = Role(Cow::Borrowed("sales"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role → permission policy.
///
/// - `admin`: everything
/// - `warehouse`: read orders, scan and dispatch
/// - `sales`: read and create orders
///
/// Unknown roles grant nothing.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut granted: Vec<Permission> = Vec::new();

    for role in roles {
        let perms = match role.as_str() {
            "admin" => vec![Permission::WILDCARD],
            "warehouse" => vec![Permission::ORDERS_READ, Permission::DISPATCH_SCAN],
            "sales" => vec![Permission::ORDERS_READ, Permission::ORDERS_CREATE],
            _ => Vec::new(),
        };
        for p in perms {
            if !granted.contains(&p) {
                granted.push(p);
            }
        }
    }

    granted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warehouse_can_scan_but_not_create() {
        let perms = permissions_for_roles(&[Role::WAREHOUSE]);
        assert!(perms.contains(&Permission::DISPATCH_SCAN));
        assert!(!perms.contains(&Permission::ORDERS_CREATE));
    }

    #[test]
    fn overlapping_roles_do_not_duplicate() {
        let perms = permissions_for_roles(&[Role::WAREHOUSE, Role::SALES]);
        assert_eq!(
            perms.iter().filter(|p| **p == Permission::ORDERS_READ).count(),
            1
        );
    }

    #[test]
    fn unknown_role_grants_nothing() {
        assert!(permissions_for_roles(&[Role::new("viewer")]).is_empty());
    }
}
