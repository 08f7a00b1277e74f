use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "orders.read"). The wildcard `"*"`
/// grants everything and is only handed out by the role policy for admins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// Read orders (lists, detail, tracking lookup).
    pub const ORDERS_READ: Permission = Permission(Cow::Borrowed("orders.read"));
    /// Create orders.
    pub const ORDERS_CREATE: Permission = Permission(Cow::Borrowed("orders.create"));
    /// Delete orders.
    pub const ORDERS_DELETE: Permission = Permission(Cow::Borrowed("orders.delete"));
    /// Run scan sessions and commit dispatches.
    pub const DISPATCH_SCAN: Permission = Permission(Cow::Borrowed("dispatch.scan"));
    /// Everything.
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
