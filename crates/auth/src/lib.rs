//! `shipcheck-auth` : authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage. Callers turn a verified principal into an
//! explicit [`Capability`] and pass that capability into the operations it
//! unlocks; nothing here reads ambient global state.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, AuthzError, Capability, Principal};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use principal::PrincipalId;
pub use roles::{permissions_for_roles, Role};
