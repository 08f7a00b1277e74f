//! Service configuration.
//!
//! Loaded once at startup from environment variables. Tests build configs
//! through [`AppConfig::from_lookup`] instead of touching the process env.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use shipcheck_orders::PartsSchema;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 900;
const DEV_JWT_SECRET: &str = "dev-secret";

/// Runtime configuration.
///
/// Custom `Debug` redacts the JWT secret and database URL.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres connection string; `None` runs on the in-memory store.
    pub database_url: Option<String>,
    /// Scan sessions untouched for this long are evicted.
    pub session_idle_timeout: Duration,
    pub parts_schema: PartsSchema,
    /// `true` when `JWT_SECRET` was absent and the dev default is in use.
    pub using_dev_secret: bool,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"[REDACTED]")
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("session_idle_timeout", &self.session_idle_timeout)
            .field("parts_schema", &self.parts_schema)
            .field("using_dev_secret", &self.using_dev_secret)
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `SHIPCHECK_BIND_ADDR` (default: `0.0.0.0:8080`)
    /// - `JWT_SECRET` (default: insecure dev secret)
    /// - `DATABASE_URL` (optional; absent means in-memory store)
    /// - `SHIPCHECK_SESSION_IDLE_SECS` (default: 900)
    /// - `SHIPCHECK_PARTS_SCHEMA` (`entries` | `legacy-flat`, default: `entries`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("SHIPCHECK_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid("SHIPCHECK_BIND_ADDR", e.to_string()))?;

        let (jwt_secret, using_dev_secret) = match get("JWT_SECRET") {
            Some(secret) => (secret, false),
            None => (DEV_JWT_SECRET.to_string(), true),
        };

        let session_idle_secs = match get("SHIPCHECK_SESSION_IDLE_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| ConfigError::invalid("SHIPCHECK_SESSION_IDLE_SECS", e.to_string()))?,
            None => DEFAULT_SESSION_IDLE_SECS,
        };
        if session_idle_secs == 0 {
            return Err(ConfigError::invalid(
                "SHIPCHECK_SESSION_IDLE_SECS",
                "must be greater than zero",
            ));
        }

        let parts_schema = match get("SHIPCHECK_PARTS_SCHEMA") {
            Some(raw) => raw
                .parse::<PartsSchema>()
                .map_err(|e| ConfigError::invalid("SHIPCHECK_PARTS_SCHEMA", e.to_string()))?,
            None => PartsSchema::default(),
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url: get("DATABASE_URL"),
            session_idle_timeout: Duration::from_secs(session_idle_secs),
            parts_schema,
            using_dev_secret,
        })
    }

    /// Config for tests and local runs: in-memory store, fixed secret.
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.into(),
            database_url: None,
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
            parts_schema: PartsSchema::default(),
            using_dev_secret: false,
        }
    }
}
