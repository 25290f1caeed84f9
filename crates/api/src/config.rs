//! Process configuration, read once from the environment.

use std::net::SocketAddr;

use chrono::Duration;
use thiserror::Error;

const DEV_JWT_SECRET: &str = "woodhop-dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not valid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("{0} is required when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

/// Operator account that can log in without a customer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAccount {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub session_ttl: Duration,
    pub login_link_ttl: Duration,
    /// Anonymous carts untouched for this long are dropped.
    pub cart_idle_ttl: Duration,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub admin: Option<AdminAccount>,
    /// bcrypt work factor for new password hashes.
    pub password_hash_cost: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            session_ttl: Duration::minutes(60),
            login_link_ttl: Duration::minutes(15),
            cart_idle_ttl: Duration::days(14),
            use_persistent_stores: false,
            database_url: None,
            admin: None,
            password_hash_cost: 12,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = match var("WOODHOP_BIND_ADDR") {
            Some(v) => v.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "WOODHOP_BIND_ADDR",
                reason: e.to_string(),
            })?,
            None => defaults.bind_addr,
        };

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            defaults.jwt_secret.clone()
        });

        let minutes = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match var(name) {
                Some(v) => {
                    let n: i64 = v.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                        name,
                        reason: e.to_string(),
                    })?;
                    if n <= 0 {
                        return Err(ConfigError::Invalid {
                            name,
                            reason: "must be a positive number of minutes".to_string(),
                        });
                    }
                    Ok(Duration::minutes(n))
                }
                None => Ok(default),
            }
        };

        let use_persistent_stores = match var("USE_PERSISTENT_STORES") {
            Some(v) => v.parse::<bool>().map_err(|e| ConfigError::Invalid {
                name: "USE_PERSISTENT_STORES",
                reason: e.to_string(),
            })?,
            None => false,
        };
        let database_url = var("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let admin = match (var("WOODHOP_ADMIN_EMAIL"), var("WOODHOP_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminAccount {
                email: email.to_lowercase(),
                password,
            }),
            _ => None,
        };

        let password_hash_cost = match var("PASSWORD_HASH_COST") {
            Some(v) => v.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                name: "PASSWORD_HASH_COST",
                reason: e.to_string(),
            })?,
            None => defaults.password_hash_cost,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            session_ttl: minutes("SESSION_TTL_MINUTES", defaults.session_ttl)?,
            login_link_ttl: minutes("LOGIN_LINK_TTL_MINUTES", defaults.login_link_ttl)?,
            cart_idle_ttl: minutes("CART_IDLE_TTL_MINUTES", defaults.cart_idle_ttl)?,
            use_persistent_stores,
            database_url,
            admin,
            password_hash_cost,
        })
    }
}
