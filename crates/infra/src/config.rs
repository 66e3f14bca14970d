//! Gateway configuration loaded from the environment.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `CIVICGATE_STORAGE` | `memory` or `postgres` | `memory` |
//! | `DATABASE_URL` | Postgres connection string | required for `postgres` |
//! | `CIVICGATE_DB_MAX_CONNECTIONS` | pool size | `10` |
//! | `CIVICGATE_HANDLER_TIMEOUT_MS` | per-handler timeout | `5000` |
//! | `CIVICGATE_DEFAULT_QUERY_LIMIT` | default list limit | `100` |
//! | `CIVICGATE_MAX_QUERY_LIMIT` | list limit cap | `1000` |
//! | `CIVICGATE_LOG_FORMAT` | `json` or `pretty` | `json` |

use std::time::Duration;

use thiserror::Error;

pub use civicgate_observability::LogFormat;

use crate::gateway::DEFAULT_HANDLER_TIMEOUT;
use crate::query_service::{DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Where event records are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub storage: StorageBackend,
    pub handler_timeout: Duration,
    pub default_query_limit: u32,
    pub max_query_limit: u32,
    pub log_format: LogFormat,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::InMemory,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            default_query_limit: DEFAULT_QUERY_LIMIT,
            max_query_limit: MAX_QUERY_LIMIT,
            log_format: LogFormat::Json,
        }
    }
}

impl GatewayConfig {
    /// Read configuration from the process environment (after loading `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "failed to load .env file; using process environment only");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let storage = match get("CIVICGATE_STORAGE").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("memory") | Some("in_memory") => StorageBackend::InMemory,
            Some("postgres") | Some("postgresql") => StorageBackend::Postgres {
                database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                max_connections: parse_u32(&get, "CIVICGATE_DB_MAX_CONNECTIONS", 10)?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "CIVICGATE_STORAGE",
                    value: other.to_string(),
                    reason: "expected `memory` or `postgres`".to_string(),
                });
            }
        };

        let timeout_ms = parse_u32(
            &get,
            "CIVICGATE_HANDLER_TIMEOUT_MS",
            DEFAULT_HANDLER_TIMEOUT.as_millis() as u32,
        )?;
        let default_query_limit = parse_u32(&get, "CIVICGATE_DEFAULT_QUERY_LIMIT", DEFAULT_QUERY_LIMIT)?;
        let max_query_limit = parse_u32(&get, "CIVICGATE_MAX_QUERY_LIMIT", MAX_QUERY_LIMIT)?;

        if default_query_limit > max_query_limit {
            return Err(ConfigError::Invalid {
                key: "CIVICGATE_DEFAULT_QUERY_LIMIT",
                value: default_query_limit.to_string(),
                reason: format!("must not exceed CIVICGATE_MAX_QUERY_LIMIT ({max_query_limit})"),
            });
        }

        let log_format = match get("CIVICGATE_LOG_FORMAT") {
            None => LogFormat::default(),
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                key: "CIVICGATE_LOG_FORMAT",
                value: raw.clone(),
                reason,
            })?,
        };

        Ok(Self {
            storage,
            handler_timeout: Duration::from_millis(u64::from(timeout_ms)),
            default_query_limit,
            max_query_limit,
            log_format,
        })
    }
}

/// Parse a strictly positive integer setting, falling back to `default` when unset.
fn parse_u32<G>(get: &G, key: &'static str, default: u32) -> Result<u32, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.parse::<u32>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(v) => Ok(v),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}
