use std::env;
use std::time::Duration;

use lazy_static::lazy_static;

use crate::constants::{DEFAULT_MAX_UPLOAD_MIB, DEFAULT_SESSION_TTL_SECS};

lazy_static! {
    pub static ref SETTINGS: Settings = Settings::from_env();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub session_backend: SessionBackend,
    pub redis_host: String,
    pub redis_port: String,
    pub session_ttl: Duration,
    pub max_upload_mib: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            session_backend: SessionBackend::Memory,
            redis_host: "127.0.0.1".to_string(),
            redis_port: "6379".to_string(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            max_upload_mib: DEFAULT_MAX_UPLOAD_MIB,
        }
    }
}

impl Settings {
    /// Reads settings from the environment (and `.env`, once `dotenv` has run).
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Settings {
        Settings::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Settings {
        let defaults = Settings::default();
        let session_backend = match lookup("SESSION_BACKEND").as_deref() {
            Some("redis") => SessionBackend::Redis,
            Some("memory") | None => SessionBackend::Memory,
            Some(other) => {
                log::warn!("unknown SESSION_BACKEND {:?}, using memory", other);
                SessionBackend::Memory
            }
        };
        let session_ttl = lookup("SESSION_TTL_SECS")
            .and_then(|v| v.trim().parse().ok())
            .filter(|&s: &u64| s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_ttl);
        let max_upload_mib = lookup("MAX_UPLOAD_MIB")
            .and_then(|v| v.trim().parse().ok())
            .filter(|&m: &u64| m > 0)
            .unwrap_or(defaults.max_upload_mib);
        Settings {
            session_backend,
            redis_host: lookup("REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: lookup("REDIS_PORT").unwrap_or(defaults.redis_port),
            session_ttl,
            max_upload_mib,
        }
    }
}
