//! Runtime configuration, read from the environment (and `.env` via dotenvy).

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{Error, Result};

const DEV_JWT_SECRET: &str = "hostel-dashboard-dev-secret";

#[derive(Debug, Clone)]
pub struct Config {
    /// Sled data directory.
    pub data_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub gemini: GeminiConfig,
    /// Directory for rolling log files; stdout only when unset.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("hostel_data"),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 11111)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_secs: 3600,
            gemini: GeminiConfig::default(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Load `.env` (if present) and build the config from process variables.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// True when no `HOSTEL_JWT_SECRET` was supplied.
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = match get("HOSTEL_BIND") {
            Some(raw) => raw
                .parse()
                .map_err(|e| Error::Config(format!("HOSTEL_BIND={raw}: {e}")))?,
            None => defaults.bind_addr,
        };

        let token_ttl_secs = match get("HOSTEL_TOKEN_TTL_SECS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|ttl| *ttl > 0)
                .ok_or_else(|| Error::Config(format!("HOSTEL_TOKEN_TTL_SECS={raw} is not a positive integer")))?,
            None => defaults.token_ttl_secs,
        };

        let jwt_secret = get("HOSTEL_JWT_SECRET").unwrap_or(defaults.jwt_secret);

        Ok(Self {
            data_path: get("HOSTEL_DATA_PATH").map(PathBuf::from).unwrap_or(defaults.data_path),
            bind_addr,
            jwt_secret,
            token_ttl_secs,
            gemini: GeminiConfig {
                api_key: get("GEMINI_API_KEY"),
                model: get("GEMINI_MODEL").unwrap_or(defaults.gemini.model),
                base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.gemini.base_url),
            },
            log_dir: get("HOSTEL_LOG_DIR").map(PathBuf::from),
        })
    }
}
