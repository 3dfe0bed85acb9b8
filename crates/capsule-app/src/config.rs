use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use capsule_db::DEFAULT_COLLECTION;
use capsule_lifecycle::DEFAULT_REFRESH_PERIOD;

pub const DEFAULT_LOG_FILTER: &str = "capsule_db=info,capsule_lifecycle=info,capsule_app=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite file. `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    pub refresh_period: Duration,
    pub collection: String,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            refresh_period: DEFAULT_REFRESH_PERIOD,
            collection: DEFAULT_COLLECTION.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Read from the process environment, merging `.env` first if present.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env if present
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let refresh_period = match get("CAPSULE_REFRESH_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("CAPSULE_REFRESH_SECS is not a number: {:?}", raw))?;
                if secs == 0 {
                    bail!("CAPSULE_REFRESH_SECS must be greater than zero");
                }
                Duration::from_secs(secs)
            }
            None => defaults.refresh_period,
        };

        Ok(Self {
            db_path: get("CAPSULE_DB_PATH").map(PathBuf::from),
            refresh_period,
            collection: get("CAPSULE_COLLECTION").unwrap_or(defaults.collection),
            log_filter: get("CAPSULE_LOG").unwrap_or(defaults.log_filter),
        })
    }
}
