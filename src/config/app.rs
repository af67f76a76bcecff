// src/config/app.rs
//! Service configuration: `config/app.toml` (optional) overlaid with env vars.
//!
//! ```toml
//! [ranking]
//! url = "http://ranking.internal:8000"
//! timeout_ms = 3000
//!
//! [storage]
//! database_path = "data/events.db"
//! ```

use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::ranking::DEFAULT_RANKING_TIMEOUT;

pub const ENV_APP_CONFIG_PATH: &str = "NEARBY_EVENTS_CONFIG_PATH";
pub const DEFAULT_APP_CONFIG_PATH: &str = "config/app.toml";

const ENV_RANKING_URL: &str = "RANKING_ENGINE_URL";
const ENV_RANKING_TIMEOUT_MS: &str = "RANKING_TIMEOUT_MS";
const ENV_DATABASE_PATH: &str = "DATABASE_PATH";

/// Upper bound for the ranking timeout; anything above is treated as a typo.
const MAX_RANKING_TIMEOUT_MS: u64 = 60_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_RANKING_TIMEOUT.as_millis() as u64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Base URL of the ranking engine; absent means ranking is disabled.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file; absent means the in-memory store.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config {}: {e}", path.display()))?;
        let mut cfg: AppConfig = toml::from_str(&data)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Resolution order: `$NEARBY_EVENTS_CONFIG_PATH` (must exist), then
    /// `./config/app.toml` if present, else defaults. Env overrides apply last.
    pub fn load_default() -> anyhow::Result<Self> {
        let mut cfg = match env::var(ENV_APP_CONFIG_PATH) {
            Ok(p) if !p.trim().is_empty() => Self::load_from_file(p.trim())?,
            _ => {
                let fallback = Path::new(DEFAULT_APP_CONFIG_PATH);
                if fallback.exists() {
                    Self::load_from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_overrides(|k| env::var(k).ok());
        Ok(cfg)
    }

    /// Overlay values from `lookup` (normally the process env).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_RANKING_URL) {
            self.ranking.url = Some(url);
        }
        if let Some(ms) = lookup(ENV_RANKING_TIMEOUT_MS) {
            match ms.trim().parse::<u64>() {
                Ok(ms) => self.ranking.timeout_ms = ms,
                Err(_) => tracing::warn!(value = %ms, "ignoring unparsable {ENV_RANKING_TIMEOUT_MS}"),
            }
        }
        if let Some(p) = lookup(ENV_DATABASE_PATH) {
            self.storage.database_path = Some(PathBuf::from(p));
        }
        self.sanitize();
    }

    fn sanitize(&mut self) {
        self.ranking.url = self
            .ranking
            .url
            .take()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        if self.ranking.timeout_ms == 0 || self.ranking.timeout_ms > MAX_RANKING_TIMEOUT_MS {
            self.ranking.timeout_ms = default_timeout_ms();
        }
        if self
            .storage
            .database_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.storage.database_path = None;
        }
    }

    pub fn ranking_timeout(&self) -> Duration {
        Duration::from_millis(self.ranking.timeout_ms)
    }
}
