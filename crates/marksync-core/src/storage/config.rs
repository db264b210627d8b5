//! TOML-based application configuration.
//!
//! Stores:
//! - Remote API endpoint, bearer token and request timeout
//! - Sync retry/backoff, attempt cap, queue retention and probe interval
//! - Default grading tier for classes without one
//! - Optional store file override
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;
use crate::grading::Tier;

/// Remote API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token. `MARKSYNC_TOKEN` overrides it at runtime.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Sync behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// First backoff delay; doubles on every retry.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Request-layer retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Queue items with this many failed passes are no longer picked up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Synced queue entries older than this are archived on compaction.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    /// Trigger a pass automatically when connectivity returns.
    #[serde(default = "default_true")]
    pub auto_sync: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Tier used when a mark's class is not in the local cache.
    #[serde(default = "default_tier")]
    pub default_tier: Tier,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store file; defaults to `<data_dir>/marksync.db`.
    #[serde(default)]
    pub path: Option<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub grading: GradingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_base_url() -> String {
    "http://localhost:8080/api/".into()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_retry_base_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_attempts() -> u32 {
    10
}
fn default_retention_days() -> u32 {
    30
}
fn default_probe_interval_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_tier() -> Tier {
    Tier::Lower
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_base_ms: default_retry_base_ms(),
            max_retries: default_max_retries(),
            max_attempts: default_max_attempts(),
            retention_days: default_retention_days(),
            probe_interval_secs: default_probe_interval_secs(),
            auto_sync: true,
        }
    }
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            default_tier: default_tier(),
        }
    }
}

impl SyncConfig {
    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Effective bearer token: `MARKSYNC_TOKEN` first, then the file.
    pub fn resolved_token(&self) -> Option<String> {
        std::env::var("MARKSYNC_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.clone())
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults on first run.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit it.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Set a config value by key and save.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Store file location.
    pub fn store_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.store.path {
            Some(p) if !p.is_empty() => Ok(PathBuf::from(p)),
            _ => Ok(data_dir()?.join("marksync.db")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.sync.max_retries, 3);
        assert_eq!(parsed.grading.default_tier, Tier::Lower);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str(
            "[api]\nbase_url = \"https://school.example/api/\"\n\n[grading]\ndefault_tier = \"upper\"\n",
        )
        .unwrap();
        assert_eq!(parsed.api.base_url, "https://school.example/api/");
        assert_eq!(parsed.api.timeout_secs, 15);
        assert_eq!(parsed.grading.default_tier, Tier::Upper);
        assert_eq!(parsed.sync.retention_days, 30);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("sync.retry_base_ms").as_deref(), Some("1000"));
        assert_eq!(cfg.get("grading.default_tier").as_deref(), Some("lower"));
        assert!(cfg.get("sync.missing_key").is_none());
    }

    #[test]
    fn apply_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.apply("sync.auto_sync", "false").unwrap();
        cfg.apply("sync.retention_days", "7").unwrap();
        cfg.apply("api.token", "abc").unwrap();
        cfg.apply("grading.default_tier", "upper").unwrap();
        assert!(!cfg.sync.auto_sync);
        assert_eq!(cfg.sync.retention_days, 7);
        assert_eq!(cfg.api.token.as_deref(), Some("abc"));
        assert_eq!(cfg.grading.default_tier, Tier::Upper);
    }

    #[test]
    fn apply_rejects_unknown_key_and_bad_values() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.apply("sync.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.apply("sync.auto_sync", "maybe"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.apply("grading.default_tier", "middle"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.sync.max_attempts, 10);
        assert!(path.exists());

        let mut cfg = cfg;
        cfg.apply("sync.max_attempts", "4").unwrap();
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().sync.max_attempts, 4);
    }

    #[test]
    fn store_path_prefers_explicit_setting() {
        let mut cfg = Config::default();
        cfg.store.path = Some("/tmp/elsewhere.db".into());
        assert_eq!(cfg.store_path().unwrap(), PathBuf::from("/tmp/elsewhere.db"));
    }
}
