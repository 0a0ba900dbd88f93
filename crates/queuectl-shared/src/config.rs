use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ConfigError;

pub const DEFAULT_MAX_RETRIES: i64 = 3;
pub const DEFAULT_BACKOFF_BASE: i64 = 2;
pub const DEFAULT_WORKER_COUNT: i64 = 1;
pub const DEFAULT_JOB_TIMEOUT: i64 = 30;

fn default_config() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("max_retries".to_string(), Value::from(DEFAULT_MAX_RETRIES)),
        (
            "backoff_base".to_string(),
            Value::from(DEFAULT_BACKOFF_BASE),
        ),
        (
            "worker_count".to_string(),
            Value::from(DEFAULT_WORKER_COUNT),
        ),
        ("job_timeout".to_string(), Value::from(DEFAULT_JOB_TIMEOUT)),
    ])
}

/// A JSON-file-backed settings document: `max_retries`, `backoff_base`,
/// `worker_count`, `job_timeout`, plus whatever other keys a caller sets.
/// Kept as a loose `serde_json::Value` map (rather than a fixed struct) so
/// `config set <key> <value>` can manage arbitrary keys the way the original
/// `ConfigManager` did, while the typed accessors below give the worker loop
/// a convenient, infallible read path with defaults.
pub struct ConfigStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl ConfigStore {
    /// Loads the config file at `path`, creating it with defaults if absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            let store = Self {
                path: path.clone(),
                values: default_config(),
            };
            store.save()?;
            return Ok(store);
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut values: BTreeMap<String, Value> =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        for (key, value) in default_config() {
            values.entry(key).or_insert(value);
        }

        Ok(Self { path, values })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let serialized =
            serde_json::to_string_pretty(&self.values).expect("config values are serializable");
        std::fs::write(&self.path, serialized).map_err(|source| ConfigError::Write {
            path: self.path.display().to_string(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn all(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Sets a value, coercing strings that look like an integer or a
    /// boolean into the corresponding JSON type — matching the original
    /// CLI's "smart" value coercion on `config set`.
    pub fn set(&mut self, key: &str, raw_value: &str) -> Result<(), ConfigError> {
        let value = coerce(raw_value);
        self.values.insert(key.to_string(), value);
        self.save()
    }

    pub fn reset(&mut self) -> Result<(), ConfigError> {
        self.values = default_config();
        self.save()
    }

    pub fn max_retries(&self) -> i64 {
        self.int_or("max_retries", DEFAULT_MAX_RETRIES)
    }

    pub fn backoff_base(&self) -> i64 {
        self.int_or("backoff_base", DEFAULT_BACKOFF_BASE)
    }

    pub fn worker_count(&self) -> i64 {
        self.int_or("worker_count", DEFAULT_WORKER_COUNT)
    }

    pub fn job_timeout(&self) -> i64 {
        self.int_or("job_timeout", DEFAULT_JOB_TIMEOUT)
    }

    fn int_or(&self, key: &str, default: i64) -> i64 {
        self.values
            .get(key)
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }
}

fn coerce(raw_value: &str) -> Value {
    if let Ok(parsed) = raw_value.parse::<i64>() {
        return Value::from(parsed);
    }
    match raw_value {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw_value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_creates_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.max_retries(), DEFAULT_MAX_RETRIES);
        assert!(path.exists());
    }

    #[test]
    fn set_coerces_numeric_and_boolean_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut store = ConfigStore::load(&path).unwrap();

        store.set("worker_count", "4").unwrap();
        assert_eq!(store.worker_count(), 4);

        store.set("some_flag", "true").unwrap();
        assert_eq!(store.get("some_flag"), Some(&Value::Bool(true)));

        store.set("label", "nightly").unwrap();
        assert_eq!(
            store.get("label"),
            Some(&Value::String("nightly".to_string()))
        );
    }

    #[test]
    fn reset_restores_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut store = ConfigStore::load(&path).unwrap();
        store.set("max_retries", "9").unwrap();
        store.reset().unwrap();
        assert_eq!(store.max_retries(), DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn load_fills_in_missing_defaults_from_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_retries": 7}"#).unwrap();

        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.max_retries(), 7);
        assert_eq!(store.backoff_base(), DEFAULT_BACKOFF_BASE);
    }
}
