//! Persisted link lengths.
//!
//! Parameters live in a small key-value store as strings, so they can be
//! edited by hand; `la` and `lb` are parsed and range-checked on load.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tiltcal_core::{KinematicParams, ParamsError};
use tracing::{info, warn};

pub const LA_KEY: &str = "la";
pub const LB_KEY: &str = "lb";

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("parameter {0} is not set")]
    Missing(&'static str),

    #[error("parameter {key} is not a number: {value:?}")]
    NotNumeric { key: &'static str, value: String },

    #[error(transparent)]
    Invalid(#[from] ParamsError),

    #[error("parameter store {path}: {message}")]
    Storage { path: PathBuf, message: String },
}

pub trait ParamStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigurationError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn with_params(params: KinematicParams) -> Self {
        let mut store = Self::default();
        store.values.insert(LA_KEY.to_string(), params.la.to_string());
        store.values.insert(LB_KEY.to_string(), params.lb.to_string());
        store
    }
}

impl ParamStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigurationError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A TOML table of string values, rewritten on every `set`.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref().to_path_buf();
        let storage = |message: String| ConfigurationError::Storage {
            path: path.clone(),
            message,
        };
        let table: toml::Table = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|err| storage(err.to_string()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
            Err(err) => return Err(storage(err.to_string())),
        };
        // Hand-edited files may hold bare numbers
        let values = table
            .into_iter()
            .map(|(key, value)| match value {
                toml::Value::String(s) => (key, s),
                other => (key, other.to_string()),
            })
            .collect();
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ParamStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigurationError> {
        self.values.insert(key.to_string(), value.to_string());
        let storage = |message: String| ConfigurationError::Storage {
            path: self.path.clone(),
            message,
        };
        let content = toml::to_string(&self.values).map_err(|err| storage(err.to_string()))?;
        fs::write(&self.path, content).map_err(|err| storage(err.to_string()))
    }
}

fn read_length(store: &impl ParamStore, key: &'static str) -> Result<f64, ConfigurationError> {
    let raw = store.get(key).ok_or(ConfigurationError::Missing(key))?;
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(ConfigurationError::NotNumeric { key, value: raw })
}

/// Read and validate `la`/`lb`.
pub fn load_params(store: &impl ParamStore) -> Result<KinematicParams, ConfigurationError> {
    let la = read_length(store, LA_KEY)?;
    let lb = read_length(store, LB_KEY)?;
    let params = KinematicParams::new(la, lb)?;
    if params.is_unusually_large() {
        warn!(la, lb, "link lengths above 500 mm, check the stored values");
    }
    Ok(params)
}

pub fn save_params(
    store: &mut impl ParamStore,
    params: &KinematicParams,
) -> Result<(), ConfigurationError> {
    params.validate()?;
    store.set(LA_KEY, &format!("{:.2}", params.la))?;
    store.set(LB_KEY, &format!("{:.2}", params.lb))?;
    info!(la = params.la, lb = params.lb, "link lengths saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_validates_values() {
        let mut store = MemoryStore::default();
        assert!(matches!(
            load_params(&store),
            Err(ConfigurationError::Missing("la"))
        ));

        store.set("la", "12.5").unwrap();
        store.set("lb", "abc").unwrap();
        assert!(matches!(
            load_params(&store),
            Err(ConfigurationError::NotNumeric { key: "lb", .. })
        ));

        store.set("lb", "0").unwrap();
        assert!(matches!(
            load_params(&store),
            Err(ConfigurationError::Invalid(ParamsError::NonPositiveLb(_)))
        ));

        store.set("lb", " 40 ").unwrap();
        assert_eq!(
            load_params(&store).unwrap(),
            KinematicParams { la: 12.5, lb: 40.0 }
        );
    }

    #[test]
    fn file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.toml");

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("la"), None);
        save_params(&mut store, &KinematicParams { la: 12.346, lb: 40.0 }).unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.path(), path.as_path());
        assert_eq!(reopened.get("la").as_deref(), Some("12.35"));
        assert_eq!(
            load_params(&reopened).unwrap(),
            KinematicParams { la: 12.35, lb: 40.0 }
        );
    }

    #[test]
    fn file_store_accepts_bare_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.toml");
        fs::write(&path, "la = 8\nlb = 31.5\n").unwrap();
        let store = FileStore::open(&path).unwrap();
        assert_eq!(
            load_params(&store).unwrap(),
            KinematicParams { la: 8.0, lb: 31.5 }
        );
    }

    #[test]
    fn save_rejects_invalid() {
        let mut store = MemoryStore::default();
        assert!(save_params(&mut store, &KinematicParams { la: -1.0, lb: 40.0 }).is_err());
        assert_eq!(store.get("la"), None);
    }
}
