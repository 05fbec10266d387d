use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const KEY_APP_TIMERS: &str = "mindful.appTimers";
pub const KEY_BEDTIME_SETTINGS: &str = "mindful.bedtimeSettings";
pub const KEY_BLOCKED_APPS: &str = "mindful.blockedApps";

/// Durable policy values, written by UI flows and read by the controllers.
///
/// Reads never fail: anything missing or malformed comes back empty.
pub trait PolicyStore: Send + Sync {
    /// packageName -> allowed seconds per day
    fn app_timers(&self) -> HashMap<String, u64>;

    /// Apps blocked while the bedtime routine runs
    fn bedtime_apps(&self) -> HashSet<String>;

    /// Apps cut off from the network
    fn blocked_apps(&self) -> HashSet<String>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BedtimeSettings {
    #[serde(default)]
    distracting_apps: HashSet<String>,
}

/// Policy store backed by a single JSON document of key -> value.
///
/// Values may be stored either inline or as a JSON-encoded string, which is
/// how preference-style stores usually persist structured values.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_document(&self) -> Result<Option<Map<String, Value>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read policy store: {}", self.path.display()))?;

        let document: Map<String, Value> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse policy store: {}", self.path.display()))?;

        Ok(Some(document))
    }

    fn read_key<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let document = match self.load_document() {
            Ok(Some(document)) => document,
            Ok(None) => {
                debug!("Policy store {} does not exist yet", self.path.display());
                return T::default();
            }
            Err(e) => {
                warn!("{:#}", e);
                return T::default();
            }
        };

        match document.get(key) {
            Some(value) => decode_value(value.clone()).unwrap_or_else(|e| {
                warn!("Malformed value for policy key {}: {:#}", key, e);
                T::default()
            }),
            None => {
                debug!("Policy key {} is not set", key);
                T::default()
            }
        }
    }
}

fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    match value {
        Value::String(encoded) => {
            serde_json::from_str(&encoded).context("Failed to decode JSON-encoded value")
        }
        other => serde_json::from_value(other).context("Failed to decode value"),
    }
}

impl PolicyStore for JsonFileStore {
    fn app_timers(&self) -> HashMap<String, u64> {
        self.read_key(KEY_APP_TIMERS)
    }

    fn bedtime_apps(&self) -> HashSet<String> {
        self.read_key::<BedtimeSettings>(KEY_BEDTIME_SETTINGS)
            .distracting_apps
    }

    fn blocked_apps(&self) -> HashSet<String> {
        self.read_key(KEY_BLOCKED_APPS)
    }
}
