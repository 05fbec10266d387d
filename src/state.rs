use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

/// Current state version
const STATE_VERSION: &str = "1.0";

/// Enforcement state that must survive a daemon restart within the same day
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct EnforcementState {
    pub version: String,
    pub state_date: String, // YYYY-MM-DD, local time
    pub purged_apps: BTreeSet<String>,
}

impl EnforcementState {
    /// Create a new empty state for today
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            state_date: today(),
            purged_apps: BTreeSet::new(),
        }
    }

    /// Create today's state holding the given purged apps
    pub fn with_purged<'a>(apps: impl IntoIterator<Item = &'a String>) -> Self {
        Self {
            purged_apps: apps.into_iter().cloned().collect(),
            ..Self::new()
        }
    }

    /// Check if state belongs to a previous day
    pub fn needs_daily_reset(&self) -> bool {
        self.state_date != today()
    }
}

impl Default for EnforcementState {
    fn default() -> Self {
        Self::new()
    }
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Load state from the state file.
///
/// Returns `None` when there is no file, when the version does not match,
/// or when the state was written on a previous day.
pub fn load_state(path: &Path) -> Result<Option<EnforcementState>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;

    let state: EnforcementState = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

    if state.version != STATE_VERSION {
        warn!(
            "State file version mismatch (expected {}, got {}). Treating as new state.",
            STATE_VERSION, state.version
        );
        return Ok(None);
    }

    if state.needs_daily_reset() {
        return Ok(None);
    }

    Ok(Some(state))
}

/// Save state to the state file
pub fn save_state(path: &Path, state: &EnforcementState) -> Result<()> {
    let content = serde_json::to_string_pretty(state)
        .context("Failed to serialize state")?;

    crate::platform::common::atomic_write(path, content.as_bytes())
        .with_context(|| format!("Failed to write state file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_has_current_date() {
        let state = EnforcementState::new();
        assert_eq!(state.state_date, today());
        assert!(state.purged_apps.is_empty());
    }

    #[test]
    fn test_needs_daily_reset() {
        let mut state = EnforcementState::new();
        assert!(!state.needs_daily_reset());

        state.state_date = "2020-01-01".to_string();
        assert!(state.needs_daily_reset());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state.json");

        let apps = vec!["com.x".to_string(), "com.y".to_string()];
        let state = EnforcementState::with_purged(&apps);
        save_state(&path, &state).unwrap();

        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(load_state(&temp_dir.path().join("missing.json")).unwrap().is_none());
    }

    #[test]
    fn test_load_discards_previous_day() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state.json");

        let mut state = EnforcementState::with_purged(&["com.x".to_string()]);
        state.state_date = "2020-01-01".to_string();
        save_state(&path, &state).unwrap();

        assert!(load_state(&path).unwrap().is_none());
    }

    #[test]
    fn test_load_discards_version_mismatch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state.json");

        let mut state = EnforcementState::new();
        state.version = "0.1".to_string();
        save_state(&path, &state).unwrap();

        assert!(load_state(&path).unwrap().is_none());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(load_state(&path).is_err());
    }
}
