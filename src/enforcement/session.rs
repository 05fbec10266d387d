use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// A user-initiated focus session, immutable once parsed
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub toggle_dnd: bool,
    pub duration_seconds: u64,
    pub distracting_apps: HashSet<String>,
}

impl FocusSession {
    /// Parse a session payload.
    ///
    /// Empty or malformed input yields the neutral session (no apps, no DND,
    /// zero duration). A neutral session is never allowed to run.
    pub fn from_json(payload: &str) -> Self {
        if payload.trim().is_empty() {
            debug!("Focus session payload is empty");
            return Self::default();
        }

        match serde_json::from_str::<FocusSession>(payload) {
            Ok(session) => session,
            Err(e) => {
                warn!("Failed to parse focus session payload: {}", e);
                Self::default()
            }
        }
    }

    /// Whether the session has anything to enforce
    pub fn is_runnable(&self) -> bool {
        !self.distracting_apps.is_empty()
    }
}

/// Progress text for a running session, e.g. `1:05:09 hour` or `04:30 minutes`
pub fn format_remaining(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs / 60) % 60;
    let seconds = total_secs % 60;

    let prefix = "Focus session will end in";
    if hours > 0 {
        format!(
            "{} {}:{:02}:{:02} {}",
            prefix,
            hours,
            minutes,
            seconds,
            if hours > 1 { "hours" } else { "hour" }
        )
    } else {
        format!("{} {:02}:{:02} minutes", prefix, minutes, seconds)
    }
}
