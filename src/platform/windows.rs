use anyhow::Result;
use tracing::warn;

use super::Urgency;

/// Notifications on Windows are logged until toast support lands
pub fn send_notification(title: &str, message: &str, urgency: Urgency) -> Result<()> {
    warn!("Notification ({:?}): {} - {}", urgency, title, message);
    Ok(())
}

/// Focus assist has no supported public toggle
pub fn set_do_not_disturb(enabled: bool) -> Result<()> {
    anyhow::bail!(
        "Do-not-disturb cannot be toggled on Windows (requested: {})",
        if enabled { "on" } else { "off" }
    )
}
