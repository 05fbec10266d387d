use anyhow::{Context, Result};
use std::process::Command;

use super::Urgency;
use super::common::try_command;

/// Show a notification with osascript
pub fn send_notification(title: &str, message: &str, urgency: Urgency) -> Result<()> {
    let sound = match urgency {
        Urgency::Critical => " sound name \"Glass\"",
        Urgency::Low | Urgency::Normal => "",
    };
    let script = format!(
        "display notification \"{}\" with title \"{}\"{}",
        escape(message),
        escape(title),
        sound
    );

    Command::new("osascript")
        .arg("-e")
        .arg(&script)
        .output()
        .context("Failed to run osascript")?;
    Ok(())
}

/// Toggle do-not-disturb through the notification center defaults
pub fn set_do_not_disturb(enabled: bool) -> Result<()> {
    let value = if enabled { "true" } else { "false" };
    try_command(
        "defaults",
        &[
            "-currentHost",
            "write",
            "com.apple.notificationcenterui",
            "doNotDisturb",
            "-boolean",
            value,
        ],
    )?;

    // The setting is only picked up after the notification center restarts
    try_command("killall", &["NotificationCenter"])
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
