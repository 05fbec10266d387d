use anyhow::Result;

use super::Urgency;
use super::common::try_command;

/// Show a notification with notify-send
pub fn send_notification(title: &str, message: &str, urgency: Urgency) -> Result<()> {
    let urgency = match urgency {
        Urgency::Low => "--urgency=low",
        Urgency::Normal => "--urgency=normal",
        Urgency::Critical => "--urgency=critical",
    };

    try_command(
        "notify-send",
        &[title, message, urgency, "--app-name=Mindful", "--icon=dialog-information"],
    )
}

/// Toggle do-not-disturb (tries multiple desktop environments)
pub fn set_do_not_disturb(enabled: bool) -> Result<()> {
    // GNOME hides banners rather than having a dedicated DND switch
    let show_banners = if enabled { "false" } else { "true" };
    if try_command(
        "gsettings",
        &["set", "org.gnome.desktop.notifications", "show-banners", show_banners],
    )
    .is_ok()
    {
        return Ok(());
    }

    // dunst
    let paused = if enabled { "true" } else { "false" };
    if try_command("dunstctl", &["set-paused", paused]).is_ok() {
        return Ok(());
    }

    // mako
    let flag = if enabled { "-a" } else { "-r" };
    if try_command("makoctl", &["mode", flag, "do-not-disturb"]).is_ok() {
        return Ok(());
    }

    anyhow::bail!("No supported do-not-disturb mechanism found on this Linux system")
}
