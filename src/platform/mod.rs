/// Platform-specific notification and do-not-disturb implementations

pub mod common;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "linux")]
pub mod linux;

use anyhow::Result;

/// How loudly a desktop notification should be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Normal,
    Critical,
}

/// Show a desktop notification using the platform-specific mechanism
pub fn send_notification(title: &str, message: &str, urgency: Urgency) -> Result<()> {
    #[cfg(target_os = "windows")]
    {
        windows::send_notification(title, message, urgency)
    }

    #[cfg(target_os = "macos")]
    {
        macos::send_notification(title, message, urgency)
    }

    #[cfg(target_os = "linux")]
    {
        linux::send_notification(title, message, urgency)
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        let _ = (title, message, urgency);
        anyhow::bail!("Unsupported operating system for notifications")
    }
}

/// Turn the system do-not-disturb mode on or off
pub fn set_do_not_disturb(enabled: bool) -> Result<()> {
    #[cfg(target_os = "windows")]
    {
        windows::set_do_not_disturb(enabled)
    }

    #[cfg(target_os = "macos")]
    {
        macos::set_do_not_disturb(enabled)
    }

    #[cfg(target_os = "linux")]
    {
        linux::set_do_not_disturb(enabled)
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        let _ = enabled;
        anyhow::bail!("Unsupported operating system for do-not-disturb")
    }
}
