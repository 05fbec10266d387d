use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{debug, info};

use crate::enforcement::purge::PurgeType;
use crate::platform::{self, Urgency};

/// Blocking surface shown over a restricted app
pub trait OverlayPresenter: Send + Sync {
    fn show_block(&self, package: &str, purge_type: PurgeType, is_bedtime: bool) -> Result<()>;
}

/// Which controller owns a persistent status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusSlot {
    Tracker,
    Network,
    Focus,
}

/// Persistent indicators, transient alerts and terminal notifications
pub trait StatusPresenter: Send + Sync {
    fn show_status(&self, slot: StatusSlot, text: &str) -> Result<()>;
    fn clear_status(&self, slot: StatusSlot) -> Result<()>;
    fn show_alert(&self, text: &str) -> Result<()>;
    fn update_progress(&self, text: &str, current: u64, max: u64) -> Result<()>;
    fn show_terminal(&self, title: &str, body: &str) -> Result<()>;
}

/// System do-not-disturb switch
pub trait DndToggle: Send + Sync {
    fn set_dnd(&self, enabled: bool) -> Result<()>;
}

/// Block notice written to stdout, one JSON object per line, for the UI shell
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockNotice {
    pub package: String,
    pub purge_type: PurgeType,
    pub is_bedtime: bool,
}

impl BlockNotice {
    fn write_line(&self, out: &mut impl Write) -> Result<()> {
        let line = serde_json::to_string(self).context("Failed to encode block notice")?;
        writeln!(out, "{}", line).context("Failed to write block notice")?;
        out.flush().context("Failed to flush block notice")
    }
}

/// Presenter backed by desktop notifications
pub struct DesktopPresenter;

impl OverlayPresenter for DesktopPresenter {
    fn show_block(&self, package: &str, purge_type: PurgeType, is_bedtime: bool) -> Result<()> {
        info!(
            "Blocking {} ({:?}, bedtime context: {})",
            package, purge_type, is_bedtime
        );

        BlockNotice {
            package: package.to_string(),
            purge_type,
            is_bedtime,
        }
        .write_line(&mut std::io::stdout().lock())?;

        platform::send_notification(
            "App paused",
            &format!("{}\n{}", package, purge_type.reason()),
            Urgency::Critical,
        )
    }
}

impl StatusPresenter for DesktopPresenter {
    fn show_status(&self, slot: StatusSlot, text: &str) -> Result<()> {
        info!("[{:?}] {}", slot, text);
        platform::send_notification("Mindful service", text, Urgency::Low)
    }

    fn clear_status(&self, slot: StatusSlot) -> Result<()> {
        // Desktop notifications expire on their own
        debug!("[{:?}] status cleared", slot);
        Ok(())
    }

    fn show_alert(&self, text: &str) -> Result<()> {
        platform::send_notification("Mindful", text, Urgency::Normal)
    }

    fn update_progress(&self, text: &str, current: u64, max: u64) -> Result<()> {
        // Only log every tick; a notification per second would be noise
        debug!("Progress {}/{}: {}", current, max, text);
        Ok(())
    }

    fn show_terminal(&self, title: &str, body: &str) -> Result<()> {
        platform::send_notification(title, body, Urgency::Normal)
    }
}

/// Do-not-disturb through the platform helpers
pub struct SystemDnd;

impl DndToggle for SystemDnd {
    fn set_dnd(&self, enabled: bool) -> Result<()> {
        platform::set_do_not_disturb(enabled)?;
        info!("Do-not-disturb {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }
}
