use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::TunnelSettings;
use crate::enforcement::bus::{DeviceEvent, EventBus};
use crate::enforcement::focus::{FocusController, FocusDeps};
use crate::enforcement::network::{NetworkBlocker, NetworkDeps};
use crate::enforcement::presenter::{DndToggle, OverlayPresenter, StatusPresenter};
use crate::enforcement::session::FocusSession;
use crate::enforcement::tracker::{TrackerDeps, TrackerStatus, UsageTracker};
use crate::enforcement::tunnel::TunnelProvider;
use crate::enforcement::usage::ForegroundLedger;
use crate::store::PolicyStore;

/// Control commands accepted by the engine
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    Start,
    StartBedtime,
    StopBedtime,
    MidnightReset,
    UpdateTimers,
    PauseResumeTracking {
        pause: bool,
    },
    /// Re-check whether tracking is still needed
    Probe,
    UpdateBlockedApps,
    OnSafePoint,
    StartNetworkBlocking,
    StopNetworkBlocking,
    /// `payload` is the session JSON, either inline or as a string
    StartFocusSession {
        #[serde(default)]
        payload: serde_json::Value,
    },
    StopFocusSession,
}

/// The controller a command is delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    Tracker,
    Network,
    Focus,
}

impl Command {
    pub fn target(&self) -> ControllerKind {
        match self {
            Command::Start
            | Command::StartBedtime
            | Command::StopBedtime
            | Command::MidnightReset
            | Command::UpdateTimers
            | Command::PauseResumeTracking { .. }
            | Command::Probe => ControllerKind::Tracker,
            Command::UpdateBlockedApps
            | Command::OnSafePoint
            | Command::StartNetworkBlocking
            | Command::StopNetworkBlocking => ControllerKind::Network,
            Command::StartFocusSession { .. } | Command::StopFocusSession => ControllerKind::Focus,
        }
    }
}

/// One line of engine input: a command or a device event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EngineInput {
    Command(Command),
    Event(DeviceEvent),
}

impl EngineInput {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).with_context(|| format!("Invalid engine input: {}", line.trim()))
    }
}

fn session_from_payload(payload: &serde_json::Value) -> FocusSession {
    match payload {
        serde_json::Value::Null => FocusSession::from_json(""),
        serde_json::Value::String(json) => FocusSession::from_json(json),
        other => FocusSession::from_json(&other.to_string()),
    }
}

/// Everything the engine needs from the host
pub struct EngineParts {
    pub store: Arc<dyn PolicyStore>,
    pub overlay: Arc<dyn OverlayPresenter>,
    pub status: Arc<dyn StatusPresenter>,
    pub dnd: Arc<dyn DndToggle>,
    pub provider: Arc<dyn TunnelProvider>,
    pub tunnel: TunnelSettings,
    pub state_path: Option<PathBuf>,
}

/// Owns the three controllers and routes commands and events to them
pub struct Engine {
    tracker: UsageTracker,
    network: NetworkBlocker,
    focus: FocusController,
    bus: EventBus,
    ledger: Arc<ForegroundLedger>,
}

impl Engine {
    pub fn new(parts: EngineParts) -> Self {
        let bus = EventBus::new();
        let ledger = Arc::new(ForegroundLedger::new());

        let tracker = UsageTracker::new(TrackerDeps {
            store: Arc::clone(&parts.store),
            oracle: ledger.clone(),
            overlay: parts.overlay,
            status: Arc::clone(&parts.status),
            bus: bus.clone(),
            state_path: parts.state_path,
        });

        let network = NetworkBlocker::new(NetworkDeps {
            store: parts.store,
            provider: parts.provider,
            status: Arc::clone(&parts.status),
            settings: parts.tunnel,
        });

        let focus = FocusController::new(FocusDeps {
            tracker: tracker.clone(),
            status: parts.status,
            dnd: parts.dnd,
        });

        Self {
            tracker,
            network,
            focus,
            bus,
            ledger,
        }
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &UsageTracker {
        &self.tracker
    }

    #[cfg(test)]
    pub fn network(&self) -> &NetworkBlocker {
        &self.network
    }

    #[cfg(test)]
    pub fn focus(&self) -> &FocusController {
        &self.focus
    }

    pub async fn handle(&self, input: EngineInput) -> Result<()> {
        match input {
            EngineInput::Command(command) => self.dispatch(command).await,
            EngineInput::Event(event) => {
                self.publish(event);
                Ok(())
            }
        }
    }

    pub async fn dispatch(&self, command: Command) -> Result<()> {
        debug!("Dispatching {:?} to {:?}", command, command.target());

        match command {
            Command::Start => self.tracker.start().await,
            Command::StartBedtime => self.tracker.start_bedtime().await,
            Command::StopBedtime => self.tracker.stop_bedtime().await,
            Command::MidnightReset => self.tracker.midnight_reset().await,
            Command::UpdateTimers => self.tracker.update_timers().await,
            Command::PauseResumeTracking { pause } => self.tracker.pause_resume(pause).await,
            Command::Probe => self.tracker.probe().await,
            Command::UpdateBlockedApps => self.network.update_blocked_apps(),
            Command::OnSafePoint => self.network.on_safe_point(),
            Command::StartNetworkBlocking => self.network.start(),
            Command::StopNetworkBlocking => self.network.stop(),
            Command::StartFocusSession { payload } => {
                let session = session_from_payload(&payload);
                if !self.focus.start(session).await? {
                    info!("Focus session request ignored: no apps to block");
                }
            }
            Command::StopFocusSession => self.focus.stop().await,
        }

        Ok(())
    }

    /// Feed the usage ledger, then deliver the event to subscribers
    pub fn publish(&self, event: DeviceEvent) {
        match &event {
            DeviceEvent::AppLaunched { package } if !package.is_empty() => {
                self.ledger.record_foreground(package)
            }
            DeviceEvent::ScreenOff => self.ledger.record_idle(),
            _ => {}
        }

        let delivered = self.bus.publish(event);
        debug!("Device event delivered to {} subscriber(s)", delivered);
    }

    /// Liveness check; restarts tracking if it died while it should run
    pub async fn ensure_alive(&self) -> bool {
        let restarted = self.tracker.ensure_running().await;
        if restarted {
            warn!("Usage tracking was restarted by the liveness check");
        }
        restarted
    }

    /// Debug summary of every controller
    pub async fn log_status(&self) {
        let tracker = self.tracker.snapshot().await;
        if tracker.status == TrackerStatus::Stopped {
            debug!("Tracker: stopped");
        } else {
            debug!(
                "Tracker: {} timer(s), {} distracting app(s) from {:?}, {} purged, recheck {:?}, lock observer paused: {}",
                tracker.app_timers.len(),
                tracker.distracting_apps.len(),
                tracker.distracting_source,
                tracker.purged_apps.len(),
                tracker.pending_recheck,
                tracker.observer_paused
            );
        }

        debug!(
            "Network: {:?}, {} blocked app(s), tunnel up: {}, restart pending: {}, live workers: {}",
            self.network.status(),
            self.network.blocked_apps().len(),
            self.network.has_tunnel(),
            self.network.restart_pending(),
            self.network.live_workers()
        );

        debug!(
            "Focus: {:?}, session {:?}; {} event subscriber(s)",
            self.focus.state().await,
            self.focus.session_id().await,
            self.bus.subscriber_count()
        );
    }

    /// Stop every controller and release their timers, tasks and threads
    pub async fn shutdown(&self) {
        info!("Shutting down enforcement engine");
        self.focus.stop().await;
        self.tracker.stop().await;
        self.network.stop();
    }
}
