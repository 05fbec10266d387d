use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::enforcement::bus::{DeviceEvent, EventBus, SubscriptionId};
use crate::enforcement::presenter::{OverlayPresenter, StatusPresenter, StatusSlot};
use crate::enforcement::purge::PurgeType;
use crate::enforcement::usage::UsageOracle;
use crate::state::{EnforcementState, load_state, save_state};
use crate::store::PolicyStore;

const TRACKING_STATUS_TEXT: &str =
    "Mindful is now tracking app usage to help you stay focused and manage your digital habits.";
const MIDNIGHT_RESET_TEXT: &str = "Tracking service is resetting data at midnight";

/// Collaborators handed to the tracker at construction
pub struct TrackerDeps {
    pub store: Arc<dyn PolicyStore>,
    pub oracle: Arc<dyn UsageOracle>,
    pub overlay: Arc<dyn OverlayPresenter>,
    pub status: Arc<dyn StatusPresenter>,
    pub bus: EventBus,
    /// Where purged apps are persisted; `None` keeps them in memory only
    pub state_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStatus {
    Stopped,
    Running,
}

/// Which mode currently owns the distracting app set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistractingSource {
    Bedtime,
    Focus,
}

impl DistractingSource {
    fn purge_type(self) -> PurgeType {
        match self {
            DistractingSource::Bedtime => PurgeType::BedtimeRoutine,
            DistractingSource::Focus => PurgeType::FocusSession,
        }
    }
}

/// The single outstanding recheck; replacing or cancelling it aborts the task
struct RecheckTimer {
    id: u64,
    package: String,
    handle: JoinHandle<()>,
}

struct TrackerState {
    status: TrackerStatus,
    app_timers: HashMap<String, u64>,
    distracting: HashSet<String>,
    distracting_source: Option<DistractingSource>,
    purged: HashSet<String>,
    recheck: Option<RecheckTimer>,
    next_timer_id: u64,
    observer_paused: bool,
    subscription: Option<SubscriptionId>,
    listener: Option<JoinHandle<()>>,
}

/// Point-in-time view of the tracker, for status output and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub status: TrackerStatus,
    pub app_timers: HashMap<String, u64>,
    pub distracting_apps: HashSet<String>,
    pub distracting_source: Option<DistractingSource>,
    pub purged_apps: HashSet<String>,
    pub pending_recheck: Option<String>,
    pub observer_paused: bool,
}

struct TrackerInner {
    deps: TrackerDeps,
    state: Mutex<TrackerState>,
}

/// Usage tracking and restriction controller.
///
/// Decides whether a just-launched app is blocked, based on app timers,
/// the bedtime/focus distracting set and the apps already purged today.
/// Stops itself whenever it has nothing left to enforce.
#[derive(Clone)]
pub struct UsageTracker {
    inner: Arc<TrackerInner>,
}

impl UsageTracker {
    pub fn new(deps: TrackerDeps) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                deps,
                state: Mutex::new(TrackerState {
                    status: TrackerStatus::Stopped,
                    app_timers: HashMap::new(),
                    distracting: HashSet::new(),
                    distracting_source: None,
                    purged: HashSet::new(),
                    recheck: None,
                    next_timer_id: 0,
                    observer_paused: false,
                    subscription: None,
                    listener: None,
                }),
            }),
        }
    }

    /// Load timers and begin observing launch events
    pub async fn start(&self) {
        let mut state = self.inner.state.lock().await;
        self.start_locked(&mut state);
    }

    /// Start (if needed) and block the bedtime app set
    pub async fn start_bedtime(&self) {
        let mut state = self.inner.state.lock().await;
        self.start_locked(&mut state);

        if state.distracting_source == Some(DistractingSource::Focus) {
            warn!("Bedtime routine is taking over the distracting apps of a focus session");
        }

        state.distracting = self.inner.deps.store.bedtime_apps();
        state.distracting_source = Some(DistractingSource::Bedtime);
        state.purged.clear();
        self.persist_purged(&state);
        info!(
            "Bedtime routine started, blocking {} app(s)",
            state.distracting.len()
        );

        if self.stop_if_no_usage_locked(&mut state) {
            return;
        }

        // The device may be unlocked straight into a distracting app
        self.replay_last_foreground(&mut state);
    }

    pub async fn stop_bedtime(&self) {
        let mut state = self.inner.state.lock().await;
        if state.distracting_source == Some(DistractingSource::Bedtime) {
            state.distracting.clear();
            state.distracting_source = None;
            info!("Bedtime routine stopped");
        } else {
            debug!("Bedtime routine is not active, nothing to stop");
        }
        self.stop_if_no_usage_locked(&mut state);
    }

    /// Reload timers after an external policy change
    pub async fn update_timers(&self) {
        let mut state = self.inner.state.lock().await;
        if state.status == TrackerStatus::Stopped {
            self.start_locked(&mut state);
        } else {
            state.app_timers = self.inner.deps.store.app_timers();
        }

        // New budgets invalidate earlier purges and the pending recheck
        state.purged.clear();
        self.persist_purged(&state);
        self.cancel_recheck(&mut state);
        info!("App timers updated ({} app(s))", state.app_timers.len());

        if self.stop_if_no_usage_locked(&mut state) {
            return;
        }
        self.replay_last_foreground(&mut state);
    }

    /// Forget today's purges; timers and the distracting set are untouched
    pub async fn midnight_reset(&self) {
        let mut state = self.inner.state.lock().await;
        state.purged.clear();
        self.persist_purged(&state);

        if let Err(e) = self.inner.deps.status.show_alert(MIDNIGHT_RESET_TEXT) {
            warn!("Failed to show midnight reset alert: {:#}", e);
        }
        info!("Midnight reset completed");
    }

    /// Suspend or resume lock/unlock observation
    pub async fn pause_resume(&self, pause: bool) {
        let mut state = self.inner.state.lock().await;
        state.observer_paused = pause;
        info!(
            "Lock/unlock observation {}",
            if pause { "paused" } else { "resumed" }
        );
    }

    /// Unrecognised command while running: only re-check the idle condition
    pub async fn probe(&self) {
        let mut state = self.inner.state.lock().await;
        self.stop_if_no_usage_locked(&mut state);
    }

    /// Install (`Some`) or clear (`None`) the focus session's app set
    pub async fn start_stop_focus_session(&self, apps: Option<HashSet<String>>) {
        let mut state = self.inner.state.lock().await;
        match apps {
            Some(apps) => {
                self.start_locked(&mut state);
                if state.distracting_source == Some(DistractingSource::Bedtime) {
                    warn!("Focus session is taking over the distracting apps of the bedtime routine");
                }
                state.distracting = apps;
                state.distracting_source = Some(DistractingSource::Focus);
                info!(
                    "Focus session blocking {} app(s)",
                    state.distracting.len()
                );

                if self.stop_if_no_usage_locked(&mut state) {
                    return;
                }
                self.replay_last_foreground(&mut state);
            }
            None => {
                if state.distracting_source == Some(DistractingSource::Focus) {
                    state.distracting.clear();
                    state.distracting_source = None;
                    info!("Focus session apps released");
                }
                self.stop_if_no_usage_locked(&mut state);
            }
        }
    }

    /// Release observers and timers
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        if state.status == TrackerStatus::Running {
            self.teardown(&mut state);
            info!("Usage tracking stopped");
        }
    }

    /// Restart the tracker if it should be running but its event listener died.
    ///
    /// Returns true when a restart happened.
    pub async fn ensure_running(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        let listener_dead = state
            .listener
            .as_ref()
            .is_none_or(|listener| listener.is_finished());

        if state.status != TrackerStatus::Running || !listener_dead {
            return false;
        }

        warn!("Usage tracker stopped unexpectedly, restarting it");
        let distracting = std::mem::take(&mut state.distracting);
        let source = state.distracting_source.take();
        let paused = state.observer_paused;

        self.teardown(&mut state);
        self.start_locked(&mut state);

        state.distracting = distracting;
        state.distracting_source = source;
        state.observer_paused = paused;
        true
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        let state = self.inner.state.lock().await;
        TrackerSnapshot {
            status: state.status,
            app_timers: state.app_timers.clone(),
            distracting_apps: state.distracting.clone(),
            distracting_source: state.distracting_source,
            purged_apps: state.purged.clone(),
            pending_recheck: state.recheck.as_ref().map(|timer| timer.package.clone()),
            observer_paused: state.observer_paused,
        }
    }

    pub async fn on_device_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::AppLaunched { package } => self.on_app_launched(&package).await,
            DeviceEvent::ScreenOff => {
                let mut state = self.inner.state.lock().await;
                if !state.observer_paused {
                    self.cancel_recheck(&mut state);
                }
            }
            DeviceEvent::UserPresent => {
                let mut state = self.inner.state.lock().await;
                if state.status == TrackerStatus::Running && !state.observer_paused {
                    self.replay_last_foreground(&mut state);
                }
            }
        }
    }

    /// Evaluate a freshly launched app
    pub async fn on_app_launched(&self, package: &str) {
        if package.is_empty() {
            return;
        }

        let mut state = self.inner.state.lock().await;
        if state.status != TrackerStatus::Running {
            debug!("Ignoring launch of {} while tracking is stopped", package);
            return;
        }

        debug!("App launch event received for {}", package);
        self.evaluate_launch(&mut state, package);
    }

    fn start_locked(&self, state: &mut TrackerState) {
        if state.status == TrackerStatus::Running {
            return;
        }

        state.app_timers = self.inner.deps.store.app_timers();
        self.restore_purged(state);

        let subscription = self.inner.deps.bus.subscribe();
        state.subscription = Some(subscription.id);
        state.listener = Some(tokio::spawn(self.clone().listen(subscription.events)));
        state.status = TrackerStatus::Running;

        if let Err(e) = self
            .inner
            .deps
            .status
            .show_status(StatusSlot::Tracker, TRACKING_STATUS_TEXT)
        {
            warn!("Failed to show tracking status: {:#}", e);
        }

        info!(
            "Usage tracking started with {} app timer(s)",
            state.app_timers.len()
        );
    }

    async fn listen(self, mut events: UnboundedReceiver<DeviceEvent>) {
        while let Some(event) = events.recv().await {
            self.on_device_event(event).await;
        }
        debug!("Device event stream closed");
    }

    fn evaluate_launch(&self, state: &mut TrackerState, package: &str) {
        // Only one app is in front at a time, so an earlier recheck is stale
        self.cancel_recheck(state);

        if state.distracting.contains(package) {
            let source = state.distracting_source.unwrap_or(DistractingSource::Bedtime);
            self.present_block(
                package,
                source.purge_type(),
                source == DistractingSource::Bedtime,
            );
            return;
        }

        let Some(&allowed) = state.app_timers.get(package) else {
            return;
        };

        if state.purged.contains(package) {
            self.present_block(package, PurgeType::AppTimerOut, false);
            return;
        }

        let used = self.inner.deps.oracle.usage_seconds_today(package);
        if used >= allowed {
            state.purged.insert(package.to_string());
            self.persist_purged(state);
            self.present_block(package, PurgeType::AppTimerOut, false);
            return;
        }

        self.schedule_recheck(state, package, Duration::from_secs(allowed - used));
    }

    /// The oracle sees every launch, including those while tracking was stopped
    fn replay_last_foreground(&self, state: &mut TrackerState) {
        if let Some(last) = self.inner.deps.oracle.last_foreground() {
            debug!("Re-evaluating last foreground app {}", last);
            self.evaluate_launch(state, &last);
        }
    }

    fn schedule_recheck(&self, state: &mut TrackerState, package: &str, delay: Duration) {
        self.cancel_recheck(state);

        state.next_timer_id += 1;
        let id = state.next_timer_id;
        let tracker = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracker.fire_recheck(id).await;
        });

        state.recheck = Some(RecheckTimer {
            id,
            package: package.to_string(),
            handle,
        });
        debug!("Recheck for {} scheduled in {}s", package, delay.as_secs());
    }

    async fn fire_recheck(&self, id: u64) {
        let mut state = self.inner.state.lock().await;

        // A cancelled timer may still reach this point; only the current one purges
        if state.recheck.as_ref().map(|timer| timer.id) != Some(id) {
            debug!("Ignoring stale recheck #{}", id);
            return;
        }
        let Some(timer) = state.recheck.take() else {
            return;
        };

        state.purged.insert(timer.package.clone());
        self.persist_purged(&state);
        self.present_block(&timer.package, PurgeType::AppTimerOut, false);
        info!("Recheck fired, {} is out of time", timer.package);
    }

    fn cancel_recheck(&self, state: &mut TrackerState) {
        if let Some(timer) = state.recheck.take() {
            timer.handle.abort();
            debug!("Recheck for {} cancelled", timer.package);
        }
    }

    /// Returns true if the tracker stopped itself
    fn stop_if_no_usage_locked(&self, state: &mut TrackerState) -> bool {
        if state.status != TrackerStatus::Running {
            return false;
        }

        if state.distracting.is_empty() && state.app_timers.is_empty() {
            info!("Usage tracking is not required any more, stopping it");
            self.teardown(state);
            return true;
        }

        false
    }

    fn teardown(&self, state: &mut TrackerState) {
        self.cancel_recheck(state);

        if let Some(id) = state.subscription.take() {
            self.inner.deps.bus.unsubscribe(id);
        }
        if let Some(listener) = state.listener.take() {
            listener.abort();
        }

        state.status = TrackerStatus::Stopped;
        state.app_timers.clear();
        state.distracting.clear();
        state.distracting_source = None;
        state.observer_paused = false;

        if let Err(e) = self.inner.deps.status.clear_status(StatusSlot::Tracker) {
            warn!("Failed to clear tracking status: {:#}", e);
        }
    }

    fn present_block(&self, package: &str, purge_type: PurgeType, is_bedtime: bool) {
        info!("Blocking {} ({:?})", package, purge_type);
        if let Err(e) = self
            .inner
            .deps
            .overlay
            .show_block(package, purge_type, is_bedtime)
        {
            warn!("Failed to show block for {}: {:#}", package, e);
        }
    }

    fn restore_purged(&self, state: &mut TrackerState) {
        let Some(path) = &self.inner.deps.state_path else {
            return;
        };

        match load_state(path) {
            Ok(Some(saved)) => {
                debug!("Restored {} purged app(s)", saved.purged_apps.len());
                state.purged = saved.purged_apps.into_iter().collect();
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable enforcement state: {:#}", e),
        }
    }

    fn persist_purged(&self, state: &TrackerState) {
        let Some(path) = &self.inner.deps.state_path else {
            return;
        };

        if let Err(e) = save_state(path, &EnforcementState::with_purged(&state.purged)) {
            warn!("Failed to persist enforcement state: {:#}", e);
        }
    }
}
