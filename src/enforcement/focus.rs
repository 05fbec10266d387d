use anyhow::{Result, bail};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::enforcement::presenter::{DndToggle, StatusPresenter, StatusSlot};
use crate::enforcement::session::{FocusSession, format_remaining};
use crate::enforcement::tracker::UsageTracker;

const TERMINAL_TITLE: &str = "Focus Session";
const COMPLETED_TEXT: &str = "Congratulations! You've successfully completed your focus session. \
Great job staying on track! Keep up the amazing work!";
const ABORTED_TEXT: &str =
    "You gave up! Don't worry, you can do better next time. Every effort counts, just keep going";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    Idle,
    Armed,
    Running,
    Completed,
    Aborted,
}

pub struct FocusDeps {
    pub tracker: UsageTracker,
    pub status: Arc<dyn StatusPresenter>,
    pub dnd: Arc<dyn DndToggle>,
}

struct ActiveSession {
    id: Uuid,
    session: FocusSession,
    ticker: JoinHandle<()>,
}

struct FocusSlot {
    state: FocusState,
    active: Option<ActiveSession>,
}

struct FocusInner {
    deps: FocusDeps,
    slot: Mutex<FocusSlot>,
}

/// Focus session countdown controller
#[derive(Clone)]
pub struct FocusController {
    inner: Arc<FocusInner>,
}

impl FocusController {
    pub fn new(deps: FocusDeps) -> Self {
        Self {
            inner: Arc::new(FocusInner {
                deps,
                slot: Mutex::new(FocusSlot {
                    state: FocusState::Idle,
                    active: None,
                }),
            }),
        }
    }

    /// Arm and run a session.
    ///
    /// Returns `Ok(false)` when the session has no apps to block and was not
    /// started. Fails if another session is already running.
    pub async fn start(&self, session: FocusSession) -> Result<bool> {
        let mut slot = self.inner.slot.lock().await;
        if slot.state == FocusState::Running {
            bail!("A focus session is already running");
        }

        slot.state = FocusState::Armed;
        if !session.is_runnable() {
            info!("Focus session has no apps to block, not starting it");
            slot.state = FocusState::Idle;
            return Ok(false);
        }

        self.inner
            .deps
            .tracker
            .start_stop_focus_session(Some(session.distracting_apps.clone()))
            .await;

        if session.toggle_dnd {
            if let Err(e) = self.inner.deps.dnd.set_dnd(true) {
                warn!("Failed to enable do-not-disturb: {:#}", e);
            }
        }

        let id = Uuid::new_v4();
        let ticker = tokio::spawn(self.clone().countdown(id, session.duration_seconds));
        info!(
            "Focus session {} started for {}s blocking {} app(s)",
            id,
            session.duration_seconds,
            session.distracting_apps.len()
        );

        slot.active = Some(ActiveSession { id, session, ticker });
        slot.state = FocusState::Running;
        Ok(true)
    }

    /// Abort the running session; a no-op when nothing is running
    pub async fn stop(&self) {
        let mut slot = self.inner.slot.lock().await;
        let Some(active) = slot.active.take() else {
            debug!("No focus session is running");
            return;
        };

        active.ticker.abort();
        info!("Focus session {} aborted", active.id);
        self.cleanup(&mut slot, active.session, FocusState::Aborted).await;
    }

    pub async fn state(&self) -> FocusState {
        self.inner.slot.lock().await.state
    }

    pub async fn session_id(&self) -> Option<Uuid> {
        self.inner.slot.lock().await.active.as_ref().map(|active| active.id)
    }

    async fn countdown(self, id: Uuid, total: u64) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut remaining = total;
        loop {
            interval.tick().await;
            if !self.tick(id, total, remaining).await {
                break;
            }
            remaining = remaining.saturating_sub(1);
        }
    }

    /// Returns false once the countdown should end
    async fn tick(&self, id: Uuid, total: u64, remaining: u64) -> bool {
        let mut slot = self.inner.slot.lock().await;

        // Cleanup already started for this session
        if slot.active.as_ref().map(|active| active.id) != Some(id) {
            return false;
        }

        if remaining > 0 {
            if let Err(e) =
                self.inner
                    .deps
                    .status
                    .update_progress(&format_remaining(remaining), remaining, total)
            {
                warn!("Failed to update focus progress: {:#}", e);
            }
            return true;
        }

        let Some(active) = slot.active.take() else {
            return false;
        };
        info!("Focus session {} completed", active.id);
        self.cleanup(&mut slot, active.session, FocusState::Completed).await;
        false
    }

    async fn cleanup(&self, slot: &mut FocusSlot, session: FocusSession, outcome: FocusState) {
        self.inner.deps.tracker.start_stop_focus_session(None).await;

        if session.toggle_dnd {
            if let Err(e) = self.inner.deps.dnd.set_dnd(false) {
                warn!("Failed to disable do-not-disturb: {:#}", e);
            }
        }

        if let Err(e) = self.inner.deps.status.clear_status(StatusSlot::Focus) {
            warn!("Failed to clear focus status: {:#}", e);
        }

        let body = if outcome == FocusState::Completed {
            COMPLETED_TEXT
        } else {
            ABORTED_TEXT
        };
        if let Err(e) = self.inner.deps.status.show_terminal(TERMINAL_TITLE, body) {
            warn!("Failed to show focus session result: {:#}", e);
        }

        slot.state = outcome;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcement::bus::EventBus;
    use crate::enforcement::testing::{FakeDnd, FixedUsage, MemoryStore, RecordingPresenter, apps};
    use crate::enforcement::tracker::{TrackerDeps, TrackerStatus};
    use std::collections::HashSet;

    struct Fixture {
        presenter: Arc<RecordingPresenter>,
        dnd: Arc<FakeDnd>,
        tracker: UsageTracker,
        focus: FocusController,
    }

    fn fixture() -> Fixture {
        let presenter = RecordingPresenter::new();
        let dnd = FakeDnd::new();
        let tracker = UsageTracker::new(TrackerDeps {
            store: MemoryStore::new(),
            oracle: FixedUsage::new(),
            overlay: presenter.clone(),
            status: presenter.clone(),
            bus: EventBus::new(),
            state_path: None,
        });
        let focus = FocusController::new(FocusDeps {
            tracker: tracker.clone(),
            status: presenter.clone(),
            dnd: dnd.clone(),
        });
        Fixture { presenter, dnd, tracker, focus }
    }

    fn session(duration_seconds: u64, toggle_dnd: bool, names: &[&str]) -> FocusSession {
        FocusSession {
            toggle_dnd,
            duration_seconds,
            distracting_apps: apps(names),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_session_never_runs() {
        let f = fixture();

        let started = f.focus.start(FocusSession::from_json("")).await.unwrap();

        assert!(!started);
        assert_eq!(f.focus.state().await, FocusState::Idle);
        assert_eq!(f.tracker.snapshot().await.status, TrackerStatus::Stopped);
        assert!(f.dnd.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_completes_and_cleans_up() {
        let f = fixture();

        assert!(f.focus.start(session(3, true, &["com.feed"])).await.unwrap());
        assert_eq!(f.focus.state().await, FocusState::Running);
        assert_eq!(f.tracker.snapshot().await.distracting_apps, apps(&["com.feed"]));
        assert_eq!(f.dnd.calls(), vec![true]);

        tokio::time::sleep(Duration::from_millis(3_500)).await;

        assert_eq!(f.focus.state().await, FocusState::Completed);
        assert_eq!(f.dnd.calls(), vec![true, false]);
        assert_eq!(f.tracker.snapshot().await.status, TrackerStatus::Stopped);
        assert_eq!(f.presenter.terminals(), vec![COMPLETED_TEXT.to_string()]);

        let progress: Vec<u64> = f.presenter.progress().iter().map(|(_, current, _)| *current).collect();
        assert_eq!(progress, vec![3, 2, 1]);
        assert_eq!(
            f.presenter.progress()[0].0,
            "Focus session will end in 00:03 minutes".to_string()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_and_no_tick_follows() {
        let f = fixture();
        f.focus.start(session(60, false, &["com.feed"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        f.focus.stop().await;
        let ticks = f.presenter.progress().len();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(f.focus.state().await, FocusState::Aborted);
        assert_eq!(f.presenter.progress().len(), ticks);
        assert_eq!(f.presenter.terminals(), vec![ABORTED_TEXT.to_string()]);
        assert!(f.dnd.calls().is_empty());
        assert!(f.tracker.snapshot().await.distracting_apps.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_while_running_is_rejected() {
        let f = fixture();
        f.focus.start(session(60, false, &["com.a"])).await.unwrap();
        let first = f.focus.session_id().await;

        assert!(f.focus.start(session(60, false, &["com.b"])).await.is_err());
        assert_eq!(f.focus.session_id().await, first);
        assert_eq!(f.tracker.snapshot().await.distracting_apps, apps(&["com.a"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_is_noop() {
        let f = fixture();

        f.focus.stop().await;

        assert_eq!(f.focus.state().await, FocusState::Idle);
        assert!(f.presenter.terminals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_completion() {
        let f = fixture();
        f.focus.start(session(1, false, &["com.a"])).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(f.focus.state().await, FocusState::Completed);

        assert!(f.focus.start(session(5, false, &["com.b"])).await.unwrap());
        let blocked: HashSet<String> = f.tracker.snapshot().await.distracting_apps;
        assert_eq!(blocked, apps(&["com.b"]));
    }
}
