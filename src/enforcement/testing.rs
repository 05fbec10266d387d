//! Test doubles for the controllers' collaborators

use anyhow::Result;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::enforcement::presenter::{DndToggle, OverlayPresenter, StatusPresenter, StatusSlot};
use crate::enforcement::purge::PurgeType;
use crate::enforcement::tunnel::{TunnelError, TunnelInterface, TunnelProvider, TunnelSpec};
use crate::enforcement::usage::UsageOracle;
use crate::store::PolicyStore;

pub fn apps(names: &[&str]) -> HashSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Poll a condition for up to two seconds of real time
pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[derive(Default)]
pub struct MemoryStore {
    timers: Mutex<HashMap<String, u64>>,
    bedtime: Mutex<HashSet<String>>,
    blocked: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_timers(&self, timers: &[(&str, u64)]) {
        *self.timers.lock() = timers
            .iter()
            .map(|(package, secs)| (package.to_string(), *secs))
            .collect();
    }

    pub fn set_bedtime(&self, names: &[&str]) {
        *self.bedtime.lock() = apps(names);
    }

    pub fn set_blocked(&self, names: &[&str]) {
        *self.blocked.lock() = apps(names);
    }
}

impl PolicyStore for MemoryStore {
    fn app_timers(&self) -> HashMap<String, u64> {
        self.timers.lock().clone()
    }

    fn bedtime_apps(&self) -> HashSet<String> {
        self.bedtime.lock().clone()
    }

    fn blocked_apps(&self) -> HashSet<String> {
        self.blocked.lock().clone()
    }
}

#[derive(Default)]
pub struct FixedUsage {
    usage: Mutex<HashMap<String, u64>>,
    foreground: Mutex<Option<String>>,
}

impl FixedUsage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, package: &str, secs: u64) {
        self.usage.lock().insert(package.to_string(), secs);
    }

    pub fn set_foreground(&self, package: &str) {
        *self.foreground.lock() = Some(package.to_string());
    }
}

impl UsageOracle for FixedUsage {
    fn usage_seconds_today(&self, package: &str) -> u64 {
        self.usage.lock().get(package).copied().unwrap_or(0)
    }

    fn last_foreground(&self) -> Option<String> {
        self.foreground.lock().clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presented {
    Block { package: String, purge_type: PurgeType, is_bedtime: bool },
    Status { slot: StatusSlot, text: String },
    ClearStatus(StatusSlot),
    Alert(String),
    Progress { text: String, current: u64, max: u64 },
    Terminal { title: String, body: String },
}

#[derive(Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<Presented>>,
}

impl RecordingPresenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Presented> {
        self.events.lock().clone()
    }

    pub fn blocks(&self) -> Vec<(String, PurgeType, bool)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Presented::Block { package, purge_type, is_bedtime } => {
                    Some((package.clone(), *purge_type, *is_bedtime))
                }
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<(String, u64, u64)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Presented::Progress { text, current, max } => Some((text.clone(), *current, *max)),
                _ => None,
            })
            .collect()
    }

    pub fn terminals(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Presented::Terminal { body, .. } => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Presented::Alert(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Presented) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

impl OverlayPresenter for RecordingPresenter {
    fn show_block(&self, package: &str, purge_type: PurgeType, is_bedtime: bool) -> Result<()> {
        self.push(Presented::Block {
            package: package.to_string(),
            purge_type,
            is_bedtime,
        })
    }
}

impl StatusPresenter for RecordingPresenter {
    fn show_status(&self, slot: StatusSlot, text: &str) -> Result<()> {
        self.push(Presented::Status { slot, text: text.to_string() })
    }

    fn clear_status(&self, slot: StatusSlot) -> Result<()> {
        self.push(Presented::ClearStatus(slot))
    }

    fn show_alert(&self, text: &str) -> Result<()> {
        self.push(Presented::Alert(text.to_string()))
    }

    fn update_progress(&self, text: &str, current: u64, max: u64) -> Result<()> {
        self.push(Presented::Progress { text: text.to_string(), current, max })
    }

    fn show_terminal(&self, title: &str, body: &str) -> Result<()> {
        self.push(Presented::Terminal {
            title: title.to_string(),
            body: body.to_string(),
        })
    }
}

#[derive(Default)]
pub struct FakeDnd {
    calls: Mutex<Vec<bool>>,
}

impl FakeDnd {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<bool> {
        self.calls.lock().clone()
    }
}

impl DndToggle for FakeDnd {
    fn set_dnd(&self, enabled: bool) -> Result<()> {
        self.calls.lock().push(enabled);
        Ok(())
    }
}

/// Tunnel provider with switchable failures and an establish gate
pub struct FakeTunnelProvider {
    pub refuse_protect: AtomicBool,
    pub fail_establish: AtomicBool,
    pub hold_establish: AtomicBool,
    missing_apps: Mutex<HashSet<String>>,
    established: AtomicUsize,
    open: Arc<AtomicUsize>,
    specs: Mutex<Vec<TunnelSpec>>,
}

impl FakeTunnelProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            refuse_protect: AtomicBool::new(false),
            fail_establish: AtomicBool::new(false),
            hold_establish: AtomicBool::new(false),
            missing_apps: Mutex::new(HashSet::new()),
            established: AtomicUsize::new(0),
            open: Arc::new(AtomicUsize::new(0)),
            specs: Mutex::new(Vec::new()),
        })
    }

    pub fn set_missing(&self, names: &[&str]) {
        *self.missing_apps.lock() = apps(names);
    }

    pub fn established(&self) -> usize {
        self.established.load(Ordering::SeqCst)
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn specs(&self) -> Vec<TunnelSpec> {
        self.specs.lock().clone()
    }
}

impl TunnelProvider for FakeTunnelProvider {
    fn protect(&self, _socket: &UdpSocket) -> bool {
        !self.refuse_protect.load(Ordering::SeqCst)
    }

    fn resolve_app(&self, package: &str) -> Result<(), TunnelError> {
        if self.missing_apps.lock().contains(package) {
            return Err(TunnelError::AppNotFound(package.to_string()));
        }
        Ok(())
    }

    fn establish(&self, spec: &TunnelSpec) -> Result<Box<dyn TunnelInterface>, TunnelError> {
        while self.hold_establish.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(2));
        }

        if self.fail_establish.load(Ordering::SeqCst) {
            return Err(TunnelError::Establish("fake establish failure".to_string()));
        }

        self.specs.lock().push(spec.clone());
        self.established.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeInterface {
            open: Arc::clone(&self.open),
            closed: false,
        }))
    }
}

struct FakeInterface {
    open: Arc<AtomicUsize>,
    closed: bool,
}

impl TunnelInterface for FakeInterface {
    fn close(&mut self) -> Result<(), TunnelError> {
        if !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
