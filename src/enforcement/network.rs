use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, error, info, warn};

use crate::config::TunnelSettings;
use crate::enforcement::presenter::{StatusPresenter, StatusSlot};
use crate::enforcement::tunnel::{TunnelBuilder, TunnelError, TunnelInterface, TunnelProvider};
use crate::store::PolicyStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Collaborators handed to the network controller at construction
pub struct NetworkDeps {
    pub store: Arc<dyn PolicyStore>,
    pub provider: Arc<dyn TunnelProvider>,
    pub status: Arc<dyn StatusPresenter>,
    pub settings: TunnelSettings,
}

/// Ownership token for one tunnel worker thread
struct WorkerHandle {
    id: u64,
    interrupted: Arc<AtomicBool>,
}

impl WorkerHandle {
    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        debug!("Tunnel worker #{} interrupted", self.id);
    }
}

/// Holds the current worker; swapping in a new one interrupts the old one
#[derive(Default)]
struct WorkerSlot {
    current: Mutex<Option<WorkerHandle>>,
}

impl WorkerSlot {
    /// Install `next`, then interrupt whatever it replaced
    fn replace(&self, next: Option<WorkerHandle>) {
        let previous = std::mem::replace(&mut *self.current.lock(), next);
        if let Some(previous) = previous {
            previous.interrupt();
        }
    }

    /// Clear the slot only if `id` is still the current worker
    fn clear_if_current(&self, id: u64) -> bool {
        let mut current = self.current.lock();
        if current.as_ref().map(|worker| worker.id) != Some(id) {
            return false;
        }
        current.take();
        true
    }

    #[cfg(test)]
    fn current_id(&self) -> Option<u64> {
        self.current.lock().as_ref().map(|worker| worker.id)
    }
}

struct ActiveTunnel {
    worker_id: u64,
    interface: Box<dyn TunnelInterface>,
}

struct NetworkShared {
    deps: NetworkDeps,
    status: Mutex<NetworkStatus>,
    blocked: Mutex<HashSet<String>>,
    restart_pending: AtomicBool,
    worker: WorkerSlot,
    tunnel: Mutex<Option<ActiveTunnel>>,
    live_workers: AtomicUsize,
    next_worker_id: AtomicU64,
}

/// Decrements the live worker count when a worker thread exits
struct LiveWorkerGuard(Arc<NetworkShared>);

impl Drop for LiveWorkerGuard {
    fn drop(&mut self) {
        self.0.live_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Network access blocking controller.
///
/// Keeps at most one tunnel worker. Policy updates only mark a restart as
/// pending; the tunnel is rebuilt at the next safe point so that unrelated
/// connections are not dropped while the device is in use.
#[derive(Clone)]
pub struct NetworkBlocker {
    shared: Arc<NetworkShared>,
}

impl NetworkBlocker {
    pub fn new(deps: NetworkDeps) -> Self {
        Self {
            shared: Arc::new(NetworkShared {
                deps,
                status: Mutex::new(NetworkStatus::Disconnected),
                blocked: Mutex::new(HashSet::new()),
                restart_pending: AtomicBool::new(false),
                worker: WorkerSlot::default(),
                tunnel: Mutex::new(None),
                live_workers: AtomicUsize::new(0),
                next_worker_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn start(&self) {
        let blocked = self.shared.deps.store.blocked_apps();
        if blocked.is_empty() {
            info!("No apps are blocked from the network, not connecting");
            self.shared.teardown(None);
            return;
        }

        *self.shared.blocked.lock() = blocked;
        self.connect();
    }

    pub fn update_blocked_apps(&self) {
        let blocked = self.shared.deps.store.blocked_apps();
        if blocked.is_empty() {
            info!("Blocked app list is now empty, disconnecting");
            *self.shared.blocked.lock() = blocked;
            self.shared.teardown(None);
            return;
        }

        let count = blocked.len();
        *self.shared.blocked.lock() = blocked;

        if self.status() == NetworkStatus::Disconnected {
            self.connect();
        } else {
            self.shared.restart_pending.store(true, Ordering::SeqCst);
            info!(
                "Blocked app list updated ({} app(s)), restart deferred to the next safe point",
                count
            );
        }
    }

    /// Perform a deferred restart, if one is pending
    pub fn on_safe_point(&self) {
        if !self.shared.restart_pending.swap(false, Ordering::SeqCst) {
            debug!("Safe point reached with no pending tunnel restart");
            return;
        }

        if self.status() == NetworkStatus::Disconnected {
            debug!("Tunnel is down, dropping pending restart");
            return;
        }

        self.restart();
    }

    /// Close the current tunnel and connect again with the latest blocked set.
    /// The new worker replaces and interrupts the old one.
    pub fn restart(&self) {
        info!("Restarting network blocking tunnel");
        self.shared.close_tunnel();
        self.connect();
    }

    pub fn stop(&self) {
        self.shared.teardown(None);
    }

    pub fn status(&self) -> NetworkStatus {
        *self.shared.status.lock()
    }

    pub fn blocked_apps(&self) -> HashSet<String> {
        self.shared.blocked.lock().clone()
    }

    pub fn restart_pending(&self) -> bool {
        self.shared.restart_pending.load(Ordering::SeqCst)
    }

    /// Worker threads that have not exited yet
    pub fn live_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::SeqCst)
    }

    pub fn has_tunnel(&self) -> bool {
        self.shared.tunnel.lock().is_some()
    }

    fn connect(&self) {
        let shared = &self.shared;
        let id = shared.next_worker_id.fetch_add(1, Ordering::SeqCst) + 1;
        let interrupted = Arc::new(AtomicBool::new(false));
        let blocked: Vec<String> = shared.blocked.lock().iter().cloned().collect();

        let text = format!("Network access is blocked for {} app(s)", blocked.len());
        if let Err(e) = shared.deps.status.show_status(StatusSlot::Network, &text) {
            warn!("Failed to show network status: {:#}", e);
        }

        *shared.status.lock() = NetworkStatus::Connecting;
        // Installed before the thread exists so its failure path always finds itself current
        shared.worker.replace(Some(WorkerHandle {
            id,
            interrupted: Arc::clone(&interrupted),
        }));
        shared.live_workers.fetch_add(1, Ordering::SeqCst);

        let worker_shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(format!("tunnel-worker-{}", id))
            .spawn(move || {
                let guard = LiveWorkerGuard(worker_shared);
                run_worker(&guard.0, id, &interrupted, &blocked);
            });

        if let Err(e) = spawned {
            shared.live_workers.fetch_sub(1, Ordering::SeqCst);
            error!("Failed to spawn tunnel worker: {}", e);
            shared.teardown(Some(id));
            return;
        }
        debug!("Tunnel worker #{} started", id);
    }
}

impl NetworkShared {
    /// Drop the worker and tunnel. With `only_worker`, do nothing unless that
    /// worker is still the current one.
    fn teardown(&self, only_worker: Option<u64>) {
        match only_worker {
            Some(id) => {
                if !self.worker.clear_if_current(id) {
                    debug!("Stale tunnel worker #{} failed, ignoring", id);
                    return;
                }
            }
            None => self.worker.replace(None),
        }

        self.close_tunnel();

        self.restart_pending.store(false, Ordering::SeqCst);
        let was = std::mem::replace(&mut *self.status.lock(), NetworkStatus::Disconnected);
        if was != NetworkStatus::Disconnected {
            info!("Network blocking stopped");
        }

        if let Err(e) = self.deps.status.clear_status(StatusSlot::Network) {
            warn!("Failed to clear network status: {:#}", e);
        }
    }

    fn close_tunnel(&self) {
        if let Some(mut active) = self.tunnel.lock().take() {
            if let Err(e) = active.interface.close() {
                warn!("Failed to close tunnel of worker #{}: {}", active.worker_id, e);
            }
        }
    }

    fn install_tunnel(&self, id: u64, mut interface: Box<dyn TunnelInterface>, interrupted: &AtomicBool) {
        let mut tunnel = self.tunnel.lock();

        if interrupted.load(Ordering::SeqCst) {
            debug!("Tunnel worker #{} was replaced while connecting, closing its tunnel", id);
            if let Err(e) = interface.close() {
                warn!("Failed to close tunnel of worker #{}: {}", id, e);
            }
            return;
        }

        let previous = tunnel.replace(ActiveTunnel {
            worker_id: id,
            interface,
        });
        if let Some(mut previous) = previous {
            if let Err(e) = previous.interface.close() {
                warn!("Failed to close tunnel of worker #{}: {}", previous.worker_id, e);
            }
        }

        *self.status.lock() = NetworkStatus::Connected;
        info!("Network blocking tunnel established by worker #{}", id);
    }
}

fn run_worker(shared: &NetworkShared, id: u64, interrupted: &AtomicBool, blocked: &[String]) {
    match establish_tunnel(shared, blocked) {
        Ok(interface) => shared.install_tunnel(id, interface, interrupted),
        Err(e) => {
            if e.is_socket() {
                error!("Tunnel worker #{} socket failure: {}", id, e);
            } else {
                error!("Tunnel worker #{} could not establish the tunnel: {}", id, e);
            }

            if !interrupted.load(Ordering::SeqCst) {
                shared.teardown(Some(id));
            }
        }
    }
}

fn establish_tunnel(
    shared: &NetworkShared,
    blocked: &[String],
) -> Result<Box<dyn TunnelInterface>, TunnelError> {
    let provider = shared.deps.provider.as_ref();
    let settings = &shared.deps.settings;

    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
    if !provider.protect(&socket) {
        return Err(TunnelError::Protect);
    }
    socket.set_nonblocking(true)?;

    let mut builder = TunnelBuilder::new();
    builder
        .add_address(settings.address, settings.prefix)?
        .add_route(settings.route, settings.route_prefix)?;

    for package in blocked {
        match builder.add_included_app(provider, package) {
            Ok(_) => {}
            Err(TunnelError::AppNotFound(package)) => {
                warn!("Skipping {}: not installed on this device", package);
            }
            Err(e) => return Err(e),
        }
    }

    let spec = builder.build()?;
    // An empty include list would route every app into the tunnel
    if spec.included_apps.is_empty() {
        return Err(TunnelError::InvalidArgument(
            "none of the blocked apps are installed".to_string(),
        ));
    }

    provider.establish(&spec)
}
