pub mod bus;
pub mod engine;
pub mod focus;
pub mod network;
pub mod presenter;
pub mod purge;
pub mod scheduler;
pub mod session;
pub mod tracker;
pub mod tunnel;
pub mod usage;

#[cfg(test)]
pub mod testing;

pub use engine::{Command, Engine, EngineInput, EngineParts};
pub use presenter::{DesktopPresenter, SystemDnd};
pub use scheduler::MidnightScheduler;
pub use session::FocusSession;
pub use tunnel::DryRunTunnelProvider;
