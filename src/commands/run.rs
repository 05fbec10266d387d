use anyhow::Result;
use chrono::Local;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

use super::utils::format_duration;
use crate::config::{self, EngineConfig};
use crate::enforcement::{
    Command, DesktopPresenter, DryRunTunnelProvider, Engine, EngineInput, EngineParts,
    MidnightScheduler, SystemDnd,
};
use crate::store::JsonFileStore;

/// Run the engine until Ctrl+C (or end of input with `exit_on_eof`)
pub fn run_engine(config_path: &Path, exit_on_eof: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async { run_engine_loop(config, exit_on_eof).await })
}

fn build_engine(config: &EngineConfig) -> Result<Engine> {
    let store_path = config.resolved_store_path()?;
    let state_path = config.resolved_state_path()?;
    tracing::info!("Policy store: {}", store_path.display());
    tracing::info!("Enforcement state: {}", state_path.display());

    let presenter = Arc::new(DesktopPresenter);
    Ok(Engine::new(EngineParts {
        store: Arc::new(JsonFileStore::new(store_path)),
        overlay: presenter.clone(),
        status: presenter,
        dnd: Arc::new(SystemDnd),
        provider: Arc::new(DryRunTunnelProvider::new()),
        tunnel: config.tunnel,
        state_path: Some(state_path),
    }))
}

async fn run_engine_loop(config: EngineConfig, exit_on_eof: bool) -> Result<()> {
    tracing::info!("Starting enforcement engine");
    let engine = build_engine(&config)?;

    // Both controllers shed themselves when there is nothing to enforce
    engine.dispatch(Command::Start).await?;
    engine.dispatch(Command::StartNetworkBlocking).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    let mut liveness = tokio::time::interval(Duration::from_secs(config.liveness_interval_secs));
    liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let midnight = MidnightScheduler::sleep_until_midnight();
    tokio::pin!(midnight);
    log_next_midnight();

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) => handle_line(&engine, &line).await,
                Ok(None) => {
                    if exit_on_eof {
                        tracing::info!("Input closed, stopping");
                        break;
                    }
                    tracing::info!("Input closed, running until interrupted");
                    input_open = false;
                }
                Err(e) => {
                    tracing::warn!("Failed to read input: {}", e);
                    input_open = false;
                }
            },
            _ = liveness.tick() => {
                engine.ensure_alive().await;
                engine.log_status().await;
            }
            _ = &mut midnight => {
                if let Err(e) = engine.dispatch(Command::MidnightReset).await {
                    tracing::error!("Midnight reset failed: {:#}", e);
                }
                midnight.set(MidnightScheduler::sleep_until_midnight());
                log_next_midnight();
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping");
                break;
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

async fn handle_line(engine: &Engine, line: &str) {
    if line.trim().is_empty() {
        return;
    }

    let input = match EngineInput::parse(line) {
        Ok(input) => input,
        Err(e) => {
            tracing::warn!("Skipping input: {:#}", e);
            return;
        }
    };

    if let Err(e) = engine.handle(input).await {
        tracing::warn!("Command failed: {:#}", e);
    }
}

fn log_next_midnight() {
    let now = Local::now();
    let next = MidnightScheduler::next_midnight(now);
    tracing::debug!(
        "Next midnight reset at {} (in {})",
        next.format("%Y-%m-%d %H:%M:%S %Z"),
        format_duration(next - now)
    );
}
