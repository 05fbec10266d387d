use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

use crate::config::{self, EXAMPLE_CONFIG};
use crate::enforcement::FocusSession;
use crate::enforcement::session::format_remaining;
use crate::platform::common::{atomic_write, ensure_directory_exists};
use crate::state;
use crate::store::{JsonFileStore, PolicyStore};

/// Write the example configuration file
pub fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_directory_exists(parent)?;
    }

    atomic_write(config_path, EXAMPLE_CONFIG.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    println!("✓ Created configuration file: {}", config_path.display());
    println!("\nEdit this file to point the engine at your policy store.");
    println!("Then start the engine: mindful-policy run");

    Ok(())
}

/// Load and validate configuration, printing the resolved settings
pub fn check_config(config_path: &Path) -> Result<()> {
    let config = config::load_config(config_path)
        .context("Configuration is invalid")?;

    println!("✓ Configuration is valid: {}", config_path.display());
    println!();
    println!("Policy store:     {}", config.resolved_store_path()?.display());
    println!("State file:       {}", config.resolved_state_path()?.display());
    println!("Liveness check:   every {}s", config.liveness_interval_secs);
    println!(
        "Tunnel:           {}/{} route {}/{}",
        config.tunnel.address,
        config.tunnel.prefix,
        config.tunnel.route,
        config.tunnel.route_prefix
    );

    Ok(())
}

/// Print the policies the engine would enforce
pub fn show_store(config_path: &Path) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let store_path = config.resolved_store_path()?;
    let store = JsonFileStore::new(&store_path);

    println!("Policy Store: {}", store.path().display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let timers = store.app_timers();
    println!("App timers:");
    if timers.is_empty() {
        println!("  (none)");
    }
    let mut timers: Vec<_> = timers.into_iter().collect();
    timers.sort();
    for (package, secs) in timers {
        println!("  - {}: {}m {}s per day", package, secs / 60, secs % 60);
    }

    print_app_set("Bedtime apps", store.bedtime_apps());
    print_app_set("Network-blocked apps", store.blocked_apps());

    let state_path = config.resolved_state_path()?;
    match state::load_state(&state_path)? {
        Some(saved) if !saved.purged_apps.is_empty() => {
            println!();
            println!("Out of time today ({}):", saved.state_date);
            for package in &saved.purged_apps {
                println!("  - {}", package);
            }
        }
        _ => {}
    }

    Ok(())
}

/// Parse a focus session payload the way the engine would
pub fn parse_focus(payload: &str) -> Result<()> {
    let session = FocusSession::from_json(payload);

    println!("Duration:          {}s", session.duration_seconds);
    println!("Do-not-disturb:    {}", if session.toggle_dnd { "on" } else { "off" });
    print_app_set("Distracting apps", session.distracting_apps.clone());
    println!();

    if session.is_runnable() {
        println!("✓ Session would run");
        println!("  {}", format_remaining(session.duration_seconds));
    } else {
        println!("✗ Session would be rejected: no apps to block");
    }

    Ok(())
}

fn print_app_set(label: &str, apps: HashSet<String>) {
    println!("{}:", label);
    if apps.is_empty() {
        println!("  (none)");
        return;
    }

    let mut apps: Vec<_> = apps.into_iter().collect();
    apps.sort();
    for package in apps {
        println!("  - {}", package);
    }
}
