use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Digital wellbeing policy enforcement engine
///
/// Enforces per-app daily time limits, bedtime and focus-session app blocks,
/// and network cutoff for selected apps.
#[derive(Parser, Debug)]
#[command(name = "mindful-policy")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the engine, reading JSON commands and device events from stdin
    Run {
        /// Shut down when stdin is closed instead of waiting for Ctrl+C
        #[arg(long)]
        exit_on_eof: bool,
    },
    /// Write an example configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
    /// Load and validate the configuration
    CheckConfig,
    /// Show the policies currently in the policy store
    ShowStore,
    /// Parse a focus session payload and report whether it would run
    ParseFocus {
        /// Session JSON, e.g. '{"toggleDnd":true,"durationSeconds":1500,"distractingApps":["com.x"]}'
        payload: String,
    },
}
