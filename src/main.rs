use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod config;
mod enforcement;
mod platform;
mod state;
mod store;

use cli::{Args, Commands};
use commands::utils::{init_logging, resolve_config_path};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Commands::Run { exit_on_eof } => {
            let config_path = resolve_config_path(args.config)?;
            commands::run_engine(&config_path, exit_on_eof)
        }
        Commands::Init { force } => {
            let config_path = resolve_config_path(args.config)?;
            commands::init(&config_path, force)
        }
        Commands::CheckConfig => {
            let config_path = resolve_config_path(args.config)?;
            commands::check_config(&config_path)
        }
        Commands::ShowStore => {
            let config_path = resolve_config_path(args.config)?;
            commands::show_store(&config_path)
        }
        Commands::ParseFocus { payload } => commands::parse_focus(&payload),
    }
}
