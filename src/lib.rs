pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod console;
pub mod job;
mod logger;
pub mod navigate;
pub mod params;
pub mod poller;
mod progress;
pub mod render;
pub mod snapshot;
pub mod view;

use clap::Parser;

use crate::cli::Cli;
use crate::commands::ExitCode;
use crate::config::{AppConfig, Settings};

pub fn run() -> std::process::ExitCode {
    let cli = Cli::parse();

    // File logging (<data_dir>/forecast-console/logs/forecast-console.log)
    if let Err(e) = logger::init(cli.verbose) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let config = AppConfig::load(cli.config.as_deref());
    let settings = Settings::resolve(&config, &cli.overrides());
    log::debug!("server: {}", settings.base_url);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::Error.into();
        }
    };

    runtime
        .block_on(commands::run(cli.command, &settings, cli.yes))
        .into()
}
