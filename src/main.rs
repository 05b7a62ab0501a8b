use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::{error, info};
use ultiplay::app::cli::Args;
use ultiplay::app::config::AppConfig;
use ultiplay::app::runner;
use ultiplay::logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    human_panic::setup_panic!();

    let args = Args::parse();

    if args.generate_config {
        print!("{}", AppConfig::default_config_toml()?);
        return Ok(());
    }
    if args.command.is_none() {
        Args::command().print_help()?;
        return Ok(());
    }

    let (config, state) = AppConfig::load();
    // Dropping the guard flushes the log file
    let _guard = logging::init(&config.logging, args.verbose)?;
    info!(version = env!("CARGO_PKG_VERSION"), "ultiplay starting");

    // Device handles and plan tasks are !Send; everything runs on one thread
    let local = tokio::task::LocalSet::new();
    let result = local.run_until(runner::run(args, config, state)).await;
    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "Command failed");
    }
    result
}
