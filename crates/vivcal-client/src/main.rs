//! vivcal CLI entry point.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::Level;

use vivcal_client::cli::{Cli, Command, ConfigAction};
use vivcal_client::commands;
use vivcal_client::config::ClientConfig;
use vivcal_client::error::ClientResult;
use vivcal_core::{TracingConfig, init_tracing, parse_level};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(run(cli));
    // The console's blocking stdin read would otherwise hold up exit.
    runtime.shutdown_timeout(Duration::from_millis(100));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = ClientConfig::load(cli.config.as_deref())?;
    let source = cli.config.clone().unwrap_or_else(ClientConfig::default_path);

    match cli.command {
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config, &source),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&source),
        },
        Some(Command::Run) | None => {
            init_tracing(tracing_config(&cli, &config))?;
            commands::run::run(&config).await
        }
    }
}

fn tracing_config(cli: &Cli, config: &ClientConfig) -> TracingConfig {
    let base = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
            .with_level(parse_level(&config.log.level).unwrap_or(Level::INFO))
            .with_format(config.log.format)
    };
    match cli.log_format {
        Some(format) => base.with_format(format),
        None => base,
    }
}
