//! jamfarm CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use jamfarm_client::cli::{Cli, Command, ConfigAction};
use jamfarm_client::commands;
use jamfarm_client::config::ClientConfig;
use jamfarm_client::error::ClientResult;
use jamfarm_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let tracing_config = if config.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    cli.apply_to(&mut config);
    Ok(config)
}

async fn run(cli: Cli, config: ClientConfig) -> ClientResult<ExitCode> {
    match cli.command {
        Some(Command::Config { action }) => {
            match action {
                ConfigAction::Dump => commands::config::dump(&config)?,
                ConfigAction::Validate => commands::config::validate(&config)?,
                ConfigAction::Path => commands::config::path(&config)?,
            }
            Ok(ExitCode::SUCCESS)
        }
        None => commands::status::run(&config, cli.retries).await,
    }
}
