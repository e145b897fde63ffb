//! `sagemcom`: manage port forwards on a Sagemcom router from the shell.
//!
//! Every invocation logs in, performs one operation and logs out again, so
//! the router's single admin session is never held between commands.

mod cli;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use sagemcom_core::credentials::CredentialChain;
use sagemcom_router::PortForwardService;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error};

use crate::cli::{Cli, Commands};
use crate::output::Outcome;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    debug!("Parsed CLI arguments: {:?}", cli);

    let json = cli.json;
    match run(cli).await {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
            } else {
                println!("{}", outcome.to_text());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            if err.should_log() {
                error!(code = err.error_code(), "{err}");
            }
            if json {
                let doc = output::error_json(&err.into_error_response());
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                eprintln!("Error: {err}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(cli: Cli) -> sagemcom_core::Result<Outcome> {
    let config = config::load(&cli)?;
    debug!(host = %config.host, port = config.port, "using router");

    let credentials = CredentialChain::standard(None, config.onepassword_item.clone());
    let mut service = PortForwardService::from_config(&config, Arc::new(credentials))?;

    let outcome = execute(&mut service, cli.command).await;
    service.logout().await;
    outcome
}

async fn execute(
    service: &mut PortForwardService,
    command: Commands,
) -> sagemcom_core::Result<Outcome> {
    match command {
        Commands::Open {
            name,
            local_address,
            local_port,
            external_port,
            protocol,
        } => service
            .open(&name, &local_address, local_port, external_port, protocol)
            .await
            .map(Outcome::Opened),
        Commands::Close { port } => service.close(port).await.map(|()| Outcome::Closed(port)),
        Commands::List => service.list().await.map(Outcome::Rules),
        Commands::Browser => service
            .open_admin_interface()
            .await
            .map(Outcome::AdminOpened),
    }
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr so `--json` output on stdout stays parseable.
///
/// # Verbosity Levels
/// - 0 (default): `RUST_LOG`, or warnings and errors
/// - 1 (-v): Info level
/// - 2 (-vv): Debug level
/// - 3+ (-vvv): Trace level
fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
