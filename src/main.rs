// ABOUTME: Entry point for the cutover CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::DeployArgs;
use cutover::config::{self, Config};
use cutover::error::{Error, Result};
use cutover::output::{Output, OutputMode};
use cutover::types::{ImageRef, RequestId, ServiceName};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(OutputMode::from_flags(cli.quiet, cli.json));

    if let Err(e) = run(cli.command, output.clone()).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(command: Commands, output: Output) -> Result<()> {
    let cwd = env::current_dir()?;

    match command {
        Commands::Init { service, force } => {
            config::init_config(&cwd, service.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Validate => {
            let config = Config::discover(&cwd)?;
            output.success(&format!(
                "Configuration valid: {} service(s), {:?} policy",
                config.services.len(),
                config.policy
            ));
            Ok(())
        }
        Commands::Deploy {
            service,
            image,
            request_id,
            force,
        } => {
            let config = Config::discover(&cwd)?;
            let args = DeployArgs {
                service: parse_service(&service)?,
                image: ImageRef::parse(&image)
                    .map_err(|e| Error::InvalidArgument(e.to_string()))?,
                request_id: request_id.map(RequestId::new),
                force,
            };
            commands::deploy(&config, &cwd, args, output).await
        }
        Commands::Status { service } => {
            let config = Config::discover(&cwd)?;
            let service = service.as_deref().map(parse_service).transpose()?;
            commands::status(&config, service.as_ref(), &output)
        }
    }
}

fn parse_service(name: &str) -> Result<ServiceName> {
    ServiceName::new(name).map_err(|e| Error::InvalidArgument(e.to_string()))
}
