// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cutover")]
#[command(about = "Blue/green deployments for load-balanced service fleets")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Emit JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a template cutover.yml
    Init {
        /// Service name for the template
        #[arg(short, long)]
        service: Option<String>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Parse and validate the configuration
    Validate,

    /// Roll a new image into a service
    Deploy {
        /// Service to deploy
        service: String,

        /// Image reference of the new artifact
        #[arg(short, long)]
        image: String,

        /// Pipeline request id, used to reject duplicate submissions
        #[arg(long)]
        request_id: Option<String>,

        /// Break an existing state lock
        #[arg(short, long)]
        force: bool,
    },

    /// Show the live color and version of services
    Status {
        /// Only this service
        service: Option<String>,
    },
}
