//! IPA command-line tool
//!
//! Validates IPA manifests offline, previews schedule rules for a given
//! hour, and shows the status the controller reported for live resources.

mod commands;
mod config;
mod manifest;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{schedule, status, validate};
use std::path::PathBuf;

/// IPA autoscaling CLI
#[derive(Parser)]
#[command(name = "ipactl")]
#[command(author, version, about = "CLI for the IPA autoscaling controller", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate an IPA manifest and list its targets
    Validate {
        /// Manifest file (YAML or JSON)
        file: PathBuf,
    },

    /// Show the replicas schedule targets would get at a given hour
    Schedule {
        /// Manifest file (YAML or JSON)
        file: PathBuf,

        /// Hour of day in UTC (defaults to the current hour)
        #[arg(long)]
        hour: Option<u32>,
    },

    /// Show the status reported on IPA resources in the cluster
    Status {
        /// Only list resources in this namespace
        #[arg(long, short)]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        if let Some(path) = &cli.kubeconfig {
            eprintln!("Using kubeconfig {}", path);
        }
    }

    match cli.command {
        Commands::Validate { file } => {
            validate::validate_manifest(&file, cli.format)?;
        }
        Commands::Schedule { file, hour } => {
            schedule::show_schedule(&file, hour, cli.format)?;
        }
        Commands::Status { namespace } => {
            status::show_status(cli.kubeconfig.as_deref(), namespace.as_deref(), cli.format).await?;
        }
    }

    Ok(())
}
