use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod error;
mod filter;
mod output;
mod poller;
mod registry;
mod settings;

use poller::Poller;
use registry::ecr::EcrConnector;
use settings::Settings;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the configured repositories and append new images to the results file (default)
    Poll {
        /// Results file to write, overrides OUTPUT_PATH
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check the environment configuration for errors
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Poll { output: None }) {
        Commands::Poll { output } => {
            if let Err(e) = poll(output).await {
                error!(error = ?e, "Polling from container registry failed");
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::CheckConfig => check_config(),
    }
}

async fn poll(output: Option<PathBuf>) -> Result<()> {
    let mut settings = Settings::from_env()?;
    if let Some(output) = output {
        settings.output_path = output;
    }

    let poller = Poller::new(settings)?;
    let summary = poller.run(&EcrConnector).await?;

    for (repository, outcome) in &summary.polled {
        info!(repository = %repository, outcome = ?outcome, "Repository polled");
    }
    info!(
        repositories = summary.polled.len(),
        output = %poller.settings().output_path.display(),
        "Finished polling container registry"
    );
    Ok(())
}

fn check_config() -> Result<()> {
    println!("Checking poller configuration...");
    match Settings::from_env() {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!("  repositories: {}", settings.repositories().join(", "));
            println!(
                "  registry id:  {}",
                settings.registry_id().unwrap_or("<caller account>")
            );
            println!("  output:       {}", settings.output_path.display());
            match settings.last_fetched() {
                Some(since) => println!("  mode:         images pushed after {}", since),
                None => println!(
                    "  mode:         {} most recently pushed images",
                    settings.cold_start_limit
                ),
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
