//! Orderflow CLI - Database migrations and the demo order publisher.
//!
//! # Usage
//!
//! ```bash
//! # Apply the order schema
//! of-cli migrate
//!
//! # Publish a sample order every 10 seconds until interrupted
//! of-cli publish
//!
//! # Publish 5 orders, one every 500ms
//! of-cli publish --interval 500ms --count 5
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `publish` - Publish well-formed sample orders to the order subject

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::time::Duration;

use clap::{Parser, Subcommand};

mod commands;

use commands::publish::{self, PublishOptions};

#[derive(Parser)]
#[command(name = "of-cli")]
#[command(author, version, about = "Orderflow CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Publish sample orders to the order subject
    Publish {
        /// Delay between orders (e.g. `10s`, `500ms`, `2m`; bare numbers are seconds)
        #[arg(short, long, default_value = "10s", value_parser = publish::parse_interval)]
        interval: Duration,

        /// Stop after this many orders (default: run until interrupted)
        #[arg(short, long)]
        count: Option<u64>,

        /// Subject to publish on
        #[arg(long, default_value = "orders")]
        subject: String,

        /// `JetStream` stream capturing the subject
        #[arg(long, default_value = "ORDERS")]
        stream: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Publish {
            interval,
            count,
            subject,
            stream,
        } => {
            let published = publish::run(PublishOptions {
                interval,
                count,
                subject,
                stream,
            })
            .await?;
            tracing::info!(published, "Publisher finished");
        }
    }
    Ok(())
}
