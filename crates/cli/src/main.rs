//! Luzimarket CLI - Database migrations and operational tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! lm-cli migrate
//!
//! # Load delivery zones from YAML (idempotent)
//! lm-cli zones seed -f zones.yaml
//!
//! # Take a zone out of the catalog
//! lm-cli zones deactivate 3
//!
//! # Show the whole catalog
//! lm-cli zones list
//!
//! # Delete rotation credentials that can no longer be redeemed
//! lm-cli sessions purge
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "lm-cli")]
#[command(author, version, about = "Luzimarket CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Manage the delivery zone catalog
    Zones {
        #[command(subcommand)]
        action: ZoneAction,
    },
    /// Maintain identity sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum ZoneAction {
    /// Insert or update zones from a YAML file
    Seed {
        /// Path to the YAML file
        #[arg(short, long, default_value = "crates/storefront/zones.yaml")]
        file: String,
    },
    /// Deactivate a zone; stored preferences pointing at it become invalid
    Deactivate {
        /// Zone ID
        id: i32,
    },
    /// List every zone, active or not
    List,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Delete expired, redeemed and revoked rotation credentials
    Purge,
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
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Zones { action } => match action {
            ZoneAction::Seed { file } => commands::zones::seed(&file).await?,
            ZoneAction::Deactivate { id } => commands::zones::deactivate(id).await?,
            ZoneAction::List => commands::zones::list().await?,
        },
        Commands::Sessions { action } => match action {
            SessionAction::Purge => commands::sessions::purge().await?,
        },
    }
    Ok(())
}
