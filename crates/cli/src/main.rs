//! `spellcache` maintenance CLI.
//!
//! Reads the same layered configuration as the proxy (`SPELLCACHE_*`,
//! `SPELLCACHE_CONFIG_FILE`) and operates directly on the cache database.

use anyhow::Result;
use clap::{Parser, Subcommand};
use spellcache_core::{AppConfig, CacheDb};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Maintenance;

/// Inspect and maintain the spellbook offline cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Cache database path (overrides configuration)
    #[arg(long, global = true, env = "SPELLCACHE_DB_PATH")]
    db: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show namespaces, entry counts and cached resources
    Info,
    /// Delete every cached API response of the current generation
    Clear,
    /// Drop cached entries of one resource so the next access refetches it
    Refresh {
        /// Resource name, e.g. `spells`
        resource: String,
    },
    /// Delete namespaces left behind by previous versions
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let db = CacheDb::open(&config.db_path).await?;
    let maintenance = Maintenance::new(db, &config);

    match cli.command {
        Command::Info => {
            let info = maintenance.info().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("generation: {}", info.generation);
                for ns in &info.namespaces {
                    let marker = if ns.current { "*" } else { " " };
                    println!("{marker} {:<40} {:>6} entries", ns.name, ns.entries);
                }
                println!("resources: {}", info.resources.join(", "));
            }
        }
        Command::Clear => {
            let removed = maintenance.clear().await?;
            report(cli.json, "removed", serde_json::json!(removed), &format!("removed {removed} entries"))?;
        }
        Command::Refresh { resource } => {
            let removed = maintenance.refresh(&resource).await?;
            let text = format!("removed {removed} entries for {resource}");
            report(cli.json, "removed", serde_json::json!(removed), &text)?;
        }
        Command::Prune => {
            let pruned = maintenance.prune().await?;
            let text = if pruned.is_empty() { "nothing to prune".to_string() } else { format!("pruned {}", pruned.join(", ")) };
            report(cli.json, "pruned", serde_json::json!(pruned), &text)?;
        }
    }

    Ok(())
}

fn report(json: bool, field: &str, value: serde_json::Value, text: &str) -> Result<()> {
    if json {
        let mut out = serde_json::Map::new();
        out.insert(field.to_string(), value);
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{text}");
    }
    Ok(())
}
