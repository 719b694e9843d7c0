//! Quarry demo runner
//!
//! Registers a small `User`/`Address` schema, opens a session factory
//! against the configured database and runs the demo flows: inserting
//! users, selecting by name and by a list of names, and attaching
//! addresses to a user.
//!
//! Usage:
//!   quarry --database demo.db --verbose

use std::path::PathBuf;
use anyhow::Result;
use clap::Parser;
use quarry_cli::{demo_registry, open_engine, run_demo, CliConfig};
use quarry_session::SessionFactory;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(about = "Run the Quarry ORM demo flows")]
struct Args {
    /// Database URL: `:memory:`, `memory://` or a SQLite file path
    #[arg(short, long)]
    database: Option<String>,

    /// Path to a TOML config file with [database] and [session] sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log every write statement at info level
    #[arg(long)]
    echo: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let mut config = CliConfig::load(args.config.as_deref())?;
    if let Some(url) = args.database {
        config.database.url = url;
    }
    if args.echo {
        config.session.echo = true;
    }

    info!("Opening {}", config.database.url);
    let engine = open_engine(&config.database.url)?;
    let factory = SessionFactory::new(demo_registry()?, engine, config.session)?;
    let report = run_demo(&factory)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n  Inserted:");
    for line in &report.inserted {
        println!("    {line}");
    }
    if let Some(one) = &report.selected_one {
        println!("  Selected by username:\n    {one}");
    }
    println!("  Selected by username list:");
    for line in &report.selected_many {
        println!("    {line}");
    }
    if let Some(added) = &report.added {
        println!("  Added:\n    {added}");
    }
    if let Some(owner) = &report.with_addresses {
        println!("  {owner} has addresses:");
        for line in &report.addresses {
            println!("    {line}");
        }
    }
    println!();
    Ok(())
}
