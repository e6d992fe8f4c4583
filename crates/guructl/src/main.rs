//! Tennis Guru Control - ask questions about tennis history from the terminal

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use guru_common::GuruConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// Version is embedded at build time
const VERSION: &str = env!("GURU_VERSION");

#[derive(Parser)]
#[command(name = "guructl")]
#[command(about = "Tennis Guru - natural-language questions over tennis history", long_about = None)]
#[command(version = VERSION)]
struct Cli {
    /// Configuration file (skips the default search path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides [database] path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        /// The question, e.g. "How many Grand Slam titles did Federer win?"
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Print the full result envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session with follow-up support
    Repl,

    /// Create the tables and indexes in the configured database
    InitDb,

    /// Show the live database schema
    Schema,

    /// Show the effective configuration
    Config {
        /// Structural policy to apply (anti_join, passthrough)
        #[arg(long)]
        policy: Option<String>,

        /// Write the configuration back to its file
        #[arg(long)]
        save: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("GURU_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<GuruConfig> {
    let mut config = match &cli.config {
        Some(path) => GuruConfig::load_from(path)?,
        None => GuruConfig::load()?,
    };
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Ask { question, json } => {
            let code = commands::ask(&config, &question.join(" "), json)?;
            if code != guructl::errors::EXIT_SUCCESS {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Repl => commands::repl(&config),
        Commands::InitDb => commands::init_db(&config),
        Commands::Schema => commands::schema(&config),
        Commands::Config { policy, save } => {
            commands::config(config, policy.as_deref(), save, cli.config.as_deref())
        }
    }
}
