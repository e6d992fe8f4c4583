//! Subcommand implementations

use anyhow::{Context, Result};
use guru_common::db::{init_schema, open_database};
use guru_common::schema::SchemaDescriptor;
use guru_common::{Engine, GuruConfig};
use guructl::errors::exit_code_for;
use guructl::logging::TurnLogEntry;
use guructl::{output, repl};
use owo_colors::OwoColorize;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Answer one question; returns the process exit code
pub fn ask(config: &GuruConfig, question: &str, json: bool) -> Result<i32> {
    let mut engine = Engine::from_config(config)?;

    let started = Instant::now();
    let res = engine.process(question);
    TurnLogEntry::from_result(&res, started.elapsed()).write();

    if json {
        println!("{}", output::render_json(&res)?);
    } else {
        print!("{}", output::render(&res));
    }

    Ok(exit_code_for(&res))
}

pub fn repl(config: &GuruConfig) -> Result<()> {
    let mut engine = Engine::from_config(config)?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let turns = repl::run_repl(&mut engine, stdin.lock(), &mut stdout, true)?;
    info!("Session ended after {} turns", turns);
    Ok(())
}

pub fn init_db(config: &GuruConfig) -> Result<()> {
    let path = &config.database.path;
    let conn = open_database(path)?;
    init_schema(&conn).with_context(|| format!("Failed to initialize {}", path.display()))?;

    println!("{} {}", "Database ready:".green(), path.display());
    Ok(())
}

pub fn schema(config: &GuruConfig) -> Result<()> {
    let conn = open_database(&config.database.path)?;
    let schema = SchemaDescriptor::introspect(&conn).context("Failed to introspect schema")?;

    if schema.tables.is_empty() {
        println!("No tables found. Run `guructl init-db` first.");
        return Ok(());
    }

    for (table, columns) in &schema.tables {
        println!("{}", table.bold());
        for column in columns {
            println!("  {}", column);
        }
    }
    Ok(())
}

/// Print the effective configuration, optionally changing and saving it.
/// An explicit `--config` file is written in place.
pub fn config(
    mut config: GuruConfig,
    policy: Option<&str>,
    save: bool,
    explicit: Option<&Path>,
) -> Result<()> {
    if let Some(name) = policy {
        config.set_structural_policy(name)?;
    }

    if save {
        let path = match explicit {
            Some(path) => {
                config.save_to(path)?;
                path.to_path_buf()
            }
            None => config.save()?,
        };
        info!("Configuration saved to {}", path.display());
        println!("{} {}", "Saved:".green(), path.display());
    }

    let rendered = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
    print!("{}", rendered);
    Ok(())
}
