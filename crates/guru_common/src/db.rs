// Database bootstrap for the tennis history store
// Tables: players, rankings, matches (populated by the ingestion scripts)

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

/// Table definitions. `round = 'F'` is a final; `gender`/`tour` hold 'ATP' or 'WTA'.
pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS players (
    player_id INTEGER PRIMARY KEY,
    first_name TEXT,
    last_name TEXT,
    gender TEXT,
    hand TEXT,
    dob DATE,
    country TEXT,
    height INTEGER
);

CREATE TABLE IF NOT EXISTS rankings (
    player_id INTEGER,
    ranking_date DATE,
    rank INTEGER,
    points INTEGER,
    gender TEXT
);

CREATE TABLE IF NOT EXISTS matches (
    match_id INTEGER PRIMARY KEY,
    tour TEXT,
    tourney_id TEXT,
    tourney_name TEXT,
    surface TEXT,
    tourney_level TEXT,
    match_date DATE,
    round TEXT,
    best_of INTEGER,
    winner_id INTEGER,
    loser_id INTEGER,
    winner_rank INTEGER,
    loser_rank INTEGER,
    w_ace INTEGER,
    l_ace INTEGER,
    score TEXT
);

CREATE INDEX IF NOT EXISTS idx_players_last_name ON players(last_name);
CREATE INDEX IF NOT EXISTS idx_rankings_player_date ON rankings(player_id, ranking_date);
CREATE INDEX IF NOT EXISTS idx_matches_winner ON matches(winner_id);
CREATE INDEX IF NOT EXISTS idx_matches_loser ON matches(loser_id);
CREATE INDEX IF NOT EXISTS idx_matches_tourney ON matches(tourney_id);
";

/// Create tables and indexes if they do not exist yet
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

/// Open the database file, creating its parent directory when needed
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }

    info!("Opening tennis database at: {}", path.display());
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
    Ok(conn)
}
