//! Live schema introspection and column-level SQL validation
//!
//! The column check is a lexical heuristic, not a SQL grammar: it only looks
//! at `alias.column` tokens once quoted literals are removed. Unqualified
//! columns are not checked, and quoted identifiers or unusual formatting can
//! slip through unnoticed.

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Schema summary handed to the external generator
pub const SCHEMA_DESCRIPTION: &str = "
players(
    player_id INTEGER,
    first_name TEXT,
    last_name TEXT,
    gender TEXT,
    hand TEXT,
    dob DATE,
    country TEXT,
    height INTEGER
)

rankings(
    player_id INTEGER,
    ranking_date DATE,
    rank INTEGER,
    points INTEGER,
    gender TEXT
)

matches(
    match_id INTEGER,
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
)
";

static SINGLE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"'[^']*'").unwrap());
static DOUBLE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""[^"]*""#).unwrap());
static QUALIFIED_COLUMN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-zA-Z_][a-zA-Z0-9_]*\.(\w+)\b").unwrap());

/// Table name -> column names, as deployed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDescriptor {
    pub tables: BTreeMap<String, BTreeSet<String>>,
}

impl SchemaDescriptor {
    /// Read every table and its columns from the connected database
    pub fn introspect(conn: &Connection) -> rusqlite::Result<Self> {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tables = BTreeMap::new();
        for table in names {
            let pragma = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
            let mut info = conn.prepare(&pragma)?;
            let columns = info
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<rusqlite::Result<BTreeSet<_>>>()?;
            tables.insert(table, columns);
        }

        Ok(Self { tables })
    }

    /// Union of column names across all tables
    pub fn all_columns(&self) -> BTreeSet<&str> {
        self.tables
            .values()
            .flat_map(|cols| cols.iter().map(String::as_str))
            .collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.tables.values().any(|cols| cols.contains(column))
    }
}

/// Remove single- and double-quoted spans
pub fn strip_literals(sql: &str) -> String {
    let without_single = SINGLE_QUOTED.replace_all(sql, "");
    DOUBLE_QUOTED.replace_all(&without_single, "").into_owned()
}

/// Column names referenced as `alias.column`, literals excluded
pub fn extract_identifiers(sql: &str) -> BTreeSet<String> {
    let cleaned = strip_literals(sql);
    QUALIFIED_COLUMN
        .captures_iter(&cleaned)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Fail when a qualified column does not exist in any table.
/// Table qualification itself is not checked.
pub fn validate_schema(sql: &str, schema: &SchemaDescriptor) -> Result<(), ValidationError> {
    let unknown: Vec<String> = extract_identifiers(sql)
        .into_iter()
        .filter(|col| !schema.has_column(col))
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::UnknownColumns(unknown))
    }
}
