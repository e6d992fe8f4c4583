//! SQL Executor - safety gate, schema check and timeout-bounded execution
//!
//! The timeout is cooperative: SQLite calls the progress handler every
//! `progress_interval` virtual machine instructions and the statement is
//! aborted once the wall-clock bound has passed. An unsampled interval can
//! run slightly past the bound. No partial rows are returned on abort.

use crate::error::{ExecutionError, GuruError, ValidationError};
use crate::rows::{CellValue, Row};
use crate::schema::{validate_schema, SchemaDescriptor};
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Statement kinds that must never reach the database
const FORBIDDEN_KEYWORDS: &[&str] = &["drop", "delete", "update", "insert", "alter"];

/// Default number of VM instructions between timeout samples
pub const DEFAULT_PROGRESS_INTERVAL: i32 = 100_000;

static FORBIDDEN_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    FORBIDDEN_KEYWORDS
        .iter()
        .map(|word| (*word, Regex::new(&format!(r"\b{}\b", word)).unwrap()))
        .collect()
});

/// Safety gate: only SELECT statements, no mutating keyword anywhere
pub fn validate_sql(sql: &str) -> Result<(), ValidationError> {
    let clean = sql.trim().to_lowercase();
    if !clean.starts_with("select") {
        return Err(ValidationError::NotSelect);
    }

    for (word, pattern) in FORBIDDEN_PATTERNS.iter() {
        if pattern.is_match(&clean) {
            return Err(ValidationError::ForbiddenKeyword(word.to_string()));
        }
    }

    Ok(())
}

/// Owns the database connection and the lazily introspected schema
pub struct SqlExecutor {
    conn: Connection,
    schema: OnceCell<SchemaDescriptor>,
    progress_interval: i32,
}

impl SqlExecutor {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            schema: OnceCell::new(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_progress_interval(mut self, interval: i32) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Live schema, introspected on first use and kept for this executor
    pub fn schema(&self) -> Result<&SchemaDescriptor, ValidationError> {
        self.schema
            .get_or_try_init(|| SchemaDescriptor::introspect(&self.conn))
            .map_err(ValidationError::Schema)
    }

    /// Forget the cached schema so the next validation introspects again
    pub fn refresh_schema(&mut self) {
        self.schema = OnceCell::new();
    }

    pub fn validate_schema(&self, sql: &str) -> Result<(), ValidationError> {
        validate_schema(sql, self.schema()?)
    }

    /// Safety gate, schema check, then run
    pub fn execute_sql(&self, sql: &str, timeout: Duration) -> Result<Vec<Row>, GuruError> {
        validate_sql(sql)?;
        self.validate_schema(sql)?;
        Ok(self.run_query(sql, timeout)?)
    }

    /// Run a statement under the cooperative timeout and collect every row
    pub fn run_query(&self, sql: &str, timeout: Duration) -> Result<Vec<Row>, ExecutionError> {
        let started = Instant::now();
        self.conn
            .progress_handler(self.progress_interval, Some(move || started.elapsed() > timeout));

        let result = self.collect_rows(sql);

        self.conn.progress_handler(0, None::<fn() -> bool>);

        match result {
            Ok(rows) => {
                debug!(
                    "Query returned {} rows in {:?}",
                    rows.len(),
                    started.elapsed()
                );
                Ok(rows)
            }
            Err(e) if is_interrupted(&e) => {
                warn!("Query interrupted after {:?}", started.elapsed());
                Err(ExecutionError::Timeout { limit: timeout })
            }
            Err(e) => Err(ExecutionError::Driver(e)),
        }
    }

    fn collect_rows(&self, sql: &str) -> rusqlite::Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                record.push(CellValue::from(row.get::<_, Value>(idx)?));
            }
            out.push(record);
        }
        Ok(out)
    }
}

fn is_interrupted(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn executor() -> SqlExecutor {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO players (player_id, first_name, last_name, gender)
             VALUES (1, 'Roger', 'Federer', 'ATP'), (2, 'Rafael', 'Nadal', 'ATP');",
        )
        .unwrap();
        SqlExecutor::new(conn)
    }

    #[test]
    fn test_validate_sql_rejects_drop() {
        assert!(matches!(
            validate_sql("DROP TABLE players;"),
            Err(ValidationError::NotSelect)
        ));
    }

    #[test]
    fn test_validate_sql_rejects_non_select() {
        assert!(validate_sql("with x as (select 1) select * from x").is_err());
        assert!(validate_sql("PRAGMA table_info(players)").is_err());
    }

    #[test]
    fn test_validate_sql_rejects_embedded_keyword() {
        let err = validate_sql("select 1; delete from players").unwrap_err();
        assert!(matches!(err, ValidationError::ForbiddenKeyword(ref w) if w == "delete"));
    }

    #[test]
    fn test_validate_sql_whole_words_only() {
        assert!(validate_sql("select updated_at, dropshot from t").is_ok());
    }

    #[test]
    fn test_validate_sql_accepts_select() {
        assert!(validate_sql("select 1").is_ok());
        assert!(validate_sql("   SELECT p.first_name FROM players p").is_ok());
    }

    #[test]
    fn test_execute_returns_ordered_rows() {
        let exec = executor();
        let rows = exec
            .execute_sql(
                "SELECT p.first_name, p.player_id FROM players p ORDER BY p.player_id",
                Duration::from_secs(5),
            )
            .unwrap();
        assert_eq!(
            rows,
            vec![
                vec![CellValue::from("Roger"), CellValue::Integer(1)],
                vec![CellValue::from("Rafael"), CellValue::Integer(2)],
            ]
        );
    }

    #[test]
    fn test_execute_rejects_unknown_column() {
        let exec = executor();
        let err = exec
            .execute_sql("select m.nope from matches m", Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(
            err,
            GuruError::Validation(ValidationError::UnknownColumns(_))
        ));
    }

    #[test]
    fn test_timeout_interrupts_query() {
        let exec = executor().with_progress_interval(1_000);
        let err = exec
            .run_query(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                 SELECT COUNT(*) FROM c",
                Duration::from_millis(50),
            )
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().to_lowercase().contains("interrupted"));
    }

    #[test]
    fn test_handler_cleared_after_timeout() {
        let exec = executor().with_progress_interval(1_000);
        let _ = exec.run_query(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT COUNT(*) FROM c",
            Duration::from_millis(10),
        );
        let rows = exec.run_query("SELECT 1", Duration::from_secs(5)).unwrap();
        assert_eq!(rows, vec![vec![CellValue::Integer(1)]]);
    }

    #[test]
    fn test_driver_error_is_not_timeout() {
        let exec = executor();
        let err = exec
            .run_query("SELECT * FROM missing_table", Duration::from_secs(5))
            .unwrap_err();
        assert!(!err.is_timeout());
    }
}
