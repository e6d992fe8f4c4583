//! Turn log for guructl
//!
//! One JSON line per answered question, XDG-compliant with a fallback chain.
//! Logging never breaks a turn: write failures are reported through tracing
//! and otherwise ignored.

use guru_common::engine::EngineResult;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log entry for each processed question
#[derive(Debug, Serialize, Deserialize)]
pub struct TurnLogEntry {
    /// RFC 3339 timestamp
    pub ts: String,

    /// Request ID (UUID)
    pub req_id: String,

    pub question: String,

    /// Terminal engine state, e.g. "success" or "cache_hit"
    pub outcome: String,

    /// Duration in milliseconds
    pub duration_ms: u64,

    pub cached: bool,

    pub followup: bool,

    /// Error details if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl TurnLogEntry {
    pub fn from_result(res: &EngineResult, elapsed: Duration) -> Self {
        let error = res.error.as_ref().map(|message| ErrorDetails {
            code: match (res.error_code, res.needs_clarification) {
                (Some(code), _) => code.to_string(),
                (None, true) => "clarification".to_string(),
                (None, false) => "error".to_string(),
            },
            message: message.clone(),
        });

        Self {
            ts: Self::now(),
            req_id: Self::generate_req_id(),
            question: res.question.clone(),
            outcome: res.outcome.as_str().to_string(),
            duration_ms: elapsed.as_millis() as u64,
            cached: res.cached,
            followup: res.followup,
            error,
        }
    }

    /// Discover log file path with fallback chain
    ///
    /// Priority:
    /// 1. $GURU_LOG_FILE environment variable (explicit override)
    /// 2. $XDG_STATE_HOME/tennis-guru/turns.jsonl (XDG standard)
    /// 3. ~/.local/state/tennis-guru/turns.jsonl (XDG fallback)
    pub fn discover_log_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GURU_LOG_FILE") {
            return Some(PathBuf::from(path));
        }

        if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
            return Some(Path::new(&xdg_state).join("tennis-guru").join("turns.jsonl"));
        }

        if let Ok(home) = std::env::var("HOME") {
            return Some(
                Path::new(&home)
                    .join(".local/state/tennis-guru")
                    .join("turns.jsonl"),
            );
        }

        None
    }

    /// Append to the discovered log file, if any
    pub fn write(&self) {
        let Some(path) = Self::discover_log_path() else {
            return;
        };
        if let Err(e) = self.write_to(&path) {
            tracing::debug!("Turn log not written to {}: {}", path.display(), e);
        }
    }

    /// Append this entry as one JSON line
    pub fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", json)?;
        Ok(())
    }

    pub fn generate_req_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }
}
