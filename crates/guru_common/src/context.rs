//! Conversation context - the single "previous turn" snapshot
//!
//! Overwritten on every successful, non-cached, non-ambiguous turn. It never
//! grows and is never explicitly cleared.

use crate::intent_router::Intent;
use crate::rows::Row;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationContext {
    pub last_sql: Option<String>,
    pub last_intent: Intent,
    pub last_player_names: Vec<(String, String)>,
}

impl ConversationContext {
    pub fn last_sql(&self) -> Option<&str> {
        self.last_sql.as_deref()
    }

    /// Record a successful turn. Player names are only replaced when the first
    /// row starts with two text columns.
    pub fn record(&mut self, sql: &str, intent: Intent, results: &[Row]) {
        self.last_sql = Some(sql.to_string());
        self.last_intent = intent;

        let looks_like_names = results
            .first()
            .map(|row| row.len() >= 2 && row[0].is_text() && row[1].is_text())
            .unwrap_or(false);

        if looks_like_names {
            self.last_player_names = results
                .iter()
                .filter_map(|row| match (row.first()?.as_text(), row.get(1)?.as_text()) {
                    (Some(first), Some(last)) => Some((first.to_string(), last.to_string())),
                    _ => None,
                })
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::CellValue;

    #[test]
    fn test_record_names() {
        let mut ctx = ConversationContext::default();
        ctx.record(
            "SELECT ...",
            Intent::SameTournamentMultiDefeat,
            &[vec![CellValue::from("Andy"), CellValue::from("Murray")]],
        );
        assert_eq!(ctx.last_sql(), Some("SELECT ..."));
        assert_eq!(ctx.last_intent, Intent::SameTournamentMultiDefeat);
        assert_eq!(
            ctx.last_player_names,
            vec![("Andy".to_string(), "Murray".to_string())]
        );
    }

    #[test]
    fn test_numeric_result_keeps_previous_names() {
        let mut ctx = ConversationContext::default();
        ctx.record(
            "SELECT a",
            Intent::None,
            &[vec![CellValue::from("Andy"), CellValue::from("Murray")]],
        );
        ctx.record("SELECT b", Intent::None, &[vec![CellValue::Integer(20)]]);

        assert_eq!(ctx.last_sql(), Some("SELECT b"));
        assert_eq!(ctx.last_player_names.len(), 1);
    }
}
