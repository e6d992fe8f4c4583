//! Query cache - normalized question -> (sql, results)
//!
//! Owned by one Engine. An entry is only stored after its SQL passed every
//! validation stage and executed without error; it is replaced only by a new
//! successful execution of the same normalized question.

use crate::rows::Row;
use serde::Serialize;
use std::collections::HashMap;

/// Trimmed, case-folded question used as cache and context key
pub fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub sql: String,
    pub results: Vec<Row>,
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<String, CacheEntry>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, question: &str) -> Option<&CacheEntry> {
        self.entries.get(&normalize_question(question))
    }

    pub fn store(&mut self, question: &str, sql: String, results: Vec<Row>) {
        self.entries
            .insert(normalize_question(question), CacheEntry { sql, results });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::CellValue;

    #[test]
    fn test_lookup_uses_normalized_question() {
        let mut cache = QueryCache::new();
        cache.store(
            "  How many Aces?  ",
            "SELECT 1".to_string(),
            vec![vec![CellValue::Integer(1)]],
        );

        let entry = cache.get("how many aces?").unwrap();
        assert_eq!(entry.sql, "SELECT 1");
        assert!(cache.get("how many aces").is_none());
    }

    #[test]
    fn test_store_overwrites_same_question() {
        let mut cache = QueryCache::new();
        cache.store("q", "SELECT 1".to_string(), vec![]);
        cache.store("Q ", "SELECT 2".to_string(), vec![]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("q").unwrap().sql, "SELECT 2");
    }
}
