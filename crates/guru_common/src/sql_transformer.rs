//! Structural Transformer - SQL shape policy applied after the semantic guard
//!
//! Pluggable stage. `AntiJoinPolicy` enforces the shape rules the external
//! generator is instructed to follow; it only rejects, it never rewrites.
//! Like the schema check, the scan is lexical: aliases are found with
//! regexes, not a grammar.

use crate::error::StructuralError;
use crate::schema::strip_literals;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Rewrite stage between the semantic guard and execution
pub trait StructuralTransformer: Send + Sync {
    fn rewrite(&self, sql: &str) -> Result<String, StructuralError>;
}

/// Identity transform
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTransformer;

impl StructuralTransformer for PassthroughTransformer {
    fn rewrite(&self, sql: &str) -> Result<String, StructuralError> {
        Ok(sql.to_string())
    }
}

/// Which structural transformer the engine uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StructuralPolicy {
    #[default]
    AntiJoin,
    Passthrough,
}

impl StructuralPolicy {
    pub fn build(self) -> Box<dyn StructuralTransformer> {
        match self {
            StructuralPolicy::AntiJoin => Box::new(AntiJoinPolicy),
            StructuralPolicy::Passthrough => Box::new(PassthroughTransformer),
        }
    }
}

impl FromStr for StructuralPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anti_join" | "anti-join" | "strict" => Ok(StructuralPolicy::AntiJoin),
            "passthrough" | "identity" | "off" => Ok(StructuralPolicy::Passthrough),
            other => Err(format!(
                "Invalid structural policy: '{}'. Valid values: anti_join, passthrough",
                other
            )),
        }
    }
}

const SQL_KEYWORDS: &[&str] = &[
    "where", "on", "join", "left", "right", "inner", "outer", "cross", "group", "order", "limit",
    "having", "union", "select", "as", "using", "natural", "full", "from", "and", "or", "not",
    "is", "in",
];

static EXISTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bexists\b").unwrap());
static TABLE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:from|join)\s+([A-Za-z_]\w*)(?:\s+(?:as\s+)?([A-Za-z_]\w*))?").unwrap()
});
static DERIVED_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\)\s*(?:as\s+)?([A-Za-z_]\w*)").unwrap());
static ON_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bon\b").unwrap());
static CLAUSE_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:left|right|inner|cross|join|where|group|order|limit|having|union|select)\b")
        .unwrap()
});
static QUALIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z_]\w*)\.[A-Za-z_]\w*").unwrap());
static RANKINGS_JOIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bjoin\s+rankings\s+(?:as\s+)?([A-Za-z_]\w*)").unwrap());

/// Validation-only port of the generator's SQL shape rules:
/// 1. no `EXISTS` / `NOT EXISTS` (anti-joins use `LEFT JOIN ... IS NULL`)
/// 2. an `ON` clause may only reference aliases declared before it
/// 3. rank-1 history comes from a `SELECT DISTINCT player_id` subquery,
///    not a direct `JOIN rankings` filtered on `rank = 1`
#[derive(Debug, Default, Clone, Copy)]
pub struct AntiJoinPolicy;

type PolicyRule = fn(&str) -> Result<(), StructuralError>;

const POLICY_RULES: &[PolicyRule] = &[
    AntiJoinPolicy::check_no_exists,
    AntiJoinPolicy::check_join_order,
    AntiJoinPolicy::check_rank_one_join,
];

impl AntiJoinPolicy {
    fn check_no_exists(sql: &str) -> Result<(), StructuralError> {
        if EXISTS.is_match(sql) {
            return Err(StructuralError::Policy(
                "EXISTS / NOT EXISTS is not allowed; use LEFT JOIN ... IS NULL".to_string(),
            ));
        }
        Ok(())
    }

    /// Earliest declaration offset per alias (and table name)
    fn declarations(sql: &str) -> HashMap<String, usize> {
        let mut declared: HashMap<String, usize> = HashMap::new();
        let mut record = |name: &str, at: usize| {
            let key = name.to_lowercase();
            if SQL_KEYWORDS.contains(&key.as_str()) {
                return;
            }
            declared.entry(key).or_insert(at);
        };

        for caps in TABLE_DECL.captures_iter(sql) {
            let at = caps.get(0).map(|m| m.start()).unwrap_or(0);
            record(&caps[1], at);
            if let Some(alias) = caps.get(2) {
                record(alias.as_str(), at);
            }
        }
        for caps in DERIVED_DECL.captures_iter(sql) {
            let at = caps.get(0).map(|m| m.start()).unwrap_or(0);
            record(&caps[1], at);
        }
        declared
    }

    fn check_join_order(sql: &str) -> Result<(), StructuralError> {
        let declared = Self::declarations(sql);

        for on in ON_CLAUSE.find_iter(sql) {
            let rest = &sql[on.end()..];
            let clause = match CLAUSE_END.find(rest) {
                Some(end) => &rest[..end.start()],
                None => rest,
            };

            for caps in QUALIFIER.captures_iter(clause) {
                let alias = caps[1].to_lowercase();
                match declared.get(&alias) {
                    Some(at) if *at < on.start() => {}
                    _ => {
                        return Err(StructuralError::Policy(format!(
                            "ON clause references '{}' before it is declared",
                            &caps[1]
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_rank_one_join(sql: &str) -> Result<(), StructuralError> {
        for caps in RANKINGS_JOIN.captures_iter(sql) {
            let alias = regex::escape(&caps[1]);
            let rank_one = Regex::new(&format!(r"(?i)\b{}\.rank\s*=\s*1\b", alias))
                .map_err(|e| StructuralError::Policy(e.to_string()))?;
            let snapshot = Regex::new(&format!(r"(?i)\b{}\.ranking_date\b", alias))
                .map_err(|e| StructuralError::Policy(e.to_string()))?;

            if rank_one.is_match(sql) && !snapshot.is_match(sql) {
                return Err(StructuralError::Policy(
                    "rank = 1 history must use a SELECT DISTINCT player_id subquery on rankings"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl StructuralTransformer for AntiJoinPolicy {
    fn rewrite(&self, sql: &str) -> Result<String, StructuralError> {
        let scanned = strip_literals(sql);
        for rule in POLICY_RULES {
            rule(&scanned)?;
        }
        Ok(sql.to_string())
    }
}
