//! Ambiguity classifier - flags subjective or under-scoped questions
//!
//! Two independent triggers, evaluated in order:
//! 1. a subjective superlative ("best player", "greatest", ...)
//! 2. a record / most-wins phrase with no scope (tour, Grand Slam, Masters, a major)

/// Subjective superlatives (EN + ES)
pub const SUBJECTIVE_PHRASES: &[&str] = &[
    "best player",
    "most impressive",
    "strongest era",
    "most dominant",
    "greatest",
    "strongest generation",
    "best era",
    "biggest upset",
    "most impressive career",
    "who was better",
    "who was more dominant",
    "mejor jugador",
    "más dominante",
    "mas dominante",
    "más grande de la historia",
    "mas grande de la historia",
    "quién fue mejor",
    "quien fue mejor",
];

/// Record / most-wins phrases that need a scope
pub const RECORD_PHRASES: &[&str] = &[
    "record",
    "récord",
    "most wins",
    "most matches",
    "most victories",
    "all time leader",
    "all-time leader",
    "record of most",
    "record de mas",
    "record de más",
    "mas partidos ganados",
    "más partidos ganados",
];

/// Scope phrases that make a record question answerable
pub const SCOPE_PHRASES: &[&str] = &[
    "grand slam",
    "masters",
    "masters 1000",
    "atp",
    "wta",
    "challenger",
    "futures",
    "roland garros",
    "wimbledon",
    "us open",
    "australian open",
];

type Trigger = fn(&str) -> bool;

/// Ordered triggers; any single one is sufficient
const TRIGGERS: &[(&str, Trigger)] = &[
    ("subjective_superlative", has_subjective_phrase),
    ("unscoped_record", is_unscoped_record),
];

fn has_subjective_phrase(q: &str) -> bool {
    SUBJECTIVE_PHRASES.iter().any(|p| q.contains(p))
}

fn is_unscoped_record(q: &str) -> bool {
    RECORD_PHRASES.iter().any(|p| q.contains(p)) && !SCOPE_PHRASES.iter().any(|s| q.contains(s))
}

/// Name of the first trigger that fires, if any
pub fn ambiguity_reason(question: &str) -> Option<&'static str> {
    let q = question.trim().to_lowercase();
    TRIGGERS
        .iter()
        .find(|(_, trigger)| trigger(&q))
        .map(|(name, _)| *name)
}

pub fn is_question_ambiguous(question: &str) -> bool {
    ambiguity_reason(question).is_some()
}
