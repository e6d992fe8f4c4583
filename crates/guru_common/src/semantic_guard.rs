//! Semantic Guard - post-generation audit of SQL against the question wording
//!
//! Validates, and autofixes only known-safe rewrites:
//! - surface literal normalization (never injects a new surface filter)
//! - round filter removal on surface win/loss questions, limited to the
//!   top-level WHERE clause and only when the question names no round
//!
//! Anything else that contradicts the question is rejected so the turn fails
//! instead of silently running semantically wrong SQL.

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Canonical surface value (as stored in matches.surface) and its synonyms
const SURFACE_SYNONYMS: &[(&str, &[&str])] = &[
    ("Clay", &["tierra batida", "polvo de ladrillo", "arcilla", "clay", "tierra"]),
    ("Grass", &["hierba", "césped", "cesped", "grass"]),
    ("Hard", &["cancha dura", "cemento", "dura", "hard"]),
    ("Carpet", &["carpet", "moqueta"]),
];

/// Question wording that legitimately asks for finals
const FINAL_WORDS: &[&str] = &[
    "final",
    "title",
    "títul",
    "titul",
    "champion",
    "campeón",
    "campeon",
    "grand slam",
    "masters 1000",
    "trophy",
    "trofeo",
    "torneo",
    "campeonato",
];

/// Question wording about winning a whole tournament
const TOURNAMENT_WORDS: &[&str] = &["tournament"];

/// Question wording that asks to leave finals out
const EXCLUSION_WORDS: &[&str] = &[
    "exclud",
    "except",
    "without",
    "not counting",
    "other than",
    "non-final",
    "excluy",
    "excepto",
    "sin contar",
    "sin final",
    "salvo",
];

/// Win/loss wording
const WIN_LOSS_WORDS: &[&str] = &[
    "win", "won", "wins", "victor", "lost", "lose", "loss", "defeat", "gan", "perd", "derrot",
];

static SURFACE_PATTERNS: Lazy<Vec<(&'static str, Vec<Regex>)>> = Lazy::new(|| {
    SURFACE_SYNONYMS
        .iter()
        .map(|(canonical, synonyms)| {
            let patterns = synonyms
                .iter()
                .map(|s| Regex::new(&format!(r"\b{}\b", regex::escape(s))).unwrap())
                .collect();
            (*canonical, patterns)
        })
        .collect()
});

static LOWER_SURFACE_CMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)lower\s*\(\s*((?:\w+\.)?surface)\s*\)\s*=\s*lower\s*\(\s*'[^']+'\s*\)")
        .unwrap()
});
static PLAIN_SURFACE_CMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b((?:\w+\.)?surface)\s*=\s*'[^']+'").unwrap());

const ROUND_CMP: &str = r"(?:\w+\.)?round\s*(?:=|!=|<>)\s*'[^']*'";

static ROUND_FILTER_AND_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\s+AND\s+{}", ROUND_CMP)).unwrap());
static ROUND_FILTER_AND_BEFORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\b{}\s+AND\s+", ROUND_CMP)).unwrap());
static ROUND_FILTER_SOLE_WHERE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\s+WHERE\s+{}", ROUND_CMP)).unwrap());
static ANY_ROUND_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\b{}", ROUND_CMP)).unwrap());

/// Question wording that names a specific round
static ROUND_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:first|second|third|fourth|opening|1st|2nd|3rd|4th)[- ]round\b|\bround of \d+\b|\br(?:128|64|32|16)\b|\b(?:qf|sf|rr)\b|quarter[- ]?final|semi[- ]?final|round[- ]robin|\b(?:primera|segunda|tercera|cuarta) ronda\b|\bcuartos\b|\boctavos\b|\bdieciseisavos\b",
    )
    .unwrap()
});

/// Clause keywords that can follow a WHERE clause at the same nesting level
static CLAUSE_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:where|group\s+by|order\s+by|having|limit|union|intersect|except)\b").unwrap()
});

static FINALS_EXCLUDED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:\w+\.)?round\s*(?:!=|<>)\s*'F'|\b(?:\w+\.)?round\s+NOT\s+IN\s*\([^)]*'F'")
        .unwrap()
});
static FINALS_REQUIRED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:\w+\.)?round\s*=\s*'F'|\b(?:\w+\.)?round\s+IN\s*\(\s*'F'\s*\)").unwrap()
});

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Canonical surface when exactly one surface is mentioned
pub fn detect_surface(question: &str) -> Option<&'static str> {
    let q = question.to_lowercase();
    let detected: Vec<&'static str> = SURFACE_PATTERNS
        .iter()
        .filter(|(_, patterns)| patterns.iter().any(|p| p.is_match(&q)))
        .map(|(canonical, _)| *canonical)
        .collect();

    match detected.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

fn mentions_finals(q: &str) -> bool {
    contains_any(q, FINAL_WORDS) || (contains_any(q, TOURNAMENT_WORDS) && contains_any(q, WIN_LOSS_WORDS))
}

fn asks_for_exclusion(q: &str) -> bool {
    contains_any(q, EXCLUSION_WORDS)
}

fn is_surface_win_loss_question(q: &str) -> bool {
    detect_surface(q).is_some() && contains_any(q, WIN_LOSS_WORDS) && !mentions_finals(q)
}

fn names_round(q: &str) -> bool {
    ROUND_WORDS.is_match(q)
}

/// Parenthesis depth at byte offset `pos`; `None` inside a string literal
fn depth_at(sql: &str, pos: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_literal = false;
    for (i, c) in sql.char_indices() {
        if i >= pos {
            break;
        }
        match c {
            '\'' => in_literal = !in_literal,
            '(' if !in_literal => depth += 1,
            ')' if !in_literal => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    (!in_literal).then_some(depth)
}

/// Byte range of the outermost WHERE clause, starting at the keyword
fn top_level_where(sql: &str) -> Option<(usize, usize)> {
    let mut keywords = CLAUSE_KEYWORD
        .find_iter(sql)
        .filter(|m| depth_at(sql, m.start()) == Some(0));
    let start = keywords
        .by_ref()
        .find(|m| m.as_str().eq_ignore_ascii_case("where"))?
        .start();
    let end = keywords.next().map_or(sql.len(), |m| m.start());
    Some((start, end))
}

/// Rewrite existing surface comparisons to the canonical value
pub fn normalize_surface_literals(question: &str, sql: &str) -> String {
    let Some(canonical) = detect_surface(question) else {
        return sql.to_string();
    };

    let rewritten = LOWER_SURFACE_CMP.replace_all(sql, |caps: &regex::Captures| {
        format!("lower({}) = lower('{}')", &caps[1], canonical)
    });
    let rewritten = PLAIN_SURFACE_CMP.replace_all(&rewritten, |caps: &regex::Captures| {
        format!("{} = '{}'", &caps[1], canonical)
    });
    rewritten.into_owned()
}

/// Drop round comparisons from the top-level WHERE clause.
///
/// Fails when any round comparison sits outside it, e.g. in a JOIN ... ON
/// condition or a subquery.
pub fn strip_round_filters(sql: &str) -> Result<String, ValidationError> {
    let misplaced = || {
        ValidationError::Semantic(
            "round filter outside the top-level WHERE clause cannot be removed safely".to_string(),
        )
    };

    let (start, end) = top_level_where(sql).ok_or_else(misplaced)?;
    let outside = ANY_ROUND_FILTER.find_iter(sql).any(|m| {
        m.start() < start || m.start() >= end || depth_at(sql, m.start()) != Some(0)
    });
    if outside {
        return Err(misplaced());
    }

    let clause_start = sql[..start].trim_end().len();
    let clause = &sql[clause_start..end];
    let s = ROUND_FILTER_AND_AFTER.replace_all(clause, "");
    let s = ROUND_FILTER_AND_BEFORE.replace_all(&s, "");
    let s = ROUND_FILTER_SOLE_WHERE.replace_all(&s, "");
    Ok(format!("{}{}{}", &sql[..clause_start], s, &sql[end..]))
}

type Autofix = fn(&str, &str) -> Result<String, ValidationError>;
type Check = fn(&str, &str) -> Result<(), ValidationError>;

/// Known-safe rewrites, applied in order
const AUTOFIXES: &[(&str, Autofix)] = &[
    ("surface_literal", autofix_surface_literal),
    ("surface_round_filter", autofix_surface_round_filter),
];

/// Rejections, evaluated in order; the first violation wins
const CHECKS: &[(&str, Check)] = &[
    ("unrequested_final_exclusion", check_final_exclusion),
    ("unrequested_finals_filter", check_finals_filter),
];

fn autofix_surface_literal(question: &str, sql: &str) -> Result<String, ValidationError> {
    Ok(normalize_surface_literals(question, sql))
}

fn autofix_surface_round_filter(question: &str, sql: &str) -> Result<String, ValidationError> {
    let q = question.to_lowercase();
    if !is_surface_win_loss_question(&q) || !ANY_ROUND_FILTER.is_match(sql) || names_round(&q) {
        return Ok(sql.to_string());
    }
    debug!("Removing round filter from surface win/loss query");
    strip_round_filters(sql)
}

fn check_final_exclusion(question: &str, sql: &str) -> Result<(), ValidationError> {
    let q = question.to_lowercase();
    if FINALS_EXCLUDED.is_match(sql) && !asks_for_exclusion(&q) {
        return Err(ValidationError::Semantic(
            "SQL excludes finals but the question does not ask for an exclusion".to_string(),
        ));
    }
    Ok(())
}

fn check_finals_filter(question: &str, sql: &str) -> Result<(), ValidationError> {
    let q = question.to_lowercase();
    if FINALS_REQUIRED.is_match(sql) && !mentions_finals(&q) {
        return Err(ValidationError::Semantic(
            "SQL restricts to finals but the question mentions neither finals nor titles"
                .to_string(),
        ));
    }
    Ok(())
}

/// Strip whitespace and a single trailing terminator
fn hygiene(sql: &str) -> String {
    let trimmed = sql.trim();
    trimmed
        .strip_suffix(';')
        .unwrap_or(trimmed)
        .trim_end()
        .to_string()
}

/// Audit generated SQL against the question, applying safe autofixes
pub fn validate_and_autofix(question: &str, sql: &str) -> Result<String, ValidationError> {
    let mut corrected = hygiene(sql);
    if corrected.is_empty() {
        return Ok(corrected);
    }

    for (name, fix) in AUTOFIXES {
        let next = fix(question, &corrected).map_err(|e| {
            debug!("Semantic autofix refused: {}", name);
            e
        })?;
        if next != corrected {
            debug!("Semantic autofix applied: {}", name);
            corrected = next;
        }
    }

    for (name, check) in CHECKS {
        if let Err(e) = check(question, &corrected) {
            debug!("Semantic check failed: {}", name);
            return Err(e);
        }
    }

    Ok(corrected)
}
