//! Intent Router - deterministic question shapes mapped to SQL templates
//!
//! Classification is a pure function of the question text (case aside). Rules
//! are evaluated in order and the first match wins, so overlapping trigger sets
//! always resolve to the earlier rule. The database is only used to verify
//! extracted player names.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Deterministic classification of a question's shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    None,
    /// "Who beat A, B and C in the same tournament?"
    SameTournamentMultiDefeat,
    /// "Ranking of A and B in the Wimbledon 2008 final?"
    RankingAtFinal,
    /// "Which tournament?" after a multi-defeat answer
    FollowupTourney,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::None => "none",
            Intent::SameTournamentMultiDefeat => "same_tournament_multi_defeat",
            Intent::RankingAtFinal => "ranking_at_final",
            Intent::FollowupTourney => "followup_tourney",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "beat" / "defeated" (EN + ES)
const DEFEAT_PHRASES: &[&str] = &[
    "le gano a",
    "le ganó a",
    "derroto a",
    "derrotó a",
    "beat",
    "defeated",
];

const SAME_TOURNAMENT_PHRASES: &[&str] = &["mismo torneo", "same tournament"];

/// Majors recognised by the final-ranking template, in canonical spelling
const MAJOR_TOURNAMENTS: &[&str] = &["Wimbledon", "Roland Garros", "US Open", "Australian Open"];

/// "Which tournament?" (EN + ES)
const FOLLOWUP_TOURNEY_PHRASES: &[&str] = &[
    "en que torneo",
    "en qué torneo",
    "which tournament",
    "what tournament",
];

/// Grouping fragment that marks a multi-defeat template result
pub const MULTI_DEFEAT_MARKER: &str = "HAVING COUNT(DISTINCT m.loser_id) = 3";

const MULTI_DEFEAT_PROJECTION: &str = "SELECT DISTINCT p.first_name, p.last_name";
const FOLLOWUP_CORE_PROJECTION: &str = "SELECT m.winner_id, m.tourney_id";
const FOLLOWUP_PROJECTION: &str = "SELECT DISTINCT m.tourney_name";

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());
static FULL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)\b").unwrap());

type Rule = fn(&str) -> bool;

/// Ordered classification rules over the lowercased question
const INTENT_RULES: &[(Rule, Intent)] = &[
    (is_multi_defeat_question, Intent::SameTournamentMultiDefeat),
    (is_final_ranking_question, Intent::RankingAtFinal),
];

fn is_multi_defeat_question(lower: &str) -> bool {
    DEFEAT_PHRASES.iter().any(|p| lower.contains(p))
        && SAME_TOURNAMENT_PHRASES.iter().any(|p| lower.contains(p))
}

fn is_final_ranking_question(lower: &str) -> bool {
    lower.contains("final") && YEAR.is_match(lower) && find_major(lower).is_some()
}

/// Classify a question; `Intent::None` when no rule matches
pub fn classify_intent(question: &str) -> Intent {
    let lower = question.to_lowercase();
    let intent = INTENT_RULES
        .iter()
        .find(|(rule, _)| rule(&lower))
        .map(|(_, intent)| *intent)
        .unwrap_or(Intent::None);
    debug!("Classified intent: {}", intent);
    intent
}

fn find_major(lower: &str) -> Option<&'static str> {
    MAJOR_TOURNAMENTS
        .iter()
        .find(|name| lower.contains(&name.to_lowercase()))
        .copied()
}

/// Every maximal run of two or more capitalised words, in order of appearance
pub fn extract_name_candidates(question: &str) -> Vec<String> {
    FULL_NAME
        .captures_iter(question)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// First and last token of a full name; intermediate tokens are ignored
fn split_name(full_name: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = full_name.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }
    Some((parts[0].to_string(), parts[parts.len() - 1].to_string()))
}

/// Source of truth for player existence
pub trait PlayerDirectory {
    /// Exact case-insensitive match on first and last name
    fn player_exists(&self, first: &str, last: &str) -> rusqlite::Result<bool>;
}

impl PlayerDirectory for Connection {
    fn player_exists(&self, first: &str, last: &str) -> rusqlite::Result<bool> {
        let found: Option<i64> = self
            .query_row(
                "SELECT player_id FROM players
                 WHERE lower(first_name) = lower(?1) AND lower(last_name) = lower(?2)",
                params![first, last],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn player_id_subquery(first: &str, last: &str) -> String {
    format!(
        "SELECT player_id FROM players
        WHERE lower(first_name)=lower('{}')
          AND lower(last_name)=lower('{}')",
        first, last
    )
}

/// Players who beat three named opponents within a single tournament.
/// `None` sends the turn to the external generator.
pub fn build_same_tournament_multi_defeat_query(
    question: &str,
    players: &dyn PlayerDirectory,
) -> Option<String> {
    let lower = question.to_lowercase();
    if !is_multi_defeat_question(&lower) {
        return None;
    }

    let candidates = extract_name_candidates(question);
    if candidates.is_empty() {
        return None;
    }

    let mut verified: Vec<(String, String)> = Vec::new();
    for full_name in &candidates {
        let Some((first, last)) = split_name(full_name) else {
            continue;
        };
        match players.player_exists(&first, &last) {
            Ok(true) => {
                if !verified.contains(&(first.clone(), last.clone())) {
                    verified.push((first, last));
                }
            }
            Ok(false) => debug!("Name candidate not in players table: {}", full_name),
            Err(e) => warn!("Player lookup failed for {}: {}", full_name, e),
        }
    }

    if verified.len() < 3 {
        debug!(
            "Multi-defeat template needs 3 verified players, found {}",
            verified.len()
        );
        return None;
    }

    let union_block = verified[..3]
        .iter()
        .map(|(first, last)| player_id_subquery(first, last))
        .collect::<Vec<_>>()
        .join("\nUNION\n");

    Some(format!(
        "{projection}
FROM matches m
JOIN players p ON p.player_id = m.winner_id
WHERE m.loser_id IN (
{union_block}
)
GROUP BY m.winner_id, m.tourney_id
{marker};",
        projection = MULTI_DEFEAT_PROJECTION,
        union_block = union_block,
        marker = MULTI_DEFEAT_MARKER,
    ))
}

fn rank_snapshot_subquery(first: &str, last: &str, alias: &str) -> String {
    format!(
        "    (
        SELECT r.rank
        FROM rankings r
        WHERE r.player_id = (
            {player}
        )
        AND r.ranking_date <= m.match_date
        ORDER BY r.ranking_date DESC
        LIMIT 1
    ) AS {alias}",
        player = player_id_subquery(first, last),
        alias = alias,
    )
}

/// Ranking snapshot of the first two named players at a major final
pub fn build_final_ranking_query(question: &str) -> Option<String> {
    let lower = question.to_lowercase();
    if !lower.contains("final") {
        return None;
    }

    let year = YEAR.find(question)?.as_str().to_string();
    let tourney = find_major(&lower)?;

    // The tournament itself can look like a full name ("Roland Garros")
    let players: Vec<(String, String)> = extract_name_candidates(question)
        .iter()
        .filter(|name| !name.eq_ignore_ascii_case(tourney))
        .filter_map(|name| split_name(name))
        .collect();
    if players.len() < 2 {
        return None;
    }

    let (p1_first, p1_last) = &players[0];
    let (p2_first, p2_last) = &players[1];

    Some(format!(
        "SELECT
{p1},
{p2}
FROM matches m
WHERE m.tourney_name = '{tourney}'
  AND m.round = 'F'
  AND strftime('%Y', m.match_date) = '{year}'
LIMIT 1;",
        p1 = rank_snapshot_subquery(p1_first, p1_last, "player1_rank"),
        p2 = rank_snapshot_subquery(p2_first, p2_last, "player2_rank"),
        tourney = tourney,
        year = year,
    ))
}

/// Template for a classified intent, `None` when preconditions fail
pub fn build_template(intent: Intent, question: &str, players: &dyn PlayerDirectory) -> Option<String> {
    match intent {
        Intent::SameTournamentMultiDefeat => {
            build_same_tournament_multi_defeat_query(question, players)
        }
        Intent::RankingAtFinal => build_final_ranking_query(question),
        Intent::None | Intent::FollowupTourney => None,
    }
}

/// "Which tournament?" right after a multi-defeat template answer
pub fn is_followup_tourney_question(question: &str, last_sql: Option<&str>) -> bool {
    let Some(last_sql) = last_sql.filter(|s| !s.trim().is_empty()) else {
        return false;
    };

    let q = question.trim().to_lowercase();
    if !FOLLOWUP_TOURNEY_PHRASES.iter().any(|p| q.contains(p)) {
        return false;
    }

    last_sql.contains(MULTI_DEFEAT_MARKER)
}

/// Join the previous multi-defeat result back to matches to recover the
/// tournament name(s). A previous follow-up query is returned unchanged.
pub fn build_followup_tourney_query(last_sql: &str) -> String {
    let trimmed = last_sql.trim().trim_end_matches(';').trim_end();
    if trimmed.starts_with(FOLLOWUP_PROJECTION) {
        return trimmed.to_string();
    }

    let core_subquery = trimmed.replacen(MULTI_DEFEAT_PROJECTION, FOLLOWUP_CORE_PROJECTION, 1);

    format!(
        "{projection}
FROM matches m
JOIN (
{core}
) sub
ON sub.winner_id = m.winner_id
AND sub.tourney_id = m.tourney_id",
        projection = FOLLOWUP_PROJECTION,
        core = core_subquery,
    )
}
