//! End-to-end pipeline tests
//!
//! Drives the Engine against a small seeded in-memory database with a fake
//! generator that counts its invocations, so every stage (cache, ambiguity,
//! follow-up, templates, guard, structural policy, executor) runs for real.
//!
//! Run with: cargo test --test engine_pipeline

use guru_common::db::init_schema;
use guru_common::engine::{Engine, Outcome};
use guru_common::error::GenerationError;
use guru_common::formatter::format_result;
use guru_common::intent_router::{Intent, MULTI_DEFEAT_MARKER};
use guru_common::llm_generator::{Generation, SqlGenerator};
use guru_common::rows::CellValue;
use guru_common::sql_executor::SqlExecutor;
use guru_common::sql_transformer::{AntiJoinPolicy, PassthroughTransformer, StructuralTransformer};
use rusqlite::Connection;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

const SEED_SQL: &str = "
INSERT INTO players (player_id, first_name, last_name, gender) VALUES
    (1, 'Roger', 'Federer', 'ATP'),
    (2, 'Rafael', 'Nadal', 'ATP'),
    (3, 'Novak', 'Djokovic', 'ATP'),
    (4, 'Andy', 'Murray', 'ATP');

INSERT INTO rankings (player_id, ranking_date, rank, points, gender) VALUES
    (1, '2008-01-07', 1, 7000, 'ATP'),
    (2, '2008-01-07', 2, 5000, 'ATP'),
    (1, '2008-06-30', 1, 6600, 'ATP'),
    (2, '2008-06-30', 2, 6200, 'ATP'),
    (1, '2008-08-18', 2, 6300, 'ATP'),
    (2, '2008-08-18', 1, 6700, 'ATP');

INSERT INTO matches (match_id, tour, tourney_id, tourney_name, surface, tourney_level,
                     match_date, round, best_of, winner_id, loser_id) VALUES
    (1, 'ATP', '2008-540', 'Wimbledon', 'Grass', 'G', '2008-07-06', 'F', 5, 2, 1),
    (2, 'ATP', '2012-0096', 'London Olympics', 'Grass', 'O', '2012-08-01', 'QF', 3, 4, 3),
    (3, 'ATP', '2012-0096', 'London Olympics', 'Grass', 'O', '2012-08-03', 'SF', 3, 4, 2),
    (4, 'ATP', '2012-0096', 'London Olympics', 'Grass', 'O', '2012-08-05', 'F', 3, 4, 1),
    (5, 'ATP', '2013-540', 'Wimbledon', 'Grass', 'G', '2013-07-07', 'F', 5, 4, 3);
";

const MULTI_DEFEAT_QUESTION: &str =
    "Who beat Roger Federer, Rafael Nadal and Novak Djokovic in the same tournament?";

/// Generator returning a fixed statement and counting its calls
struct CountingGenerator {
    sql: String,
    calls: Rc<Cell<usize>>,
}

impl SqlGenerator for CountingGenerator {
    fn generate(&self, _question: &str) -> Result<Generation, GenerationError> {
        self.calls.set(self.calls.get() + 1);
        Ok(Generation {
            sql: self.sql.clone(),
            explanation: "SQL generated from natural language question.".to_string(),
            latency: Duration::from_millis(250),
        })
    }
}

struct FailingGenerator {
    calls: Rc<Cell<usize>>,
}

impl SqlGenerator for FailingGenerator {
    fn generate(&self, _question: &str) -> Result<Generation, GenerationError> {
        self.calls.set(self.calls.get() + 1);
        Err(GenerationError::Http("HTTP 503 from SQL generator".to_string()))
    }
}

fn seeded_executor() -> SqlExecutor {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn.execute_batch(SEED_SQL).unwrap();
    SqlExecutor::new(conn)
}

fn engine_generating(sql: &str) -> (Engine, Rc<Cell<usize>>) {
    engine_with_policy(sql, Box::new(AntiJoinPolicy))
}

fn engine_with_policy(
    sql: &str,
    transformer: Box<dyn StructuralTransformer>,
) -> (Engine, Rc<Cell<usize>>) {
    let calls = Rc::new(Cell::new(0));
    let generator = CountingGenerator {
        sql: sql.to_string(),
        calls: Rc::clone(&calls),
    };
    let engine = Engine::new(seeded_executor(), Box::new(generator), transformer);
    (engine, calls)
}

fn engine_failing_generation() -> (Engine, Rc<Cell<usize>>) {
    let calls = Rc::new(Cell::new(0));
    let generator = FailingGenerator {
        calls: Rc::clone(&calls),
    };
    let engine = Engine::new(seeded_executor(), Box::new(generator), Box::new(AntiJoinPolicy));
    (engine, calls)
}

#[test]
fn test_second_identical_question_is_cached() {
    let (mut engine, calls) =
        engine_generating("SELECT COUNT(*) FROM matches m WHERE m.tour = 'ATP';");

    let first = engine.process("How many ATP matches are there?");
    assert_eq!(first.outcome, Outcome::Success);
    assert_eq!(first.results, Some(vec![vec![CellValue::Integer(5)]]));
    assert_eq!(first.llm_generation_time, Some(0.25));
    assert!(!first.cached);

    let second = engine.process("how many ATP matches are there?  ");
    assert_eq!(second.outcome, Outcome::CacheHit);
    assert!(second.cached);
    assert_eq!(second.sql, first.sql);
    assert_eq!(second.results, first.results);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_subjective_question_needs_clarification() {
    let (mut engine, calls) = engine_generating("SELECT 1");

    let res = engine.process("Who was the greatest player ever?");
    assert_eq!(res.outcome, Outcome::NeedsClarification);
    assert!(res.needs_clarification);
    assert!(res.sql.is_none());
    assert!(res.results.is_none());
    assert_eq!(calls.get(), 0);
    assert!(engine.cache().is_empty());
    assert!(engine.context().last_sql().is_none());
}

#[test]
fn test_multi_defeat_template_then_followup() {
    let (mut engine, calls) = engine_generating("SELECT 1");

    let res = engine.process(MULTI_DEFEAT_QUESTION);
    assert_eq!(res.outcome, Outcome::Success);
    assert!(res.sql.as_deref().unwrap().contains(MULTI_DEFEAT_MARKER));
    assert_eq!(
        res.results,
        Some(vec![vec![CellValue::from("Andy"), CellValue::from("Murray")]])
    );
    assert_eq!(res.llm_generation_time, None);
    assert_eq!(engine.context().last_intent, Intent::SameTournamentMultiDefeat);
    assert_eq!(format_result(&res), "Andy Murray");

    let followup = engine.process("Which tournament?");
    assert_eq!(followup.outcome, Outcome::FollowupResolved);
    assert!(followup.followup);
    assert_eq!(
        followup.results,
        Some(vec![vec![CellValue::from("London Olympics")]])
    );
    assert_eq!(engine.context().last_intent, Intent::FollowupTourney);
    assert_eq!(calls.get(), 0);

    // Same question again is served from the cache
    let again = engine.process("which tournament?");
    assert_eq!(again.outcome, Outcome::CacheHit);
    assert!(again.cached);
    assert_eq!(again.sql, followup.sql);
    assert_eq!(again.results, followup.results);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_failed_followup_leaves_context_and_cache() {
    let (mut engine, calls) = engine_generating("SELECT 1");

    let res = engine.process(MULTI_DEFEAT_QUESTION);
    assert_eq!(res.outcome, Outcome::Success);
    let last_sql = engine.context().last_sql().map(str::to_string);
    let cached = engine.cache().len();

    // Schema is already cached, so the join-back query fails inside SQLite
    engine
        .executor()
        .connection()
        .execute_batch("DROP TABLE matches")
        .unwrap();

    let followup = engine.process("Which tournament?");
    assert_eq!(followup.outcome, Outcome::FollowupFailed);
    assert!(followup.followup);
    assert!(followup.error.is_some());
    assert!(followup.results.is_none());

    assert_eq!(engine.context().last_sql().map(str::to_string), last_sql);
    assert_eq!(engine.context().last_intent, Intent::SameTournamentMultiDefeat);
    assert_eq!(engine.cache().len(), cached);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_multi_defeat_with_unknown_player_falls_back_to_generator() {
    let (mut engine, calls) = engine_generating(
        "SELECT p.first_name, p.last_name FROM players p WHERE p.player_id = 4",
    );

    let res = engine.process(
        "Who beat Roger Federer, Rafael Nadal and Pete Sampras in the same tournament?",
    );
    assert_eq!(res.outcome, Outcome::Success);
    assert_eq!(calls.get(), 1);
    assert!(!res.sql.as_deref().unwrap().contains(MULTI_DEFEAT_MARKER));

    // Not a multi-defeat result, so "which tournament" is not a follow-up
    engine.process("Which tournament?");
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_ranking_at_final_template() {
    let (mut engine, calls) = engine_generating("SELECT 1");

    let res = engine.process(
        "What was the ranking of Roger Federer and Rafael Nadal in the Wimbledon 2008 final?",
    );
    assert_eq!(res.outcome, Outcome::Success);
    let sql = res.sql.as_deref().unwrap();
    assert!(sql.contains("m.tourney_name = 'Wimbledon'"));
    assert!(sql.contains("m.round = 'F'"));
    assert!(sql.contains("'2008'"));
    assert_eq!(
        res.results,
        Some(vec![vec![CellValue::Integer(1), CellValue::Integer(2)]])
    );
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_generation_failure_is_terminal() {
    let (mut engine, calls) = engine_failing_generation();

    let res = engine.process("How many aces did Federer serve in 2006?");
    assert_eq!(res.outcome, Outcome::GenerationFailed);
    assert_eq!(res.error_code, Some("generation"));
    assert!(res.error.as_deref().unwrap().contains("503"));
    assert!(res.sql.is_none());
    assert!(res.generated_sql.is_none());
    assert_eq!(calls.get(), 1);
    assert!(engine.cache().is_empty());
}

#[test]
fn test_failed_turn_leaves_context_untouched() {
    let (mut engine, _calls) = engine_failing_generation();

    engine.process(MULTI_DEFEAT_QUESTION);
    let before = engine.context().clone();

    let res = engine.process("How many aces did Federer serve in 2006?");
    assert!(res.error.is_some());
    assert_eq!(engine.context(), &before);
}

#[test]
fn test_unrequested_finals_filter_is_rejected() {
    let sql = "SELECT COUNT(*) FROM matches m WHERE m.round = 'F'";
    let (mut engine, _calls) = engine_generating(sql);

    let res = engine.process("How many matches were played in 2012?");
    assert_eq!(res.outcome, Outcome::ValidationOrTransformFailed);
    assert_eq!(res.error_code, Some("validation"));
    assert_eq!(res.generated_sql.as_deref(), Some(sql));
    assert!(res.results.is_none());
    assert!(engine.cache().is_empty());
}

#[test]
fn test_round_filter_in_anti_join_fails_turn() {
    let sql = "SELECT DISTINCT p.first_name, p.last_name FROM matches w \
               JOIN players p ON p.player_id = w.winner_id \
               LEFT JOIN matches m ON m.winner_id = w.winner_id \
               AND m.tourney_name = 'Wimbledon' AND m.round = 'F' \
               WHERE w.surface = 'Grass' AND m.match_id IS NULL";
    let (mut engine, calls) = engine_generating(sql);

    let res = engine.process("Which players won on grass but never won Wimbledon?");
    assert_eq!(res.outcome, Outcome::ValidationOrTransformFailed);
    assert_eq!(res.error_code, Some("validation"));
    assert_eq!(res.generated_sql.as_deref(), Some(sql));
    assert!(res.results.is_none());
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_surface_literal_autofixed_before_execution() {
    let (mut engine, _calls) = engine_generating(
        "SELECT COUNT(*) FROM matches m WHERE m.surface = 'Hard' AND m.round = 'F';",
    );

    let res = engine.process("¿Cuántas finales se jugaron en hierba?");
    assert_eq!(res.outcome, Outcome::Success);
    assert_eq!(
        res.sql.as_deref(),
        Some("SELECT COUNT(*) FROM matches m WHERE m.surface = 'Grass' AND m.round = 'F'")
    );
    assert_eq!(res.results, Some(vec![vec![CellValue::Integer(3)]]));
}

#[test]
fn test_exists_rejected_by_structural_policy() {
    let sql = "SELECT COUNT(*) FROM players p \
               WHERE NOT EXISTS (SELECT 1 FROM matches m WHERE m.winner_id = p.player_id)";
    let (mut engine, _calls) = engine_generating(sql);

    let res = engine.process("How many players never won a match?");
    assert_eq!(res.outcome, Outcome::ValidationOrTransformFailed);
    assert_eq!(res.error_code, Some("structural_policy"));
    assert_eq!(res.generated_sql.as_deref(), Some(sql));
    assert!(res.sql.is_some());
}

#[test]
fn test_passthrough_policy_runs_exists() {
    let sql = "SELECT COUNT(*) FROM players p \
               WHERE NOT EXISTS (SELECT 1 FROM matches m WHERE m.winner_id = p.player_id)";
    let (mut engine, _calls) = engine_with_policy(sql, Box::new(PassthroughTransformer));

    let res = engine.process("How many players never won a match?");
    assert_eq!(res.outcome, Outcome::Success);
    // Federer and Djokovic never won in the seed data
    assert_eq!(res.results, Some(vec![vec![CellValue::Integer(2)]]));
}

#[test]
fn test_unsafe_and_unknown_sql_fail_at_execution() {
    let (mut engine, _calls) = engine_generating("DELETE FROM players");
    let res = engine.process("Remove everyone");
    assert_eq!(res.outcome, Outcome::ExecutionFailed);
    assert_eq!(res.error_code, Some("validation"));
    assert_eq!(res.error.as_deref(), Some("Only SELECT queries are allowed."));

    let (mut engine, _calls) = engine_generating("SELECT m.nope FROM matches m");
    let res = engine.process("Something about nope");
    assert_eq!(res.outcome, Outcome::ExecutionFailed);
    assert!(res.error.as_deref().unwrap().contains("nope"));
}

#[test]
fn test_runaway_query_times_out_without_rows() {
    let calls = Rc::new(Cell::new(0));
    let generator = CountingGenerator {
        sql: "SELECT (WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
              SELECT COUNT(*) FROM c)"
            .to_string(),
        calls: Rc::clone(&calls),
    };
    let executor = seeded_executor().with_progress_interval(1_000);
    let mut engine = Engine::new(executor, Box::new(generator), Box::new(AntiJoinPolicy))
        .with_timeout(Duration::from_millis(50));

    let res = engine.process("Count forever");
    assert_eq!(res.outcome, Outcome::ExecutionFailed);
    assert_eq!(res.error_code, Some("timeout"));
    assert!(res.error.as_deref().unwrap().contains("interrupted"));
    assert!(res.results.is_none());
    assert!(engine.cache().is_empty());
}
