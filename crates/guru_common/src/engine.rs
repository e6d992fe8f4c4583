//! Engine - one question in, one result envelope out
//!
//! Stage order (first applicable wins):
//! cache -> ambiguity -> follow-up -> template -> generator ->
//! semantic guard -> structural transformer -> executor -> context/cache.
//!
//! Nothing past `process` ever returns an error: every failure becomes a
//! terminal `EngineResult` with `error` set.

use crate::ambiguity::ambiguity_reason;
use crate::cache::QueryCache;
use crate::config::GuruConfig;
use crate::context::ConversationContext;
use crate::db::open_database;
use crate::error::{ExecutionError, GuruError};
use crate::intent_router::{
    build_followup_tourney_query, build_template, classify_intent, is_followup_tourney_question,
    Intent,
};
use crate::llm_generator::{DisabledGenerator, HttpSqlGenerator, SqlGenerator};
use crate::rows::Row;
use crate::semantic_guard::validate_and_autofix;
use crate::sql_executor::SqlExecutor;
use crate::sql_transformer::StructuralTransformer;
use anyhow::Result;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

pub const CLARIFICATION_MESSAGE: &str = "Ambiguous question: please clarify scope or metric.";

/// Terminal state of one `process` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    CacheHit,
    NeedsClarification,
    FollowupResolved,
    FollowupFailed,
    GenerationFailed,
    ValidationOrTransformFailed,
    ExecutionFailed,
    Success,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::CacheHit => "cache_hit",
            Outcome::NeedsClarification => "needs_clarification",
            Outcome::FollowupResolved => "followup_resolved",
            Outcome::FollowupFailed => "followup_failed",
            Outcome::GenerationFailed => "generation_failed",
            Outcome::ValidationOrTransformFailed => "validation_or_transform_failed",
            Outcome::ExecutionFailed => "execution_failed",
            Outcome::Success => "success",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Outcome::FollowupFailed
                | Outcome::GenerationFailed
                | Outcome::ValidationOrTransformFailed
                | Outcome::ExecutionFailed
        )
    }
}

/// Result envelope consumed by front ends
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineResult {
    pub question: String,
    /// SQL actually executed (or the last stage's output on failure)
    pub sql: Option<String>,
    /// SQL before the semantic guard and structural transformer
    pub generated_sql: Option<String>,
    pub results: Option<Vec<Row>>,
    pub explanation: Option<String>,
    /// Generator latency in seconds, `None` when no generator call was made
    pub llm_generation_time: Option<f64>,
    pub cached: bool,
    pub needs_clarification: bool,
    pub followup: bool,
    pub error: Option<String>,
    /// Short error kind, see `GuruError::code`
    pub error_code: Option<&'static str>,
    pub outcome: Outcome,
}

impl EngineResult {
    fn new(question: &str, outcome: Outcome) -> Self {
        Self {
            question: question.to_string(),
            sql: None,
            generated_sql: None,
            results: None,
            explanation: None,
            llm_generation_time: None,
            cached: false,
            needs_clarification: false,
            followup: false,
            error: None,
            error_code: None,
            outcome,
        }
    }

    fn with_error(mut self, err: &GuruError) -> Self {
        self.error = Some(err.to_string());
        self.error_code = Some(err.code());
        self
    }
}

fn round_latency(latency: Duration) -> f64 {
    (latency.as_secs_f64() * 10_000.0).round() / 10_000.0
}

/// Owns every piece of per-session state: connection, cache and context
pub struct Engine {
    executor: SqlExecutor,
    generator: Box<dyn SqlGenerator>,
    transformer: Box<dyn StructuralTransformer>,
    cache: QueryCache,
    context: ConversationContext,
    timeout: Duration,
}

impl Engine {
    pub fn new(
        executor: SqlExecutor,
        generator: Box<dyn SqlGenerator>,
        transformer: Box<dyn StructuralTransformer>,
    ) -> Self {
        Self {
            executor,
            generator,
            transformer,
            cache: QueryCache::new(),
            context: ConversationContext::default(),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Open the configured database and wire the configured collaborators
    pub fn from_config(config: &GuruConfig) -> Result<Self> {
        let conn = open_database(&config.database.path)?;
        let executor =
            SqlExecutor::new(conn).with_progress_interval(config.database.progress_interval);

        let generator: Box<dyn SqlGenerator> = if config.llm.enabled {
            Box::new(HttpSqlGenerator::new(config.llm.clone())?)
        } else {
            Box::new(DisabledGenerator)
        };

        Ok(Self::new(
            executor,
            generator,
            config.engine.structural_policy.build(),
        )
        .with_timeout(config.database.query_timeout()))
    }

    pub fn executor(&self) -> &SqlExecutor {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut SqlExecutor {
        &mut self.executor
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Run one full turn
    pub fn process(&mut self, question: &str) -> EngineResult {
        // 1) Cache
        if let Some(entry) = self.cache.get(question) {
            debug!("Cache hit for {:?}", question);
            let mut res = EngineResult::new(question, Outcome::CacheHit);
            res.sql = Some(entry.sql.clone());
            res.results = Some(entry.results.clone());
            res.explanation = Some("Cached result.".to_string());
            res.cached = true;
            return res;
        }

        // 2) Ambiguity
        if let Some(reason) = ambiguity_reason(question) {
            info!("Question needs clarification ({})", reason);
            let mut res = EngineResult::new(question, Outcome::NeedsClarification);
            res.needs_clarification = true;
            res.error = Some(CLARIFICATION_MESSAGE.to_string());
            return res;
        }

        // 3) Follow-up
        if is_followup_tourney_question(question, self.context.last_sql()) {
            return self.resolve_followup(question);
        }

        // 4) Deterministic template
        let intent = classify_intent(question);
        debug!("Intent: {}", intent);
        let template = build_template(intent, question, self.executor.connection());

        let (generated_sql, explanation, llm_time) = match template {
            Some(sql) => {
                info!("Deterministic template used for intent {}", intent);
                (sql, template_explanation(intent), None)
            }
            // 5) External generator
            None => match self.generator.generate(question) {
                Ok(generation) => (
                    generation.sql,
                    generation.explanation,
                    Some(round_latency(generation.latency)),
                ),
                Err(e) => {
                    warn!("SQL generation failed: {}", e);
                    return EngineResult::new(question, Outcome::GenerationFailed)
                        .with_error(&GuruError::from(e));
                }
            },
        };

        let mut res = EngineResult::new(question, Outcome::Success);
        res.generated_sql = Some(generated_sql.clone());
        res.explanation = Some(explanation);
        res.llm_generation_time = llm_time;

        // 6) Semantic guard, then structural policy
        let guarded = match validate_and_autofix(question, &generated_sql) {
            Ok(sql) => sql,
            Err(e) => {
                warn!("Semantic guard rejected SQL: {}", e);
                res.sql = Some(generated_sql);
                res.outcome = Outcome::ValidationOrTransformFailed;
                return res.with_error(&GuruError::from(e));
            }
        };

        let sql = match self.transformer.rewrite(&guarded) {
            Ok(sql) => sql,
            Err(e) => {
                warn!("Structural policy rejected SQL: {}", e);
                res.sql = Some(guarded);
                res.outcome = Outcome::ValidationOrTransformFailed;
                return res.with_error(&GuruError::from(e));
            }
        };
        res.sql = Some(sql.clone());

        // 7) Execute
        let results = match self.execute(&sql) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Execution failed: {}", e);
                res.outcome = Outcome::ExecutionFailed;
                return res.with_error(&e);
            }
        };

        // 8) Context + cache
        info!("Query succeeded with {} rows", results.len());
        self.context.record(&sql, intent, &results);
        self.cache.store(question, sql, results.clone());
        res.results = Some(results);
        res
    }

    /// Run through the executor; a driver error drops the cached schema so
    /// the next turn validates against the live database
    fn execute(&mut self, sql: &str) -> Result<Vec<Row>, GuruError> {
        let outcome = self.executor.execute_sql(sql, self.timeout);
        if let Err(GuruError::Execution(ExecutionError::Driver(_))) = &outcome {
            debug!("Driver error, schema will be introspected again");
            self.executor.refresh_schema();
        }
        outcome
    }

    fn resolve_followup(&mut self, question: &str) -> EngineResult {
        let mut res = EngineResult::new(question, Outcome::FollowupResolved);
        res.followup = true;

        let Some(last_sql) = self.context.last_sql() else {
            res.outcome = Outcome::FollowupFailed;
            res.error = Some("No previous query to follow up on.".to_string());
            return res;
        };

        let sql = build_followup_tourney_query(last_sql);
        debug!("Follow-up resolved against previous query");

        match self.execute(&sql) {
            Ok(results) => {
                info!("Follow-up returned {} rows", results.len());
                self.context
                    .record(&sql, Intent::FollowupTourney, &results);
                self.cache.store(question, sql.clone(), results.clone());
                res.sql = Some(sql);
                res.results = Some(results);
                res.explanation = Some("Contextual follow-up (deterministic).".to_string());
                res
            }
            Err(e) => {
                warn!("Follow-up failed: {}", e);
                res.outcome = Outcome::FollowupFailed;
                res.with_error(&e)
            }
        }
    }
}

fn template_explanation(intent: Intent) -> String {
    match intent {
        Intent::SameTournamentMultiDefeat => {
            "Deterministic template: same-tournament multi-opponent defeat.".to_string()
        }
        Intent::RankingAtFinal => "Deterministic template: ranking at specific final.".to_string(),
        Intent::None | Intent::FollowupTourney => "Deterministic template.".to_string(),
    }
}
