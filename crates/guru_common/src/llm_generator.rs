//! External SQL generator - used only when no deterministic template matches
//!
//! Blocking OpenAI-compatible chat completions client. The pipeline treats any
//! failure here as fatal for the turn and never retries.

use crate::config::LlmConfig;
use crate::error::GenerationError;
use crate::schema::SCHEMA_DESCRIPTION;
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Output of one generator call
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub sql: String,
    pub explanation: String,
    pub latency: Duration,
}

/// Natural-language question -> SQL text
pub trait SqlGenerator {
    fn generate(&self, question: &str) -> Result<Generation, GenerationError>;
}

/// Used when the generator is turned off in configuration
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGenerator;

impl SqlGenerator for DisabledGenerator {
    fn generate(&self, _question: &str) -> Result<Generation, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

/// Domain rules the generator must follow
pub fn system_prompt() -> String {
    format!(
        "You are an expert SQL generator for a tennis analytics database running on SQLite.
Return ONLY one raw SQL SELECT statement: no markdown, no code fences, no explanations.

DATABASE SCHEMA
{schema}

DOMAIN
- If gender is not specified assume ATP; use WTA only when the question refers to women/WTA.
- ATP queries filter matches.tour = 'ATP', players.gender = 'ATP', rankings.gender = 'ATP' (WTA likewise).
- Grand Slam: tourney_level = 'G'.
- Surfaces: 'Clay' (clay, tierra, tierra batida, polvo de ladrillo), 'Grass' (grass, hierba, césped),
  'Hard' (hard, cemento, dura, cancha dura).
- Rounds: 'F' final, 'SF' semifinal, 'QF' quarterfinal, 'R16', 'R32'.
- Title = winner_id in round = 'F'. Final played = round = 'F' AND (winner_id = player OR loser_id = player).
- A mentioned player must be filtered in the main WHERE clause with
  lower(p.first_name) = 'name' AND lower(p.last_name) = 'surname' (surname only if that is all you have).
- Wrap OR conditions in parentheses; never broaden a title filter with OR.
- \"before YEAR\" -> match_date < 'YEAR-01-01'; \"after YEAR\" -> match_date > 'YEAR-12-31'.

SQL STRUCTURE
- Explicit JOIN syntax and fully qualified columns (m.round, p.first_name).
- SQLite only: strftime('%Y', col) for years, DATE(col, '+N years') for date arithmetic.
  Never EXTRACT, DATE_TRUNC or INTERVAL.
- Never use EXISTS or NOT EXISTS. Exclusions use LEFT JOIN ... IS NULL with every exclusion
  filter inside the ON clause. Never NOT IN, never correlated subqueries for exclusion.
- A table referenced in an ON clause must already be declared in FROM or a previous JOIN.
- Rank-1 history: JOIN (SELECT DISTINCT player_id FROM rankings WHERE rank = 1 AND gender = 'ATP') r1.
- Ranking at the time of a match: the latest ranking_date <= match_date via a correlated
  subquery, never ranking_date = match_date.
- Win percentages over finals require HAVING COUNT(*) >= 3.
- Statistics are split by side (w_ace winner, l_ace loser); player totals use CASE on
  winner_id / loser_id. There is no 'aces' column.",
        schema = SCHEMA_DESCRIPTION
    )
}

static CODE_FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[^\n]*\n").unwrap());
static CODE_FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n?```\s*$").unwrap());

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let without_open = CODE_FENCE_OPEN.replace(trimmed, "");
    CODE_FENCE_CLOSE
        .replace(&without_open, "")
        .trim()
        .to_string()
}

/// Real generator over HTTP
pub struct HttpSqlGenerator {
    config: LlmConfig,
    client: reqwest::blocking::Client,
}

impl HttpSqlGenerator {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { config, client })
    }

    fn api_key(&self) -> Result<Option<String>, GenerationError> {
        match &self.config.api_key_env {
            Some(var) => std::env::var(var)
                .map(Some)
                .map_err(|_| GenerationError::MissingApiKey(var.clone())),
            None => Ok(None),
        }
    }

    fn call_chat_completions(&self, question: &str) -> Result<String, GenerationError> {
        let url = format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        );

        let request_body = serde_json::json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system_prompt()},
                {"role": "user", "content": question},
            ],
        });

        let mut request = self.client.post(&url).json(&request_body);
        if let Some(api_key) = self.api_key()? {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.config.timeout_secs)
            } else {
                GenerationError::Http(format!("Request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            return Err(GenerationError::Http(format!(
                "HTTP {} from SQL generator",
                response.status()
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .map_err(|e| GenerationError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        extract_message_content(&response_json)
    }
}

/// choices[0].message.content of a chat completions response
pub fn extract_message_content(response: &serde_json::Value) -> Result<String, GenerationError> {
    let content = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            GenerationError::InvalidResponse("missing choices[0].message.content".to_string())
        })?;

    let sql = strip_code_fences(content);
    if sql.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(sql)
}

impl SqlGenerator for HttpSqlGenerator {
    fn generate(&self, question: &str) -> Result<Generation, GenerationError> {
        if !self.config.enabled {
            return Err(GenerationError::Disabled);
        }

        debug!("Calling SQL generator model {}", self.config.model);
        let started = Instant::now();
        let sql = self.call_chat_completions(question)?;
        let latency = started.elapsed();
        info!("SQL generated in {:.4}s", latency.as_secs_f64());

        Ok(Generation {
            sql,
            explanation: "SQL generated from natural language question.".to_string(),
            latency,
        })
    }
}
