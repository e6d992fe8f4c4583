//! Guru Common - Question-to-SQL pipeline for tennis history
//!
//! Turns a natural-language question into a validated, read-only SQL query,
//! runs it against the tennis database and keeps enough conversational state
//! to resolve short follow-ups.

pub mod ambiguity;
pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod intent_router;
pub mod llm_generator;
pub mod rows;
pub mod schema;
pub mod semantic_guard;
pub mod sql_executor;
pub mod sql_transformer;

pub use config::GuruConfig;
pub use engine::{Engine, EngineResult, Outcome};
pub use error::GuruError;
pub use intent_router::Intent;
pub use rows::{CellValue, Row};
