//! Tennis Guru configuration
//!
//! Config file: ~/.config/tennis-guru/config.toml or /etc/tennis-guru/config.toml
//! ($TENNIS_GURU_CONFIG overrides both)

use crate::sql_executor::DEFAULT_PROGRESS_INTERVAL;
use crate::sql_transformer::StructuralPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file with players, rankings and matches
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Wall-clock bound for a single query
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// VM instructions between timeout samples
    #[serde(default = "default_progress_interval")]
    pub progress_interval: i32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/guru.db")
}

fn default_query_timeout() -> u64 {
    30
}

fn default_progress_interval() -> i32 {
    DEFAULT_PROGRESS_INTERVAL
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            query_timeout_secs: default_query_timeout(),
            progress_interval: default_progress_interval(),
        }
    }
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// External SQL generator (OpenAI-compatible HTTP API)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL, e.g. "https://api.openai.com/v1" or "http://localhost:11434/v1"
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key (not required for local backends)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,

    /// HTTP client timeout
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Pipeline settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub structural_policy: StructuralPolicy,
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuruConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl GuruConfig {
    /// Default user config path: ~/.config/tennis-guru/config.toml
    pub fn user_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Cannot determine config directory")?;
        Ok(config_dir.join("tennis-guru").join("config.toml"))
    }

    /// System config path: /etc/tennis-guru/config.toml
    pub fn system_config_path() -> PathBuf {
        PathBuf::from("/etc/tennis-guru/config.toml")
    }

    /// Load configuration
    ///
    /// Priority:
    /// 1. $TENNIS_GURU_CONFIG
    /// 2. User config (~/.config/tennis-guru/config.toml)
    /// 3. System config (/etc/tennis-guru/config.toml)
    /// 4. Defaults
    pub fn load() -> Result<Self> {
        if let Ok(explicit) = std::env::var("TENNIS_GURU_CONFIG") {
            return Self::load_from(Path::new(&explicit));
        }

        if let Ok(user_path) = Self::user_config_path() {
            if user_path.exists() {
                return Self::load_from(&user_path);
            }
        }

        let system_path = Self::system_config_path();
        if system_path.exists() {
            return Self::load_from(&system_path);
        }

        Ok(Self::default())
    }

    /// Load and validate a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: GuruConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the file `load` reads first: $TENNIS_GURU_CONFIG, else the
    /// user config file. Returns the path written.
    pub fn save(&self) -> Result<PathBuf> {
        let path = match std::env::var("TENNIS_GURU_CONFIG") {
            Ok(explicit) => PathBuf::from(explicit),
            Err(_) => Self::user_config_path()?,
        };
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, toml_string).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.query_timeout_secs == 0 {
            anyhow::bail!("Invalid database.query_timeout_secs: must be greater than 0");
        }
        if self.database.progress_interval <= 0 {
            anyhow::bail!("Invalid database.progress_interval: must be greater than 0");
        }
        if self.llm.enabled && self.llm.endpoint.trim().is_empty() {
            anyhow::bail!("Invalid llm.endpoint: must not be empty when llm.enabled = true");
        }
        if self.llm.enabled && self.llm.model.trim().is_empty() {
            anyhow::bail!("Invalid llm.model: must not be empty when llm.enabled = true");
        }
        Ok(())
    }

    /// Set the structural policy by name
    pub fn set_structural_policy(&mut self, name: &str) -> Result<()> {
        self.engine.structural_policy = name
            .parse::<StructuralPolicy>()
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }
}
