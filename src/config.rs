//! Configuration Module
//!
//! Layered settings: compiled defaults, then `~/.searchcrabs/config.toml`,
//! then an optional explicit file, then `SEARCHCRABS__*` environment
//! variables. API keys additionally fall back to the conventional
//! `OPENAI_API_KEY` / `EXA_API_KEY` variables.

use config::{Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::brain::agent::AgentDefinition;

/// Environment variable that flips the server into production mode.
pub const ENV_MODE_VAR: &str = "SEARCHCRABS_ENV";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Config file not found: {0}")]
    Missing(PathBuf),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub memory: MemoryConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Hides error chains from JSON-RPC error payloads.
    #[serde(default)]
    pub production: bool,
}

#[derive(Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<Zeroizing<String>>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

#[derive(Clone, Deserialize)]
pub struct SearchConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<Zeroizing<String>>,
    pub num_results: u32,
    pub max_characters: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    pub enabled: bool,
    /// Database file. Relative paths resolve against the home directory.
    pub path: PathBuf,
    pub last_messages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    /// When set, logs also go to a daily rolling file in this directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// Hand-written so keys never end up in log output.
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("num_results", &self.num_results)
            .field("max_characters", &self.max_characters)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

const DEFAULTS: &str = r#"
[server]
bind = "127.0.0.1"
port = 4111
production = false

[llm]
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
temperature = 0.2
max_tokens = 2048
timeout_secs = 120

[search]
base_url = "https://api.exa.ai"
num_results = 5
max_characters = 1000
timeout_secs = 30

[memory]
enabled = true
path = "memory.db"
last_messages = 10

[logging]
level = "info"
json = false
"#;

impl Config {
    /// Load configuration from all layers.
    ///
    /// `explicit` must exist when given; the home config file is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let home_file = searchcrabs_home().join("config.toml");

        let mut builder = config::Config::builder()
            .add_source(File::from_str(DEFAULTS, FileFormat::Toml))
            .add_source(File::from(home_file).required(false));

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Missing(path.to_path_buf()));
            }
            builder = builder.add_source(File::from(path.to_path_buf()));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("SEARCHCRABS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut cfg: Config = settings.try_deserialize()?;
        cfg.apply_env_fallbacks(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Parse a TOML document layered over the compiled defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(File::from_str(DEFAULTS, FileFormat::Toml))
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    fn apply_env_fallbacks(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = var("OPENAI_API_KEY")
                .filter(|k| !k.is_empty())
                .map(Zeroizing::new);
        }
        if self.search.api_key.is_none() {
            self.search.api_key = var("EXA_API_KEY")
                .filter(|k| !k.is_empty())
                .map(Zeroizing::new);
        }
        if var(ENV_MODE_VAR).is_some_and(|v| v.eq_ignore_ascii_case("production")) {
            self.server.production = true;
        }
    }

    /// Absolute path of the memory database.
    pub fn memory_db_path(&self) -> PathBuf {
        if self.memory.path.is_absolute() {
            self.memory.path.clone()
        } else {
            searchcrabs_home().join(&self.memory.path)
        }
    }
}

/// Home directory for config, logs and the memory db: `~/.searchcrabs/`
pub fn searchcrabs_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".searchcrabs")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Config {
        Config::from_toml_str("").expect("defaults")
    }

    #[test]
    fn test_defaults() {
        let cfg = defaults();
        assert_eq!(cfg.server.port, 4111);
        assert!(!cfg.server.production);
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.search.num_results, 5);
        assert!(cfg.memory.enabled);
        assert!(cfg.agents.is_empty());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [server]
            port = 9000
            production = true

            [[agents]]
            id = "newsAgent"
            name = "News Agent"
            instructions = "Summarize the news."
            model = "gpt-4o"
            tools = ["web_search"]
            "#,
        )
        .expect("config");

        assert_eq!(cfg.server.port, 9000);
        assert!(cfg.server.production);
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.agents.len(), 1);
        assert_eq!(cfg.agents[0].id, "newsAgent");
        assert_eq!(cfg.agents[0].max_steps, 5);
    }

    #[test]
    fn test_env_fallbacks() {
        let mut cfg = defaults();
        cfg.apply_env_fallbacks(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "EXA_API_KEY" => Some(String::new()),
            "SEARCHCRABS_ENV" => Some("Production".to_string()),
            _ => None,
        });

        assert_eq!(cfg.llm.api_key.as_deref().map(String::as_str), Some("sk-test"));
        assert!(cfg.search.api_key.is_none());
        assert!(cfg.server.production);
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let mut cfg = defaults();
        cfg.llm.api_key = Some(Zeroizing::new("sk-secret".to_string()));
        let printed = format!("{:?}", cfg.llm);
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn test_memory_path_resolution() {
        let mut cfg = defaults();
        assert!(cfg.memory_db_path().ends_with(".searchcrabs/memory.db"));

        cfg.memory.path = PathBuf::from("/tmp/abs.db");
        assert_eq!(cfg.memory_db_path(), PathBuf::from("/tmp/abs.db"));
    }
}
