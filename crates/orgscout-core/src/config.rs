use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, ScoutError};

/// Top-level configuration for the Orgscout gateway.
///
/// Loaded from `~/.orgscout/config.toml` by default. Each section corresponds
/// to one upstream collaborator or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgscoutConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl OrgscoutConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OrgscoutConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ScoutError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Fill empty API keys from `ORGSCOUT_LLM_API_KEY` / `ORGSCOUT_SEARCH_API_KEY`.
    pub fn apply_env_keys(&mut self) {
        if self.llm.api_key.is_empty() {
            if let Ok(key) = std::env::var("ORGSCOUT_LLM_API_KEY") {
                self.llm.api_key = key;
            }
        }
        if self.search.api_key.is_empty() {
            if let Ok(key) = std::env::var("ORGSCOUT_SEARCH_API_KEY") {
                self.search.api_key = key;
            }
        }
    }
}

/// General server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite turn log.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Interface the HTTP server binds to.
    pub host: String,
    /// HTTP server port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.orgscout/data".to_string(),
            log_level: "info".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Classifier / extraction model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the generative-language API.
    pub endpoint: String,
    /// Model used for routing and entity extraction.
    pub model: String,
    pub api_key: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key: String::new(),
        }
    }
}

/// Search-augmented upstream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Chat-completions endpoint of the search upstream.
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    /// ISO country code sent as the searcher's location.
    pub country: String,
    /// Domains the upstream is asked to restrict its search to.
    pub search_domain_filter: Vec<String>,
    /// `search_context_size` for the streamed single-organization path.
    pub stream_context_size: String,
    /// `search_context_size` for the structured multi-organization path.
    pub listing_context_size: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.perplexity.ai/chat/completions".to_string(),
            model: "sonar".to_string(),
            api_key: String::new(),
            country: "UZ".to_string(),
            search_domain_filter: vec![
                ".uz".to_string(),
                "www.yellowpages.uz".to_string(),
                "www.goldenpages.uz".to_string(),
                "orginfo.uz".to_string(),
            ],
            stream_context_size: "high".to_string(),
            listing_context_size: "medium".to_string(),
        }
    }
}

/// Short-term conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Seconds an appended entry stays readable.
    pub retention_secs: u64,
    /// Prior enriched queries handed to the classifier.
    pub history_turns: usize,
    /// Known organizations handed to the classifier.
    pub entity_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
            history_turns: 5,
            entity_turns: 5,
        }
    }
}

/// Headless-browser coordinate lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub enabled: bool,
    /// WebDriver hub URL.
    pub webdriver_url: String,
    /// Implicit element wait applied to each remote session.
    pub implicit_wait_ms: u64,
    /// Upper bound on one lookup, session setup and teardown included.
    pub timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webdriver_url: "http://selenium:4444/wd/hub".to_string(),
            implicit_wait_ms: 5000,
            timeout_secs: 30,
        }
    }
}

/// Per-turn admission limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest accepted inbound message, in characters.
    pub max_message_chars: usize,
    /// Persisted turns allowed per conversation (0 = unlimited).
    pub max_turns_per_conversation: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 2000,
            max_turns_per_conversation: 0,
        }
    }
}

/// Bearer-token authentication for the HTTP surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When unset, every route is public.
    pub api_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = OrgscoutConfig::default();
        assert_eq!(config.general.port, 8080);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.memory.retention_secs, 3600);
        assert_eq!(config.memory.history_turns, 5);
        assert_eq!(config.memory.entity_turns, 5);
        assert_eq!(config.search.model, "sonar");
        assert!(!config.browser.enabled);
        assert_eq!(config.limits.max_turns_per_conversation, 0);
        assert!(config.auth.api_token.is_none());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
data_dir = "/srv/orgscout"
port = 9090

[search]
api_key = "pplx-test"
search_domain_filter = ["example.uz"]

[browser]
enabled = true
webdriver_url = "http://localhost:4444"

[auth]
api_token = "secret"
"#;
        let file = create_temp_config(content);
        let config = OrgscoutConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "/srv/orgscout");
        assert_eq!(config.general.port, 9090);
        assert_eq!(config.search.api_key, "pplx-test");
        assert_eq!(config.search.search_domain_filter, vec!["example.uz"]);
        assert_eq!(config.search.model, "sonar");
        assert!(config.browser.enabled);
        assert_eq!(config.browser.timeout_secs, 30);
        assert_eq!(config.auth.api_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[memory]\nretention_secs = 60\n");
        let config = OrgscoutConfig::load(file.path()).unwrap();
        assert_eq!(config.memory.retention_secs, 60);
        assert_eq!(config.memory.history_turns, 5);
        assert_eq!(config.general.host, "127.0.0.1");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = OrgscoutConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.orgscout/data");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[general\nport = ");
        let err = OrgscoutConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ScoutError::Config(_)));
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = OrgscoutConfig::default();
        config.limits.max_turns_per_conversation = 40;
        config.save(&path).unwrap();

        let reloaded = OrgscoutConfig::load(&path).unwrap();
        assert_eq!(reloaded.limits.max_turns_per_conversation, 40);
        assert_eq!(reloaded.search.endpoint, config.search.endpoint);
    }
}
