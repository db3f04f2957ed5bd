use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::ollama;
use crate::provider::Provider;
use crate::retry::RetryPolicy;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub claude_api_key: Option<String>,
    pub ollama_url: Option<String>,
    pub retry_count: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::OpenAI.as_str().to_string()),
            default_model: None,
            openai_api_key: None,
            claude_api_key: None,
            ollama_url: None,
            retry_count: None,
            retry_delay_ms: None,
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("vegachat").join("config.json"))
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.claude_api_key = Some(key);
        }
        if let Some(host) = lookup("OLLAMA_HOST") {
            self.ollama_url = Some(with_scheme(host.trim()));
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or(Provider::OpenAI)
    }

    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::OpenAI => self.openai_api_key.as_deref(),
            Provider::Claude => self.claude_api_key.as_deref(),
            Provider::Ollama => None,
        }
    }

    pub fn set_api_key(&mut self, provider: Provider, key: String) {
        match provider {
            Provider::OpenAI => self.openai_api_key = Some(key),
            Provider::Claude => self.claude_api_key = Some(key),
            Provider::Ollama => {}
        }
    }

    pub fn ollama_url(&self) -> &str {
        self.ollama_url.as_deref().unwrap_or(ollama::DEFAULT_URL)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let default = RetryPolicy::default();
        RetryPolicy::new(
            self.retry_count.unwrap_or(default.attempts),
            self.retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(default.delay),
        )
    }
}

/// `OLLAMA_HOST` may be a bare `host:port`.
fn with_scheme(host: &str) -> String {
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.provider(), Provider::OpenAI);
    }

    #[test]
    fn save_and_load_round_trip_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::new();
        config.provider = Some("claude".to_string());
        config.default_model = Some("claude-3-5-haiku-20241022".to_string());
        config.retry_count = Some(5);

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.provider(), Provider::Claude);
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"provider":"ollama"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.provider(), Provider::Ollama);
        assert_eq!(config.ollama_url(), "http://localhost:11434");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::new();
        config.openai_api_key = Some("from-file".to_string());
        config.claude_api_key = Some("kept".to_string());
        config.apply_env_from(|key| match key {
            "OPENAI_API_KEY" => Some("sk-env".to_string()),
            "ANTHROPIC_API_KEY" => Some("  ".to_string()),
            "OLLAMA_HOST" => Some("http://gpu:11434".to_string()),
            _ => None,
        });

        assert_eq!(config.api_key(Provider::OpenAI), Some("sk-env"));
        assert_eq!(config.api_key(Provider::Claude), Some("kept"));
        assert_eq!(config.ollama_url(), "http://gpu:11434");
    }

    #[test]
    fn bare_ollama_host_gets_http_scheme() {
        let mut config = Config::new();
        config.apply_env_from(|key| match key {
            "OLLAMA_HOST" => Some("127.0.0.1:11434".to_string()),
            _ => None,
        });
        assert_eq!(config.ollama_url(), "http://127.0.0.1:11434");

        config.apply_env_from(|key| match key {
            "OLLAMA_HOST" => Some("https://ollama.internal".to_string()),
            _ => None,
        });
        assert_eq!(config.ollama_url(), "https://ollama.internal");
    }

    #[test]
    fn retry_settings_build_policy() {
        let mut config = Config::new();
        config.retry_count = Some(0);
        config.retry_delay_ms = Some(250);
        let policy = config.retry_policy();
        assert_eq!(policy.attempts, 1);
        assert_eq!(policy.delay, Duration::from_millis(250));
    }
}
