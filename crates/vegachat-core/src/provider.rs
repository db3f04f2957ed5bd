use std::sync::Arc;

use crate::ai::{ChatTransport, ClaudeClient, OllamaClient, OpenAIClient, ProviderError};
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Claude,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Claude => "claude",
            Provider::Ollama => "ollama",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(Provider::OpenAI),
            "claude" => Some(Provider::Claude),
            "ollama" => Some(Provider::Ollama),
            _ => None,
        }
    }

    pub fn all() -> Vec<Provider> {
        vec![Provider::OpenAI, Provider::Claude, Provider::Ollama]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OpenAI => "ChatGPT (OpenAI)",
            Provider::Claude => "Claude (Anthropic)",
            Provider::Ollama => "Ollama (Local)",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }

    /// Models offered without asking the provider. Ollama models are
    /// discovered at runtime.
    pub fn known_models(&self) -> Vec<String> {
        match self {
            Provider::OpenAI => OpenAIClient::list_models(),
            Provider::Claude => ClaudeClient::list_models(),
            Provider::Ollama => vec!["llama3.2".to_string()],
        }
    }

    pub fn default_model(&self) -> String {
        match self {
            Provider::OpenAI => "gpt-4o".to_string(),
            Provider::Claude => "claude-sonnet-4-20250514".to_string(),
            Provider::Ollama => "llama3.2".to_string(),
        }
    }
}

/// Build the transport for `provider` from the configured credentials.
pub fn build_transport(
    provider: Provider,
    config: &Config,
) -> Result<Arc<dyn ChatTransport>, ProviderError> {
    let key = config.api_key(provider).filter(|k| !k.trim().is_empty());
    Ok(match provider {
        Provider::OpenAI => Arc::new(OpenAIClient::new(
            key.ok_or(ProviderError::MissingApiKey("OpenAI"))?,
        )),
        Provider::Claude => Arc::new(ClaudeClient::new(
            key.ok_or(ProviderError::MissingApiKey("Claude"))?,
        )),
        Provider::Ollama => Arc::new(OllamaClient::new(config.ollama_url())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for provider in Provider::all() {
            assert_eq!(Provider::from_str(provider.as_str()), Some(provider));
        }
        assert_eq!(Provider::from_str("OpenAI"), Some(Provider::OpenAI));
        assert_eq!(Provider::from_str("gemini"), None);
    }

    #[test]
    fn default_model_is_offered() {
        for provider in Provider::all() {
            assert!(provider.known_models().contains(&provider.default_model()));
        }
    }

    #[test]
    fn missing_key_is_reported() {
        let config = Config::new();
        let err = build_transport(Provider::Claude, &config).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Claude API key not configured. Press 'P' to set it up."
        );
    }

    #[test]
    fn builds_configured_transports() {
        let mut config = Config::new();
        config.set_api_key(Provider::OpenAI, "sk-test".to_string());

        assert_eq!(build_transport(Provider::OpenAI, &config).unwrap().name(), "openai");
        assert_eq!(build_transport(Provider::Ollama, &config).unwrap().name(), "ollama");
    }
}
