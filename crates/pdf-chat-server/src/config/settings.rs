use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Variables honored on top of the `APP__*` namespace.
const ENV_API_KEY: &str = "OPENAI_API_KEY";
const ENV_MODEL: &str = "OPENAI_MODEL";
const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
const ENV_PDF_PATH: &str = "PDF_PATH";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub document: DocumentConfig,
    pub conversation: ConversationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider credential. `None` disables the chat endpoint.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Only bounds connection setup; the completion stream itself has no deadline.
    pub connect_timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            connect_timeout_seconds: 10,
        }
    }
}

impl LlmConfig {
    /// Blank keys count as missing.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DocumentConfig {
    pub path: String,
    /// Character budget of the document inside the system prompt.
    pub max_context_chars: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            path: "Accessible_Travel_Guide_Partial.pdf".to_string(),
            max_context_chars: 180_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ConversationConfig {
    /// Evict the least recently active conversation past this count.
    pub max_conversations: Option<usize>,
    /// Drop conversations idle for longer than this.
    pub idle_ttl_seconds: Option<u64>,
    pub sweep_interval_seconds: u64,
    /// Events buffered between the relay task and the SSE response.
    pub stream_buffer: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_conversations: None,
            idle_ttl_seconds: None,
            sweep_interval_seconds: 60,
            stream_buffer: 64,
        }
    }
}

impl ConversationConfig {
    pub fn idle_ttl(&self) -> Option<Duration> {
        self.idle_ttl_seconds.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from(Path::new("config/settings.toml"))
    }

    /// Layering: defaults, then the optional file, then `APP__*`, then the
    /// `OPENAI_*` / `PDF_PATH` variables.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("llm.api_key", std::env::var(ENV_API_KEY).ok())?
            .set_override_option("llm.model", std::env::var(ENV_MODEL).ok())?
            .set_override_option("llm.base_url", std::env::var(ENV_BASE_URL).ok())?
            .set_override_option("document.path", std::env::var(ENV_PDF_PATH).ok())?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_original_deployment() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.document.max_context_chars, 180_000);
        assert!((settings.llm.temperature - 0.2).abs() < f32::EPSILON);
        assert!(settings.conversation.max_conversations.is_none());
        assert!(settings.conversation.idle_ttl().is_none());
    }

    #[test]
    fn test_blank_credential_is_missing() {
        let mut llm = LlmConfig::default();
        assert!(llm.credential().is_none());

        llm.api_key = Some("   ".to_string());
        assert!(llm.credential().is_none());

        llm.api_key = Some(" sk-test ".to_string());
        assert_eq!(llm.credential(), Some("sk-test"));
    }

    #[test]
    fn test_load_from_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[server]\nport = 9123\n\n[document]\nmax_context_chars = 42\n\n[conversation]\nidle_ttl_seconds = 30"
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.server.port, 9123);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.document.max_context_chars, 42);
        assert_eq!(
            settings.conversation.idle_ttl(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(settings.conversation.stream_buffer, 64);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.conversation.sweep_interval(), Duration::from_secs(60));
    }
}
