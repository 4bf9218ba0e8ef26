//! # Configuration Management
//!
//! Loads application configuration from multiple sources, highest priority
//! last:
//!
//! 1. Default values (built into the code)
//! 2. Configuration file (`config.toml`, optional)
//! 3. Environment variables with the `APP_` prefix
//! 4. `HOST` / `PORT` overrides used by deployment platforms
//!
//! The vendor API key is deliberately NOT part of this struct: it is read
//! from the environment at startup (see `main`) so it never ends up in
//! serialized config output.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

use crate::language;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub services: ServicesConfig,
    pub relay: RelayConfig,
}

/// Server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// External speech/translation/synthesis vendor settings.
///
/// The defaults target an OpenAI-compatible API surface; `base_url` can be
/// pointed at any compatible gateway (including a local stub in tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Base URL of the vendor API (no trailing slash)
    pub base_url: String,
    /// Name of the environment variable holding the bearer key
    pub api_key_env: String,
    /// Speech-to-text model identifier
    pub stt_model: String,
    /// Chat/completion model used for detection + translation
    pub chat_model: String,
    /// Speech synthesis model identifier
    pub tts_model: String,
    /// Synthesis voice
    pub voice: String,
}

/// Relay behavior tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Canonical code of the language operators read and write in
    pub display_language: String,
    /// Human-readable name of the display language, used in vendor prompts
    pub display_language_name: String,
    /// Audio chunks smaller than this many decoded bytes are dropped as noise
    pub min_chunk_bytes: usize,
    /// Fallback media type when synthesis reports none or fails
    pub default_audio_mime: String,
    /// Optional TOML file replacing the built-in spam rules
    pub spam_rules_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            services: ServicesConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                stt_model: "whisper-1".to_string(),
                chat_model: "gpt-3.5-turbo".to_string(),
                tts_model: "gpt-4o-mini-tts".to_string(),
                voice: "alloy".to_string(),
            },
            relay: RelayConfig {
                display_language: "ar".to_string(),
                display_language_name: "Arabic".to_string(),
                // Short capture chunks compress to very little; only reject
                // chunks that cannot possibly contain speech.
                min_chunk_bytes: 200,
                default_audio_mime: "audio/ogg".to_string(),
                spam_rules_file: None,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml`, and environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms conventionally inject bare HOST/PORT.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.relay.min_chunk_bytes == 0 {
            return Err(anyhow::anyhow!("Minimum chunk size must be greater than 0"));
        }

        // The display language must itself be a canonical code, since reply
        // routing compares session languages against its prefix.
        match language::normalize(Some(&self.relay.display_language)) {
            Some(code) if code == self.relay.display_language => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Display language {:?} is not a canonical language code",
                    self.relay.display_language
                ))
            }
        }

        if self.services.base_url.is_empty() || self.services.base_url.ends_with('/') {
            return Err(anyhow::anyhow!(
                "Service base URL must be non-empty with no trailing slash"
            ));
        }

        if self.services.api_key_env.is_empty() {
            return Err(anyhow::anyhow!("API key environment variable name is empty"));
        }

        Ok(())
    }
}
