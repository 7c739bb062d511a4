use anyhow::{Context, Result};
use serde::Deserialize;

use crate::live::LiveConfig;
use crate::session::SessionConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub live: LiveSettings,
    pub audio: AudioSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    pub endpoint: String,
    pub model: String,
    pub voice: Option<String>,
    pub system_instruction: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub frame_size: usize,
    pub output_channels: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "echo-hub".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice: Some("Zephyr".to_string()),
            system_instruction: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            frame_size: 4096,
            output_channels: 1,
        }
    }
}

impl Config {
    /// Load `path` (any format the config crate knows, extension optional)
    /// overlaid with `ECHO_HUB__SECTION__KEY` environment variables. A missing
    /// file falls back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("ECHO_HUB").separator("__"))
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    /// Read the API key from `live.api_key_env`, falling back to `API_KEY`
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.live.api_key_env)
            .or_else(|_| std::env::var("API_KEY"))
            .with_context(|| {
                format!(
                    "No API key: set {} or API_KEY",
                    self.live.api_key_env
                )
            })
    }

    pub fn live_config(&self, api_key: String) -> LiveConfig {
        LiveConfig {
            endpoint: self.live.endpoint.clone(),
            api_key,
            model: self.live.model.clone(),
            voice: self.live.voice.clone(),
            system_instruction: self.live.system_instruction.clone(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            input_sample_rate: self.audio.input_sample_rate,
            frame_size: self.audio.frame_size,
            output_sample_rate: self.audio.output_sample_rate,
            output_channels: self.audio.output_channels,
            ..SessionConfig::default()
        }
    }
}
