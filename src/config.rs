use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::debug;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u8,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u8 {
    1
}

fn default_temp_dir() -> String {
    std::env::temp_dir()
        .join("banter")
        .to_string_lossy()
        .to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            temp_dir: default_temp_dir(),
        }
    }
}

/// Timing knobs for one-shot phrase capture. The defaults match the
/// listening behavior users expect from a push-button voice input: half a
/// second of ambient calibration, five seconds to start talking, at most
/// ten seconds of phrase.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default = "default_calibration_ms")]
    pub calibration_ms: u64,
    #[serde(default = "default_listen_timeout_secs")]
    pub listen_timeout_secs: u64,
    #[serde(default = "default_max_phrase_secs")]
    pub max_phrase_secs: u64,
    /// Silence this long after speech ends the phrase early.
    #[serde(default = "default_trailing_silence_ms")]
    pub trailing_silence_ms: u64,
}

fn default_calibration_ms() -> u64 {
    500
}

fn default_listen_timeout_secs() -> u64 {
    5
}

fn default_max_phrase_secs() -> u64 {
    10
}

fn default_trailing_silence_ms() -> u64 {
    800
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            calibration_ms: default_calibration_ms(),
            listen_timeout_secs: default_listen_timeout_secs(),
            max_phrase_secs: default_max_phrase_secs(),
            trailing_silence_ms: default_trailing_silence_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscriptionConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
    #[serde(default = "default_language")]
    pub language: Option<String>,
    #[serde(default)]
    pub threads: Option<u32>,
}

fn default_model() -> String {
    "base".to_string()
}

fn default_language() -> Option<String> {
    Some("en".to_string())
}

fn default_models_dir() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|h| std::path::PathBuf::from(h).join(".local/share"))
                .unwrap_or_else(|_| std::path::PathBuf::from("/tmp"))
        })
        .join("banter/models")
        .to_string_lossy()
        .to_string()
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            models_dir: default_models_dir(),
            language: default_language(),
            threads: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generation_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_generation_endpoint() -> String {
    "http://localhost:11434/v1/completions".to_string()
}

fn default_generation_model() -> String {
    "llama3".to_string()
}

fn default_max_tokens() -> u32 {
    100
}

fn default_temperature() -> f32 {
    0.7
}

fn default_generation_timeout_ms() -> u64 {
    30000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            api_key: String::new(),
            model: default_generation_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_ms: default_generation_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEngine {
    #[default]
    Auto,
    Piper,
    Espeak,
}

impl std::fmt::Display for SpeechEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeechEngine::Auto => write!(f, "auto"),
            SpeechEngine::Piper => write!(f, "piper"),
            SpeechEngine::Espeak => write!(f, "espeak"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeechConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub engine: SpeechEngine,
    /// Path to a piper voice model (.onnx). Required for the piper engine.
    #[serde(default)]
    pub piper_voice: Option<String>,
    /// Words per minute for espeak-ng.
    #[serde(default = "default_speech_rate")]
    pub rate: u32,
}

fn default_true() -> bool {
    true
}

fn default_speech_rate() -> u32 {
    150
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: SpeechEngine::Auto,
            piper_voice: None,
            rate: default_speech_rate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: i32,
    #[serde(default = "default_window_height")]
    pub height: i32,
}

fn default_window_width() -> i32 {
    800
}

fn default_window_height() -> i32 {
    600
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        Self::validate_config_path(path)?;

        if !path.exists() {
            debug!("Config file not found at {:?}, creating default", path);
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        use crate::error::BanterError;

        if self.audio.sample_rate == 0 {
            return Err(
                BanterError::Config("sample_rate must be greater than 0".to_string()).into(),
            );
        }
        if self.audio.channels == 0 {
            return Err(BanterError::Config("channels must be greater than 0".to_string()).into());
        }
        if self.audio.temp_dir.contains("..") {
            return Err(BanterError::Config(
                "temp_dir cannot contain path traversal sequences".to_string(),
            )
            .into());
        }

        if self.capture.listen_timeout_secs == 0 {
            return Err(BanterError::Config(
                "listen_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }
        if self.capture.max_phrase_secs == 0 {
            return Err(BanterError::Config(
                "max_phrase_secs must be greater than 0".to_string(),
            )
            .into());
        }
        if self.capture.calibration_ms > 5000 {
            return Err(
                BanterError::Config("calibration_ms cannot exceed 5000ms".to_string()).into(),
            );
        }

        if self.generation.endpoint.is_empty() {
            return Err(
                BanterError::Config("generation endpoint cannot be empty".to_string()).into(),
            );
        }
        if self.generation.model.is_empty() {
            return Err(BanterError::Config("generation model cannot be empty".to_string()).into());
        }
        if self.generation.max_tokens == 0 {
            return Err(
                BanterError::Config("max_tokens must be greater than 0".to_string()).into(),
            );
        }
        if self.generation.timeout_ms < 1000 || self.generation.timeout_ms > 300_000 {
            return Err(BanterError::Config(
                "generation timeout_ms must be between 1000 and 300000".to_string(),
            )
            .into());
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(BanterError::Config(
                "temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.speech.rate < 80 || self.speech.rate > 450 {
            return Err(BanterError::Config(
                "speech rate must be between 80 and 450 words per minute".to_string(),
            )
            .into());
        }

        if self.window.width < 400 || self.window.width > 4000 {
            return Err(BanterError::Config(
                "window width must be between 400 and 4000".to_string(),
            )
            .into());
        }
        if self.window.height < 300 || self.window.height > 4000 {
            return Err(BanterError::Config(
                "window height must be between 300 and 4000".to_string(),
            )
            .into());
        }

        Ok(())
    }

    fn validate_config_path(path: &Path) -> Result<()> {
        use crate::error::BanterError;

        let path_str = path.to_string_lossy();
        if path_str.contains("..") {
            return Err(BanterError::Config(
                "Config path cannot contain path traversal sequences".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.capture.calibration_ms, 500);
        assert_eq!(config.capture.listen_timeout_secs, 5);
        assert_eq!(config.capture.max_phrase_secs, 10);
        assert_eq!(config.generation.max_tokens, 100);
        assert_eq!(config.speech.rate, 150);
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
    }

    #[tokio::test]
    async fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        let config = Config::default();
        config.save(&config_path).await.unwrap();

        let loaded = Config::load(&config_path).await.unwrap();
        assert_eq!(loaded.audio.sample_rate, config.audio.sample_rate);
        assert_eq!(loaded.generation.model, config.generation.model);
        assert_eq!(loaded.speech.rate, config.speech.rate);
    }

    #[tokio::test]
    async fn test_config_load_creates_default() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("missing.toml");

        let config = Config::load(&config_path).await.unwrap();
        assert!(config_path.exists());
        assert_eq!(config.generation.max_tokens, 100);
    }

    #[tokio::test]
    async fn test_config_validation_invalid_sample_rate() {
        let mut config = Config::default();
        config.audio.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_validation_zero_listen_timeout() {
        let mut config = Config::default();
        config.capture.listen_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_validation_path_traversal() {
        let mut config = Config::default();
        config.audio.temp_dir = "/tmp/../etc".to_string();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_validation_empty_generation_endpoint() {
        let mut config = Config::default();
        config.generation.endpoint = String::new();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_validation_generation_timeout_bounds() {
        let mut config = Config::default();
        config.generation.timeout_ms = 500;
        assert!(config.validate().is_err());

        config.generation.timeout_ms = 400_000;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_validation_speech_rate_bounds() {
        let mut config = Config::default();
        config.speech.rate = 40;
        assert!(config.validate().is_err());

        config.speech.rate = 500;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_validation_window_bounds() {
        let mut config = Config::default();
        config.window.width = 100;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_validation_valid_values() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_speech_engine_display() {
        assert_eq!(SpeechEngine::Auto.to_string(), "auto");
        assert_eq!(SpeechEngine::Piper.to_string(), "piper");
        assert_eq!(SpeechEngine::Espeak.to_string(), "espeak");
    }

    #[test]
    fn test_speech_engine_toml_roundtrip() {
        let config = SpeechConfig {
            enabled: true,
            engine: SpeechEngine::Piper,
            piper_voice: Some("/opt/voices/en_US-amy-medium.onnx".to_string()),
            rate: 150,
        };
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("engine = \"piper\""));
        let back: SpeechConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.engine, SpeechEngine::Piper);
    }
}
