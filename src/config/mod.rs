use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adapters::Sampling;
use crate::audio::DEFAULT_CHUNK_SIZE;
use crate::cache::{CURRENT_VERSION, DEFAULT_TTL};
use crate::content::{MAX_AUDIO_SIZE, MAX_FILE_SIZE};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Inference API settings
    pub inference: InferenceConfig,

    /// Size and time limits enforced before and during processing
    pub limits: LimitsConfig,

    /// Result cache settings
    pub cache: CacheConfig,

    /// Remote quota store (processing is not quota-gated when absent)
    pub quota: Option<QuotaConfig>,

    /// Audio post-processing settings
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    /// API key (the ACCESSIFY_API_KEY environment variable takes precedence)
    pub api_key: Option<String>,

    /// Speech-to-text model
    pub transcription_model: String,

    /// Text-to-speech model
    pub speech_model: String,

    /// Voice used for narration
    pub voice: String,

    /// Model used for image captioning and questions
    pub vision_model: String,

    /// Model used for PDF parsing
    pub document_model: String,

    /// Model used for plain-language rewriting
    pub text_model: String,

    /// Sampling temperature for generative requests
    pub temperature: f32,

    /// Upper bound on generated tokens per request
    pub max_tokens: u32,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted payload in bytes
    pub max_file_size: u64,

    /// Largest accepted audio payload in bytes
    pub max_audio_size: u64,

    /// Audio segment size in bytes for chunked transcription
    pub chunk_size: usize,

    /// Wall-clock budget for one processing session in milliseconds
    pub processing_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the result cache
    pub enabled: bool,

    /// Cache directory (defaults to the platform cache dir)
    pub directory: Option<PathBuf>,

    /// Entry lifetime in seconds
    pub ttl_secs: u64,

    /// Schema version; entries written under another version are discarded
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Base URL of the data API
    pub base_url: String,

    /// API key (the ACCESSIFY_QUOTA_KEY environment variable takes precedence)
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Narrate transcripts with text-to-speech
    pub synthesize: bool,

    /// ffprobe binary used to measure duration
    pub ffprobe_path: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            transcription_model: "whisper-1".to_string(),
            speech_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            vision_model: "gpt-4o-mini".to_string(),
            document_model: "gpt-4o-mini".to_string(),
            text_model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
            request_timeout_secs: 60,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            max_audio_size: MAX_AUDIO_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            processing_timeout_ms: 30_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            ttl_secs: DEFAULT_TTL.as_secs(),
            version: CURRENT_VERSION.to_string(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            synthesize: true,
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

impl InferenceConfig {
    pub fn sampling(&self) -> Sampling {
        Sampling {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl LimitsConfig {
    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Configured directory, or `<platform cache dir>/accessify`
    pub fn resolved_directory(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::cache_dir()
                .context("Could not determine cache directory")?
                .join("accessify")),
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            Ok(config)
        }
    }

    /// Load and validate configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("accessify").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.inference.base_url.trim().is_empty() {
            anyhow::bail!("Inference base URL must be configured");
        }

        if self.limits.max_file_size == 0 || self.limits.max_audio_size == 0 {
            anyhow::bail!("Size limits must be greater than zero");
        }

        if self.limits.chunk_size == 0 {
            anyhow::bail!("Audio chunk size must be greater than zero");
        }

        if self.limits.processing_timeout_ms == 0 {
            anyhow::bail!("Processing timeout must be greater than zero");
        }

        if let Some(quota) = &self.quota {
            if quota.base_url.trim().is_empty() {
                anyhow::bail!("Quota store base URL must not be empty");
            }
        }

        Ok(())
    }

    /// API key for the inference service, preferring an explicit override
    pub fn inference_api_key(&self, overridden: Option<&str>) -> Option<String> {
        overridden
            .map(str::to_string)
            .or_else(|| std::env::var("ACCESSIFY_API_KEY").ok())
            .or_else(|| self.inference.api_key.clone())
            .filter(|key| !key.is_empty())
    }

    /// API key for the quota store
    pub fn quota_api_key(&self) -> Option<String> {
        std::env::var("ACCESSIFY_QUOTA_KEY")
            .ok()
            .or_else(|| self.quota.as_ref().and_then(|q| q.api_key.clone()))
            .filter(|key| !key.is_empty())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Inference URL: {}", self.inference.base_url);
        println!("  API Key: {}", mask_secret(self.inference.api_key.as_deref()));
        println!("  Transcription Model: {}", self.inference.transcription_model);
        println!("  Speech Model: {} (voice: {})", self.inference.speech_model, self.inference.voice);
        println!("  Vision Model: {}", self.inference.vision_model);
        println!("  Document Model: {}", self.inference.document_model);
        println!("  Text Model: {}", self.inference.text_model);
        println!(
            "  Limits: {} files, {} audio, {} chunks, {} ms timeout",
            crate::utils::format_file_size(self.limits.max_file_size),
            crate::utils::format_file_size(self.limits.max_audio_size),
            crate::utils::format_file_size(self.limits.chunk_size as u64),
            self.limits.processing_timeout_ms
        );
        println!(
            "  Cache: {} (ttl {}s, version {})",
            if self.cache.enabled { "enabled" } else { "disabled" },
            self.cache.ttl_secs,
            self.cache.version
        );
        match &self.quota {
            Some(quota) => println!(
                "  Quota Store: {} (key {})",
                quota.base_url,
                mask_secret(quota.api_key.as_deref())
            ),
            None => println!("  Quota Store: not configured"),
        }
        println!("  Narration: {}", if self.audio.synthesize { "on" } else { "off" });
    }
}

/// Show only the last four characters of a secret
pub fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None | Some("") => "(not set)".to_string(),
        Some(s) if s.chars().count() <= 4 => "****".to_string(),
        Some(s) => {
            let tail: String = s.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            format!("****{}", tail)
        }
    }
}
