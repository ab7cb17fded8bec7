use crate::error::{Result, VidqueryError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default Gemini model used for both chat and structured calls.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";

/// Sampling settings applied to every model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub candidate_count: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            candidate_count: 1,
            temperature: 1.1,
            top_k: 65,
            top_p: 0.95,
            max_output_tokens: 4096,
        }
    }
}

/// How to wait for an uploaded video to leave the `PROCESSING` state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPollSettings {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub backoff_multiplier: f64,
    /// `None` polls forever.
    pub timeout_secs: Option<u64>,
}

impl Default for UploadPollSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1000,
            max_interval_ms: 16_000,
            backoff_multiplier: 2.0,
            timeout_secs: Some(600),
        }
    }
}

impl UploadPollSettings {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Interval to sleep after `current`, grown by the multiplier and capped.
    pub fn next_interval(&self, current: Duration) -> Duration {
        current
            .mul_f64(self.backoff_multiplier)
            .min(self.max_interval().max(self.initial_interval()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub model: String,
    pub max_retries: u32,
    pub staging_dir: PathBuf,
    pub clip_dir: Option<PathBuf>,
    pub generation: GenerationSettings,
    pub upload_poll: UploadPollSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_retries: 3,
            staging_dir: PathBuf::from(".assets"),
            clip_dir: None,
            generation: GenerationSettings::default(),
            upload_poll: UploadPollSettings::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    VidqueryError::Config(format!("{}: {}", config_path.display(), e))
                })?;
            }
        }

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override fields from environment variables looked up through `var`.
    fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var("GEMINI_API_KEY").or_else(|| var("GOOGLE_API_KEY")) {
            self.gemini_api_key = Some(key);
        }
        if let Some(model) = var("VIDQUERY_MODEL") {
            self.model = model;
        }
        if let Some(retries) = var("VIDQUERY_MAX_RETRIES") {
            if let Ok(r) = retries.parse() {
                self.max_retries = r;
            }
        }
        if let Some(dir) = var("VIDQUERY_STAGING_DIR") {
            self.staging_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gemini_api_key.as_deref().map_or(true, str::is_empty) {
            return Err(VidqueryError::Config(
                "GEMINI_API_KEY not set. Get one at https://aistudio.google.com/apikey"
                    .to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(VidqueryError::Config(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        if self.upload_poll.backoff_multiplier < 1.0 {
            return Err(VidqueryError::Config(
                "upload_poll.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vidquery").join("config.toml"))
    }
}
