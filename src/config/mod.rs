mod scenes;

pub use scenes::{default_scenes, SceneConfig, DEFAULT_SCENE};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::classifier::ExtractionMode;

const ENABLE_LOGS: bool = true;
use crate::{log_info, log_warn};

/// Environment variable naming an alternate config file.
pub const CONFIG_PATH_ENV: &str = "STUDY_MONITOR_CONFIG";
/// Default environment variable holding the classifier API key.
pub const DEFAULT_API_KEY_ENV: &str = "STUDY_MONITOR_API_KEY";
/// Placeholder in the capture command replaced by the output JPEG path.
pub const PATH_PLACEHOLDER: &str = "{path}";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("no scenes configured")]
    NoScenes,
    #[error("scene names must not be empty")]
    EmptySceneName,
    #[error("scene `{0}` is defined more than once")]
    DuplicateScene(String),
    #[error("scene `{0}` has a zero interval")]
    ZeroInterval(String),
    #[error("unknown scene `{0}`")]
    UnknownScene(String),
    #[error("jpeg quality must be within 1..=100, got {0}")]
    InvalidQuality(u8),
    #[error("capture command is empty")]
    EmptyCaptureCommand,
    #[error("api.timeout_secs must be greater than zero")]
    ZeroTimeout,
    #[error("monitor.error_backoff_secs must be greater than zero")]
    ZeroBackoff,
    #[error("API key missing; set the {0} environment variable")]
    MissingApiKey(String),
}

/// Remote classifier endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub model: String,
    /// Name of the environment variable the key is read from.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub extraction: ExtractionMode,
    /// Never read from or written to the config file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "https://dashscope.aliyuncs.com/api/v1/services/aigc/multimodal-generation/generation"
                .into(),
            model: "qwen-vl-max".into(),
            api_key_env: DEFAULT_API_KEY_ENV.into(),
            timeout_secs: 60,
            extraction: ExtractionMode::default(),
            api_key: None,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingApiKey(self.api_key_env.clone()))
    }
}

/// How captured frames are shrunk before upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub compress: bool,
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            compress: true,
            max_width: 800,
            max_height: 600,
            jpeg_quality: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Program and arguments; `{path}` is replaced with the output file.
    pub command: Vec<String>,
    /// Fixed output path. A fresh temp file is used per capture when unset.
    pub output_path: Option<PathBuf>,
    pub wait_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: default_capture_command(),
            output_path: None,
            wait_secs: 5,
        }
    }
}

impl CaptureConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

#[cfg(target_os = "android")]
fn default_capture_command() -> Vec<String> {
    vec!["termux-camera-photo".into(), PATH_PLACEHOLDER.into()]
}

#[cfg(not(target_os = "android"))]
fn default_capture_command() -> Vec<String> {
    ["fswebcam", "--no-banner", "-r", "800x600", PATH_PLACEHOLDER]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub default_scene: String,
    pub error_backoff_secs: u64,
    /// Per-request API price used for the cost estimate.
    pub cost_per_check: f64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            default_scene: DEFAULT_SCENE.into(),
            error_backoff_secs: 10,
            cost_per_check: 0.0005,
        }
    }
}

impl LoopConfig {
    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

/// Startup configuration. Built once and handed to the components by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub api: ApiConfig,
    pub image: ImageConfig,
    pub capture: CaptureConfig,
    pub monitor: LoopConfig,
    pub scenes: Vec<SceneConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            image: ImageConfig::default(),
            capture: CaptureConfig::default(),
            monitor: LoopConfig::default(),
            scenes: default_scenes(),
        }
    }
}

impl MonitorConfig {
    /// Load from `path` when given and present; defaults otherwise.
    ///
    /// A file that exists but does not parse is an error rather than a silent
    /// fallback.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                let config = Self::from_json_str(&contents)
                    .with_context(|| format!("Invalid config in {}", path.display()))?;
                log_info!("Loaded config from {}", path.display());
                config
            }
            Some(path) => {
                log_warn!("Config {} not found; using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Fill `api.api_key` from the configured environment variable.
    pub fn with_api_key_from_env(mut self) -> Self {
        self.api.api_key = std::env::var(&self.api.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        self
    }

    pub fn scene(&self, name: &str) -> Result<&SceneConfig, ConfigError> {
        self.scenes
            .iter()
            .find(|scene| scene.name == name)
            .ok_or_else(|| ConfigError::UnknownScene(name.to_string()))
    }

    pub fn default_scene(&self) -> Result<&SceneConfig, ConfigError> {
        self.scene(&self.monitor.default_scene)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scenes.is_empty() {
            return Err(ConfigError::NoScenes);
        }
        let mut seen = HashSet::new();
        for scene in &self.scenes {
            if scene.name.trim().is_empty() {
                return Err(ConfigError::EmptySceneName);
            }
            if !seen.insert(scene.name.as_str()) {
                return Err(ConfigError::DuplicateScene(scene.name.clone()));
            }
            if scene.interval_secs == 0 {
                return Err(ConfigError::ZeroInterval(scene.name.clone()));
            }
        }
        self.default_scene()?;
        if !(1..=100).contains(&self.image.jpeg_quality) {
            return Err(ConfigError::InvalidQuality(self.image.jpeg_quality));
        }
        if self.capture.command.is_empty() {
            return Err(ConfigError::EmptyCaptureCommand);
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.monitor.error_backoff_secs == 0 {
            return Err(ConfigError::ZeroBackoff);
        }
        Ok(())
    }
}
