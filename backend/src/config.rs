use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::inference::heuristic::{HeuristicBackend, HeuristicPolicy, TextureThresholds};
use crate::inference::model::InputLayout;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub version: f32,
    pub image: ImageConfig,
    pub video: VideoConfig,
    pub heuristic: HeuristicConfig,
    pub model: ModelConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub resize_method: ResizeMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMethod {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl ResizeMethod {
    pub fn filter(self) -> FilterType {
        match self {
            ResizeMethod::Nearest => FilterType::Nearest,
            ResizeMethod::Triangle => FilterType::Triangle,
            ResizeMethod::CatmullRom => FilterType::CatmullRom,
            ResizeMethod::Gaussian => FilterType::Gaussian,
            ResizeMethod::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub default_stride: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    pub policy: HeuristicPolicy,
    pub low_std: f64,
    pub high_std: f64,
    pub low_score: f64,
    pub high_score: f64,
    pub photographic_bonus: f64,
    pub photographic_mean: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub input_layout: InputLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1.0,
            image: ImageConfig::default(),
            video: VideoConfig::default(),
            heuristic: HeuristicConfig::default(),
            model: ModelConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            resize_method: ResizeMethod::CatmullRom,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            default_stride: crate::inference::frames::DEFAULT_STRIDE,
        }
    }
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        let thresholds = TextureThresholds::default();
        Self {
            policy: HeuristicPolicy::VarianceTexture,
            low_std: thresholds.low_std,
            high_std: thresholds.high_std,
            low_score: thresholds.low_score,
            high_score: thresholds.high_score,
            photographic_bonus: thresholds.photographic_bonus,
            photographic_mean: thresholds.photographic_mean,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/model.pt"),
            input_layout: InputLayout::Nhwc,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// Loads the YAML config (or defaults when the file is absent) and applies
    /// `MODEL_PATH` / `PORT` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_path();
        let mut config = if config_path.exists() {
            log::info!("Loading engine config from {}", config_path.display());
            Self::from_path(&config_path)?
        } else {
            log::info!(
                "No engine config at {}, using built-in defaults",
                config_path.display()
            );
            Self::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&config_str)
    }

    pub fn from_yaml_str(config_str: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("DEEPSHIELD_CONFIG") {
            return PathBuf::from(path);
        }
        match std::env::var("CARGO_MANIFEST_DIR") {
            Ok(manifest_dir) => PathBuf::from(format!("{}/../config/engine.yaml", manifest_dir)),
            Err(_) => PathBuf::from("config/engine.yaml"),
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(model_path) = std::env::var("MODEL_PATH") {
            self.model.path = PathBuf::from(model_path);
        }
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a valid port: {}", port)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let h = &self.heuristic;
        if h.low_std.is_nan() || h.high_std.is_nan() || h.low_std < 0.0 || h.low_std >= h.high_std
        {
            return Err(ConfigError::Invalid(format!(
                "heuristic.low_std ({}) must be non-negative and below heuristic.high_std ({})",
                h.low_std, h.high_std
            )));
        }
        for (name, score) in [("low_score", h.low_score), ("high_score", h.high_score)] {
            if !(0.0..=1.0).contains(&score) {
                return Err(ConfigError::Invalid(format!(
                    "heuristic.{} must be within [0, 1], got {}",
                    name, score
                )));
            }
        }
        if h.photographic_bonus.is_nan() || h.photographic_bonus < 0.0 {
            return Err(ConfigError::Invalid(
                "heuristic.photographic_bonus must be non-negative".into(),
            ));
        }
        if h.photographic_mean[0] > h.photographic_mean[1] {
            return Err(ConfigError::Invalid(
                "heuristic.photographic_mean must be an ordered [min, max] pair".into(),
            ));
        }
        if self.video.default_stride == 0 {
            return Err(ConfigError::Invalid("video.default_stride must be at least 1".into()));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("server.max_upload_bytes must be positive".into()));
        }
        Ok(())
    }

    pub fn to_heuristic_backend(&self) -> HeuristicBackend {
        let h = &self.heuristic;
        HeuristicBackend::new(
            h.policy,
            TextureThresholds {
                low_std: h.low_std,
                high_std: h.high_std,
                low_score: h.low_score,
                high_score: h.high_score,
                photographic_bonus: h.photographic_bonus,
                photographic_mean: h.photographic_mean,
            },
        )
    }
}
