use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::db::DEFAULT_FLOOR_DB;
use crate::error::FeatureError;
use crate::render::{ColorMap, RenderOptions, Resolution};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Framing, filterbank and decibel parameters of the extraction engine.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_frame_length")]
    pub frame_length: usize,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
    #[serde(default = "default_n_mels")]
    pub n_mels: usize,
    /// Upper filterbank edge in Hz; Nyquist when unset.
    #[serde(default)]
    pub f_max: Option<f32>,
    #[serde(default = "default_floor_db")]
    pub floor_db: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    #[default]
    Fixed,
    Native,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub mode: ResolutionMode,
    #[serde(default = "default_image_size")]
    pub width: u32,
    #[serde(default = "default_image_size")]
    pub height: u32,
    #[serde(default)]
    pub color_map: ColorMap,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the bearer token, if any.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub public_base_url: Option<String>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            frame_length: default_frame_length(),
            hop_length: default_hop_length(),
            n_mels: default_n_mels(),
            f_max: None,
            floor_db: default_floor_db(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mode: ResolutionMode::default(),
            width: default_image_size(),
            height: default_image_size(),
            color_map: ColorMap::default(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            public_base_url: None,
            history_limit: default_history_limit(),
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.frame_length == 0 {
            return Err(FeatureError::invalid_config("frame", "frame_length must be > 0"));
        }
        if self.hop_length == 0 {
            return Err(FeatureError::invalid_config("frame", "hop_length must be > 0"));
        }
        if self.hop_length > self.frame_length {
            return Err(FeatureError::invalid_config(
                "frame",
                format!(
                    "hop_length {} exceeds frame_length {}",
                    self.hop_length, self.frame_length
                ),
            ));
        }
        if self.n_mels == 0 {
            return Err(FeatureError::invalid_config("mel", "n_mels must be > 0"));
        }
        if let Some(f_max) = self.f_max {
            if !(f_max.is_finite() && f_max > 0.0) {
                return Err(FeatureError::invalid_config(
                    "mel",
                    format!("f_max must be a positive frequency, got {f_max}"),
                ));
            }
        }
        if !(self.floor_db.is_finite() && self.floor_db < 0.0) {
            return Err(FeatureError::invalid_config(
                "db",
                format!("floor_db must be finite and negative, got {}", self.floor_db),
            ));
        }
        Ok(())
    }

    /// Filterbank upper edge for a recording at `sample_rate`.
    pub fn f_max_for(&self, sample_rate: u32) -> f32 {
        self.f_max.unwrap_or(sample_rate as f32 / 2.0)
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.mode == ResolutionMode::Fixed && (self.width == 0 || self.height == 0) {
            return Err(FeatureError::invalid_config(
                "render",
                format!("fixed output size {}x{} has no pixels", self.width, self.height),
            ));
        }
        Ok(())
    }

    pub fn options(&self) -> RenderOptions {
        let resolution = match self.mode {
            ResolutionMode::Native => Resolution::Native,
            ResolutionMode::Fixed => Resolution::Fixed {
                width: self.width,
                height: self.height,
            },
        };
        RenderOptions {
            resolution,
            color_map: self.color_map,
        }
    }
}

impl StorageConfig {
    /// Configured root, or the platform data directory.
    pub fn resolved_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }
        let base = dirs::data_dir()
            .context("Could not determine a data directory; set storage.root")?;
        Ok(base.join("respiro"))
    }
}

fn default_frame_length() -> usize { 2048 }
fn default_hop_length() -> usize { 512 }
fn default_n_mels() -> usize { 128 }
fn default_floor_db() -> f32 { DEFAULT_FLOOR_DB }
fn default_image_size() -> u32 { 400 }
fn default_token_env() -> String { "RESPIRO_INFERENCE_TOKEN".into() }
fn default_timeout_secs() -> u64 { 30 }
fn default_history_limit() -> usize { 20 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

/// `./respiro.toml`, then `~/.config/respiro/config.toml`, then the platform
/// config directory.
pub fn discover_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("respiro.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("respiro").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("respiro").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
