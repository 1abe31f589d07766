use crate::common::error::{FacesError, Result};
use crate::common::paths::{default_registry_path, expand_home};
use crate::core::types::Identity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub identifier: IdentifierConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { path: default_registry_path() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_model")]
    pub model_path: PathBuf,
    /// Handed to the detector; faces below this confidence are dropped.
    #[serde(default = "default_probability_threshold")]
    pub probability_threshold: f32,
    #[serde(default = "default_input_size")]
    pub input_width: u32,
    #[serde(default = "default_input_size")]
    pub input_height: u32,
    #[serde(default = "default_patch_size")]
    pub patch_size: u32,
    #[serde(default = "default_max_faces")]
    pub max_faces: usize,
}

fn default_detector_model() -> PathBuf {
    PathBuf::from("models/face_detector.onnx")
}
fn default_probability_threshold() -> f32 { 0.9 }
fn default_input_size() -> u32 { 640 }
fn default_patch_size() -> u32 { 160 }
fn default_max_faces() -> usize { 10 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_detector_model(),
            probability_threshold: default_probability_threshold(),
            input_width: default_input_size(),
            input_height: default_input_size(),
            patch_size: default_patch_size(),
            max_faces: default_max_faces(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EncoderConfig {
    #[serde(default = "default_encoder_model")]
    pub model_path: PathBuf,
}

fn default_encoder_model() -> PathBuf {
    PathBuf::from("models/face_encoder.onnx")
}
impl Default for EncoderConfig {
    fn default() -> Self {
        Self { model_path: default_encoder_model() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IdentifierConfig {
    /// Largest nearest-neighbour distance still accepted as a match.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,
    /// Reserved label: never trained on, returned when a match is rejected.
    #[serde(default = "default_sentinel")]
    pub sentinel: Identity,
}

fn default_distance_threshold() -> f32 { 1.0 }
fn default_sentinel() -> Identity { Identity::from("Anonymous") }

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            sentinel: default_sentinel(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_optimization_level() -> u32 { 3 }

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { optimization_level: default_optimization_level() }
    }
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FacesError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::debug!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| FacesError::Config(format!("Config parse error: {}", e)))?;

        config.registry.path = expand_home(&config.registry.path);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let probability = self.detector.probability_threshold;
        if !(0.0..=1.0).contains(&probability) {
            return Err(FacesError::Config(format!(
                "Probability threshold must be between 0.0 and 1.0, got {}", probability
            )));
        }

        let distance = self.identifier.distance_threshold;
        if !distance.is_finite() || distance < 0.0 {
            return Err(FacesError::Config(format!(
                "Distance threshold must be a finite non-negative number, got {}", distance
            )));
        }

        if self.identifier.sentinel.as_str().is_empty() {
            return Err(FacesError::Config("Sentinel identity must not be empty".into()));
        }

        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(FacesError::Config(format!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(FacesError::Config(format!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }

        if self.detector.patch_size == 0 || self.detector.patch_size > 1024 {
            return Err(FacesError::Config(format!(
                "Patch size must be between 1 and 1024, got {}",
                self.detector.patch_size
            )));
        }

        Ok(())
    }
}
