use crate::common::error::{FaceCheckError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub attributes: AttributeConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    /// Base directory that relative model paths are resolved against.
    pub base_dir: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { base_dir: PathBuf::from("models") }
    }
}

impl ModelConfig {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            self.base_dir.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

/// Output tensor layout of a detector model. Rows are either
/// `[cx, cy, w, h, conf]` (YOLO family) or `[x1, y1, x2, y2, conf]`
/// (YuNet/SCRFD family).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputLayout {
    Centers,
    Corners,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendConfig {
    pub name: String,
    pub model: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    pub layout: OutputLayout,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpoofModelConfig {
    pub name: String,
    pub model: PathBuf,
    pub input_size: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SweepConfig {
    /// Detector backends tried by the verification sweep, in tie-break order.
    pub backends: Vec<BackendConfig>,
    /// Liveness models tried by the anti-spoofing sweep, in tie-break order.
    pub spoof_models: Vec<SpoofModelConfig>,
    /// Backend used outside the verification sweep: anti-spoofing
    /// extraction, recognition lookup, and attribute analysis.
    #[serde(default = "default_sweep_backend")]
    pub default_backend: String,
}

fn default_sweep_backend() -> String {
    "yunet".to_string()
}

impl Default for SweepConfig {
    fn default() -> Self {
        let backend = |name: &str, model: &str, w: u32, h: u32, layout: OutputLayout| BackendConfig {
            name: name.to_string(),
            model: PathBuf::from(model),
            input_width: w,
            input_height: h,
            layout,
        };
        let spoof = |name: &str, model: &str, size: u32| SpoofModelConfig {
            name: name.to_string(),
            model: PathBuf::from(model),
            input_size: size,
        };
        Self {
            backends: vec![
                backend("yunet", "yunet.onnx", 640, 640, OutputLayout::Corners),
                backend("scrfd", "scrfd_2.5g.onnx", 640, 640, OutputLayout::Corners),
                backend("centerface", "centerface.onnx", 640, 640, OutputLayout::Corners),
                backend("yolov8-face", "yolov8n-face.onnx", 640, 640, OutputLayout::Centers),
                backend("blazeface", "blazeface.onnx", 128, 128, OutputLayout::Centers),
                backend("ultraface", "ultraface-640.onnx", 640, 480, OutputLayout::Corners),
            ],
            spoof_models: vec![
                spoof("minifasnet-v2", "minifasnet_v2.onnx", 80),
                spoof("minifasnet-v1se", "minifasnet_v1se.onnx", 80),
                spoof("deeppix", "deeppix.onnx", 224),
            ],
            default_backend: default_sweep_backend(),
        }
    }
}

impl SweepConfig {
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    pub fn spoof_model(&self, name: &str) -> Option<&SpoofModelConfig> {
        self.spoof_models.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_max_faces")]
    pub max_faces: usize,
}

fn default_detection_confidence() -> f32 { 0.5 }
fn default_iou_threshold() -> f32 { 0.45 }
fn default_max_faces() -> usize { 5 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            detection_confidence: default_detection_confidence(),
            iou_threshold: default_iou_threshold(),
            max_faces: default_max_faces(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    pub model: PathBuf,
    #[serde(default = "default_recognizer_input")]
    pub input_size: u32,
    #[serde(default = "default_normalization_mean")]
    pub normalization_mean: f32,
    #[serde(default = "default_normalization_std")]
    pub normalization_std: f32,
}

fn default_recognizer_input() -> u32 { 112 }
fn default_normalization_mean() -> f32 { 127.5 }
fn default_normalization_std() -> f32 { 127.5 }

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("arcface_r50.onnx"),
            input_size: default_recognizer_input(),
            normalization_mean: default_normalization_mean(),
            normalization_std: default_normalization_std(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerifyConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

fn default_similarity_threshold() -> f32 { 0.68 }

impl Default for VerifyConfig {
    fn default() -> Self {
        Self { similarity_threshold: default_similarity_threshold() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LivenessConfig {
    /// Minimum softmax probability of the real class for a face to count
    /// as live.
    #[serde(default = "default_real_threshold")]
    pub real_threshold: f32,
}

fn default_real_threshold() -> f32 { 0.5 }

impl Default for LivenessConfig {
    fn default() -> Self {
        Self { real_threshold: default_real_threshold() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AttributeConfig {
    pub age_model: Option<PathBuf>,
    pub gender_model: Option<PathBuf>,
    pub race_model: Option<PathBuf>,
    pub emotion_model: Option<PathBuf>,
    #[serde(default = "default_attribute_input")]
    pub input_size: u32,
}

fn default_attribute_input() -> u32 { 224 }

impl Default for AttributeConfig {
    fn default() -> Self {
        Self {
            age_model: Some(PathBuf::from("age_vgg.onnx")),
            gender_model: Some(PathBuf::from("gender_vgg.onnx")),
            race_model: Some(PathBuf::from("race_vgg.onnx")),
            emotion_model: Some(PathBuf::from("emotion_vgg.onnx")),
            input_size: default_attribute_input(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Directory of reference images for the recognition lookup.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    #[serde(default = "default_index_file")]
    pub index_file: String,
}

fn default_database_path() -> PathBuf {
    ProjectDirs::from("com", "facecheck", "FaceCheck")
        .map(|dirs| dirs.data_dir().join("reference_images"))
        .unwrap_or_else(|| PathBuf::from("reference_images"))
}

fn default_match_threshold() -> f32 { 0.55 }
fn default_index_file() -> String { "face_index.bincode".to_string() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            match_threshold: default_match_threshold(),
            index_file: default_index_file(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WorkspaceConfig {
    /// Root for per-request scratch directories. Defaults to the system
    /// temp dir.
    pub root: Option<PathBuf>,
}

impl WorkspaceConfig {
    pub fn resolve_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(std::env::temp_dir)
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
    pub fn load() -> Result<Self> {
        Self::load_from_path(Path::new("configs/facecheck.toml"))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceCheckError::Config(format!(
                "Config file not found: {}. Please create it from the example.",
                path.display()
            )));
        }

        tracing::debug!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| FaceCheckError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep.backends.is_empty() {
            return Err(FaceCheckError::Config(
                "At least one detector backend must be configured".into(),
            ));
        }
        if self.sweep.spoof_models.is_empty() {
            return Err(FaceCheckError::Config(
                "At least one liveness model must be configured".into(),
            ));
        }
        if self.sweep.backend(&self.sweep.default_backend).is_none() {
            return Err(FaceCheckError::Config(format!(
                "Default backend '{}' is not in the configured backend list",
                self.sweep.default_backend
            )));
        }

        for backend in &self.sweep.backends {
            if backend.input_width == 0 || backend.input_width > 4096 {
                return Err(FaceCheckError::Config(format!(
                    "Backend '{}' input width must be between 1 and 4096, got {}",
                    backend.name, backend.input_width
                )));
            }
            if backend.input_height == 0 || backend.input_height > 4096 {
                return Err(FaceCheckError::Config(format!(
                    "Backend '{}' input height must be between 1 and 4096, got {}",
                    backend.name, backend.input_height
                )));
            }
        }

        if self.verify.similarity_threshold < 0.0 || self.verify.similarity_threshold > 1.0 {
            return Err(FaceCheckError::Config(format!(
                "Similarity threshold must be between 0.0 and 1.0, got {}",
                self.verify.similarity_threshold
            )));
        }
        if self.detector.detection_confidence < 0.0 || self.detector.detection_confidence > 1.0 {
            return Err(FaceCheckError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.detection_confidence
            )));
        }
        if self.detector.iou_threshold <= 0.0 || self.detector.iou_threshold > 1.0 {
            return Err(FaceCheckError::Config(format!(
                "IoU threshold must be between 0.0 and 1.0, got {}",
                self.detector.iou_threshold
            )));
        }
        if self.detector.max_faces == 0 {
            return Err(FaceCheckError::Config(
                "max_faces must be at least 1".into(),
            ));
        }
        if self.liveness.real_threshold < 0.0 || self.liveness.real_threshold > 1.0 {
            return Err(FaceCheckError::Config(format!(
                "Liveness real threshold must be between 0.0 and 1.0, got {}",
                self.liveness.real_threshold
            )));
        }
        if self.database.match_threshold < 0.0 || self.database.match_threshold > 1.0 {
            return Err(FaceCheckError::Config(format!(
                "Match threshold must be between 0.0 and 1.0, got {}",
                self.database.match_threshold
            )));
        }
        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(FaceCheckError::Config(format!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_backend_list_rejected() {
        let mut config = Config::default();
        config.sweep.backends.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_spoof_model_list_rejected() {
        let mut config = Config::default();
        config.sweep.spoof_models.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_default_backend_rejected() {
        let mut config = Config::default();
        config.sweep.default_backend = "missing".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut config = Config::default();
        config.verify.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").expect("defaults should parse");
        assert_eq!(config.sweep.default_backend, "yunet");
        assert!(!config.sweep.backends.is_empty());
    }

    #[test]
    fn backend_lookup_by_name() {
        let config = Config::default();
        assert!(config.sweep.backend("yunet").is_some());
        assert!(config.sweep.backend("nope").is_none());
    }

    #[test]
    fn relative_model_paths_resolve_under_base_dir() {
        let models = ModelConfig { base_dir: PathBuf::from("/opt/models") };
        assert_eq!(
            models.resolve(Path::new("yunet.onnx")),
            PathBuf::from("/opt/models/yunet.onnx")
        );
        assert_eq!(
            models.resolve(Path::new("/abs/other.onnx")),
            PathBuf::from("/abs/other.onnx")
        );
    }
}
