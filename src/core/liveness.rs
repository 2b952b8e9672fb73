use crate::common::config::SpoofModelConfig;
use crate::common::{Config, FaceCheckError, Result};
use crate::core::detector::FaceBox;
use crate::core::recognizer::crop_face;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct LivenessScore {
    pub is_real: bool,
    pub score: f32,
}

/// Presentation-attack classifier for one liveness model. MiniFASNet-style
/// heads emit `[spoof-print, real, spoof-replay]` class logits; two-class
/// heads emit `[spoof, real]`. Index 1 is the real class either way.
pub struct LivenessClassifier {
    session: Session,
    _environment: Arc<Environment>,
    model: SpoofModelConfig,
    real_threshold: f32,
}

impl LivenessClassifier {
    pub fn new(config: &Config, model_name: &str) -> Result<Self> {
        let model = config
            .sweep
            .spoof_model(model_name)
            .ok_or_else(|| FaceCheckError::UnknownModel(model_name.to_string()))?
            .clone();

        let model_path = config.models.resolve(&model.model);
        if !model_path.exists() {
            return Err(FaceCheckError::Model(format!(
                "Liveness model '{}' not found at: {:?}",
                model.name, model_path
            )));
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name("liveness")
                .build()
                .map_err(|e| FaceCheckError::Model(format!("Failed to create environment: {}", e)))?,
        );

        let mut session_builder = SessionBuilder::new(&environment)?;
        let opt_level = match config.performance.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };
        session_builder = session_builder.with_optimization_level(opt_level)?;
        let session = session_builder.with_model_from_file(model_path)?;

        Ok(Self {
            session,
            _environment: environment,
            model,
            real_threshold: config.liveness.real_threshold,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model.name
    }

    pub fn classify(&self, image: &DynamicImage, face: &FaceBox) -> Result<LivenessScore> {
        let crop = crop_face(image, face);
        let resized = crop.resize_exact(
            self.model.input_size,
            self.model.input_size,
            FilterType::Triangle,
        );

        let rgb = resized.to_rgb8();
        let size = self.model.input_size as usize;
        let mut array = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            array[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            array[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        let cow_array = CowArray::from(array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let logits = outputs[0].try_extract::<f32>()?.view().to_owned().into_raw_vec();
        if logits.len() < 2 {
            return Err(FaceCheckError::Model(format!(
                "Liveness model '{}' returned {} class scores, expected at least 2",
                self.model.name,
                logits.len()
            )));
        }

        let probs = softmax(&logits);
        let score = probs[1];
        Ok(LivenessScore {
            is_real: score >= self.real_threshold,
            score,
        })
    }
}

pub(crate) fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|&e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn softmax_ranks_largest_logit_highest() {
        let probs = softmax(&[0.1, 3.0, -1.0]);
        assert!(probs[1] > probs[0]);
        assert!(probs[1] > probs[2]);
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        let probs = softmax(&[1000.0, 1001.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!(probs[1] > probs[0]);
    }
}
