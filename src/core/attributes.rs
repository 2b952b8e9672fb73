use crate::common::{Config, FaceCheckError, Result};
use crate::core::detector::FaceBox;
use crate::core::recognizer::crop_face;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeAction {
    Age,
    Gender,
    Race,
    Emotion,
}

pub const ALL_ACTIONS: [AttributeAction; 4] = [
    AttributeAction::Age,
    AttributeAction::Gender,
    AttributeAction::Race,
    AttributeAction::Emotion,
];

const GENDER_LABELS: [&str; 2] = ["Woman", "Man"];
const RACE_LABELS: [&str; 6] = [
    "asian",
    "indian",
    "black",
    "white",
    "middle eastern",
    "latino hispanic",
];
const EMOTION_LABELS: [&str; 7] = [
    "angry",
    "disgust",
    "fear",
    "happy",
    "sad",
    "surprise",
    "neutral",
];

#[derive(Debug, Clone, Serialize)]
pub struct Label {
    pub label: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AttributeReport {
    pub age: Option<f32>,
    pub gender: Option<Label>,
    pub race: Option<Label>,
    pub emotion: Option<Label>,
}

impl fmt::Display for AttributeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(age) = self.age {
            parts.push(format!("age: {:.0}", age));
        }
        if let Some(ref gender) = self.gender {
            parts.push(format!("gender: {} ({:.2})", gender.label, gender.confidence));
        }
        if let Some(ref race) = self.race {
            parts.push(format!("race: {} ({:.2})", race.label, race.confidence));
        }
        if let Some(ref emotion) = self.emotion {
            parts.push(format!("emotion: {} ({:.2})", emotion.label, emotion.confidence));
        }
        if parts.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Facial-attribute analyzer. One session per configured action; actions
/// without a configured model are skipped with a warning rather than
/// failing the whole analyze call.
pub struct AttributeAnalyzer {
    age: Option<Session>,
    gender: Option<Session>,
    race: Option<Session>,
    emotion: Option<Session>,
    _environment: Arc<Environment>,
    input_size: u32,
}

impl AttributeAnalyzer {
    pub fn new(config: &Config) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("attributes")
                .build()
                .map_err(|e| FaceCheckError::Model(format!("Failed to create environment: {}", e)))?,
        );

        let load = |model: &Option<std::path::PathBuf>| -> Result<Option<Session>> {
            let Some(model) = model else { return Ok(None) };
            let path = config.models.resolve(model);
            if !path.exists() {
                return Err(FaceCheckError::Model(format!(
                    "Attribute model not found at: {:?}",
                    path
                )));
            }
            let mut session_builder = SessionBuilder::new(&environment)?;
            let opt_level = match config.performance.optimization_level {
                0 => GraphOptimizationLevel::Disable,
                1 => GraphOptimizationLevel::Level1,
                2 => GraphOptimizationLevel::Level2,
                _ => GraphOptimizationLevel::Level3,
            };
            session_builder = session_builder.with_optimization_level(opt_level)?;
            Ok(Some(session_builder.with_model_from_file(path)?))
        };

        Ok(Self {
            age: load(&config.attributes.age_model)?,
            gender: load(&config.attributes.gender_model)?,
            race: load(&config.attributes.race_model)?,
            emotion: load(&config.attributes.emotion_model)?,
            _environment: environment,
            input_size: config.attributes.input_size,
        })
    }

    pub fn analyze(
        &self,
        image: &DynamicImage,
        face: &FaceBox,
        actions: &[AttributeAction],
    ) -> Result<AttributeReport> {
        let crop = crop_face(image, face);
        let resized = crop.resize_exact(self.input_size, self.input_size, FilterType::Triangle);
        let input = self.preprocess(&resized);

        let mut report = AttributeReport::default();
        for action in actions {
            match action {
                AttributeAction::Age => {
                    if let Some(session) = &self.age {
                        let scores = run_scores(session, &input)?;
                        report.age = Some(age_from_scores(&scores));
                    } else {
                        tracing::warn!("No age model configured, skipping age analysis");
                    }
                }
                AttributeAction::Gender => {
                    if let Some(session) = &self.gender {
                        let scores = run_scores(session, &input)?;
                        report.gender = argmax_label(&scores, &GENDER_LABELS);
                    } else {
                        tracing::warn!("No gender model configured, skipping gender analysis");
                    }
                }
                AttributeAction::Race => {
                    if let Some(session) = &self.race {
                        let scores = run_scores(session, &input)?;
                        report.race = argmax_label(&scores, &RACE_LABELS);
                    } else {
                        tracing::warn!("No race model configured, skipping race analysis");
                    }
                }
                AttributeAction::Emotion => {
                    if let Some(session) = &self.emotion {
                        let scores = run_scores(session, &input)?;
                        report.emotion = argmax_label(&scores, &EMOTION_LABELS);
                    } else {
                        tracing::warn!("No emotion model configured, skipping emotion analysis");
                    }
                }
            }
        }

        Ok(report)
    }

    fn preprocess(&self, img: &DynamicImage) -> Array4<f32> {
        let rgb = img.to_rgb8();
        let size = self.input_size as usize;
        let mut array = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            array[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            array[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }
        array
    }
}

fn run_scores(session: &Session, input: &Array4<f32>) -> Result<Vec<f32>> {
    let cow_array = CowArray::from(input.clone().into_dyn());
    let input_tensor = Value::from_array(session.allocator(), &cow_array)?;
    let outputs = session.run(vec![input_tensor])?;
    let scores = outputs[0].try_extract::<f32>()?.view().to_owned().into_raw_vec();
    Ok(scores)
}

/// Age heads are either a single regression value or a softmax over year
/// bins; for bins the expected value is reported.
pub(crate) fn age_from_scores(scores: &[f32]) -> f32 {
    if scores.len() == 1 {
        return scores[0];
    }
    let probs = crate::core::liveness::softmax(scores);
    probs
        .iter()
        .enumerate()
        .map(|(i, p)| i as f32 * p)
        .sum()
}

pub(crate) fn argmax_label(scores: &[f32], labels: &[&str]) -> Option<Label> {
    let probs = crate::core::liveness::softmax(scores);
    probs
        .iter()
        .take(labels.len())
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, &p)| Label {
            label: labels[i].to_string(),
            confidence: p,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_value_age_is_passed_through() {
        assert_eq!(age_from_scores(&[31.4]), 31.4);
    }

    #[test]
    fn binned_age_is_expected_value() {
        // All mass on bin 30
        let mut scores = vec![-50.0f32; 101];
        scores[30] = 50.0;
        let age = age_from_scores(&scores);
        assert!((age - 30.0).abs() < 0.5);
    }

    #[test]
    fn argmax_label_picks_strongest_class() {
        let label = argmax_label(&[0.1, 5.0], &GENDER_LABELS).unwrap();
        assert_eq!(label.label, "Man");
        assert!(label.confidence > 0.9);
    }

    #[test]
    fn argmax_label_empty_scores_is_none() {
        assert!(argmax_label(&[], &GENDER_LABELS).is_none());
    }

    #[test]
    fn report_display_lists_present_fields() {
        let report = AttributeReport {
            age: Some(31.0),
            gender: Some(Label { label: "Man".into(), confidence: 0.98 }),
            race: None,
            emotion: Some(Label { label: "happy".into(), confidence: 0.77 }),
        };
        let text = report.to_string();
        assert!(text.contains("age: 31"));
        assert!(text.contains("gender: Man (0.98)"));
        assert!(text.contains("emotion: happy (0.77)"));
        assert!(!text.contains("race"));
    }

    #[test]
    fn empty_report_displays_none() {
        assert_eq!(AttributeReport::default().to_string(), "none");
    }
}
