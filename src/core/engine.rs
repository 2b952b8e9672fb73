use crate::common::{Config, FaceCheckError, Result};
use crate::core::attributes::{AttributeAction, AttributeAnalyzer, AttributeReport};
use crate::core::detector::{FaceBox, FaceDetector};
use crate::core::liveness::LivenessClassifier;
use crate::core::recognizer::{cosine_similarity, FaceRecognizer};
use crate::storage::face_db::{self, FaceDb, FaceIndex, IndexEntry};
use image::DynamicImage;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Verification {
    pub verified: bool,
    pub similarity: f32,
    pub threshold: f32,
}

/// Axis-aligned bounding rectangle of a detected face, clamped to the
/// source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacialArea {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone)]
pub struct FaceObject {
    pub area: FacialArea,
    pub confidence: f32,
    /// Liveness judgement; present only when anti-spoofing was requested.
    pub is_real: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct DbMatch {
    pub identity: PathBuf,
    pub similarity: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub anti_spoofing: bool,
    /// Liveness model name; falls back to the first configured model.
    pub model: Option<String>,
}

/// The face-analysis contract consumed by the request handlers. Every
/// call is blocking and synchronous; failures come back as errors, never
/// panics. Handlers only ever see this trait, so sweep behavior is
/// testable without any model files.
pub trait FaceEngine {
    /// Compare the faces in two images; detection failure is an error
    /// when `enforce_detection` is set.
    fn verify(
        &self,
        first: &Path,
        second: &Path,
        backend: &str,
        enforce_detection: bool,
    ) -> Result<Verification>;

    /// Detect faces and return one object per face, optionally with a
    /// liveness judgement.
    fn extract_faces(
        &self,
        image: &Path,
        backend: &str,
        enforce_detection: bool,
        options: &ExtractOptions,
    ) -> Result<Vec<FaceObject>>;

    /// Look the probe face up in a reference-image database.
    fn find(&self, image: &Path, database: &Path) -> Result<Vec<DbMatch>>;

    /// Classify facial attributes of the most prominent face.
    fn analyze(&self, image: &Path, actions: &[AttributeAction]) -> Result<AttributeReport>;
}

/// ONNX-backed engine. The recognizer and attribute sessions are loaded
/// once; detectors and liveness classifiers are built per call since the
/// sweeps vary them.
pub struct OnnxEngine {
    config: Config,
    recognizer: FaceRecognizer,
    attributes: AttributeAnalyzer,
}

impl OnnxEngine {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            recognizer: FaceRecognizer::new(config)?,
            attributes: AttributeAnalyzer::new(config)?,
        })
    }

    fn detect_in_file(
        &self,
        path: &Path,
        backend: &str,
        enforce_detection: bool,
    ) -> Result<(DynamicImage, Vec<FaceBox>)> {
        let image = image::open(path)?;
        let detector = FaceDetector::new(&self.config, backend)?;
        let faces = detector.detect(&image)?;
        if enforce_detection && faces.is_empty() {
            return Err(FaceCheckError::NoFaceDetected(path.display().to_string()));
        }
        Ok((image, faces))
    }

    fn best_embedding(&self, path: &Path, backend: &str) -> Result<Vec<f32>> {
        let (image, faces) = self.detect_in_file(path, backend, true)?;
        // Faces come back sorted by confidence
        self.recognizer.get_embedding(&image, &faces[0])
    }

    /// Rebuild the reference-database embedding index. Images in which no
    /// face is found are skipped with a warning. Returns the number of
    /// indexed images.
    pub fn index_database(&self) -> Result<usize> {
        let db = FaceDb::open(&self.config.database.path, &self.config.database.index_file)?;
        let backend = self.config.sweep.default_backend.clone();

        let mut entries = Vec::new();
        for path in db.scan_images()? {
            let identity = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            match self.best_embedding(&path, &backend) {
                Ok(embedding) => entries.push(IndexEntry { identity, embedding }),
                Err(e) => {
                    tracing::warn!("Skipping reference image {}: {}", path.display(), e);
                }
            }
        }

        let count = entries.len();
        db.save(&FaceIndex::new(entries))?;
        tracing::info!("Indexed {} reference images under {}", count, db.root().display());
        Ok(count)
    }
}

impl FaceEngine for OnnxEngine {
    fn verify(
        &self,
        first: &Path,
        second: &Path,
        backend: &str,
        enforce_detection: bool,
    ) -> Result<Verification> {
        let (first_img, first_faces) = self.detect_in_file(first, backend, enforce_detection)?;
        let (second_img, second_faces) = self.detect_in_file(second, backend, enforce_detection)?;

        let (Some(first_face), Some(second_face)) = (first_faces.first(), second_faces.first())
        else {
            // Only reachable without enforcement; nothing to compare
            return Ok(Verification {
                verified: false,
                similarity: 0.0,
                threshold: self.config.verify.similarity_threshold,
            });
        };

        let first_embedding = self.recognizer.get_embedding(&first_img, first_face)?;
        let second_embedding = self.recognizer.get_embedding(&second_img, second_face)?;

        let similarity = cosine_similarity(&first_embedding, &second_embedding);
        let threshold = self.config.verify.similarity_threshold;
        tracing::debug!(backend, similarity, threshold, "verification comparison");

        Ok(Verification {
            verified: similarity >= threshold,
            similarity,
            threshold,
        })
    }

    fn extract_faces(
        &self,
        image: &Path,
        backend: &str,
        enforce_detection: bool,
        options: &ExtractOptions,
    ) -> Result<Vec<FaceObject>> {
        let (img, faces) = self.detect_in_file(image, backend, enforce_detection)?;

        let classifier = if options.anti_spoofing {
            let model_name = match &options.model {
                Some(name) => name.clone(),
                None => self
                    .config
                    .sweep
                    .spoof_models
                    .first()
                    .map(|m| m.name.clone())
                    .ok_or_else(|| {
                        FaceCheckError::Config("No liveness models configured".into())
                    })?,
            };
            Some(LivenessClassifier::new(&self.config, &model_name)?)
        } else {
            None
        };

        let mut objects = Vec::with_capacity(faces.len());
        for face in &faces {
            let is_real = match &classifier {
                Some(classifier) => {
                    let score = classifier.classify(&img, face)?;
                    tracing::debug!(
                        model = classifier.model_name(),
                        score = score.score,
                        "liveness judgement"
                    );
                    Some(score.is_real)
                }
                None => None,
            };
            objects.push(FaceObject {
                area: to_facial_area(face, img.width(), img.height()),
                confidence: face.confidence,
                is_real,
            });
        }

        Ok(objects)
    }

    fn find(&self, image: &Path, database: &Path) -> Result<Vec<DbMatch>> {
        let db = FaceDb::open(database, &self.config.database.index_file)?;
        let index = db.load()?;

        let probe = self.best_embedding(image, &self.config.sweep.default_backend)?;
        let matches = face_db::rank(&index, &probe, self.config.database.match_threshold)
            .into_iter()
            .map(|(identity, similarity)| DbMatch {
                identity: db.root().join(identity),
                similarity,
            })
            .collect();
        Ok(matches)
    }

    fn analyze(&self, image: &Path, actions: &[AttributeAction]) -> Result<AttributeReport> {
        let (img, faces) = self.detect_in_file(image, &self.config.sweep.default_backend, true)?;
        self.attributes.analyze(&img, &faces[0], actions)
    }
}

fn to_facial_area(face: &FaceBox, img_width: u32, img_height: u32) -> FacialArea {
    let x1 = face.x1.max(0.0);
    let y1 = face.y1.max(0.0);
    let x2 = face.x2.min(img_width as f32);
    let y2 = face.y2.min(img_height as f32);
    FacialArea {
        x: x1 as i32,
        y: y1 as i32,
        w: (x2 - x1).max(0.0) as u32,
        h: (y2 - y1).max(0.0) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facial_area_is_clamped_to_image() {
        let face = FaceBox { x1: -20.0, y1: 10.0, x2: 700.0, y2: 500.0, confidence: 0.9 };
        let area = to_facial_area(&face, 640, 480);
        assert_eq!(area, FacialArea { x: 0, y: 10, w: 640, h: 470 });
    }

    #[test]
    fn degenerate_box_has_zero_size() {
        let face = FaceBox { x1: 700.0, y1: 500.0, x2: 800.0, y2: 600.0, confidence: 0.9 };
        let area = to_facial_area(&face, 640, 480);
        assert_eq!(area.w, 0);
        assert_eq!(area.h, 0);
    }
}
