use crate::common::config::{BackendConfig, OutputLayout};
use crate::common::{Config, FaceCheckError, Result};
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, ArrayD, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// Face detector for a single backend. Each backend maps to its own ONNX
/// model with its own input geometry and output layout; the sweep builds
/// one detector per candidate.
pub struct FaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    backend: BackendConfig,
    config: Config,
}

impl FaceDetector {
    pub fn new(config: &Config, backend_name: &str) -> Result<Self> {
        let backend = config
            .sweep
            .backend(backend_name)
            .ok_or_else(|| FaceCheckError::UnknownBackend(backend_name.to_string()))?
            .clone();

        let model_path = config.models.resolve(&backend.model);
        if !model_path.exists() {
            return Err(FaceCheckError::Model(format!(
                "Detector model for backend '{}' not found at: {:?}",
                backend.name, model_path
            )));
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
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
            backend,
            config: config.clone(),
        })
    }

    pub fn backend_name(&self) -> &str {
        &self.backend.name
    }

    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let resized = image.resize_exact(
            self.backend.input_width,
            self.backend.input_height,
            FilterType::Nearest,
        );
        let img_array = self.image_to_array(&resized);

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        if outputs.is_empty() {
            return Ok(Vec::new());
        }
        let output = outputs[0].try_extract::<f32>()?.view().to_owned();

        let candidates = parse_output(
            &output,
            self.backend.layout,
            self.backend.input_width as f32,
            self.backend.input_height as f32,
        );
        let mut faces = postprocess(
            candidates,
            self.config.detector.detection_confidence,
            self.config.detector.iou_threshold,
            self.config.detector.max_faces,
        );

        // Scale back to original image coordinates
        let scale_x = orig_width / self.backend.input_width as f32;
        let scale_y = orig_height / self.backend.input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        Ok(faces)
    }

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        let rgb = img.to_rgb8();
        let width = rgb.width() as usize;
        let height = rgb.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 * norm_factor;
            array[[0, 1, y, x]] = pixel[1] as f32 * norm_factor;
            array[[0, 2, y, x]] = pixel[2] as f32 * norm_factor;
        }

        array
    }
}

/// Parse raw detector output rows into candidate boxes in model input
/// coordinates. Handles both `[1, N, 5]` and channel-major `[1, 5, N]`
/// tensors; 2D `[N, 5]` is accepted as-is.
pub(crate) fn parse_output(
    output: &ArrayD<f32>,
    layout: OutputLayout,
    input_width: f32,
    input_height: f32,
) -> Vec<FaceBox> {
    let shape = output.shape().to_vec();
    let flat = match output.as_slice() {
        Some(flat) => flat,
        None => return Vec::new(),
    };

    let (num_predictions, prediction_length, is_transposed) = if shape.len() >= 3 {
        if shape[2] > shape[1] && shape[1] <= 10 {
            // Channel-major format [1, 5, N]
            (shape[2], shape[1], true)
        } else {
            (shape[1], shape[2], false)
        }
    } else if shape.len() == 2 {
        (shape[0], shape[1], false)
    } else {
        tracing::warn!("Unexpected detector output shape: {:?}", shape);
        return Vec::new();
    };

    if prediction_length < 4 {
        return Vec::new();
    }

    let mut faces = Vec::new();
    for i in 0..num_predictions {
        let field = |f: usize| -> f32 {
            if is_transposed {
                flat[f * num_predictions + i]
            } else {
                flat[i * prediction_length + f]
            }
        };

        let (a, b, c, d) = (field(0), field(1), field(2), field(3));
        let confidence = if prediction_length > 4 { field(4) } else { 0.0 };

        // Models emit either normalized or pixel-space coordinates
        let scale = if a > 1.0 || b > 1.0 || c > 1.0 || d > 1.0 {
            (1.0, 1.0)
        } else {
            (input_width, input_height)
        };

        let (x1, y1, x2, y2) = match layout {
            OutputLayout::Centers => {
                let (cx, cy, w, h) = (a * scale.0, b * scale.1, c * scale.0, d * scale.1);
                (cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
            }
            OutputLayout::Corners => (a * scale.0, b * scale.1, c * scale.0, d * scale.1),
        };

        let x1 = x1.max(0.0);
        let y1 = y1.max(0.0);
        let x2 = x2.min(input_width);
        let y2 = y2.min(input_height);

        if confidence > 0.001 && x2 > x1 && y2 > y1 && (x2 - x1) > 10.0 && (y2 - y1) > 10.0 {
            faces.push(FaceBox { x1, y1, x2, y2, confidence });
        }
    }

    faces
}

/// NMS first with the configured IoU threshold, then the confidence
/// filter, then sort by confidence and truncate.
pub(crate) fn postprocess(
    candidates: Vec<FaceBox>,
    detection_confidence: f32,
    iou_threshold: f32,
    max_faces: usize,
) -> Vec<FaceBox> {
    let mut faces = apply_nms(candidates, iou_threshold);
    faces.retain(|face| face.confidence >= detection_confidence);
    faces.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
    faces.truncate(max_faces);
    faces
}

pub(crate) fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    if boxes.is_empty() {
        return boxes;
    }

    boxes.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

    let mut keep = Vec::new();
    let mut indices: Vec<usize> = (0..boxes.len()).collect();

    while !indices.is_empty() {
        let i = indices[0];
        keep.push(boxes[i].clone());

        indices = indices[1..]
            .iter()
            .filter(|&&j| calculate_iou(&boxes[i], &boxes[j]) < iou_threshold)
            .copied()
            .collect();
    }

    keep
}

fn calculate_iou(box1: &FaceBox, box2: &FaceBox) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1.x2 - box1.x1) * (box1.y2 - box1.y1);
    let area2 = (box2.x2 - box2.x1) * (box2.y2 - box2.y1);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
