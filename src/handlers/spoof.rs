use crate::common::{Config, Result, Workspace};
use crate::core::engine::{ExtractOptions, FaceEngine};
use crate::report::{CandidateOutcome, SpoofReport};
use image::DynamicImage;
use std::time::{Duration, Instant};

pub struct SpoofResponse {
    pub report: SpoofReport,
    pub image: DynamicImage,
}

/// Anti-spoofing request handler. Sweeps the configured liveness models
/// with the default detector backend and picks the fastest model that
/// judged every detected face real. The input image is returned
/// unmodified in all cases.
pub fn anti_spoofing(
    engine: &dyn FaceEngine,
    config: &Config,
    image: &DynamicImage,
) -> SpoofResponse {
    match run_spoof_check(engine, config, image) {
        Ok(response) => response,
        Err(e) => SpoofResponse {
            report: SpoofReport::error(format!("Error during anti-spoofing check: {}", e)),
            image: image.clone(),
        },
    }
}

fn run_spoof_check(
    engine: &dyn FaceEngine,
    config: &Config,
    image: &DynamicImage,
) -> Result<SpoofResponse> {
    let workspace = Workspace::create(&config.workspace.resolve_root())?;
    let path = workspace.persist(image, "img1.jpg")?;

    let mut candidates = Vec::new();
    let mut best: Option<(String, Duration)> = None;

    for model in &config.sweep.spoof_models {
        let started = Instant::now();
        let options = ExtractOptions {
            anti_spoofing: true,
            model: Some(model.name.clone()),
        };
        match engine.extract_faces(&path, &config.sweep.default_backend, true, &options) {
            Ok(faces) => {
                let elapsed = started.elapsed();
                // Every detected face must be judged real
                let all_real = faces.iter().all(|f| f.is_real.unwrap_or(false));
                tracing::debug!(
                    model = %model.name,
                    all_real,
                    faces = faces.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "anti-spoofing attempt"
                );
                if all_real && super::beats(elapsed, best.as_ref().map(|(_, t)| *t)) {
                    best = Some((model.name.clone(), elapsed));
                }
                candidates.push(CandidateOutcome::succeeded(&model.name, elapsed, all_real));
            }
            Err(e) => {
                tracing::warn!(model = %model.name, "anti-spoofing attempt failed: {}", e);
                candidates.push(CandidateOutcome::failed(
                    &model.name,
                    started.elapsed(),
                    e.to_string(),
                ));
            }
        }
    }

    let report = match best {
        Some((model, elapsed)) => SpoofReport::best(&model, elapsed, candidates),
        None => SpoofReport::none(candidates),
    };

    Ok(SpoofResponse {
        report,
        image: image.clone(),
    })
}
