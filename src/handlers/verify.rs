use crate::annotate::annotate_faces;
use crate::common::{Config, Result, Workspace};
use crate::core::attributes::ALL_ACTIONS;
use crate::core::engine::{ExtractOptions, FaceEngine, FaceObject, FacialArea, Verification};
use crate::report::{CandidateOutcome, VerifyReport};
use image::DynamicImage;
use std::path::Path;
use std::time::{Duration, Instant};

pub struct VerifyResponse {
    pub report: VerifyReport,
    pub first: DynamicImage,
    pub second: DynamicImage,
}

/// Verification request handler. Sweeps the configured detector
/// backends, picks the fastest one that verified, annotates both images
/// with the winner's face boxes, then appends the recognition lookup and
/// attribute analysis to the report.
///
/// Never fails: any error escaping the pipeline is folded into an
/// error report alongside the unmodified input images.
pub fn verify_faces(
    engine: &dyn FaceEngine,
    config: &Config,
    first: &DynamicImage,
    second: &DynamicImage,
) -> VerifyResponse {
    match run_verification(engine, config, first, second) {
        Ok(response) => response,
        Err(e) => VerifyResponse {
            report: VerifyReport::error(format!("Error processing: {}", e)),
            first: first.clone(),
            second: second.clone(),
        },
    }
}

fn run_verification(
    engine: &dyn FaceEngine,
    config: &Config,
    first: &DynamicImage,
    second: &DynamicImage,
) -> Result<VerifyResponse> {
    let workspace = Workspace::create(&config.workspace.resolve_root())?;
    let first_path = workspace.persist(first, "img1.jpg")?;
    let second_path = workspace.persist(second, "img2.jpg")?;

    let mut candidates = Vec::new();
    let mut best: Option<(String, Duration, Verification)> = None;

    for backend in &config.sweep.backends {
        let started = Instant::now();
        match engine.verify(&first_path, &second_path, &backend.name, true) {
            Ok(result) => {
                let elapsed = started.elapsed();
                tracing::debug!(
                    backend = %backend.name,
                    verified = result.verified,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "verification attempt"
                );
                if result.verified && super::beats(elapsed, best.as_ref().map(|(_, t, _)| *t)) {
                    best = Some((backend.name.clone(), elapsed, result.clone()));
                }
                candidates.push(CandidateOutcome::succeeded(
                    &backend.name,
                    elapsed,
                    result.verified,
                ));
            }
            Err(e) => {
                tracing::warn!(backend = %backend.name, "verification attempt failed: {}", e);
                candidates.push(CandidateOutcome::failed(
                    &backend.name,
                    started.elapsed(),
                    e.to_string(),
                ));
            }
        }
    }

    let Some((backend, elapsed, result)) = best else {
        return Ok(VerifyResponse {
            report: VerifyReport::no_winner(candidates),
            first: first.clone(),
            second: second.clone(),
        });
    };

    // Re-extract with the winning backend to get annotation coordinates
    let (first_faces, second_faces) =
        match extract_both(engine, &first_path, &second_path, &backend) {
            Ok(faces) => faces,
            Err(e) => {
                return Ok(VerifyResponse {
                    report: VerifyReport::extraction_error(&backend, &e.to_string(), candidates),
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        };

    let annotated_first = annotate_faces(first, &areas(&first_faces));
    let annotated_second = annotate_faces(second, &areas(&second_faces));

    let matches = engine.find(&first_path, &config.database.path)?;
    let attributes = engine.analyze(&first_path, &ALL_ACTIONS)?;

    Ok(VerifyResponse {
        report: VerifyReport::success(
            result.verified,
            &backend,
            elapsed,
            &matches,
            attributes,
            candidates,
        ),
        first: annotated_first,
        second: annotated_second,
    })
}

fn extract_both(
    engine: &dyn FaceEngine,
    first_path: &Path,
    second_path: &Path,
    backend: &str,
) -> Result<(Vec<FaceObject>, Vec<FaceObject>)> {
    let options = ExtractOptions::default();
    let first = engine.extract_faces(first_path, backend, true, &options)?;
    let second = engine.extract_faces(second_path, backend, true, &options)?;
    Ok((first, second))
}

fn areas(faces: &[FaceObject]) -> Vec<FacialArea> {
    faces.iter().map(|f| f.area).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{face, test_config, ExtractBehavior, MockEngine, VerifyBehavior};
    use crate::report::CandidateResult;
    use std::time::Duration;

    fn sample_image() -> DynamicImage {
        DynamicImage::new_rgb8(32, 32)
    }

    fn ok(verified: bool, delay_ms: u64) -> VerifyBehavior {
        VerifyBehavior::Ok {
            verified,
            delay: Duration::from_millis(delay_ms),
        }
    }

    fn unchanged(a: &DynamicImage, b: &DynamicImage) -> bool {
        a.to_rgb8().as_raw() == b.to_rgb8().as_raw()
    }

    #[test]
    fn all_backends_failing_returns_exact_message_and_original_images() {
        let config = test_config(&["a", "b", "c"], &["m"]);
        let mut engine = MockEngine::default();
        for name in ["a", "b", "c"] {
            engine.verify.insert(name.into(), VerifyBehavior::Fail("boom".into()));
        }

        let first = sample_image();
        let second = sample_image();
        let response = verify_faces(&engine, &config, &first, &second);

        assert!(response.report.text.starts_with("No verification was successful."));
        assert!(unchanged(&response.first, &first));
        assert!(unchanged(&response.second, &second));
    }

    #[test]
    fn failing_backends_appear_in_candidate_list_in_order() {
        let config = test_config(&["a", "b"], &["m"]);
        let mut engine = MockEngine::default();
        engine.verify.insert("a".into(), VerifyBehavior::Fail("first down".into()));
        engine.verify.insert("b".into(), VerifyBehavior::Fail("second down".into()));

        let response = verify_faces(&engine, &config, &sample_image(), &sample_image());

        let names: Vec<_> = response.report.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(response
            .report
            .candidates
            .iter()
            .all(|c| matches!(c.outcome, CandidateResult::Failed(_))));
    }

    #[test]
    fn only_verified_backend_is_selected_despite_failures() {
        let config = test_config(&["a", "b", "c"], &["m"]);
        let mut engine = MockEngine::default();
        engine.verify.insert("a".into(), VerifyBehavior::Fail("down".into()));
        engine.verify.insert("b".into(), ok(true, 5));
        engine.verify.insert("c".into(), VerifyBehavior::Fail("down".into()));
        engine.extract.insert("b".into(), ExtractBehavior::Faces(vec![face(4, 4, 10, 10, None)]));

        let response = verify_faces(&engine, &config, &sample_image(), &sample_image());

        assert_eq!(response.report.backend.as_deref(), Some("b"));
        assert!(response.report.text.starts_with("Verified: true with b"));
    }

    #[test]
    fn faster_verified_backend_wins() {
        let config = test_config(&["slow", "fast"], &["m"]);
        let mut engine = MockEngine::default();
        engine.verify.insert("slow".into(), ok(true, 80));
        engine.verify.insert("fast".into(), ok(true, 10));
        engine
            .extract
            .insert("fast".into(), ExtractBehavior::Faces(vec![face(4, 4, 10, 10, None)]));

        let response = verify_faces(&engine, &config, &sample_image(), &sample_image());

        assert_eq!(response.report.backend.as_deref(), Some("fast"));
    }

    #[test]
    fn unverified_results_never_win() {
        let config = test_config(&["quick-no", "slow-yes"], &["m"]);
        let mut engine = MockEngine::default();
        engine.verify.insert("quick-no".into(), ok(false, 1));
        engine.verify.insert("slow-yes".into(), ok(true, 30));
        engine
            .extract
            .insert("slow-yes".into(), ExtractBehavior::Faces(vec![face(4, 4, 10, 10, None)]));

        let response = verify_faces(&engine, &config, &sample_image(), &sample_image());

        assert_eq!(response.report.backend.as_deref(), Some("slow-yes"));
        assert_eq!(response.report.verified, Some(true));
    }

    #[test]
    fn extraction_failure_masks_successful_verification() {
        let config = test_config(&["a"], &["m"]);
        let mut engine = MockEngine::default();
        engine.verify.insert("a".into(), ok(true, 5));
        engine.extract.insert("a".into(), ExtractBehavior::Fail("no landmarks".into()));

        let first = sample_image();
        let second = sample_image();
        let response = verify_faces(&engine, &config, &first, &second);

        assert!(response.report.text.starts_with("Error extracting faces with a"));
        assert!(unchanged(&response.first, &first));
        assert!(unchanged(&response.second, &second));
    }

    #[test]
    fn successful_run_annotates_both_images() {
        let config = test_config(&["a"], &["m"]);
        let mut engine = MockEngine::default();
        engine.verify.insert("a".into(), ok(true, 5));
        engine.extract.insert("a".into(), ExtractBehavior::Faces(vec![face(4, 4, 10, 10, None)]));

        let first = sample_image();
        let second = sample_image();
        let response = verify_faces(&engine, &config, &first, &second);

        assert!(response.report.text.starts_with("Verified: true with a"));
        assert!(!unchanged(&response.first, &first));
        assert!(!unchanged(&response.second, &second));
    }

    #[test]
    fn lookup_failure_becomes_processing_error_with_original_images() {
        let config = test_config(&["a"], &["m"]);
        let mut engine = MockEngine::default();
        engine.verify.insert("a".into(), ok(true, 5));
        engine.extract.insert("a".into(), ExtractBehavior::Faces(vec![face(4, 4, 10, 10, None)]));
        engine.find_error = Some("index unreadable".into());

        let first = sample_image();
        let second = sample_image();
        let response = verify_faces(&engine, &config, &first, &second);

        assert!(response.report.text.starts_with("Error processing:"));
        assert!(response.report.text.contains("index unreadable"));
        assert!(unchanged(&response.first, &first));
        assert!(unchanged(&response.second, &second));
    }
}
