pub mod spoof;
pub mod verify;

pub use spoof::{anti_spoofing, SpoofResponse};
pub use verify::{verify_faces, VerifyResponse};

use std::time::Duration;

/// Strict less-than comparison against the current best elapsed time. An
/// exact tie keeps the earlier candidate, so selection follows the
/// configured list order.
pub(crate) fn beats(elapsed: Duration, best: Option<Duration>) -> bool {
    match best {
        None => true,
        Some(best) => elapsed < best,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_candidate_always_beats_nothing() {
        assert!(beats(Duration::from_millis(500), None));
    }

    #[test]
    fn strictly_faster_candidate_wins() {
        assert!(beats(Duration::from_millis(10), Some(Duration::from_millis(20))));
        assert!(!beats(Duration::from_millis(20), Some(Duration::from_millis(10))));
    }

    #[test]
    fn exact_tie_keeps_first_seen() {
        let t = Duration::from_millis(42);
        assert!(!beats(t, Some(t)));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::common::config::{BackendConfig, OutputLayout, SpoofModelConfig};
    use crate::common::{Config, FaceCheckError, Result};
    use crate::core::attributes::{AttributeAction, AttributeReport};
    use crate::core::engine::{
        DbMatch, ExtractOptions, FaceEngine, FaceObject, FacialArea, Verification,
    };
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::thread;
    use std::time::Duration;

    pub(crate) enum VerifyBehavior {
        Ok { verified: bool, delay: Duration },
        Fail(String),
    }

    pub(crate) enum ExtractBehavior {
        Faces(Vec<FaceObject>),
        Fail(String),
    }

    /// Scripted engine for handler tests. `verify` is keyed by backend
    /// name; `extract` by backend name for plain extraction and by model
    /// name when anti-spoofing is requested.
    #[derive(Default)]
    pub(crate) struct MockEngine {
        pub verify: HashMap<String, VerifyBehavior>,
        pub extract: HashMap<String, ExtractBehavior>,
        pub find: Vec<DbMatch>,
        pub find_error: Option<String>,
        pub analyze_error: Option<String>,
    }

    pub(crate) fn face(x: i32, y: i32, w: u32, h: u32, is_real: Option<bool>) -> FaceObject {
        FaceObject {
            area: FacialArea { x, y, w, h },
            confidence: 0.9,
            is_real,
        }
    }

    pub(crate) fn test_config(backends: &[&str], spoof_models: &[&str]) -> Config {
        let mut config = Config::default();
        config.sweep.backends = backends
            .iter()
            .map(|name| BackendConfig {
                name: name.to_string(),
                model: PathBuf::from(format!("{}.onnx", name)),
                input_width: 640,
                input_height: 640,
                layout: OutputLayout::Corners,
            })
            .collect();
        config.sweep.spoof_models = spoof_models
            .iter()
            .map(|name| SpoofModelConfig {
                name: name.to_string(),
                model: PathBuf::from(format!("{}.onnx", name)),
                input_size: 80,
            })
            .collect();
        if let Some(first) = backends.first() {
            config.sweep.default_backend = first.to_string();
        }
        config
    }

    impl FaceEngine for MockEngine {
        fn verify(
            &self,
            _first: &Path,
            _second: &Path,
            backend: &str,
            _enforce_detection: bool,
        ) -> Result<Verification> {
            match self.verify.get(backend) {
                Some(VerifyBehavior::Ok { verified, delay }) => {
                    thread::sleep(*delay);
                    Ok(Verification {
                        verified: *verified,
                        similarity: 0.9,
                        threshold: 0.68,
                    })
                }
                Some(VerifyBehavior::Fail(reason)) => {
                    Err(FaceCheckError::Model(reason.clone()))
                }
                None => Err(FaceCheckError::UnknownBackend(backend.to_string())),
            }
        }

        fn extract_faces(
            &self,
            _image: &Path,
            backend: &str,
            _enforce_detection: bool,
            options: &ExtractOptions,
        ) -> Result<Vec<FaceObject>> {
            let key = if options.anti_spoofing {
                options.model.clone().unwrap_or_default()
            } else {
                backend.to_string()
            };
            match self.extract.get(&key) {
                Some(ExtractBehavior::Faces(faces)) => Ok(faces.clone()),
                Some(ExtractBehavior::Fail(reason)) => {
                    Err(FaceCheckError::Model(reason.clone()))
                }
                None => Err(FaceCheckError::NoFaceDetected(key)),
            }
        }

        fn find(&self, _image: &Path, _database: &Path) -> Result<Vec<DbMatch>> {
            if let Some(reason) = &self.find_error {
                return Err(FaceCheckError::Database(reason.clone()));
            }
            Ok(self.find.clone())
        }

        fn analyze(
            &self,
            _image: &Path,
            _actions: &[AttributeAction],
        ) -> Result<AttributeReport> {
            if let Some(reason) = &self.analyze_error {
                return Err(FaceCheckError::Model(reason.clone()));
            }
            Ok(AttributeReport::default())
        }
    }
}
