use crate::core::attributes::AttributeReport;
use crate::core::engine::DbMatch;
use serde::Serialize;
use std::time::Duration;

/// Per-candidate sweep record. Failures stay in the list so the report
/// can show partial failures instead of only the winner.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateOutcome {
    pub name: String,
    pub elapsed_secs: f64,
    pub outcome: CandidateResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum CandidateResult {
    /// The call completed; the flag is `verified` for the backend sweep
    /// and `all faces real` for the model sweep.
    Succeeded(bool),
    Failed(String),
}

impl CandidateOutcome {
    pub fn succeeded(name: &str, elapsed: Duration, flag: bool) -> Self {
        Self {
            name: name.to_string(),
            elapsed_secs: elapsed.as_secs_f64(),
            outcome: CandidateResult::Succeeded(flag),
        }
    }

    pub fn failed(name: &str, elapsed: Duration, reason: String) -> Self {
        Self {
            name: name.to_string(),
            elapsed_secs: elapsed.as_secs_f64(),
            outcome: CandidateResult::Failed(reason),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchEntry {
    pub identity: String,
    pub similarity: f32,
}

impl From<&DbMatch> for MatchEntry {
    fn from(m: &DbMatch) -> Self {
        Self {
            identity: m.identity.display().to_string(),
            similarity: m.similarity,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub text: String,
    pub verified: Option<bool>,
    pub backend: Option<String>,
    pub elapsed_secs: Option<f64>,
    pub matches: Vec<MatchEntry>,
    pub attributes: Option<AttributeReport>,
    pub candidates: Vec<CandidateOutcome>,
}

impl VerifyReport {
    pub fn success(
        verified: bool,
        backend: &str,
        elapsed: Duration,
        matches: &[DbMatch],
        attributes: AttributeReport,
        candidates: Vec<CandidateOutcome>,
    ) -> Self {
        let mut text = format!(
            "Verified: {} with {} in {:.2} seconds\nRecognition Result: {}\nAttributes: {}",
            verified,
            backend,
            elapsed.as_secs_f64(),
            format_matches(matches),
            attributes,
        );
        text.push_str(&sweep_section("Backend sweep", "verified", &candidates));

        Self {
            text,
            verified: Some(verified),
            backend: Some(backend.to_string()),
            elapsed_secs: Some(elapsed.as_secs_f64()),
            matches: matches.iter().map(MatchEntry::from).collect(),
            attributes: Some(attributes),
            candidates,
        }
    }

    pub fn no_winner(candidates: Vec<CandidateOutcome>) -> Self {
        let mut text = String::from("No verification was successful.");
        text.push_str(&sweep_section("Backend sweep", "verified", &candidates));
        Self {
            text,
            verified: None,
            backend: None,
            elapsed_secs: None,
            matches: Vec::new(),
            attributes: None,
            candidates,
        }
    }

    pub fn extraction_error(backend: &str, error: &str, candidates: Vec<CandidateOutcome>) -> Self {
        Self {
            text: format!("Error extracting faces with {}: {}", backend, error),
            verified: None,
            backend: Some(backend.to_string()),
            elapsed_secs: None,
            matches: Vec::new(),
            attributes: None,
            candidates,
        }
    }

    pub fn error(text: String) -> Self {
        Self {
            text,
            verified: None,
            backend: None,
            elapsed_secs: None,
            matches: Vec::new(),
            attributes: None,
            candidates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpoofReport {
    pub text: String,
    pub best_model: Option<String>,
    pub elapsed_secs: Option<f64>,
    pub candidates: Vec<CandidateOutcome>,
}

impl SpoofReport {
    pub fn best(model: &str, elapsed: Duration, candidates: Vec<CandidateOutcome>) -> Self {
        let mut text = format!(
            "Best Model: {} with result: true in {:.2} seconds",
            model,
            elapsed.as_secs_f64()
        );
        text.push_str(&sweep_section("Model sweep", "real", &candidates));
        Self {
            text,
            best_model: Some(model.to_string()),
            elapsed_secs: Some(elapsed.as_secs_f64()),
            candidates,
        }
    }

    pub fn none(candidates: Vec<CandidateOutcome>) -> Self {
        let mut text = String::from("No model could verify the image as real.");
        text.push_str(&sweep_section("Model sweep", "real", &candidates));
        Self {
            text,
            best_model: None,
            elapsed_secs: None,
            candidates,
        }
    }

    pub fn error(text: String) -> Self {
        Self {
            text,
            best_model: None,
            elapsed_secs: None,
            candidates: Vec::new(),
        }
    }
}

fn format_matches(matches: &[DbMatch]) -> String {
    if matches.is_empty() {
        return "no matches".to_string();
    }
    matches
        .iter()
        .map(|m| format!("{} (similarity {:.2})", m.identity.display(), m.similarity))
        .collect::<Vec<_>>()
        .join(", ")
}

fn sweep_section(title: &str, flag_name: &str, candidates: &[CandidateOutcome]) -> String {
    let mut section = format!("\n{}:", title);
    for candidate in candidates {
        match &candidate.outcome {
            CandidateResult::Succeeded(flag) => {
                section.push_str(&format!(
                    "\n  {}: {}={} in {:.2}s",
                    candidate.name, flag_name, flag, candidate.elapsed_secs
                ));
            }
            CandidateResult::Failed(reason) => {
                section.push_str(&format!("\n  {}: error: {}", candidate.name, reason));
            }
        }
    }
    section
}
