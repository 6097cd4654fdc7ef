use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Probability-of-real at or above which an input is labelled real.
pub const REAL_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Label {
    Real,
    Fake,
}

impl Label {
    pub fn from_probability(probability_of_real: f64) -> Self {
        if probability_of_real >= REAL_THRESHOLD {
            Label::Real
        } else {
            Label::Fake
        }
    }
}

/// Which backend answered for a single scored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoreSource {
    Model,
    Heuristic,
}

/// Provenance of a final verdict. `Heuristic` is a single image scored by the
/// heuristic; a video with any heuristic frame is `HeuristicMixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provenance {
    Model,
    Heuristic,
    HeuristicMixed,
}

impl From<ScoreSource> for Provenance {
    fn from(source: ScoreSource) -> Self {
        match source {
            ScoreSource::Model => Provenance::Model,
            ScoreSource::Heuristic => Provenance::Heuristic,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionResponse {
    pub request_id: Uuid,
    pub prediction: Label,
    pub score: f64,
    pub source: Provenance,
    pub frames_considered: usize,
    pub input_sha256: String,
    /// Mean pixel value on a 0-255 scale; heuristic image verdicts only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_pixel: Option<f64>,
    /// Pixel standard deviation on a 0-255 scale; heuristic image verdicts only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_std: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}
