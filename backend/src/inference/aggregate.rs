use shared::{Label, Provenance, ScoreSource};

use super::heuristic::PixelStats;
use super::scorer::ScoreResult;
use crate::error::EngineError;

/// Final answer for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub label: Label,
    pub probability_of_real: f64,
    pub frames_considered: usize,
    pub source: Provenance,
    /// Pixel statistics behind a heuristic single-image verdict.
    pub pixel_stats: Option<PixelStats>,
}

impl From<ScoreResult> for Verdict {
    fn from(result: ScoreResult) -> Self {
        Self {
            label: result.label,
            probability_of_real: result.probability_of_real,
            frames_considered: 1,
            source: result.source.into(),
            pixel_stats: None,
        }
    }
}

/// Running unweighted mean of per-frame scores.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    sum: f64,
    frames: usize,
    model_frames: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aggregate<I>(results: I) -> Result<Verdict, EngineError>
    where
        I: IntoIterator<Item = ScoreResult>,
    {
        let mut aggregator = Self::new();
        for result in results {
            aggregator.push(result);
        }
        aggregator.finish()
    }

    pub fn push(&mut self, result: ScoreResult) {
        self.sum += result.probability_of_real;
        self.frames += 1;
        if result.source == ScoreSource::Model {
            self.model_frames += 1;
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn finish(self) -> Result<Verdict, EngineError> {
        if self.frames == 0 {
            return Err(EngineError::NoFramesExtracted);
        }
        let probability_of_real = self.sum / self.frames as f64;
        // a video verdict is either fully model-backed or mixed
        let source = if self.model_frames == self.frames {
            Provenance::Model
        } else {
            Provenance::HeuristicMixed
        };
        Ok(Verdict {
            label: Label::from_probability(probability_of_real),
            probability_of_real,
            frames_considered: self.frames,
            source,
            pixel_stats: None,
        })
    }
}
