use shared::{Label, ScoreSource};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::backend::{RawOutput, ScoringBackend};
use super::heuristic::HeuristicBackend;
use super::normalize::NormalizedTensor;
use crate::error::BackendError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreResult {
    pub probability_of_real: f64,
    pub label: Label,
    pub source: ScoreSource,
}

impl ScoreResult {
    pub fn new(probability_of_real: f64, source: ScoreSource) -> Self {
        Self {
            probability_of_real,
            label: Label::from_probability(probability_of_real),
            source,
        }
    }
}

/// Scores tensors through an ordered backend chain. The first backend that
/// answers with a usable probability wins; when every backend fails (or the
/// chain is empty) the heuristic answers. Never fails.
#[derive(Clone)]
pub struct Scorer {
    chain: Vec<Arc<dyn ScoringBackend>>,
    heuristic: HeuristicBackend,
}

impl Scorer {
    pub fn new(model: Option<Arc<dyn ScoringBackend>>, heuristic: HeuristicBackend) -> Self {
        Self {
            chain: model.into_iter().collect(),
            heuristic,
        }
    }

    pub fn heuristic_only(heuristic: HeuristicBackend) -> Self {
        Self::new(None, heuristic)
    }

    pub fn model_loaded(&self) -> bool {
        !self.chain.is_empty()
    }

    pub fn score(&self, tensor: &NormalizedTensor) -> ScoreResult {
        for backend in &self.chain {
            match invoke(backend.as_ref(), tensor).and_then(|raw| raw.probability_of_real()) {
                Ok(probability) => return ScoreResult::new(probability, backend.source()),
                Err(e) => {
                    log::warn!(
                        "Backend {} failed, falling back to {}: {}",
                        backend.name(),
                        self.heuristic.name(),
                        e
                    );
                }
            }
        }
        ScoreResult::new(self.heuristic.score(tensor), ScoreSource::Heuristic)
    }
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.chain.iter().map(|b| b.name()).collect();
        f.debug_struct("Scorer")
            .field("chain", &names)
            .field("heuristic", &self.heuristic)
            .finish()
    }
}

fn invoke(
    backend: &dyn ScoringBackend,
    tensor: &NormalizedTensor,
) -> Result<RawOutput, BackendError> {
    panic::catch_unwind(AssertUnwindSafe(|| backend.predict(tensor)))
        .unwrap_or_else(|payload| Err(BackendError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(RawOutput);

    impl ScoringBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn source(&self) -> ScoreSource {
            ScoreSource::Model
        }
        fn predict(&self, _tensor: &NormalizedTensor) -> Result<RawOutput, BackendError> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl ScoringBackend for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn source(&self) -> ScoreSource {
            ScoreSource::Model
        }
        fn predict(&self, _tensor: &NormalizedTensor) -> Result<RawOutput, BackendError> {
            Err(BackendError::Inference("boom".into()))
        }
    }

    struct Panicking;

    impl ScoringBackend for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        fn source(&self) -> ScoreSource {
            ScoreSource::Model
        }
        fn predict(&self, _tensor: &NormalizedTensor) -> Result<RawOutput, BackendError> {
            panic!("model runtime exploded")
        }
    }

    fn scorer_with(backend: impl ScoringBackend + 'static) -> Scorer {
        Scorer::new(Some(Arc::new(backend)), HeuristicBackend::default())
    }

    #[test]
    fn label_follows_threshold() {
        assert_eq!(ScoreResult::new(0.5, ScoreSource::Model).label, Label::Real);
        assert_eq!(ScoreResult::new(0.4999, ScoreSource::Model).label, Label::Fake);
    }

    #[test]
    fn model_two_vector_is_normalized() {
        let result = scorer_with(Fixed(RawOutput::Vector(vec![0.3, 0.7])))
            .score(&NormalizedTensor::filled(0.5));
        assert!((result.probability_of_real - 0.3).abs() < 1e-6);
        assert_eq!(result.label, Label::Fake);
        assert_eq!(result.source, ScoreSource::Model);
    }

    #[test]
    fn model_scalar_is_used_directly() {
        let result =
            scorer_with(Fixed(RawOutput::Scalar(0.9))).score(&NormalizedTensor::filled(0.5));
        assert!((result.probability_of_real - 0.9).abs() < 1e-6);
        assert_eq!(result.source, ScoreSource::Model);
    }

    #[test]
    fn missing_model_uses_heuristic() {
        let scorer = Scorer::heuristic_only(HeuristicBackend::default());
        let result = scorer.score(&NormalizedTensor::filled(0.0));
        assert_eq!(result.source, ScoreSource::Heuristic);
        assert_eq!(result.probability_of_real, 0.45);
        assert!(!scorer.model_loaded());
    }

    #[test]
    fn failing_model_falls_back_silently() {
        let result = scorer_with(Failing).score(&NormalizedTensor::filled(0.0));
        assert_eq!(result.source, ScoreSource::Heuristic);
        assert_eq!(result.probability_of_real, 0.45);
    }

    #[test]
    fn unparseable_model_output_falls_back() {
        let result =
            scorer_with(Fixed(RawOutput::Vector(vec![]))).score(&NormalizedTensor::filled(0.0));
        assert_eq!(result.source, ScoreSource::Heuristic);
    }

    #[test]
    fn panicking_model_falls_back() {
        let result = scorer_with(Panicking).score(&NormalizedTensor::filled(0.0));
        assert_eq!(result.source, ScoreSource::Heuristic);
    }
}
