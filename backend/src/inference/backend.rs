use shared::ScoreSource;

use super::normalize::NormalizedTensor;
use crate::error::BackendError;

/// Raw predictor output before it is interpreted as a probability-of-real.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Scalar(f32),
    Vector(Vec<f32>),
}

impl RawOutput {
    /// Interprets the output as probability-of-real:
    /// a scalar is taken as-is, a 2-vector is `[.., prob_fake]` so the
    /// result is `1 - v[1]`, and any other vector contributes its first
    /// element. Non-finite values and empty vectors are rejected; finite
    /// values outside [0, 1] are clamped.
    pub fn probability_of_real(&self) -> Result<f64, BackendError> {
        let probability = match self {
            RawOutput::Scalar(value) => f64::from(*value),
            RawOutput::Vector(values) if values.len() == 2 => 1.0 - f64::from(values[1]),
            RawOutput::Vector(values) => match values.first() {
                Some(value) => f64::from(*value),
                None => return Err(BackendError::Shape("empty output vector".into())),
            },
        };
        if !probability.is_finite() {
            return Err(BackendError::Shape(format!(
                "non-finite probability from {:?}",
                self
            )));
        }
        Ok(probability.clamp(0.0, 1.0))
    }
}

/// A predictor that can score one normalized tensor.
pub trait ScoringBackend: Send + Sync {
    fn name(&self) -> &str;

    fn source(&self) -> ScoreSource;

    fn predict(&self, tensor: &NormalizedTensor) -> Result<RawOutput, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_is_probability_of_real() {
        let p = RawOutput::Scalar(0.8).probability_of_real().unwrap();
        assert!((p - 0.8).abs() < 1e-6);
    }

    #[test]
    fn two_vector_second_element_is_probability_of_fake() {
        let p = RawOutput::Vector(vec![0.3, 0.7]).probability_of_real().unwrap();
        assert!((p - 0.3).abs() < 1e-6);
    }

    #[test]
    fn other_vectors_use_first_element() {
        let single = RawOutput::Vector(vec![0.65]).probability_of_real().unwrap();
        assert!((single - 0.65).abs() < 1e-6);
        let triple = RawOutput::Vector(vec![0.2, 0.5, 0.3])
            .probability_of_real()
            .unwrap();
        assert!((triple - 0.2).abs() < 1e-6);
    }

    #[test]
    fn empty_and_non_finite_outputs_are_shape_errors() {
        assert!(matches!(
            RawOutput::Vector(vec![]).probability_of_real(),
            Err(BackendError::Shape(_))
        ));
        assert!(matches!(
            RawOutput::Scalar(f32::NAN).probability_of_real(),
            Err(BackendError::Shape(_))
        ));
        assert!(matches!(
            RawOutput::Vector(vec![0.1, f32::INFINITY]).probability_of_real(),
            Err(BackendError::Shape(_))
        ));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        assert_eq!(RawOutput::Scalar(1.7).probability_of_real().unwrap(), 1.0);
        assert_eq!(RawOutput::Scalar(-0.2).probability_of_real().unwrap(), 0.0);
    }
}
