//! Statistical fallback scorer used whenever no model answers.
//!
//! The canonical policy is [`HeuristicPolicy::VarianceTexture`]: it caps
//! low-texture inputs at a weak "leans fake" score so smooth real photos are
//! not confidently accused. [`HeuristicPolicy::MeanIntensity`] is kept as an
//! explicitly named alternative and is only used when configured.

use serde::{Deserialize, Serialize};
use shared::ScoreSource;

use super::backend::{RawOutput, ScoringBackend};
use super::normalize::NormalizedTensor;
use crate::error::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicPolicy {
    #[default]
    VarianceTexture,
    MeanIntensity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureThresholds {
    pub low_std: f64,
    pub high_std: f64,
    pub low_score: f64,
    pub high_score: f64,
    pub photographic_bonus: f64,
    /// Inclusive [min, max] mean for the photographic bonus.
    pub photographic_mean: [f64; 2],
}

impl Default for TextureThresholds {
    fn default() -> Self {
        Self {
            low_std: 0.02,
            high_std: 0.25,
            low_score: 0.45,
            high_score: 0.70,
            photographic_bonus: 0.05,
            photographic_mean: [0.1, 0.9],
        }
    }
}

/// Population mean and standard deviation over every tensor value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl PixelStats {
    pub fn of(tensor: &NormalizedTensor) -> Self {
        if tensor.is_empty() {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
            };
        }
        let n = tensor.len() as f64;
        let mean = tensor.values().map(f64::from).sum::<f64>() / n;
        let variance = tensor
            .values()
            .map(|v| {
                let diff = f64::from(v) - mean;
                diff * diff
            })
            .sum::<f64>()
            / n;
        Self {
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HeuristicBackend {
    policy: HeuristicPolicy,
    thresholds: TextureThresholds,
}

impl HeuristicBackend {
    pub fn new(policy: HeuristicPolicy, thresholds: TextureThresholds) -> Self {
        Self { policy, thresholds }
    }

    pub fn policy(&self) -> HeuristicPolicy {
        self.policy
    }

    /// Probability-of-real for `tensor`. Pure and infallible.
    pub fn score(&self, tensor: &NormalizedTensor) -> f64 {
        let stats = PixelStats::of(tensor);
        let score = match self.policy {
            HeuristicPolicy::VarianceTexture => self.variance_texture(stats),
            HeuristicPolicy::MeanIntensity => mean_intensity(stats.mean),
        };
        score.clamp(0.0, 1.0)
    }

    /// Score from standard deviation alone, before the photographic bonus.
    pub fn texture_score(&self, std_dev: f64) -> f64 {
        let t = &self.thresholds;
        if std_dev <= t.low_std {
            t.low_score
        } else if std_dev >= t.high_std {
            t.high_score
        } else {
            let ratio = (std_dev - t.low_std) / (t.high_std - t.low_std);
            t.low_score + ratio * (t.high_score - t.low_score)
        }
    }

    fn variance_texture(&self, stats: PixelStats) -> f64 {
        let base = self.texture_score(stats.std_dev);
        let [min_mean, max_mean] = self.thresholds.photographic_mean;
        if (min_mean..=max_mean).contains(&stats.mean) {
            (base + self.thresholds.photographic_bonus).min(1.0)
        } else {
            base
        }
    }
}

/// Bright images lean real, dark ones lean fake; distance from mid-gray sets
/// the confidence, capped at 0.99.
fn mean_intensity(mean: f64) -> f64 {
    let mean = mean * 255.0;
    if mean > 127.0 {
        ((mean - 127.0) / 128.0 + 0.5).min(0.99)
    } else {
        1.0 - ((127.0 - mean) / 128.0 + 0.5).min(0.99)
    }
}

impl ScoringBackend for HeuristicBackend {
    fn name(&self) -> &str {
        match self.policy {
            HeuristicPolicy::VarianceTexture => "heuristic:variance_texture",
            HeuristicPolicy::MeanIntensity => "heuristic:mean_intensity",
        }
    }

    fn source(&self) -> ScoreSource {
        ScoreSource::Heuristic
    }

    fn predict(&self, tensor: &NormalizedTensor) -> Result<RawOutput, BackendError> {
        Ok(RawOutput::Scalar(self.score(tensor) as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn two_level_tensor(low: f32, high: f32) -> NormalizedTensor {
        let data = Array3::from_shape_fn((224, 224, 3), |(y, x, _)| {
            if (x + y) % 2 == 0 { low } else { high }
        });
        NormalizedTensor::from_array(data).unwrap()
    }

    #[test]
    fn threshold_scores_are_exact() {
        let heuristic = HeuristicBackend::default();
        assert_eq!(heuristic.texture_score(0.02), 0.45);
        assert_eq!(heuristic.texture_score(0.25), 0.70);
        assert_eq!(heuristic.texture_score(0.0), 0.45);
        assert_eq!(heuristic.texture_score(0.9), 0.70);
    }

    #[test]
    fn texture_interpolates_linearly() {
        let heuristic = HeuristicBackend::default();
        let mid = heuristic.texture_score((0.02 + 0.25) / 2.0);
        assert!((mid - 0.575).abs() < 1e-12);
    }

    #[test]
    fn low_texture_tensor_scores_near_floor() {
        let heuristic = HeuristicBackend::default();
        let tensor = two_level_tensor(0.48, 0.52);
        let stats = PixelStats::of(&tensor);
        assert!((stats.std_dev - 0.02).abs() < 1e-6);
        assert!((heuristic.texture_score(stats.std_dev) - 0.45).abs() < 1e-4);
        // mid-gray mean earns the photographic bonus
        assert!((heuristic.score(&tensor) - 0.50).abs() < 1e-4);
    }

    #[test]
    fn high_texture_photo_scores_real() {
        let heuristic = HeuristicBackend::default();
        let tensor = two_level_tensor(0.2, 0.8);
        let score = heuristic.score(&tensor);
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn black_and_white_extremes_get_no_bonus() {
        let heuristic = HeuristicBackend::default();
        assert_eq!(heuristic.score(&NormalizedTensor::filled(0.0)), 0.45);
        assert_eq!(heuristic.score(&NormalizedTensor::filled(1.0)), 0.45);
    }

    #[test]
    fn bonus_is_capped_at_one() {
        let thresholds = TextureThresholds {
            high_score: 0.98,
            ..TextureThresholds::default()
        };
        let heuristic = HeuristicBackend::new(HeuristicPolicy::VarianceTexture, thresholds);
        assert_eq!(heuristic.score(&two_level_tensor(0.2, 0.8)), 1.0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let heuristic = HeuristicBackend::default();
        let tensor = two_level_tensor(0.3, 0.55);
        assert_eq!(heuristic.score(&tensor), heuristic.score(&tensor.clone()));
    }

    #[test]
    fn mean_intensity_policy_follows_brightness() {
        let heuristic =
            HeuristicBackend::new(HeuristicPolicy::MeanIntensity, TextureThresholds::default());
        assert!(heuristic.score(&NormalizedTensor::filled(0.9)) > 0.5);
        assert!(heuristic.score(&NormalizedTensor::filled(0.1)) < 0.5);
        assert!((heuristic.score(&NormalizedTensor::filled(1.0)) - 0.99).abs() < 1e-9);
        assert!((heuristic.score(&NormalizedTensor::filled(0.0)) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn reports_heuristic_source() {
        let heuristic = HeuristicBackend::default();
        assert_eq!(heuristic.source(), ScoreSource::Heuristic);
        assert!(matches!(
            heuristic.predict(&NormalizedTensor::filled(0.5)),
            Ok(RawOutput::Scalar(_))
        ));
    }
}
