pub mod aggregate;
pub mod backend;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod frames;
pub mod heuristic;
pub mod model;
pub mod normalize;
pub mod scorer;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::EngineError;
use shared::Provenance;
use aggregate::{Aggregator, Verdict};
use backend::ScoringBackend;
use frames::{ContainerDecoder, FrameSamples, VideoDecoder};
use heuristic::PixelStats;
use normalize::ImageNormalizer;
use scorer::Scorer;

/// The prediction engine. Immutable once built; share it behind an `Arc`
/// (or `web::Data`) across requests.
#[derive(Clone)]
pub struct Engine {
    normalizer: ImageNormalizer,
    scorer: Scorer,
    decoder: Arc<dyn VideoDecoder>,
    default_stride: usize,
}

impl Engine {
    pub fn new(scorer: Scorer, normalizer: ImageNormalizer) -> Self {
        Self {
            normalizer,
            scorer,
            decoder: Arc::new(ContainerDecoder),
            default_stride: frames::DEFAULT_STRIDE,
        }
    }

    pub fn from_config(config: &EngineConfig, model: Option<Arc<dyn ScoringBackend>>) -> Self {
        let scorer = Scorer::new(model, config.to_heuristic_backend());
        let normalizer = ImageNormalizer::new(config.image.resize_method.filter());
        Self::new(scorer, normalizer).with_default_stride(config.video.default_stride)
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn VideoDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_default_stride(mut self, stride: usize) -> Self {
        self.default_stride = stride.max(1);
        self
    }

    pub fn default_stride(&self) -> usize {
        self.default_stride
    }

    pub fn model_loaded(&self) -> bool {
        self.scorer.model_loaded()
    }

    pub fn score_image(&self, bytes: &[u8]) -> Result<Verdict, EngineError> {
        let tensor = self.normalizer.normalize_bytes(bytes)?;
        let mut verdict = Verdict::from(self.scorer.score(&tensor));
        if verdict.source == Provenance::Heuristic {
            verdict.pixel_stats = Some(PixelStats::of(&tensor));
        }
        log::info!(
            "Image verdict: {} ({:.4}) via {}",
            verdict.label,
            verdict.probability_of_real,
            verdict.source
        );
        Ok(verdict)
    }

    /// Samples every `stride`-th frame (0 is treated as 1), scores each
    /// decoded sample and averages the results.
    pub fn score_video(&self, bytes: &[u8], stride: usize) -> Result<Verdict, EngineError> {
        let samples = FrameSamples::open(self.decoder.as_ref(), self.normalizer, bytes, stride)?;
        let mut aggregator = Aggregator::new();
        for sample in samples {
            let sample = sample?;
            if let Ok(tensor) = &sample.tensor {
                let result = self.scorer.score(tensor);
                log::debug!(
                    "Frame {}: {:.4} via {}",
                    sample.index,
                    result.probability_of_real,
                    result.source
                );
                aggregator.push(result);
            }
        }
        let verdict = aggregator.finish()?;
        log::info!(
            "Video verdict: {} ({:.4}) over {} frames via {}",
            verdict.label,
            verdict.probability_of_real,
            verdict.frames_considered,
            verdict.source
        );
        Ok(verdict)
    }
}
