//! Video frame sampling.
//!
//! A [`VideoDecoder`] opens a container and yields raw frames in source
//! order. [`FrameSamples`] walks that stream once, keeps every `stride`-th
//! frame and normalizes it. Frames that fail to decode are reported as failed
//! samples; they never end the pass early.

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageDecoder, Limits};
use std::io::Cursor;

use super::normalize::{ImageNormalizer, NormalizedTensor};
use crate::error::{EngineError, FrameError};

pub const DEFAULT_STRIDE: usize = 5;

pub type RawFrames<'a> = Box<dyn Iterator<Item = Result<DynamicImage, FrameError>> + 'a>;

/// Opens a video byte stream into an ordered stream of decoded frames.
pub trait VideoDecoder: Send + Sync {
    fn open<'a>(&self, bytes: &'a [u8]) -> Result<RawFrames<'a>, EngineError>;
}

/// Picks a decoder from the container signature: animated GIF is decoded
/// in-process, everything else goes to FFmpeg when the `ffmpeg` feature is
/// enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerDecoder;

impl ContainerDecoder {
    pub fn is_gif(bytes: &[u8]) -> bool {
        bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a")
    }
}

impl VideoDecoder for ContainerDecoder {
    fn open<'a>(&self, bytes: &'a [u8]) -> Result<RawFrames<'a>, EngineError> {
        if Self::is_gif(bytes) {
            return AnimatedGifDecoder.open(bytes);
        }

        #[cfg(feature = "ffmpeg")]
        {
            super::ffmpeg::FfmpegDecoder.open(bytes)
        }

        #[cfg(not(feature = "ffmpeg"))]
        {
            Err(EngineError::VideoOpen(
                "unsupported container (built without the `ffmpeg` feature)".into(),
            ))
        }
    }
}

/// Animated GIF container decoding via the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnimatedGifDecoder;

impl VideoDecoder for AnimatedGifDecoder {
    fn open<'a>(&self, bytes: &'a [u8]) -> Result<RawFrames<'a>, EngineError> {
        let mut decoder = GifDecoder::new(Cursor::new(bytes))
            .map_err(|e| EngineError::VideoOpen(e.to_string()))?;
        // the declared canvas size drives every frame allocation
        decoder
            .set_limits(Limits::default())
            .map_err(|e| EngineError::VideoOpen(e.to_string()))?;
        let frames = decoder
            .into_frames()
            .map(|frame| {
                frame
                    .map(|f| DynamicImage::ImageRgba8(f.into_buffer()))
                    .map_err(FrameError::from)
            })
            // a broken frame leaves the decoder mid-stream; end the pass there
            .scan(false, |failed, frame| {
                if *failed {
                    return None;
                }
                *failed = frame.is_err();
                Some(frame)
            });
        Ok(Box::new(frames))
    }
}

/// Clamps a caller-supplied stride to at least 1.
pub fn clamp_stride(stride: i64) -> usize {
    usize::try_from(stride.max(1)).unwrap_or(usize::MAX)
}

#[derive(Debug)]
pub struct FrameSample {
    pub index: usize,
    pub tensor: Result<NormalizedTensor, FrameError>,
}

impl FrameSample {
    pub fn decoded(&self) -> bool {
        self.tensor.is_ok()
    }
}

/// Single-pass, lazily produced frame samples.
///
/// Yields one item per sampled frame. If the pass ends without a single
/// decoded sample, a final `Err(EngineError::NoFramesExtracted)` is yielded.
pub struct FrameSamples<'a> {
    frames: RawFrames<'a>,
    normalizer: ImageNormalizer,
    stride: usize,
    next_index: usize,
    decoded: usize,
    finished: bool,
}

impl<'a> FrameSamples<'a> {
    pub fn open(
        decoder: &dyn VideoDecoder,
        normalizer: ImageNormalizer,
        bytes: &'a [u8],
        stride: usize,
    ) -> Result<Self, EngineError> {
        let frames = decoder.open(bytes)?;
        Ok(Self {
            frames,
            normalizer,
            stride: stride.max(1),
            next_index: 0,
            decoded: 0,
            finished: false,
        })
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Frames read from the container so far, sampled or not.
    pub fn frames_read(&self) -> usize {
        self.next_index
    }
}

impl Iterator for FrameSamples<'_> {
    type Item = Result<FrameSample, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        while let Some(frame) = self.frames.next() {
            let index = self.next_index;
            self.next_index += 1;
            if index % self.stride != 0 {
                continue;
            }
            let tensor = frame.and_then(|image| self.normalizer.normalize_image(&image));
            match &tensor {
                Ok(_) => self.decoded += 1,
                Err(e) => log::debug!("Frame {} could not be used: {}", index, e),
            }
            return Some(Ok(FrameSample { index, tensor }));
        }
        self.finished = true;
        if self.decoded == 0 {
            Some(Err(EngineError::NoFramesExtracted))
        } else {
            None
        }
    }
}
