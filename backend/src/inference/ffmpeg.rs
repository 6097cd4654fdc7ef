//! FFmpeg-backed container decoding (MP4, AVI, MOV, WebM, ...).
//!
//! libavformat opens inputs by path, so the upload is spooled to a
//! uniquely named file in the system temp directory for the lifetime of the
//! frame stream.

use std::fs;
use std::path::PathBuf;

use ffmpeg_next as ffmpeg;
use ffmpeg::codec::packet::Packet;
use ffmpeg::format::{context::Input, Pixel};
use ffmpeg::software::scaling::{context::Context as Scaler, flag::Flags};
use ffmpeg::util::frame::video::Video;
use image::{DynamicImage, RgbImage};
use uuid::Uuid;

use super::frames::{RawFrames, VideoDecoder};
use crate::error::{EngineError, FrameError};

#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegDecoder;

impl VideoDecoder for FfmpegDecoder {
    fn open<'a>(&self, bytes: &'a [u8]) -> Result<RawFrames<'a>, EngineError> {
        ffmpeg::init().map_err(|e| EngineError::VideoOpen(e.to_string()))?;
        let file = SpooledInput::write(bytes)?;
        let input =
            ffmpeg::format::input(&file.path).map_err(|e| EngineError::VideoOpen(e.to_string()))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| EngineError::VideoOpen("no video stream".into()))?;
        let stream_index = stream.index();
        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|e| EngineError::VideoOpen(e.to_string()))?;
        log::debug!(
            "Opened {} video stream {} ({}x{})",
            input.format().name(),
            stream_index,
            decoder.width(),
            decoder.height()
        );

        Ok(Box::new(FfmpegFrames {
            input,
            decoder,
            stream_index,
            scaler: None,
            flushing: false,
            done: false,
            _file: file,
        }))
    }
}

/// Upload bytes on disk; removed on drop.
struct SpooledInput {
    path: PathBuf,
}

impl SpooledInput {
    fn write(bytes: &[u8]) -> Result<Self, EngineError> {
        let path = std::env::temp_dir().join(format!("deepshield-{}.video", Uuid::new_v4()));
        fs::write(&path, bytes).map_err(|e| EngineError::VideoOpen(e.to_string()))?;
        Ok(Self { path })
    }
}

impl Drop for SpooledInput {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

/// Demux-decode loop over the selected stream, one RGB frame per `next`.
struct FfmpegFrames {
    input: Input,
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
    scaler: Option<((Pixel, u32, u32), Scaler)>,
    flushing: bool,
    done: bool,
    // declared last: the demuxer must close before the file goes away
    _file: SpooledInput,
}

impl FfmpegFrames {
    fn to_rgb(&mut self, frame: &Video) -> Result<DynamicImage, FrameError> {
        let (width, height) = (frame.width(), frame.height());
        let key = (frame.format(), width, height);
        if self.scaler.as_ref().is_none_or(|(current, _)| *current != key) {
            let scaler = Scaler::get(
                key.0,
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                Flags::BILINEAR,
            )
            .map_err(|e| FrameError::Convert(e.to_string()))?;
            self.scaler = Some((key, scaler));
        }
        let Some((_, scaler)) = self.scaler.as_mut() else {
            return Err(FrameError::Convert("scaler unavailable".into()));
        };

        let mut rgb = Video::empty();
        scaler
            .run(frame, &mut rgb)
            .map_err(|e| FrameError::Convert(e.to_string()))?;

        let row = width as usize * 3;
        let stride = rgb.stride(0);
        let data = rgb.data(0);
        let mut pixels = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            let line = data
                .get(y * stride..y * stride + row)
                .ok_or_else(|| FrameError::Convert("short RGB plane".into()))?;
            pixels.extend_from_slice(line);
        }
        RgbImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| FrameError::Convert("RGB buffer size mismatch".into()))
    }
}

impl Iterator for FfmpegFrames {
    type Item = Result<DynamicImage, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let mut decoded = Video::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => return Some(self.to_rgb(&decoded)),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {}
                Err(ffmpeg::Error::Eof) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(FrameError::Decode(e.to_string())));
                }
            }
            if self.flushing {
                self.done = true;
                return None;
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.stream_index => {
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        return Some(Err(FrameError::Decode(e.to_string())));
                    }
                }
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => self.flush(),
                Err(e) => {
                    self.flush();
                    return Some(Err(FrameError::Decode(e.to_string())));
                }
            }
        }
        None
    }
}

impl FfmpegFrames {
    fn flush(&mut self) {
        self.flushing = true;
        if let Err(e) = self.decoder.send_eof() {
            log::debug!("Decoder flush failed: {}", e);
            self.done = true;
        }
    }
}
