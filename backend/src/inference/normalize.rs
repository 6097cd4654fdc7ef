use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};
use ndarray::{Array3, ArrayView3};
use std::io::Cursor;

use crate::error::{EngineError, FrameError};

pub const TENSOR_HEIGHT: usize = 224;
pub const TENSOR_WIDTH: usize = 224;
pub const TENSOR_CHANNELS: usize = 3;

/// A 224x224 RGB image in height, width, channel order with values in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Array3<f32>,
}

impl NormalizedTensor {
    pub const SHAPE: [usize; 3] = [TENSOR_HEIGHT, TENSOR_WIDTH, TENSOR_CHANNELS];

    /// Wraps an existing array, rejecting anything that breaks the fixed
    /// shape or the [0, 1] value range.
    pub fn from_array(data: Array3<f32>) -> Result<Self, FrameError> {
        if data.shape() != Self::SHAPE {
            return Err(FrameError::Convert(format!(
                "expected shape {:?}, got {:?}",
                Self::SHAPE,
                data.shape()
            )));
        }
        if data.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(FrameError::Convert("tensor values must lie in [0, 1]".into()));
        }
        Ok(Self { data })
    }

    /// Every element set to `value`, clamped into [0, 1].
    pub fn filled(value: f32) -> Self {
        Self {
            data: Array3::from_elem(
                (TENSOR_HEIGHT, TENSOR_WIDTH, TENSOR_CHANNELS),
                value.clamp(0.0, 1.0),
            ),
        }
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major copy of the values, for backends that want a flat buffer.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

/// Decodes images into [`NormalizedTensor`]s: RGB conversion, fixed-size
/// resize and division by 255.
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    filter: FilterType,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(FilterType::CatmullRom)
    }
}

impl ImageNormalizer {
    pub fn new(filter: FilterType) -> Self {
        Self { filter }
    }

    pub fn normalize_bytes(&self, bytes: &[u8]) -> Result<NormalizedTensor, EngineError> {
        let image = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| EngineError::Decode(e.to_string()))?
            .decode()
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        self.normalize_image(&image)
            .map_err(|e| EngineError::Decode(e.to_string()))
    }

    pub fn normalize_image(&self, image: &DynamicImage) -> Result<NormalizedTensor, FrameError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(FrameError::Convert("image has no pixels".into()));
        }
        Ok(self.normalize_rgb(&image.to_rgb8()))
    }

    fn normalize_rgb(&self, rgb: &RgbImage) -> NormalizedTensor {
        let (width, height) = (TENSOR_WIDTH as u32, TENSOR_HEIGHT as u32);
        let resized;
        let source = if rgb.dimensions() == (width, height) {
            rgb
        } else {
            resized = image::imageops::resize(rgb, width, height, self.filter);
            &resized
        };
        let data = Array3::from_shape_fn(
            (TENSOR_HEIGHT, TENSOR_WIDTH, TENSOR_CHANNELS),
            |(y, x, c)| f32::from(source.get_pixel(x as u32, y as u32)[c]) / 255.0,
        );
        NormalizedTensor { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn encode_png(image: RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn resizes_any_aspect_ratio_to_fixed_shape() {
        let normalizer = ImageNormalizer::default();
        for (w, h) in [(640, 480), (17, 300), (224, 224), (1, 1)] {
            let bytes = encode_png(RgbImage::from_pixel(w, h, Rgb([10, 20, 30])));
            let tensor = normalizer.normalize_bytes(&bytes).unwrap();
            assert_eq!(tensor.view().shape(), NormalizedTensor::SHAPE);
        }
    }

    #[test]
    fn scales_values_by_255() {
        let bytes = encode_png(RgbImage::from_pixel(32, 32, Rgb([255, 0, 51])));
        let tensor = ImageNormalizer::default().normalize_bytes(&bytes).unwrap();
        let view = tensor.view();
        assert_eq!(view[[100, 100, 0]], 1.0);
        assert_eq!(view[[100, 100, 1]], 0.0);
        assert!((view[[100, 100, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn grayscale_input_becomes_three_channels() {
        let gray = image::GrayImage::from_pixel(50, 40, image::Luma([128]));
        let tensor = ImageNormalizer::default()
            .normalize_image(&DynamicImage::ImageLuma8(gray))
            .unwrap();
        let view = tensor.view();
        assert_eq!(view[[0, 0, 0]], view[[0, 0, 2]]);
    }

    #[test]
    fn corrupt_bytes_are_a_decode_error() {
        let err = ImageNormalizer::default()
            .normalize_bytes(b"definitely not an image")
            .unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[test]
    fn truncated_png_is_a_decode_error() {
        let bytes = encode_png(RgbImage::from_pixel(64, 64, Rgb([1, 2, 3])));
        let err = ImageNormalizer::default()
            .normalize_bytes(&bytes[..bytes.len() / 2])
            .unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[test]
    fn from_array_rejects_wrong_shape_and_range() {
        assert!(NormalizedTensor::from_array(Array3::zeros((10, 10, 3))).is_err());
        assert!(NormalizedTensor::from_array(Array3::from_elem((224, 224, 3), 1.5)).is_err());
        assert!(NormalizedTensor::from_array(Array3::from_elem((224, 224, 3), 0.5)).is_ok());
    }
}
