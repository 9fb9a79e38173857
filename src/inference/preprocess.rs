//! Image Preprocessing
//!
//! Turns an encoded image payload into the `[1, 3, height, width]` tensor every
//! classifier consumes. Values are scaled to `[0, 1]`; no mean/std normalization.

use base64::Engine;
use image::{imageops::FilterType, DynamicImage, RgbImage};

use crate::model::config::ImageSize;
use crate::model::INPUT_CHANNELS;
use crate::utils::error::{DiagnosisError, Result};

/// Fixed resampling filter, must match the one used when the weights were trained
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// A single-image batch in channel-major (NCHW) layout
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    shape: [usize; 4],
}

impl ImageTensor {
    /// Wrap raw NCHW values; fails if `data` does not fill `shape`
    pub fn new(data: Vec<f32>, shape: [usize; 4]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(DiagnosisError::Inference(format!(
                "tensor data has {} values, shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self { data, shape })
    }

    /// `[batch, channels, height, width]`
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Resize an image to the target dimensions (no cropping, aspect ratio not kept)
fn resize_image(image: &RgbImage, size: ImageSize) -> RgbImage {
    image::imageops::resize(image, size.width, size.height, RESIZE_FILTER)
}

/// Flatten an RGB image to CHW values in `[0, 1]`
fn scale_to_unit(image: &RgbImage) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let num_pixels = (width * height) as usize;

    let mut values = vec![0.0f32; INPUT_CHANNELS * num_pixels];

    for (i, pixel) in image.pixels().enumerate() {
        // All R values, then all G values, then all B values
        values[i] = pixel[0] as f32 / 255.0;
        values[num_pixels + i] = pixel[1] as f32 / 255.0;
        values[2 * num_pixels + i] = pixel[2] as f32 / 255.0;
    }

    values
}

/// Convert an already decoded image into a classifier input tensor
pub fn preprocess_image(image: &DynamicImage, target_size: ImageSize) -> Result<ImageTensor> {
    // Drops alpha and expands grayscale to three channels
    let rgb = image.to_rgb8();
    let resized = resize_image(&rgb, target_size);

    ImageTensor::new(
        scale_to_unit(&resized),
        [
            1,
            INPUT_CHANNELS,
            target_size.height as usize,
            target_size.width as usize,
        ],
    )
}

/// Decode an encoded image (PNG, JPEG, ...) and convert it into a classifier input
pub fn preprocess(encoded_image: &[u8], target_size: ImageSize) -> Result<ImageTensor> {
    if encoded_image.is_empty() {
        return Err(DiagnosisError::Decode("image payload is empty".to_string()));
    }

    let image = image::load_from_memory(encoded_image)?;
    preprocess_image(&image, target_size)
}

/// Decode the base64 text carried in a diagnosis request
///
/// Accepts an optional `data:<mime>;base64,` prefix as produced by browsers.
pub fn decode_base64_image(payload: &str) -> Result<Vec<u8>> {
    let trimmed = payload.trim();
    let body = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };

    Ok(base64::engine::general_purpose::STANDARD.decode(body)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Luma, LumaA, Rgba, RgbaImage};
    use std::io::Cursor;

    /// Encode a small gradient image as PNG bytes
    pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        });
        encode(DynamicImage::ImageRgb8(image), ImageFormat::Png)
    }

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_output_shape_and_range() {
        let bytes = sample_png(100, 60);
        let tensor = preprocess(&bytes, ImageSize::new(32, 24)).unwrap();

        assert_eq!(tensor.shape(), [1, 3, 24, 32]);
        assert_eq!(tensor.data().len(), 3 * 24 * 32);
        assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let bytes = sample_png(97, 131);
        let size = ImageSize::new(224, 224);

        let first = preprocess(&bytes, size).unwrap();
        let second = preprocess(&bytes, size).unwrap();

        let first_bits: Vec<u32> = first.data().iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u32> = second.data().iter().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn test_alpha_is_discarded() {
        let image = RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 10]));
        let bytes = encode(DynamicImage::ImageRgba8(image), ImageFormat::Png);

        let tensor = preprocess(&bytes, ImageSize::new(4, 4)).unwrap();
        let plane = 16;
        assert_eq!(tensor.data().len(), 3 * plane);
        assert!(tensor.data()[..plane].iter().all(|&v| v == 1.0));
        assert!(tensor.data()[plane..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_grayscale_is_expanded() {
        let image = image::GrayImage::from_pixel(5, 5, Luma([51]));
        let bytes = encode(DynamicImage::ImageLuma8(image), ImageFormat::Png);

        let tensor = preprocess(&bytes, ImageSize::new(5, 5)).unwrap();
        assert_eq!(tensor.shape(), [1, 3, 5, 5]);
        assert!(tensor.data().iter().all(|&v| (v - 0.2).abs() < 1e-6));

        let with_alpha = image::GrayAlphaImage::from_pixel(2, 2, LumaA([255, 0]));
        let bytes = encode(DynamicImage::ImageLumaA8(with_alpha), ImageFormat::Png);
        let tensor = preprocess(&bytes, ImageSize::new(2, 2)).unwrap();
        assert!(tensor.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_invalid_bytes_fail_to_decode() {
        let err = preprocess(b"definitely not an image", ImageSize::new(8, 8)).unwrap_err();
        assert!(matches!(err, DiagnosisError::Decode(_)));

        let err = preprocess(&[], ImageSize::new(8, 8)).unwrap_err();
        assert!(matches!(err, DiagnosisError::Decode(_)));
    }

    #[test]
    fn test_decode_base64_with_and_without_prefix() {
        let bytes = sample_png(4, 4);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        assert_eq!(decode_base64_image(&encoded).unwrap(), bytes);

        let data_url = format!("data:image/png;base64,{}", encoded);
        assert_eq!(decode_base64_image(&data_url).unwrap(), bytes);

        assert!(matches!(
            decode_base64_image("***not base64***"),
            Err(DiagnosisError::Decode(_))
        ));
    }

    #[test]
    fn test_image_tensor_rejects_wrong_length() {
        assert!(ImageTensor::new(vec![0.0; 10], [1, 3, 2, 2]).is_err());
        assert!(ImageTensor::new(vec![0.0; 12], [1, 3, 2, 2]).is_ok());
    }
}
