//! Image loading utilities.

use std::path::Path;

use image::{DynamicImage, ImageError, ImageReader, Limits};
use ndarray::Array4;

use crate::error::{Error, Result};

use super::{ImageTensor, RGB_CHANNELS};

/// Load an image from disk and convert to a normalized tensor.
///
/// The image is:
/// 1. Loaded from the specified path
/// 2. Converted to RGB if necessary
/// 3. Normalized to [0, 1] range
/// 4. Returned as NHWC tensor (1, H, W, 3)
///
/// # Errors
///
/// Returns an error if the file is unreadable or not a supported image format.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ImageTensor> {
    load_with_limits(path.as_ref(), Limits::default())
}

/// Like [`load_image`], but refuse images wider or taller than
/// `max_dimension` before decoding any pixel data.
///
/// The format is sniffed from the file contents, so downloads saved under an
/// arbitrary name still decode.
///
/// # Errors
///
/// Returns an error if the file is unreadable, not a supported image format,
/// or larger than `max_dimension` on either side.
pub fn load_image_within<P: AsRef<Path>>(path: P, max_dimension: u32) -> Result<ImageTensor> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);
    load_with_limits(path.as_ref(), limits)
}

fn load_with_limits(path: &Path, limits: Limits) -> Result<ImageTensor> {
    let to_load_err = |source: ImageError| Error::ImageLoad {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ImageReader::open(path)
        .and_then(ImageReader::with_guessed_format)
        .map_err(|e| to_load_err(ImageError::IoError(e)))?;
    reader.limits(limits);

    let img = reader.decode().map_err(to_load_err)?;
    Ok(dynamic_to_tensor(&img))
}

/// Decode an in-memory encoded image (JPEG, PNG, ...) to a normalized tensor.
///
/// # Errors
///
/// Returns an error if the bytes are not a supported image format.
pub fn decode_image(bytes: &[u8]) -> Result<ImageTensor> {
    let img = image::load_from_memory(bytes).map_err(|source| Error::ImageDecode { source })?;
    Ok(dynamic_to_tensor(&img))
}

/// Convert a `DynamicImage` to a normalized NHWC tensor.
#[must_use]
pub fn dynamic_to_tensor(img: &DynamicImage) -> ImageTensor {
    let rgb = img.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);

    let mut tensor = Array4::<f32>::zeros((1, height, width, RGB_CHANNELS));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..RGB_CHANNELS {
            tensor[[0, y, x, c]] = f32::from(pixel[c]) / 255.0;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_tensor_shape_keeps_dimensions() {
        let img = DynamicImage::new_rgb8(40, 25);
        let tensor = dynamic_to_tensor(&img);

        assert_eq!(tensor.shape(), &[1, 25, 40, 3]);
    }

    #[test]
    fn test_normalization_range() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([255, 255, 255]));
        let tensor = dynamic_to_tensor(&DynamicImage::ImageRgb8(img));

        assert!(tensor[[0, 0, 0, 0]].abs() < f32::EPSILON);
        assert!((tensor[[0, 0, 1, 2]] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_grayscale_is_expanded_to_rgb() {
        let img = DynamicImage::new_luma8(3, 3);
        let tensor = dynamic_to_tensor(&img);

        assert_eq!(tensor.shape(), &[1, 3, 3, 3]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, Error::ImageDecode { .. }));
    }

    #[test]
    fn test_load_sniffs_format_from_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("download");
        RgbImage::from_pixel(5, 4, Rgb([255, 0, 0]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        let tensor = load_image(&path).unwrap();
        assert_eq!(tensor.shape(), &[1, 4, 5, 3]);
    }

    #[test]
    fn test_load_within_rejects_oversized_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        RgbImage::new(300, 10).save(&path).unwrap();

        let err = load_image_within(&path, 256).unwrap_err();
        assert!(matches!(err, Error::ImageLoad { .. }));
        assert!(load_image_within(&path, 300).is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_image("/nonexistent/pastiche/input.png").unwrap_err();
        assert!(matches!(err, Error::ImageLoad { .. }));
    }
}
