//! Image encoding and saving utilities.

use std::io::Cursor;
use std::path::Path;

use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::error::{Error, Result};

use super::{spatial_dims, ImageTensor, OutputFormat};

/// Encode a tensor into an in-memory image.
///
/// # Arguments
///
/// * `tensor` - NHWC tensor with values in [0, 1]
/// * `format` - Output encoding
/// * `quality` - JPEG quality (1-100), ignored for PNG
///
/// # Errors
///
/// Returns an error if the encoder fails.
pub fn encode_image(tensor: &ImageTensor, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    let img = DynamicImage::ImageRgb8(tensor_to_rgb(tensor));
    let mut buffer = Cursor::new(Vec::new());

    let encoded = match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            img.write_with_encoder(encoder)
        }
        OutputFormat::Png => img.write_to(&mut buffer, ImageFormat::Png),
    };
    encoded.map_err(|source| Error::ImageEncode {
        format: format.extension().to_string(),
        source,
    })?;

    Ok(buffer.into_inner())
}

/// Save a tensor as an image file.
///
/// The format is inferred from the extension: `.jpg`/`.jpeg` use the given
/// quality, anything else goes through the `image` crate's default encoder
/// for that extension.
///
/// # Errors
///
/// Returns an error if the image cannot be saved.
pub fn save_image<P: AsRef<Path>>(tensor: &ImageTensor, path: P, quality: u8) -> Result<()> {
    let path = path.as_ref();

    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(OutputFormat::from_extension);

    match format {
        Some(format) => {
            let bytes = encode_image(tensor, format, quality)?;
            std::fs::write(path, bytes)?;
        }
        None => {
            tensor_to_rgb(tensor)
                .save(path)
                .map_err(|source| Error::ImageSave {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
    }

    Ok(())
}

/// Convert a normalized NHWC tensor to an RGB image.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn tensor_to_rgb(tensor: &ImageTensor) -> RgbImage {
    let (height, width) = spatial_dims(tensor);

    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            denormalize(tensor[[0, y, x, 0]]),
            denormalize(tensor[[0, y, x, 1]]),
            denormalize(tensor[[0, y, x, 2]]),
        ])
    })
}

/// Denormalize a value from [0, 1] to [0, 255] with clamping.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn denormalize(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_denormalize() {
        assert_eq!(denormalize(0.0), 0);
        assert_eq!(denormalize(0.5), 128);
        assert_eq!(denormalize(1.0), 255);
    }

    #[test]
    fn test_denormalize_clamp() {
        assert_eq!(denormalize(-2.0), 0);
        assert_eq!(denormalize(2.0), 255);
        assert_eq!(denormalize(f32::NAN), 0);
    }

    #[test]
    fn test_encoded_dimensions() {
        let tensor = Array4::from_elem((1, 48, 64, 3), 0.3);

        for format in [OutputFormat::Jpeg, OutputFormat::Png] {
            let bytes = encode_image(&tensor, format, 90).unwrap();
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (64, 48));
        }
    }

    #[test]
    fn test_encoded_format_signature() {
        let tensor = Array4::from_elem((1, 8, 8, 3), 1.0);

        let jpeg = encode_image(&tensor, OutputFormat::Jpeg, 95).unwrap();
        let png = encode_image(&tensor, OutputFormat::Png, 95).unwrap();

        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&png[..4], b"\x89PNG");
    }

    #[test]
    fn test_save_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let tensor = Array4::from_elem((1, 5, 7, 3), 0.0);

        let path = dir.path().join("out.png");
        save_image(&tensor, &path, 80).unwrap();

        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (7, 5));
    }
}
