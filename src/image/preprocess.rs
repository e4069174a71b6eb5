//! Aspect-preserving resize followed by a center crop or pad to a square.

use image::imageops::{self, FilterType};
use image::{Rgb, Rgb32FImage};
use ndarray::{s, Array4, ArrayView4};

use crate::error::{Error, Result};

use super::{spatial_dims, ImageTensor, RGB_CHANNELS};

/// Resize so the shorter side equals `target`, then crop or pad to
/// `target x target`.
///
/// The longer side is scaled by the same factor and truncated, so it may
/// end up one pixel short of an exact multiple; the crop/pad step absorbs
/// that. Only the source region that survives the crop is resized, so a
/// very thin image never materializes its full scaled-up length.
///
/// # Errors
///
/// Returns an error if `target` is zero or the image has no pixels.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn preprocess_image(image: &ImageTensor, target: usize) -> Result<ImageTensor> {
    let (height, width) = spatial_dims(image);

    if target == 0 {
        return Err(Error::UnsupportedDimensions {
            width,
            height,
            reason: "target dimension must be greater than 0".to_string(),
        });
    }
    if height == 0 || width == 0 {
        return Err(Error::UnsupportedDimensions {
            width,
            height,
            reason: "image has no pixels".to_string(),
        });
    }

    let short = height.min(width) as f32;
    let scale = target as f32 / short;
    let new_height = ((height as f32 * scale) as usize).max(1);
    let new_width = ((width as f32 * scale) as usize).max(1);

    tracing::debug!("Resizing {height}x{width} -> {new_height}x{new_width}, square {target}");

    let (y0, len_y, out_height) = source_window(height, new_height, target);
    let (x0, len_x, out_width) = source_window(width, new_width, target);
    let window = image.slice(s![.., y0..y0 + len_y, x0..x0 + len_x, ..]);

    let resized = resize_bilinear(window, out_height, out_width);
    Ok(crop_or_pad(&resized, target))
}

/// `(source start, source length, resized length)` along one axis.
///
/// When the scaled axis is longer than `target`, the centered crop window is
/// mapped back into source pixels and that window alone is resized to
/// `target`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn source_window(size: usize, resized: usize, target: usize) -> (usize, usize, usize) {
    if resized <= target {
        return (0, size, resized);
    }

    let ratio = size as f64 / resized as f64;
    let offset = ((resized - target) / 2) as f64;
    let len = ((target as f64 * ratio).round() as usize).clamp(1, size);
    let start = ((offset * ratio).round() as usize).min(size - len);
    (start, len, target)
}

/// Bilinear resize of an NHWC tensor.
#[allow(clippy::cast_possible_truncation)]
fn resize_bilinear(image: ArrayView4<'_, f32>, new_height: usize, new_width: usize) -> ImageTensor {
    let (_, height, width, _) = image.dim();
    if (height, width) == (new_height, new_width) {
        return image.to_owned();
    }

    let source = Rgb32FImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([image[[0, y, x, 0]], image[[0, y, x, 1]], image[[0, y, x, 2]]])
    });
    let resized = imageops::resize(
        &source,
        new_width as u32,
        new_height as u32,
        FilterType::Triangle,
    );

    Array4::from_shape_fn((1, new_height, new_width, RGB_CHANNELS), |(_, y, x, c)| {
        resized.get_pixel(x as u32, y as u32)[c]
    })
}

/// Center-crop axes longer than `target` and zero-pad axes shorter than it.
fn crop_or_pad(image: &ImageTensor, target: usize) -> ImageTensor {
    let (_, height, width, channels) = image.dim();
    let (src_y, dst_y, len_y) = axis_window(height, target);
    let (src_x, dst_x, len_x) = axis_window(width, target);

    let mut out = Array4::<f32>::zeros((1, target, target, channels));
    out.slice_mut(s![.., dst_y..dst_y + len_y, dst_x..dst_x + len_x, ..])
        .assign(&image.slice(s![.., src_y..src_y + len_y, src_x..src_x + len_x, ..]));
    out
}

/// `(source offset, destination offset, length)` along one axis.
const fn axis_window(size: usize, target: usize) -> (usize, usize, usize) {
    if size >= target {
        ((size - target) / 2, 0, target)
    } else {
        (0, (target - size) / 2, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(height: usize, width: usize, value: f32) -> ImageTensor {
        Array4::from_elem((1, height, width, RGB_CHANNELS), value)
    }

    #[test]
    fn test_output_is_exact_square() {
        for (h, w) in [(300, 500), (500, 300), (100, 100), (37, 1000)] {
            let out = preprocess_image(&filled(h, w, 0.5), 64).unwrap();
            assert_eq!(out.shape(), &[1, 64, 64, 3], "input {h}x{w}");
        }
    }

    #[test]
    fn test_upscales_small_images() {
        let out = preprocess_image(&filled(10, 20, 0.25), 256).unwrap();

        assert_eq!(out.shape(), &[1, 256, 256, 3]);
        // Short side scaled to fill the square: no padding anywhere.
        assert!(out.iter().all(|&v| (v - 0.25).abs() < 1e-4));
    }

    #[test]
    fn test_crop_keeps_center_of_long_axis() {
        // Wide image: left third 0.0, middle third 1.0, right third 0.0.
        let image = Array4::from_shape_fn((1, 30, 90, 3), |(_, _, x, _)| {
            if (30..60).contains(&x) { 1.0 } else { 0.0 }
        });
        let out = preprocess_image(&image, 30).unwrap();

        assert_eq!(out.shape(), &[1, 30, 30, 3]);
        assert!(out.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_thin_image_only_resizes_cropped_window() {
        // Scaling the short side to 384 would make the long side 768000.
        let out = preprocess_image(&filled(1, 2000, 0.75), 384).unwrap();

        assert_eq!(out.shape(), &[1, 384, 384, 3]);
        assert!(out.iter().all(|&v| (v - 0.75).abs() < 1e-4));
    }

    #[test]
    fn test_source_window() {
        // Axis that fits: whole source, scaled length kept.
        assert_eq!(source_window(100, 50, 64), (0, 100, 50));
        // 90 -> 90 cropped to 30: middle third.
        assert_eq!(source_window(90, 90, 30), (30, 30, 30));
        // 2000 -> 768000 cropped to 384: one source pixel in the middle.
        let (start, len, resized) = source_window(2000, 768_000, 384);
        assert!((999..=1000).contains(&start), "start {start}");
        assert_eq!((len, resized), (1, 384));
        // 500 -> 200 cropped to 100: same region as full resize then crop.
        assert_eq!(source_window(500, 200, 100), (125, 250, 100));
    }

    #[test]
    fn test_axis_window() {
        assert_eq!(axis_window(10, 4), (3, 0, 4));
        assert_eq!(axis_window(4, 10), (0, 3, 4));
        assert_eq!(axis_window(7, 7), (0, 0, 7));
    }

    #[test]
    fn test_crop_or_pad_centers() {
        let row = Array4::from_shape_fn((1, 1, 4, 3), |(_, _, x, _)| x as f32);
        let out = crop_or_pad(&row, 2);

        assert_eq!(out.shape(), &[1, 2, 2, 3]);
        assert_eq!(out[[0, 0, 0, 0]], 1.0);
        assert_eq!(out[[0, 0, 1, 0]], 2.0);
        // Height was 1: padded with zeros below.
        assert_eq!(out[[0, 1, 0, 0]], 0.0);
        assert_eq!(out[[0, 1, 1, 0]], 0.0);
    }

    #[test]
    fn test_rejects_zero_target() {
        let err = preprocess_image(&filled(4, 4, 0.0), 0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDimensions { .. }));
    }

    #[test]
    fn test_rejects_empty_image() {
        let err = preprocess_image(&filled(0, 4, 0.0), 8).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDimensions { .. }));
    }
}
