//! Style-prediction and style-transform model calls.

use ndarray::{Array4, Ix4};
use ort::session::Session;
use ort::value::Tensor;

use crate::error::{Error, Result};
use crate::image::ImageTensor;

use super::Bottleneck;

/// Predict the style bottleneck of a preprocessed style image.
///
/// # Arguments
///
/// * `session` - ONNX session for the style-prediction model
/// * `style_image` - NHWC tensor in [0, 1], already cropped to the model size
///
/// # Errors
///
/// Returns an error if inference fails.
pub fn predict_style(session: &mut Session, style_image: &ImageTensor) -> Result<Bottleneck> {
    let input_value =
        Tensor::from_array(style_image.clone()).map_err(|source| Error::Inference { source })?;

    let outputs = session
        .run(ort::inputs![input_value])
        .map_err(|source| Error::Inference { source })?;

    let output = outputs
        .values()
        .next()
        .ok_or_else(|| Error::ShapeMismatch {
            expected: "style bottleneck output".to_string(),
            actual: "no output".to_string(),
        })?;

    extract_array4(&output)
}

/// Render a preprocessed content image with a style bottleneck.
///
/// The content image feeds the first model input, the bottleneck the second.
///
/// # Errors
///
/// Returns an error if inference fails.
pub fn transform_style(
    session: &mut Session,
    bottleneck: &Bottleneck,
    content_image: &ImageTensor,
) -> Result<ImageTensor> {
    let content_value =
        Tensor::from_array(content_image.clone()).map_err(|source| Error::Inference { source })?;
    let bottleneck_value =
        Tensor::from_array(bottleneck.clone()).map_err(|source| Error::Inference { source })?;

    let outputs = session
        .run(ort::inputs![content_value, bottleneck_value])
        .map_err(|source| Error::Inference { source })?;

    let output = outputs
        .values()
        .next()
        .ok_or_else(|| Error::ShapeMismatch {
            expected: "stylized image output".to_string(),
            actual: "no output".to_string(),
        })?;

    extract_array4(&output)
}

/// Copy a 4D `f32` output out of the session.
fn extract_array4(value: &ort::value::ValueRef<'_>) -> Result<Array4<f32>> {
    let view = value
        .try_extract_array::<f32>()
        .map_err(|source| Error::Inference { source })?;
    let ndim = view.ndim();

    view.into_dimensionality::<Ix4>()
        .map(|array| array.to_owned())
        .map_err(|_| Error::ShapeMismatch {
            expected: "4D tensor".to_string(),
            actual: format!("{ndim}D tensor"),
        })
}
