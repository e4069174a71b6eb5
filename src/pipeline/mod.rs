//! Two-stage arbitrary style transfer: predict a style bottleneck, blend it,
//! and render the content image with it.

mod blend;
mod inference;
mod transfer;

pub use blend::{blend_bottlenecks, BlendingRatio};
pub use inference::{predict_style, transform_style};
pub use transfer::{OrtBackend, Pipeline, StyleBackend, Stylized};

use ndarray::Array4;

/// Style bottleneck produced by the style-prediction model, (1, 1, 1, 100)
/// for the magenta arbitrary-stylization models.
pub type Bottleneck = Array4<f32>;
