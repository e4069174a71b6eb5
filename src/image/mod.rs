//! Image loading, preprocessing, and encoding utilities.

mod load;
mod preprocess;
mod save;

pub use load::{decode_image, dynamic_to_tensor, load_image, load_image_within};
pub use preprocess::preprocess_image;
pub use save::{encode_image, save_image, tensor_to_rgb};

use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Image tensor in NHWC format (batch, height, width, channels).
/// Values are normalized to [0, 1], the range the style models expect.
pub type ImageTensor = Array4<f32>;

/// Square size the style-prediction model takes.
pub const STYLE_IMAGE_SIZE: usize = 256;

/// Square size content images are stylized at.
pub const CONTENT_IMAGE_SIZE: usize = 384;

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
}

impl OutputFormat {
    /// MIME type for HTTP responses.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// Conventional file extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Guess the format from a file extension, if it is one we encode.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

/// `(height, width)` of an NHWC tensor.
#[must_use]
pub fn spatial_dims(tensor: &ImageTensor) -> (usize, usize) {
    let (_, height, width, _) = tensor.dim();
    (height, width)
}
