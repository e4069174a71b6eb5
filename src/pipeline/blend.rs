//! Linear interpolation between content and style bottlenecks.

use crate::error::{Error, Result};

use super::Bottleneck;

/// How much of the content image's own style is mixed back in, in [0, 1].
///
/// Out-of-range (or NaN) input is not an error: it is replaced with 0.0 and
/// logged, so a bad ratio degrades to plain style transfer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlendingRatio(f32);

impl BlendingRatio {
    #[must_use]
    pub fn new(value: f32) -> Self {
        if (0.0..=1.0).contains(&value) {
            Self(value)
        } else {
            tracing::warn!("Blending ratio {value} is outside [0, 1], using 0.0");
            Self(0.0)
        }
    }

    #[must_use]
    pub const fn value(self) -> f32 {
        self.0
    }

    /// Whether the content bottleneck contributes at all.
    #[must_use]
    pub fn uses_content(self) -> bool {
        self.0 > 0.0
    }
}

impl From<f32> for BlendingRatio {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

/// `ratio * content + (1 - ratio) * style`.
///
/// # Errors
///
/// Returns an error if the two bottlenecks differ in shape.
pub fn blend_bottlenecks(
    content: &Bottleneck,
    style: &Bottleneck,
    ratio: BlendingRatio,
) -> Result<Bottleneck> {
    if content.shape() != style.shape() {
        return Err(Error::ShapeMismatch {
            expected: format!("{:?}", style.shape()),
            actual: format!("{:?}", content.shape()),
        });
    }

    let r = ratio.value();
    Ok(content * r + style * (1.0 - r))
}
