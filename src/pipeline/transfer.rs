//! Style transfer pipeline.

use std::path::Path;

use ort::session::Session;

use crate::config::{Config, ModelsConfig};
use crate::error::Result;
use crate::image::{self, ImageTensor};
use crate::model::{ModelCache, ModelType};

use super::blend::{blend_bottlenecks, BlendingRatio};
use super::inference::{predict_style, transform_style};
use super::Bottleneck;

/// The model runtime behind the pipeline.
///
/// Both calls receive images that are already preprocessed to the sizes the
/// pipeline was configured with.
pub trait StyleBackend: Send {
    /// Map a style image to its bottleneck.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn predict(&mut self, style_image: &ImageTensor) -> Result<Bottleneck>;

    /// Render `content_image` with `bottleneck`.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn transform(&mut self, bottleneck: &Bottleneck, content_image: &ImageTensor)
    -> Result<ImageTensor>;
}

/// ONNX Runtime sessions for the two style models.
pub struct OrtBackend {
    style_predict: Session,
    style_transform: Session,
}

impl OrtBackend {
    /// Resolve (downloading if needed) and load both models.
    ///
    /// # Errors
    ///
    /// Returns an error if either model cannot be found or loaded.
    pub fn load(config: &ModelsConfig) -> Result<Self> {
        let cache = ModelCache::new(&config.cache_dir)?;

        tracing::info!("Loading style prediction model...");
        let style_predict = cache.load_session(
            ModelType::StylePredict,
            ModelType::StylePredict.source(config),
        )?;

        tracing::info!("Loading style transform model...");
        let style_transform = cache.load_session(
            ModelType::StyleTransform,
            ModelType::StyleTransform.source(config),
        )?;

        Ok(Self {
            style_predict,
            style_transform,
        })
    }
}

impl StyleBackend for OrtBackend {
    fn predict(&mut self, style_image: &ImageTensor) -> Result<Bottleneck> {
        predict_style(&mut self.style_predict, style_image)
    }

    fn transform(
        &mut self,
        bottleneck: &Bottleneck,
        content_image: &ImageTensor,
    ) -> Result<ImageTensor> {
        transform_style(&mut self.style_transform, bottleneck, content_image)
    }
}

/// Result of one stylization, with the shapes of every intermediate.
#[derive(Debug, Clone)]
pub struct Stylized {
    pub image: ImageTensor,
    pub content_shape: Vec<usize>,
    pub style_shape: Vec<usize>,
    pub bottleneck_shape: Vec<usize>,
    pub ratio: BlendingRatio,
}

/// Preprocesses images and drives a [`StyleBackend`].
pub struct Pipeline {
    backend: Box<dyn StyleBackend>,
    style_dimension: usize,
    content_dimension: usize,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        backend: Box<dyn StyleBackend>,
        style_dimension: usize,
        content_dimension: usize,
    ) -> Self {
        Self {
            backend,
            style_dimension,
            content_dimension,
        }
    }

    /// Create a pipeline backed by ONNX Runtime.
    ///
    /// This will download models if they are not already cached and a URL
    /// is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or models cannot be
    /// loaded.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let backend = OrtBackend::load(&config.models)?;
        tracing::info!("Pipeline initialized successfully");

        Ok(Self::new(
            Box::new(backend),
            config.images.style_dimension,
            config.images.content_dimension,
        ))
    }

    /// Stylize `content` with `style`.
    ///
    /// With a non-zero ratio the content image's own bottleneck is predicted
    /// (at the style dimension) and blended in.
    ///
    /// # Errors
    ///
    /// Returns an error if preprocessing or inference fails.
    pub fn stylize(
        &mut self,
        content: &ImageTensor,
        style: &ImageTensor,
        ratio: BlendingRatio,
    ) -> Result<Stylized> {
        let preprocessed_content = image::preprocess_image(content, self.content_dimension)?;
        let preprocessed_style = image::preprocess_image(style, self.style_dimension)?;

        tracing::debug!(
            "Preprocessed content {:?}, style {:?}",
            preprocessed_content.shape(),
            preprocessed_style.shape()
        );

        let style_bottleneck = self.backend.predict(&preprocessed_style)?;

        let bottleneck = if ratio.uses_content() {
            let content_for_predict = image::preprocess_image(content, self.style_dimension)?;
            let content_bottleneck = self.backend.predict(&content_for_predict)?;
            blend_bottlenecks(&content_bottleneck, &style_bottleneck, ratio)?
        } else {
            style_bottleneck
        };

        let stylized = self
            .backend
            .transform(&bottleneck, &preprocessed_content)?;

        tracing::debug!("Stylized output {:?}", stylized.shape());

        Ok(Stylized {
            content_shape: preprocessed_content.shape().to_vec(),
            style_shape: preprocessed_style.shape().to_vec(),
            bottleneck_shape: bottleneck.shape().to_vec(),
            image: stylized,
            ratio,
        })
    }

    /// Stylize image files on disk and write the result.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, stylizing, or saving fails.
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(
        &mut self,
        content_path: P,
        style_path: Q,
        output_path: R,
        ratio: BlendingRatio,
        quality: u8,
    ) -> Result<()> {
        let content_path = content_path.as_ref();
        let style_path = style_path.as_ref();
        let output_path = output_path.as_ref();

        tracing::info!(
            "Stylizing {} with {}",
            content_path.display(),
            style_path.display()
        );

        let content = image::load_image(content_path)?;
        let style = image::load_image(style_path)?;

        let stylized = self.stylize(&content, &style, ratio)?;

        tracing::info!("Saving output to: {}", output_path.display());
        image::save_image(&stylized.image, output_path, quality)?;

        tracing::info!("Processing complete");
        Ok(())
    }
}
