//! Model downloading and loading utilities.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use ort::session::Session;
use sha2::{Digest, Sha256};

use crate::config::{ModelSource, ModelsConfig};
use crate::error::{Error, Result};

/// The two models of the arbitrary style transfer network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Style prediction - maps a style image to a bottleneck vector.
    StylePredict,
    /// Style transform - renders a content image with a bottleneck vector.
    StyleTransform,
}

impl ModelType {
    /// Get the cache filename for this model type.
    #[must_use]
    pub const fn filename(&self) -> &'static str {
        match self {
            Self::StylePredict => "style_predict.onnx",
            Self::StyleTransform => "style_transform.onnx",
        }
    }

    /// File name inside the cache directory.
    ///
    /// Models fetched from a URL carry a short hash of that URL, so pointing
    /// the config at a different URL never picks up an older download.
    #[must_use]
    pub fn cache_filename(&self, url: Option<&str>) -> String {
        let Some(url) = url else {
            return self.filename().to_string();
        };
        let stem = self.filename().trim_end_matches(".onnx");
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        format!("{stem}-{}.onnx", &digest[..16])
    }

    /// Pick this model's entry out of the models config.
    #[must_use]
    pub fn source<'a>(&self, config: &'a ModelsConfig) -> &'a ModelSource {
        match self {
            Self::StylePredict => &config.style_predict,
            Self::StyleTransform => &config.style_transform,
        }
    }
}

/// Manages the model cache directory and downloads.
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new model cache rooted at `cache_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();

        fs::create_dir_all(&cache_dir).map_err(|source| Error::CacheDir {
            path: cache_dir.clone(),
            source,
        })?;

        Ok(Self { cache_dir })
    }

    /// Resolve the on-disk path of a model, downloading it if necessary.
    ///
    /// An explicit `path` is used as is. Otherwise the model lives in the
    /// cache directory under [`ModelType::cache_filename`] and is fetched
    /// from `url` the first time.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is missing and cannot be downloaded.
    pub fn get_model_path(&self, model_type: ModelType, source: &ModelSource) -> Result<PathBuf> {
        if let Some(path) = &source.path {
            if !path.exists() {
                return Err(Error::ModelMissing {
                    name: model_type.filename().to_string(),
                    path: path.clone(),
                });
            }
            return Ok(path.clone());
        }

        let path = self
            .cache_dir
            .join(model_type.cache_filename(source.url.as_deref()));
        if path.exists() {
            return Ok(path);
        }

        match &source.url {
            Some(url) => {
                download_file(url, &path, model_type.filename())?;
                Ok(path)
            }
            None => Err(Error::ModelMissing {
                name: model_type.filename().to_string(),
                path,
            }),
        }
    }

    /// Load an ONNX model session.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be resolved or loaded.
    pub fn load_session(&self, model_type: ModelType, source: &ModelSource) -> Result<Session> {
        let path = self.get_model_path(model_type, source)?;

        tracing::info!("Loading {} from {}", model_type.filename(), path.display());

        Session::builder()
            .map_err(|source| Error::ModelLoad {
                name: model_type.filename().to_string(),
                source,
            })?
            .commit_from_file(&path)
            .map_err(|source| Error::ModelLoad {
                name: model_type.filename().to_string(),
                source,
            })
    }
}

/// Download a file from a URL to a path with progress indication.
fn download_file(url: &str, path: &Path, name: &str) -> Result<()> {
    tracing::info!("Downloading {name} from {url}");

    let client = reqwest::blocking::Client::new();
    let mut response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|source| Error::ModelDownload {
            name: name.to_string(),
            source,
        })?;

    let pb = response
        .content_length()
        .map_or_else(ProgressBar::new_spinner, ProgressBar::new);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Downloading {name}"));

    // Write to a temporary file first, then rename for atomicity
    let temp_path = path.with_extension("tmp");
    let file = fs::File::create(&temp_path)?;
    let mut writer = pb.wrap_write(BufWriter::new(file));

    if let Err(e) = io::copy(&mut response, &mut writer).and_then(|_| writer.flush()) {
        drop(writer);
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    drop(writer);

    pb.finish_with_message(format!("Downloaded {name}"));

    fs::rename(&temp_path, path)?;

    Ok(())
}
