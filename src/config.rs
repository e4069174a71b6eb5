//! Service configuration: TOML file, defaults, and environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::image::{OutputFormat, CONTENT_IMAGE_SIZE, STYLE_IMAGE_SIZE};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub images: ImageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host (default: 127.0.0.1)
    pub host: String,
    /// Bind port (default: 8000)
    pub port: u16,
    /// Maximum JSON request body size in bytes
    pub max_body_bytes: usize,
    /// Per-request timeout; covers both downloads and inference
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            max_body_bytes: 65_536,
            request_timeout_secs: 120,
        }
    }
}

/// Where to find one model file.
///
/// `path` wins over `url`; with neither, the model is looked up in the cache
/// directory under its default file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSource {
    pub path: Option<PathBuf>,
    pub url: Option<String>,
}

impl ModelSource {
    /// Build a source from a single string that is either a URL or a path.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            Self {
                path: None,
                url: Some(value.to_string()),
            }
        } else {
            Self {
                path: Some(PathBuf::from(value)),
                url: None,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub cache_dir: PathBuf,
    pub style_predict: ModelSource,
    pub style_transform: ModelSource,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_root().join("models"),
            style_predict: ModelSource::default(),
            style_transform: ModelSource::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Square size style images (and content bottleneck inputs) are cropped to
    pub style_dimension: usize,
    /// Square size content images are stylized at
    pub content_dimension: usize,
    pub output_format: OutputFormat,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Where source images are downloaded to
    pub download_dir: PathBuf,
    /// Delete downloaded source images once a request is done with them
    pub cleanup_downloads: bool,
    /// Largest source image download accepted, in bytes
    pub max_image_bytes: u64,
    /// Largest width or height a source image may decode to
    pub max_image_dimension: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            style_dimension: STYLE_IMAGE_SIZE,
            content_dimension: CONTENT_IMAGE_SIZE,
            output_format: OutputFormat::Jpeg,
            jpeg_quality: 95,
            download_dir: default_cache_root().join("downloads"),
            cleanup_downloads: true,
            max_image_bytes: 20 * 1024 * 1024,
            max_image_dimension: 8192,
        }
    }
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pastiche")
}

impl Config {
    /// Load configuration from an optional TOML file, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&contents).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("PASTICHE_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }

        if let Ok(port_str) = std::env::var("PASTICHE_PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(model) = std::env::var("PASTICHE_STYLE_PREDICT_MODEL") {
            if !model.is_empty() {
                self.models.style_predict = ModelSource::parse(&model);
            }
        }

        if let Ok(model) = std::env::var("PASTICHE_STYLE_TRANSFORM_MODEL") {
            if !model.is_empty() {
                self.models.style_transform = ModelSource::parse(&model);
            }
        }

        if let Ok(dir) = std::env::var("PASTICHE_CACHE_DIR") {
            if !dir.is_empty() {
                self.models.cache_dir = PathBuf::from(dir);
            }
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.images.style_dimension == 0 {
            return Err(Error::invalid_parameter(
                "style_dimension",
                "must be greater than 0",
            ));
        }

        if self.images.content_dimension == 0 {
            return Err(Error::invalid_parameter(
                "content_dimension",
                "must be greater than 0",
            ));
        }

        if !(1..=100).contains(&self.images.jpeg_quality) {
            return Err(Error::invalid_parameter(
                "jpeg_quality",
                "must be between 1 and 100",
            ));
        }

        if self.images.max_image_bytes == 0 {
            return Err(Error::invalid_parameter(
                "max_image_bytes",
                "must be greater than 0",
            ));
        }

        if self.images.max_image_dimension == 0 {
            return Err(Error::invalid_parameter(
                "max_image_dimension",
                "must be greater than 0",
            ));
        }

        if self.server.max_body_bytes == 0 {
            return Err(Error::invalid_parameter(
                "max_body_bytes",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.images.style_dimension, 256);
        assert_eq!(config.images.content_dimension, 384);
        assert_eq!(config.images.output_format, OutputFormat::Jpeg);
        assert!(config.images.cleanup_downloads);
        assert_eq!(config.images.max_image_bytes, 20 * 1024 * 1024);
        assert_eq!(config.images.max_image_dimension, 8192);
        assert!(config.models.cache_dir.ends_with("pastiche/models"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            [server]
            port = 9100

            [models.style_predict]
            path = "/srv/models/predict.onnx"

            [images]
            output_format = "png"
            cleanup_downloads = false
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(
            config.models.style_predict.path.as_deref(),
            Some(Path::new("/srv/models/predict.onnx"))
        );
        assert_eq!(config.models.style_transform, ModelSource::default());
        assert_eq!(config.images.output_format, OutputFormat::Png);
        assert_eq!(config.images.jpeg_quality, 95);
        assert!(!config.images.cleanup_downloads);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server]\nport = \"not a number\"\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_quality() {
        let mut config = Config::default();
        config.images.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.images.jpeg_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_dimension() {
        let mut config = Config::default();
        config.images.content_dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_image_limits() {
        let mut config = Config::default();
        config.images.max_image_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.images.max_image_dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_source_parse() {
        let url = ModelSource::parse("https://example.com/predict.onnx");
        assert_eq!(url.url.as_deref(), Some("https://example.com/predict.onnx"));
        assert!(url.path.is_none());

        let path = ModelSource::parse("./predict.onnx");
        assert_eq!(path.path.as_deref(), Some(Path::new("./predict.onnx")));
        assert!(path.url.is_none());
    }
}
