//! # Pastiche
//!
//! Arbitrary neural style transfer as a small HTTP service.
//!
//! A style-prediction model maps a style image to a bottleneck vector; a
//! style-transform model renders a content image with that vector. The
//! bottleneck can be blended with the content image's own bottleneck to keep
//! some of the original look.
//!
//! ## Example
//!
//! ```no_run
//! use pastiche::{BlendingRatio, Config, Pipeline};
//!
//! # fn main() -> pastiche::Result<()> {
//! let config = Config::load(None)?;
//! let mut pipeline = Pipeline::from_config(&config)?;
//!
//! pipeline.process("photo.jpg", "painting.jpg", "out.jpg", BlendingRatio::new(0.2), 95)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod image;
pub mod model;
pub mod pipeline;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{BlendingRatio, Pipeline, StyleBackend};
