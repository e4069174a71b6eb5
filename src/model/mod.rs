//! Model file resolution, download, and session loading.

mod loader;

pub use loader::{ModelCache, ModelType};
