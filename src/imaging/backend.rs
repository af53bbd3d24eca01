//! Image backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the one operation WebP conversion needs.
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend); tests swap in the
//! recording [`tests::MockBackend`].

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Pixel size of an encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Image backends are shared across rayon workers, hence `Sync`.
pub trait ImageBackend: Sync {
    /// Decode `source` and write it to `output` as WebP. Returns the size of
    /// the written image.
    fn encode_webp(&self, source: &Path, output: &Path) -> Result<Dimensions, BackendError>;
}
