//! WebP conversion for the site's images.
//!
//! | Step | Crate |
//! |---|---|
//! | Find sources | `walkdir` |
//! | Decode, encode → WebP | `image` |
//! | Batch | `rayon` |
//!
//! [`convert`] owns the walk, the skip rule and the parallel batch. Pixels
//! go through an [`ImageBackend`]: [`RustBackend`] in production, a
//! recording mock in tests.

pub mod backend;
pub mod convert;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use convert::{ConvertEvent, ConvertReport, convert_all, find_sources, webp_path};
pub use rust_backend::{RustBackend, supported_input_extensions};
