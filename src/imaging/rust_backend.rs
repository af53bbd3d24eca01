//! Pure Rust backend built on the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG) | `image::ImageReader` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder::new_lossless` |
//!
//! The `image` crate only ships a lossless WebP encoder, so output files are
//! lossless. Photos come out larger than a lossy `cwebp -q 80` would produce.

use super::backend::{BackendError, Dimensions, ImageBackend};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageFormat, ImageReader};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::LazyLock;

/// Source formats the conversion accepts.
const SOURCE_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    SOURCE_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Extensions whose decoders are compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

#[derive(Debug, Default)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

fn save_webp(img: &DynamicImage, path: &Path) -> Result<(), BackendError> {
    let rgba = img.to_rgba8();
    let file = File::create(path).map_err(BackendError::Io)?;
    let writer = BufWriter::new(file);
    WebPEncoder::new_lossless(writer)
        .encode(
            rgba.as_raw(),
            rgba.width(),
            rgba.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("WebP encode failed for {}: {}", path.display(), e))
        })
}

impl ImageBackend for RustBackend {
    fn encode_webp(&self, source: &Path, output: &Path) -> Result<Dimensions, BackendError> {
        let img = load_image(source)?;
        if let Err(e) = save_webp(&img, output) {
            // A partial output would be skipped as already converted.
            let _ = std::fs::remove_file(output);
            return Err(e);
        }
        Ok(Dimensions {
            width: img.width(),
            height: img.height(),
        })
    }
}
