//! Batch JPEG/PNG → WebP conversion.
//!
//! Every matching image under the images dir gets a `.webp` sibling with the
//! same stem (`img/team/ana.jpg` → `img/team/ana.webp`). Images whose WebP
//! sibling already exists are skipped, so reruns only convert new files.
//! Conversion runs in parallel; one failed image does not stop the rest.

use super::backend::ImageBackend;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertEvent {
    Converted { source: PathBuf, output: PathBuf },
    Skipped { source: PathBuf },
    Failed { source: PathBuf, error: String },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConvertReport {
    pub converted: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl ConvertReport {
    pub fn total(&self) -> usize {
        self.converted.len() + self.skipped.len() + self.failed.len()
    }
}

/// The WebP path for `source`: same directory, same stem.
pub fn webp_path(source: &Path) -> PathBuf {
    source.with_extension("webp")
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Convertible images under `dir`, sorted for stable output.
pub fn find_sources(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), extensions))
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

/// Convert every image under `dir` with `backend`.
pub fn convert_all(
    backend: &impl ImageBackend,
    dir: &Path,
    extensions: &[String],
    events: Option<Sender<ConvertEvent>>,
) -> ConvertReport {
    let sources = find_sources(dir, extensions);
    debug!(count = sources.len(), dir = %dir.display(), "images found");

    let events: Vec<ConvertEvent> = sources
        .into_par_iter()
        .map_with(events, |tx, source| {
            let output = webp_path(&source);
            let event = if output.exists() {
                ConvertEvent::Skipped { source }
            } else {
                match backend.encode_webp(&source, &output) {
                    Ok(dims) => {
                        debug!(
                            output = %output.display(),
                            width = dims.width,
                            height = dims.height,
                            "webp written"
                        );
                        ConvertEvent::Converted { source, output }
                    }
                    Err(e) => {
                        warn!(source = %source.display(), error = %e, "conversion failed");
                        ConvertEvent::Failed {
                            source,
                            error: e.to_string(),
                        }
                    }
                }
            };
            if let Some(tx) = tx {
                tx.send(event.clone()).ok();
            }
            event
        })
        .collect();

    let mut report = ConvertReport::default();
    for event in events {
        match event {
            ConvertEvent::Converted { source, .. } => report.converted.push(source),
            ConvertEvent::Skipped { source } => report.skipped.push(source),
            ConvertEvent::Failed { source, error } => report.failed.push((source, error)),
        }
    }
    report
}
