//! Build cache for incremental minification.
//!
//! Each output file (`css/home.min.css`, `index.html`, ...) is recorded
//! with two hashes:
//!
//! - **`source_hash`**: SHA-256 of the source file contents. Content-based
//!   so it survives `git checkout`, which resets modification times.
//! - **`params_hash`**: SHA-256 of the transform applied (asset kind and
//!   [`MINIFIER_VERSION`]). A minifier change rebuilds everything it touched.
//!
//! Lookups are content-addressed through a runtime index of
//! `"{source_hash}:{params_hash}"` → output path. A hit requires the recorded
//! output to still exist in the dist dir. When the recorded path differs from
//! the requested one (a page moved, a stem was renamed) the caller copies the
//! earlier output instead of transforming again.
//!
//! The manifest lives at `<dist>/.build-cache.json`, so caching `dist/` in CI
//! carries it along. `--no-cache` starts from an empty manifest.

use super::AssetKind;
use super::minify::MINIFIER_VERSION;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;

const MANIFEST_FILENAME: &str = ".build-cache.json";

/// Bump to invalidate every existing manifest.
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_hash: String,
    pub params_hash: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BuildCache {
    pub version: u32,
    /// Output path (relative to dist, `/`-separated) → hashes.
    pub entries: HashMap<String, CacheEntry>,
    #[serde(skip)]
    content_index: HashMap<String, String>,
}

fn content_key(source_hash: &str, params_hash: &str) -> String {
    format!("{source_hash}:{params_hash}")
}

impl BuildCache {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
            content_index: HashMap::new(),
        }
    }

    /// Load from `dist_dir`. A missing, unreadable or outdated manifest
    /// yields an empty cache.
    pub fn load(dist_dir: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(dist_dir.join(MANIFEST_FILENAME)) else {
            return Self::empty();
        };
        let mut cache: Self = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        if cache.version != MANIFEST_VERSION {
            return Self::empty();
        }
        cache.content_index = cache
            .entries
            .iter()
            .map(|(output, e)| (content_key(&e.source_hash, &e.params_hash), output.clone()))
            .collect();
        cache
    }

    pub fn save(&self, dist_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dist_dir.join(MANIFEST_FILENAME), json)
    }

    /// Output path previously produced from these hashes, if that file is
    /// still on disk.
    pub fn find_cached(&self, source_hash: &str, params_hash: &str, dist_dir: &Path) -> Option<&str> {
        let stored = self.content_index.get(&content_key(source_hash, params_hash))?;
        dist_dir.join(stored).exists().then_some(stored.as_str())
    }

    /// Record an output. An older entry for the same content under another
    /// path is dropped.
    pub fn insert(&mut self, output: String, source_hash: String, params_hash: String) {
        let key = content_key(&source_hash, &params_hash);
        if let Some(old) = self.content_index.get(&key)
            && *old != output
        {
            self.entries.remove(old.as_str());
        }
        self.content_index.insert(key, output.clone());
        self.entries.insert(
            output,
            CacheEntry {
                source_hash,
                params_hash,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 of a file's contents as lowercase hex.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// SHA-256 of the transform applied to a file of `kind`.
pub fn hash_params(kind: AssetKind) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(MINIFIER_VERSION.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache performance for one build.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub copies: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn total(&self) -> u32 {
        self.hits + self.copies + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.hits, self.copies) {
            (0, 0) => write!(f, "{} built", self.misses),
            (_, 0) => write!(
                f,
                "{} cached, {} built ({} total)",
                self.hits,
                self.misses,
                self.total()
            ),
            _ => write!(
                f,
                "{} cached, {} copied, {} built ({} total)",
                self.hits,
                self.copies,
                self.misses,
                self.total()
            ),
        }
    }
}
