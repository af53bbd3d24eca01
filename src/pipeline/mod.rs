//! Production build: minify, rewrite, copy.
//!
//! ```text
//! src/frontend/css/pages/home.css    → dist/css/pages/home.min.css
//! src/frontend/js/modules/index.js   → dist/js/modules/index.min.js
//! src/frontend/editions/impact.html  → dist/editions/impact.html (references rewritten)
//! src/frontend/img/**                → dist/img/**
//! ```
//!
//! Stylesheets and scripts are processed in parallel with rayon, then HTML
//! pages, then asset directories. A missing source is reported and skipped;
//! a file that fails to transform is reported and does not stop the build.
//! Only failing to create the dist dir or to write the cache manifest is
//! fatal.
//!
//! Progress is streamed as [`BuildEvent`]s over an optional channel; the CLI
//! prints them from a separate thread.

pub mod cache;
pub mod minify;
pub mod rewrite;

use crate::config::BuildConfig;
use cache::{BuildCache, CacheStats};
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("source directory not found: {0}")]
    SourceMissing(PathBuf),
}

impl PipelineError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Css,
    Js,
    Html,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Js => "js",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file to transform. Paths in `source_rel`/`output_rel` are
/// `/`-separated and relative to the source and dist dirs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub kind: AssetKind,
    pub source_rel: String,
    pub output_rel: String,
}

/// Expand the configured stems into jobs, in config order: CSS, JS, HTML.
pub fn plan(config: &BuildConfig) -> Vec<Job> {
    let css = config.css.iter().map(|stem| Job {
        kind: AssetKind::Css,
        source_rel: format!("css/{stem}.css"),
        output_rel: format!("css/{stem}.min.css"),
    });
    let js = config.js.iter().map(|stem| Job {
        kind: AssetKind::Js,
        source_rel: format!("js/{stem}.js"),
        output_rel: format!("js/{stem}.min.js"),
    });
    let html = config.html.iter().map(|stem| Job {
        kind: AssetKind::Html,
        source_rel: format!("{stem}.html"),
        output_rel: format!("{stem}.html"),
    });
    css.chain(js).chain(html).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Output already up to date.
    Cached,
    /// Copied from an earlier output with the same content.
    Copied,
    /// Transformed and written.
    Built,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    Processed {
        kind: AssetKind,
        source: String,
        output: String,
        status: FileStatus,
        /// Source and output sizes in bytes.
        bytes: (u64, u64),
        /// References rewritten (HTML only).
        references: usize,
    },
    Missing {
        kind: AssetKind,
        source: String,
    },
    Failed {
        source: String,
        error: String,
    },
    AssetsCopied {
        dir: String,
        files: usize,
    },
    AssetsSkipped {
        dir: String,
    },
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub processed: usize,
    pub missing: Vec<String>,
    pub failed: Vec<String>,
    pub assets_copied: usize,
    pub cache_stats: CacheStats,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.failed.is_empty()
    }
}

struct Outcome {
    job: Job,
    result: Result<Done, String>,
}

struct Done {
    status: FileStatus,
    source_hash: String,
    params_hash: String,
    bytes: (u64, u64),
    references: usize,
}

fn transform(kind: AssetKind, text: &str) -> (String, usize) {
    match kind {
        AssetKind::Css => (minify::minify_css(text), 0),
        AssetKind::Js => (minify::minify_js(text), 0),
        AssetKind::Html => rewrite::rewrite_references(text),
    }
}

fn write_output(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

fn run_job(job: &Job, source_dir: &Path, dist_dir: &Path, cache: &BuildCache) -> Result<Done, String> {
    let source = source_dir.join(&job.source_rel);
    let output = dist_dir.join(&job.output_rel);
    let fail = |e: std::io::Error| format!("{}: {e}", source.display());

    let source_hash = cache::hash_file(&source).map_err(fail)?;
    let params_hash = cache::hash_params(job.kind);
    let source_len = fs::metadata(&source).map_err(fail)?.len();

    if let Some(stored) = cache.find_cached(&source_hash, &params_hash, dist_dir) {
        let status = if stored == job.output_rel {
            FileStatus::Cached
        } else {
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent).map_err(fail)?;
            }
            fs::copy(dist_dir.join(stored), &output).map_err(fail)?;
            FileStatus::Copied
        };
        let output_len = fs::metadata(&output).map_err(fail)?.len();
        return Ok(Done {
            status,
            source_hash,
            params_hash,
            bytes: (source_len, output_len),
            references: 0,
        });
    }

    let text = fs::read_to_string(&source).map_err(fail)?;
    let (result, references) = transform(job.kind, &text);
    write_output(&output, result.as_bytes())
        .map_err(|e| format!("{}: {e}", output.display()))?;
    Ok(Done {
        status: FileStatus::Built,
        source_hash,
        params_hash,
        bytes: (source_len, result.len() as u64),
        references,
    })
}

fn emit(events: Option<&Sender<BuildEvent>>, event: BuildEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

/// Copy `dir` recursively. Returns the number of files copied.
fn copy_tree(from: &Path, to: &Path) -> Result<usize, PipelineError> {
    let mut files = 0;
    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            PipelineError::Io {
                path,
                source: e.into(),
            }
        })?;
        let rel = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| PipelineError::io(&target, e))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| PipelineError::io(&target, e))?;
            files += 1;
        }
    }
    Ok(files)
}

/// Run the whole build rooted at `root`.
pub fn build(
    root: &Path,
    config: &BuildConfig,
    use_cache: bool,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildReport, PipelineError> {
    let source_dir = root.join(&config.source_dir);
    let dist_dir = root.join(&config.dist_dir);
    if !source_dir.is_dir() {
        return Err(PipelineError::SourceMissing(source_dir));
    }
    fs::create_dir_all(&dist_dir).map_err(|e| PipelineError::io(&dist_dir, e))?;

    let mut cache = if use_cache {
        BuildCache::load(&dist_dir)
    } else {
        BuildCache::empty()
    };
    let mut report = BuildReport::default();

    let (present, absent): (Vec<Job>, Vec<Job>) = plan(config)
        .into_iter()
        .partition(|job| source_dir.join(&job.source_rel).is_file());
    for job in absent {
        warn!(source = %job.source_rel, "source file not found");
        emit(
            events.as_ref(),
            BuildEvent::Missing {
                kind: job.kind,
                source: job.source_rel.clone(),
            },
        );
        report.missing.push(job.source_rel);
    }

    // Stylesheets and scripts first; pages only reference their outputs by name.
    let (assets, pages): (Vec<Job>, Vec<Job>) = present
        .into_iter()
        .partition(|job| job.kind != AssetKind::Html);
    for batch in [assets, pages] {
        let outcomes: Vec<Outcome> = batch
            .into_par_iter()
            .map(|job| {
                let result = run_job(&job, &source_dir, &dist_dir, &cache);
                Outcome { job, result }
            })
            .collect();

        for Outcome { job, result } in outcomes {
            match result {
                Ok(done) => {
                    match done.status {
                        FileStatus::Cached => report.cache_stats.hits += 1,
                        FileStatus::Copied => report.cache_stats.copies += 1,
                        FileStatus::Built => report.cache_stats.misses += 1,
                    }
                    report.processed += 1;
                    debug!(source = %job.source_rel, status = ?done.status, "processed");
                    emit(
                        events.as_ref(),
                        BuildEvent::Processed {
                            kind: job.kind,
                            source: job.source_rel.clone(),
                            output: job.output_rel.clone(),
                            status: done.status,
                            bytes: done.bytes,
                            references: done.references,
                        },
                    );
                    cache.insert(job.output_rel, done.source_hash, done.params_hash);
                }
                Err(error) => {
                    warn!(source = %job.source_rel, %error, "failed to process");
                    emit(
                        events.as_ref(),
                        BuildEvent::Failed {
                            source: job.source_rel.clone(),
                            error,
                        },
                    );
                    report.failed.push(job.source_rel);
                }
            }
        }
    }

    for dir in &config.assets {
        let from = source_dir.join(dir);
        if !from.is_dir() {
            debug!(dir = %dir, "asset directory absent");
            emit(events.as_ref(), BuildEvent::AssetsSkipped { dir: dir.clone() });
            continue;
        }
        match copy_tree(&from, &dist_dir.join(dir)) {
            Ok(files) => {
                report.assets_copied += files;
                emit(
                    events.as_ref(),
                    BuildEvent::AssetsCopied {
                        dir: dir.clone(),
                        files,
                    },
                );
            }
            Err(e) => {
                warn!(dir = %dir, error = %e, "failed to copy assets");
                emit(
                    events.as_ref(),
                    BuildEvent::Failed {
                        source: dir.clone(),
                        error: e.to_string(),
                    },
                );
                report.failed.push(dir.clone());
            }
        }
    }

    cache
        .save(&dist_dir)
        .map_err(|e| PipelineError::io(&dist_dir, e))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn small_config() -> BuildConfig {
        BuildConfig {
            css: vec!["navigation".into(), "pages/home".into()],
            js: vec!["bundle".into()],
            html: vec!["index".into(), "editions/impact".into()],
            assets: vec!["img".into(), "resources".into()],
            ..BuildConfig::default()
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn site() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let src = "src/frontend";
        write(tmp.path(), &format!("{src}/css/navigation.css"), ".nav {\n  color: red;\n}\n");
        write(tmp.path(), &format!("{src}/css/pages/home.css"), "/* home */\nh1 { margin: 0; }\n");
        write(tmp.path(), &format!("{src}/js/bundle.js"), "// entry\nconst a = 1;\n");
        write(
            tmp.path(),
            &format!("{src}/index.html"),
            r#"<link href="css/navigation.css"><script src="js/bundle.js"></script>"#,
        );
        write(
            tmp.path(),
            &format!("{src}/editions/impact.html"),
            r#"<link href="css/pages/home.css">"#,
        );
        write(tmp.path(), &format!("{src}/img/hero.jpg"), "jpeg bytes");
        write(tmp.path(), &format!("{src}/img/team/a.png"), "png bytes");
        tmp
    }

    #[test]
    fn plan_follows_config_order() {
        let jobs = plan(&small_config());
        let outputs: Vec<&str> = jobs.iter().map(|j| j.output_rel.as_str()).collect();
        assert_eq!(
            outputs,
            [
                "css/navigation.min.css",
                "css/pages/home.min.css",
                "js/bundle.min.js",
                "index.html",
                "editions/impact.html",
            ]
        );
    }

    #[test]
    fn builds_minified_site() {
        let tmp = site();
        let report = build(tmp.path(), &small_config(), true, None).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.processed, 5);
        assert_eq!(report.assets_copied, 2);

        let dist = tmp.path().join("dist");
        assert_eq!(
            fs::read_to_string(dist.join("css/navigation.min.css")).unwrap(),
            ".nav{color: red}"
        );
        assert_eq!(
            fs::read_to_string(dist.join("js/bundle.min.js")).unwrap(),
            "const a = 1;"
        );
        assert_eq!(
            fs::read_to_string(dist.join("index.html")).unwrap(),
            r#"<link href="css/navigation.min.css"><script src="js/bundle.min.js"></script>"#
        );
        assert!(dist.join("editions/impact.html").exists());
        assert!(dist.join("img/team/a.png").exists());
    }

    #[test]
    fn second_build_hits_cache() {
        let tmp = site();
        build(tmp.path(), &small_config(), true, None).unwrap();
        let report = build(tmp.path(), &small_config(), true, None).unwrap();
        assert_eq!(report.cache_stats.hits, 5);
        assert_eq!(report.cache_stats.misses, 0);

        write(tmp.path(), "src/frontend/js/bundle.js", "let b = 2;\n");
        let report = build(tmp.path(), &small_config(), true, None).unwrap();
        assert_eq!(report.cache_stats.hits, 4);
        assert_eq!(report.cache_stats.misses, 1);
    }

    #[test]
    fn no_cache_rebuilds_everything() {
        let tmp = site();
        build(tmp.path(), &small_config(), true, None).unwrap();
        let report = build(tmp.path(), &small_config(), false, None).unwrap();
        assert_eq!(report.cache_stats.misses, 5);
    }

    #[test]
    fn missing_sources_warn_and_continue() {
        let tmp = site();
        let mut config = small_config();
        config.css.push("pages/partners".into());
        config.html.push("blog".into());

        let (tx, rx) = mpsc::channel();
        let report = build(tmp.path(), &config, true, Some(tx)).unwrap();
        assert_eq!(report.missing, ["css/pages/partners.css", "blog.html"]);
        assert_eq!(report.processed, 5);

        let events: Vec<BuildEvent> = rx.iter().collect();
        assert!(events.contains(&BuildEvent::Missing {
            kind: AssetKind::Css,
            source: "css/pages/partners.css".into(),
        }));
        assert!(events.contains(&BuildEvent::AssetsSkipped {
            dir: "resources".into()
        }));
    }

    #[test]
    fn unreadable_source_fails_only_that_file() {
        let tmp = site();
        fs::write(
            tmp.path().join("src/frontend/css/pages/home.css"),
            [0xff, 0xfe, 0x00],
        )
        .unwrap();
        let report = build(tmp.path(), &small_config(), true, None).unwrap();
        assert_eq!(report.failed, ["css/pages/home.css"]);
        assert_eq!(report.processed, 4);
    }

    #[test]
    fn missing_source_dir_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = build(tmp.path(), &small_config(), true, None).unwrap_err();
        assert!(matches!(err, PipelineError::SourceMissing(_)));
    }
}
