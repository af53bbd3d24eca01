//! Link checker for the built site.
//!
//! Every double-quoted `href`/`src` value in every `.html` file under the
//! root is classified and checked:
//!
//! | Kind | Example | Check |
//! |---|---|---|
//! | Special | `mailto:`, `tel:` | always good |
//! | External | `https://…`, `//cdn…` | optional GET with a 10 s timeout |
//! | Anchor | `#team` | always good |
//! | Internal | `css/home.min.css`, `../index.html#top` | file exists |
//!
//! Internal targets resolve against the page's own directory, or against the
//! site root when they start with `/`. Fragments and query strings are
//! ignored. External URLs are probed once each, however often they appear.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const EXTERNAL_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "Mozilla/5.0";
const PROBE_CONCURRENCY: usize = 8;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("cannot walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Special,
    External,
    Anchor,
    Internal,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Special => "special",
            Self::External => "external",
            Self::Anchor => "anchor",
            Self::Internal => "internal",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Good,
    Dead(Option<String>),
    /// External link with external checking turned off.
    Unchecked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkResult {
    /// Page the link was found in, relative to the checked root.
    pub page: PathBuf,
    pub link: String,
    pub kind: LinkKind,
    pub status: LinkStatus,
}

#[derive(Debug, Default)]
pub struct LinkReport {
    pub pages: usize,
    pub results: Vec<LinkResult>,
    /// Pages that are not valid UTF-8.
    pub unreadable: Vec<PathBuf>,
}

impl LinkReport {
    pub fn dead(&self) -> impl Iterator<Item = &LinkResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, LinkStatus::Dead(_)))
    }

    pub fn dead_count(&self) -> usize {
        self.dead().count()
    }
}

/// Non-empty `href="…"` and `src="…"` values, in document order.
pub fn extract_links(html: &str) -> Vec<String> {
    let mut links = Vec::new();
    let bytes = html.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let rest = &html[i..];
        let attr_len = if rest.starts_with("href=\"") {
            6
        } else if rest.starts_with("src=\"") {
            5
        } else {
            i += rest.chars().next().map_or(1, char::len_utf8);
            continue;
        };
        let value_start = i + attr_len;
        let Some(len) = html[value_start..].find('"') else {
            break;
        };
        let value = &html[value_start..value_start + len];
        if !value.is_empty() {
            links.push(value.to_string());
        }
        i = value_start + len + 1;
    }
    links
}

pub fn classify(link: &str) -> LinkKind {
    if link.starts_with("mailto:") || link.starts_with("tel:") {
        LinkKind::Special
    } else if link.starts_with("http") || link.starts_with("//") {
        LinkKind::External
    } else if link.split(['#', '?']).next().is_none_or(str::is_empty) {
        LinkKind::Anchor
    } else {
        LinkKind::Internal
    }
}

/// Filesystem path an internal link points at.
pub fn resolve_internal(link: &str, page_dir: &Path, root: &Path) -> PathBuf {
    let target = link.split(['#', '?']).next().unwrap_or_default();
    match target.strip_prefix('/') {
        Some(absolute) => root.join(absolute),
        None => page_dir.join(target),
    }
}

/// Reachability check for external URLs.
#[async_trait]
pub trait UrlProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), String>;
}

pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new() -> Result<Self, LinkError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(EXTERNAL_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlProbe for ReqwestProbe {
    async fn probe(&self, url: &str) -> Result<(), String> {
        let absolute = if url.starts_with("//") {
            format!("https:{url}")
        } else {
            url.to_string()
        };
        let response = self
            .client
            .get(&absolute)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        response
            .error_for_status()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Every `.html` file under `root`, sorted.
pub fn html_files(root: &Path) -> Result<Vec<PathBuf>, LinkError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source| LinkError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|e| e == "html")
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Check every link in every page under `root`. External links are probed
/// only when `probe` is given.
pub async fn check_site(root: &Path, probe: Option<&dyn UrlProbe>) -> Result<LinkReport, LinkError> {
    let mut report = LinkReport::default();
    let mut externals: Vec<String> = Vec::new();

    for page in html_files(root)? {
        let rel = page.strip_prefix(root).unwrap_or(&page).to_path_buf();
        let content = match std::fs::read(&page).map(String::from_utf8) {
            Ok(Ok(text)) => text,
            _ => {
                warn!(page = %rel.display(), "cannot read page as UTF-8");
                report.unreadable.push(rel);
                continue;
            }
        };
        report.pages += 1;
        let page_dir = page.parent().unwrap_or(root);

        for link in extract_links(&content) {
            let kind = classify(&link);
            let status = match kind {
                LinkKind::Special | LinkKind::Anchor => LinkStatus::Good,
                LinkKind::External => {
                    if probe.is_some() && !externals.contains(&link) {
                        externals.push(link.clone());
                    }
                    LinkStatus::Unchecked
                }
                LinkKind::Internal => {
                    if resolve_internal(&link, page_dir, root).exists() {
                        LinkStatus::Good
                    } else {
                        LinkStatus::Dead(None)
                    }
                }
            };
            report.results.push(LinkResult {
                page: rel.clone(),
                link,
                kind,
                status,
            });
        }
    }

    if let Some(probe) = probe {
        debug!(count = externals.len(), "probing external links");
        let outcomes: HashMap<String, Result<(), String>> = stream::iter(externals)
            .map(|url| async move {
                let outcome = probe.probe(&url).await;
                (url, outcome)
            })
            .buffer_unordered(PROBE_CONCURRENCY)
            .collect()
            .await;
        for result in &mut report.results {
            if let Some(outcome) = outcomes.get(&result.link) {
                result.status = match outcome {
                    Ok(()) => LinkStatus::Good,
                    Err(e) => LinkStatus::Dead(Some(e.clone())),
                };
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn extracts_href_and_src() {
        let html = r##"<a href="about.html">About</a><img src="img/a.webp" alt="">
<a href="">empty</a><a href="#top">top</a><link data-href="x">"##;
        assert_eq!(
            extract_links(html),
            ["about.html", "img/a.webp", "#top", "x"]
        );
    }

    #[test]
    fn classification() {
        assert_eq!(classify("mailto:hi@example.com"), LinkKind::Special);
        assert_eq!(classify("tel:+15550100"), LinkKind::Special);
        assert_eq!(classify("https://example.com"), LinkKind::External);
        assert_eq!(classify("//cdn.example.com/x.js"), LinkKind::External);
        assert_eq!(classify("#team"), LinkKind::Anchor);
        assert_eq!(classify("team.html#lead"), LinkKind::Internal);
        assert_eq!(classify("../index.html"), LinkKind::Internal);
    }

    #[test]
    fn internal_resolution() {
        let root = Path::new("/site");
        let dir = Path::new("/site/editions");
        assert_eq!(
            resolve_internal("../index.html#top", dir, root),
            PathBuf::from("/site/editions/../index.html")
        );
        assert_eq!(
            resolve_internal("/css/a.css?v=2", dir, root),
            PathBuf::from("/site/css/a.css")
        );
    }

    fn site() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("editions")).unwrap();
        fs::create_dir_all(root.join("css")).unwrap();
        fs::write(root.join("css/a.min.css"), "").unwrap();
        fs::write(
            root.join("index.html"),
            r##"<link href="css/a.min.css"><a href="editions/edition1.html">1</a>
<a href="missing.html">x</a><a href="mailto:team@example.com">mail</a>
<a href="https://example.com/ok">ok</a><a href="https://example.com/gone">gone</a>"##,
        )
        .unwrap();
        fs::write(
            root.join("editions/edition1.html"),
            r##"<a href="../index.html#top">home</a><a href="#credits">c</a>
<a href="https://example.com/ok">ok again</a>"##,
        )
        .unwrap();
        fs::write(root.join("editions/broken.html"), [0xff, 0xfe]).unwrap();
        tmp
    }

    #[derive(Default)]
    struct FakeProbe {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl UrlProbe for FakeProbe {
        async fn probe(&self, url: &str) -> Result<(), String> {
            self.calls.lock().unwrap().push(url.to_string());
            if url.ends_with("gone") {
                Err("HTTP status client error (404 Not Found)".into())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn internal_only_check() {
        let tmp = site();
        let report = check_site(tmp.path(), None).await.unwrap();
        assert_eq!(report.pages, 2);
        assert_eq!(report.unreadable, [PathBuf::from("editions/broken.html")]);

        let dead: Vec<&str> = report.dead().map(|r| r.link.as_str()).collect();
        assert_eq!(dead, ["missing.html"]);
        let unchecked = report
            .results
            .iter()
            .filter(|r| r.status == LinkStatus::Unchecked)
            .count();
        assert_eq!(unchecked, 3);
    }

    #[tokio::test]
    async fn external_probes_are_deduplicated() {
        let tmp = site();
        let probe = FakeProbe::default();
        let report = check_site(tmp.path(), Some(&probe as &dyn UrlProbe)).await.unwrap();

        let mut calls = probe.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, ["https://example.com/gone", "https://example.com/ok"]);

        let dead: Vec<&str> = report.dead().map(|r| r.link.as_str()).collect();
        assert_eq!(dead, ["missing.html", "https://example.com/gone"]);
        assert_eq!(report.dead_count(), 2);
    }
}
