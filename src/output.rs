//! CLI output formatting for the tooling commands.
//!
//! # Display Contract
//!
//! Each processed item gets one header line naming what it is, followed by
//! indented context lines. Problems lead with a marker so they stand out in
//! a long log: `!` for a missing input, `x` for a failure.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! css/navigation.css → css/navigation.min.css
//!     built: 4.1 KB → 2.9 KB (-29%)
//! index.html → index.html
//!     cached, 6 references
//! ! css/pages/partners.css (missing)
//! img/ (48 files)
//!
//! Built 25 files, copied 48 assets
//! Cache: 20 cached, 5 built (25 total)
//! ```
//!
//! ## Convert images
//!
//! ```text
//! team/ana.jpg → team/ana.webp
//! team/logo.png (webp exists)
//! x hero.png
//!     Failed to decode …
//!
//! Converted 1, skipped 1, failed 1
//! ```
//!
//! ## Check links
//!
//! ```text
//! Dead internal: missing.html in index.html
//! Dead external: https://example.com/gone in index.html (404 Not Found)
//!
//! Checked 42 links in 15 pages: 2 dead, 3 external unchecked
//! ```
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout.

use crate::imaging::{ConvertEvent, ConvertReport};
use crate::links::{LinkKind, LinkReport, LinkResult, LinkStatus};
use crate::pipeline::{AssetKind, BuildEvent, BuildReport, FileStatus};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte size with one decimal above 1 KB.
fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

/// Signed size change in whole percent, `-29%`.
fn size_change(before: u64, after: u64) -> String {
    if before == 0 {
        return "0%".to_string();
    }
    let pct = (after as f64 - before as f64) / before as f64 * 100.0;
    format!("{:+.0}%", pct)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{n} {}", if n == 1 { one } else { many })
}

fn relative<'a>(path: &'a Path, root: &Path) -> std::borrow::Cow<'a, str> {
    path.strip_prefix(root).unwrap_or(path).to_string_lossy()
}

// ============================================================================
// Build
// ============================================================================

pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::Processed {
            kind,
            source,
            output,
            status,
            bytes,
            references,
        } => {
            let status_str = match status {
                FileStatus::Cached => "cached",
                FileStatus::Copied => "copied",
                FileStatus::Built => "built",
            };
            let detail = if *kind == AssetKind::Html {
                format!("{status_str}, {}", plural(*references, "reference", "references"))
            } else if *status == FileStatus::Built {
                format!(
                    "{status_str}: {} \u{2192} {} ({})",
                    human_bytes(bytes.0),
                    human_bytes(bytes.1),
                    size_change(bytes.0, bytes.1)
                )
            } else {
                status_str.to_string()
            };
            vec![
                format!("{source} \u{2192} {output}"),
                format!("{}{detail}", indent(1)),
            ]
        }
        BuildEvent::Missing { source, .. } => vec![format!("! {source} (missing)")],
        BuildEvent::Failed { source, error } => {
            vec![format!("x {source}"), format!("{}{error}", indent(1))]
        }
        BuildEvent::AssetsCopied { dir, files } => {
            vec![format!("{dir}/ ({})", plural(*files, "file", "files"))]
        }
        BuildEvent::AssetsSkipped { dir } => vec![format!("{dir}/ (not present)")],
    }
}

pub fn format_build_summary(report: &BuildReport) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        format!(
            "Built {}, copied {}",
            plural(report.processed, "file", "files"),
            plural(report.assets_copied, "asset", "assets")
        ),
        format!("Cache: {}", report.cache_stats),
    ];
    if !report.missing.is_empty() {
        lines.push(format!("Missing: {}", report.missing.len()));
    }
    if !report.failed.is_empty() {
        lines.push(format!("Failed: {}", report.failed.join(", ")));
    }
    lines
}

pub fn print_build_summary(report: &BuildReport) {
    for line in format_build_summary(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Convert images
// ============================================================================

pub fn format_convert_event(event: &ConvertEvent, root: &Path) -> Vec<String> {
    match event {
        ConvertEvent::Converted { source, output } => vec![format!(
            "{} \u{2192} {}",
            relative(source, root),
            relative(output, root)
        )],
        ConvertEvent::Skipped { source } => {
            vec![format!("{} (webp exists)", relative(source, root))]
        }
        ConvertEvent::Failed { source, error } => vec![
            format!("x {}", relative(source, root)),
            format!("{}{error}", indent(1)),
        ],
    }
}

pub fn format_convert_summary(report: &ConvertReport) -> Vec<String> {
    vec![
        String::new(),
        format!(
            "Converted {}, skipped {}, failed {}",
            report.converted.len(),
            report.skipped.len(),
            report.failed.len()
        ),
    ]
}

pub fn print_convert_summary(report: &ConvertReport) {
    for line in format_convert_summary(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Check links
// ============================================================================

/// One result in the `Good internal: x in page.html` style.
pub fn format_link_result(result: &LinkResult) -> String {
    let page = result.page.to_string_lossy();
    match &result.status {
        LinkStatus::Good => format!("Good {}: {} in {}", result.kind, result.link, page),
        LinkStatus::Dead(Some(reason)) => {
            format!("Dead {}: {} in {} ({})", result.kind, result.link, page, reason)
        }
        LinkStatus::Dead(None) => format!("Dead {}: {} in {}", result.kind, result.link, page),
        LinkStatus::Unchecked => {
            format!("Unchecked {}: {} in {}", result.kind, result.link, page)
        }
    }
}

/// Dead links (all results with `verbose`), unreadable pages, then a summary.
pub fn format_link_report(report: &LinkReport, verbose: bool) -> Vec<String> {
    let mut lines: Vec<String> = report
        .results
        .iter()
        .filter(|r| verbose || matches!(r.status, LinkStatus::Dead(_)))
        .map(format_link_result)
        .collect();
    for page in &report.unreadable {
        lines.push(format!("Error reading {}", page.display()));
    }

    let unchecked = report
        .results
        .iter()
        .filter(|r| r.kind == LinkKind::External && r.status == LinkStatus::Unchecked)
        .count();
    let mut summary = format!(
        "Checked {} in {}: {} dead",
        plural(report.results.len(), "link", "links"),
        plural(report.pages, "page", "pages"),
        report.dead_count()
    );
    if unchecked > 0 {
        summary.push_str(&format!(", {unchecked} external unchecked"));
    }
    lines.push(String::new());
    lines.push(summary);
    lines
}

pub fn print_link_report(report: &LinkReport, verbose: bool) {
    for line in format_link_report(report, verbose) {
        println!("{}", line);
    }
}
