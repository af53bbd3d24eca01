//! Shared test utilities for the rts-site test suite.
//!
//! Provides a small markup builder for the headless page, lookup helpers
//! that panic with a useful message on a miss, and an on-disk site fixture
//! for the build pipeline and link checker.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let mut page = page_with(|page| {
//!     let body = page.dom.body();
//!     let gallery = mount(page, body, el("div").class("gallery"));
//!     mount(page, gallery, el("img").attr("src", "a.jpg").attr("alt", "A"));
//! });
//! let img = find(&page, ".gallery img");
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::dom::{ElementId, Metrics};
use crate::page::Page;

// =========================================================================
// Markup builder
// =========================================================================

/// Declarative element description, mounted with [`mount`].
pub struct El {
    tag: String,
    classes: Vec<String>,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    value: Option<String>,
    metrics: Metrics,
}

pub fn el(tag: &str) -> El {
    El {
        tag: tag.to_string(),
        classes: Vec::new(),
        attrs: Vec::new(),
        text: None,
        value: None,
        metrics: Metrics::default(),
    }
}

impl El {
    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn metrics(mut self, f: impl FnOnce(&mut Metrics)) -> Self {
        f(&mut self.metrics);
        self
    }
}

/// Create `node` and append it under `parent`.
pub fn mount(page: &mut Page, parent: ElementId, node: El) -> ElementId {
    let dom = &mut page.dom;
    let id = dom.create_element(&node.tag);
    for class in &node.classes {
        dom.add_class(id, class);
    }
    for (name, value) in node.attrs {
        dom.set_attribute(id, &name, value);
    }
    if let Some(text) = node.text {
        dom.set_text(id, text);
    }
    if let Some(value) = node.value {
        dom.set_value(id, value);
    }
    *dom.metrics_mut(id) = node.metrics;
    dom.append_child(parent, id);
    id
}

/// Build a page, then forget the construction-time mutation records so
/// watchers only see nodes added afterwards.
pub fn page_with(build: impl FnOnce(&mut Page)) -> Page {
    let mut page = Page::default();
    build(&mut page);
    page.dom.take_added();
    page
}

// =========================================================================
// Lookups: panic with a clear message on miss
// =========================================================================

/// First element matching `css`. Panics if nothing matches.
pub fn find(page: &Page, css: &str) -> ElementId {
    page.dom
        .select(css)
        .unwrap_or_else(|e| panic!("bad selector {css:?}: {e}"))
        .unwrap_or_else(|| panic!("nothing matches {css:?}"))
}

pub fn find_all(page: &Page, css: &str) -> Vec<ElementId> {
    page.dom
        .select_all(css)
        .unwrap_or_else(|e| panic!("bad selector {css:?}: {e}"))
}

// =========================================================================
// On-disk site fixture
// =========================================================================

/// A minimal source tree: two stylesheets, two scripts, two pages and an
/// image directory.
pub fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "css/main.css", "/* base */\nbody {\n  margin: 0;\n  color: #333;\n}\n");
    write(root, "css/nav.css", ".nav-menu { display: none; }\n");
    write(
        root,
        "js/main.js",
        "// entry point\nconst url = \"http://example.org\"; /* inline */\nfunction go() {\n    return url;\n}\n",
    );
    write(root, "js/nav.js", "let open = false;\n");
    write(
        root,
        "index.html",
        concat!(
            "<link href=\"css/main.css\" rel=\"stylesheet\">\n",
            "<a href=\"about.html\">About</a>\n",
            "<a href=\"#team\">Team</a>\n",
            "<a href=\"mailto:hello@example.org\">Mail</a>\n",
            "<img src=\"img/logo.png\">\n",
            "<script src=\"js/main.js\"></script>\n",
        ),
    );
    write(
        root,
        "about.html",
        "<link href=\"css/nav.css\"><a href=\"missing.html\">Gone</a><script src=\"js/nav.js\"></script>\n",
    );
    write(root, "img/logo.png", "not really a png");
    tmp
}

pub fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
