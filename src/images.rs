//! WebP detection, fallback source rewriting and lazy loading.
//!
//! Detection is cached on an explicit [`WebpSupport`] value owned by the
//! page's [`ImageSupport`], never in a global.
//!
//! Lazy images pick their source with [`resolve_source`]:
//!
//! | WebP | `data-src` | `data-fallback` | loads |
//! |------|------------|-----------------|-------|
//! | yes  | set        | any             | `data-src` |
//! | any  | any        | set             | `data-fallback` |
//! | no   | non-WebP   | unset           | `data-src` |
//! | no   | `.webp`    | unset           | nothing, marked `lazy-error` |
//!
//! A failed load retries `data-fallback` once before giving up.

use crate::dom::{ElementId, Window};
use crate::page::{Controller, EventKind, ListenerId, Page, RootMargin, Route, Signal, Target, WatcherId};
use crate::selector::SelectorError;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// `200px 0px`: start loading before the image scrolls into view.
pub const LAZY_MARGIN: RootMargin = RootMargin {
    top: 200.0,
    right: 0.0,
    bottom: 200.0,
    left: 0.0,
};

const LAZY_SELECTOR: &str = r#"img[loading="lazy"], img[data-src]"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAction {
    Visible,
    Loaded,
    Failed,
}

/// Per-page WebP detection result.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebpSupport {
    cached: Option<bool>,
}

impl WebpSupport {
    pub fn detect(&mut self, window: &Window) -> bool {
        *self.cached.get_or_insert(window.webp)
    }

    pub fn cached(&self) -> Option<bool> {
        self.cached
    }
}

/// `true` when the URL path ends in `.webp`, ignoring query and fragment.
pub fn is_webp(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".webp")
}

pub fn resolve_source<'a>(
    webp: bool,
    data_src: Option<&'a str>,
    data_fallback: Option<&'a str>,
) -> Option<&'a str> {
    match (data_src, data_fallback) {
        (Some(src), _) if webp => Some(src),
        (_, Some(fallback)) => Some(fallback),
        (Some(src), None) if !is_webp(src) => Some(src),
        _ => None,
    }
}

/// Rewrite WebP sources to their declared fallbacks when WebP is
/// unsupported, and flag the root element with `webp` when it is.
/// Returns how many `src` attributes were rewritten.
pub fn apply_fallbacks(page: &mut Page, webp: bool) -> Result<usize, SelectorError> {
    let dom = &mut page.dom;
    let root = dom.root();
    dom.toggle_class(root, "webp", webp);
    if webp {
        return Ok(0);
    }

    let mut rewritten = 0;
    for source in dom.select_all(r#"picture source[type="image/webp"]"#)? {
        let Some(fallback) = dom.attribute(source, "data-fallback").map(str::to_string) else {
            continue;
        };
        if let Some(picture) = dom.parent(source)
            && let Some(img) = dom.select_within(picture, "img")?
        {
            dom.set_attribute(img, "src", fallback);
            rewritten += 1;
        }
    }
    for img in dom.select_all("img[data-fallback]")? {
        let src = dom.attribute(img, "src").unwrap_or_default();
        if is_webp(src)
            && let Some(fallback) = dom.attribute(img, "data-fallback").map(str::to_string)
        {
            dom.set_attribute(img, "src", fallback);
            rewritten += 1;
        }
    }
    Ok(rewritten)
}

#[derive(Debug)]
struct PendingLoad {
    src: String,
    listeners: [ListenerId; 2],
    retried: bool,
}

/// Lazy loader for `img[loading="lazy"]` and `img[data-src]`.
#[derive(Debug, Default)]
pub struct ImageSupport {
    webp: WebpSupport,
    watcher: Option<WatcherId>,
    loading: BTreeMap<ElementId, PendingLoad>,
}

impl ImageSupport {
    /// Detect WebP, apply fallbacks and start watching lazy images.
    pub fn init(page: &mut Page) -> Result<Self, SelectorError> {
        let mut support = Self::default();
        let webp = support.webp.detect(&page.dom.window);
        let rewritten = apply_fallbacks(page, webp)?;

        let lazy = page.dom.select_all(LAZY_SELECTOR)?;
        if !lazy.is_empty() {
            let watcher = page.watch_intersections(0.0, LAZY_MARGIN, Route::Images(ImageAction::Visible));
            for img in &lazy {
                page.observe(watcher, *img);
            }
            support.watcher = Some(watcher);
        }
        debug!(webp, rewritten, lazy = lazy.len(), "image support ready");
        Ok(support)
    }

    pub fn webp_supported(&self) -> Option<bool> {
        self.webp.cached()
    }

    pub fn watcher(&self) -> Option<WatcherId> {
        self.watcher
    }

    pub fn in_flight(&self) -> usize {
        self.loading.len()
    }

    fn unwatch(&self, page: &mut Page, img: ElementId) {
        if let Some(w) = self.watcher {
            page.unobserve(w, img);
        }
    }

    fn visible(&mut self, page: &mut Page, img: ElementId) {
        self.unwatch(page, img);
        if !page.dom.is_connected(img) || self.loading.contains_key(&img) {
            return;
        }
        let webp = self.webp.cached().unwrap_or(false);
        let src = resolve_source(
            webp,
            page.dom.attribute(img, "data-src"),
            page.dom.attribute(img, "data-fallback"),
        )
        .map(str::to_string);
        let Some(src) = src else {
            if page.dom.attribute(img, "data-src").is_some() {
                warn!("no loadable source for lazy image");
                page.dom.add_class(img, "lazy-error");
            }
            return;
        };

        page.dom.add_class(img, "lazy-loading");
        let listeners = [
            page.add_listener(Target::Element(img), EventKind::Load, Route::Images(ImageAction::Loaded)),
            page.add_listener(Target::Element(img), EventKind::Error, Route::Images(ImageAction::Failed)),
        ];
        page.load_image(img, &src);
        self.loading.insert(
            img,
            PendingLoad {
                src,
                listeners,
                retried: false,
            },
        );
    }

    fn finish(&mut self, page: &mut Page, img: ElementId) {
        if let Some(pending) = self.loading.remove(&img) {
            for id in pending.listeners {
                page.remove_listener(id);
            }
        }
    }

    fn loaded(&mut self, page: &mut Page, img: ElementId) {
        self.finish(page, img);
        page.dom.remove_class(img, "lazy-loading");
        page.dom.add_class(img, "lazy-loaded");
    }

    fn failed(&mut self, page: &mut Page, img: ElementId) {
        page.dom.remove_class(img, "lazy-loading");
        let fallback = page.dom.attribute(img, "data-fallback").map(str::to_string);
        if let Some(pending) = self.loading.get_mut(&img)
            && let Some(fallback) = fallback
            && !pending.retried
            && pending.src != fallback
        {
            warn!(src = %pending.src, "image failed to load, trying fallback");
            pending.retried = true;
            pending.src = fallback.clone();
            page.load_image(img, &fallback);
            return;
        }
        warn!("image failed to load");
        self.finish(page, img);
        page.dom.add_class(img, "lazy-error");
    }

    /// Stop watching and drop listeners of in-flight loads.
    pub fn disconnect(&mut self, page: &mut Page) {
        if let Some(w) = self.watcher.take() {
            page.disconnect(w);
        }
        let in_flight: Vec<ElementId> = self.loading.keys().copied().collect();
        for img in in_flight {
            self.finish(page, img);
        }
    }

    pub fn on_action(&mut self, page: &mut Page, action: ImageAction, signal: Signal<'_>) {
        match (action, signal) {
            (ImageAction::Visible, Signal::Intersecting(img)) => self.visible(page, img),
            (ImageAction::Loaded, Signal::Event(event)) => {
                if let Some(img) = event.target_element() {
                    self.loaded(page, img);
                }
            }
            (ImageAction::Failed, Signal::Event(event)) => {
                if let Some(img) = event.target_element() {
                    self.failed(page, img);
                }
            }
            _ => {}
        }
    }
}

impl Controller for ImageSupport {
    fn handle(&mut self, page: &mut Page, route: &Route, signal: Signal<'_>) {
        if let Route::Images(action) = route {
            self.on_action(page, *action, signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{el, find, mount, page_with};

    #[test]
    fn source_precedence() {
        assert_eq!(resolve_source(true, Some("a.webp"), Some("a.jpg")), Some("a.webp"));
        assert_eq!(resolve_source(false, Some("a.webp"), Some("a.jpg")), Some("a.jpg"));
        assert_eq!(resolve_source(true, None, Some("a.jpg")), Some("a.jpg"));
        assert_eq!(resolve_source(false, Some("a.png"), None), Some("a.png"));
        assert_eq!(resolve_source(false, Some("a.WEBP?v=2"), None), None);
        assert_eq!(resolve_source(true, None, None), None);
    }

    #[test]
    fn detection_is_cached_per_object() {
        let mut support = WebpSupport::default();
        let mut window = Window::default();
        assert_eq!(support.cached(), None);
        assert!(support.detect(&window));
        window.webp = false;
        assert!(support.detect(&window));
        assert!(!WebpSupport::default().detect(&window));
    }

    fn picture_page() -> Page {
        page_with(|page| {
            let body = page.dom.body();
            let picture = mount(page, body, el("picture"));
            mount(
                page,
                picture,
                el("source")
                    .attr("type", "image/webp")
                    .attr("data-fallback", "hero.jpg"),
            );
            mount(page, picture, el("img").class("hero").attr("src", "hero.webp"));
            mount(
                page,
                body,
                el("img")
                    .class("logo")
                    .attr("src", "logo.webp")
                    .attr("data-fallback", "logo.png"),
            );
        })
    }

    #[test]
    fn unsupported_webp_rewrites_sources() {
        let mut page = picture_page();
        page.dom.window.webp = false;
        let support = ImageSupport::init(&mut page).unwrap();
        assert_eq!(support.webp_supported(), Some(false));
        assert_eq!(page.dom.attribute(find(&page, "img.hero"), "src"), Some("hero.jpg"));
        assert_eq!(page.dom.attribute(find(&page, "img.logo"), "src"), Some("logo.png"));
        assert!(!page.dom.has_class(page.dom.root(), "webp"));
    }

    #[test]
    fn supported_webp_flags_root_only() {
        let mut page = picture_page();
        ImageSupport::init(&mut page).unwrap();
        assert!(page.dom.has_class(page.dom.root(), "webp"));
        assert_eq!(page.dom.attribute(find(&page, "img.logo"), "src"), Some("logo.webp"));
    }

    fn lazy_page(fallback: Option<&str>) -> Page {
        page_with(|page| {
            let body = page.dom.body();
            let mut img = el("img")
                .attr("loading", "lazy")
                .attr("data-src", "team.webp")
                .metrics(|m| {
                    m.top = 1500.0;
                    m.offset_height = 300.0;
                });
            if let Some(fallback) = fallback {
                img = img.attr("data-fallback", fallback);
            }
            mount(page, body, img);
        })
    }

    #[test]
    fn loads_when_near_viewport() {
        let mut page = lazy_page(None);
        let mut images = ImageSupport::init(&mut page).unwrap();
        let img = find(&page, "img");

        page.settle(&mut images);
        assert!(page.requested_images().is_empty());

        // 1500 - 200px margin is inside an 800px viewport scrolled to 600.
        page.scroll_window(&mut images, 600.0);
        assert!(page.dom.has_class(img, "lazy-loading"));
        page.advance(&mut images, 0);
        assert!(page.dom.has_class(img, "lazy-loaded"));
        assert!(!page.dom.has_class(img, "lazy-loading"));
        assert_eq!(page.requested_images(), ["team.webp"]);
        assert_eq!(page.listener_count(), 0);
    }

    #[test]
    fn failure_retries_fallback_once() {
        let mut page = lazy_page(Some("team.jpg"));
        page.fail_image("team.webp");
        page.fail_image("team.jpg");
        let mut images = ImageSupport::init(&mut page).unwrap();
        let img = find(&page, "img");

        page.scroll_window(&mut images, 1200.0);
        page.advance(&mut images, 10);
        assert_eq!(page.requested_images(), ["team.webp", "team.jpg"]);
        assert!(page.dom.has_class(img, "lazy-error"));
        assert_eq!(images.in_flight(), 0);
        assert_eq!(page.listener_count(), 0);
    }

    #[test]
    fn unsupported_webp_without_fallback_is_marked_error() {
        let mut page = lazy_page(None);
        page.dom.window.webp = false;
        let mut images = ImageSupport::init(&mut page).unwrap();
        let img = find(&page, "img");

        page.scroll_window(&mut images, 1200.0);
        assert!(page.requested_images().is_empty());
        assert!(page.dom.has_class(img, "lazy-error"));
        assert!(!page.is_observing(images.watcher().unwrap(), img));
    }
}
