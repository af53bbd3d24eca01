//! Reveal-on-scroll.
//!
//! `.fade-in` and `.slide-in*` elements get `visible` the first time they
//! cross the viewport (10% visible, bottom edge pulled in by 50px), and are
//! then unwatched for good. A mutation watcher on `<body>` picks up matching
//! elements inserted later.

use crate::dom::ElementId;
use crate::page::{Controller, Page, Route, RootMargin, Signal, WatcherId};
use crate::selector::{Selector, SelectorError};
use std::collections::HashSet;
use tracing::debug;

pub const REVEAL_THRESHOLD: f64 = 0.1;
/// `0px 0px -50px 0px`
pub const REVEAL_MARGIN: RootMargin = RootMargin {
    top: 0.0,
    right: 0.0,
    bottom: -50.0,
    left: 0.0,
};

pub const FADE_SELECTOR: &str = ".fade-in";
pub const SLIDE_SELECTOR: &str =
    ".slide-in, .slide-in-left, .slide-in-right, .slide-in-up, .slide-in-down";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealAction {
    Fade,
    Slide,
    Added,
}

#[derive(Debug)]
pub struct AnimationManager {
    fade_selector: Selector,
    slide_selector: Selector,
    fade: Option<WatcherId>,
    slide: Option<WatcherId>,
    mutations: Option<WatcherId>,
    animated: HashSet<ElementId>,
}

impl AnimationManager {
    pub fn new() -> Result<Self, SelectorError> {
        Ok(Self {
            fade_selector: Selector::parse(FADE_SELECTOR)?,
            slide_selector: Selector::parse(SLIDE_SELECTOR)?,
            fade: None,
            slide: None,
            mutations: None,
            animated: HashSet::new(),
        })
    }

    /// Start watching. With reduced motion preferred, everything is shown
    /// immediately and nothing is watched.
    pub fn init(&mut self, page: &mut Page) {
        let fades = page.dom.query_all(&self.fade_selector);
        let slides = page.dom.query_all(&self.slide_selector);

        if page.dom.window.reduced_motion {
            for el in fades.into_iter().chain(slides) {
                page.dom.add_class(el, "visible");
                self.animated.insert(el);
            }
            return;
        }

        let fade = page.watch_intersections(
            REVEAL_THRESHOLD,
            REVEAL_MARGIN,
            Route::Reveal(RevealAction::Fade),
        );
        let slide = page.watch_intersections(
            REVEAL_THRESHOLD,
            REVEAL_MARGIN,
            Route::Reveal(RevealAction::Slide),
        );
        for el in &fades {
            page.observe(fade, *el);
        }
        for el in &slides {
            page.observe(slide, *el);
        }
        let body = page.dom.body();
        self.mutations = Some(page.watch_mutations(body, Route::Reveal(RevealAction::Added)));
        self.fade = Some(fade);
        self.slide = Some(slide);
        debug!(fade = fades.len(), slide = slides.len(), "reveal watchers ready");
    }

    /// Live watcher ids, in creation order.
    pub fn watchers(&self) -> Vec<WatcherId> {
        [self.fade, self.slide, self.mutations]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn is_animated(&self, el: ElementId) -> bool {
        self.animated.contains(&el)
    }

    /// Watch `el` with whichever watcher its classes call for.
    fn watch(&self, page: &mut Page, el: ElementId) {
        if self.fade_selector.matches(&page.dom, el) {
            if let Some(w) = self.fade {
                page.observe(w, el);
            }
        } else if self.slide_selector.matches(&page.dom, el)
            && let Some(w) = self.slide
        {
            page.observe(w, el);
        }
    }

    fn reveal(&mut self, page: &mut Page, watcher: Option<WatcherId>, el: ElementId) {
        page.dom.add_class(el, "visible");
        self.animated.insert(el);
        if let Some(w) = watcher {
            page.unobserve(w, el);
        }
    }

    fn added(&self, page: &mut Page, node: ElementId) {
        let mut candidates = vec![node];
        candidates.extend(page.dom.descendants(node));
        for el in candidates {
            if !self.animated.contains(&el) {
                self.watch(page, el);
            }
        }
    }

    /// Hide `el` again and re-arm its watcher.
    pub fn reset_element(&mut self, page: &mut Page, el: ElementId) {
        page.dom.remove_class(el, "visible");
        self.animated.remove(&el);
        self.watch(page, el);
    }

    /// Release every watcher. Safe to call repeatedly.
    pub fn disconnect(&mut self, page: &mut Page) {
        for w in [self.fade.take(), self.slide.take(), self.mutations.take()]
            .into_iter()
            .flatten()
        {
            page.disconnect(w);
        }
    }

    pub fn on_action(&mut self, page: &mut Page, action: RevealAction, signal: Signal<'_>) {
        match (action, signal) {
            (RevealAction::Fade, Signal::Intersecting(el)) => self.reveal(page, self.fade, el),
            (RevealAction::Slide, Signal::Intersecting(el)) => self.reveal(page, self.slide, el),
            (RevealAction::Added, Signal::Added(el)) => self.added(page, el),
            _ => {}
        }
    }
}

impl Controller for AnimationManager {
    fn handle(&mut self, page: &mut Page, route: &Route, signal: Signal<'_>) {
        if let Route::Reveal(action) = route {
            self.on_action(page, *action, signal);
        }
    }
}
