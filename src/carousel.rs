//! Partner logo carousels.
//!
//! Every `.partner-carousel` on the page gets an independent instance. An
//! instance whose markup is incomplete is skipped with a warning; the others
//! still work.
//!
//! Position handling is split into pure functions ([`max_scroll`],
//! [`clamp_position`], [`scroll_distance`], [`button_states`]) and the
//! stateful [`CarouselSet`], which owns the listeners and timers of all
//! instances in one side table.

use crate::config::CarouselConfig;
use crate::dom::ElementId;
use crate::event_loop::TimerId;
use crate::page::{Controller, EventKind, ListenerId, Page, Route, Signal, Target};
use crate::selector::SelectorError;
use crate::util::Debounce;
use thiserror::Error;
use tracing::{debug, warn};

/// Fallback completion delay when `scrollend` is unavailable.
pub const SCROLL_SETTLE_MS: u64 = 300;
pub const SCROLL_DEBOUNCE_MS: u64 = 16;
pub const RESIZE_DEBOUNCE_MS: u64 = 250;
const DISABLED_OPACITY: &str = "0.5";
const ENABLED_OPACITY: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarouselAction {
    Prev,
    Next,
    Scroll,
    ScrollEnd,
    ScrollSettled,
    RefreshButtons,
    Resize,
    ResizeSettled,
}

#[derive(Error, Debug)]
pub enum CarouselError {
    #[error("carousel {0}: missing required elements")]
    MissingElements(usize),
    #[error("carousel {0}: no slides found")]
    NoSlides(usize),
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CarouselState {
    pub scroll_position: f64,
    pub max_scroll_position: f64,
    pub is_scrolling: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonStates {
    pub prev_disabled: bool,
    pub next_disabled: bool,
}

pub fn max_scroll(scroll_width: f64, client_width: f64) -> f64 {
    (scroll_width - client_width).max(0.0)
}

pub fn clamp_position(target: f64, max: f64) -> f64 {
    target.min(max).max(0.0)
}

/// Whole visible slides (at least one) times the slide pitch.
pub fn scroll_distance(client_width: f64, config: &CarouselConfig) -> f64 {
    let pitch = config.slide_width + config.gap;
    (client_width / pitch).floor().max(1.0) * pitch
}

pub fn button_states(position: f64, max: f64, threshold: f64) -> ButtonStates {
    ButtonStates {
        prev_disabled: position <= threshold,
        next_disabled: position >= max - threshold,
    }
}

#[derive(Debug)]
struct Carousel {
    track: ElementId,
    prev: ElementId,
    next: ElementId,
    state: CarouselState,
    listeners: Vec<ListenerId>,
    scroll_end: Option<ListenerId>,
    settle_timer: Option<TimerId>,
    refresh: Debounce,
    resize: Debounce,
}

#[derive(Debug, Default)]
pub struct CarouselSet {
    config: CarouselConfig,
    carousels: Vec<Carousel>,
}

impl CarouselSet {
    /// Initialize every carousel on the page.
    pub fn init(page: &mut Page, config: &CarouselConfig) -> Result<Self, SelectorError> {
        let mut set = Self {
            config: config.clone(),
            carousels: Vec::new(),
        };
        let roots = page.dom.select_all(".partner-carousel")?;
        if roots.is_empty() {
            warn!("no partner carousels found on the page");
            return Ok(set);
        }
        for (position, root) in roots.into_iter().enumerate() {
            match set.init_one(page, root, position) {
                Ok(()) => {}
                Err(e) => warn!("{e}"),
            }
        }
        debug!(count = set.carousels.len(), "carousels initialized");
        Ok(set)
    }

    fn init_one(
        &mut self,
        page: &mut Page,
        root: ElementId,
        position: usize,
    ) -> Result<(), CarouselError> {
        let dom = &page.dom;
        let track = dom.select_within(root, ".partner-logos")?;
        let slides = dom.select_all_within(root, ".partner-slide")?;
        let prev = dom.select_within(root, ".prev-btn")?;
        let next = dom.select_within(root, ".next-btn")?;
        let (Some(track), Some(prev), Some(next)) = (track, prev, next) else {
            return Err(CarouselError::MissingElements(position));
        };
        if slides.is_empty() {
            return Err(CarouselError::NoSlides(position));
        }

        let dom = &mut page.dom;
        dom.set_attribute(prev, "aria-label", "Previous partners");
        dom.set_attribute(next, "aria-label", "Next partners");
        dom.set_attribute(track, "role", "region");
        dom.set_attribute(track, "aria-label", "Partner logos carousel");

        let index = self.carousels.len();
        let route = |action| Route::Carousel(index, action);
        let listeners = vec![
            page.add_listener(Target::Element(prev), EventKind::Click, route(CarouselAction::Prev)),
            page.add_listener(Target::Element(next), EventKind::Click, route(CarouselAction::Next)),
            page.add_listener(Target::Element(track), EventKind::Scroll, route(CarouselAction::Scroll)),
            page.add_listener(Target::Window, EventKind::Resize, route(CarouselAction::Resize)),
        ];

        let mut carousel = Carousel {
            track,
            prev,
            next,
            state: CarouselState::default(),
            listeners,
            scroll_end: None,
            settle_timer: None,
            refresh: Debounce::new(SCROLL_DEBOUNCE_MS),
            resize: Debounce::new(RESIZE_DEBOUNCE_MS),
        };
        carousel.state.scroll_position = page.dom.metrics(track).scroll_left;
        carousel.recompute_max(page);
        carousel.update_buttons(page, &self.config);
        self.carousels.push(carousel);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.carousels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.carousels.is_empty()
    }

    pub fn state(&self, index: usize) -> Option<CarouselState> {
        self.carousels.get(index).map(|c| c.state)
    }

    /// Scroll carousel `index` towards `target`. Returns `false` when the
    /// request was dropped because a scroll is already in flight.
    pub fn scroll_to_position(&mut self, page: &mut Page, index: usize, target: f64) -> bool {
        match self.carousels.get_mut(index) {
            Some(carousel) => carousel.scroll_to(page, index, target),
            None => false,
        }
    }

    pub fn on_action(
        &mut self,
        page: &mut Page,
        index: usize,
        action: CarouselAction,
        _signal: Signal<'_>,
    ) {
        let config = &self.config;
        let Some(carousel) = self.carousels.get_mut(index) else {
            return;
        };
        match action {
            CarouselAction::Next | CarouselAction::Prev => {
                let step = scroll_distance(page.dom.metrics(carousel.track).client_width, config);
                let delta = if action == CarouselAction::Next { step } else { -step };
                carousel.scroll_to(page, index, carousel.state.scroll_position + delta);
            }
            CarouselAction::Scroll => {
                carousel.state.scroll_position = page.dom.metrics(carousel.track).scroll_left;
                carousel
                    .refresh
                    .schedule(page, Route::Carousel(index, CarouselAction::RefreshButtons));
            }
            CarouselAction::RefreshButtons => {
                carousel.refresh.fired();
                carousel.update_buttons(page, config);
            }
            CarouselAction::ScrollEnd => {
                if let Some(id) = carousel.scroll_end.take() {
                    page.remove_listener(id);
                }
                carousel.finish_scroll(page, config);
            }
            CarouselAction::ScrollSettled => {
                carousel.settle_timer = None;
                carousel.finish_scroll(page, config);
            }
            CarouselAction::Resize => carousel
                .resize
                .schedule(page, Route::Carousel(index, CarouselAction::ResizeSettled)),
            CarouselAction::ResizeSettled => {
                carousel.resize.fired();
                let max = carousel.recompute_max(page);
                let previous = carousel.state.scroll_position;
                carousel.state.scroll_position = clamp_position(previous, max);
                // Mid-flight, finish_scroll re-clamps the track.
                if previous > max && !carousel.state.is_scrolling {
                    carousel.scroll_to(page, index, max);
                } else {
                    carousel.update_buttons(page, config);
                }
            }
        }
    }

    /// Tear down every instance: listeners, debounces, completion timers.
    pub fn destroy_all(&mut self, page: &mut Page) {
        for mut carousel in self.carousels.drain(..) {
            for id in carousel.listeners.drain(..).chain(carousel.scroll_end.take()) {
                page.remove_listener(id);
            }
            if let Some(timer) = carousel.settle_timer.take() {
                page.clear_timer(timer);
            }
            carousel.refresh.cancel(page);
            carousel.resize.cancel(page);
        }
    }
}

impl Carousel {
    fn recompute_max(&mut self, page: &Page) -> f64 {
        let m = page.dom.metrics(self.track);
        self.state.max_scroll_position = max_scroll(m.scroll_width, m.client_width);
        self.state.max_scroll_position
    }

    fn scroll_to(&mut self, page: &mut Page, index: usize, target: f64) -> bool {
        if self.state.is_scrolling {
            return false;
        }
        let max = self.recompute_max(page);
        let clamped = clamp_position(target, max);
        self.state.is_scrolling = true;
        self.state.scroll_position = clamped;

        if page.dom.window.scrollend {
            let route = Route::Carousel(index, CarouselAction::ScrollEnd);
            self.scroll_end =
                Some(page.add_listener(Target::Element(self.track), EventKind::ScrollEnd, route));
        } else {
            let route = Route::Carousel(index, CarouselAction::ScrollSettled);
            self.settle_timer = Some(page.set_timeout(SCROLL_SETTLE_MS, route));
        }
        page.scroll_element_to(self.track, clamped, true);
        true
    }

    /// A scroll came to rest. The track may have shrunk while it ran, so
    /// the resting position is clamped against a fresh maximum.
    fn finish_scroll(&mut self, page: &mut Page, config: &CarouselConfig) {
        self.state.is_scrolling = false;
        let max = self.recompute_max(page);
        let left = page.dom.metrics(self.track).scroll_left;
        let position = clamp_position(left, max);
        self.state.scroll_position = position;
        if left > position {
            page.scroll_element_to(self.track, position, false);
        }
        self.update_buttons(page, config);
    }

    fn update_buttons(&mut self, page: &mut Page, config: &CarouselConfig) {
        let max = self.recompute_max(page);
        let states = button_states(self.state.scroll_position, max, config.scroll_threshold);
        for (button, disabled) in [
            (self.prev, states.prev_disabled),
            (self.next, states.next_disabled),
        ] {
            let opacity = if disabled { DISABLED_OPACITY } else { ENABLED_OPACITY };
            page.dom.set_style(button, "opacity", opacity);
            page.dom
                .set_attribute(button, "aria-disabled", disabled.to_string());
            page.dom.set_disabled(button, disabled);
        }
    }
}

impl Controller for CarouselSet {
    fn handle(&mut self, page: &mut Page, route: &Route, signal: Signal<'_>) {
        if let Route::Carousel(index, action) = route {
            self.on_action(page, *index, *action, signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Event;
    use crate::test_helpers::{el, find, find_all, mount, page_with};

    fn carousel_page(client: f64, content: f64) -> Page {
        page_with(|page| {
            let body = page.dom.body();
            let root = mount(page, body, el("section").class("partner-carousel"));
            let track = mount(
                page,
                root,
                el("div").class("partner-logos").metrics(|m| {
                    m.client_width = client;
                    m.scroll_width = content;
                }),
            );
            for _ in 0..5 {
                mount(page, track, el("div").class("partner-slide"));
            }
            mount(page, root, el("button").class("prev-btn"));
            mount(page, root, el("button").class("next-btn"));
        })
    }

    #[test]
    fn distance_is_whole_slides_with_minimum_one() {
        let config = CarouselConfig::default();
        assert_eq!(scroll_distance(500.0, &config), 464.0);
        assert_eq!(scroll_distance(100.0, &config), 232.0);
    }

    #[test]
    fn clamping_stays_in_bounds() {
        for (content, client) in [(1200.0, 500.0), (300.0, 500.0), (500.0, 500.0)] {
            let max = max_scroll(content, client);
            for target in [-1e9, -1.0, 0.0, 250.0, max, max + 1.0, 1e9] {
                let pos = clamp_position(target, max);
                assert!((0.0..=max).contains(&pos), "{target} -> {pos} (max {max})");
            }
        }
    }

    #[test]
    fn button_thresholds() {
        assert_eq!(
            button_states(5.0, 700.0, 5.0),
            ButtonStates {
                prev_disabled: true,
                next_disabled: false
            }
        );
        assert!(button_states(695.0, 700.0, 5.0).next_disabled);
        assert!(!button_states(694.0, 700.0, 5.0).next_disabled);
    }

    #[test]
    fn init_labels_and_disables_prev() {
        let mut page = carousel_page(500.0, 1200.0);
        let set = CarouselSet::init(&mut page, &CarouselConfig::default()).unwrap();
        assert_eq!(set.len(), 1);
        let prev = find(&page, ".prev-btn");
        let track = find(&page, ".partner-logos");
        assert!(page.dom.is_disabled(prev));
        assert_eq!(page.dom.style(prev, "opacity"), Some("0.5"));
        assert_eq!(page.dom.attribute(track, "role"), Some("region"));
        assert_eq!(set.state(0).unwrap().max_scroll_position, 700.0);
    }

    #[test]
    fn next_steps_and_drops_mid_flight_requests() {
        let mut page = carousel_page(500.0, 1200.0);
        let mut set = CarouselSet::init(&mut page, &CarouselConfig::default()).unwrap();
        let next = find(&page, ".next-btn");
        let prev = find(&page, ".prev-btn");

        page.dispatch(&mut set, Event::click(next));
        assert_eq!(set.state(0).unwrap().scroll_position, 464.0);
        assert!(set.state(0).unwrap().is_scrolling);

        // Still scrolling: dropped, not queued.
        page.dispatch(&mut set, Event::click(next));
        assert_eq!(set.state(0).unwrap().scroll_position, 464.0);

        page.advance(&mut set, SCROLL_SETTLE_MS);
        assert!(!set.state(0).unwrap().is_scrolling);
        assert!(!page.dom.is_disabled(prev));

        page.dispatch(&mut set, Event::click(next));
        page.advance(&mut set, SCROLL_SETTLE_MS);
        assert_eq!(set.state(0).unwrap().scroll_position, 700.0);
        assert!(page.dom.is_disabled(next));
        assert_eq!(page.dom.attribute(next, "aria-disabled"), Some("true"));
    }

    #[test]
    fn settles_by_timer_without_scrollend() {
        let mut page = carousel_page(500.0, 1200.0);
        page.dom.window.scrollend = false;
        let mut set = CarouselSet::init(&mut page, &CarouselConfig::default()).unwrap();
        assert!(set.scroll_to_position(&mut page, 0, 100.0));
        assert!(!set.scroll_to_position(&mut page, 0, 200.0));
        page.advance(&mut set, SCROLL_SETTLE_MS - 1);
        assert!(set.state(0).unwrap().is_scrolling);
        page.advance(&mut set, 1);
        assert!(!set.state(0).unwrap().is_scrolling);
    }

    #[test]
    fn resize_reclamps_position() {
        let mut page = carousel_page(500.0, 1200.0);
        let mut set = CarouselSet::init(&mut page, &CarouselConfig::default()).unwrap();
        set.scroll_to_position(&mut page, 0, 700.0);
        page.advance(&mut set, SCROLL_SETTLE_MS);

        let track = find(&page, ".partner-logos");
        page.dom.metrics_mut(track).client_width = 900.0;
        page.resize(&mut set, 1000.0, 800.0);
        page.advance(&mut set, RESIZE_DEBOUNCE_MS + SCROLL_SETTLE_MS);
        let state = set.state(0).unwrap();
        assert_eq!(state.max_scroll_position, 300.0);
        assert_eq!(state.scroll_position, 300.0);
    }

    #[test]
    fn resize_during_scroll_rests_within_bounds() {
        for scrollend in [true, false] {
            let mut page = carousel_page(500.0, 1200.0);
            page.dom.window.scrollend = scrollend;
            let mut set = CarouselSet::init(&mut page, &CarouselConfig::default()).unwrap();
            let next = find(&page, ".next-btn");
            let track = find(&page, ".partner-logos");

            page.dispatch(&mut set, Event::click(next));
            assert_eq!(set.state(0).unwrap().scroll_position, 464.0);

            // Settles before the scroll does.
            page.dom.metrics_mut(track).client_width = 900.0;
            page.resize(&mut set, 1000.0, 800.0);
            page.advance(&mut set, 1_000);

            let state = set.state(0).unwrap();
            assert!(!state.is_scrolling, "scrollend={scrollend}");
            assert_eq!(state.max_scroll_position, 300.0);
            assert_eq!(state.scroll_position, 300.0, "scrollend={scrollend}");
            assert_eq!(page.dom.metrics(track).scroll_left, 300.0);
            assert!(page.dom.is_disabled(next));
        }
    }

    #[test]
    fn incomplete_carousel_is_skipped() {
        let mut page = carousel_page(500.0, 1200.0);
        let body = page.dom.body();
        let broken = mount(&mut page, body, el("section").class("partner-carousel"));
        mount(&mut page, broken, el("div").class("partner-logos"));
        let set = CarouselSet::init(&mut page, &CarouselConfig::default()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(find_all(&page, ".partner-carousel").len(), 2);
    }

    #[test]
    fn destroy_all_releases_everything() {
        let mut page = carousel_page(500.0, 1200.0);
        let mut set = CarouselSet::init(&mut page, &CarouselConfig::default()).unwrap();
        let next = find(&page, ".next-btn");
        page.dispatch(&mut set, Event::click(next));
        page.resize(&mut set, 900.0, 800.0);
        set.destroy_all(&mut page);
        assert_eq!(page.listener_count(), 0);
        // Only the browser's own deferred scrollend remains.
        assert_eq!(page.pending_timers(), 1);
        assert!(set.is_empty());
    }
}
