//! Site navigation: header scroll state, mobile menu, dropdown accordion,
//! smooth anchor scrolling, and the focus trap.
//!
//! The controller owns every listener it registers. [`NavigationController::destroy`]
//! removes exactly those ids and cancels its timers, so the page's listener
//! and timer counts return to what they were before [`NavigationController::init`].
//!
//! A page without a `<header>` gets fallback mode: a single scroll listener
//! that toggles `scrolled` on `.site-header`, if there is one. Initialization
//! never fails on missing markup.

use crate::dom::{ElementId, Window};
use crate::event_loop::TimerId;
use crate::page::{Controller, Event, EventKind, ListenerId, Page, Route, Signal, Target};
use crate::selector::SelectorError;
use crate::util::{Debounce, Throttle, viewport_dimensions};
use tracing::{debug, info, warn};

pub const SCROLL_THRESHOLD: f64 = 100.0;
pub const MOBILE_BREAKPOINT: f64 = 992.0;
pub const SCROLL_THROTTLE_MS: u64 = 16;
pub const RESIZE_DEBOUNCE_MS: u64 = 250;
/// Scroll deltas at or below this are ignored.
pub const SCROLL_NOISE_PX: f64 = 5.0;
/// Space left between the fixed header and an anchor target.
pub const ANCHOR_GAP_PX: f64 = 20.0;
pub const MANUAL_SCROLL_MS: u64 = 800;

pub const FOCUSABLE: &str = r#"a, button, [tabindex]:not([tabindex="-1"])"#;
const ANCHORS: &str = r##"a[href^="#"]:not([href="#"])"##;

fn is_desktop(window: &Window) -> bool {
    let (width, _) = viewport_dimensions(window);
    width >= MOBILE_BREAKPOINT
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavAction {
    Scroll,
    ScrollTrailing,
    ScrollFrame,
    Resize,
    ResizeSettled,
    ToggleMenu,
    Backdrop,
    Dropdown,
    Anchor,
    KeyDown,
    FocusTrap,
    OutsideClick,
    FallbackScroll,
    /// One frame of the manual ease-out scroll.
    ScrollStep { start: f64, end: f64, started_at: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NavigationState {
    pub is_mobile_menu_open: bool,
    pub current_scroll_y: f64,
    pub is_initialized: bool,
    /// A header update frame is pending.
    pub is_scrolling: bool,
}

#[derive(Debug, Default, Clone)]
struct NavElements {
    header: Option<ElementId>,
    toggle: Option<ElementId>,
    menu: Option<ElementId>,
    backdrop: Option<ElementId>,
    dropdowns: Vec<ElementId>,
    anchors: Vec<ElementId>,
}

#[derive(Debug)]
pub struct NavigationController {
    elements: NavElements,
    state: NavigationState,
    scroll: Throttle,
    resize: Debounce,
    frame: Option<TimerId>,
    animation: Option<TimerId>,
    focus_trap: Option<ListenerId>,
    listeners: Vec<ListenerId>,
    fallback: bool,
    fallback_header: Option<ElementId>,
}

impl Default for NavigationController {
    fn default() -> Self {
        Self::new()
    }
}

/// Cubic ease-out: fast start, gentle landing.
pub fn ease_out_cubic(progress: f64) -> f64 {
    1.0 - (1.0 - progress.clamp(0.0, 1.0)).powi(3)
}

impl NavigationController {
    pub fn new() -> Self {
        Self {
            elements: NavElements::default(),
            state: NavigationState::default(),
            scroll: Throttle::new(SCROLL_THROTTLE_MS),
            resize: Debounce::new(RESIZE_DEBOUNCE_MS),
            frame: None,
            animation: None,
            focus_trap: None,
            listeners: Vec::new(),
            fallback: false,
            fallback_header: None,
        }
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn has_focus_trap(&self) -> bool {
        self.focus_trap.is_some()
    }

    /// Locate the navigation markup and wire it up.
    pub fn init(&mut self, page: &mut Page) -> Result<(), SelectorError> {
        let dom = &page.dom;
        let menu = match dom.select(".nav-menu")? {
            Some(menu) => Some(menu),
            None => dom.select(".nav-links")?,
        };
        self.elements = NavElements {
            header: dom.select("header")?,
            toggle: dom.select(".mobile-toggle")?,
            menu,
            backdrop: dom.select(".nav-backdrop")?,
            dropdowns: dom.select_all(".dropbtn")?,
            anchors: dom.select_all(ANCHORS)?,
        };

        if self.elements.header.is_none() {
            warn!("essential navigation elements not found, using fallback mode");
            return self.init_fallback(page);
        }

        self.attach(page);
        self.state.current_scroll_y = page.dom.window.scroll_y;
        self.update_header(page);
        self.state.is_initialized = true;
        info!(
            dropdowns = self.elements.dropdowns.len(),
            anchors = self.elements.anchors.len(),
            "navigation initialized"
        );
        Ok(())
    }

    fn init_fallback(&mut self, page: &mut Page) -> Result<(), SelectorError> {
        self.fallback = true;
        self.fallback_header = page.dom.select(".site-header")?;
        if self.fallback_header.is_some() {
            self.listen(page, Target::Window, EventKind::Scroll, NavAction::FallbackScroll);
        }
        Ok(())
    }

    fn listen(&mut self, page: &mut Page, target: Target, kind: EventKind, action: NavAction) {
        let id = page.add_listener(target, kind, Route::Nav(action));
        self.listeners.push(id);
    }

    fn attach(&mut self, page: &mut Page) {
        self.listen(page, Target::Window, EventKind::Scroll, NavAction::Scroll);
        self.listen(page, Target::Window, EventKind::Resize, NavAction::Resize);

        if let (Some(toggle), Some(_)) = (self.elements.toggle, self.elements.menu) {
            self.listen(page, Target::Element(toggle), EventKind::Click, NavAction::ToggleMenu);
        }
        if let Some(backdrop) = self.elements.backdrop {
            self.listen(page, Target::Element(backdrop), EventKind::Click, NavAction::Backdrop);
        }
        for toggle in self.elements.dropdowns.clone() {
            self.listen(page, Target::Element(toggle), EventKind::Click, NavAction::Dropdown);
        }
        for link in self.elements.anchors.clone() {
            self.listen(page, Target::Element(link), EventKind::Click, NavAction::Anchor);
        }
        self.listen(page, Target::Document, EventKind::KeyDown, NavAction::KeyDown);
        self.listen(page, Target::Document, EventKind::Click, NavAction::OutsideClick);
    }

    /// Remove every listener and timer this controller registered.
    /// Safe to call more than once.
    pub fn destroy(&mut self, page: &mut Page) {
        self.release_focus(page);
        for id in self.listeners.drain(..) {
            page.remove_listener(id);
        }
        self.scroll.cancel(page);
        self.resize.cancel(page);
        for timer in [self.frame.take(), self.animation.take()].into_iter().flatten() {
            page.clear_timer(timer);
        }
        self.state.is_scrolling = false;
        if self.state.is_initialized {
            debug!("navigation destroyed");
        }
        self.state.is_initialized = false;
        self.fallback_header = None;
    }

    pub fn on_action(&mut self, page: &mut Page, action: &NavAction, signal: Signal<'_>) {
        match (action, signal) {
            (NavAction::Scroll, _) => {
                if self.scroll.call(page, Route::Nav(NavAction::ScrollTrailing)) {
                    self.on_scroll(page);
                }
            }
            (NavAction::ScrollTrailing, _) => {
                self.scroll.fired(page.now());
                self.on_scroll(page);
            }
            (NavAction::ScrollFrame, _) => self.scroll_frame(page),
            (NavAction::Resize, _) => self
                .resize
                .schedule(page, Route::Nav(NavAction::ResizeSettled)),
            (NavAction::ResizeSettled, _) => {
                self.resize.fired();
                self.on_resize(page);
            }
            (NavAction::ToggleMenu, Signal::Event(event)) => {
                event.prevent_default();
                self.toggle_menu(page);
            }
            (NavAction::Backdrop, _) => self.close_menu(page),
            (NavAction::Dropdown, Signal::Event(event)) => self.dropdown_toggle(page, event),
            (NavAction::Anchor, Signal::Event(event)) => self.smooth_scroll(page, event),
            (NavAction::KeyDown, Signal::Event(event)) => {
                if event.key_is("Escape") && self.state.is_mobile_menu_open {
                    self.close_menu(page);
                }
            }
            (NavAction::FocusTrap, Signal::Event(event)) => self.trap_tab(page, event),
            (NavAction::OutsideClick, Signal::Event(event)) => self.outside_click(page, event),
            (NavAction::FallbackScroll, _) => {
                if let Some(header) = self.fallback_header {
                    let scrolled = page.dom.window.scroll_y > SCROLL_THRESHOLD;
                    page.dom.toggle_class(header, "scrolled", scrolled);
                }
            }
            (
                NavAction::ScrollStep {
                    start,
                    end,
                    started_at,
                },
                _,
            ) => self.scroll_step(page, *start, *end, *started_at),
            (action, _) => debug!(?action, "navigation action without an event"),
        }
    }

    fn on_scroll(&mut self, page: &mut Page) {
        if self.state.is_scrolling {
            return;
        }
        self.state.is_scrolling = true;
        self.frame = Some(page.request_frame(Route::Nav(NavAction::ScrollFrame)));
    }

    fn scroll_frame(&mut self, page: &mut Page) {
        self.frame = None;
        let scroll_y = page.dom.window.scroll_y;
        if (scroll_y - self.state.current_scroll_y).abs() > SCROLL_NOISE_PX {
            self.state.current_scroll_y = scroll_y;
            self.update_header(page);
        }
        self.state.is_scrolling = false;
    }

    fn update_header(&self, page: &mut Page) {
        if let Some(header) = self.elements.header {
            let scrolled = self.state.current_scroll_y > SCROLL_THRESHOLD;
            page.dom.toggle_class(header, "scrolled", scrolled);
        }
    }

    fn on_resize(&mut self, page: &mut Page) {
        if is_desktop(&page.dom.window) {
            if self.state.is_mobile_menu_open {
                self.close_menu(page);
            }
            self.close_all_dropdowns(page, None);
        }
    }

    pub fn toggle_menu(&mut self, page: &mut Page) {
        let open = !self.state.is_mobile_menu_open;
        self.state.is_mobile_menu_open = open;
        self.apply_menu_state(page, open);
        if open {
            self.trap_focus(page);
        } else {
            self.release_focus(page);
        }
    }

    pub fn close_menu(&mut self, page: &mut Page) {
        if !self.state.is_mobile_menu_open {
            return;
        }
        self.state.is_mobile_menu_open = false;
        self.apply_menu_state(page, false);
        self.close_all_dropdowns(page, None);
        self.release_focus(page);
    }

    fn apply_menu_state(&self, page: &mut Page, open: bool) {
        let dom = &mut page.dom;
        if let Some(toggle) = self.elements.toggle {
            dom.set_attribute(toggle, "aria-expanded", open.to_string());
        }
        for el in [self.elements.menu, self.elements.backdrop].into_iter().flatten() {
            dom.toggle_class(el, "active", open);
        }
        let body = dom.body();
        dom.toggle_class(body, "menu-open", open);
    }

    fn dropdown_toggle(&mut self, page: &mut Page, event: &mut Event) {
        if is_desktop(&page.dom.window) {
            return;
        }
        let Target::Element(toggle) = event.current_target else {
            return;
        };
        event.prevent_default();
        event.stop_propagation();

        let expanded = page.dom.attribute(toggle, "aria-expanded") == Some("true");
        self.close_all_dropdowns(page, Some(toggle));
        if let Some(menu) = page.dom.next_element_sibling(toggle)
            && page.dom.has_class(menu, "dropdown-menu")
        {
            page.dom
                .set_attribute(toggle, "aria-expanded", (!expanded).to_string());
            page.dom.toggle_class(menu, "show", !expanded);
        }
    }

    fn close_all_dropdowns(&self, page: &mut Page, except: Option<ElementId>) {
        for &toggle in &self.elements.dropdowns {
            if Some(toggle) == except {
                continue;
            }
            page.dom.set_attribute(toggle, "aria-expanded", "false");
            if let Some(menu) = page.dom.next_element_sibling(toggle)
                && page.dom.has_class(menu, "dropdown-menu")
            {
                page.dom.remove_class(menu, "show");
            }
        }
    }

    fn smooth_scroll(&mut self, page: &mut Page, event: &mut Event) {
        let Target::Element(link) = event.current_target else {
            return;
        };
        let Some(href) = page.dom.attribute(link, "href").map(str::to_string) else {
            return;
        };
        let Some(target) = page.dom.element_by_id(href.trim_start_matches('#')) else {
            return;
        };
        event.prevent_default();

        if self.state.is_mobile_menu_open {
            self.close_menu(page);
        }

        let header_height = self
            .elements
            .header
            .map_or(0.0, |h| page.dom.metrics(h).offset_height);
        let scroll_y = page.dom.window.scroll_y;
        let destination = page.dom.bounding_top(target) + scroll_y - header_height - ANCHOR_GAP_PX;

        let window = &page.dom.window;
        if window.reduced_motion || window.smooth_scroll {
            // Native scrolling; the browser owns the animation.
            page.scroll_window_to(destination);
        } else {
            if let Some(previous) = self.animation.take() {
                page.clear_timer(previous);
            }
            let step = NavAction::ScrollStep {
                start: scroll_y,
                end: destination,
                started_at: page.now(),
            };
            self.animation = Some(page.request_frame(Route::Nav(step)));
        }

        page.dom.set_location_hash(href);
        page.dom.focus(target);
    }

    fn scroll_step(&mut self, page: &mut Page, start: f64, end: f64, started_at: u64) {
        let elapsed = page.now().saturating_sub(started_at) as f64;
        let progress = (elapsed / MANUAL_SCROLL_MS as f64).min(1.0);
        page.scroll_window_to(start + (end - start) * ease_out_cubic(progress));
        self.animation = if progress < 1.0 {
            let step = NavAction::ScrollStep {
                start,
                end,
                started_at,
            };
            Some(page.request_frame(Route::Nav(step)))
        } else {
            None
        };
    }

    fn focusables(&self, page: &Page) -> Vec<ElementId> {
        self.elements
            .menu
            .and_then(|menu| page.dom.select_all_within(menu, FOCUSABLE).ok())
            .unwrap_or_default()
    }

    fn trap_focus(&mut self, page: &mut Page) {
        if self.elements.menu.is_none() || self.focus_trap.is_some() {
            return;
        }
        if let Some(&first) = self.focusables(page).first() {
            page.dom.focus(first);
        }
        let id = page.add_listener(
            Target::Document,
            EventKind::KeyDown,
            Route::Nav(NavAction::FocusTrap),
        );
        self.focus_trap = Some(id);
    }

    fn release_focus(&mut self, page: &mut Page) {
        if let Some(id) = self.focus_trap.take() {
            page.remove_listener(id);
        }
    }

    fn trap_tab(&self, page: &mut Page, event: &mut Event) {
        if !event.key_is("Tab") {
            return;
        }
        let focusables = self.focusables(page);
        let (Some(&first), Some(&last)) = (focusables.first(), focusables.last()) else {
            return;
        };
        let active = page.dom.active_element();
        if event.shift_key && active == Some(first) {
            page.dom.focus(last);
            event.prevent_default();
        } else if !event.shift_key && active == Some(last) {
            page.dom.focus(first);
            event.prevent_default();
        }
    }

    fn outside_click(&mut self, page: &mut Page, event: &Event) {
        if !self.state.is_mobile_menu_open {
            return;
        }
        let Some(target) = event.target_element() else {
            return;
        };
        let inside = [self.elements.toggle, self.elements.menu]
            .into_iter()
            .flatten()
            .any(|el| page.dom.contains(el, target));
        if !inside {
            self.close_menu(page);
        }
    }
}

impl Controller for NavigationController {
    fn handle(&mut self, page: &mut Page, route: &Route, signal: Signal<'_>) {
        if let Route::Nav(action) = route {
            self.on_action(page, action, signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{el, find, mount, page_with};

    /// Header, toggle, menu with three links, backdrop, one dropdown, and an
    /// anchor pointing at `#about`.
    fn site() -> Page {
        page_with(|page| {
            let body = page.dom.body();
            let header = mount(page, body, el("header").metrics(|m| m.offset_height = 80.0));
            mount(page, header, el("button").class("mobile-toggle"));
            let menu = mount(page, header, el("ul").class("nav-menu"));
            mount(page, menu, el("a").attr("href", "/"));
            mount(page, menu, el("a").attr("href", "/team"));
            let item = mount(page, menu, el("li").class("dropdown"));
            mount(page, item, el("button").class("dropbtn"));
            mount(page, item, el("div").class("dropdown-menu"));
            mount(page, menu, el("a").attr("href", "#about").class("jump"));
            mount(page, body, el("div").class("nav-backdrop"));
            mount(
                page,
                body,
                el("section").attr("id", "about").metrics(|m| m.top = 1500.0),
            );
            mount(page, body, el("main").class("outside"));
        })
    }

    fn ready(page: &mut Page) -> NavigationController {
        let mut nav = NavigationController::new();
        nav.init(page).unwrap();
        nav
    }

    #[test]
    fn ease_curve_endpoints() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert!((ease_out_cubic(0.5) - 0.875).abs() < 1e-9);
    }

    #[test]
    fn header_scroll_state_is_throttled_and_noise_filtered() {
        let mut page = site();
        let mut nav = ready(&mut page);
        let header = find(&page, "header");

        page.scroll_window(&mut nav, 150.0);
        assert!(!page.dom.has_class(header, "scrolled"));
        page.advance(&mut nav, 16);
        assert!(page.dom.has_class(header, "scrolled"));
        assert_eq!(nav.state().current_scroll_y, 150.0);

        // A 3px wobble does not count.
        page.scroll_window(&mut nav, 153.0);
        page.advance(&mut nav, 100);
        assert_eq!(nav.state().current_scroll_y, 150.0);

        page.scroll_window(&mut nav, 20.0);
        page.advance(&mut nav, 100);
        assert!(!page.dom.has_class(header, "scrolled"));
    }

    #[test]
    fn menu_toggle_installs_exactly_one_focus_trap() {
        let mut page = site();
        let mut nav = ready(&mut page);
        let toggle = find(&page, ".mobile-toggle");
        let menu = find(&page, ".nav-menu");
        let first = find(&page, r#"a[href="/"]"#);

        let event = page.dispatch(&mut nav, Event::click(toggle));
        assert!(event.default_prevented());
        assert!(nav.state().is_mobile_menu_open);
        assert!(nav.has_focus_trap());
        assert_eq!(page.dom.attribute(toggle, "aria-expanded"), Some("true"));
        assert!(page.dom.has_class(menu, "active"));
        assert!(page.dom.has_class(page.dom.body(), "menu-open"));
        assert_eq!(page.dom.active_element(), Some(first));

        page.dispatch(&mut nav, Event::click(toggle));
        assert!(!nav.state().is_mobile_menu_open);
        assert!(!nav.has_focus_trap());
        assert_eq!(page.dom.attribute(toggle, "aria-expanded"), Some("false"));
    }

    #[test]
    fn tab_cycles_inside_open_menu() {
        let mut page = site();
        let mut nav = ready(&mut page);
        let toggle = find(&page, ".mobile-toggle");
        page.dispatch(&mut nav, Event::click(toggle));

        let first = find(&page, r#"a[href="/"]"#);
        let last = find(&page, "a.jump");

        page.dom.focus(last);
        let event = page.press_key(&mut nav, "Tab", false);
        assert!(event.default_prevented());
        assert_eq!(page.dom.active_element(), Some(first));

        let event = page.press_key(&mut nav, "Tab", true);
        assert!(event.default_prevented());
        assert_eq!(page.dom.active_element(), Some(last));
    }

    #[test]
    fn escape_and_outside_click_close() {
        let mut page = site();
        let mut nav = ready(&mut page);
        let toggle = find(&page, ".mobile-toggle");
        let outside = find(&page, "main.outside");

        page.dispatch(&mut nav, Event::click(toggle));
        page.press_key(&mut nav, "Escape", false);
        assert!(!nav.state().is_mobile_menu_open);

        page.dispatch(&mut nav, Event::click(toggle));
        page.dispatch(&mut nav, Event::click(outside));
        assert!(!nav.state().is_mobile_menu_open);

        let backdrop = find(&page, ".nav-backdrop");
        page.dispatch(&mut nav, Event::click(toggle));
        page.dispatch(&mut nav, Event::click(backdrop));
        assert!(!nav.state().is_mobile_menu_open);
        assert!(!nav.has_focus_trap());
    }

    #[test]
    fn dropdowns_are_an_accordion_on_mobile_only() {
        let mut page = site();
        let mut nav = ready(&mut page);
        let button = find(&page, ".dropbtn");
        let menu = find(&page, ".dropdown-menu");

        page.dispatch(&mut nav, Event::click(button));
        assert!(!page.dom.has_class(menu, "show"));

        page.dom.window.inner_width = 600.0;
        page.dispatch(&mut nav, Event::click(button));
        assert!(page.dom.has_class(menu, "show"));
        assert_eq!(page.dom.attribute(button, "aria-expanded"), Some("true"));

        page.dispatch(&mut nav, Event::click(button));
        assert!(!page.dom.has_class(menu, "show"));
    }

    #[test]
    fn resize_to_desktop_closes_everything() {
        let mut page = site();
        let mut nav = ready(&mut page);
        page.dom.window.inner_width = 600.0;
        let toggle = find(&page, ".mobile-toggle");
        let button = find(&page, ".dropbtn");
        let dropdown = find(&page, ".dropdown-menu");
        page.dispatch(&mut nav, Event::click(toggle));
        page.dispatch(&mut nav, Event::click(button));

        page.resize(&mut nav, 1200.0, 800.0);
        assert!(nav.state().is_mobile_menu_open);
        page.advance(&mut nav, RESIZE_DEBOUNCE_MS);
        assert!(!nav.state().is_mobile_menu_open);
        assert!(!page.dom.has_class(dropdown, "show"));
    }

    #[test]
    fn anchor_scrolls_below_header_and_focuses_target() {
        let mut page = site();
        let mut nav = ready(&mut page);
        let link = find(&page, "a.jump");
        let section = find(&page, "#about");

        let event = page.dispatch(&mut nav, Event::click(link));
        assert!(event.default_prevented());
        assert_eq!(page.dom.window.scroll_y, 1500.0 - 80.0 - ANCHOR_GAP_PX);
        assert_eq!(page.dom.location_hash(), Some("#about"));
        assert_eq!(page.dom.active_element(), Some(section));
    }

    #[test]
    fn manual_scroll_animation_without_native_support() {
        let mut page = site();
        page.dom.window.smooth_scroll = false;
        let mut nav = ready(&mut page);
        let link = find(&page, "a.jump");

        page.dispatch(&mut nav, Event::click(link));
        assert_eq!(page.dom.window.scroll_y, 0.0);
        page.advance(&mut nav, 400);
        let midway = page.dom.window.scroll_y;
        assert!(midway > 0.0 && midway < 1400.0);
        page.advance(&mut nav, 500);
        assert_eq!(page.dom.window.scroll_y, 1400.0);
    }

    #[test]
    fn destroy_restores_listener_and_timer_counts() {
        let mut page = site();
        let before = page.listener_count();
        let mut nav = ready(&mut page);
        let toggle = find(&page, ".mobile-toggle");
        page.dispatch(&mut nav, Event::click(toggle));
        page.scroll_window(&mut nav, 400.0);
        page.resize(&mut nav, 900.0, 700.0);
        assert!(page.listener_count() > before);

        nav.destroy(&mut page);
        assert_eq!(page.listener_count(), before);
        assert_eq!(page.pending_timers(), 0);
        nav.destroy(&mut page);
        assert_eq!(page.listener_count(), before);
    }

    #[test]
    fn missing_header_falls_back_to_site_header() {
        let mut page = page_with(|page| {
            let body = page.dom.body();
            mount(page, body, el("div").class("site-header"));
        });
        let mut nav = ready(&mut page);
        assert!(nav.is_fallback());
        assert!(!nav.state().is_initialized);

        let header = find(&page, ".site-header");
        page.scroll_window(&mut nav, 250.0);
        assert!(page.dom.has_class(header, "scrolled"));
    }
}
