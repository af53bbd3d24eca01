//! The page: element tree + virtual event loop + side tables.
//!
//! A [`Page`] owns everything a browser tab would own for the interaction
//! layer: the [`Document`], the timer queue, the listener table, the
//! viewport/mutation watchers and a simulated image network. Controllers
//! never store callbacks here. Every registration carries a [`Route`], a
//! plain value naming which controller action should run, and the page hands
//! that route back to a [`Controller`] when the event, timer or watcher
//! fires.
//!
//! ```text
//! dispatch(event) ─┐
//! advance(ms) ─────┼─> Route ─> Controller::handle(page, route, signal)
//! watchers ────────┘
//! ```
//!
//! Because every listener, timer and watcher is an id in a table owned by the
//! page, teardown is verifiable: a controller that removed everything it
//! registered leaves the counts where it found them.

use crate::animations::RevealAction;
use crate::carousel::CarouselAction;
use crate::dom::{Document, ElementId};
use crate::event_loop::{EventLoop, TimerId};
use crate::forms::FormAction;
use crate::gallery::GalleryAction;
use crate::images::ImageAction;
use crate::interaction::ManagerAction;
use crate::navigation::NavAction;
use crate::notify::NoticeAction;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// How long a smooth element scroll takes before `scrollend` fires.
pub const SMOOTH_SCROLL_MS: u64 = 300;

/// Upper bound on settle rounds, in case handlers keep feeding each other.
const SETTLE_LIMIT: usize = 64;

/// Names the controller action a listener, timer or watcher leads to.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Nav(NavAction),
    Carousel(usize, CarouselAction),
    Gallery(GalleryAction),
    Reveal(RevealAction),
    Images(ImageAction),
    Forms(FormAction),
    Notice(NoticeAction),
    Manager(ManagerAction),
}

/// Why a route is being run.
#[derive(Debug)]
pub enum Signal<'a> {
    Event(&'a mut Event),
    Timer,
    /// An observed element entered the (margin-adjusted) viewport.
    Intersecting(ElementId),
    /// An element was added under a watched subtree.
    Added(ElementId),
}

/// Receives routed work from a [`Page`].
pub trait Controller {
    fn handle(&mut self, page: &mut Page, route: &Route, signal: Signal<'_>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Window,
    Document,
    Element(ElementId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    KeyDown,
    Scroll,
    ScrollEnd,
    Resize,
    MouseEnter,
    MouseLeave,
    Focus,
    Blur,
    Input,
    Submit,
    Reset,
    Load,
    Error,
    DomContentLoaded,
    BeforeUnload,
}

impl EventKind {
    pub fn bubbles(self) -> bool {
        matches!(
            self,
            Self::Click | Self::KeyDown | Self::Input | Self::Submit | Self::Reset
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub target: Target,
    pub current_target: Target,
    pub key: Option<String>,
    pub shift_key: bool,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl Event {
    pub fn new(kind: EventKind, target: Target) -> Self {
        Self {
            kind,
            target,
            current_target: target,
            key: None,
            shift_key: false,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    pub fn click(el: ElementId) -> Self {
        Self::new(EventKind::Click, Target::Element(el))
    }

    pub fn key_down(target: Target, key: &str, shift: bool) -> Self {
        let mut event = Self::new(EventKind::KeyDown, target);
        event.key = Some(key.to_string());
        event.shift_key = shift;
        event
    }

    pub fn on(kind: EventKind, el: ElementId) -> Self {
        Self::new(kind, Target::Element(el))
    }

    pub fn target_element(&self) -> Option<ElementId> {
        match self.target {
            Target::Element(id) => Some(id),
            _ => None,
        }
    }

    pub fn key_is(&self, key: &str) -> bool {
        self.key.as_deref() == Some(key)
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

#[derive(Debug, Clone)]
struct Listener {
    target: Target,
    kind: EventKind,
    route: Route,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarginError {
    #[error("root margin {0:?} must have one to four values")]
    Arity(String),
    #[error("root margin value {0:?} must be in px")]
    Unit(String),
}

/// `IntersectionObserver` root margin, in CSS shorthand order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RootMargin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl FromStr for RootMargin {
    type Err = MarginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split_whitespace()
            .map(|part| {
                let number = part.strip_suffix("px").unwrap_or(part);
                if number != "0" && !part.ends_with("px") {
                    return Err(MarginError::Unit(part.to_string()));
                }
                number
                    .parse::<f64>()
                    .map_err(|_| MarginError::Unit(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let [top, right, bottom, left] = match values.as_slice() {
            [all] => [*all; 4],
            [v, h] => [*v, *h, *v, *h],
            [t, h, b] => [*t, *h, *b, *h],
            [t, r, b, l] => [*t, *r, *b, *l],
            _ => return Err(MarginError::Arity(s.to_string())),
        };
        Ok(Self {
            top,
            right,
            bottom,
            left,
        })
    }
}

#[derive(Debug, Clone)]
enum WatchKind {
    Intersection { threshold: f64, margin: RootMargin },
    Mutation { root: ElementId },
}

#[derive(Debug, Clone)]
struct Watcher {
    kind: WatchKind,
    route: Route,
    targets: BTreeSet<ElementId>,
    inside: BTreeSet<ElementId>,
}

#[derive(Debug)]
enum Task {
    Run(Route),
    Deliver(Event),
}

#[derive(Debug, Default)]
pub struct Page {
    pub dom: Document,
    events: EventLoop<Task>,
    listeners: BTreeMap<ListenerId, Listener>,
    next_listener: u64,
    watchers: BTreeMap<WatcherId, Watcher>,
    next_watcher: u64,
    queued: VecDeque<Event>,
    failing_images: HashSet<String>,
    requested_images: Vec<String>,
}

impl Page {
    pub fn new(dom: Document) -> Self {
        Self {
            dom,
            ..Self::default()
        }
    }

    pub fn now(&self) -> u64 {
        self.events.now()
    }

    // ------------------------------------------------------------------
    // Listener table
    // ------------------------------------------------------------------

    pub fn add_listener(&mut self, target: Target, kind: EventKind, route: Route) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.insert(
            id,
            Listener {
                target,
                kind,
                route,
            },
        );
        id
    }

    /// Remove one registration. Returns `false` for unknown or already
    /// removed ids.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn has_listener(&self, id: ListenerId) -> bool {
        self.listeners.contains_key(&id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn listeners_on(&self, target: Target, kind: EventKind) -> usize {
        self.listeners
            .values()
            .filter(|l| l.target == target && l.kind == kind)
            .count()
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    pub fn set_timeout(&mut self, delay_ms: u64, route: Route) -> TimerId {
        self.events.set_timeout(delay_ms, Task::Run(route))
    }

    pub fn request_frame(&mut self, route: Route) -> TimerId {
        self.events.request_frame(Task::Run(route))
    }

    pub fn clear_timer(&mut self, id: TimerId) -> bool {
        self.events.clear(id)
    }

    pub fn is_timer_pending(&self, id: TimerId) -> bool {
        self.events.is_pending(id)
    }

    pub fn pending_timers(&self) -> usize {
        self.events.pending()
    }

    /// Deliver `event` after `delay_ms`, as the network or the compositor
    /// would.
    pub fn defer_event(&mut self, delay_ms: u64, event: Event) -> TimerId {
        self.events.set_timeout(delay_ms, Task::Deliver(event))
    }

    /// Queue an event for delivery on the next settle.
    pub fn queue_event(&mut self, event: Event) {
        self.queued.push_back(event);
    }

    // ------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------

    pub fn watch_intersections(
        &mut self,
        threshold: f64,
        margin: RootMargin,
        route: Route,
    ) -> WatcherId {
        self.insert_watcher(WatchKind::Intersection { threshold, margin }, route)
    }

    pub fn watch_mutations(&mut self, root: ElementId, route: Route) -> WatcherId {
        self.insert_watcher(WatchKind::Mutation { root }, route)
    }

    fn insert_watcher(&mut self, kind: WatchKind, route: Route) -> WatcherId {
        let id = WatcherId(self.next_watcher);
        self.next_watcher += 1;
        self.watchers.insert(
            id,
            Watcher {
                kind,
                route,
                targets: BTreeSet::new(),
                inside: BTreeSet::new(),
            },
        );
        id
    }

    pub fn observe(&mut self, watcher: WatcherId, el: ElementId) {
        if let Some(w) = self.watchers.get_mut(&watcher) {
            w.targets.insert(el);
        }
    }

    pub fn unobserve(&mut self, watcher: WatcherId, el: ElementId) {
        if let Some(w) = self.watchers.get_mut(&watcher) {
            w.targets.remove(&el);
            w.inside.remove(&el);
        }
    }

    pub fn is_observing(&self, watcher: WatcherId, el: ElementId) -> bool {
        self.watchers
            .get(&watcher)
            .is_some_and(|w| w.targets.contains(&el))
    }

    /// Disconnect a watcher entirely. Idempotent.
    pub fn disconnect(&mut self, watcher: WatcherId) -> bool {
        self.watchers.remove(&watcher).is_some()
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    fn intersects(&self, el: ElementId, threshold: f64, margin: RootMargin) -> bool {
        let win = &self.dom.window;
        let m = self.dom.metrics(el);
        let top = m.top - win.scroll_y;
        let bottom = top + m.offset_height;
        let root_top = -margin.top;
        let root_bottom = win.inner_height + margin.bottom;
        if m.offset_height <= 0.0 {
            return top >= root_top && top <= root_bottom;
        }
        let visible = (bottom.min(root_bottom) - top.max(root_top)).max(0.0);
        visible > 0.0 && visible / m.offset_height >= threshold
    }

    fn collect_intersections(&mut self) -> Vec<(WatcherId, ElementId, Route)> {
        let mut hits = Vec::new();
        let mut transitions = Vec::new();
        for (id, watcher) in &self.watchers {
            let WatchKind::Intersection { threshold, margin } = watcher.kind else {
                continue;
            };
            for el in &watcher.targets {
                let now_inside =
                    self.dom.is_connected(*el) && self.intersects(*el, threshold, margin);
                let was_inside = watcher.inside.contains(el);
                if now_inside != was_inside {
                    transitions.push((*id, *el, now_inside));
                }
                if now_inside && !was_inside {
                    hits.push((*id, *el, watcher.route.clone()));
                }
            }
        }
        for (id, el, inside) in transitions {
            if let Some(w) = self.watchers.get_mut(&id) {
                if inside {
                    w.inside.insert(el);
                } else {
                    w.inside.remove(&el);
                }
            }
        }
        hits
    }

    fn collect_mutations(&mut self) -> Vec<(WatcherId, ElementId, Route)> {
        let added = self.dom.take_added();
        let mut out = Vec::new();
        for el in added {
            for (id, watcher) in &self.watchers {
                if let WatchKind::Mutation { root } = watcher.kind
                    && root != el
                    && self.dom.contains(root, el)
                {
                    out.push((*id, el, watcher.route.clone()));
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Simulated browser services
    // ------------------------------------------------------------------

    /// Scroll the window; a `scroll` event follows on the next settle.
    pub fn scroll_window_to(&mut self, y: f64) {
        self.dom.window.scroll_y = y.max(0.0);
        self.queue_event(Event::new(EventKind::Scroll, Target::Window));
    }

    /// Scroll a horizontally scrollable element, clamped like a browser.
    ///
    /// `scrollend` follows immediately for instant scrolls and after
    /// [`SMOOTH_SCROLL_MS`] for smooth ones, but only when the window
    /// supports it.
    pub fn scroll_element_to(&mut self, el: ElementId, left: f64, smooth: bool) {
        let m = self.dom.metrics(el);
        let max = (m.scroll_width - m.client_width).max(0.0);
        self.dom.metrics_mut(el).scroll_left = left.clamp(0.0, max);
        self.queue_event(Event::on(EventKind::Scroll, el));
        if self.dom.window.scrollend {
            let end = Event::on(EventKind::ScrollEnd, el);
            if smooth {
                self.defer_event(SMOOTH_SCROLL_MS, end);
            } else {
                self.queue_event(end);
            }
        }
    }

    pub fn resize_window(&mut self, width: f64, height: f64) {
        self.dom.window.inner_width = width;
        self.dom.window.inner_height = height;
        self.queue_event(Event::new(EventKind::Resize, Target::Window));
    }

    /// Mark a URL as failing to load.
    pub fn fail_image(&mut self, src: &str) {
        self.failing_images.insert(src.to_string());
    }

    /// Point `img` at `src`; `load` or `error` is delivered on the next
    /// timer turn.
    pub fn load_image(&mut self, img: ElementId, src: &str) {
        self.dom.set_attribute(img, "src", src);
        self.requested_images.push(src.to_string());
        let kind = if self.failing_images.contains(src) {
            EventKind::Error
        } else {
            EventKind::Load
        };
        self.defer_event(0, Event::on(kind, img));
    }

    pub fn requested_images(&self) -> &[String] {
        &self.requested_images
    }

    // ------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------

    /// Dispatch `event` through the listener table, then settle.
    ///
    /// Returns the event so callers can inspect `default_prevented`.
    pub fn dispatch<C: Controller + ?Sized>(&mut self, ctl: &mut C, mut event: Event) -> Event {
        self.deliver(ctl, &mut event);
        self.settle(ctl);
        event
    }

    /// Dispatch a key press to the focused element (or the document).
    pub fn press_key<C: Controller + ?Sized>(&mut self, ctl: &mut C, key: &str, shift: bool) -> Event {
        let target = self
            .dom
            .active_element()
            .map_or(Target::Document, Target::Element);
        self.dispatch(ctl, Event::key_down(target, key, shift))
    }

    pub fn scroll_window<C: Controller + ?Sized>(&mut self, ctl: &mut C, y: f64) {
        self.scroll_window_to(y);
        self.settle(ctl);
    }

    pub fn resize<C: Controller + ?Sized>(&mut self, ctl: &mut C, width: f64, height: f64) {
        self.resize_window(width, height);
        self.settle(ctl);
    }

    /// Run every timer due within the next `ms` milliseconds, settling
    /// after each one.
    pub fn advance<C: Controller + ?Sized>(&mut self, ctl: &mut C, ms: u64) {
        let deadline = self.events.now() + ms;
        self.settle(ctl);
        while let Some(task) = self.events.next_due(deadline) {
            match task {
                Task::Run(route) => ctl.handle(self, &route, Signal::Timer),
                Task::Deliver(mut event) => self.deliver(ctl, &mut event),
            }
            self.settle(ctl);
        }
        self.events.advance_to(deadline);
    }

    /// Drain queued events, mutation records and intersection changes until
    /// nothing new happens.
    pub fn settle<C: Controller + ?Sized>(&mut self, ctl: &mut C) {
        for _ in 0..SETTLE_LIMIT {
            let mut busy = false;
            while let Some(mut event) = self.queued.pop_front() {
                busy = true;
                self.deliver(ctl, &mut event);
            }
            for (watcher, el, route) in self.collect_mutations() {
                busy = true;
                if self.watchers.contains_key(&watcher) {
                    ctl.handle(self, &route, Signal::Added(el));
                }
            }
            for (watcher, el, route) in self.collect_intersections() {
                busy = true;
                if self.is_observing(watcher, el) {
                    ctl.handle(self, &route, Signal::Intersecting(el));
                }
            }
            if !busy {
                return;
            }
        }
        warn!("page did not settle after {SETTLE_LIMIT} rounds");
    }

    fn propagation_path(&self, event: &Event) -> Vec<Target> {
        let mut path = vec![event.target];
        if event.kind.bubbles() {
            if let Target::Element(el) = event.target {
                path.extend(self.dom.ancestors(el).into_iter().map(Target::Element));
                path.push(Target::Document);
                path.push(Target::Window);
            } else if event.target == Target::Document {
                path.push(Target::Window);
            }
        }
        path
    }

    fn deliver<C: Controller + ?Sized>(&mut self, ctl: &mut C, event: &mut Event) {
        for current in self.propagation_path(event) {
            if event.propagation_stopped {
                break;
            }
            let matching: Vec<(ListenerId, Route)> = self
                .listeners
                .iter()
                .filter(|(_, l)| l.target == current && l.kind == event.kind)
                .map(|(id, l)| (*id, l.route.clone()))
                .collect();
            for (id, route) in matching {
                // A handler earlier in this dispatch may have removed it.
                if !self.listeners.contains_key(&id) {
                    continue;
                }
                event.current_target = current;
                ctl.handle(self, &route, Signal::Event(event));
            }
        }
    }
}
