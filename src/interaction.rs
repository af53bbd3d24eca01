//! The page-level orchestrator.
//!
//! [`InteractionManager`] owns every interaction controller on a page plus
//! the small behaviors that have no controller of their own: header
//! hide-on-scroll, card hover transforms, floating hero decorations, and
//! hover dropdowns. It is also the single [`Controller`] the page drives:
//! routes are forwarded to whichever sub-controller registered them.
//!
//! Setup runs in a fixed order and each step is isolated. A failing step
//! is logged and the remaining steps still run. [`InteractionManager::cleanup`]
//! releases every watcher, timer and listener that setup created and can be
//! called any number of times.

use crate::animations::AnimationManager;
use crate::carousel::CarouselSet;
use crate::config::{CarouselConfig, GalleryConfig, InteractionConfig, SiteConfig};
use crate::dom::{ElementId, ReadyState};
use crate::event_loop::TimerId;
use crate::forms::{FormTransport, Forms, Submission, SubmitOutcome, send};
use crate::gallery::Gallery;
use crate::images::ImageSupport;
use crate::navigation::NavigationController;
use crate::notify::{NoticeKind, Notifier};
use crate::page::{Controller, Event, EventKind, ListenerId, Page, Route, Signal, Target, WatcherId};
use crate::selector::SelectorError;
use crate::util::{Debounce, is_mobile_device, viewport_dimensions};
use rand::Rng;
use rand::rngs::StdRng;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Scroll depth past which scrolling down hides the header.
pub const HEADER_HIDE_OFFSET: f64 = 100.0;
pub const DROPDOWN_CLOSE_MS: u64 = 300;
pub const MAX_FLOATING_PER_HERO: usize = 15;
pub const FLOATING_MIN_WIDTH: f64 = 768.0;
pub const FLOATING_MIN_CORES: u32 = 4;
pub const DEGRADED_NOTICE: &str = "Some interactive features may not be available";

const CARD_REST: &str = "translateY(0) scale(1) rotateY(0deg)";
const CARD_HOVER: &str = "translateY(-10px) scale(1.02) rotateY(2deg)";
const CARD_FOCUS: &str = "translateY(-5px) scale(1.01) rotateY(1deg)";

#[derive(Error, Debug)]
pub enum InteractionError {
    #[error("{step} setup failed: {source}")]
    Setup {
        step: &'static str,
        #[source]
        source: SelectorError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerAction {
    DomReady,
    HeaderScroll,
    HeaderSettled,
    CardEnter,
    CardLeave,
    CardFocus,
    CardBlur,
    DropdownEnter(usize),
    DropdownLeave(usize),
    DropdownKey(usize),
    DropdownClose(usize),
    DropdownOutsideClick,
    BeforeUnload,
}

/// Elements looked up once at setup.
#[derive(Debug, Default, Clone)]
struct ElementCache {
    header: Option<ElementId>,
    mobile_toggle: Option<ElementId>,
    nav_menu: Option<ElementId>,
    heroes: Vec<ElementId>,
    forms: Vec<ElementId>,
    cards: Vec<ElementId>,
    dropdowns: Vec<ElementId>,
}

impl ElementCache {
    fn load(page: &Page) -> Result<Self, SelectorError> {
        let dom = &page.dom;
        Ok(Self {
            header: dom.select(".site-header")?,
            mobile_toggle: dom.select(".mobile-toggle")?,
            nav_menu: dom.select(".nav-menu")?,
            heroes: dom.select_all(".hero")?,
            forms: dom.select_all("form")?,
            cards: dom.select_all(".pillar-card")?,
            dropdowns: dom.select_all(".dropdown")?,
        })
    }

    fn len(&self) -> usize {
        [self.header, self.mobile_toggle, self.nav_menu]
            .iter()
            .flatten()
            .count()
            + self.heroes.len()
            + self.forms.len()
            + self.cards.len()
            + self.dropdowns.len()
    }
}

#[derive(Debug)]
struct HoverDropdown {
    root: ElementId,
    trigger: ElementId,
    content: ElementId,
    open: bool,
    close_timer: Option<TimerId>,
}

pub struct InteractionManager {
    interaction: InteractionConfig,
    carousel_config: CarouselConfig,
    gallery_config: GalleryConfig,
    rng: StdRng,
    elements: ElementCache,
    observers: Vec<WatcherId>,
    listeners: Vec<ListenerId>,
    ready_listener: Option<ListenerId>,
    header_debounce: Debounce,
    last_scroll_top: f64,
    dropdowns: Vec<HoverDropdown>,
    floating: usize,
    navigation: Option<NavigationController>,
    animations: Option<AnimationManager>,
    carousels: Option<CarouselSet>,
    gallery: Option<Gallery>,
    images: Option<ImageSupport>,
    forms: Option<Forms>,
    notifier: Notifier,
    initialized: bool,
}

impl InteractionManager {
    pub fn new(config: &SiteConfig, rng: StdRng) -> Self {
        Self {
            interaction: config.interaction.clone(),
            carousel_config: config.carousel.clone(),
            gallery_config: config.gallery.clone(),
            rng,
            elements: ElementCache::default(),
            observers: Vec::new(),
            listeners: Vec::new(),
            ready_listener: None,
            header_debounce: Debounce::new(config.interaction.header_hide_debounce_ms),
            last_scroll_top: 0.0,
            dropdowns: Vec::new(),
            floating: 0,
            navigation: None,
            animations: None,
            carousels: None,
            gallery: None,
            images: None,
            forms: None,
            notifier: Notifier::default(),
            initialized: false,
        }
    }

    /// Set everything up now, or once `DOMContentLoaded` fires if the
    /// document is still loading.
    pub fn init(&mut self, page: &mut Page) -> Result<(), InteractionError> {
        if page.dom.ready_state() == ReadyState::Loading {
            if self.ready_listener.is_none() {
                self.ready_listener = Some(page.add_listener(
                    Target::Document,
                    EventKind::DomContentLoaded,
                    Route::Manager(ManagerAction::DomReady),
                ));
            }
            return Ok(());
        }
        self.setup_all_systems(page)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run every setup step in order. Each step is isolated; the first
    /// failure is returned after the rest have run.
    pub fn setup_all_systems(&mut self, page: &mut Page) -> Result<(), InteractionError> {
        if self.initialized {
            return Ok(());
        }
        type Step = fn(&mut InteractionManager, &mut Page) -> Result<(), SelectorError>;
        let steps: [(&'static str, Step); 10] = [
            ("element cache", Self::cache_elements),
            ("navigation", Self::setup_navigation),
            ("reveal animations", Self::setup_animations),
            ("card hover", Self::setup_card_hover),
            ("floating elements", Self::create_floating_elements),
            ("dropdowns", Self::setup_dropdowns),
            ("carousels", Self::setup_carousels),
            ("gallery", Self::setup_gallery),
            ("images", Self::setup_images),
            ("forms", Self::setup_forms),
        ];

        let mut first_error = None;
        for (step, run) in steps {
            if let Err(source) = run(self, page) {
                warn!(step, error = %source, "setup step failed");
                if first_error.is_none() {
                    first_error = Some(InteractionError::Setup { step, source });
                }
            }
        }
        self.initialized = true;
        match first_error {
            Some(err) => Err(err),
            None => {
                info!("all interaction systems initialized");
                Ok(())
            }
        }
    }

    fn setup_or_warn(&mut self, page: &mut Page) {
        if let Err(err) = self.setup_all_systems(page) {
            error!(error = %err, "interaction setup incomplete");
            self.notifier.show(page, DEGRADED_NOTICE, NoticeKind::Warning);
        }
    }

    fn listen(&mut self, page: &mut Page, target: Target, kind: EventKind, action: ManagerAction) {
        let id = page.add_listener(target, kind, Route::Manager(action));
        self.listeners.push(id);
    }

    fn cache_elements(&mut self, page: &mut Page) -> Result<(), SelectorError> {
        self.elements = ElementCache::load(page)?;
        debug!(cached = self.elements.len(), "elements cached");
        Ok(())
    }

    fn setup_navigation(&mut self, page: &mut Page) -> Result<(), SelectorError> {
        let mut navigation = NavigationController::new();
        navigation.init(page)?;
        self.navigation = Some(navigation);

        if let Some(header) = self.elements.header {
            self.last_scroll_top = page.dom.window.scroll_y;
            page.dom.set_style(header, "transition", "transform 0.3s ease-in-out");
            self.listen(page, Target::Window, EventKind::Scroll, ManagerAction::HeaderScroll);
        }
        Ok(())
    }

    fn setup_animations(&mut self, page: &mut Page) -> Result<(), SelectorError> {
        let mut animations = AnimationManager::new()?;
        animations.init(page);
        self.observers.extend(animations.watchers());
        self.animations = Some(animations);
        Ok(())
    }

    fn setup_card_hover(&mut self, page: &mut Page) -> Result<(), SelectorError> {
        let win = &page.dom.window;
        if win.touch || is_mobile_device(win) {
            return Ok(());
        }
        for card in self.elements.cards.clone() {
            set_card_transform(page, card, CARD_REST, false);
            let target = Target::Element(card);
            self.listen(page, target, EventKind::MouseEnter, ManagerAction::CardEnter);
            self.listen(page, target, EventKind::MouseLeave, ManagerAction::CardLeave);
            self.listen(page, target, EventKind::Focus, ManagerAction::CardFocus);
            self.listen(page, target, EventKind::Blur, ManagerAction::CardBlur);
        }
        Ok(())
    }

    fn create_floating_elements(&mut self, page: &mut Page) -> Result<(), SelectorError> {
        let win = &page.dom.window;
        let (width, _) = viewport_dimensions(win);
        if width < FLOATING_MIN_WIDTH
            || is_mobile_device(win)
            || win.hardware_concurrency < FLOATING_MIN_CORES
            || win.reduced_motion
        {
            return Ok(());
        }
        for hero in self.elements.heroes.clone() {
            let count = ((page.dom.metrics(hero).offset_width / 100.0).floor().max(0.0) as usize)
                .min(MAX_FLOATING_PER_HERO);
            for _ in 0..count {
                let size = self.rng.gen_range(2.0..6.0);
                let opacity = self.rng.gen_range(0.1..0.4);
                let left = self.rng.gen_range(0.0..100.0);
                let top = self.rng.gen_range(0.0..100.0);
                let delay = self.rng.gen_range(0.0..15.0);

                let dom = &mut page.dom;
                let dot = dom.create_element("div");
                dom.add_class(dot, "floating-element");
                dom.set_style(dot, "position", "absolute");
                dom.set_style(dot, "width", format!("{size}px"));
                dom.set_style(dot, "height", format!("{size}px"));
                dom.set_style(dot, "background", format!("rgba(218, 165, 32, {opacity})"));
                dom.set_style(dot, "border-radius", "50%");
                dom.set_style(dot, "left", format!("{left}%"));
                dom.set_style(dot, "top", format!("{top}%"));
                dom.set_style(dot, "animation-delay", format!("{delay}s"));
                dom.set_style(dot, "pointer-events", "none");
                dom.set_style(dot, "will-change", "transform");
                dom.append_child(hero, dot);
                self.floating += 1;
            }
        }
        Ok(())
    }

    fn setup_dropdowns(&mut self, page: &mut Page) -> Result<(), SelectorError> {
        for root in self.elements.dropdowns.clone() {
            let Some(content) = page.dom.select_within(root, ".dropdown-content")? else {
                continue;
            };
            let trigger = page
                .dom
                .select_within(root, ".dropdown-trigger")?
                .unwrap_or(root);
            let index = self.dropdowns.len();
            self.listen(
                page,
                Target::Element(root),
                EventKind::MouseEnter,
                ManagerAction::DropdownEnter(index),
            );
            self.listen(
                page,
                Target::Element(root),
                EventKind::MouseLeave,
                ManagerAction::DropdownLeave(index),
            );
            self.listen(
                page,
                Target::Element(trigger),
                EventKind::KeyDown,
                ManagerAction::DropdownKey(index),
            );
            self.dropdowns.push(HoverDropdown {
                root,
                trigger,
                content,
                open: false,
                close_timer: None,
            });
        }
        if !self.dropdowns.is_empty() {
            self.listen(
                page,
                Target::Document,
                EventKind::Click,
                ManagerAction::DropdownOutsideClick,
            );
        }
        Ok(())
    }

    fn setup_carousels(&mut self, page: &mut Page) -> Result<(), SelectorError> {
        self.carousels = Some(CarouselSet::init(page, &self.carousel_config)?);
        Ok(())
    }

    fn setup_gallery(&mut self, page: &mut Page) -> Result<(), SelectorError> {
        self.gallery = Some(Gallery::init(page, &self.gallery_config)?);
        Ok(())
    }

    fn setup_images(&mut self, page: &mut Page) -> Result<(), SelectorError> {
        let images = ImageSupport::init(page)?;
        self.observers.extend(images.watcher());
        self.images = Some(images);
        Ok(())
    }

    fn setup_forms(&mut self, page: &mut Page) -> Result<(), SelectorError> {
        self.forms = Some(Forms::init(page, &self.interaction)?);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn navigation(&self) -> Option<&NavigationController> {
        self.navigation.as_ref()
    }

    pub fn animations(&self) -> Option<&AnimationManager> {
        self.animations.as_ref()
    }

    pub fn carousels(&self) -> Option<&CarouselSet> {
        self.carousels.as_ref()
    }

    pub fn gallery(&self) -> Option<&Gallery> {
        self.gallery.as_ref()
    }

    pub fn images(&self) -> Option<&ImageSupport> {
        self.images.as_ref()
    }

    pub fn forms(&self) -> Option<&Forms> {
        self.forms.as_ref()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn observers(&self) -> &[WatcherId] {
        &self.observers
    }

    pub fn cached_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn floating_count(&self) -> usize {
        self.floating
    }

    pub fn notify(&mut self, page: &mut Page, message: &str, kind: NoticeKind) -> ElementId {
        self.notifier.show(page, message, kind)
    }

    // ------------------------------------------------------------------
    // Form submissions
    // ------------------------------------------------------------------

    pub fn take_submission(&mut self) -> Option<Submission> {
        self.forms.as_mut()?.take_submission()
    }

    /// Apply a response for `submission`.
    pub fn complete_submission(
        &mut self,
        page: &mut Page,
        submission: &Submission,
        outcome: &SubmitOutcome,
    ) {
        if let Some(forms) = self.forms.as_mut() {
            forms.complete(page, submission, outcome, &mut self.notifier);
        }
        page.settle(self);
    }

    /// Send every queued submission through `transport`, one at a time.
    /// Returns how many were sent.
    pub async fn submit_pending(&mut self, page: &mut Page, transport: &dyn FormTransport) -> usize {
        let limit = Duration::from_secs(self.interaction.submit_timeout_secs);
        let mut sent = 0;
        while let Some(submission) = self.take_submission() {
            let outcome = send(&submission, transport, limit).await;
            self.complete_submission(page, &submission, &outcome);
            sent += 1;
        }
        sent
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    fn update_header(&mut self, page: &mut Page) {
        let Some(header) = self.elements.header else {
            return;
        };
        let scroll_top = page.dom.window.scroll_y;
        let hide = scroll_top > self.last_scroll_top && scroll_top > HEADER_HIDE_OFFSET;
        let (transform, state) = if hide {
            ("translateY(-100%)", "hidden")
        } else {
            ("translateY(0)", "visible")
        };
        page.dom.set_style(header, "transform", transform);
        page.dom.set_attribute(header, "data-scrolled", state);
        self.last_scroll_top = scroll_top;
    }

    fn open_dropdown(&mut self, page: &mut Page, index: usize) {
        let Some(dropdown) = self.dropdowns.get_mut(index) else {
            return;
        };
        if let Some(timer) = dropdown.close_timer.take() {
            page.clear_timer(timer);
        }
        page.dom.set_style(dropdown.content, "display", "block");
        page.dom.set_attribute(dropdown.trigger, "aria-expanded", "true");
        page.dom.set_attribute(dropdown.content, "aria-hidden", "false");
        dropdown.open = true;
    }

    fn close_dropdown_now(&mut self, page: &mut Page, index: usize) {
        let Some(dropdown) = self.dropdowns.get_mut(index) else {
            return;
        };
        if let Some(timer) = dropdown.close_timer.take() {
            page.clear_timer(timer);
        }
        page.dom.set_style(dropdown.content, "display", "none");
        page.dom.set_attribute(dropdown.trigger, "aria-expanded", "false");
        page.dom.set_attribute(dropdown.content, "aria-hidden", "true");
        dropdown.open = false;
    }

    fn close_dropdown_later(&mut self, page: &mut Page, index: usize) {
        let Some(dropdown) = self.dropdowns.get_mut(index) else {
            return;
        };
        if let Some(timer) = dropdown.close_timer.take() {
            page.clear_timer(timer);
        }
        dropdown.close_timer = Some(page.set_timeout(
            DROPDOWN_CLOSE_MS,
            Route::Manager(ManagerAction::DropdownClose(index)),
        ));
    }

    fn dropdown_key(&mut self, page: &mut Page, index: usize, event: &mut Event) {
        let Some(open) = self.dropdowns.get(index).map(|d| d.open) else {
            return;
        };
        if event.key_is("Enter") || event.key_is(" ") {
            event.prevent_default();
            if open {
                self.close_dropdown_now(page, index);
            } else {
                self.open_dropdown(page, index);
            }
        } else if event.key_is("Escape") && open {
            self.close_dropdown_now(page, index);
            let trigger = self.dropdowns[index].trigger;
            page.dom.focus(trigger);
        }
    }

    fn outside_click(&mut self, page: &mut Page, event: &Event) {
        let target = event.target_element();
        let to_close: Vec<usize> = self
            .dropdowns
            .iter()
            .enumerate()
            .filter(|(_, d)| d.open && !target.is_some_and(|t| page.dom.contains(d.root, t)))
            .map(|(i, _)| i)
            .collect();
        for index in to_close {
            self.close_dropdown_now(page, index);
        }
    }

    pub fn is_dropdown_open(&self, index: usize) -> bool {
        self.dropdowns.get(index).is_some_and(|d| d.open)
    }

    pub fn on_action(&mut self, page: &mut Page, action: ManagerAction, signal: Signal<'_>) {
        let card = match &signal {
            Signal::Event(event) => match event.current_target {
                Target::Element(el) => Some(el),
                _ => None,
            },
            _ => None,
        };
        match action {
            ManagerAction::DomReady => {
                if let Some(id) = self.ready_listener.take() {
                    page.remove_listener(id);
                }
                self.setup_or_warn(page);
            }
            ManagerAction::HeaderScroll => self
                .header_debounce
                .schedule(page, Route::Manager(ManagerAction::HeaderSettled)),
            ManagerAction::HeaderSettled => {
                self.header_debounce.fired();
                self.update_header(page);
            }
            ManagerAction::CardEnter => {
                if let Some(card) = card {
                    set_card_transform(page, card, CARD_HOVER, true);
                }
            }
            ManagerAction::CardFocus => {
                if let Some(card) = card {
                    set_card_transform(page, card, CARD_FOCUS, true);
                }
            }
            ManagerAction::CardLeave | ManagerAction::CardBlur => {
                if let Some(card) = card {
                    set_card_transform(page, card, CARD_REST, true);
                }
            }
            ManagerAction::DropdownEnter(index) => self.open_dropdown(page, index),
            ManagerAction::DropdownLeave(index) => self.close_dropdown_later(page, index),
            ManagerAction::DropdownClose(index) => {
                if let Some(dropdown) = self.dropdowns.get_mut(index) {
                    dropdown.close_timer = None;
                }
                self.close_dropdown_now(page, index);
            }
            ManagerAction::DropdownKey(index) => {
                if let Signal::Event(event) = signal {
                    self.dropdown_key(page, index, event);
                }
            }
            ManagerAction::DropdownOutsideClick => {
                if let Signal::Event(event) = signal {
                    self.outside_click(page, event);
                }
            }
            ManagerAction::BeforeUnload => self.cleanup(page),
        }
    }

    /// Release everything setup created: watchers, timers, listeners and
    /// every sub-controller. Safe to call repeatedly.
    pub fn cleanup(&mut self, page: &mut Page) {
        for watcher in self.observers.drain(..) {
            page.disconnect(watcher);
        }
        self.header_debounce.cancel(page);
        for dropdown in self.dropdowns.drain(..) {
            if let Some(timer) = dropdown.close_timer {
                page.clear_timer(timer);
            }
        }
        for id in self.listeners.drain(..).chain(self.ready_listener.take()) {
            page.remove_listener(id);
        }
        if let Some(mut navigation) = self.navigation.take() {
            navigation.destroy(page);
        }
        if let Some(mut animations) = self.animations.take() {
            animations.disconnect(page);
        }
        if let Some(mut carousels) = self.carousels.take() {
            carousels.destroy_all(page);
        }
        if let Some(mut gallery) = self.gallery.take() {
            gallery.destroy(page);
        }
        if let Some(mut images) = self.images.take() {
            images.disconnect(page);
        }
        if let Some(mut forms) = self.forms.take() {
            forms.destroy(page);
        }
        self.notifier.clear(page);
        self.elements = ElementCache::default();
        if self.initialized {
            info!("interaction cleanup completed");
        }
        self.initialized = false;
    }
}

fn set_card_transform(page: &mut Page, card: ElementId, transform: &str, apply: bool) {
    page.dom.set_style(card, "--hover-transform", transform);
    if apply {
        page.dom.set_style(card, "transform", "var(--hover-transform)");
    }
}

impl Controller for InteractionManager {
    fn handle(&mut self, page: &mut Page, route: &Route, signal: Signal<'_>) {
        match route {
            Route::Nav(action) => {
                if let Some(navigation) = self.navigation.as_mut() {
                    navigation.on_action(page, action, signal);
                }
            }
            Route::Carousel(index, action) => {
                if let Some(carousels) = self.carousels.as_mut() {
                    carousels.on_action(page, *index, *action, signal);
                }
            }
            Route::Gallery(action) => {
                if let Some(gallery) = self.gallery.as_mut() {
                    gallery.on_action(page, *action, signal);
                }
            }
            Route::Reveal(action) => {
                if let Some(animations) = self.animations.as_mut() {
                    animations.on_action(page, *action, signal);
                }
            }
            Route::Images(action) => {
                if let Some(images) = self.images.as_mut() {
                    images.on_action(page, *action, signal);
                }
            }
            Route::Forms(action) => {
                if let Some(forms) = self.forms.as_mut() {
                    forms.on_action(page, *action, signal, &mut self.notifier);
                }
            }
            Route::Notice(action) => self.notifier.on_action(page, *action, signal),
            Route::Manager(action) => self.on_action(page, *action, signal),
        }
    }
}

/// Build and start the manager for `page`.
///
/// Setup failures never escape: they are logged and the visitor gets a
/// warning notification. `beforeunload` on the window triggers cleanup.
pub fn initialize_app(page: &mut Page, config: &SiteConfig, rng: StdRng) -> InteractionManager {
    info!("initializing interactions");
    let mut manager = InteractionManager::new(config, rng);
    if let Err(err) = manager.init(page) {
        error!(error = %err, "failed to initialize app");
        manager.notifier.show(page, DEGRADED_NOTICE, NoticeKind::Warning);
    }
    manager.listen(page, Target::Window, EventKind::BeforeUnload, ManagerAction::BeforeUnload);
    page.settle(&mut manager);
    manager
}
