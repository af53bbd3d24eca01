//! Image lightbox for `.gallery img`.
//!
//! At most one lightbox is open at a time. Each open builds fresh markup and
//! records the ids of the listeners it added; close removes exactly those ids
//! and discards the markup.

use crate::config::GalleryConfig;
use crate::dom::ElementId;
use crate::page::{Controller, Event, EventKind, ListenerId, Page, Route, Signal, Target};
use crate::selector::SelectorError;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryAction {
    ItemClick,
    ItemKey,
    Backdrop,
    CloseButton,
    KeyDown,
}

/// The open lightbox and the listeners that belong to it.
#[derive(Debug, Clone)]
pub struct ActiveLightbox {
    pub root: ElementId,
    pub close_button: ElementId,
    pub image: ElementId,
    listeners: Vec<ListenerId>,
}

impl ActiveLightbox {
    pub fn listeners(&self) -> &[ListenerId] {
        &self.listeners
    }
}

#[derive(Debug, Default)]
pub struct Gallery {
    config: GalleryConfig,
    items: BTreeMap<ElementId, [ListenerId; 2]>,
    active: Option<ActiveLightbox>,
}

impl Gallery {
    pub fn init(page: &mut Page, config: &GalleryConfig) -> Result<Self, SelectorError> {
        let mut gallery = Self {
            config: config.clone(),
            ..Self::default()
        };
        gallery.register_items(page)?;
        Ok(gallery)
    }

    /// Attach handlers to matching images that do not have them yet.
    /// Returns how many were added.
    pub fn register_items(&mut self, page: &mut Page) -> Result<usize, SelectorError> {
        let mut added = 0;
        for img in page.dom.select_all(&self.config.selector)? {
            if self.items.contains_key(&img) {
                continue;
            }
            let dom = &mut page.dom;
            dom.set_style(img, "cursor", "zoom-in");
            dom.set_attribute(img, "tabindex", "0");
            dom.set_attribute(img, "role", "button");
            dom.set_attribute(img, "aria-label", "Enlarge image");
            let click = page.add_listener(
                Target::Element(img),
                EventKind::Click,
                Route::Gallery(GalleryAction::ItemClick),
            );
            let key = page.add_listener(
                Target::Element(img),
                EventKind::KeyDown,
                Route::Gallery(GalleryAction::ItemKey),
            );
            self.items.insert(img, [click, key]);
            added += 1;
        }
        Ok(added)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&ActiveLightbox> {
        self.active.as_ref()
    }

    /// Open the lightbox on `src`. No-op (returns `false`) while one is open.
    pub fn open(&mut self, page: &mut Page, src: &str, alt: &str) -> bool {
        if self.active.is_some() {
            return false;
        }
        let class = self.config.lightbox_class.as_str();
        let dom = &mut page.dom;

        let root = dom.create_element("div");
        dom.add_class(root, class);
        dom.set_attribute(root, "role", "dialog");
        dom.set_attribute(root, "aria-modal", "true");
        dom.set_attribute(root, "aria-label", "Image preview");

        let close_button = dom.create_element("button");
        dom.add_class(close_button, &format!("{class}__close"));
        dom.set_attribute(close_button, "aria-label", "Close dialog");
        dom.set_text(close_button, "\u{00d7}");
        dom.append_child(root, close_button);

        let content = dom.create_element("div");
        dom.add_class(content, &format!("{class}__content"));
        let image = dom.create_element("img");
        dom.set_attribute(image, "src", src);
        dom.set_attribute(image, "alt", alt);
        dom.set_attribute(image, "loading", "eager");
        dom.append_child(content, image);
        dom.append_child(root, content);

        let body = dom.body();
        dom.append_child(body, root);
        dom.set_style(body, "overflow", "hidden");
        dom.focus(close_button);

        let mut listeners = vec![
            page.add_listener(
                Target::Element(root),
                EventKind::Click,
                Route::Gallery(GalleryAction::Backdrop),
            ),
            page.add_listener(
                Target::Element(close_button),
                EventKind::Click,
                Route::Gallery(GalleryAction::CloseButton),
            ),
        ];
        if self.config.close_on_esc {
            listeners.push(page.add_listener(
                Target::Document,
                EventKind::KeyDown,
                Route::Gallery(GalleryAction::KeyDown),
            ));
        }

        debug!(src, "lightbox opened");
        self.active = Some(ActiveLightbox {
            root,
            close_button,
            image,
            listeners,
        });
        true
    }

    /// Close the open lightbox. Returns `false` when nothing was open.
    pub fn close(&mut self, page: &mut Page) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        for id in active.listeners {
            page.remove_listener(id);
        }
        let body = page.dom.body();
        page.dom.set_style(body, "overflow", "");
        page.dom.remove(active.root);
        true
    }

    /// Close any open lightbox and drop every item handler.
    pub fn destroy(&mut self, page: &mut Page) {
        self.close(page);
        for [click, key] in std::mem::take(&mut self.items).into_values() {
            page.remove_listener(click);
            page.remove_listener(key);
        }
    }

    fn open_item(&mut self, page: &mut Page, img: ElementId) {
        let src = page.dom.attribute(img, "src").unwrap_or_default().to_string();
        let alt = page.dom.attribute(img, "alt").unwrap_or_default().to_string();
        self.open(page, &src, &alt);
    }

    pub fn on_action(&mut self, page: &mut Page, action: GalleryAction, signal: Signal<'_>) {
        let Signal::Event(event) = signal else {
            return;
        };
        match action {
            GalleryAction::ItemClick => {
                if let Target::Element(img) = event.current_target {
                    self.open_item(page, img);
                }
            }
            GalleryAction::ItemKey => {
                if (event.key_is("Enter") || event.key_is(" "))
                    && let Target::Element(img) = event.current_target
                {
                    event.prevent_default();
                    self.open_item(page, img);
                }
            }
            GalleryAction::Backdrop => {
                let on_backdrop = self
                    .active
                    .as_ref()
                    .is_some_and(|a| event.target == Target::Element(a.root));
                if self.config.close_on_backdrop && on_backdrop {
                    self.close(page);
                }
            }
            GalleryAction::CloseButton => {
                self.close(page);
            }
            GalleryAction::KeyDown => self.on_key(page, event),
        }
    }

    fn on_key(&mut self, page: &mut Page, event: &Event) {
        if self.config.close_on_esc && event.key_is("Escape") {
            self.close(page);
        }
    }
}

impl Controller for Gallery {
    fn handle(&mut self, page: &mut Page, route: &Route, signal: Signal<'_>) {
        if let Route::Gallery(action) = route {
            self.on_action(page, *action, signal);
        }
    }
}
