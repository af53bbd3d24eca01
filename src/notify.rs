//! Transient toast notifications.

use crate::dom::ElementId;
use crate::event_loop::TimerId;
use crate::page::{Controller, EventKind, ListenerId, Page, Route, Signal, Target};
use std::collections::BTreeMap;
use std::fmt;

pub const NOTICE_DURATION_MS: u64 = 4000;
pub const SLIDE_OUT_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Warning,
    Info,
}

impl NoticeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Success => "#27ae60",
            Self::Error => "#e74c3c",
            Self::Warning => "#f39c12",
            Self::Info => "#3498db",
        }
    }
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeAction {
    SlideIn(ElementId),
    Expire(ElementId),
    Remove(ElementId),
    Dismiss,
}

const BASE_STYLE: [(&str, &str); 13] = [
    ("position", "fixed"),
    ("top", "20px"),
    ("right", "20px"),
    ("padding", "1rem 2rem"),
    ("border-radius", "8px"),
    ("color", "white"),
    ("font-weight", "600"),
    ("font-size", "0.9rem"),
    ("z-index", "10000"),
    ("transform", "translateX(100%)"),
    ("transition", "transform 0.3s cubic-bezier(0.4, 0, 0.2, 1)"),
    ("box-shadow", "0 4px 12px rgba(0, 0, 0, 0.15)"),
    ("max-width", "400px"),
];

#[derive(Debug)]
struct Notice {
    listener: ListenerId,
    timers: Vec<TimerId>,
}

#[derive(Debug, Default)]
pub struct Notifier {
    live: BTreeMap<ElementId, Notice>,
}

impl Notifier {
    /// Show `message`, replacing any notification with the same text.
    pub fn show(&mut self, page: &mut Page, message: &str, kind: NoticeKind) -> ElementId {
        self.show_for(page, message, kind, NOTICE_DURATION_MS)
    }

    pub fn show_for(
        &mut self,
        page: &mut Page,
        message: &str,
        kind: NoticeKind,
        duration_ms: u64,
    ) -> ElementId {
        let duplicates: Vec<ElementId> = self
            .live
            .keys()
            .copied()
            .filter(|el| page.dom.text(*el) == message)
            .collect();
        for el in duplicates {
            self.remove(page, el);
        }

        let dom = &mut page.dom;
        let el = dom.create_element("div");
        dom.add_class(el, "notification");
        dom.add_class(el, &format!("notification-{kind}"));
        dom.set_text(el, message);
        dom.set_attribute(el, "role", "alert");
        dom.set_attribute(el, "aria-live", "polite");
        for (property, value) in BASE_STYLE {
            dom.set_style(el, property, value);
        }
        dom.set_style(el, "background", kind.color());
        let body = dom.body();
        dom.append_child(body, el);

        let listener = page.add_listener(
            Target::Element(el),
            EventKind::Click,
            Route::Notice(NoticeAction::Dismiss),
        );
        let timers = vec![
            page.request_frame(Route::Notice(NoticeAction::SlideIn(el))),
            page.set_timeout(duration_ms, Route::Notice(NoticeAction::Expire(el))),
        ];
        self.live.insert(el, Notice { listener, timers });
        el
    }

    pub fn count(&self) -> usize {
        self.live.len()
    }

    fn slide_out(&mut self, page: &mut Page, el: ElementId) {
        page.dom.set_style(el, "transform", "translateX(100%)");
        if let Some(notice) = self.live.get_mut(&el) {
            let timer = page.set_timeout(SLIDE_OUT_MS, Route::Notice(NoticeAction::Remove(el)));
            notice.timers.push(timer);
        }
    }

    fn remove(&mut self, page: &mut Page, el: ElementId) {
        if let Some(notice) = self.live.remove(&el) {
            page.remove_listener(notice.listener);
            for timer in notice.timers {
                page.clear_timer(timer);
            }
        }
        page.dom.remove(el);
    }

    /// Remove every notification now.
    pub fn clear(&mut self, page: &mut Page) {
        let live: Vec<ElementId> = self.live.keys().copied().collect();
        for el in live {
            self.remove(page, el);
        }
    }

    pub fn on_action(&mut self, page: &mut Page, action: NoticeAction, signal: Signal<'_>) {
        match action {
            NoticeAction::SlideIn(el) => page.dom.set_style(el, "transform", "translateX(0)"),
            NoticeAction::Expire(el) => self.slide_out(page, el),
            NoticeAction::Remove(el) => self.remove(page, el),
            NoticeAction::Dismiss => {
                if let Signal::Event(event) = signal
                    && let Target::Element(el) = event.current_target
                {
                    self.slide_out(page, el);
                }
            }
        }
    }
}

impl Controller for Notifier {
    fn handle(&mut self, page: &mut Page, route: &Route, signal: Signal<'_>) {
        if let Route::Notice(action) = route {
            self.on_action(page, *action, signal);
        }
    }
}
