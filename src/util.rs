//! Small helpers shared by the controllers: rate limiting on the virtual
//! clock, a per-element timer registry, and a few pure functions.

use crate::dom::{ElementId, Window};
use crate::event_loop::TimerId;
use crate::page::{Page, Route};
use std::collections::HashMap;

/// Trailing-edge debounce: every `schedule` pushes the deadline back.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: u64,
    pending: Option<TimerId>,
}

impl Debounce {
    pub const fn new(delay: u64) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule(&mut self, page: &mut Page, route: Route) {
        self.cancel(page);
        self.pending = Some(page.set_timeout(self.delay, route));
    }

    /// Call from the routed handler when the timer fires.
    pub fn fired(&mut self) {
        self.pending = None;
    }

    pub fn cancel(&mut self, page: &mut Page) -> bool {
        self.pending.take().is_some_and(|id| page.clear_timer(id))
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Leading-edge throttle with a trailing call.
///
/// The first call (or any call more than `delay` ms after the last run) runs
/// immediately. Calls inside the window replace a single trailing timer due
/// when the window closes.
#[derive(Debug, Clone)]
pub struct Throttle {
    delay: u64,
    last_exec: Option<u64>,
    pending: Option<TimerId>,
}

impl Throttle {
    pub const fn new(delay: u64) -> Self {
        Self {
            delay,
            last_exec: None,
            pending: None,
        }
    }

    /// Returns `true` when the caller should run now. Otherwise `trailing`
    /// has been scheduled and the caller should do nothing.
    pub fn call(&mut self, page: &mut Page, trailing: Route) -> bool {
        let now = page.now();
        match self.last_exec {
            Some(last) if now - last <= self.delay => {
                if let Some(id) = self.pending.take() {
                    page.clear_timer(id);
                }
                let wait = self.delay - (now - last);
                self.pending = Some(page.set_timeout(wait, trailing));
                false
            }
            _ => {
                self.last_exec = Some(now);
                true
            }
        }
    }

    /// Call from the trailing handler.
    pub fn fired(&mut self, now: u64) {
        self.pending = None;
        self.last_exec = Some(now);
    }

    pub fn cancel(&mut self, page: &mut Page) -> bool {
        self.pending.take().is_some_and(|id| page.clear_timer(id))
    }
}

/// One pending timer per element, e.g. a form's fallback restore.
#[derive(Debug, Default)]
pub struct TimeoutRegistry {
    timers: HashMap<ElementId, TimerId>,
}

impl TimeoutRegistry {
    /// Schedule `route` for `owner`, clearing any timer it already had.
    pub fn replace(&mut self, page: &mut Page, owner: ElementId, delay: u64, route: Route) {
        self.clear(page, owner);
        let id = page.set_timeout(delay, route);
        self.timers.insert(owner, id);
    }

    pub fn clear(&mut self, page: &mut Page, owner: ElementId) -> bool {
        self.timers
            .remove(&owner)
            .is_some_and(|id| page.clear_timer(id))
    }

    /// Drop the entry for a timer that has already fired.
    pub fn forget(&mut self, owner: ElementId) {
        self.timers.remove(&owner);
    }

    pub fn clear_all(&mut self, page: &mut Page) {
        for (_, id) in self.timers.drain() {
            page.clear_timer(id);
        }
    }

    pub fn contains(&self, owner: ElementId) -> bool {
        self.timers.contains_key(&owner)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

/// Same acceptance as `/^[^\s@]+@[^\s@]+\.[^\s@]+$/`.
pub fn validate_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    // Needs a dot with at least one character on each side.
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Inner `(width, height)` of the viewport in CSS pixels.
pub fn viewport_dimensions(window: &Window) -> (f64, f64) {
    (window.inner_width, window.inner_height)
}

const MOBILE_AGENTS: [&str; 8] = [
    "android",
    "webos",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
];

/// User-agent sniffing, for effects that phones should not pay for even
/// on a wide viewport.
pub fn is_mobile_device(window: &Window) -> bool {
    let agent = window.user_agent.to_lowercase();
    MOBILE_AGENTS.iter().any(|m| agent.contains(m))
}
