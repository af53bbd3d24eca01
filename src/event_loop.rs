//! Virtual clock with cancelable timers.
//!
//! Stands in for `setTimeout` / `clearTimeout` / `requestAnimationFrame`.
//! Time only moves when the owner asks it to, which makes every debounce,
//! throttle and fallback window in the interaction layer exactly testable.
//!
//! Animation frames are timers due one frame ([`FRAME_MS`]) after they are
//! requested; the callback reads [`EventLoop::now`] the way a browser frame
//! callback reads its timestamp.

use std::collections::{BTreeMap, HashMap};

/// Length of one animation frame in milliseconds.
pub const FRAME_MS: u64 = 16;

/// Handle to a pending timer or animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
pub struct EventLoop<T> {
    now: u64,
    next_id: u64,
    queue: BTreeMap<(u64, u64), T>,
    due: HashMap<TimerId, u64>,
}

impl<T> Default for EventLoop<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventLoop<T> {
    pub fn new() -> Self {
        Self {
            now: 0,
            next_id: 0,
            queue: BTreeMap::new(),
            due: HashMap::new(),
        }
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedule `task` to run `delay_ms` from now.
    ///
    /// Timers due at the same instant run in scheduling order.
    pub fn set_timeout(&mut self, delay_ms: u64, task: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let due = self.now + delay_ms;
        self.queue.insert((due, id.0), task);
        self.due.insert(id, due);
        id
    }

    pub fn request_frame(&mut self, task: T) -> TimerId {
        self.set_timeout(FRAME_MS, task)
    }

    /// Cancel a pending timer. Returns `false` if it already ran or was
    /// cancelled.
    pub fn clear(&mut self, id: TimerId) -> bool {
        match self.due.remove(&id) {
            Some(due) => self.queue.remove(&(due, id.0)).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.due.contains_key(&id)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Pop the earliest timer due at or before `deadline`, moving the clock
    /// to its due time.
    pub fn next_due(&mut self, deadline: u64) -> Option<T> {
        let (&(due, raw), _) = self.queue.first_key_value()?;
        if due > deadline {
            return None;
        }
        let task = self.queue.remove(&(due, raw))?;
        self.due.remove(&TimerId(raw));
        self.now = self.now.max(due);
        Some(task)
    }

    /// Move the clock forward to `deadline` without running anything.
    pub fn advance_to(&mut self, deadline: u64) {
        self.now = self.now.max(deadline);
    }
}
