//! # rts-site
//!
//! The interaction layer, development server and build tooling of the
//! "Return to the Source" site.
//!
//! # Architecture: Headless Page + Controllers
//!
//! The interaction layer runs against a headless page model rather than a
//! browser. A [`page::Page`] owns the element tree, a virtual clock, the
//! listener table and the observer registry. Controllers react to routed
//! signals and mutate the tree exactly as browser scripts would mutate a DOM:
//!
//! ```text
//! dispatch(event) / advance(ms)
//!         │
//!         ▼
//!   Page ── Route ──▶ InteractionManager ──▶ navigation, carousel, gallery,
//!         ◀── class / style / attribute / focus mutations ── images, forms, …
//! ```
//!
//! Listener, timer and watcher registrations store a typed [`page::Route`]
//! instead of a closure. Tearing a feature down is removing its ids, and a
//! test can assert that nothing is left behind.
//!
//! The tooling side is a plain CLI: `serve`, `build`, `convert-images`,
//! `check-links` and `gen-config`.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`dom`] | Arena element tree, metrics, window state |
//! | [`selector`] | CSS selector subset used by every controller |
//! | [`event_loop`] | Virtual clock, timers and animation frames |
//! | [`page`] | Listener table, observers, event dispatch, image network |
//! | [`util`] | Debounce/throttle state machines, validation helpers |
//! | [`animations`] | One-shot reveal-on-scroll |
//! | [`navigation`] | Header, mobile menu with focus trap, dropdowns, smooth scroll |
//! | [`carousel`] | Bounded horizontal scrolling with button state |
//! | [`gallery`] | Lightbox with a single active modal |
//! | [`images`] | WebP support detection, fallbacks, lazy loading |
//! | [`forms`] | Submit guards, contact form validation and async send |
//! | [`notify`] | Toast notifications |
//! | [`interaction`] | Top-level manager: setup order, shared effects, cleanup |
//! | [`config`] | `config.toml` loading, merging and validation |
//! | [`server`] | axum static server and team API |
//! | [`pipeline`] | CSS/JS minification, HTML rewriting, asset copy, build cache |
//! | [`imaging`] | JPEG/PNG → WebP conversion |
//! | [`links`] | Internal and external link checking |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## No Globals
//!
//! WebP support, the random source for decorative elements and every manager
//! are explicit values owned by whoever created them. Two pages never share
//! state, and tests seed their own `StdRng`.
//!
//! ## Isolated Setup Steps
//!
//! The interaction manager initialises features in a fixed order and keeps
//! going when one fails. A broken selector in the gallery config costs the
//! gallery, not the navigation; the first error is reported and the page is
//! flagged as degraded with a notification.
//!
//! ## Form Sends Race a Timeout
//!
//! A submission is one future raced against `tokio::time::timeout`. There is
//! no separate abort timer to clear, and the outcome (sent, network,
//! connection, status, timeout) is a value the form turns into UI state.
//!
//! ## Lexical Minification
//!
//! The build minifiers only drop comments and whitespace. They never rename
//! or restructure code, so the minified files behave like the sources and
//! need no source maps to debug.

pub mod animations;
pub mod carousel;
pub mod config;
pub mod dom;
pub mod event_loop;
pub mod forms;
pub mod gallery;
pub mod images;
pub mod imaging;
pub mod interaction;
pub mod links;
pub mod navigation;
pub mod notify;
pub mod output;
pub mod page;
pub mod pipeline;
pub mod selector;
pub mod server;
pub mod util;

#[cfg(test)]
pub(crate) mod test_helpers;
