//! Headless element tree.
//!
//! The interaction layer never talks to a real browser. Instead every
//! controller mutates this arena-backed tree exactly the way it would mutate a
//! live document: class toggles, attributes, inline style, focus, text. Tests
//! and the CLI drive it through [`Page`](crate::page::Page).
//!
//! ## Identity
//!
//! Elements are addressed by [`ElementId`], an index into the arena. Ids are
//! never reused: removing an element only detaches it from its parent, so an
//! id held by a controller stays valid (and reports `is_connected() == false`)
//! after the element leaves the document. This replaces the browser habit of
//! hanging ad-hoc properties off element objects: controllers keep their own
//! side tables keyed by `ElementId`.
//!
//! ## Layout
//!
//! There is no layout engine. Each element carries a [`Metrics`] record that
//! fixtures (or the embedding application) fill in; scrolling and intersection
//! math read from it.

use crate::selector::{Selector, SelectorError};
use std::collections::BTreeMap;

/// Handle to an element in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

/// Layout numbers for an element, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metrics {
    /// Top edge relative to the document (not the viewport).
    pub top: f64,
    pub offset_width: f64,
    pub offset_height: f64,
    /// Visible width of a horizontally scrollable box.
    pub client_width: f64,
    /// Full content width of a horizontally scrollable box.
    pub scroll_width: f64,
    pub scroll_left: f64,
}

/// A single element node.
#[derive(Debug, Clone)]
pub struct Element {
    tag: String,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    style: BTreeMap<String, String>,
    text: String,
    value: String,
    disabled: bool,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    pub metrics: Metrics,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            classes: Vec::new(),
            attributes: BTreeMap::new(),
            style: BTreeMap::new(),
            text: String::new(),
            value: String::new(),
            disabled: false,
            parent: None,
            children: Vec::new(),
            metrics: Metrics::default(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn style(&self, property: &str) -> Option<&str> {
        self.style.get(property).map(String::as_str)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn children(&self) -> &[ElementId] {
        &self.children
    }
}

/// Whether the document has finished parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Complete,
}

/// Viewport and user-agent capabilities.
///
/// Capabilities that a browser would feature-detect (`scrollBehavior`,
/// `onscrollend`, touch, WebP decoding) are explicit flags so tests can run
/// every branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub scroll_y: f64,
    pub inner_width: f64,
    pub inner_height: f64,
    pub smooth_scroll: bool,
    pub scrollend: bool,
    pub touch: bool,
    pub hardware_concurrency: u32,
    pub reduced_motion: bool,
    pub webp: bool,
    pub user_agent: String,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            scroll_y: 0.0,
            inner_width: 1280.0,
            inner_height: 800.0,
            smooth_scroll: true,
            scrollend: true,
            touch: false,
            hardware_concurrency: 8,
            reduced_motion: false,
            webp: true,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) rts-site/headless".to_string(),
        }
    }
}

/// The element arena plus document-level state.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Element>,
    root: ElementId,
    body: ElementId,
    pub window: Window,
    ready_state: ReadyState,
    active: Option<ElementId>,
    location_hash: Option<String>,
    added: Vec<ElementId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty `<html><body></body></html>` document in the
    /// `Complete` state.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: ElementId(0),
            body: ElementId(0),
            window: Window::default(),
            ready_state: ReadyState::Complete,
            active: None,
            location_hash: None,
            added: Vec::new(),
        };
        let root = doc.create_element("html");
        let body = doc.create_element("body");
        doc.nodes[body.0].parent = Some(root);
        doc.nodes[root.0].children.push(body);
        doc.root = root;
        doc.body = body;
        doc
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn body(&self) -> ElementId {
        self.body
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn set_ready_state(&mut self, state: ReadyState) {
        self.ready_state = state;
    }

    pub fn get(&self, id: ElementId) -> &Element {
        &self.nodes[id.0]
    }

    fn get_mut(&mut self, id: ElementId) -> &mut Element {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ------------------------------------------------------------------
    // Tree structure
    // ------------------------------------------------------------------

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> ElementId {
        let id = ElementId(self.nodes.len());
        self.nodes.push(Element::new(tag));
        id
    }

    /// Append `child` to `parent`, detaching it from any previous parent.
    ///
    /// When the parent is connected the child is recorded as an added node
    /// for mutation watchers.
    pub fn append_child(&mut self, parent: ElementId, child: ElementId) {
        self.detach(child);
        self.get_mut(child).parent = Some(parent);
        self.get_mut(parent).children.push(child);
        if self.is_connected(parent) {
            self.added.push(child);
        }
    }

    /// Detach an element (and its subtree) from the document.
    pub fn remove(&mut self, id: ElementId) {
        if id == self.root {
            return;
        }
        self.detach(id);
        if let Some(active) = self.active
            && self.contains(id, active)
        {
            self.active = None;
        }
    }

    fn detach(&mut self, id: ElementId) {
        if let Some(parent) = self.get_mut(id).parent.take() {
            self.get_mut(parent).children.retain(|c| *c != id);
        }
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.get(id).parent
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        &self.get(id).children
    }

    pub fn next_element_sibling(&self, id: ElementId) -> Option<ElementId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|c| *c == id)?;
        siblings.get(pos + 1).copied()
    }

    /// Ancestors from the direct parent up to the root.
    pub fn ancestors(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut cursor = self.parent(id);
        while let Some(p) = cursor {
            out.push(p);
            cursor = self.parent(p);
        }
        out
    }

    /// Inclusive containment, like `Node.contains`.
    pub fn contains(&self, ancestor: ElementId, node: ElementId) -> bool {
        node == ancestor || self.ancestors(node).contains(&ancestor)
    }

    pub fn is_connected(&self, id: ElementId) -> bool {
        self.contains(self.root, id)
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Drain the nodes appended to the connected tree since the last call.
    pub fn take_added(&mut self) -> Vec<ElementId> {
        std::mem::take(&mut self.added)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// All connected elements matching `selector`, in document order.
    pub fn query_all(&self, selector: &Selector) -> Vec<ElementId> {
        self.query_all_within(self.root, selector)
    }

    pub fn query(&self, selector: &Selector) -> Option<ElementId> {
        self.query_all(selector).into_iter().next()
    }

    /// Matching descendants of `scope`, excluding `scope` itself.
    pub fn query_all_within(&self, scope: ElementId, selector: &Selector) -> Vec<ElementId> {
        self.descendants(scope)
            .into_iter()
            .filter(|id| selector.matches(self, *id))
            .collect()
    }

    pub fn query_within(&self, scope: ElementId, selector: &Selector) -> Option<ElementId> {
        self.query_all_within(scope, selector).into_iter().next()
    }

    /// Parse-and-query shorthands for fixed selector strings.
    pub fn select(&self, css: &str) -> Result<Option<ElementId>, SelectorError> {
        Ok(self.query(&Selector::parse(css)?))
    }

    pub fn select_all(&self, css: &str) -> Result<Vec<ElementId>, SelectorError> {
        Ok(self.query_all(&Selector::parse(css)?))
    }

    pub fn select_within(
        &self,
        scope: ElementId,
        css: &str,
    ) -> Result<Option<ElementId>, SelectorError> {
        Ok(self.query_within(scope, &Selector::parse(css)?))
    }

    pub fn select_all_within(
        &self,
        scope: ElementId,
        css: &str,
    ) -> Result<Vec<ElementId>, SelectorError> {
        Ok(self.query_all_within(scope, &Selector::parse(css)?))
    }

    pub fn element_by_id(&self, id_attr: &str) -> Option<ElementId> {
        self.descendants(self.root)
            .into_iter()
            .find(|id| self.get(*id).attribute("id") == Some(id_attr))
    }

    // ------------------------------------------------------------------
    // Classes, attributes, style
    // ------------------------------------------------------------------

    pub fn has_class(&self, id: ElementId, class: &str) -> bool {
        self.get(id).has_class(class)
    }

    pub fn add_class(&mut self, id: ElementId, class: &str) {
        let el = self.get_mut(id);
        if !el.has_class(class) {
            el.classes.push(class.to_string());
        }
    }

    pub fn remove_class(&mut self, id: ElementId, class: &str) {
        self.get_mut(id).classes.retain(|c| c != class);
    }

    /// `classList.toggle(class, force)`.
    pub fn toggle_class(&mut self, id: ElementId, class: &str, force: bool) {
        if force {
            self.add_class(id, class);
        } else {
            self.remove_class(id, class);
        }
    }

    pub fn attribute(&self, id: ElementId, name: &str) -> Option<&str> {
        self.get(id).attribute(name)
    }

    pub fn set_attribute(&mut self, id: ElementId, name: &str, value: impl Into<String>) {
        self.get_mut(id)
            .attributes
            .insert(name.to_string(), value.into());
    }

    pub fn remove_attribute(&mut self, id: ElementId, name: &str) {
        self.get_mut(id).attributes.remove(name);
    }

    pub fn style(&self, id: ElementId, property: &str) -> Option<&str> {
        self.get(id).style(property)
    }

    /// Set an inline style property; an empty value removes it.
    pub fn set_style(&mut self, id: ElementId, property: &str, value: impl Into<String>) {
        let value = value.into();
        let style = &mut self.get_mut(id).style;
        if value.is_empty() {
            style.remove(property);
        } else {
            style.insert(property.to_string(), value);
        }
    }

    pub fn text(&self, id: ElementId) -> &str {
        self.get(id).text()
    }

    pub fn set_text(&mut self, id: ElementId, text: impl Into<String>) {
        self.get_mut(id).text = text.into();
    }

    pub fn value(&self, id: ElementId) -> &str {
        self.get(id).value()
    }

    pub fn set_value(&mut self, id: ElementId, value: impl Into<String>) {
        self.get_mut(id).value = value.into();
    }

    pub fn is_disabled(&self, id: ElementId) -> bool {
        self.get(id).is_disabled()
    }

    pub fn set_disabled(&mut self, id: ElementId, disabled: bool) {
        self.get_mut(id).disabled = disabled;
    }

    // ------------------------------------------------------------------
    // Focus, layout, location
    // ------------------------------------------------------------------

    pub fn active_element(&self) -> Option<ElementId> {
        self.active
    }

    pub fn focus(&mut self, id: ElementId) {
        if self.is_connected(id) {
            self.active = Some(id);
        }
    }

    pub fn blur(&mut self) {
        self.active = None;
    }

    pub fn metrics(&self, id: ElementId) -> Metrics {
        self.get(id).metrics
    }

    pub fn metrics_mut(&mut self, id: ElementId) -> &mut Metrics {
        &mut self.get_mut(id).metrics
    }

    /// `getBoundingClientRect().top`: document top minus the window scroll.
    pub fn bounding_top(&self, id: ElementId) -> f64 {
        self.get(id).metrics.top - self.window.scroll_y
    }

    pub fn location_hash(&self) -> Option<&str> {
        self.location_hash.as_deref()
    }

    pub fn set_location_hash(&mut self, hash: impl Into<String>) {
        self.location_hash = Some(hash.into());
    }
}
