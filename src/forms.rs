//! Form handling.
//!
//! Two layers share the page's forms:
//!
//! - [`FormEnhancer`] gives every form with a submit button a busy state on
//!   submit and a fallback timer that restores the button if no response
//!   ever arrives.
//! - [`ContactForm`] owns `#contact-form`: per-field validation, the
//!   submission payload, and the outcome of the async send. It runs the
//!   same fallback timer on its own button.
//!
//! Sending lives outside the page. Submissions are queued in an outbox,
//! [`send`] races a [`FormTransport`] against a timeout, and the outcome is
//! handed back through [`Forms::complete`].

use crate::config::InteractionConfig;
use crate::dom::ElementId;
use crate::notify::{NoticeKind, Notifier};
use crate::page::{Event, EventKind, ListenerId, Page, Route, Signal, Target};
use crate::selector::SelectorError;
use crate::util::{TimeoutRegistry, validate_email};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const SENDING_LABEL: &str = "Sending...";
pub const DEFAULT_SUCCESS: &str = "Message sent successfully!";
pub const INVALID_FORM: &str = "Please correct the errors in the form";

const SUBMIT_BUTTON: &str = r#"button[type="submit"]"#;
const FIELDS: &str = "input, textarea";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    Submit,
    Reset,
    Fallback(ElementId),
    FieldBlur,
    FieldInput,
    ContactSubmit,
}

fn set_busy(page: &mut Page, button: ElementId) {
    page.dom.set_text(button, SENDING_LABEL);
    page.dom.set_disabled(button, true);
    page.dom.set_attribute(button, "aria-busy", "true");
}

fn restore(page: &mut Page, button: ElementId, label: &str) {
    page.dom.set_text(button, label);
    page.dom.set_disabled(button, false);
    page.dom.set_attribute(button, "aria-busy", "false");
}

// =========================================================================
// Generic enhancement
// =========================================================================

#[derive(Debug)]
struct Enhanced {
    button: ElementId,
    label: String,
    listeners: [ListenerId; 2],
}

#[derive(Debug, Default)]
pub struct FormEnhancer {
    fallback_ms: u64,
    forms: BTreeMap<ElementId, Enhanced>,
    timeouts: TimeoutRegistry,
}

impl FormEnhancer {
    /// Enhance every `form` that has a submit button, except `skip`.
    pub fn init(
        page: &mut Page,
        fallback_ms: u64,
        skip: Option<ElementId>,
    ) -> Result<Self, SelectorError> {
        let mut enhancer = Self {
            fallback_ms,
            ..Self::default()
        };
        for form in page.dom.select_all("form")? {
            if Some(form) == skip {
                continue;
            }
            let Some(button) = page.dom.select_within(form, SUBMIT_BUTTON)? else {
                continue;
            };
            let label = page.dom.text(button).to_string();
            let listeners = [
                page.add_listener(
                    Target::Element(form),
                    EventKind::Submit,
                    Route::Forms(FormAction::Submit),
                ),
                page.add_listener(
                    Target::Element(form),
                    EventKind::Reset,
                    Route::Forms(FormAction::Reset),
                ),
            ];
            enhancer.forms.insert(
                form,
                Enhanced {
                    button,
                    label,
                    listeners,
                },
            );
        }
        Ok(enhancer)
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    pub fn pending_fallbacks(&self) -> usize {
        self.timeouts.len()
    }

    fn on_submit(&mut self, page: &mut Page, form: ElementId, event: &mut Event) {
        let Some(entry) = self.forms.get(&form) else {
            return;
        };
        if page.dom.is_disabled(entry.button) {
            event.prevent_default();
            return;
        }
        set_busy(page, entry.button);
        self.timeouts.replace(
            page,
            form,
            self.fallback_ms,
            Route::Forms(FormAction::Fallback(form)),
        );
    }

    fn restore(&self, page: &mut Page, form: ElementId) {
        if let Some(entry) = self.forms.get(&form) {
            restore(page, entry.button, &entry.label);
        }
    }

    /// A response arrived for `form`: restore now and drop the fallback.
    pub fn complete(&mut self, page: &mut Page, form: ElementId) -> bool {
        if !self.forms.contains_key(&form) {
            return false;
        }
        self.timeouts.clear(page, form);
        self.restore(page, form);
        true
    }

    pub fn destroy(&mut self, page: &mut Page) {
        self.timeouts.clear_all(page);
        for entry in std::mem::take(&mut self.forms).into_values() {
            for id in entry.listeners {
                page.remove_listener(id);
            }
        }
    }

    fn on_action(&mut self, page: &mut Page, action: FormAction, signal: Signal<'_>) {
        match (action, signal) {
            (FormAction::Submit, Signal::Event(event)) => {
                if let Target::Element(form) = event.current_target {
                    self.on_submit(page, form, event);
                }
            }
            (FormAction::Reset, Signal::Event(event)) => {
                if let Target::Element(form) = event.current_target {
                    self.timeouts.clear(page, form);
                    self.restore(page, form);
                }
            }
            (FormAction::Fallback(form), Signal::Timer) => {
                self.timeouts.forget(form);
                debug!(?form, "fallback restored submit button");
                self.restore(page, form);
            }
            _ => {}
        }
    }
}

// =========================================================================
// Contact form
// =========================================================================

/// A validated contact form ready to post.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub form: ElementId,
    /// The form's `action` attribute, empty when absent.
    pub action: String,
    /// Named fields in document order, then `timestamp` and `user_agent`.
    pub fields: Vec<(String, String)>,
}

impl Submission {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug)]
pub struct ContactForm {
    form: ElementId,
    button: Option<ElementId>,
    label: String,
    fields: Vec<ElementId>,
    listeners: Vec<ListenerId>,
    submitting: bool,
    fallback_ms: u64,
    timeouts: TimeoutRegistry,
}

impl ContactForm {
    /// Attach to the form with id `form_id`. `Ok(None)` when there is none.
    ///
    /// A submission with no outcome after `fallback_ms` gets its button back.
    pub fn init(
        page: &mut Page,
        form_id: &str,
        fallback_ms: u64,
    ) -> Result<Option<Self>, SelectorError> {
        let Some(form) = page.dom.element_by_id(form_id) else {
            warn!(form_id, "contact form not found");
            return Ok(None);
        };
        let button = page.dom.select_within(form, SUBMIT_BUTTON)?;
        let label = button
            .map(|b| page.dom.text(b).to_string())
            .unwrap_or_default();
        let fields = page.dom.select_all_within(form, FIELDS)?;

        let mut listeners = vec![page.add_listener(
            Target::Element(form),
            EventKind::Submit,
            Route::Forms(FormAction::ContactSubmit),
        )];
        for field in &fields {
            listeners.push(page.add_listener(
                Target::Element(*field),
                EventKind::Blur,
                Route::Forms(FormAction::FieldBlur),
            ));
            listeners.push(page.add_listener(
                Target::Element(*field),
                EventKind::Input,
                Route::Forms(FormAction::FieldInput),
            ));
        }
        Ok(Some(Self {
            form,
            button,
            label,
            fields,
            listeners,
            submitting: false,
            fallback_ms,
            timeouts: TimeoutRegistry::default(),
        }))
    }

    pub fn form(&self) -> ElementId {
        self.form
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Check one field and render or clear its error.
    pub fn validate_field(&self, page: &mut Page, field: ElementId) -> bool {
        let dom = &page.dom;
        let value = dom.value(field).trim();
        let name = dom
            .attribute(field, "name")
            .or_else(|| dom.attribute(field, "id"))
            .unwrap_or_default();
        let message = if dom.attribute(field, "required").is_some() && value.is_empty() {
            Some(format!("{name} is required"))
        } else if dom.attribute(field, "type") == Some("email")
            && !value.is_empty()
            && !validate_email(value)
        {
            Some("Please enter a valid email address".to_string())
        } else {
            None
        };
        let valid = message.is_none();
        set_field_error(page, field, message.as_deref());
        valid
    }

    /// Validate every field, rendering all errors, not just the first.
    pub fn validate(&self, page: &mut Page) -> bool {
        self.fields
            .iter()
            .fold(true, |ok, field| self.validate_field(page, *field) && ok)
    }

    pub fn clear_errors(&self, page: &mut Page) {
        for field in &self.fields {
            set_field_error(page, *field, None);
        }
    }

    fn payload(&self, page: &Page) -> Submission {
        let dom = &page.dom;
        let mut fields: Vec<(String, String)> = self
            .fields
            .iter()
            .filter_map(|f| {
                let name = dom.attribute(*f, "name")?;
                Some((name.to_string(), dom.value(*f).to_string()))
            })
            .collect();
        fields.push(("timestamp".into(), chrono::Utc::now().to_rfc3339()));
        fields.push(("user_agent".into(), dom.window.user_agent.clone()));
        Submission {
            form: self.form,
            action: dom.attribute(self.form, "action").unwrap_or_default().to_string(),
            fields,
        }
    }

    fn on_submit(
        &mut self,
        page: &mut Page,
        event: &mut Event,
        notifier: &mut Notifier,
    ) -> Option<Submission> {
        event.prevent_default();
        if self.submitting {
            return None;
        }
        if !self.validate(page) {
            notifier.show(page, INVALID_FORM, NoticeKind::Error);
            return None;
        }
        let submission = self.payload(page);
        self.submitting = true;
        if let Some(button) = self.button {
            set_busy(page, button);
        }
        self.timeouts.replace(
            page,
            self.form,
            self.fallback_ms,
            Route::Forms(FormAction::Fallback(self.form)),
        );
        Some(submission)
    }

    pub fn has_pending_fallback(&self) -> bool {
        self.timeouts.contains(self.form)
    }

    /// No outcome arrived in time. A late outcome still notifies.
    fn on_fallback(&mut self, page: &mut Page) {
        self.timeouts.forget(self.form);
        debug!(form = ?self.form, "fallback restored contact button");
        if let Some(button) = self.button {
            restore(page, button, &self.label);
        }
        self.submitting = false;
    }

    /// Apply the outcome of a send: notify, reset on success, and always
    /// give the button back.
    pub fn finish(&mut self, page: &mut Page, outcome: &SubmitOutcome, notifier: &mut Notifier) {
        match outcome {
            SubmitOutcome::Sent { message } => {
                notifier.show(page, message, NoticeKind::Success);
                for field in &self.fields {
                    page.dom.set_value(*field, "");
                }
                self.clear_errors(page);
                page.queue_event(Event::on(EventKind::Reset, self.form));
            }
            SubmitOutcome::Failed(err) => {
                warn!(error = %err, "form submission failed");
                notifier.show(page, err.user_message(), NoticeKind::Error);
            }
        }
        self.timeouts.clear(page, self.form);
        if let Some(button) = self.button {
            restore(page, button, &self.label);
        }
        self.submitting = false;
    }

    pub fn destroy(&mut self, page: &mut Page) {
        self.timeouts.clear_all(page);
        for id in self.listeners.drain(..) {
            page.remove_listener(id);
        }
    }
}

fn set_field_error(page: &mut Page, field: ElementId, message: Option<&str>) {
    let container = page.dom.parent(field);
    let existing = container.and_then(|p| {
        page.dom
            .children(p)
            .iter()
            .copied()
            .find(|c| page.dom.has_class(*c, "field-error"))
    });
    let dom = &mut page.dom;
    match message {
        Some(message) => {
            dom.add_class(field, "error");
            dom.set_attribute(field, "aria-invalid", "true");
            match (existing, container) {
                (Some(error), _) => dom.set_text(error, message),
                (None, Some(parent)) => {
                    let error = dom.create_element("div");
                    dom.add_class(error, "field-error");
                    dom.set_text(error, message);
                    dom.set_attribute(error, "role", "alert");
                    dom.append_child(parent, error);
                }
                (None, None) => {}
            }
        }
        None => {
            dom.remove_class(field, "error");
            dom.set_attribute(field, "aria-invalid", "false");
            if let Some(error) = existing {
                dom.remove(error);
            }
        }
    }
}

// =========================================================================
// Both layers together
// =========================================================================

#[derive(Debug, Default)]
pub struct Forms {
    enhancer: FormEnhancer,
    contact: Option<ContactForm>,
    outbox: VecDeque<Submission>,
}

impl Forms {
    pub fn init(page: &mut Page, config: &InteractionConfig) -> Result<Self, SelectorError> {
        let contact = ContactForm::init(page, &config.contact_form_id, config.form_fallback_ms)?;
        // The contact handler manages its own button.
        let skip = contact.as_ref().map(ContactForm::form);
        let enhancer = FormEnhancer::init(page, config.form_fallback_ms, skip)?;
        debug!(
            enhanced = enhancer.len(),
            contact = contact.is_some(),
            "forms ready"
        );
        Ok(Self {
            enhancer,
            contact,
            outbox: VecDeque::new(),
        })
    }

    pub fn enhancer(&self) -> &FormEnhancer {
        &self.enhancer
    }

    pub fn contact(&self) -> Option<&ContactForm> {
        self.contact.as_ref()
    }

    /// Next validated submission waiting to be sent.
    pub fn take_submission(&mut self) -> Option<Submission> {
        self.outbox.pop_front()
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }

    /// Hand back the result for `submission`.
    pub fn complete(
        &mut self,
        page: &mut Page,
        submission: &Submission,
        outcome: &SubmitOutcome,
        notifier: &mut Notifier,
    ) {
        match self.contact.as_mut() {
            Some(contact) if contact.form == submission.form => {
                contact.finish(page, outcome, notifier);
            }
            _ => {
                self.enhancer.complete(page, submission.form);
            }
        }
    }

    pub fn destroy(&mut self, page: &mut Page) {
        self.enhancer.destroy(page);
        if let Some(contact) = self.contact.as_mut() {
            contact.destroy(page);
        }
        self.contact = None;
        self.outbox.clear();
    }

    pub fn on_action(
        &mut self,
        page: &mut Page,
        action: FormAction,
        signal: Signal<'_>,
        notifier: &mut Notifier,
    ) {
        match action {
            FormAction::Fallback(form)
                if self.contact.as_ref().is_some_and(|c| c.form == form) =>
            {
                if let (Signal::Timer, Some(contact)) = (signal, self.contact.as_mut()) {
                    contact.on_fallback(page);
                }
            }
            FormAction::Submit | FormAction::Reset | FormAction::Fallback(_) => {
                self.enhancer.on_action(page, action, signal);
            }
            FormAction::ContactSubmit => {
                if let Signal::Event(event) = signal
                    && let Some(contact) = self.contact.as_mut()
                    && let Some(submission) = contact.on_submit(page, event, notifier)
                {
                    self.outbox.push_back(submission);
                }
            }
            FormAction::FieldBlur => {
                if let Signal::Event(event) = signal
                    && let Target::Element(field) = event.current_target
                    && let Some(contact) = self.contact.as_ref()
                {
                    contact.validate_field(page, field);
                }
            }
            FormAction::FieldInput => {
                if let Signal::Event(event) = signal
                    && let Target::Element(field) = event.current_target
                {
                    set_field_error(page, field, None);
                }
            }
        }
    }
}

// =========================================================================
// Sending
// =========================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitError {
    #[error("network error: {0}")]
    Network(String),
    #[error("could not connect: {0}")]
    Connection(String),
    #[error("server responded with status: {0}")]
    Status(u16),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Other(String),
}

impl SubmitError {
    /// Text shown to the visitor.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network(_) => "Network error. Please check your connection and try again.",
            Self::Connection(_) => "Unable to connect to server. Please try again later.",
            _ => "Failed to send message. Please try again.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Sent { message: String },
    Failed(SubmitError),
}

#[async_trait]
pub trait FormTransport: Send + Sync {
    async fn post(&self, submission: &Submission) -> Result<TransportResponse, SubmitError>;
}

/// Posts submissions as multipart form data over HTTP.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl ReqwestTransport {
    pub fn new(base_url: &str) -> Result<Self, SubmitError> {
        let base_url =
            reqwest::Url::parse(base_url).map_err(|e| SubmitError::Other(e.to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    /// Resolve a form's `action` against the page URL; empty or `#` posts
    /// back to the page itself.
    pub fn endpoint(&self, action: &str) -> Result<reqwest::Url, SubmitError> {
        if action.is_empty() || action == "#" {
            return Ok(self.base_url.clone());
        }
        self.base_url
            .join(action)
            .map_err(|e| SubmitError::Other(e.to_string()))
    }
}

fn classify(err: reqwest::Error) -> SubmitError {
    if err.is_connect() {
        SubmitError::Connection(err.to_string())
    } else if err.is_timeout() || err.is_request() || err.is_body() {
        SubmitError::Network(err.to_string())
    } else {
        SubmitError::Other(err.to_string())
    }
}

#[async_trait]
impl FormTransport for ReqwestTransport {
    async fn post(&self, submission: &Submission) -> Result<TransportResponse, SubmitError> {
        let url = self.endpoint(&submission.action)?;
        let form = submission
            .fields
            .iter()
            .fold(reqwest::multipart::Form::new(), |form, (k, v)| {
                form.text(k.clone(), v.clone())
            });
        let response = self
            .client
            .post(url)
            .header("X-Requested-With", "XMLHttpRequest")
            .multipart(form)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        Ok(TransportResponse { status, body })
    }
}

#[derive(Deserialize)]
struct Reply {
    message: Option<String>,
}

fn success_message(body: &str) -> String {
    serde_json::from_str::<Reply>(body)
        .ok()
        .and_then(|r| r.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_SUCCESS.to_string())
}

/// Post `submission`, giving up after `limit`.
pub async fn send(
    submission: &Submission,
    transport: &dyn FormTransport,
    limit: Duration,
) -> SubmitOutcome {
    let result = match tokio::time::timeout(limit, transport.post(submission)).await {
        Ok(result) => result,
        Err(_) => Err(SubmitError::Timeout(limit)),
    };
    match result {
        Ok(response) if (200..300).contains(&response.status) => SubmitOutcome::Sent {
            message: success_message(&response.body),
        },
        Ok(response) => SubmitOutcome::Failed(SubmitError::Status(response.status)),
        Err(err) => SubmitOutcome::Failed(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Controller;
    use crate::test_helpers::{el, find, find_all, mount, page_with};

    #[derive(Default)]
    struct Harness {
        forms: Forms,
        notes: Notifier,
    }

    impl Controller for Harness {
        fn handle(&mut self, page: &mut Page, route: &Route, signal: Signal<'_>) {
            match route {
                Route::Forms(action) => self.forms.on_action(page, *action, signal, &mut self.notes),
                Route::Notice(action) => self.notes.on_action(page, *action, signal),
                _ => {}
            }
        }
    }

    fn forms_page() -> Page {
        page_with(|page| {
            let body = page.dom.body();
            let contact = mount(
                page,
                body,
                el("form").attr("id", "contact-form").attr("action", "/contact"),
            );
            let row = mount(page, contact, el("div").class("row"));
            mount(page, row, el("input").attr("name", "name").attr("required", ""));
            let row = mount(page, contact, el("div").class("row"));
            mount(
                page,
                row,
                el("input")
                    .attr("name", "email")
                    .attr("type", "email")
                    .attr("required", ""),
            );
            let row = mount(page, contact, el("div").class("row"));
            mount(page, row, el("textarea").attr("name", "message"));
            mount(
                page,
                contact,
                el("button").attr("type", "submit").text("Send Message"),
            );

            let newsletter = mount(page, body, el("form").class("newsletter"));
            mount(page, newsletter, el("input").attr("name", "email"));
            mount(
                page,
                newsletter,
                el("button").attr("type", "submit").text("Subscribe"),
            );

            mount(page, body, el("form").class("search"));
        })
    }

    fn harness(page: &mut Page) -> Harness {
        Harness {
            forms: Forms::init(page, &InteractionConfig::default()).unwrap(),
            notes: Notifier::default(),
        }
    }

    fn fill(page: &mut Page, name: &str, value: &str) {
        let field = find(page, &format!("[name=\"{name}\"]"));
        page.dom.set_value(field, value);
    }

    #[test]
    fn enhancer_skips_contact_and_buttonless_forms() {
        let mut page = forms_page();
        let h = harness(&mut page);
        assert_eq!(h.forms.enhancer().len(), 1);
        assert!(h.forms.contact().is_some());
    }

    #[test]
    fn submit_sets_busy_state_and_fallback_restores() {
        let mut page = forms_page();
        let mut h = harness(&mut page);
        let form = find(&page, ".newsletter");
        let button = find(&page, ".newsletter button");

        let event = page.dispatch(&mut h, Event::on(EventKind::Submit, form));
        assert!(!event.default_prevented());
        assert_eq!(page.dom.text(button), SENDING_LABEL);
        assert!(page.dom.is_disabled(button));
        assert_eq!(page.dom.attribute(button, "aria-busy"), Some("true"));

        // A second submit while busy is cancelled and keeps the first timer.
        let again = page.dispatch(&mut h, Event::on(EventKind::Submit, form));
        assert!(again.default_prevented());
        assert_eq!(h.forms.enhancer().pending_fallbacks(), 1);

        page.advance(&mut h, 9_999);
        assert!(page.dom.is_disabled(button));
        page.advance(&mut h, 1);
        assert_eq!(page.dom.text(button), "Subscribe");
        assert!(!page.dom.is_disabled(button));
        assert_eq!(page.dom.attribute(button, "aria-busy"), Some("false"));
        assert_eq!(h.forms.enhancer().pending_fallbacks(), 0);
    }

    fn submit_valid_contact(page: &mut Page, h: &mut Harness) -> Submission {
        fill(page, "name", "Ada");
        fill(page, "email", "ada@example.org");
        let form = find(page, "#contact-form");
        page.dispatch(h, Event::on(EventKind::Submit, form));
        h.forms.take_submission().unwrap()
    }

    #[test]
    fn contact_button_restored_by_fallback_without_response() {
        let mut page = forms_page();
        let mut h = harness(&mut page);
        let button = find(&page, "#contact-form button");
        let _taken = submit_valid_contact(&mut page, &mut h);
        assert!(h.forms.contact().unwrap().has_pending_fallback());

        page.advance(&mut h, 9_999);
        assert!(page.dom.is_disabled(button));
        assert_eq!(page.dom.text(button), SENDING_LABEL);

        page.advance(&mut h, 1);
        assert!(!page.dom.is_disabled(button));
        assert_eq!(page.dom.text(button), "Send Message");
        assert_eq!(page.dom.attribute(button, "aria-busy"), Some("false"));
        let contact = h.forms.contact().unwrap();
        assert!(!contact.is_submitting());
        assert!(!contact.has_pending_fallback());
        assert_eq!(page.pending_timers(), 0);

        // The form takes a new submission afterwards.
        let form = find(&page, "#contact-form");
        page.dispatch(&mut h, Event::on(EventKind::Submit, form));
        assert_eq!(h.forms.outbox_len(), 1);
    }

    #[test]
    fn contact_outcome_cancels_fallback() {
        let mut page = forms_page();
        let mut h = harness(&mut page);
        let sub = submit_valid_contact(&mut page, &mut h);
        assert_eq!(page.pending_timers(), 1);

        let outcome = SubmitOutcome::Failed(SubmitError::Timeout(LIMIT));
        h.forms.complete(&mut page, &sub, &outcome, &mut h.notes);
        assert!(!h.forms.contact().unwrap().has_pending_fallback());

        // Only the notification's dismiss timer may remain.
        let button = find(&page, "#contact-form button");
        page.advance(&mut h, 10_000);
        assert!(!page.dom.is_disabled(button));
        assert!(!h.forms.contact().unwrap().is_submitting());
    }

    #[test]
    fn reset_and_complete_restore_immediately() {
        let mut page = forms_page();
        let mut h = harness(&mut page);
        let form = find(&page, ".newsletter");
        let button = find(&page, ".newsletter button");

        page.dispatch(&mut h, Event::on(EventKind::Submit, form));
        page.dispatch(&mut h, Event::on(EventKind::Reset, form));
        assert_eq!(page.dom.text(button), "Subscribe");
        assert_eq!(page.pending_timers(), 0);

        page.dispatch(&mut h, Event::on(EventKind::Submit, form));
        assert!(h.forms.enhancer.complete(&mut page, form));
        assert!(!page.dom.is_disabled(button));
        assert_eq!(page.pending_timers(), 0);
    }

    #[test]
    fn blur_validates_and_input_clears() {
        let mut page = forms_page();
        let mut h = harness(&mut page);
        let email = find(&page, "[name=\"email\"]");

        page.dom.set_value(email, "not-an-email");
        page.dispatch(&mut h, Event::on(EventKind::Blur, email));
        assert!(page.dom.has_class(email, "error"));
        assert_eq!(page.dom.attribute(email, "aria-invalid"), Some("true"));
        let error = find(&page, ".field-error");
        assert_eq!(page.dom.text(error), "Please enter a valid email address");
        assert_eq!(page.dom.attribute(error, "role"), Some("alert"));

        page.dom.set_value(email, "");
        page.dispatch(&mut h, Event::on(EventKind::Blur, email));
        assert_eq!(find_all(&page, ".field-error").len(), 1);
        assert_eq!(page.dom.text(find(&page, ".field-error")), "email is required");

        page.dispatch(&mut h, Event::on(EventKind::Input, email));
        assert!(find_all(&page, ".field-error").is_empty());
        assert_eq!(page.dom.attribute(email, "aria-invalid"), Some("false"));
    }

    #[test]
    fn invalid_submit_notifies_and_queues_nothing() {
        let mut page = forms_page();
        let mut h = harness(&mut page);
        let form = find(&page, "#contact-form");

        let event = page.dispatch(&mut h, Event::on(EventKind::Submit, form));
        assert!(event.default_prevented());
        assert_eq!(h.forms.outbox_len(), 0);
        assert_eq!(find_all(&page, ".field-error").len(), 2);
        let note = find(&page, ".notification-error");
        assert_eq!(page.dom.text(note), INVALID_FORM);
    }

    #[test]
    fn valid_submit_builds_payload() {
        let mut page = forms_page();
        let mut h = harness(&mut page);
        fill(&mut page, "name", "Ada");
        fill(&mut page, "email", "ada@example.org");
        fill(&mut page, "message", "Hello");
        let form = find(&page, "#contact-form");
        let button = find(&page, "#contact-form button");

        page.dispatch(&mut h, Event::on(EventKind::Submit, form));
        page.dispatch(&mut h, Event::on(EventKind::Submit, form));
        assert_eq!(h.forms.outbox_len(), 1, "double submit is ignored");
        assert!(page.dom.is_disabled(button));

        let sub = h.forms.take_submission().unwrap();
        assert_eq!(sub.action, "/contact");
        assert_eq!(sub.field("name"), Some("Ada"));
        assert_eq!(sub.field("message"), Some("Hello"));
        assert!(sub.field("timestamp").unwrap().contains('T'));
        assert_eq!(sub.field("user_agent"), Some(page.dom.window.user_agent.as_str()));
    }

    #[test]
    fn success_resets_and_restores() {
        let mut page = forms_page();
        let mut h = harness(&mut page);
        fill(&mut page, "name", "Ada");
        fill(&mut page, "email", "ada@example.org");
        let form = find(&page, "#contact-form");
        let button = find(&page, "#contact-form button");
        page.dispatch(&mut h, Event::on(EventKind::Submit, form));
        let sub = h.forms.take_submission().unwrap();

        let outcome = SubmitOutcome::Sent {
            message: "Thanks!".into(),
        };
        h.forms.complete(&mut page, &sub, &outcome, &mut h.notes);
        page.settle(&mut h);
        assert_eq!(page.dom.text(button), "Send Message");
        assert!(!page.dom.is_disabled(button));
        assert_eq!(page.dom.value(find(&page, "[name=\"name\"]")), "");
        assert_eq!(page.dom.text(find(&page, ".notification-success")), "Thanks!");
        assert!(!h.forms.contact().unwrap().is_submitting());
    }

    #[test]
    fn failure_notifies_classified_message() {
        let mut page = forms_page();
        let mut h = harness(&mut page);
        fill(&mut page, "name", "Ada");
        fill(&mut page, "email", "ada@example.org");
        let form = find(&page, "#contact-form");
        page.dispatch(&mut h, Event::on(EventKind::Submit, form));
        let sub = h.forms.take_submission().unwrap();

        let outcome = SubmitOutcome::Failed(SubmitError::Connection("refused".into()));
        h.forms.complete(&mut page, &sub, &outcome, &mut h.notes);
        assert_eq!(
            page.dom.text(find(&page, ".notification-error")),
            "Unable to connect to server. Please try again later."
        );
        assert_eq!(page.dom.value(find(&page, "[name=\"name\"]")), "Ada");
        assert!(!page.dom.is_disabled(find(&page, "#contact-form button")));
    }

    #[test]
    fn destroy_removes_everything() {
        let mut page = forms_page();
        let mut h = harness(&mut page);
        let form = find(&page, ".newsletter");
        page.dispatch(&mut h, Event::on(EventKind::Submit, form));
        h.forms.destroy(&mut page);
        assert_eq!(page.listener_count(), 0);
        assert_eq!(page.pending_timers(), 0);
    }

    // ---------------------------------------------------------------------
    // send()
    // ---------------------------------------------------------------------

    struct Canned(Result<TransportResponse, SubmitError>, Duration);

    #[async_trait]
    impl FormTransport for Canned {
        async fn post(&self, _: &Submission) -> Result<TransportResponse, SubmitError> {
            tokio::time::sleep(self.1).await;
            self.0.clone()
        }
    }

    fn submission() -> Submission {
        Submission {
            form: Page::default().dom.body(),
            action: String::new(),
            fields: vec![("name".into(), "Ada".into())],
        }
    }

    fn ok(status: u16, body: &str) -> Canned {
        Canned(
            Ok(TransportResponse {
                status,
                body: body.into(),
            }),
            Duration::from_millis(50),
        )
    }

    const LIMIT: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn send_uses_reply_message_or_default() {
        let outcome = send(&submission(), &ok(200, r#"{"message":"Got it"}"#), LIMIT).await;
        assert_eq!(outcome, SubmitOutcome::Sent { message: "Got it".into() });

        let outcome = send(&submission(), &ok(200, "not json"), LIMIT).await;
        assert_eq!(outcome, SubmitOutcome::Sent { message: DEFAULT_SUCCESS.into() });
    }

    #[tokio::test(start_paused = true)]
    async fn send_reports_bad_status() {
        let outcome = send(&submission(), &ok(500, "{}"), LIMIT).await;
        assert_eq!(outcome, SubmitOutcome::Failed(SubmitError::Status(500)));
    }

    #[tokio::test(start_paused = true)]
    async fn send_times_out() {
        let slow = Canned(
            Ok(TransportResponse {
                status: 200,
                body: String::new(),
            }),
            Duration::from_secs(30),
        );
        let outcome = send(&submission(), &slow, LIMIT).await;
        assert_eq!(outcome, SubmitOutcome::Failed(SubmitError::Timeout(LIMIT)));
    }

    #[test]
    fn user_messages_by_class() {
        assert!(SubmitError::Network("x".into()).user_message().starts_with("Network error"));
        assert_eq!(
            SubmitError::Timeout(LIMIT).user_message(),
            "Failed to send message. Please try again."
        );
    }

    #[test]
    fn endpoint_resolution() {
        let t = ReqwestTransport::new("http://localhost:5000/contact.html").unwrap();
        assert_eq!(t.endpoint("").unwrap().as_str(), "http://localhost:5000/contact.html");
        assert_eq!(t.endpoint("#").unwrap().as_str(), "http://localhost:5000/contact.html");
        assert_eq!(
            t.endpoint("/api/contact").unwrap().as_str(),
            "http://localhost:5000/api/contact"
        );
    }
}
