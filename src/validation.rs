use std::fmt::{Display, Formatter};
use std::sync::Arc;

use regex::Regex;
use tracing::trace;

use crate::controller::{FormController, FormResult, read_lock, write_lock};
use crate::store::FieldModel;
use crate::value::{FieldValue, is_blank};

/// Per-field validation outcome. Fields start out `Pending` and cycle between
/// `Resolve` and `Reject` for their entire registered lifetime.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationStatus {
    Pending,
    Resolve,
    Reject,
}

impl Display for ValidationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Resolve => f.write_str("resolve"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

pub type RulePredicate = Arc<dyn Fn(Option<&FieldValue>) -> bool + Send + Sync>;

/// Pass/fail rule for a single field: either a regex tested against text
/// values, or an arbitrary predicate over the raw value.
#[derive(Clone)]
pub enum FieldRule {
    Pattern(Regex),
    Predicate(RulePredicate),
}

impl FieldRule {
    pub fn pattern(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }

    pub fn predicate(predicate: impl Fn(Option<&FieldValue>) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(predicate))
    }

    /// Normalization target for fields registered without a rule.
    pub(crate) fn always_pass() -> Self {
        Self::Predicate(Arc::new(|_| true))
    }
}

impl std::fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pattern(pattern) => f.debug_tuple("Pattern").field(&pattern.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Validation configuration supplied when a field registers. Absent `rule`
/// and `message` are normalized (always-pass predicate, empty message) before
/// the field model is stored.
#[derive(Clone, Debug, Default)]
pub struct FieldDescriptor {
    pub value: Option<FieldValue>,
    pub rule: Option<FieldRule>,
    pub required: bool,
    pub message: Option<String>,
}

impl FieldDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, value: impl Into<FieldValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Read-only copy of a registered field's state, for hosts rendering the
/// value and failure message.
#[derive(Clone, Debug)]
pub struct FieldSnapshot {
    pub value: Option<FieldValue>,
    pub status: ValidationStatus,
    pub required: bool,
    pub message: String,
}

/// Derives a field's status from its rule and value.
///
/// Required-ness dominates: a required field with a blank value rejects before
/// the rule is consulted. A pattern rule only ever resolves against a text
/// value, and an empty string is tested against the pattern rather than
/// short-circuited.
pub(crate) fn evaluate(model: &FieldModel) -> ValidationStatus {
    if model.required && is_blank(model.value.as_ref()) {
        return ValidationStatus::Reject;
    }
    match &model.rule {
        FieldRule::Pattern(pattern) => {
            let matches = model
                .value
                .as_ref()
                .and_then(FieldValue::as_text)
                .is_some_and(|text| pattern.is_match(text));
            if matches {
                ValidationStatus::Resolve
            } else {
                ValidationStatus::Reject
            }
        }
        FieldRule::Predicate(predicate) => {
            if predicate(model.value.as_ref()) {
                ValidationStatus::Resolve
            } else {
                ValidationStatus::Reject
            }
        }
    }
}

impl FormController {
    /// Evaluates one field and commits the computed status.
    ///
    /// Returns `None` for unregistered names. A status change, or `force`,
    /// queues a notification for the field; either way a flush request is
    /// raised so the host knows a drain is due.
    pub fn validate_field_value(
        &self,
        name: &str,
        force: bool,
    ) -> FormResult<Option<ValidationStatus>> {
        let (previous, status) = {
            let mut state = write_lock(&self.state, "validating field")?;
            let Some(model) = state.model.get_mut(name) else {
                return Ok(None);
            };
            let previous = model.status;
            let status = evaluate(model);
            model.status = status;
            (previous, status)
        };

        if previous != status {
            trace!(form = self.id.0, field = name, %previous, %status, "validation status changed");
        }
        if previous != status || force {
            self.scheduler.enqueue(name)?;
        }
        self.scheduler.request_flush()?;
        Ok(Some(status))
    }

    /// Forced validation of every registered field, ANDing the outcomes.
    /// `callback` runs synchronously once the loop finishes; the queued
    /// notifications stay pending until the next flush.
    pub fn validate_fields(&self, callback: impl FnOnce(bool)) -> FormResult<bool> {
        let names = {
            let state = read_lock(&self.state, "listing fields for validation")?;
            state.model.keys().cloned().collect::<Vec<_>>()
        };

        let mut all_resolved = true;
        for name in &names {
            if self.validate_field_value(name, true)? == Some(ValidationStatus::Reject) {
                all_resolved = false;
            }
        }
        callback(all_resolved);
        Ok(all_resolved)
    }
}
