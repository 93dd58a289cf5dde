use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::controller::{FormController, FormResult, read_lock, write_lock};
use crate::validation::{FieldDescriptor, FieldRule, FieldSnapshot, ValidationStatus};
use crate::value::FieldValue;

/// Host callback invoked during a flush to signal "re-read this field".
/// Carries no payload; the host re-derives display state from the store.
pub type FieldNotifier = Arc<dyn Fn() + Send + Sync>;

/// State of one registered field. Created from a normalized descriptor on
/// registration, removed on unregistration, overwritten on re-registration.
pub(crate) struct FieldModel {
    pub(crate) value: Option<FieldValue>,
    pub(crate) rule: FieldRule,
    pub(crate) required: bool,
    pub(crate) message: String,
    pub(crate) status: ValidationStatus,
}

impl FieldModel {
    fn from_descriptor(descriptor: FieldDescriptor) -> Self {
        Self {
            value: descriptor.value,
            rule: descriptor.rule.unwrap_or_else(FieldRule::always_pass),
            required: descriptor.required,
            message: descriptor.message.unwrap_or_default(),
            status: ValidationStatus::Pending,
        }
    }
}

/// Field models and their notifiers, keyed by field name. The two maps hold
/// exactly the same keys; registration and unregistration touch both.
#[derive(Default)]
pub(crate) struct StoreState {
    pub(crate) model: BTreeMap<String, FieldModel>,
    pub(crate) control: BTreeMap<String, FieldNotifier>,
}

/// Selective update applied to an already-registered field. A present `rule`
/// and a non-empty `message` overwrite; `value` always replaces, including
/// with `None`.
#[derive(Clone, Debug, Default)]
pub struct FieldUpdate {
    pub value: Option<FieldValue>,
    pub rule: Option<FieldRule>,
    pub message: Option<String>,
}

impl FieldUpdate {
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

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Argument to [`FormController::set_field_value`]. A bare value resets the
/// field to `Pending` and schedules a notification, deferring validation to
/// the field's own trigger wiring; an update additionally runs a forced
/// revalidation immediately. The asymmetry is deliberate.
#[derive(Clone, Debug)]
pub enum FieldPatch {
    Value(FieldValue),
    Update(FieldUpdate),
}

impl From<FieldValue> for FieldPatch {
    fn from(value: FieldValue) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for FieldPatch {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<String> for FieldPatch {
    fn from(value: String) -> Self {
        Self::Value(value.into())
    }
}

impl From<FieldUpdate> for FieldPatch {
    fn from(update: FieldUpdate) -> Self {
        Self::Update(update)
    }
}

impl FormController {
    /// Registers a field under `name`. A default-values entry for the name
    /// overrides the descriptor's initial value. Re-registering overwrites
    /// the previous model and notifier without merging.
    pub fn register_field(
        &self,
        name: impl Into<String>,
        notifier: impl Fn() + Send + Sync + 'static,
        descriptor: FieldDescriptor,
    ) -> FormResult<()> {
        let name = name.into();
        let mut descriptor = descriptor;
        if let Some(default) = self.defaults.get(&name) {
            descriptor.value = Some(default.clone());
        }
        let model = FieldModel::from_descriptor(descriptor);

        debug!(form = self.id.0, field = %name, "registering field");
        let mut state = write_lock(&self.state, "registering field")?;
        state.model.insert(name.clone(), model);
        state.control.insert(name, Arc::new(notifier));
        Ok(())
    }

    /// Removes the field's model and notifier. Subsequent reads fall back to
    /// the defaults map, then `None`; a notification already queued for the
    /// name becomes a no-op at flush time.
    pub fn unregister_field(&self, name: &str) -> FormResult<()> {
        debug!(form = self.id.0, field = name, "unregistering field");
        let mut state = write_lock(&self.state, "unregistering field")?;
        state.model.remove(name);
        state.control.remove(name);
        Ok(())
    }

    /// Registered fields report their value with `None` coalesced to empty
    /// text; unregistered names fall back to the defaults map.
    pub fn field_value(&self, name: &str) -> FormResult<Option<FieldValue>> {
        let state = read_lock(&self.state, "reading field value")?;
        match state.model.get(name) {
            Some(model) => Ok(Some(coalesce(model.value.clone()))),
            None => Ok(self.defaults.get(name).cloned()),
        }
    }

    /// Current value of every registered field. Defaults for unregistered
    /// names are not included.
    pub fn fields_value(&self) -> FormResult<BTreeMap<String, FieldValue>> {
        let state = read_lock(&self.state, "reading all field values")?;
        Ok(state
            .model
            .iter()
            .map(|(name, model)| (name.clone(), coalesce(model.value.clone())))
            .collect())
    }

    /// Read-only copy of one field's model, or `None` if unregistered.
    pub fn field_state(&self, name: &str) -> FormResult<Option<FieldSnapshot>> {
        let state = read_lock(&self.state, "reading field state")?;
        Ok(state.model.get(name).map(|model| FieldSnapshot {
            value: model.value.clone(),
            status: model.status,
            required: model.required,
            message: model.message.clone(),
        }))
    }

    /// Applies a patch to a registered field; returns `false` (and does
    /// nothing) for unregistered names.
    pub fn set_field_value(&self, name: &str, patch: impl Into<FieldPatch>) -> FormResult<bool> {
        match patch.into() {
            FieldPatch::Value(value) => self.set_value_clear_status(name, Some(value)),
            FieldPatch::Update(update) => {
                {
                    let mut state = write_lock(&self.state, "updating field descriptor")?;
                    let Some(model) = state.model.get_mut(name) else {
                        return Ok(false);
                    };
                    if let Some(message) = update.message {
                        if !message.is_empty() {
                            model.message = message;
                        }
                    }
                    if let Some(rule) = update.rule {
                        model.rule = rule;
                    }
                    model.value = update.value;
                    model.status = ValidationStatus::Pending;
                }
                // A changed rule or message must be re-checked right away.
                let _ = self.validate_field_value(name, true)?;
                Ok(true)
            }
        }
    }

    /// Applies [`Self::set_field_value`] per entry, in map order. Individual
    /// sets cannot fail, so there is nothing to roll back.
    pub fn set_fields(&self, fields: BTreeMap<String, FieldPatch>) -> FormResult<()> {
        for (name, patch) in fields {
            let _ = self.set_field_value(&name, patch)?;
        }
        Ok(())
    }

    /// Clears every registered field to empty text and `Pending`, scheduling
    /// a notification per field. Rule, required flag, and message survive.
    pub fn reset_fields(&self) -> FormResult<()> {
        let names = {
            let state = read_lock(&self.state, "listing fields for reset")?;
            state.model.keys().cloned().collect::<Vec<_>>()
        };
        for name in names {
            let _ = self.set_value_clear_status(&name, None)?;
        }
        Ok(())
    }

    pub(crate) fn set_value_clear_status(
        &self,
        name: &str,
        value: Option<FieldValue>,
    ) -> FormResult<bool> {
        {
            let mut state = write_lock(&self.state, "writing field value")?;
            let Some(model) = state.model.get_mut(name) else {
                return Ok(false);
            };
            model.value = Some(value.unwrap_or_else(|| FieldValue::text("")));
            model.status = ValidationStatus::Pending;
        }
        self.scheduler.enqueue(name)?;
        self.scheduler.request_flush()?;
        Ok(true)
    }
}

fn coalesce(value: Option<FieldValue>) -> FieldValue {
    value.unwrap_or_else(|| FieldValue::text(""))
}
