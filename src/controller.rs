use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::scheduler::NotifyScheduler;
use crate::store::{FieldNotifier, FieldPatch, StoreState};
use crate::validation::{FieldDescriptor, FieldSnapshot, ValidationStatus};
use crate::value::FieldValue;

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FormError {
    StatePoisoned(&'static str),
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::StatePoisoned(context) => {
                write!(f, "form state lock poisoned while {context}")
            }
        }
    }
}

impl std::error::Error for FormError {}

pub type FormResult<T> = Result<T, FormError>;

pub type FinishFn = Arc<dyn Fn(&BTreeMap<String, FieldValue>) + Send + Sync>;
pub type FinishFailedFn = Arc<dyn Fn() + Send + Sync>;

/// Terminal submit callbacks. Replaced wholesale by
/// [`FormController::set_callbacks`]; invoked only from submit.
#[derive(Clone, Default)]
pub struct FormCallbacks {
    pub on_finish: Option<FinishFn>,
    pub on_finish_failed: Option<FinishFailedFn>,
}

impl FormCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_finish(
        mut self,
        callback: impl Fn(&BTreeMap<String, FieldValue>) + Send + Sync + 'static,
    ) -> Self {
        self.on_finish = Some(Arc::new(callback));
        self
    }

    pub fn on_finish_failed(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_finish_failed = Some(Arc::new(callback));
        self
    }
}

/// The dispatch façade over the field store, validation engine, and
/// notification scheduler. One instance per form; clones share state.
#[derive(Clone)]
pub struct FormController {
    pub(crate) id: FormId,
    pub(crate) defaults: Arc<BTreeMap<String, FieldValue>>,
    pub(crate) state: Arc<RwLock<StoreState>>,
    pub(crate) scheduler: NotifyScheduler,
    pub(crate) callbacks: Arc<RwLock<FormCallbacks>>,
}

impl FormController {
    pub fn new() -> Self {
        Self::with_defaults(BTreeMap::new())
    }

    /// Creates a controller with an immutable default-values snapshot, used
    /// to seed initial values at registration and to answer reads for
    /// unregistered names.
    pub fn with_defaults(defaults: BTreeMap<String, FieldValue>) -> Self {
        Self {
            id: FormId::next(),
            defaults: Arc::new(defaults),
            state: Arc::new(RwLock::new(StoreState::default())),
            scheduler: NotifyScheduler::new(),
            callbacks: Arc::new(RwLock::new(FormCallbacks::default())),
        }
    }

    pub fn form_id(&self) -> FormId {
        self.id
    }

    pub fn set_callbacks(&self, callbacks: FormCallbacks) -> FormResult<()> {
        *write_lock(&self.callbacks, "replacing submit callbacks")? = callbacks;
        Ok(())
    }

    /// Whole-form forced validation followed by the terminal callbacks:
    /// `on_finish_failed` on failure, `on_finish` with the full values
    /// mapping on success.
    pub fn submit(&self) -> FormResult<bool> {
        self.submit_with(|_| {})
    }

    /// Like [`Self::submit`], additionally handing the aggregate result to
    /// `callback` synchronously, before either terminal callback runs.
    pub fn submit_with(&self, callback: impl FnOnce(bool)) -> FormResult<bool> {
        let passed = self.validate_fields(callback)?;
        let callbacks = read_lock(&self.callbacks, "reading submit callbacks")?.clone();
        if passed {
            if let Some(on_finish) = callbacks.on_finish {
                on_finish(&self.fields_value()?);
            }
        } else if let Some(on_finish_failed) = callbacks.on_finish_failed {
            on_finish_failed();
        }
        debug!(form = self.id.0, passed, "submit completed");
        Ok(passed)
    }

    /// Invokes the operation named by `command`. Exists so deeply nested host
    /// components can drive the form through a single channel without holding
    /// typed references to every method.
    pub fn dispatch(&self, command: FormCommand) -> FormResult<CommandOutcome> {
        match command {
            FormCommand::RegisterField {
                name,
                notifier,
                descriptor,
            } => {
                self.register_field(name, move || notifier(), descriptor)?;
                Ok(CommandOutcome::Done)
            }
            FormCommand::UnregisterField { name } => {
                self.unregister_field(&name)?;
                Ok(CommandOutcome::Done)
            }
            FormCommand::FieldValue { name } => {
                Ok(CommandOutcome::Value(self.field_value(&name)?))
            }
            FormCommand::FieldsValue => Ok(CommandOutcome::Values(self.fields_value()?)),
            FormCommand::FieldState { name } => {
                Ok(CommandOutcome::State(self.field_state(&name)?))
            }
            FormCommand::SetFieldValue { name, patch } => {
                Ok(CommandOutcome::Applied(self.set_field_value(&name, patch)?))
            }
            FormCommand::SetFields { fields } => {
                self.set_fields(fields)?;
                Ok(CommandOutcome::Done)
            }
            FormCommand::ResetFields => {
                self.reset_fields()?;
                Ok(CommandOutcome::Done)
            }
            FormCommand::ValidateField { name, force } => Ok(CommandOutcome::Status(
                self.validate_field_value(&name, force)?,
            )),
            FormCommand::ValidateFields => {
                Ok(CommandOutcome::Validity(self.validate_fields(|_| {})?))
            }
            FormCommand::Submit => Ok(CommandOutcome::Validity(self.submit()?)),
        }
    }

    /// The imperative instance surface handed to external callers: the
    /// allow-listed operation set without `dispatch`, callback replacement,
    /// or the scheduling primitives.
    pub fn handle(&self) -> FormHandle {
        FormHandle {
            controller: self.clone(),
        }
    }
}

impl Default for FormController {
    fn default() -> Self {
        Self::new()
    }
}

/// Command forms of the controller's allow-listed operations.
pub enum FormCommand {
    RegisterField {
        name: String,
        notifier: FieldNotifier,
        descriptor: FieldDescriptor,
    },
    UnregisterField {
        name: String,
    },
    FieldValue {
        name: String,
    },
    FieldsValue,
    FieldState {
        name: String,
    },
    SetFieldValue {
        name: String,
        patch: FieldPatch,
    },
    SetFields {
        fields: BTreeMap<String, FieldPatch>,
    },
    ResetFields,
    ValidateField {
        name: String,
        force: bool,
    },
    ValidateFields,
    Submit,
}

#[derive(Clone, Debug)]
pub enum CommandOutcome {
    Done,
    Applied(bool),
    Value(Option<FieldValue>),
    Values(BTreeMap<String, FieldValue>),
    State(Option<FieldSnapshot>),
    Status(Option<ValidationStatus>),
    Validity(bool),
}

/// Cloneable view of a controller restricted to its public operation set.
#[derive(Clone)]
pub struct FormHandle {
    controller: FormController,
}

impl FormHandle {
    pub fn register_field(
        &self,
        name: impl Into<String>,
        notifier: impl Fn() + Send + Sync + 'static,
        descriptor: FieldDescriptor,
    ) -> FormResult<()> {
        self.controller.register_field(name, notifier, descriptor)
    }

    pub fn unregister_field(&self, name: &str) -> FormResult<()> {
        self.controller.unregister_field(name)
    }

    pub fn field_value(&self, name: &str) -> FormResult<Option<FieldValue>> {
        self.controller.field_value(name)
    }

    pub fn fields_value(&self) -> FormResult<BTreeMap<String, FieldValue>> {
        self.controller.fields_value()
    }

    pub fn field_state(&self, name: &str) -> FormResult<Option<FieldSnapshot>> {
        self.controller.field_state(name)
    }

    pub fn set_field_value(&self, name: &str, patch: impl Into<FieldPatch>) -> FormResult<bool> {
        self.controller.set_field_value(name, patch)
    }

    pub fn set_fields(&self, fields: BTreeMap<String, FieldPatch>) -> FormResult<()> {
        self.controller.set_fields(fields)
    }

    pub fn reset_fields(&self) -> FormResult<()> {
        self.controller.reset_fields()
    }

    pub fn validate_field_value(
        &self,
        name: &str,
        force: bool,
    ) -> FormResult<Option<ValidationStatus>> {
        self.controller.validate_field_value(name, force)
    }

    pub fn validate_fields(&self, callback: impl FnOnce(bool)) -> FormResult<bool> {
        self.controller.validate_fields(callback)
    }

    pub fn submit(&self) -> FormResult<bool> {
        self.controller.submit()
    }

    pub fn submit_with(&self, callback: impl FnOnce(bool)) -> FormResult<bool> {
        self.controller.submit_with(callback)
    }
}

pub(crate) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
