mod controller;
mod scheduler;
mod store;
mod validation;
mod value;


pub use controller::{
    CommandOutcome, FinishFailedFn, FinishFn, FormCallbacks, FormCommand, FormController,
    FormError, FormHandle, FormId, FormResult,
};
pub use store::{FieldNotifier, FieldPatch, FieldUpdate};
pub use validation::{FieldDescriptor, FieldRule, FieldSnapshot, RulePredicate, ValidationStatus};
pub use value::FieldValue;
