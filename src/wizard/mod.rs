//! Generic multi-step wizard engine.
//!
//! A wizard is a closed set of steps (an enum) plus a handler that executes
//! one step at a time against the wizard's own partial response. The engine
//! in [`run`] drives the current-step pointer until a step reports a terminal
//! outcome.

mod engine;

pub use engine::{run, MultiStepWizard, StepOutcome, WizardError, WizardOutcome};
