//! Step loop shared by every wizard.

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;
use tracing::{debug, error, info};

/// What the engine should do after a step has executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome<S> {
    /// Make `S` the current step and keep going
    Advance(S),
    /// Stop the run and discard the partial response
    Cancel,
    /// Stop the run and assemble the final response
    Complete,
}

/// Terminal result of a wizard run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardOutcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> WizardOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WizardOutcome::Cancelled)
    }

    /// The completed response, or `None` for a cancelled run
    pub fn completed(self) -> Option<T> {
        match self {
            WizardOutcome::Completed(value) => Some(value),
            WizardOutcome::Cancelled => None,
        }
    }
}

/// Errors that end a wizard run abnormally
#[derive(Error, Debug)]
pub enum WizardError {
    /// A step reported completion while required fields were still unset.
    /// This is a defect in the step graph, never a user-facing condition.
    #[error("wizard completed without required fields: {}", .missing.join(", "))]
    IncompleteResponse { missing: Vec<&'static str> },

    /// A collaborator failed inside a step
    #[error(transparent)]
    Step(#[from] anyhow::Error),
}

/// A wizard: a closed set of steps and the state they build up
#[async_trait]
pub trait MultiStepWizard: Send {
    /// Step identifiers (usually a fieldless enum)
    type Step: Copy + Debug + Send;
    /// The fully populated response
    type Output: Send;

    /// Entry point of the step graph
    fn start_step(&self) -> Self::Step;

    /// Execute one step against the partial response and pick what comes next
    async fn execute(&mut self, step: Self::Step) -> anyhow::Result<StepOutcome<Self::Step>>;

    /// Assemble the final response.
    ///
    /// Returns [`WizardError::IncompleteResponse`] when a required field is unset.
    fn result(&self) -> Result<Self::Output, WizardError>;
}

/// Drive `wizard` from its start step until a step cancels or completes.
///
/// Steps run strictly one at a time. Collaborator errors raised by a step are
/// returned as [`WizardError::Step`] without retrying.
pub async fn run<W: MultiStepWizard>(
    wizard: &mut W,
) -> Result<WizardOutcome<W::Output>, WizardError> {
    let mut current = wizard.start_step();
    debug!(step = ?current, "Starting wizard");

    loop {
        match wizard.execute(current).await? {
            StepOutcome::Advance(next) => {
                debug!(from = ?current, to = ?next, "Wizard step transition");
                current = next;
            }
            StepOutcome::Cancel => {
                info!(step = ?current, "Wizard cancelled");
                return Ok(WizardOutcome::Cancelled);
            }
            StepOutcome::Complete => {
                return match wizard.result() {
                    Ok(output) => {
                        debug!(step = ?current, "Wizard complete");
                        Ok(WizardOutcome::Completed(output))
                    }
                    Err(err) => {
                        error!(
                            step = ?current,
                            %err,
                            "Wizard reached completion with an incomplete response"
                        );
                        Err(err)
                    }
                };
            }
        }
    }
}
