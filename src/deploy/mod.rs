//! The "deploy a SAM application" wizard.
//!
//! Steps, in forward order:
//!
//! | Step                 | Back / cancel goes to |
//! |----------------------|-----------------------|
//! | `Template`           | cancels the wizard    |
//! | `ParameterOverrides` | (see below)           |
//! | `Region`             | `Template`            |
//! | `S3Bucket`           | `Region`              |
//! | `StackName`          | `S3Bucket`            |
//!
//! `ParameterOverrides` is skipped when the template declares nothing and
//! when persisted overrides cover every required parameter. If required
//! parameters are still unset the wizard always cancels so the user can fill
//! them in and start again.

mod context;
mod types;
mod validation;


pub use context::{MockDeployContext, SamDeployWizardContext, StackNameValidator};
pub use types::{DeployStep, ParameterPromptResult, PartialDeployResponse, SamDeployWizardResponse};
pub use validation::{validate_stack_name, MAX_STACK_NAME_LENGTH};

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::parameters::{missing_required_parameters, required_parameter_names, ParameterOverrides};
use crate::s3::{BucketLookupPolicy, RegionBucketCache, S3Client};
use crate::wizard::{MultiStepWizard, StepOutcome, WizardError};

/// Collects a template, its parameter overrides, a region, an S3 bucket and
/// a stack name
pub struct SamDeployWizard<C> {
    context: C,
    s3: Arc<dyn S3Client>,
    buckets: RegionBucketCache,
    response: PartialDeployResponse,
}

impl<C: SamDeployWizardContext> SamDeployWizard<C> {
    pub fn new(context: C, s3: Arc<dyn S3Client>, policy: BucketLookupPolicy) -> Self {
        Self {
            context,
            s3,
            buckets: RegionBucketCache::new(policy),
            response: PartialDeployResponse::default(),
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    /// Give back the context, e.g. to inspect what a front-end printed
    pub fn into_context(self) -> C {
        self.context
    }

    /// Answers collected so far
    pub fn response(&self) -> &PartialDeployResponse {
        &self.response
    }

    async fn template(&mut self) -> Result<StepOutcome<DeployStep>> {
        self.response.template = self
            .context
            .prompt_for_template(self.response.template.as_deref())
            .await?;

        Ok(match self.response.template {
            Some(_) => StepOutcome::Advance(DeployStep::ParameterOverrides),
            None => StepOutcome::Cancel,
        })
    }

    #[instrument(skip(self))]
    async fn parameter_overrides(&mut self) -> Result<StepOutcome<DeployStep>> {
        let Some(template) = self.response.template.clone() else {
            bail!("Unexpected state: reached parameter overrides without a template");
        };

        let parameters = self.context.get_parameters(&template).await?;
        if parameters.is_empty() {
            debug!("Template declares no parameters");
            self.response.parameter_overrides = Some(ParameterOverrides::new());
            return Ok(StepOutcome::Advance(DeployStep::Region));
        }

        match self.context.get_overridden_parameters(&template).await? {
            None => {
                self.response.parameter_overrides = Some(ParameterOverrides::new());

                let missing = required_parameter_names(&parameters);
                let answer = self
                    .context
                    .prompt_for_parameters(&template, &missing)
                    .await?;

                if !missing.is_empty() {
                    info!(?missing, "Required parameters have no overrides");
                    return Ok(StepOutcome::Cancel);
                }
                Ok(match answer {
                    ParameterPromptResult::Continue => StepOutcome::Advance(DeployStep::Region),
                    ParameterPromptResult::Cancel => StepOutcome::Cancel,
                })
            }
            Some(overrides) => {
                let missing = missing_required_parameters(&parameters, &overrides);
                if missing.is_empty() {
                    debug!(count = overrides.len(), "Using persisted parameter overrides");
                    self.response.parameter_overrides = Some(overrides);
                    return Ok(StepOutcome::Advance(DeployStep::Region));
                }

                info!(?missing, "Persisted overrides do not cover required parameters");
                self.context
                    .prompt_for_parameters(&template, &missing)
                    .await?;
                Ok(StepOutcome::Cancel)
            }
        }
    }

    async fn region(&mut self) -> Result<StepOutcome<DeployStep>> {
        self.response.region = self
            .context
            .prompt_for_region(self.response.region.as_deref())
            .await?;

        Ok(match self.response.region {
            Some(_) => StepOutcome::Advance(DeployStep::S3Bucket),
            None => StepOutcome::Advance(DeployStep::Template),
        })
    }

    async fn s3_bucket(&mut self) -> Result<StepOutcome<DeployStep>> {
        let Some(region) = self.response.region.clone() else {
            bail!("Unexpected state: reached bucket selection without a region");
        };

        let choices = self.buckets.choices_for(&region, self.s3.as_ref()).await;
        let picked = self
            .context
            .prompt_for_s3_bucket(&region, &choices, self.response.s3_bucket.as_deref())
            .await?;

        self.response.s3_bucket = picked.filter(|bucket| choices.contains(bucket));
        Ok(match self.response.s3_bucket {
            Some(_) => StepOutcome::Advance(DeployStep::StackName),
            None => StepOutcome::Advance(DeployStep::Region),
        })
    }

    async fn stack_name(&mut self) -> Result<StepOutcome<DeployStep>> {
        let answer = self
            .context
            .prompt_for_stack_name(self.response.stack_name.as_deref(), validate_stack_name)
            .await?;

        if let Some(message) = answer.as_deref().and_then(validate_stack_name) {
            warn!(%message, "Stack name prompt returned an invalid name");
            self.response.stack_name = None;
            return Ok(StepOutcome::Advance(DeployStep::StackName));
        }

        self.response.stack_name = answer;
        Ok(match self.response.stack_name {
            Some(_) => StepOutcome::Complete,
            None => StepOutcome::Advance(DeployStep::S3Bucket),
        })
    }
}

#[async_trait]
impl<C: SamDeployWizardContext> MultiStepWizard for SamDeployWizard<C> {
    type Step = DeployStep;
    type Output = SamDeployWizardResponse;

    fn start_step(&self) -> DeployStep {
        DeployStep::Template
    }

    async fn execute(&mut self, step: DeployStep) -> Result<StepOutcome<DeployStep>> {
        match step {
            DeployStep::Template => self.template().await,
            DeployStep::ParameterOverrides => self.parameter_overrides().await,
            DeployStep::Region => self.region().await,
            DeployStep::S3Bucket => self.s3_bucket().await,
            DeployStep::StackName => self.stack_name().await,
        }
    }

    fn result(&self) -> Result<SamDeployWizardResponse, WizardError> {
        self.response
            .complete()
            .ok_or_else(|| WizardError::IncompleteResponse {
                missing: self.response.missing_fields(),
            })
    }
}
