//! Prompts and lookups the deploy wizard depends on.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::types::ParameterPromptResult;
use crate::parameters::{ParameterOverrides, TemplateParameters};
use crate::s3::BucketChoices;

/// Stack name check run on every answer; returns the error message, if any
pub type StackNameValidator = fn(&str) -> Option<String>;

/// Trait abstracting the user-facing side of the deploy wizard.
///
/// Prompts return `Ok(None)` when the user backs out. Errors are reserved for
/// failures of the front-end or of a data lookup.
#[async_trait]
pub trait SamDeployWizardContext: Send + Sync {
    /// Pick a SAM template, preselecting `initial`
    async fn prompt_for_template(&self, initial: Option<&Path>) -> Result<Option<PathBuf>>;

    /// Parameters declared by `template`
    async fn get_parameters(&self, template: &Path) -> Result<TemplateParameters>;

    /// Persisted overrides for `template`; `None` when never configured
    async fn get_overridden_parameters(
        &self,
        template: &Path,
    ) -> Result<Option<ParameterOverrides>>;

    /// Tell the user about parameter overrides.
    ///
    /// With an empty `missing_required` the prompt is optional and the user may
    /// continue with defaults. Otherwise the listed parameters must be
    /// configured before deploying.
    async fn prompt_for_parameters(
        &self,
        template: &Path,
        missing_required: &BTreeSet<String>,
    ) -> Result<ParameterPromptResult>;

    async fn prompt_for_region(&self, initial: Option<&str>) -> Result<Option<String>>;

    /// Pick a bucket from `choices`.
    ///
    /// Anything that is not one of the offered buckets (including the
    /// fallback item of [`BucketChoices::Unavailable`]) is treated as back.
    async fn prompt_for_s3_bucket(
        &self,
        region: &str,
        choices: &BucketChoices,
        initial: Option<&str>,
    ) -> Result<Option<String>>;

    /// Ask for a stack name, re-prompting until `validate` accepts the answer
    async fn prompt_for_stack_name(
        &self,
        initial: Option<&str>,
        validate: StackNameValidator,
    ) -> Result<Option<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BucketPick {
    Bucket(String),
    /// Select the fallback item shown when no bucket can be offered
    Fallback,
    Back,
}

/// Scripted deploy context for testing.
///
/// Each prompt pops the next scripted answer. An exhausted script answers
/// back (or `Cancel` for the parameter prompt), so a run always ends.
#[derive(Debug, Clone, Default)]
pub struct MockDeployContext {
    /// Every call in order, e.g. `prompt_for_region(Some("us-west-2"))`
    pub calls: Arc<Mutex<Vec<String>>>,
    /// Choices shown by each bucket prompt
    pub bucket_choices_seen: Arc<Mutex<Vec<BucketChoices>>>,
    /// Missing required names passed to each parameter prompt
    pub missing_parameters_seen: Arc<Mutex<Vec<BTreeSet<String>>>>,
    /// Messages produced by rejected stack names
    pub stack_name_errors: Arc<Mutex<Vec<String>>>,
    templates: Arc<Mutex<VecDeque<Option<PathBuf>>>>,
    parameters: Arc<Mutex<TemplateParameters>>,
    overrides: Arc<Mutex<Option<ParameterOverrides>>>,
    parameter_answers: Arc<Mutex<VecDeque<ParameterPromptResult>>>,
    regions: Arc<Mutex<VecDeque<Option<String>>>>,
    buckets: Arc<Mutex<VecDeque<BucketPick>>>,
    stack_names: Arc<Mutex<VecDeque<Option<String>>>>,
}

impl MockDeployContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next template prompt (`None` backs out)
    pub fn answer_template(self, template: Option<&str>) -> Self {
        self.templates
            .lock()
            .unwrap()
            .push_back(template.map(PathBuf::from));
        self
    }

    /// Declare a template parameter
    pub fn with_parameter(self, name: &str, required: bool) -> Self {
        self.parameters.lock().unwrap().insert(
            name.to_string(),
            crate::parameters::TemplateParameter { required },
        );
        self
    }

    /// Persisted overrides returned for every template
    pub fn with_overrides(self, overrides: &[(&str, &str)]) -> Self {
        *self.overrides.lock().unwrap() = Some(
            overrides
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        self
    }

    pub fn answer_parameters(self, answer: ParameterPromptResult) -> Self {
        self.parameter_answers.lock().unwrap().push_back(answer);
        self
    }

    pub fn answer_region(self, region: Option<&str>) -> Self {
        self.regions
            .lock()
            .unwrap()
            .push_back(region.map(str::to_string));
        self
    }

    /// Pick `bucket` at the next bucket prompt, even if it is not offered
    pub fn answer_bucket(self, bucket: &str) -> Self {
        self.buckets
            .lock()
            .unwrap()
            .push_back(BucketPick::Bucket(bucket.to_string()));
        self
    }

    /// Pick the fallback item at the next bucket prompt
    pub fn pick_bucket_fallback(self) -> Self {
        self.buckets.lock().unwrap().push_back(BucketPick::Fallback);
        self
    }

    pub fn back_from_bucket(self) -> Self {
        self.buckets.lock().unwrap().push_back(BucketPick::Back);
        self
    }

    /// Answer the next stack name prompt. Answers the validator rejects are
    /// recorded and the prompt moves on to the next scripted answer.
    pub fn answer_stack_name(self, name: Option<&str>) -> Self {
        self.stack_names
            .lock()
            .unwrap()
            .push_back(name.map(str::to_string));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Names of the prompts called, without their arguments
    pub fn prompt_names(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|call| call.starts_with("prompt_for_"))
            .map(|call| call.split('(').next().unwrap_or_default().to_string())
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SamDeployWizardContext for MockDeployContext {
    async fn prompt_for_template(&self, initial: Option<&Path>) -> Result<Option<PathBuf>> {
        self.record(format!("prompt_for_template({initial:?})"));
        Ok(self.templates.lock().unwrap().pop_front().flatten())
    }

    async fn get_parameters(&self, template: &Path) -> Result<TemplateParameters> {
        self.record(format!("get_parameters({})", template.display()));
        Ok(self.parameters.lock().unwrap().clone())
    }

    async fn get_overridden_parameters(
        &self,
        template: &Path,
    ) -> Result<Option<ParameterOverrides>> {
        self.record(format!("get_overridden_parameters({})", template.display()));
        Ok(self.overrides.lock().unwrap().clone())
    }

    async fn prompt_for_parameters(
        &self,
        template: &Path,
        missing_required: &BTreeSet<String>,
    ) -> Result<ParameterPromptResult> {
        self.record(format!("prompt_for_parameters({})", template.display()));
        self.missing_parameters_seen
            .lock()
            .unwrap()
            .push(missing_required.clone());
        Ok(self
            .parameter_answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ParameterPromptResult::Cancel))
    }

    async fn prompt_for_region(&self, initial: Option<&str>) -> Result<Option<String>> {
        self.record(format!("prompt_for_region({initial:?})"));
        Ok(self.regions.lock().unwrap().pop_front().flatten())
    }

    async fn prompt_for_s3_bucket(
        &self,
        region: &str,
        choices: &BucketChoices,
        initial: Option<&str>,
    ) -> Result<Option<String>> {
        self.record(format!("prompt_for_s3_bucket({region}, {initial:?})"));
        self.bucket_choices_seen.lock().unwrap().push(choices.clone());

        let pick = self
            .buckets
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(BucketPick::Back);
        Ok(match pick {
            BucketPick::Bucket(bucket) => Some(bucket),
            BucketPick::Fallback => match choices {
                BucketChoices::Unavailable { message, .. } => Some(message.clone()),
                BucketChoices::Available(_) => None,
            },
            BucketPick::Back => None,
        })
    }

    async fn prompt_for_stack_name(
        &self,
        initial: Option<&str>,
        validate: StackNameValidator,
    ) -> Result<Option<String>> {
        self.record(format!("prompt_for_stack_name({initial:?})"));
        loop {
            let Some(answer) = self.stack_names.lock().unwrap().pop_front() else {
                return Ok(None);
            };
            let Some(name) = answer else {
                return Ok(None);
            };
            match validate(&name) {
                Some(message) => self.stack_name_errors.lock().unwrap().push(message),
                None => return Ok(Some(name)),
            }
        }
    }
}
