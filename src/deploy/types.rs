//! Type definitions for the deploy wizard

use std::path::PathBuf;

use crate::parameters::ParameterOverrides;

/// Steps of the deploy wizard, in forward order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployStep {
    Template,
    ParameterOverrides,
    Region,
    S3Bucket,
    StackName,
}

impl DeployStep {
    pub fn label(&self) -> &'static str {
        match self {
            DeployStep::Template => "template",
            DeployStep::ParameterOverrides => "parameter overrides",
            DeployStep::Region => "region",
            DeployStep::S3Bucket => "S3 bucket",
            DeployStep::StackName => "stack name",
        }
    }
}

/// Everything needed to package and deploy a SAM application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamDeployWizardResponse {
    pub template: PathBuf,
    pub region: String,
    pub s3_bucket: String,
    pub stack_name: String,
    pub parameter_overrides: ParameterOverrides,
}

/// Answers collected so far; fields are cleared again when the user backs out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialDeployResponse {
    pub template: Option<PathBuf>,
    pub region: Option<String>,
    pub s3_bucket: Option<String>,
    pub stack_name: Option<String>,
    pub parameter_overrides: Option<ParameterOverrides>,
}

impl PartialDeployResponse {
    /// Names of the fields that are still unset
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.template.is_none() {
            missing.push("template");
        }
        if self.parameter_overrides.is_none() {
            missing.push("parameter_overrides");
        }
        if self.region.is_none() {
            missing.push("region");
        }
        if self.s3_bucket.is_none() {
            missing.push("s3_bucket");
        }
        if self.stack_name.is_none() {
            missing.push("stack_name");
        }
        missing
    }

    /// The finished response, if every field is set
    pub fn complete(&self) -> Option<SamDeployWizardResponse> {
        Some(SamDeployWizardResponse {
            template: self.template.clone()?,
            region: self.region.clone()?,
            s3_bucket: self.s3_bucket.clone()?,
            stack_name: self.stack_name.clone()?,
            parameter_overrides: self.parameter_overrides.clone()?,
        })
    }
}

/// What the user chose when asked about parameter overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterPromptResult {
    /// Deploy with the template defaults
    Continue,
    /// Stop so the overrides can be configured first
    Cancel,
}
