//! Package and deploy a SAM application chosen through the deploy wizard.

use anyhow::{Context, Result};
use std::fmt;
use tracing::{error, info, instrument};

use crate::deploy::SamDeployWizardResponse;
use crate::sam::{SamCliInvoker, SamDeployArgs, SamPackageArgs};
use crate::wizard::{run, MultiStepWizard, WizardOutcome};

/// Name of the packaged template inside the staging directory
const PACKAGED_TEMPLATE_NAME: &str = "template.yaml";

/// Phase of a deployment, used in failure messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStage {
    Packaging,
    Deploying,
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployStage::Packaging => f.write_str("packaging"),
            DeployStage::Deploying => f.write_str("deploying"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The user backed out of the wizard
    Cancelled,
    Deployed { stack_name: String },
    Failed { stage: DeployStage, message: String },
}

impl DeployOutcome {
    /// Whether the process should exit unsuccessfully
    pub fn is_failure(&self) -> bool {
        matches!(self, DeployOutcome::Failed { .. })
    }

    fn failed(stage: DeployStage, err: impl fmt::Display) -> Self {
        DeployOutcome::Failed {
            stage,
            message: format!("Failed to deploy SAM application. Error while {stage}: {err}"),
        }
    }
}

/// Run `wizard`, then package and deploy what the user picked.
///
/// SAM CLI failures are reported as [`DeployOutcome::Failed`]. Errors from
/// the wizard itself are returned as errors.
pub async fn deploy_sam_application<W>(
    wizard: &mut W,
    invoker: &dyn SamCliInvoker,
) -> Result<DeployOutcome>
where
    W: MultiStepWizard<Output = SamDeployWizardResponse>,
{
    let response = match run(wizard).await? {
        WizardOutcome::Completed(response) => response,
        WizardOutcome::Cancelled => return Ok(DeployOutcome::Cancelled),
    };

    // removed when dropped, on every return path
    let staging = tempfile::Builder::new()
        .prefix("samDeploy")
        .tempdir()
        .context("Failed to create staging directory")?;

    Ok(package_and_deploy(&response, staging.path(), invoker).await)
}

#[instrument(skip_all, fields(stack = %response.stack_name, region = %response.region))]
async fn package_and_deploy(
    response: &SamDeployWizardResponse,
    staging: &std::path::Path,
    invoker: &dyn SamCliInvoker,
) -> DeployOutcome {
    let packaged_template = staging.join(PACKAGED_TEMPLATE_NAME);

    info!(
        template = %response.template.display(),
        bucket = %response.s3_bucket,
        "Packaging SAM application"
    );
    let package = SamPackageArgs {
        template_file: response.template.clone(),
        output_template_file: packaged_template.clone(),
        s3_bucket: response.s3_bucket.clone(),
        region: response.region.clone(),
    };
    if let Err(err) = invoker.package(&package).await {
        error!(%err, "Packaging failed");
        return DeployOutcome::failed(DeployStage::Packaging, err);
    }

    info!("Deploying SAM application");
    let deploy = SamDeployArgs {
        template_file: packaged_template,
        stack_name: response.stack_name.clone(),
        region: response.region.clone(),
        parameter_overrides: response.parameter_overrides.clone(),
    };
    if let Err(err) = invoker.deploy(&deploy).await {
        error!(%err, "Deployment failed");
        return DeployOutcome::failed(DeployStage::Deploying, err);
    }

    info!("Deployed SAM application");
    DeployOutcome::Deployed {
        stack_name: response.stack_name.clone(),
    }
}
