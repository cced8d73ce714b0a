//! Commands built on top of the wizards.

mod deploy;

pub use deploy::{deploy_sam_application, DeployOutcome, DeployStage};
