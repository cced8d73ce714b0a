//! sam-deploy - interactive deployment of AWS SAM applications
//!
//! The [`wizard`] engine drives a step graph such as the [`deploy`] wizard.
//! Prompts, S3 lookups and the SAM CLI sit behind traits so the step graph
//! can be exercised with the mocks exported alongside each trait.

pub mod commands;
pub mod config;
pub mod deploy;
pub mod logging;
pub mod parameters;
pub mod s3;
pub mod sam;
pub mod terminal;
pub mod wizard;
