use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use sam_deploy::commands::{deploy_sam_application, DeployOutcome};
use sam_deploy::config::Config;
use sam_deploy::deploy::{validate_stack_name, SamDeployWizard};
use sam_deploy::logging;
use sam_deploy::s3::AwsCliS3Client;
use sam_deploy::sam::{
    DefaultSamCliInvoker, SamCliError, SamCliInvoker, SamCliVersion, SamCliVersionValidation,
    SystemSamCliProcessInvoker,
};
use sam_deploy::terminal::TerminalDeployContext;

/// Print a helpful error message when the SAM CLI cannot be used
fn print_sam_cli_error(err: &SamCliError) {
    eprintln!("Error: {err}");
    eprintln!();

    if matches!(err, SamCliError::NotInstalled) {
        eprintln!("The AWS SAM CLI is required to deploy applications.");
        eprintln!();
        eprintln!("Install it:");
        eprintln!("  macOS:   brew install aws-sam-cli");
        eprintln!("  pip:     pip install aws-sam-cli");
        eprintln!();
        eprintln!("Or point sam.cli_path in the config at an existing binary.");
    }
}

#[derive(Parser)]
#[command(name = "sam-deploy")]
#[command(about = "Interactively package and deploy AWS SAM applications")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick a template, region, bucket and stack name, then package and deploy
    Deploy,

    /// Show the installed SAM CLI version and whether it is supported
    Info,

    /// Check a CloudFormation stack name
    ValidateStackName {
        /// Stack name to check
        name: String,
    },

    /// Write the effective configuration to .sam-deploy/config.toml
    InitConfig {
        /// Replace an existing project config
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;

    let interactive = matches!(cli.command, Commands::Deploy);

    // Initialize logging (file-based for interactive runs, stderr otherwise)
    let logging_handle = logging::init_logging(&config, interactive, cli.debug)?;
    let log_file_path = logging_handle.log_file_path.clone();

    let result = match cli.command {
        Commands::Deploy => cmd_deploy(&config).await,
        Commands::Info => cmd_info(&config).await,
        Commands::ValidateStackName { name } => Ok(cmd_validate_stack_name(&name)),
        Commands::InitConfig { force } => cmd_init_config(&config, force),
    };

    // flush buffered log lines before reporting where they went
    drop(logging_handle);
    print_log_location(log_file_path);

    result
}

fn sam_invoker(config: &Config) -> Option<DefaultSamCliInvoker<SystemSamCliProcessInvoker>> {
    match SystemSamCliProcessInvoker::locate(config.sam.cli_path.as_deref()) {
        Ok(process) => Some(DefaultSamCliInvoker::new(process)),
        Err(err) => {
            print_sam_cli_error(&err);
            None
        }
    }
}

fn s3_client(config: &Config) -> Result<AwsCliS3Client> {
    let client = AwsCliS3Client::locate(config.aws.cli_path.as_deref())?;
    Ok(match &config.aws.default_region {
        Some(region) => client.with_region(region.clone()),
        None => client,
    })
}

async fn cmd_deploy(config: &Config) -> Result<ExitCode> {
    let Some(invoker) = sam_invoker(config) else {
        return Ok(ExitCode::FAILURE);
    };
    let s3 = s3_client(config)?;

    let context = TerminalDeployContext::stdio(config);
    let mut wizard = SamDeployWizard::new(context, Arc::new(s3), config.buckets.lookup_policy());

    let outcome = deploy_sam_application(&mut wizard, &invoker)
        .await
        .context("Deploy wizard failed")?;
    match &outcome {
        DeployOutcome::Cancelled => {
            println!("Cancelled");
        }
        DeployOutcome::Deployed { stack_name } => {
            println!("Successfully deployed SAM application to CloudFormation stack: {stack_name}");
        }
        DeployOutcome::Failed { message, .. } => {
            eprintln!("{message}");
        }
    }

    Ok(if outcome.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn cmd_info(config: &Config) -> Result<ExitCode> {
    let Some(invoker) = sam_invoker(config) else {
        return Ok(ExitCode::FAILURE);
    };

    let info = invoker.info().await?;
    let validation = SamCliVersion::validate(Some(&info.version));

    println!("SAM CLI version: {}", info.version);
    println!(
        "Supported range: >= {} and < {}",
        SamCliVersion::MINIMUM_INCLUSIVE,
        SamCliVersion::MAXIMUM_EXCLUSIVE
    );
    println!("Status:          {validation}");

    Ok(if validation == SamCliVersionValidation::Valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_validate_stack_name(name: &str) -> ExitCode {
    match validate_stack_name(name) {
        None => {
            println!("'{name}' is a valid stack name");
            ExitCode::SUCCESS
        }
        Some(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_init_config(config: &Config, force: bool) -> Result<ExitCode> {
    let path = Config::project_config_path();
    if path.exists() && !force {
        eprintln!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
        return Ok(ExitCode::FAILURE);
    }

    let written = config.save()?;
    println!("Wrote {}", written.display());
    Ok(ExitCode::SUCCESS)
}

/// Print the log file path on exit if logs were written
fn print_log_location(log_file_path: Option<PathBuf>) {
    if let Some(log_path) = log_file_path {
        if let Ok(metadata) = log_path.metadata() {
            if metadata.len() > 0 {
                eprintln!("Session log: {}", log_path.display());
            }
        }
    }
}
