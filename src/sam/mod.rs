//! SAM CLI integration.
//!
//! [`DefaultSamCliInvoker`] turns typed requests into `sam` command lines and
//! checks the results. Process execution sits behind [`SamCliProcessInvoker`]
//! so the argument building can be tested without the binary installed.

mod process;
mod version;

pub use process::{ProcessResult, SamCliProcessInvoker, SystemSamCliProcessInvoker};
pub use version::{PreRelease, SamCliVersion, SamCliVersionValidation};

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info};

use crate::parameters::ParameterOverrides;

/// Errors from SAM CLI invocations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SamCliError {
    #[error("sam {command} encountered an error: {message}")]
    CommandFailed {
        command: &'static str,
        message: String,
    },

    #[error("template path does not exist: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("event path does not exist: {}", .0.display())]
    EventNotFound(PathBuf),

    #[error("template resource name is missing or empty")]
    MissingResourceName,

    #[error("SAM CLI did not return expected data")]
    UnexpectedOutput,

    #[error("SAM CLI not found in PATH")]
    NotInstalled,
}

/// Output of `sam --info`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SamCliInfo {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamDeployArgs {
    pub template_file: PathBuf,
    pub stack_name: String,
    pub region: String,
    pub parameter_overrides: ParameterOverrides,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamPackageArgs {
    pub template_file: PathBuf,
    pub output_template_file: PathBuf,
    pub s3_bucket: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamInitArgs {
    pub name: String,
    pub runtime: String,
    /// Directory the project is created in
    pub location: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamLocalInvokeArgs {
    pub resource_name: String,
    pub template_path: PathBuf,
    pub event_path: PathBuf,
    pub env_vars_path: PathBuf,
    pub debug_port: Option<u16>,
}

/// Trait abstracting SAM CLI operations for testability
#[async_trait]
pub trait SamCliInvoker: Send + Sync {
    async fn build(
        &self,
        build_dir: &Path,
        base_dir: &Path,
        template: &Path,
    ) -> Result<(), SamCliError>;

    async fn deploy(&self, args: &SamDeployArgs) -> Result<(), SamCliError>;

    async fn info(&self) -> Result<SamCliInfo, SamCliError>;

    async fn init(&self, args: &SamInitArgs) -> Result<(), SamCliError>;

    async fn local_invoke(&self, args: &SamLocalInvokeArgs) -> Result<(), SamCliError>;

    async fn package(&self, args: &SamPackageArgs) -> Result<(), SamCliError>;
}

/// [`SamCliInvoker`] backed by a [`SamCliProcessInvoker`]
pub struct DefaultSamCliInvoker<P> {
    process: P,
}

impl<P: SamCliProcessInvoker> DefaultSamCliInvoker<P> {
    pub fn new(process: P) -> Self {
        Self { process }
    }

    async fn invoke(
        &self,
        command: &'static str,
        args: Vec<String>,
        cwd: Option<&Path>,
    ) -> Result<ProcessResult, SamCliError> {
        let result = self.process.invoke(&args, cwd).await;
        validate_process_result(command, &result)?;
        Ok(result)
    }
}

fn validate_process_result(
    command: &'static str,
    result: &ProcessResult,
) -> Result<(), SamCliError> {
    if result.succeeded() {
        return Ok(());
    }

    error!(
        command,
        exit_code = result.exit_code,
        error = ?result.error,
        stderr = %result.stderr,
        stdout = %result.stdout,
        "SAM CLI command failed"
    );

    let message = match &result.error {
        Some(err) => err.clone(),
        None if !result.stderr.trim().is_empty() => result.stderr.trim().to_string(),
        None => result.stdout.trim().to_string(),
    };
    Err(SamCliError::CommandFailed { command, message })
}

async fn ensure_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[async_trait]
impl<P: SamCliProcessInvoker> SamCliInvoker for DefaultSamCliInvoker<P> {
    async fn build(
        &self,
        build_dir: &Path,
        base_dir: &Path,
        template: &Path,
    ) -> Result<(), SamCliError> {
        if !ensure_exists(template).await {
            return Err(SamCliError::TemplateNotFound(template.to_path_buf()));
        }

        let args = vec![
            "build".to_string(),
            "--build-dir".to_string(),
            path_arg(build_dir),
            "--base-dir".to_string(),
            path_arg(base_dir),
            "--template".to_string(),
            path_arg(template),
        ];
        self.invoke("build", args, None).await?;
        Ok(())
    }

    async fn deploy(&self, args: &SamDeployArgs) -> Result<(), SamCliError> {
        let mut command = vec![
            "deploy".to_string(),
            "--template-file".to_string(),
            path_arg(&args.template_file),
            "--stack-name".to_string(),
            args.stack_name.clone(),
            "--capabilities".to_string(),
            "CAPABILITY_IAM".to_string(),
            "--region".to_string(),
            args.region.clone(),
        ];
        if !args.parameter_overrides.is_empty() {
            command.push("--parameter-overrides".to_string());
            command.extend(
                args.parameter_overrides
                    .iter()
                    .map(|(name, value)| format!("{name}={value}")),
            );
        }

        info!(stack = %args.stack_name, region = %args.region, "Deploying stack");
        self.invoke("deploy", command, None).await?;
        Ok(())
    }

    async fn info(&self) -> Result<SamCliInfo, SamCliError> {
        let result = self.invoke("info", vec!["--info".to_string()], None).await?;
        serde_json::from_str(&result.stdout).map_err(|_| SamCliError::UnexpectedOutput)
    }

    async fn init(&self, args: &SamInitArgs) -> Result<(), SamCliError> {
        let command = vec![
            "init".to_string(),
            "--name".to_string(),
            args.name.clone(),
            "--runtime".to_string(),
            args.runtime.clone(),
        ];
        self.invoke("init", command, Some(&args.location)).await?;
        Ok(())
    }

    async fn local_invoke(&self, args: &SamLocalInvokeArgs) -> Result<(), SamCliError> {
        if args.resource_name.trim().is_empty() {
            return Err(SamCliError::MissingResourceName);
        }
        if !ensure_exists(&args.template_path).await {
            return Err(SamCliError::TemplateNotFound(args.template_path.clone()));
        }
        if !ensure_exists(&args.event_path).await {
            return Err(SamCliError::EventNotFound(args.event_path.clone()));
        }

        let mut command = vec![
            "local".to_string(),
            "invoke".to_string(),
            args.resource_name.clone(),
            "--template".to_string(),
            path_arg(&args.template_path),
            "--event".to_string(),
            path_arg(&args.event_path),
            "--env-vars".to_string(),
            path_arg(&args.env_vars_path),
        ];
        if let Some(port) = args.debug_port {
            command.push("-d".to_string());
            command.push(port.to_string());
        }
        self.invoke("local_invoke", command, None).await?;
        Ok(())
    }

    async fn package(&self, args: &SamPackageArgs) -> Result<(), SamCliError> {
        let command = vec![
            "package".to_string(),
            "--template-file".to_string(),
            path_arg(&args.template_file),
            "--s3-bucket".to_string(),
            args.s3_bucket.clone(),
            "--output-template-file".to_string(),
            path_arg(&args.output_template_file),
            "--region".to_string(),
            args.region.clone(),
        ];
        self.invoke("package", command, None).await?;
        Ok(())
    }
}

/// Mock SAM CLI invoker for testing
#[derive(Debug, Clone, Default)]
pub struct MockSamCliInvoker {
    /// Commands run so far, e.g. `"package"`, `"deploy"`
    pub calls: Arc<Mutex<Vec<String>>>,
    pub package_requests: Arc<Mutex<Vec<SamPackageArgs>>>,
    pub deploy_requests: Arc<Mutex<Vec<SamDeployArgs>>>,
    failures: Arc<Mutex<Vec<(&'static str, String)>>>,
    version: Arc<Mutex<Option<String>>>,
}

impl MockSamCliInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `command` fail with `message`
    pub fn fail(self, command: &'static str, message: impl Into<String>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .push((command, message.into()));
        self
    }

    /// Version reported by `info`
    pub fn with_version(self, version: impl Into<String>) -> Self {
        *self.version.lock().unwrap() = Some(version.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, command: &'static str) -> Result<(), SamCliError> {
        self.calls.lock().unwrap().push(command.to_string());
        let failures = self.failures.lock().unwrap();
        match failures.iter().find(|(failed, _)| *failed == command) {
            Some((_, message)) => Err(SamCliError::CommandFailed {
                command,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SamCliInvoker for MockSamCliInvoker {
    async fn build(&self, _: &Path, _: &Path, _: &Path) -> Result<(), SamCliError> {
        self.record("build")
    }

    async fn deploy(&self, args: &SamDeployArgs) -> Result<(), SamCliError> {
        self.deploy_requests.lock().unwrap().push(args.clone());
        self.record("deploy")
    }

    async fn info(&self) -> Result<SamCliInfo, SamCliError> {
        self.record("info")?;
        self.version
            .lock()
            .unwrap()
            .clone()
            .map(|version| SamCliInfo { version })
            .ok_or(SamCliError::UnexpectedOutput)
    }

    async fn init(&self, _: &SamInitArgs) -> Result<(), SamCliError> {
        self.record("init")
    }

    async fn local_invoke(&self, _: &SamLocalInvokeArgs) -> Result<(), SamCliError> {
        self.record("local_invoke")
    }

    async fn package(&self, args: &SamPackageArgs) -> Result<(), SamCliError> {
        self.package_requests.lock().unwrap().push(args.clone());
        self.record("package")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Process invoker that records arguments and replays a fixed result
    #[derive(Default)]
    struct RecordingProcessInvoker {
        result: ProcessResult,
        invocations: Mutex<Vec<(Vec<String>, Option<PathBuf>)>>,
    }

    impl RecordingProcessInvoker {
        fn returning(result: ProcessResult) -> Self {
            Self {
                result,
                invocations: Mutex::new(Vec::new()),
            }
        }

        fn last_args(&self) -> Vec<String> {
            self.invocations.lock().unwrap().last().unwrap().0.clone()
        }
    }

    #[async_trait]
    impl SamCliProcessInvoker for RecordingProcessInvoker {
        async fn invoke(&self, args: &[String], cwd: Option<&Path>) -> ProcessResult {
            self.invocations
                .lock()
                .unwrap()
                .push((args.to_vec(), cwd.map(Path::to_path_buf)));
            self.result.clone()
        }
    }

    fn deploy_args(overrides: &[(&str, &str)]) -> SamDeployArgs {
        SamDeployArgs {
            template_file: PathBuf::from("/tmp/packaged/template.yaml"),
            stack_name: "my-stack".to_string(),
            region: "us-west-2".to_string(),
            parameter_overrides: overrides
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_deploy_arguments() {
        let invoker = DefaultSamCliInvoker::new(RecordingProcessInvoker::default());

        invoker.deploy(&deploy_args(&[])).await.unwrap();

        assert_eq!(
            invoker.process.last_args(),
            vec![
                "deploy",
                "--template-file",
                "/tmp/packaged/template.yaml",
                "--stack-name",
                "my-stack",
                "--capabilities",
                "CAPABILITY_IAM",
                "--region",
                "us-west-2",
            ]
        );
    }

    #[tokio::test]
    async fn test_deploy_passes_parameter_overrides() {
        let invoker = DefaultSamCliInvoker::new(RecordingProcessInvoker::default());

        invoker
            .deploy(&deploy_args(&[("Stage", "prod"), ("Foo", "bar")]))
            .await
            .unwrap();

        let args = invoker.process.last_args();
        let at = args
            .iter()
            .position(|a| a == "--parameter-overrides")
            .unwrap();
        assert_eq!(&args[at + 1..], ["Foo=bar", "Stage=prod"]);
    }

    #[tokio::test]
    async fn test_failure_message_prefers_spawn_error_then_stderr_then_stdout() {
        let spawn = DefaultSamCliInvoker::new(RecordingProcessInvoker::returning(
            ProcessResult::spawn_failure("sam not found"),
        ));
        let err = spawn.deploy(&deploy_args(&[])).await.unwrap_err();
        assert_eq!(err.to_string(), "sam deploy encountered an error: sam not found");

        let stderr = DefaultSamCliInvoker::new(RecordingProcessInvoker::returning(
            ProcessResult::failure(1, "Stack is in ROLLBACK_COMPLETE state\n"),
        ));
        let err = stderr.deploy(&deploy_args(&[])).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "sam deploy encountered an error: Stack is in ROLLBACK_COMPLETE state"
        );

        let stdout = DefaultSamCliInvoker::new(RecordingProcessInvoker::returning(ProcessResult {
            exit_code: 2,
            stdout: "usage: sam package".to_string(),
            ..ProcessResult::default()
        }));
        let err = stdout
            .package(&SamPackageArgs {
                template_file: PathBuf::from("template.yaml"),
                output_template_file: PathBuf::from("out.yaml"),
                s3_bucket: "bucket".to_string(),
                region: "us-east-1".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SamCliError::CommandFailed {
                command: "package",
                message: "usage: sam package".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_info_parses_version() {
        let invoker = DefaultSamCliInvoker::new(RecordingProcessInvoker::returning(
            ProcessResult::success(r#"{"version": "0.10.0"}"#),
        ));

        let info = invoker.info().await.unwrap();

        assert_eq!(info.version, "0.10.0");
        assert_eq!(invoker.process.last_args(), vec!["--info"]);
    }

    #[tokio::test]
    async fn test_info_rejects_unexpected_output() {
        let invoker = DefaultSamCliInvoker::new(RecordingProcessInvoker::returning(
            ProcessResult::success("SAM CLI, version 0.10.0"),
        ));

        let err = invoker.info().await.unwrap_err();
        assert_eq!(err.to_string(), "SAM CLI did not return expected data");
    }

    #[tokio::test]
    async fn test_init_runs_in_location() {
        let invoker = DefaultSamCliInvoker::new(RecordingProcessInvoker::default());

        invoker
            .init(&SamInitArgs {
                name: "hello".to_string(),
                runtime: "python3.7".to_string(),
                location: PathBuf::from("/work"),
            })
            .await
            .unwrap();

        let invocations = invoker.process.invocations.lock().unwrap();
        let (args, cwd) = invocations.last().unwrap();
        assert_eq!(args, &["init", "--name", "hello", "--runtime", "python3.7"]);
        assert_eq!(cwd.as_deref(), Some(Path::new("/work")));
    }

    #[tokio::test]
    async fn test_build_requires_existing_template() {
        let invoker = DefaultSamCliInvoker::new(RecordingProcessInvoker::default());

        let err = invoker
            .build(
                Path::new("/tmp/build"),
                Path::new("/tmp"),
                Path::new("/nonexistent/template.yaml"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SamCliError::TemplateNotFound(_)));
        assert!(invoker.process.invocations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_invoke_checks_inputs_and_appends_debug_port() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("template.yaml");
        let event = dir.path().join("event.json");
        std::fs::write(&template, "Resources: {}").unwrap();

        let invoker = DefaultSamCliInvoker::new(RecordingProcessInvoker::default());
        let mut args = SamLocalInvokeArgs {
            resource_name: String::new(),
            template_path: template.clone(),
            event_path: event.clone(),
            env_vars_path: dir.path().join("env.json"),
            debug_port: Some(5858),
        };

        assert_eq!(
            invoker.local_invoke(&args).await.unwrap_err(),
            SamCliError::MissingResourceName
        );

        args.resource_name = "HelloFunction".to_string();
        assert!(matches!(
            invoker.local_invoke(&args).await.unwrap_err(),
            SamCliError::EventNotFound(_)
        ));

        std::fs::write(&event, "{}").unwrap();
        invoker.local_invoke(&args).await.unwrap();

        let sent = invoker.process.last_args();
        assert_eq!(&sent[..3], ["local", "invoke", "HelloFunction"]);
        assert_eq!(&sent[sent.len() - 2..], ["-d", "5858"]);
    }

    #[tokio::test]
    async fn test_mock_invoker_records_and_fails() {
        let mock = MockSamCliInvoker::new().fail("deploy", "boom");

        mock.build(Path::new("b"), Path::new("."), Path::new("t"))
            .await
            .unwrap();
        let err = mock.deploy(&deploy_args(&[])).await.unwrap_err();

        assert_eq!(err.to_string(), "sam deploy encountered an error: boom");
        assert_eq!(mock.calls(), vec!["build", "deploy"]);
        assert_eq!(mock.deploy_requests.lock().unwrap().len(), 1);
    }
}
