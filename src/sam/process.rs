//! Running the `sam` executable.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::SamCliError;

/// Exit status and captured output of one `sam` invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Set when the process could not be started at all
    pub error: Option<String>,
}

impl ProcessResult {
    /// A successful run that printed `stdout`
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// A run that exited with `exit_code` after printing `stderr`
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// A process that never started
    pub fn spawn_failure(error: impl Into<String>) -> Self {
        Self {
            exit_code: -1,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }
}

/// Trait abstracting `sam` process execution for testability
#[async_trait]
pub trait SamCliProcessInvoker: Send + Sync {
    /// Run `sam <args>` in `cwd` (or the current directory) and capture its output
    async fn invoke(&self, args: &[String], cwd: Option<&Path>) -> ProcessResult;
}

/// Real implementation using the installed `sam` binary
#[derive(Debug, Clone)]
pub struct SystemSamCliProcessInvoker {
    sam_path: PathBuf,
}

impl SystemSamCliProcessInvoker {
    pub fn new(sam_path: PathBuf) -> Self {
        Self { sam_path }
    }

    /// Use `explicit` if given, otherwise find `sam` on `PATH`
    pub fn locate(explicit: Option<&str>) -> Result<Self, SamCliError> {
        let path = match explicit {
            Some(path) => PathBuf::from(path),
            None => which::which("sam").map_err(|_| SamCliError::NotInstalled)?,
        };
        Ok(Self::new(path))
    }

    pub fn sam_path(&self) -> &Path {
        &self.sam_path
    }
}

#[async_trait]
impl SamCliProcessInvoker for SystemSamCliProcessInvoker {
    async fn invoke(&self, args: &[String], cwd: Option<&Path>) -> ProcessResult {
        debug!(?args, ?cwd, sam = %self.sam_path.display(), "Running sam command");

        let mut cmd = Command::new(&self.sam_path);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        match cmd.output().await {
            Ok(output) => ProcessResult {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                error: None,
            },
            Err(err) => ProcessResult::spawn_failure(format!(
                "failed to execute {}: {err}",
                self.sam_path.display()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_result_constructors() {
        assert!(ProcessResult::success("{}").succeeded());

        let failed = ProcessResult::failure(2, "boom");
        assert!(!failed.succeeded());
        assert_eq!(failed.stderr, "boom");

        let spawn = ProcessResult::spawn_failure("No such file or directory");
        assert_eq!(spawn.exit_code, -1);
        assert!(!spawn.succeeded());
    }

    #[tokio::test]
    async fn test_missing_binary_reports_spawn_failure() {
        let invoker = SystemSamCliProcessInvoker::new(PathBuf::from(
            "/nonexistent/sam-deploy-test/sam",
        ));

        let result = invoker.invoke(&["--info".to_string()], None).await;

        assert_eq!(result.exit_code, -1);
        assert!(result.error.unwrap().contains("failed to execute"));
    }

    #[test]
    fn test_locate_with_explicit_path() {
        let invoker = SystemSamCliProcessInvoker::locate(Some("/opt/sam/bin/sam")).unwrap();
        assert_eq!(invoker.sam_path(), Path::new("/opt/sam/bin/sam"));
    }
}
