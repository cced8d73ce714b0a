//! Line-oriented terminal front-end for the deploy wizard.
//!
//! Every prompt is a numbered list or a free-text question. An empty answer
//! (or end of input) means back, which cancels the wizard at the first step.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{Config, RegionConfig};
use crate::deploy::{ParameterPromptResult, SamDeployWizardContext, StackNameValidator};
use crate::parameters::{
    read_template_parameters, OverridesStore, ParameterOverrides, TemplateParameters,
};
use crate::s3::BucketChoices;

/// File names recognized as SAM templates
const TEMPLATE_PATTERNS: &[&str] = &["**/template.yaml", "**/template.yml"];

/// Directories never searched for templates (build output, dependencies)
const IGNORED_DIRS: &[&str] = &[".aws-sam", "node_modules", ".git"];

/// Find SAM templates under `workspace`, sorted by path
pub fn discover_templates(workspace: &Path) -> Result<Vec<PathBuf>> {
    let mut templates = BTreeSet::new();

    for pattern in TEMPLATE_PATTERNS {
        let full = workspace.join(pattern);
        let full = full.to_string_lossy();
        for entry in glob::glob(&full).with_context(|| format!("Invalid glob pattern {full}"))? {
            match entry {
                Ok(path) if !is_ignored(workspace, &path) => {
                    templates.insert(path);
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "Skipping unreadable path while searching for templates"),
            }
        }
    }

    debug!(count = templates.len(), workspace = %workspace.display(), "Discovered templates");
    Ok(templates.into_iter().collect())
}

fn is_ignored(workspace: &Path, path: &Path) -> bool {
    path.strip_prefix(workspace)
        .unwrap_or(path)
        .components()
        .any(|c| matches!(c, Component::Normal(name) if IGNORED_DIRS.iter().any(|d| name == *d)))
}

fn is_yes(answer: Option<&str>) -> bool {
    matches!(
        answer.map(str::to_ascii_lowercase).as_deref(),
        Some("y" | "yes")
    )
}

struct TerminalIo<R, W> {
    input: R,
    output: W,
}

impl<R, W> TerminalIo<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn say(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }

    /// Ask a question; `None` for an empty answer or end of input
    async fn ask(&mut self, question: &str) -> Result<Option<String>> {
        self.output.write_all(question.as_bytes()).await?;
        self.output.write_all(b" ").await?;
        self.output.flush().await?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .await
            .context("Failed to read from terminal")?;
        if read == 0 {
            return Ok(None);
        }

        let answer = line.trim();
        Ok((!answer.is_empty()).then(|| answer.to_string()))
    }

    /// Show a numbered list and return the picked index.
    ///
    /// An answer that exactly matches an item's `key` picks it too. Anything
    /// else is asked again.
    async fn choose(
        &mut self,
        title: &str,
        items: &[(String, String)],
        previous: Option<usize>,
    ) -> Result<Option<usize>> {
        self.say(title).await?;
        for (index, (_, label)) in items.iter().enumerate() {
            let marker = if previous == Some(index) { " (previous)" } else { "" };
            self.say(&format!("  {}) {label}{marker}", index + 1)).await?;
        }

        loop {
            let Some(answer) = self.ask("Choice (empty to go back):").await? else {
                return Ok(None);
            };
            if let Some(index) = answer
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .filter(|i| *i < items.len())
            {
                return Ok(Some(index));
            }
            if let Some(index) = items.iter().position(|(key, _)| *key == answer) {
                return Ok(Some(index));
            }
            self.say(&format!("'{answer}' is not one of the choices")).await?;
        }
    }
}

/// Deploy wizard context that talks to the user over a terminal
pub struct TerminalDeployContext<R, W> {
    io: Mutex<TerminalIo<R, W>>,
    workspace: PathBuf,
    regions: Vec<RegionConfig>,
    default_region: Option<String>,
    overrides: OverridesStore,
}

impl TerminalDeployContext<BufReader<Stdin>, Stdout> {
    /// Prompt on the process's stdin/stdout
    pub fn stdio(config: &Config) -> Self {
        Self::new(config, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> TerminalDeployContext<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(config: &Config, input: R, output: W) -> Self {
        let workspace = config.workspace_path();
        Self {
            io: Mutex::new(TerminalIo { input, output }),
            overrides: OverridesStore::new(workspace.clone()),
            workspace,
            regions: config.aws.regions.clone(),
            default_region: config.aws.default_region.clone(),
        }
    }

    /// Give back the input and output streams
    pub fn into_inner(self) -> (R, W) {
        let io = self.io.into_inner();
        (io.input, io.output)
    }

    fn display_path<'a>(&self, path: &'a Path) -> std::path::Display<'a> {
        path.strip_prefix(&self.workspace).unwrap_or(path).display()
    }

    async fn scaffold(&self, template: &Path, names: &BTreeSet<String>) -> Result<()> {
        let path = self.overrides.scaffold(template, names).await?;
        self.io
            .lock()
            .await
            .say(&format!(
                "Fill in the values in {} and run the deployment again.",
                path.display()
            ))
            .await
    }
}

#[async_trait]
impl<R, W> SamDeployWizardContext for TerminalDeployContext<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn prompt_for_template(&self, initial: Option<&Path>) -> Result<Option<PathBuf>> {
        let templates = discover_templates(&self.workspace)?;
        let mut io = self.io.lock().await;

        if templates.is_empty() {
            io.say(&format!(
                "No SAM templates (template.yaml) found in {}",
                self.workspace.display()
            ))
            .await?;
            return Ok(None);
        }

        let items: Vec<(String, String)> = templates
            .iter()
            .map(|t| {
                let shown = self.display_path(t).to_string();
                (shown.clone(), shown)
            })
            .collect();
        let previous = initial.and_then(|p| templates.iter().position(|t| t == p));

        let picked = io
            .choose("Which SAM template would you like to deploy?", &items, previous)
            .await?;
        Ok(picked.map(|index| templates[index].clone()))
    }

    async fn get_parameters(&self, template: &Path) -> Result<TemplateParameters> {
        read_template_parameters(template).await
    }

    async fn get_overridden_parameters(
        &self,
        template: &Path,
    ) -> Result<Option<ParameterOverrides>> {
        self.overrides.load(template).await
    }

    async fn prompt_for_parameters(
        &self,
        template: &Path,
        missing_required: &BTreeSet<String>,
    ) -> Result<ParameterPromptResult> {
        let shown = self.display_path(template).to_string();

        if missing_required.is_empty() {
            let answer = {
                let mut io = self.io.lock().await;
                io.say(&format!("The template {shown} contains parameters."))
                    .await?;
                io.ask("Would you like to override the default values for these parameters? [y/N]")
                    .await?
            };
            if !is_yes(answer.as_deref()) {
                return Ok(ParameterPromptResult::Continue);
            }

            let names = read_template_parameters(template).await?.into_keys().collect();
            self.scaffold(template, &names).await?;
            return Ok(ParameterPromptResult::Cancel);
        }

        let answer = {
            let mut io = self.io.lock().await;
            io.say(&format!(
                "The template {shown} contains parameters without default values. \
                 To deploy, you must provide values for: {}",
                missing_required.iter().cloned().collect::<Vec<_>>().join(", ")
            ))
            .await?;
            io.ask("Configure them now? [y/N]").await?
        };
        if is_yes(answer.as_deref()) {
            self.scaffold(template, missing_required).await?;
        }
        Ok(ParameterPromptResult::Cancel)
    }

    async fn prompt_for_region(&self, initial: Option<&str>) -> Result<Option<String>> {
        let seed = initial.or(self.default_region.as_deref());
        let items: Vec<(String, String)> = self
            .regions
            .iter()
            .map(|r| (r.code.clone(), format!("{} ({})", r.name, r.code)))
            .collect();
        let previous = seed.and_then(|code| self.regions.iter().position(|r| r.code == code));

        let picked = self
            .io
            .lock()
            .await
            .choose("Which AWS region would you like to deploy to?", &items, previous)
            .await?;
        Ok(picked.map(|index| self.regions[index].code.clone()))
    }

    async fn prompt_for_s3_bucket(
        &self,
        region: &str,
        choices: &BucketChoices,
        initial: Option<&str>,
    ) -> Result<Option<String>> {
        let title = format!("Which S3 bucket in {region} should the packaged code be uploaded to?");
        let mut io = self.io.lock().await;

        match choices {
            BucketChoices::Available(buckets) => {
                let items: Vec<(String, String)> =
                    buckets.iter().map(|b| (b.clone(), b.clone())).collect();
                let previous = initial.and_then(|b| buckets.iter().position(|x| x == b));
                let picked = io.choose(&title, &items, previous).await?;
                Ok(picked.map(|index| buckets[index].clone()))
            }
            BucketChoices::Unavailable { message, detail } => {
                let label = match detail {
                    Some(detail) => format!("{message}: {detail}"),
                    None => message.clone(),
                };
                let items = vec![(
                    message.clone(),
                    format!("{label} ({})", BucketChoices::GO_BACK_HINT),
                )];
                let picked = io.choose(&title, &items, None).await?;
                Ok(picked.map(|_| message.clone()))
            }
        }
    }

    async fn prompt_for_stack_name(
        &self,
        initial: Option<&str>,
        validate: StackNameValidator,
    ) -> Result<Option<String>> {
        let question = match initial {
            Some(previous) => format!("Stack name [previous: {previous}] (empty to go back):"),
            None => "Stack name (empty to go back):".to_string(),
        };
        let mut io = self.io.lock().await;

        loop {
            let Some(name) = io.ask(&question).await? else {
                return Ok(None);
            };
            match validate(&name) {
                Some(message) => io.say(&message).await?,
                None => return Ok(Some(name)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::validate_stack_name;
    use tempfile::TempDir;

    type TestContext = TerminalDeployContext<&'static [u8], Vec<u8>>;

    fn config_for(workspace: &Path) -> Config {
        let mut config = Config::default();
        config.paths.workspace = workspace.to_string_lossy().to_string();
        config.aws.regions = vec![
            RegionConfig {
                code: "us-east-1".to_string(),
                name: "US East (N. Virginia)".to_string(),
            },
            RegionConfig {
                code: "us-west-2".to_string(),
                name: "US West (Oregon)".to_string(),
            },
        ];
        config
    }

    fn context(workspace: &Path, input: &'static str) -> TestContext {
        TerminalDeployContext::new(&config_for(workspace), input.as_bytes(), Vec::new())
    }

    fn output_of(context: TestContext) -> String {
        String::from_utf8(context.into_inner().1).unwrap()
    }

    fn write_template(root: &Path, relative: &str, body: &str) -> PathBuf {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_discover_templates_skips_build_output() {
        let dir = TempDir::new().unwrap();
        let app = write_template(dir.path(), "app/template.yaml", "Resources: {}");
        let other = write_template(dir.path(), "other/template.yml", "Resources: {}");
        write_template(dir.path(), "app/.aws-sam/build/template.yaml", "Resources: {}");
        write_template(dir.path(), "node_modules/pkg/template.yaml", "Resources: {}");
        write_template(dir.path(), "app/not-a-template.yaml", "Resources: {}");

        let templates = discover_templates(dir.path()).unwrap();

        assert_eq!(templates, vec![app, other]);
    }

    #[tokio::test]
    async fn test_template_prompt_by_number() {
        let dir = TempDir::new().unwrap();
        write_template(dir.path(), "a/template.yaml", "Resources: {}");
        let b = write_template(dir.path(), "b/template.yaml", "Resources: {}");
        let ctx = context(dir.path(), "2\n");

        let picked = ctx.prompt_for_template(None).await.unwrap();

        assert_eq!(picked, Some(b));
        assert!(output_of(ctx).contains("2) b/template.yaml"));
    }

    #[tokio::test]
    async fn test_template_prompt_without_templates_cancels() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "1\n");

        assert_eq!(ctx.prompt_for_template(None).await.unwrap(), None);
        assert!(output_of(ctx).contains("No SAM templates"));
    }

    #[tokio::test]
    async fn test_region_prompt_reasks_on_invalid_answer() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "9\nus-west-2\n");

        let picked = ctx.prompt_for_region(Some("us-east-1")).await.unwrap();

        assert_eq!(picked.as_deref(), Some("us-west-2"));
        let output = output_of(ctx);
        assert!(output.contains("US East (N. Virginia) (us-east-1) (previous)"));
        assert!(output.contains("'9' is not one of the choices"));
    }

    #[tokio::test]
    async fn test_empty_answer_goes_back() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "\n");

        assert_eq!(ctx.prompt_for_region(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_end_of_input_goes_back() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "");

        assert_eq!(ctx.prompt_for_stack_name(None, validate_stack_name).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bucket_prompt_fallback_item() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "1\n");
        let choices = BucketChoices::Unavailable {
            message: "There was a problem accessing S3 in region us-west-2".to_string(),
            detail: Some("access denied: Access Denied".to_string()),
        };

        let picked = ctx
            .prompt_for_s3_bucket("us-west-2", &choices, None)
            .await
            .unwrap();

        // the fallback item is returned as-is and is never an offered bucket
        assert!(!choices.contains(picked.as_deref().unwrap()));
        let output = output_of(ctx);
        assert!(output.contains("access denied: Access Denied"));
        assert!(output.contains(BucketChoices::GO_BACK_HINT));
    }

    #[tokio::test]
    async fn test_bucket_prompt_by_name() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "beta\n");
        let choices = BucketChoices::Available(vec!["alpha".to_string(), "beta".to_string()]);

        let picked = ctx
            .prompt_for_s3_bucket("us-east-1", &choices, Some("alpha"))
            .await
            .unwrap();

        assert_eq!(picked.as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn test_stack_name_prompt_loops_until_valid() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), "My_Stack\nMyStack\n");

        let name = ctx
            .prompt_for_stack_name(None, validate_stack_name)
            .await
            .unwrap();

        assert_eq!(name.as_deref(), Some("MyStack"));
        assert!(output_of(ctx).contains("may contain only alphanumeric characters"));
    }

    #[tokio::test]
    async fn test_mandatory_parameters_scaffold_and_cancel() {
        let dir = TempDir::new().unwrap();
        let template = write_template(
            dir.path(),
            "app/template.yaml",
            "Parameters:\n  Foo:\n    Type: String\n",
        );
        let ctx = context(dir.path(), "y\n");

        let result = ctx
            .prompt_for_parameters(&template, &BTreeSet::from(["Foo".to_string()]))
            .await
            .unwrap();

        assert_eq!(result, ParameterPromptResult::Cancel);
        let overrides = OverridesStore::new(dir.path())
            .load(&template)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(overrides["Foo"], "");
        assert!(output_of(ctx).contains("Configure them now?"));
    }

    #[tokio::test]
    async fn test_mandatory_parameters_cancel_when_declined() {
        let dir = TempDir::new().unwrap();
        let template = write_template(dir.path(), "template.yaml", "Parameters:\n  Foo: {}\n");
        let ctx = context(dir.path(), "n\n");

        let result = ctx
            .prompt_for_parameters(&template, &BTreeSet::from(["Foo".to_string()]))
            .await
            .unwrap();

        assert_eq!(result, ParameterPromptResult::Cancel);
        assert!(!dir.path().join(OverridesStore::RELATIVE_PATH).exists());
    }

    #[tokio::test]
    async fn test_optional_parameters_continue_by_default() {
        let dir = TempDir::new().unwrap();
        let template = write_template(
            dir.path(),
            "template.yaml",
            "Parameters:\n  Stage:\n    Type: String\n    Default: dev\n",
        );
        let ctx = context(dir.path(), "\n");

        let result = ctx
            .prompt_for_parameters(&template, &BTreeSet::new())
            .await
            .unwrap();

        assert_eq!(result, ParameterPromptResult::Continue);
        assert!(output_of(ctx)
            .contains("Would you like to override the default values for these parameters?"));
    }

    #[tokio::test]
    async fn test_optional_parameters_configure_cancels() {
        let dir = TempDir::new().unwrap();
        let template = write_template(
            dir.path(),
            "template.yaml",
            "Parameters:\n  Stage:\n    Type: String\n    Default: dev\n",
        );
        let ctx = context(dir.path(), "yes\n");

        let result = ctx
            .prompt_for_parameters(&template, &BTreeSet::new())
            .await
            .unwrap();

        assert_eq!(result, ParameterPromptResult::Cancel);
        let overrides = OverridesStore::new(dir.path())
            .load(&template)
            .await
            .unwrap()
            .unwrap();
        assert!(overrides.contains_key("Stage"));
    }
}
