//! Template parameter introspection and persisted parameter overrides.
//!
//! Declared parameters come from the `Parameters` section of a SAM template.
//! Overrides are persisted per template in `<workspace>/.aws/templates.json`:
//!
//! ```json
//! {
//!   "templates": {
//!     "app/template.yaml": {
//!       "parameterOverrides": { "Stage": "prod" }
//!     }
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// A parameter declared by a template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateParameter {
    /// `true` when the template gives no `Default`
    pub required: bool,
}

/// Declared parameters by name
pub type TemplateParameters = BTreeMap<String, TemplateParameter>;

/// Override values by parameter name
pub type ParameterOverrides = BTreeMap<String, String>;

/// Read the declared parameters of a SAM/CloudFormation template.
///
/// CloudFormation short-form tags (`!Ref`, `!Sub`, ...) are accepted. A
/// template without a `Parameters` section declares nothing.
pub fn parse_template_parameters(yaml: &str) -> Result<TemplateParameters> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(yaml).context("Failed to parse template YAML")?;

    let Some(section) = document.get("Parameters").and_then(|p| p.as_mapping()) else {
        return Ok(TemplateParameters::new());
    };

    let mut parameters = TemplateParameters::new();
    for (name, definition) in section {
        let Some(name) = name.as_str() else {
            continue;
        };
        let required = definition.get("Default").is_none();
        parameters.insert(name.to_string(), TemplateParameter { required });
    }
    Ok(parameters)
}

/// Load and parse the declared parameters of the template at `path`
pub async fn read_template_parameters(path: &Path) -> Result<TemplateParameters> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read template {}", path.display()))?;
    parse_template_parameters(&contents)
        .with_context(|| format!("Invalid template {}", path.display()))
}

/// Names of the parameters that have no default value
pub fn required_parameter_names(parameters: &TemplateParameters) -> BTreeSet<String> {
    parameters
        .iter()
        .filter(|(_, parameter)| parameter.required)
        .map(|(name, _)| name.clone())
        .collect()
}

/// Required parameter names that `overrides` does not cover
pub fn missing_required_parameters(
    parameters: &TemplateParameters,
    overrides: &ParameterOverrides,
) -> BTreeSet<String> {
    required_parameter_names(parameters)
        .into_iter()
        .filter(|name| !overrides.contains_key(name))
        .collect()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TemplatesFile {
    #[serde(default)]
    templates: BTreeMap<String, TemplateEntry>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameter_overrides: Option<ParameterOverrides>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Persisted parameter overrides for the templates of one workspace
#[derive(Debug, Clone)]
pub struct OverridesStore {
    workspace_root: PathBuf,
}

impl OverridesStore {
    /// Location of the overrides file, relative to the workspace root
    pub const RELATIVE_PATH: &'static str = ".aws/templates.json";

    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.workspace_root.join(Self::RELATIVE_PATH)
    }

    /// Key of `template` in the overrides file: its workspace-relative path
    /// with forward slashes
    fn template_key(&self, template: &Path) -> String {
        let relative = template
            .strip_prefix(&self.workspace_root)
            .unwrap_or(template);
        relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    async fn read_file(&self) -> Result<TemplatesFile> {
        let path = self.path();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(TemplatesFile::default()),
            Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Persisted overrides for `template`.
    ///
    /// `None` means overrides were never configured for the template, which
    /// is different from a configured but empty set.
    pub async fn load(&self, template: &Path) -> Result<Option<ParameterOverrides>> {
        let key = self.template_key(template);
        let mut file = self.read_file().await?;
        let overrides = file
            .templates
            .remove(&key)
            .and_then(|entry| entry.parameter_overrides);
        debug!(template = %key, configured = overrides.is_some(), "Loaded parameter overrides");
        Ok(overrides)
    }

    /// Pre-fill an entry for `template` with empty values for `names` so the
    /// user can fill them in. Existing values are kept. Returns the path of
    /// the overrides file.
    pub async fn scaffold(&self, template: &Path, names: &BTreeSet<String>) -> Result<PathBuf> {
        let key = self.template_key(template);
        let mut file = self.read_file().await?;

        let overrides = file
            .templates
            .entry(key.clone())
            .or_default()
            .parameter_overrides
            .get_or_insert_with(ParameterOverrides::new);
        for name in names {
            overrides.entry(name.clone()).or_default();
        }

        let path = self.path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json =
            serde_json::to_string_pretty(&file).context("Failed to serialize parameter overrides")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(template = %key, path = %path.display(), "Scaffolded parameter overrides");
        Ok(path)
    }
}
