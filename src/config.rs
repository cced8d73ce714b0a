use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::s3::BucketLookupPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub sam: SamConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub buckets: BucketsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root searched for templates; also holds `.aws/templates.json`
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Where logs are written
    #[serde(default = "default_state")]
    pub state: String,
}

fn default_workspace() -> String {
    ".".to_string()
}

fn default_state() -> String {
    ".sam-deploy".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            state: default_state(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamConfig {
    /// Explicit `sam` binary; located on PATH when unset
    #[serde(default)]
    pub cli_path: Option<String>,
}

/// A region offered by the region prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub code: String,
    pub name: String,
}

impl RegionConfig {
    fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Explicit `aws` binary; located on PATH when unset
    #[serde(default)]
    pub cli_path: Option<String>,
    /// Region preselected the first time the region prompt is shown
    #[serde(default)]
    pub default_region: Option<String>,
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionConfig>,
}

fn default_regions() -> Vec<RegionConfig> {
    vec![
        RegionConfig::new("us-east-1", "US East (N. Virginia)"),
        RegionConfig::new("us-east-2", "US East (Ohio)"),
        RegionConfig::new("us-west-1", "US West (N. California)"),
        RegionConfig::new("us-west-2", "US West (Oregon)"),
        RegionConfig::new("ca-central-1", "Canada (Central)"),
        RegionConfig::new("eu-west-1", "EU (Ireland)"),
        RegionConfig::new("eu-west-2", "EU (London)"),
        RegionConfig::new("eu-west-3", "EU (Paris)"),
        RegionConfig::new("eu-central-1", "EU (Frankfurt)"),
        RegionConfig::new("eu-north-1", "EU (Stockholm)"),
        RegionConfig::new("ap-south-1", "Asia Pacific (Mumbai)"),
        RegionConfig::new("ap-northeast-1", "Asia Pacific (Tokyo)"),
        RegionConfig::new("ap-northeast-2", "Asia Pacific (Seoul)"),
        RegionConfig::new("ap-southeast-1", "Asia Pacific (Singapore)"),
        RegionConfig::new("ap-southeast-2", "Asia Pacific (Sydney)"),
        RegionConfig::new("sa-east-1", "South America (Sao Paulo)"),
    ]
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            cli_path: None,
            default_region: None,
            regions: default_regions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketsConfig {
    /// Timeout in seconds for one bucket location lookup (default: 10)
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
    /// Retries of a lookup that failed transiently (default: 2)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// First retry delay in milliseconds, doubled per retry (default: 200)
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

fn default_lookup_timeout() -> u64 {
    10
}

fn default_max_retries() -> usize {
    2
}

fn default_retry_base_delay() -> u64 {
    200
}

impl Default for BucketsConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_secs: default_lookup_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
        }
    }
}

impl BucketsConfig {
    pub fn lookup_policy(&self) -> BucketLookupPolicy {
        BucketLookupPolicy {
            timeout: Duration::from_secs(self.lookup_timeout_secs),
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether interactive runs log to a file (false = stderr)
    #[serde(default = "default_log_to_file")]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_to_file() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: default_log_to_file(),
        }
    }
}

impl Config {
    /// Path to the project config file, relative to the working directory
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".sam-deploy/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so the tool works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let project_config = Self::project_config_path();
        if project_config.exists() {
            builder = builder.add_source(config::File::from(project_config));
        }

        // User config in ~/.config/sam-deploy/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sam-deploy").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // --config
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with SAM_DEPLOY prefix
        builder = builder.add_source(
            config::Environment::with_prefix("SAM_DEPLOY")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to .sam-deploy/config.toml
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::project_config_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Write this config as TOML to `config_path`, creating parent directories
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(config_path, toml_str)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;

        Ok(())
    }

    /// Get absolute path to the workspace root
    pub fn workspace_path(&self) -> PathBuf {
        absolute(&self.paths.workspace)
    }

    /// State directory, resolved against the current directory when relative
    pub fn state_path(&self) -> PathBuf {
        absolute(&self.paths.state)
    }

    /// `<state>/logs`
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }
}

fn absolute(path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}
