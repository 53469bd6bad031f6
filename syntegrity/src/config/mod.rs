//! Application configuration.
//!
//! Values resolve in layers, later layers winning: built-in defaults, an
//! optional YAML file, `SYNTEGRITY_DAGGER_*` environment variables, and
//! finally command-line flags applied by the caller.

use crate::observability::is_valid_level;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix of every configuration environment variable.
pub const ENV_PREFIX: &str = "SYNTEGRITY_DAGGER_";

/// Dotted keys that can be set from the environment.
pub const ENV_KEYS: [&str; 18] = [
    "pipeline.name",
    "pipeline.environment",
    "pipeline.coverage",
    "pipeline.goVersion",
    "pipeline.steps",
    "registry.baseUrl",
    "registry.image",
    "registry.user",
    "security.enableVulnCheck",
    "security.enableLinting",
    "release.enabled",
    "release.useGoreleaser",
    "release.createGithubRelease",
    "release.platforms",
    "logging.level",
    "logging.json",
    "git.protocol",
    "git.ref",
];

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The file path.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for the schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A single value could not be interpreted.
    #[error("invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        /// The dotted key or variable name.
        key: String,
        /// The rejected value.
        value: String,
        /// What was expected.
        expected: &'static str,
    },

    /// The resolved configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// `pipeline` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Pipeline to run.
    pub name: String,
    /// Target environment.
    pub environment: String,
    /// Minimum statement coverage, in percent.
    pub coverage: f64,
    /// Go toolchain version.
    pub go_version: String,
    /// Explicit step list replacing the pipeline's own.
    pub steps: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            name: "go-kit".to_string(),
            environment: "dev".to_string(),
            coverage: 90.0,
            go_version: "1.22".to_string(),
            steps: Vec::new(),
        }
    }
}

/// `registry` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    /// Registry host.
    pub base_url: String,
    /// Image name, without host.
    pub image: String,
    /// Registry user or organisation.
    pub user: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            base_url: "ghcr.io".to_string(),
            image: String::new(),
            user: String::new(),
        }
    }
}

impl RegistrySettings {
    /// Returns `base/user/image:tag`, skipping empty parts.
    #[must_use]
    pub fn image_ref(&self, tag: &str) -> String {
        let path = [self.base_url.as_str(), self.user.as_str(), self.image.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        format!("{path}:{tag}")
    }
}

/// `security` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecuritySettings {
    /// Run the vulnerability scanner.
    pub enable_vuln_check: bool,
    /// Run the linter.
    pub enable_linting: bool,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            enable_vuln_check: true,
            enable_linting: true,
        }
    }
}

/// `release` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseSettings {
    /// Register the release step.
    pub enabled: bool,
    /// Release with goreleaser instead of plain builds.
    pub use_goreleaser: bool,
    /// Publish a GitHub release.
    pub create_github_release: bool,
    /// Target `os/arch` pairs.
    pub platforms: Vec<String>,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            use_goreleaser: false,
            create_github_release: false,
            platforms: vec!["linux/amd64".to_string()],
        }
    }
}

/// `logging` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level.
    pub level: String,
    /// Emit JSON lines.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// `git` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitSettings {
    /// `ssh` or `https`.
    pub protocol: String,
    /// Ref to build; empty means the checked-out one.
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            protocol: "https".to_string(),
            git_ref: String::new(),
        }
    }
}

/// The full configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pipeline selection and thresholds.
    pub pipeline: PipelineSettings,
    /// Container registry.
    pub registry: RegistrySettings,
    /// Security checks.
    pub security: SecuritySettings,
    /// Release publishing.
    pub release: ReleaseSettings,
    /// Logging.
    pub logging: LoggingSettings,
    /// Source checkout.
    pub git: GitSettings,
}

impl AppConfig {
    /// Parses a YAML document over the defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Loads the defaults, overlaid with `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the file layer and then the process environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies every variable `lookup` knows about.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        for key in ENV_KEYS {
            let name = env_var_name(key);
            if let Some(value) = lookup(&name) {
                self.set(key, &value).map_err(|err| match err {
                    ConfigError::InvalidValue { value, expected, .. } => ConfigError::InvalidValue {
                        key: name.clone(),
                        value,
                        expected,
                    },
                    other => other,
                })?;
            }
        }
        Ok(())
    }

    /// Sets one value by dotted key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match key {
            "pipeline.name" => self.pipeline.name = value.to_string(),
            "pipeline.environment" => self.pipeline.environment = value.to_string(),
            "pipeline.coverage" => self.pipeline.coverage = parse_number(key, value)?,
            "pipeline.goVersion" => self.pipeline.go_version = value.to_string(),
            "pipeline.steps" => self.pipeline.steps = parse_list(value),
            "registry.baseUrl" => self.registry.base_url = value.to_string(),
            "registry.image" => self.registry.image = value.to_string(),
            "registry.user" => self.registry.user = value.to_string(),
            "security.enableVulnCheck" => self.security.enable_vuln_check = parse_bool(key, value)?,
            "security.enableLinting" => self.security.enable_linting = parse_bool(key, value)?,
            "release.enabled" => self.release.enabled = parse_bool(key, value)?,
            "release.useGoreleaser" => self.release.use_goreleaser = parse_bool(key, value)?,
            "release.createGithubRelease" => {
                self.release.create_github_release = parse_bool(key, value)?;
            }
            "release.platforms" => self.release.platforms = parse_list(value),
            "logging.level" => self.logging.level = value.to_ascii_lowercase(),
            "logging.json" => self.logging.json = parse_bool(key, value)?,
            "git.protocol" => self.git.protocol = value.to_ascii_lowercase(),
            "git.ref" => self.git.git_ref = value.to_string(),
            other => return Err(ConfigError::Invalid(format!("unknown key '{other}'"))),
        }
        Ok(())
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.name.trim().is_empty() {
            return Err(ConfigError::Invalid("pipeline.name cannot be empty".to_string()));
        }
        if !(0.0..=100.0).contains(&self.pipeline.coverage) {
            return Err(ConfigError::Invalid(format!(
                "pipeline.coverage must be between 0 and 100, got {}",
                self.pipeline.coverage
            )));
        }
        if !matches!(self.git.protocol.as_str(), "ssh" | "https") {
            return Err(ConfigError::Invalid(format!(
                "git.protocol must be 'ssh' or 'https', got '{}'",
                self.git.protocol
            )));
        }
        if !is_valid_level(&self.logging.level) {
            return Err(ConfigError::Invalid(format!(
                "unknown logging.level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// Maps a dotted key to its environment variable name.
#[must_use]
pub fn env_var_name(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.replace('.', "_").to_ascii_uppercase())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a boolean",
        }),
    }
}

fn parse_number(key: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim_end_matches('%')
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a number",
        })
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}
