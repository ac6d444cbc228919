//! Configuration management for flowkeep
//!
//! Store settings are resolved from three layers, lowest precedence first:
//! built-in defaults, `FLOWKEEP_*` environment variables, and an optional
//! `flowkeep.yaml` file.

use crate::common::env_loader::EnvLoader;
use crate::error::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const CONFIG_FILE_NAME: &str = "flowkeep.yaml";
const DEFAULT_ROOT: &str = "workflow_repo";
const DEFAULT_EXTENSION: &str = "yaml";
const DEFAULT_AUTHOR_NAME: &str = "Scheduler Bot";
const DEFAULT_AUTHOR_EMAIL: &str = "bot@example.com";
const INDEX_DIR: &str = ".flowkeep";
const INDEX_FILE: &str = "index.json";

/// Identity recorded on every revision the store creates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    /// Author name
    pub name: String,
    /// Author email
    pub email: String,
}

impl CommitAuthor {
    /// Create an author from a name and email
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Default for CommitAuthor {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHOR_NAME, DEFAULT_AUTHOR_EMAIL)
    }
}

impl fmt::Display for CommitAuthor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// When `save` stamps `local_status: modified` into a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifiedMarkerPolicy {
    /// Never touch the status marker
    Never,
    /// Stamp the marker only when the saved content differs from what is stored
    #[default]
    OnChange,
    /// Stamp the marker on every save, even a no-op one
    Always,
}

impl FromStr for ModifiedMarkerPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "on_change" | "on-change" | "onchange" => Ok(Self::OnChange),
            "always" => Ok(Self::Always),
            other => Err(ConfigError::InvalidValue {
                field: "modified_marker".to_string(),
                value: other.to_string(),
                hint: "expected one of: never, on_change, always".to_string(),
            }),
        }
    }
}

/// Settings for a [`crate::WorkflowStore`]
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the workflow documents and the revision history
    pub root: PathBuf,
    /// Document file extension, without the dot
    pub extension: String,
    /// Metadata index file; `None` means `<root>/.flowkeep/index.json`
    pub index_path: Option<PathBuf>,
    /// Author stamped on every commit
    pub author: CommitAuthor,
    /// Status marker policy applied by `save`
    pub modified_marker: ModifiedMarkerPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            extension: DEFAULT_EXTENSION.to_string(),
            index_path: None,
            author: CommitAuthor::default(),
            modified_marker: ModifiedMarkerPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Defaults rooted at `root`, ignoring the environment and config files
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from:
    /// 1. YAML file (highest precedence)
    /// 2. Environment variables
    /// 3. Defaults (lowest precedence)
    ///
    /// A config file that exists but cannot be read or parsed is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_vars();

        let yaml_config = YamlConfig::load_or_default()?;
        yaml_config.apply_to_config(&mut config)?;

        config.validate()?;
        tracing::debug!("Resolved store configuration: {:?}", config);
        Ok(config)
    }

    fn apply_env_vars(&mut self) {
        let loader = EnvLoader::new("FLOWKEEP");

        if let Some(root) = loader.load_optional::<PathBuf>("ROOT") {
            self.root = root;
        }
        self.extension = loader.load_string("EXTENSION", &self.extension);
        if let Some(index_path) = loader.load_optional::<PathBuf>("INDEX_PATH") {
            self.index_path = Some(index_path);
        }
        self.author.name = loader.load_string("AUTHOR_NAME", &self.author.name);
        self.author.email = loader.load_string("AUTHOR_EMAIL", &self.author.email);
        self.modified_marker = loader.load_parsed("MODIFIED_MARKER", self.modified_marker);
    }

    /// The metadata index location, defaulting to a file under the root
    pub fn index_path(&self) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(|| self.root.join(INDEX_DIR).join(INDEX_FILE))
    }

    /// Find `flowkeep.yaml` in the current directory, then in
    /// `~/.config/flowkeep/`
    pub fn find_yaml_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(CONFIG_FILE_NAME)];

        if let Some(home_dir) = dirs::home_dir() {
            search_paths.push(
                home_dir
                    .join(".config")
                    .join("flowkeep")
                    .join(CONFIG_FILE_NAME),
            );
        }

        for config_path in search_paths {
            if config_path.is_file() {
                tracing::debug!("Found configuration file: {:?}", config_path);
                return Some(config_path);
            }
        }

        tracing::debug!("No {} configuration file found", CONFIG_FILE_NAME);
        None
    }

    /// Validate the current configuration settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_extension(&self.extension)?;

        if self.author.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "author_name".to_string(),
                value: self.author.name.clone(),
                hint: "commit author name cannot be empty".to_string(),
            });
        }
        if self.author.email.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "author_email".to_string(),
                value: self.author.email.clone(),
                hint: "commit author email cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_extension(extension: &str) -> Result<(), ConfigError> {
    if extension.is_empty() || extension.contains(['.', '/', '\\']) {
        return Err(ConfigError::InvalidValue {
            field: "extension".to_string(),
            value: extension.to_string(),
            hint: "use a bare extension such as 'yaml' (no dot, no path separators)".to_string(),
        });
    }
    Ok(())
}

/// Configuration loaded from a `flowkeep.yaml` file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YamlConfig {
    /// Workflow repository root
    pub root: Option<PathBuf>,
    /// Document extension
    pub extension: Option<String>,
    /// Metadata index file
    pub index_path: Option<PathBuf>,
    /// Commit author name
    pub author_name: Option<String>,
    /// Commit author email
    pub author_email: Option<String>,
    /// Status marker policy
    pub modified_marker: Option<String>,
}

impl YamlConfig {
    /// Apply YAML values on top of `config`
    pub fn apply_to_config(&self, config: &mut StoreConfig) -> Result<(), ConfigError> {
        if let Some(ref root) = self.root {
            config.root = root.clone();
        }
        if let Some(ref extension) = self.extension {
            config.extension = extension.clone();
        }
        if let Some(ref index_path) = self.index_path {
            config.index_path = Some(index_path.clone());
        }
        if let Some(ref name) = self.author_name {
            config.author.name = name.clone();
        }
        if let Some(ref email) = self.author_email {
            config.author.email = email.clone();
        }
        if let Some(ref policy) = self.modified_marker {
            config.modified_marker = policy.parse()?;
        }
        Ok(())
    }

    /// Load YAML configuration from a file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::info!("Loading YAML configuration from: {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load the discovered config file, or defaults when there is none
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match StoreConfig::find_yaml_config_file() {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }
}
