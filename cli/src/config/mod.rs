//! # Hoist Configuration
//!
//! A single YAML file supplies fallback values for the credential cascade,
//! a default image and push defaults.
//!
//! ## Lookup order
//!
//! 1. `--config <path>` (must exist)
//! 2. `./hoist.yaml`
//! 3. `$XDG_CONFIG_HOME/hoist/config.yaml` (platform config dir)
//! 4. Built-in defaults
//!
//! ## Example
//!
//! ```yaml
//! image:
//!   name: myapp
//!   tag: v1
//! registry:
//!   ecr:
//!     region: us-east-1
//!     repository: myrepo
//!   google:
//!     project_id: my-project
//!     region: europe-west1
//!     repository: containers
//! push:
//!   delete_after_push: true
//!   timeout: 10m
//! docker_config: /home/ci/.docker/config.json
//! ```

mod global;
mod registry;

pub use global::{HoistConfig, ImageDefaults, PushDefaults};
pub use registry::{AcrConfig, DockerHubConfig, EcrConfig, GhcrConfig, GoogleConfig, RegistryConfig};

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "hoist.yaml";

impl HoistConfig {
    /// Load configuration from an explicit path or the default locations
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            return Self::load_from_path(path);
        }

        match Self::discover() {
            Some(path) => Self::load_from_path(&path),
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a specific config file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_yaml(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("hoist").join("config.yaml"))
            .filter(|path| path.exists())
    }
}
