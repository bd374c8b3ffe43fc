//! Top-level hoist configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::registry::RegistryConfig;

/// Contents of `hoist.yaml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HoistConfig {
    /// Default image used when none is given on the command line
    #[serde(default)]
    pub image: ImageDefaults,

    /// Registry credential fallbacks
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Push behaviour defaults
    #[serde(default)]
    pub push: PushDefaults,

    /// Docker client config holding saved logins (default `~/.docker/config.json`)
    #[serde(default)]
    pub docker_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImageDefaults {
    pub name: Option<String>,
    pub tag: Option<String>,
}

impl ImageDefaults {
    /// `name[:tag]` assembled from the defaults, if a name is configured
    pub fn reference(&self) -> Option<String> {
        let name = self.name.as_deref().filter(|n| !n.is_empty())?;
        Some(match self.tag.as_deref().filter(|t| !t.is_empty()) {
            Some(tag) => format!("{}:{}", name, tag),
            None => name.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PushDefaults {
    /// Remove the local target tag once the push succeeded
    #[serde(default)]
    pub delete_after_push: bool,

    /// Deadline for the whole resolve/authenticate/push sequence
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}
