//! Registry credential fallbacks read from the config file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// `registry:` section - fallback values for every registry kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub dockerhub: DockerHubConfig,

    #[serde(default)]
    pub ghcr: GhcrConfig,

    #[serde(default)]
    pub ecr: EcrConfig,

    #[serde(default)]
    pub acr: AcrConfig,

    /// GCR and Artifact Registry
    #[serde(default)]
    pub google: GoogleConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerHubConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GhcrConfig {
    pub username: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EcrConfig {
    /// AWS region (e.g., "us-east-1")
    pub region: Option<String>,

    /// Target repository; defaults to the local image name
    pub repository: Option<String>,

    /// 12-digit account ID; looked up through STS when absent
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcrConfig {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub registry_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub project_id: Option<String>,

    /// Service-account key file
    pub credentials_file: Option<PathBuf>,

    /// Artifact Registry location (e.g., "us", "europe-west1")
    pub region: Option<String>,

    /// Artifact Registry repository
    pub repository: Option<String>,

    /// Publish short names to gcr.io instead of Artifact Registry
    #[serde(default)]
    pub legacy_gcr: bool,
}
