//! Credential cascade
//!
//! Resolves, per registry kind, the secret pair or the cloud identity inputs
//! needed to authenticate. Every field is looked up in the same order:
//!
//! 1. explicit value (CLI flag)
//! 2. environment variables of that registry kind
//! 3. config file, only when none of the kind's environment variables is set
//! 4. platform fallback (saved `docker login`, `gh`, `aws` profile, or the
//!    reference itself)
//!
//! Empty strings count as absent. Nothing here touches the network.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use crate::config::RegistryConfig;
use crate::domain::fallback::{first_success, Found, Strategy};
use crate::domain::reference::{DOCKER_HUB_HOST, GHCR_HOST};
use crate::domain::{Credentials, EcrHost, ImageReference, RegistryKind, TargetSpec};
use crate::error::PublishError;
use crate::infrastructure::acr::AcrRegistryId;
use crate::infrastructure::PlatformCredentials;

/// Server address the engine expects for Docker Hub logins
pub const DOCKER_HUB_SERVER: &str = "https://index.docker.io/v1/";
/// Artifact Registry location used when none is configured
pub const DEFAULT_ARTIFACT_REGION: &str = "us";

/// Environment variable groups per registry kind
mod vars {
    pub const DOCKER_HUB: &[&str] = &["DOCKER_USERNAME", "DOCKER_PASSWORD"];
    pub const GHCR: &[&str] = &["GHCR_USERNAME", "GHCR_TOKEN", "GITHUB_TOKEN"];
    pub const ECR: &[&str] = &[
        "AWS_REGION",
        "AWS_DEFAULT_REGION",
        "ECR_REPOSITORY",
        "AWS_ACCOUNT_ID",
    ];
    pub const ACR: &[&str] = &[
        "AZURE_SUBSCRIPTION_ID",
        "AZURE_RESOURCE_GROUP",
        "ACR_REGISTRY_NAME",
    ];
    pub const GOOGLE: &[&str] = &[
        "GOOGLE_CLOUD_PROJECT",
        "GCP_PROJECT_ID",
        "GOOGLE_APPLICATION_CREDENTIALS",
        "ARTIFACT_REGISTRY_REGION",
        "ARTIFACT_REGISTRY_REPOSITORY",
    ];
}

/// Read access to environment variables
pub trait EnvSource: Send + Sync {
    /// Value of `name`, `None` when unset or empty
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).filter(|value| !value.is_empty()).cloned()
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ExplicitCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub region: Option<String>,
    pub repository: Option<String>,
    pub account_id: Option<String>,
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub registry_name: Option<String>,
    pub project_id: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub legacy_gcr: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcrIdentity {
    pub region: String,
    /// `None` until looked up from the caller identity
    pub account_id: Option<String>,
    pub repository: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleIdentity {
    pub kind: RegistryKind,
    pub project_id: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub region: String,
    pub repository: Option<String>,
    pub legacy_gcr: bool,
}

/// Output of the cascade: a static login or the inputs for a cloud exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCredentials {
    Static {
        kind: RegistryKind,
        credentials: Credentials,
    },
    Ecr(EcrIdentity),
    Acr(AcrRegistryId),
    Google(GoogleIdentity),
}

impl ResolvedCredentials {
    pub fn kind(&self) -> RegistryKind {
        match self {
            Self::Static { kind, .. } => *kind,
            Self::Ecr(_) => RegistryKind::Ecr,
            Self::Acr(_) => RegistryKind::Acr,
            Self::Google(identity) => identity.kind,
        }
    }

    /// Where short image names are placed for this registry
    pub fn target_spec(&self) -> Result<TargetSpec, PublishError> {
        match self {
            Self::Static {
                kind: RegistryKind::Ghcr,
                ..
            } => Ok(TargetSpec::Ghcr),
            Self::Static { .. } => Ok(TargetSpec::DockerHub),
            Self::Ecr(identity) => {
                let account_id = identity.account_id.clone().ok_or_else(|| {
                    PublishError::MissingCredentials {
                        registry: RegistryKind::Ecr,
                        field: "account ID".to_string(),
                        attempted: vec![
                            "--account-id".to_string(),
                            "env AWS_ACCOUNT_ID".to_string(),
                            "config registry.ecr.account_id".to_string(),
                            "sts get-caller-identity".to_string(),
                        ],
                    }
                })?;
                Ok(TargetSpec::Ecr {
                    host: EcrHost::new(account_id, &identity.region),
                    repository: identity.repository.clone(),
                })
            }
            Self::Acr(id) => Ok(TargetSpec::Acr {
                registry_name: id.registry_name.clone(),
            }),
            Self::Google(identity) => {
                let repository = match (&identity.repository, identity.legacy_gcr) {
                    (Some(repository), _) => repository.clone(),
                    (None, true) => String::new(),
                    (None, false) => {
                        return Err(PublishError::MissingCredentials {
                            registry: RegistryKind::ArtifactRegistry,
                            field: "repository".to_string(),
                            attempted: vec![
                                "--repository".to_string(),
                                "env ARTIFACT_REGISTRY_REPOSITORY".to_string(),
                                "config registry.google.repository".to_string(),
                            ],
                        })
                    }
                };
                Ok(TargetSpec::Google {
                    project_id: identity.project_id.clone(),
                    legacy_gcr: identity.legacy_gcr,
                    region: identity.region.clone(),
                    repository,
                })
            }
        }
    }
}

/// Ordered credential lookup for one invocation
pub struct CredentialCascade<'a> {
    env: &'a dyn EnvSource,
    config: &'a RegistryConfig,
    platform: &'a dyn PlatformCredentials,
}

impl<'a> CredentialCascade<'a> {
    pub fn new(
        env: &'a dyn EnvSource,
        config: &'a RegistryConfig,
        platform: &'a dyn PlatformCredentials,
    ) -> Self {
        Self {
            env,
            config,
            platform,
        }
    }

    /// Resolve everything needed to authenticate `kind` for `reference`
    pub fn resolve(
        &self,
        kind: RegistryKind,
        explicit: &ExplicitCredentials,
        reference: &ImageReference,
    ) -> Result<ResolvedCredentials, PublishError> {
        debug!(registry = %kind, reference = %reference, "Resolving credentials");
        match kind {
            RegistryKind::DockerHub => self.docker_hub(explicit, reference),
            RegistryKind::Ghcr => self.ghcr(explicit, reference),
            RegistryKind::Ecr => self.ecr(explicit, reference).map(ResolvedCredentials::Ecr),
            RegistryKind::Acr => self.acr(explicit, reference).map(ResolvedCredentials::Acr),
            RegistryKind::Gcr | RegistryKind::ArtifactRegistry => self
                .google(kind, explicit, reference)
                .map(ResolvedCredentials::Google),
        }
    }

    fn docker_hub(
        &self,
        explicit: &ExplicitCredentials,
        reference: &ImageReference,
    ) -> Result<ResolvedCredentials, PublishError> {
        let kind = RegistryKind::DockerHub;
        let host = reference.registry_host();
        let config = &self.config.dockerhub;
        let saved = std::sync::OnceLock::new();
        let saved_login = || saved.get_or_init(|| self.platform.saved_login(host)).clone();

        let username = required(
            kind,
            "username",
            vec![
                explicit_value("--username", &explicit.username),
                self.env_value("DOCKER_USERNAME"),
                self.config_value(vars::DOCKER_HUB, "registry.dockerhub.username", &config.username),
                Strategy::new("docker login (~/.docker/config.json)", || {
                    saved_login().map(|(username, _)| username)
                }),
            ],
        )?;
        let password = required(
            kind,
            "password",
            vec![
                explicit_value("--password", &explicit.password),
                self.env_value("DOCKER_PASSWORD"),
                self.config_value(vars::DOCKER_HUB, "registry.dockerhub.password", &config.password),
                Strategy::new("docker login (~/.docker/config.json)", || {
                    saved_login().map(|(_, password)| password)
                }),
            ],
        )?;

        let server_address = if host == DOCKER_HUB_HOST {
            DOCKER_HUB_SERVER.to_string()
        } else {
            host.to_string()
        };
        Ok(ResolvedCredentials::Static {
            kind,
            credentials: Credentials::new(username, password, server_address),
        })
    }

    fn ghcr(
        &self,
        explicit: &ExplicitCredentials,
        reference: &ImageReference,
    ) -> Result<ResolvedCredentials, PublishError> {
        let kind = RegistryKind::Ghcr;
        let config = &self.config.ghcr;

        let username = required(
            kind,
            "username",
            vec![
                explicit_value("--username", &explicit.username),
                self.env_value("GHCR_USERNAME"),
                self.config_value(vars::GHCR, "registry.ghcr.username", &config.username),
                Strategy::value(
                    "image owner",
                    reference
                        .owner()
                        .filter(|_| reference.kind() == RegistryKind::Ghcr)
                        .map(String::from),
                ),
            ],
        )?;
        let token = required(
            kind,
            "token",
            vec![
                explicit_value("--password", &explicit.password),
                self.env_value("GHCR_TOKEN"),
                self.env_value("GITHUB_TOKEN"),
                self.config_value(vars::GHCR, "registry.ghcr.token", &config.token),
                Strategy::new("gh auth token", || self.platform.github_cli_token()),
            ],
        )?;

        Ok(ResolvedCredentials::Static {
            kind,
            credentials: Credentials::new(username, token, GHCR_HOST),
        })
    }

    fn ecr(
        &self,
        explicit: &ExplicitCredentials,
        reference: &ImageReference,
    ) -> Result<EcrIdentity, PublishError> {
        let kind = RegistryKind::Ecr;
        let config = &self.config.ecr;
        let host = reference.ecr_host();

        let region = required(
            kind,
            "region",
            vec![
                explicit_value("--region", &explicit.region),
                self.env_value("AWS_REGION"),
                self.env_value("AWS_DEFAULT_REGION"),
                self.config_value(vars::ECR, "registry.ecr.region", &config.region),
                Strategy::value("image host", host.as_ref().map(|h| h.region.clone())),
                Strategy::new("aws configure get region", || {
                    self.platform.aws_profile_region()
                }),
            ],
        )?;
        let account_id = optional(vec![
            explicit_value("--account-id", &explicit.account_id),
            self.env_value("AWS_ACCOUNT_ID"),
            self.config_value(vars::ECR, "registry.ecr.account_id", &config.account_id),
            Strategy::value("image host", host.map(|h| h.account_id)),
        ]);
        let repository = optional(vec![
            explicit_value("--repository", &explicit.repository),
            self.env_value("ECR_REPOSITORY"),
            self.config_value(vars::ECR, "registry.ecr.repository", &config.repository),
        ]);

        Ok(EcrIdentity {
            region,
            account_id,
            repository,
        })
    }

    fn acr(
        &self,
        explicit: &ExplicitCredentials,
        reference: &ImageReference,
    ) -> Result<AcrRegistryId, PublishError> {
        let kind = RegistryKind::Acr;
        let config = &self.config.acr;

        let subscription_id = required(
            kind,
            "subscription ID",
            vec![
                explicit_value("--subscription-id", &explicit.subscription_id),
                self.env_value("AZURE_SUBSCRIPTION_ID"),
                self.config_value(vars::ACR, "registry.acr.subscription_id", &config.subscription_id),
            ],
        )?;
        let resource_group = required(
            kind,
            "resource group",
            vec![
                explicit_value("--resource-group", &explicit.resource_group),
                self.env_value("AZURE_RESOURCE_GROUP"),
                self.config_value(vars::ACR, "registry.acr.resource_group", &config.resource_group),
            ],
        )?;
        let registry_name = required(
            kind,
            "registry name",
            vec![
                explicit_value("--registry-name", &explicit.registry_name),
                self.env_value("ACR_REGISTRY_NAME"),
                self.config_value(vars::ACR, "registry.acr.registry_name", &config.registry_name),
                Strategy::value(
                    "image host",
                    reference
                        .registry_host()
                        .strip_suffix(".azurecr.io")
                        .filter(|_| reference.kind() == RegistryKind::Acr)
                        .map(String::from),
                ),
            ],
        )?;

        Ok(AcrRegistryId {
            subscription_id,
            resource_group,
            registry_name,
        })
    }

    fn google(
        &self,
        kind: RegistryKind,
        explicit: &ExplicitCredentials,
        reference: &ImageReference,
    ) -> Result<GoogleIdentity, PublishError> {
        let config = &self.config.google;
        let from_reference = reference.kind().is_google() && reference.is_fully_qualified();

        let project_id = optional(vec![
            explicit_value("--project-id", &explicit.project_id),
            self.env_value("GOOGLE_CLOUD_PROJECT"),
            self.env_value("GCP_PROJECT_ID"),
            self.config_value(vars::GOOGLE, "registry.google.project_id", &config.project_id),
            Strategy::value(
                "image path",
                reference
                    .repository()
                    .split('/')
                    .next()
                    .filter(|_| from_reference)
                    .map(String::from),
            ),
        ]);

        let credentials_file = explicit
            .credentials_file
            .clone()
            .filter(|path| !path.as_os_str().is_empty())
            .or_else(|| {
                self.env
                    .var("GOOGLE_APPLICATION_CREDENTIALS")
                    .map(PathBuf::from)
            })
            .or_else(|| {
                self.env_group_absent(vars::GOOGLE)
                    .then(|| config.credentials_file.clone())
                    .flatten()
            });

        let region = optional(vec![
            explicit_value("--region", &explicit.region),
            self.env_value("ARTIFACT_REGISTRY_REGION"),
            self.config_value(vars::GOOGLE, "registry.google.region", &config.region),
        ])
        .unwrap_or_else(|| DEFAULT_ARTIFACT_REGION.to_string());
        let repository = optional(vec![
            explicit_value("--repository", &explicit.repository),
            self.env_value("ARTIFACT_REGISTRY_REPOSITORY"),
            self.config_value(vars::GOOGLE, "registry.google.repository", &config.repository),
        ]);

        let legacy_gcr = explicit.legacy_gcr || config.legacy_gcr || kind == RegistryKind::Gcr;
        Ok(GoogleIdentity {
            kind: if legacy_gcr {
                RegistryKind::Gcr
            } else {
                RegistryKind::ArtifactRegistry
            },
            project_id,
            credentials_file,
            region,
            repository,
            legacy_gcr,
        })
    }

    fn env_value(&self, name: &'static str) -> Strategy<'a, String> {
        let env = self.env;
        Strategy::new(format!("env {}", name), move || env.var(name))
    }

    /// Config values count only when the whole environment group is unset
    fn config_value(
        &self,
        group: &[&str],
        path: &str,
        value: &Option<String>,
    ) -> Strategy<'a, String> {
        let value = if self.env_group_absent(group) {
            non_empty(value)
        } else {
            None
        };
        Strategy::value(format!("config {}", path), value)
    }

    fn env_group_absent(&self, group: &[&str]) -> bool {
        group.iter().all(|name| self.env.var(name).is_none())
    }
}

fn explicit_value<'s>(flag: &str, value: &Option<String>) -> Strategy<'s, String> {
    Strategy::value(flag, non_empty(value))
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

fn required(
    registry: RegistryKind,
    field: &str,
    chain: Vec<Strategy<'_, String>>,
) -> Result<String, PublishError> {
    first_success(chain)
        .map(|Found { value, .. }| value)
        .map_err(|exhausted| PublishError::MissingCredentials {
            registry,
            field: field.to_string(),
            attempted: exhausted.attempted,
        })
}

fn optional(chain: Vec<Strategy<'_, String>>) -> Option<String> {
    first_success(chain).ok().map(|found| found.value)
}
