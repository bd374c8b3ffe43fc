//! Image reference domain types
//!
//! Parses user-supplied image strings into a normalized [`ImageReference`],
//! detects which registry family a host belongs to, and builds the
//! fully-qualified push target for short names.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::PublishError;

/// Tag used when the input names none
pub const DEFAULT_TAG: &str = "latest";

pub const DOCKER_HUB_HOST: &str = "docker.io";
pub const GHCR_HOST: &str = "ghcr.io";
pub const LEGACY_GCR_HOST: &str = "gcr.io";

/// Supported container registry families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryKind {
    /// Docker Hub and any other registry that takes static username/password
    DockerHub,
    /// AWS Elastic Container Registry
    Ecr,
    /// Azure Container Registry
    Acr,
    /// Legacy Google Container Registry (gcr.io)
    Gcr,
    /// Google Artifact Registry (*.pkg.dev)
    ArtifactRegistry,
    /// GitHub Container Registry
    Ghcr,
}

impl RegistryKind {
    /// Whether authentication goes through Google identity rather than a secret
    pub fn is_google(&self) -> bool {
        matches!(self, Self::Gcr | Self::ArtifactRegistry)
    }

    /// Detect the registry family from a registry host
    pub fn detect(host: &str) -> Self {
        if host == GHCR_HOST {
            Self::Ghcr
        } else if host.contains(".pkg.dev") {
            Self::ArtifactRegistry
        } else if host.contains(LEGACY_GCR_HOST) {
            Self::Gcr
        } else if host.contains("dkr.ecr.") {
            Self::Ecr
        } else if host.ends_with(".azurecr.io") {
            Self::Acr
        } else {
            Self::DockerHub
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DockerHub => "Docker Hub",
            Self::Ecr => "ECR",
            Self::Acr => "ACR",
            Self::Gcr => "GCR",
            Self::ArtifactRegistry => "Artifact Registry",
            Self::Ghcr => "GHCR",
        };
        f.write_str(label)
    }
}

/// Account and region decomposed from an ECR registry host
///
/// Only the standard commercial partition is accepted:
/// `<account>.dkr.ecr.<region>.amazonaws.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcrHost {
    pub account_id: String,
    pub region: String,
}

impl EcrHost {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
        }
    }

    pub fn parse(host: &str) -> Result<Self, PublishError> {
        let parts: Vec<&str> = host.split('.').collect();
        if parts.len() < 6 {
            return Err(PublishError::invalid_reference(
                host,
                "ECR host must look like <account>.dkr.ecr.<region>.amazonaws.com",
            ));
        }
        if parts.len() != 6 || parts[1..3] != ["dkr", "ecr"] || parts[4..] != ["amazonaws", "com"]
        {
            return Err(PublishError::invalid_reference(
                host,
                "only the standard amazonaws.com ECR partition is supported",
            ));
        }

        let account_id = parts[0];
        let region = parts[3];
        if account_id.is_empty() || region.is_empty() {
            return Err(PublishError::invalid_reference(
                host,
                "ECR host is missing the account ID or region",
            ));
        }
        if !account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(PublishError::invalid_reference(
                host,
                "ECR account ID must be numeric",
            ));
        }

        Ok(Self::new(account_id, region))
    }

    pub fn host(&self) -> String {
        format!("{}.dkr.ecr.{}.amazonaws.com", self.account_id, self.region)
    }
}

/// Normalized image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    registry_host: String,
    repository: String,
    tag: String,
    kind: RegistryKind,
    /// False when the input carried no host and Docker Hub was implied
    explicit_host: bool,
}

impl ImageReference {
    /// Parse a raw image string
    ///
    /// Accepts `name`, `name:tag`, `owner/name:tag` and `host[:port]/path:tag`.
    pub fn parse(raw: &str) -> Result<Self, PublishError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PublishError::invalid_reference(raw, "image reference is empty"));
        }
        if raw.contains('@') {
            return Err(PublishError::invalid_reference(
                raw,
                "digest references cannot be used as push targets",
            ));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(PublishError::invalid_reference(raw, "contains whitespace"));
        }

        let (name, tag) = split_tag(raw);
        let tag = match tag {
            Some("") => return Err(PublishError::invalid_reference(raw, "tag is empty")),
            Some(tag) => tag,
            None => DEFAULT_TAG,
        };
        validate_tag(raw, tag)?;

        let (host, repository) = split_host(name);
        validate_repository(raw, repository)?;

        let reference = match host {
            Some(host) => {
                let kind = RegistryKind::detect(host);
                match kind {
                    RegistryKind::Ghcr if repository.split('/').count() < 2 => {
                        return Err(PublishError::invalid_reference(
                            raw,
                            "GHCR images must be ghcr.io/<owner>/<repository>",
                        ));
                    }
                    RegistryKind::Ecr => {
                        EcrHost::parse(host)?;
                    }
                    _ => {}
                }
                Self {
                    registry_host: host.to_string(),
                    repository: repository.to_string(),
                    tag: tag.to_string(),
                    kind,
                    explicit_host: true,
                }
            }
            None => Self {
                registry_host: DOCKER_HUB_HOST.to_string(),
                repository: repository.to_string(),
                tag: tag.to_string(),
                kind: RegistryKind::DockerHub,
                explicit_host: false,
            },
        };

        Ok(reference)
    }

    /// Build a reference from already-validated parts
    fn qualified(
        host: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self, PublishError> {
        let host = host.into();
        let repository = repository.into();
        let tag = tag.into();
        Self::parse(&format!("{}/{}:{}", host, repository, tag))
    }

    pub fn registry_host(&self) -> &str {
        &self.registry_host
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn kind(&self) -> RegistryKind {
        self.kind
    }

    /// Whether the input named its registry host
    pub fn is_fully_qualified(&self) -> bool {
        self.explicit_host
    }

    /// ECR account and region, when this is an ECR reference
    pub fn ecr_host(&self) -> Option<EcrHost> {
        match self.kind {
            RegistryKind::Ecr => EcrHost::parse(&self.registry_host).ok(),
            _ => None,
        }
    }

    /// First path segment (GHCR owner, GCR project, Docker Hub namespace)
    pub fn owner(&self) -> Option<&str> {
        let mut segments = self.repository.split('/');
        let first = segments.next()?;
        segments.next().map(|_| first)
    }

    /// Reference without the tag, as the engine expects for `repo` parameters
    pub fn name(&self) -> String {
        if self.explicit_host {
            format!("{}/{}", self.registry_host, self.repository)
        } else {
            self.repository.clone()
        }
    }

    /// Return a copy with a different tag
    pub fn with_tag(&self, tag: &str) -> Result<Self, PublishError> {
        validate_tag(&self.to_string(), tag)?;
        Ok(Self {
            tag: tag.to_string(),
            ..self.clone()
        })
    }

    /// Build the fully-qualified push target for this (local) reference
    ///
    /// Fully-qualified references are returned unchanged. Short names are
    /// placed under the registry described by `target`.
    pub fn resolve_target(&self, target: &TargetSpec) -> Result<Self, PublishError> {
        if self.explicit_host {
            return Ok(self.clone());
        }

        match target {
            TargetSpec::DockerHub => Ok(self.clone()),
            TargetSpec::Ghcr => Err(PublishError::invalid_reference(
                self.to_string(),
                "GHCR targets must begin with ghcr.io/<owner>/",
            )),
            TargetSpec::Ecr { host, repository } => {
                let repository = repository.as_deref().unwrap_or(&self.repository);
                Self::qualified(host.host(), repository, &self.tag)
            }
            TargetSpec::Acr { registry_name } => Self::qualified(
                format!("{}.azurecr.io", registry_name.to_lowercase()),
                &self.repository,
                &self.tag,
            ),
            TargetSpec::Google {
                project_id,
                legacy_gcr,
                region,
                repository,
            } => {
                let project_id = project_id.as_deref().ok_or_else(|| {
                    PublishError::MissingCredentials {
                        registry: if *legacy_gcr {
                            RegistryKind::Gcr
                        } else {
                            RegistryKind::ArtifactRegistry
                        },
                        field: "project ID".to_string(),
                        attempted: vec![
                            "--project-id".to_string(),
                            "env GOOGLE_CLOUD_PROJECT".to_string(),
                            "config registry.google.project_id".to_string(),
                        ],
                    }
                })?;
                if *legacy_gcr {
                    Self::qualified(
                        LEGACY_GCR_HOST,
                        format!("{}/{}", project_id, self.repository),
                        &self.tag,
                    )
                } else {
                    Self::qualified(
                        format!("{}-docker.pkg.dev", region),
                        format!("{}/{}/{}", project_id, repository, self.repository),
                        &self.tag,
                    )
                }
            }
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name(), self.tag)
    }
}

impl FromStr for ImageReference {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ImageReference {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where a short image name should be published
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    DockerHub,
    Ghcr,
    Ecr {
        host: EcrHost,
        repository: Option<String>,
    },
    Acr {
        registry_name: String,
    },
    Google {
        project_id: Option<String>,
        legacy_gcr: bool,
        region: String,
        repository: String,
    },
}

/// Split `name[:tag]`, ignoring a `:` that belongs to a host port
fn split_tag(raw: &str) -> (&str, Option<&str>) {
    let last_segment_start = raw.rfind('/').map(|i| i + 1).unwrap_or(0);
    match raw[last_segment_start..].rfind(':') {
        Some(offset) => {
            let colon = last_segment_start + offset;
            (&raw[..colon], Some(&raw[colon + 1..]))
        }
        None => (raw, None),
    }
}

/// Split `host/path` when the first segment looks like a registry host
fn split_host(name: &str) -> (Option<&str>, &str) {
    match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (Some(first), rest)
        }
        _ => (None, name),
    }
}

fn validate_tag(raw: &str, tag: &str) -> Result<(), PublishError> {
    if tag.len() > 128 {
        return Err(PublishError::invalid_reference(raw, "tag is longer than 128 characters"));
    }
    let valid = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if tag.is_empty() || !valid || tag.starts_with(['.', '-']) {
        return Err(PublishError::invalid_reference(
            raw,
            format!("invalid tag '{}'", tag),
        ));
    }
    Ok(())
}

fn validate_repository(raw: &str, repository: &str) -> Result<(), PublishError> {
    if repository.is_empty() {
        return Err(PublishError::invalid_reference(raw, "repository is empty"));
    }
    for segment in repository.split('/') {
        if segment.is_empty() {
            return Err(PublishError::invalid_reference(
                raw,
                "repository contains an empty path segment",
            ));
        }
        let valid = segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(PublishError::invalid_reference(
                raw,
                format!(
                    "repository segment '{}' must be lowercase letters, digits, '.', '_' or '-'",
                    segment
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ecr_target(repository: Option<&str>) -> TargetSpec {
        TargetSpec::Ecr {
            host: EcrHost::new("123456789012", "us-east-1"),
            repository: repository.map(String::from),
        }
    }

    #[test]
    fn test_round_trip_inserts_default_tag() {
        for (input, expected) in [
            ("myapp", "myapp:latest"),
            ("myapp:v1", "myapp:v1"),
            ("acme/myapp:v1", "acme/myapp:v1"),
            ("registry.example.com/myapp:v1", "registry.example.com/myapp:v1"),
            ("registry.example.com/myapp", "registry.example.com/myapp:latest"),
            ("localhost:5000/myapp", "localhost:5000/myapp:latest"),
            ("localhost:5000/myapp:2.0", "localhost:5000/myapp:2.0"),
        ] {
            let reference = ImageReference::parse(input).unwrap();
            assert_eq!(reference.to_string(), expected, "input {}", input);
            let reparsed = ImageReference::parse(&reference.to_string()).unwrap();
            assert_eq!(reparsed, reference);
        }
    }

    #[test]
    fn test_short_name_is_docker_hub() {
        let reference = ImageReference::parse("myapp:v1").unwrap();
        assert_eq!(reference.kind(), RegistryKind::DockerHub);
        assert_eq!(reference.registry_host(), DOCKER_HUB_HOST);
        assert_eq!(reference.repository(), "myapp");
        assert_eq!(reference.tag(), "v1");
        assert!(!reference.is_fully_qualified());
    }

    #[test]
    fn test_registry_kind_detection() {
        let cases = [
            ("ghcr.io/acme/app:v1", RegistryKind::Ghcr),
            ("us-docker.pkg.dev/proj/repo/app", RegistryKind::ArtifactRegistry),
            ("gcr.io/proj/app", RegistryKind::Gcr),
            ("eu.gcr.io/proj/app", RegistryKind::Gcr),
            ("123456789012.dkr.ecr.eu-west-1.amazonaws.com/app", RegistryKind::Ecr),
            ("myreg.azurecr.io/app", RegistryKind::Acr),
            ("quay.io/acme/app", RegistryKind::DockerHub),
        ];
        for (input, kind) in cases {
            assert_eq!(ImageReference::parse(input).unwrap().kind(), kind, "{}", input);
        }
    }

    #[test]
    fn test_ghcr_requires_owner_and_repo() {
        let err = ImageReference::parse("ghcr.io/acme").unwrap_err();
        assert!(matches!(err, PublishError::InvalidReference { .. }));
        assert!(ImageReference::parse("ghcr.io/acme/app").is_ok());
    }

    #[test]
    fn test_ecr_host_needs_six_parts() {
        for host in [
            "dkr.ecr.us-east-1.amazonaws.com",
            "123.dkr.ecr.amazonaws.com",
            "ecr.us-east-1.amazonaws.com",
        ] {
            assert!(
                matches!(
                    EcrHost::parse(host),
                    Err(PublishError::InvalidReference { .. })
                ),
                "{}",
                host
            );
        }
    }

    #[test]
    fn test_ecr_shaped_reference_without_account_is_invalid() {
        for raw in [
            "dkr.ecr.us-east-1.amazonaws.com/app:v1",
            "abc.dkr.ecr.us-east-1.amazonaws.com/app",
        ] {
            assert!(
                matches!(
                    ImageReference::parse(raw),
                    Err(PublishError::InvalidReference { .. })
                ),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_ecr_host_round_trip() {
        let host = "123456789012.dkr.ecr.us-east-1.amazonaws.com";
        let parsed = EcrHost::parse(host).unwrap();
        assert_eq!(parsed.account_id, "123456789012");
        assert_eq!(parsed.region, "us-east-1");
        assert_eq!(parsed.host(), host);
    }

    #[test]
    fn test_ecr_rejects_other_partitions() {
        let err = EcrHost::parse("123456789012.dkr.ecr.cn-north-1.amazonaws.com.cn").unwrap_err();
        assert!(err.to_string().contains("partition"));
        assert!(ImageReference::parse("123456789012.dkr.ecr.cn-north-1.amazonaws.com.cn/app").is_err());
    }

    #[test]
    fn test_ecr_short_name_target() {
        let local = ImageReference::parse("myapp:v1").unwrap();
        let target = local.resolve_target(&ecr_target(Some("myrepo"))).unwrap();
        assert_eq!(
            target.to_string(),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/myrepo:v1"
        );
        assert_eq!(target.kind(), RegistryKind::Ecr);
        assert_eq!(target.ecr_host().unwrap().region, "us-east-1");
    }

    #[test]
    fn test_ecr_repository_defaults_to_image_name() {
        let local = ImageReference::parse("myapp").unwrap();
        let target = local.resolve_target(&ecr_target(None)).unwrap();
        assert_eq!(
            target.to_string(),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/myapp:latest"
        );
    }

    #[test]
    fn test_google_short_names() {
        let local = ImageReference::parse("myapp:v2").unwrap();
        let legacy = TargetSpec::Google {
            project_id: Some("my-proj".to_string()),
            legacy_gcr: true,
            region: "us".to_string(),
            repository: "images".to_string(),
        };
        assert_eq!(
            local.resolve_target(&legacy).unwrap().to_string(),
            "gcr.io/my-proj/myapp:v2"
        );

        let artifact = TargetSpec::Google {
            project_id: Some("my-proj".to_string()),
            legacy_gcr: false,
            region: "europe-west1".to_string(),
            repository: "images".to_string(),
        };
        let target = local.resolve_target(&artifact).unwrap();
        assert_eq!(
            target.to_string(),
            "europe-west1-docker.pkg.dev/my-proj/images/myapp:v2"
        );
        assert_eq!(target.kind(), RegistryKind::ArtifactRegistry);
    }

    #[test]
    fn test_google_short_name_requires_project() {
        let local = ImageReference::parse("myapp").unwrap();
        let spec = TargetSpec::Google {
            project_id: None,
            legacy_gcr: true,
            region: "us".to_string(),
            repository: "images".to_string(),
        };
        assert!(matches!(
            local.resolve_target(&spec),
            Err(PublishError::MissingCredentials { .. })
        ));
    }

    #[test]
    fn test_fully_qualified_target_is_unchanged() {
        let local = ImageReference::parse("ghcr.io/acme/app").unwrap();
        let target = local.resolve_target(&ecr_target(Some("other"))).unwrap();
        assert_eq!(target.to_string(), "ghcr.io/acme/app:latest");
    }

    #[test]
    fn test_ghcr_short_name_is_rejected() {
        let local = ImageReference::parse("myapp").unwrap();
        assert!(matches!(
            local.resolve_target(&TargetSpec::Ghcr),
            Err(PublishError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_acr_short_name_target() {
        let local = ImageReference::parse("myapp:v1").unwrap();
        let spec = TargetSpec::Acr {
            registry_name: "MyRegistry".to_string(),
        };
        let target = local.resolve_target(&spec).unwrap();
        assert_eq!(target.to_string(), "myregistry.azurecr.io/myapp:v1");
        assert_eq!(target.kind(), RegistryKind::Acr);
    }

    #[test]
    fn test_invalid_references() {
        for input in ["", "myapp:", "MyApp", "my app", "myapp@sha256:abc", "acme//app", "host.io/"] {
            assert!(
                matches!(
                    ImageReference::parse(input),
                    Err(PublishError::InvalidReference { .. })
                ),
                "{:?}",
                input
            );
        }
    }

    #[test]
    fn test_owner() {
        assert_eq!(
            ImageReference::parse("ghcr.io/acme/app").unwrap().owner(),
            Some("acme")
        );
        assert_eq!(ImageReference::parse("app").unwrap().owner(), None);
    }
}
