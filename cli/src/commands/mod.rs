//! Command handlers
//!
//! Each handler turns parsed CLI arguments into [`PublishOptions`], wires the
//! real adapters into a [`PublishService`] and renders the outcome.

pub mod login_check;
pub mod push;
pub mod resolve;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::TargetArgs;
use crate::config::HoistConfig;
use crate::domain::ImageReference;
use crate::infrastructure::{
    AwsCliEcr, AzureManagementClient, DockerEngine, GcpTokenSources, LocalPlatform,
};
use crate::services::{CloudClients, ExplicitCredentials, ProcessEnv, PublishOptions, PublishService};

/// Build the service against the local engine and the real cloud adapters
pub fn publish_service(config: &HoistConfig) -> Result<PublishService> {
    let engine = DockerEngine::from_env().context("Failed to configure container engine")?;
    let http = reqwest::Client::builder()
        .user_agent(concat!("hoist/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let mut google = GcpTokenSources::new(http.clone());
    let mut platform = LocalPlatform::new();
    if let Some(path) = &config.docker_config {
        google = google.with_docker_config(path);
        platform = LocalPlatform::with_docker_config(path);
    }

    let clients = CloudClients {
        ecr: Arc::new(AwsCliEcr::new()),
        acr: Arc::new(AzureManagementClient::new(http)),
        google: Arc::new(google),
    };

    Ok(PublishService::new(
        Arc::new(engine),
        clients,
        Arc::new(ProcessEnv),
        Arc::new(platform),
        config.registry.clone(),
    ))
}

/// Options shared by every command; push-only fields keep their defaults
pub fn publish_options(
    image: Option<String>,
    target: TargetArgs,
    config: &HoistConfig,
) -> Result<PublishOptions> {
    let raw = image.or_else(|| config.image.reference()).context(
        "No image given. Pass one on the command line or set image.name in hoist.yaml",
    )?;
    let image = ImageReference::parse(&raw)?;

    let mut options = PublishOptions::new(image);
    options.registry = target.registry.map(Into::into);
    options.explicit = ExplicitCredentials {
        username: target.username,
        password: target.password,
        region: target.region,
        repository: target.repository,
        account_id: target.account_id,
        subscription_id: target.subscription_id,
        resource_group: target.resource_group,
        registry_name: target.registry_name,
        project_id: target.project_id,
        credentials_file: target.credentials_file,
        legacy_gcr: target.legacy_gcr,
    };
    options.delete_after_push = config.push.delete_after_push;
    options.timeout = config.push.timeout;
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RegistryArg;
    use crate::domain::RegistryKind;
    use std::time::Duration;

    #[test]
    fn test_image_falls_back_to_config() {
        let config = HoistConfig::from_yaml("image:\n  name: myapp\n  tag: v2\npush:\n  timeout: 30s\n")
            .unwrap();
        let options = publish_options(None, TargetArgs::default(), &config).unwrap();
        assert_eq!(options.image.to_string(), "myapp:v2");
        assert_eq!(options.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let err = publish_options(None, TargetArgs::default(), &HoistConfig::default()).unwrap_err();
        assert!(err.to_string().contains("No image given"));
    }

    #[test]
    fn test_target_args_become_explicit_credentials() {
        let target = TargetArgs {
            registry: Some(RegistryArg::Acr),
            subscription_id: Some("sub".to_string()),
            legacy_gcr: true,
            ..TargetArgs::default()
        };
        let options =
            publish_options(Some("app:v1".to_string()), target, &HoistConfig::default()).unwrap();
        assert_eq!(options.registry, Some(RegistryKind::Acr));
        assert_eq!(options.explicit.subscription_id.as_deref(), Some("sub"));
        assert!(options.explicit.legacy_gcr);
    }
}
