//! Registry authenticators
//!
//! One implementation per registry family, all converging on an
//! [`AuthToken`] for the engine push call.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::FutureExt;
use tracing::{debug, info};

use crate::domain::fallback::{first_success_async, AsyncStrategy};
use crate::domain::reference::GHCR_HOST;
use crate::domain::{AuthToken, Credentials, ImageReference, RegistryKind};
use crate::error::PublishError;
use crate::infrastructure::{AcrApi, AcrRegistryId, EcrApi, GoogleTokenSources};

use super::credentials::ResolvedCredentials;

#[async_trait]
pub trait RegistryAuthenticator: Send + Sync {
    /// Produce the auth token for pushing `reference`
    async fn resolve(&self, reference: &ImageReference) -> Result<AuthToken, PublishError>;
}

/// Cloud API clients shared by the authenticators
#[derive(Clone)]
pub struct CloudClients {
    pub ecr: Arc<dyn EcrApi>,
    pub acr: Arc<dyn AcrApi>,
    pub google: Arc<dyn GoogleTokenSources>,
}

/// Pick the authenticator for a resolved credential set
pub fn authenticator_for(
    resolved: &ResolvedCredentials,
    clients: &CloudClients,
) -> Box<dyn RegistryAuthenticator> {
    match resolved {
        ResolvedCredentials::Static { kind, credentials } => Box::new(StaticAuthenticator {
            kind: *kind,
            credentials: credentials.clone(),
        }),
        ResolvedCredentials::Ecr(_) => Box::new(EcrAuthenticator {
            api: clients.ecr.clone(),
        }),
        ResolvedCredentials::Acr(id) => Box::new(AcrAuthenticator {
            api: clients.acr.clone(),
            registry: id.clone(),
        }),
        ResolvedCredentials::Google(identity) => Box::new(GoogleAuthenticator {
            sources: clients.google.clone(),
            kind: identity.kind,
            credentials_file: identity.credentials_file.clone(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Docker Hub / GHCR
// ---------------------------------------------------------------------------

/// Username/secret pair already resolved by the cascade
pub struct StaticAuthenticator {
    kind: RegistryKind,
    credentials: Credentials,
}

#[async_trait]
impl RegistryAuthenticator for StaticAuthenticator {
    async fn resolve(&self, reference: &ImageReference) -> Result<AuthToken, PublishError> {
        if self.kind == RegistryKind::Ghcr && reference.registry_host() != GHCR_HOST {
            return Err(PublishError::invalid_reference(
                reference.to_string(),
                "GHCR targets must begin with ghcr.io/",
            ));
        }
        Ok(AuthToken::encode(&self.credentials))
    }
}

// ---------------------------------------------------------------------------
// ECR
// ---------------------------------------------------------------------------

/// Ensures the repository exists, then exchanges for a short-lived token
pub struct EcrAuthenticator {
    api: Arc<dyn EcrApi>,
}

#[async_trait]
impl RegistryAuthenticator for EcrAuthenticator {
    async fn resolve(&self, reference: &ImageReference) -> Result<AuthToken, PublishError> {
        let host = reference.ecr_host().ok_or_else(|| {
            PublishError::invalid_reference(reference.to_string(), "not an ECR reference")
        })?;
        let repository = reference.repository();

        if !self.api.repository_exists(&host, repository).await? {
            info!(repository, region = %host.region, "Creating ECR repository");
            self.api.create_repository(&host, repository).await?;
        }

        let authorization = self.api.authorization_token(&host).await?;
        let (username, password) = decode_ecr_token(&authorization.token)?;
        debug!(endpoint = %authorization.proxy_endpoint, "Obtained ECR authorization token");

        Ok(AuthToken::encode(&Credentials::new(
            username,
            password,
            authorization.proxy_endpoint,
        )))
    }
}

fn decode_ecr_token(token: &str) -> Result<(String, String), PublishError> {
    let decoded = STANDARD
        .decode(token.trim())
        .map_err(|e| PublishError::cloud_api("ECR", format!("authorization token is not base64: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| PublishError::cloud_api("ECR", "authorization token is not UTF-8"))?;
    match decoded.split_once(':') {
        Some((username, password)) if !username.is_empty() && !password.is_empty() => {
            Ok((username.to_string(), password.to_string()))
        }
        _ => Err(PublishError::cloud_api(
            "ECR",
            "authorization token is not a user:password pair",
        )),
    }
}

// ---------------------------------------------------------------------------
// ACR
// ---------------------------------------------------------------------------

/// Reads the registry admin credentials through the management API
pub struct AcrAuthenticator {
    api: Arc<dyn AcrApi>,
    registry: AcrRegistryId,
}

#[async_trait]
impl RegistryAuthenticator for AcrAuthenticator {
    async fn resolve(&self, reference: &ImageReference) -> Result<AuthToken, PublishError> {
        let registry = self.api.get_registry(&self.registry).await?;
        if !registry.admin_user_enabled {
            return Err(PublishError::RegistryCredentialsUnavailable {
                registry: RegistryKind::Acr,
                reason: format!(
                    "admin user is disabled on registry '{}'",
                    self.registry.registry_name
                ),
            });
        }
        if !registry.login_server.eq_ignore_ascii_case(reference.registry_host()) {
            return Err(PublishError::invalid_reference(
                reference.to_string(),
                format!(
                    "registry '{}' serves {}, not {}",
                    self.registry.registry_name,
                    registry.login_server,
                    reference.registry_host()
                ),
            ));
        }

        let credentials = self.api.list_credentials(&self.registry).await?;
        let password = credentials
            .passwords
            .into_iter()
            .map(|p| p.value)
            .find(|value| !value.is_empty())
            .ok_or_else(|| PublishError::RegistryCredentialsUnavailable {
                registry: RegistryKind::Acr,
                reason: format!(
                    "no password returned for registry '{}'",
                    self.registry.registry_name
                ),
            })?;

        Ok(AuthToken::encode(&Credentials::new(
            credentials.username,
            password,
            registry.login_server,
        )))
    }
}

// ---------------------------------------------------------------------------
// GCR / Artifact Registry
// ---------------------------------------------------------------------------

/// Tries every Google token source in order
pub struct GoogleAuthenticator {
    sources: Arc<dyn GoogleTokenSources>,
    kind: RegistryKind,
    credentials_file: Option<PathBuf>,
}

#[async_trait]
impl RegistryAuthenticator for GoogleAuthenticator {
    async fn resolve(&self, reference: &ImageReference) -> Result<AuthToken, PublishError> {
        let host = reference.registry_host();
        let server = format!("https://{}", host);
        let sources = self.sources.as_ref();
        let key_file = self.credentials_file.as_deref();

        let found = first_success_async(vec![
            AsyncStrategy::new(
                "cached registry auth (~/.docker/config.json)",
                async move {
                    sources
                        .cached_registry_auth(host)
                        .await
                        .map(|(username, secret)| Credentials::new(username, secret, host))
                }
                .boxed(),
            ),
            AsyncStrategy::new(
                "gcloud auth print-access-token",
                async move { sources.cli_access_token().await }
                    .map(move |token| token.map(|t| Credentials::oauth2(t, host)))
                    .boxed(),
            ),
            AsyncStrategy::new(
                "service account key (GOOGLE_APPLICATION_CREDENTIALS)",
                async move {
                    match key_file {
                        Some(path) => sources.service_account_token(path).await,
                        None => None,
                    }
                }
                .map(move |token| token.map(|t| Credentials::oauth2(t, host)))
                .boxed(),
            ),
            AsyncStrategy::new(
                "application default credentials",
                async move { sources.default_credentials_token().await }
                    .map(move |token| token.map(|t| Credentials::oauth2(t, host)))
                    .boxed(),
            ),
        ])
        .await
        .map_err(|exhausted| PublishError::AuthenticationUnavailable {
            registry: self.kind,
            attempted: exhausted.attempted,
        })?;

        info!(registry = %self.kind, source = %found.source, "Authenticated");
        let credentials = Credentials {
            server_address: server,
            ..found.value
        };
        Ok(AuthToken::encode(&credentials))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credentials::OAUTH2_USERNAME;
    use crate::services::credentials::{EcrIdentity, GoogleIdentity};
    use crate::services::testing::{FakeAcr, FakeEcr, FakeGoogle};
    use std::sync::atomic::Ordering;

    fn reference(raw: &str) -> ImageReference {
        ImageReference::parse(raw).unwrap()
    }

    fn clients(ecr: Arc<FakeEcr>, acr: Arc<FakeAcr>, google: Arc<FakeGoogle>) -> CloudClients {
        CloudClients { ecr, acr, google }
    }

    fn google_identity(credentials_file: Option<&str>) -> ResolvedCredentials {
        ResolvedCredentials::Google(GoogleIdentity {
            kind: RegistryKind::ArtifactRegistry,
            project_id: Some("proj".to_string()),
            credentials_file: credentials_file.map(PathBuf::from),
            region: "us".to_string(),
            repository: Some("images".to_string()),
            legacy_gcr: false,
        })
    }

    #[tokio::test]
    async fn test_static_ghcr_requires_ghcr_host() {
        let auth = StaticAuthenticator {
            kind: RegistryKind::Ghcr,
            credentials: Credentials::new("acme", "ghp_x", GHCR_HOST),
        };
        let token = auth.resolve(&reference("ghcr.io/acme/app:v1")).await.unwrap();
        assert_eq!(token.decode().unwrap().username, "acme");

        let err = auth.resolve(&reference("quay.io/acme/app")).await.unwrap_err();
        assert!(matches!(err, PublishError::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn test_ecr_creates_missing_repository() {
        let ecr = Arc::new(FakeEcr::new(false, &STANDARD.encode("AWS:short-lived")));
        let clients = clients(ecr.clone(), Arc::default(), Arc::default());
        let resolved = ResolvedCredentials::Ecr(EcrIdentity {
            region: "us-east-1".to_string(),
            account_id: Some("123456789012".to_string()),
            repository: Some("myrepo".to_string()),
        });

        let token = authenticator_for(&resolved, &clients)
            .resolve(&reference("123456789012.dkr.ecr.us-east-1.amazonaws.com/myrepo:v1"))
            .await
            .unwrap();

        assert_eq!(ecr.created(), vec!["myrepo".to_string()]);
        let credentials = token.decode().unwrap();
        assert_eq!(credentials.username, "AWS");
        assert_eq!(credentials.secret, "short-lived");
        assert_eq!(
            credentials.server_address,
            "https://123456789012.dkr.ecr.us-east-1.amazonaws.com"
        );
    }

    #[tokio::test]
    async fn test_ecr_existing_repository_is_not_recreated() {
        let ecr = Arc::new(FakeEcr::new(true, &STANDARD.encode("AWS:pw")));
        let auth = EcrAuthenticator { api: ecr.clone() };
        auth.resolve(&reference("123456789012.dkr.ecr.us-east-1.amazonaws.com/app"))
            .await
            .unwrap();
        assert!(ecr.created().is_empty());
    }

    #[test]
    fn test_decode_ecr_token_rejects_garbage() {
        assert!(decode_ecr_token("%%%").is_err());
        assert!(decode_ecr_token(&STANDARD.encode("no-colon")).is_err());
        assert_eq!(
            decode_ecr_token(&STANDARD.encode("AWS:a:b")).unwrap(),
            ("AWS".to_string(), "a:b".to_string())
        );
    }

    #[tokio::test]
    async fn test_acr_admin_disabled() {
        let acr = Arc::new(FakeAcr {
            admin_user_enabled: false,
            ..FakeAcr::default()
        });
        let auth = AcrAuthenticator {
            api: acr,
            registry: AcrRegistryId {
                subscription_id: "sub".to_string(),
                resource_group: "rg".to_string(),
                registry_name: "myreg".to_string(),
            },
        };
        let err = auth.resolve(&reference("myreg.azurecr.io/app")).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::RegistryCredentialsUnavailable { registry: RegistryKind::Acr, .. }
        ));
    }

    #[tokio::test]
    async fn test_acr_uses_first_password() {
        let acr = Arc::new(FakeAcr::default());
        let auth = AcrAuthenticator {
            api: acr,
            registry: AcrRegistryId {
                subscription_id: "sub".to_string(),
                resource_group: "rg".to_string(),
                registry_name: "myreg".to_string(),
            },
        };
        let credentials = auth
            .resolve(&reference("myreg.azurecr.io/app"))
            .await
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(credentials.username, "myreg");
        assert_eq!(credentials.secret, "admin-pw");
        assert_eq!(credentials.server_address, "myreg.azurecr.io");
    }

    #[tokio::test]
    async fn test_acr_login_server_must_match_image_host() {
        let acr = Arc::new(FakeAcr::default());
        let auth = AcrAuthenticator {
            api: acr.clone(),
            registry: AcrRegistryId {
                subscription_id: "sub".to_string(),
                resource_group: "rg".to_string(),
                registry_name: "myreg".to_string(),
            },
        };
        let err = auth.resolve(&reference("otherreg.azurecr.io/app")).await.unwrap_err();
        assert!(matches!(err, PublishError::InvalidReference { .. }));
        // Admin credentials were never listed
        assert_eq!(acr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acr_without_passwords() {
        let acr = Arc::new(FakeAcr {
            passwords: vec![],
            ..FakeAcr::default()
        });
        let auth = AcrAuthenticator {
            api: acr,
            registry: AcrRegistryId {
                subscription_id: "sub".to_string(),
                resource_group: "rg".to_string(),
                registry_name: "myreg".to_string(),
            },
        };
        let err = auth.resolve(&reference("myreg.azurecr.io/app")).await.unwrap_err();
        assert!(err.to_string().contains("no password"));
    }

    #[tokio::test]
    async fn test_google_prefers_cached_auth() {
        let google = Arc::new(FakeGoogle {
            cached: Some(("oauth2accesstoken".to_string(), "cached".to_string())),
            cli: Some("from-cli".to_string()),
            ..FakeGoogle::default()
        });
        let clients = clients(Arc::default(), Arc::default(), google.clone());
        let token = authenticator_for(&google_identity(None), &clients)
            .resolve(&reference("us-docker.pkg.dev/proj/images/app:v1"))
            .await
            .unwrap();
        let credentials = token.decode().unwrap();
        assert_eq!(credentials.secret, "cached");
        assert_eq!(credentials.server_address, "https://us-docker.pkg.dev");
        assert_eq!(google.cli_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_google_service_account_key() {
        let google = Arc::new(FakeGoogle {
            key_token: Some("from-key".to_string()),
            ..FakeGoogle::default()
        });
        let clients = clients(Arc::default(), Arc::default(), google.clone());
        let credentials = authenticator_for(&google_identity(Some("/keys/sa.json")), &clients)
            .resolve(&reference("gcr.io/proj/app"))
            .await
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(credentials.username, OAUTH2_USERNAME);
        assert_eq!(credentials.secret, "from-key");
        assert_eq!(google.default_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_google_key_source_skipped_without_file() {
        let google = Arc::new(FakeGoogle {
            key_token: Some("from-key".to_string()),
            ..FakeGoogle::default()
        });
        let clients = clients(Arc::default(), Arc::default(), google);
        let err = authenticator_for(&google_identity(None), &clients)
            .resolve(&reference("gcr.io/proj/app"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::AuthenticationUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_google_exhausted_chain_lists_all_sources() {
        let clients = clients(Arc::default(), Arc::default(), Arc::default());
        let err = authenticator_for(&google_identity(Some("/keys/sa.json")), &clients)
            .resolve(&reference("gcr.io/proj/app"))
            .await
            .unwrap_err();
        match err {
            PublishError::AuthenticationUnavailable {
                registry,
                attempted,
            } => {
                assert_eq!(registry, RegistryKind::ArtifactRegistry);
                assert_eq!(attempted.len(), 4);
                assert_eq!(attempted[0], "cached registry auth (~/.docker/config.json)");
                assert_eq!(attempted[3], "application default credentials");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
