//! In-memory fakes for the adapter traits

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::domain::{AuthToken, EcrHost, ImageReference};
use crate::error::{EngineError, PublishError};
use crate::infrastructure::acr::{AcrCredentials, AcrPassword, AcrRegistry};
use crate::infrastructure::docker::ImageInfo;
use crate::infrastructure::{
    AcrApi, AcrRegistryId, EcrApi, EcrAuthorization, GoogleTokenSources, ImageEngine,
    PlatformCredentials, PushStream,
};

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Records every call and replays canned push chunks
#[derive(Default)]
pub struct FakeEngine {
    pub missing_image: bool,
    pub tag_error: Option<String>,
    pub remove_error: Option<String>,
    pub chunks: Vec<String>,
    /// Added before the push stream is returned
    pub delay: Duration,
    pub log: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn with_chunks<S: Into<String>>(chunks: impl IntoIterator<Item = S>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn push_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with("push "))
            .count()
    }

    fn record(&self, call: String) {
        self.log.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ImageEngine for FakeEngine {
    async fn inspect(&self, image: &str) -> Result<ImageInfo, EngineError> {
        self.record(format!("inspect {}", image));
        if self.missing_image {
            return Err(EngineError::ImageNotFound {
                reference: image.to_string(),
            });
        }
        Ok(ImageInfo {
            id: "sha256:0123".to_string(),
            repo_tags: vec![image.to_string()],
        })
    }

    async fn tag(&self, source: &str, target: &ImageReference) -> Result<(), EngineError> {
        self.record(format!("tag {} {}", source, target));
        match &self.tag_error {
            Some(message) => Err(EngineError::Status {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn push(
        &self,
        target: &ImageReference,
        _auth: &AuthToken,
    ) -> Result<PushStream, EngineError> {
        self.record(format!("push {}", target));
        tokio::time::sleep(self.delay).await;
        let chunks: Vec<Result<Bytes, EngineError>> = self
            .chunks
            .iter()
            .map(|chunk| Ok(Bytes::from(chunk.clone())))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn remove(&self, image: &str) -> Result<(), EngineError> {
        self.record(format!("remove {}", image));
        match &self.remove_error {
            Some(message) => Err(EngineError::Status {
                status: 409,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Cloud APIs
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeEcr {
    pub exists: bool,
    pub token: String,
    pub calls: AtomicUsize,
    /// Added to the caller identity lookup
    pub delay: Duration,
    pub created: Mutex<Vec<String>>,
}

impl FakeEcr {
    pub fn new(exists: bool, token: &str) -> Self {
        Self {
            exists,
            token: token.to_string(),
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl EcrApi for FakeEcr {
    async fn repository_exists(&self, _host: &EcrHost, _repository: &str) -> Result<bool, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.exists)
    }

    async fn create_repository(&self, _host: &EcrHost, repository: &str) -> Result<(), PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().push(repository.to_string());
        Ok(())
    }

    async fn authorization_token(&self, host: &EcrHost) -> Result<EcrAuthorization, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EcrAuthorization {
            token: self.token.clone(),
            proxy_endpoint: format!("https://{}", host.host()),
        })
    }

    async fn caller_account_id(&self, _region: &str) -> Result<String, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok("123456789012".to_string())
    }
}

pub struct FakeAcr {
    pub admin_user_enabled: bool,
    pub passwords: Vec<String>,
    pub calls: AtomicUsize,
}

impl Default for FakeAcr {
    fn default() -> Self {
        Self {
            admin_user_enabled: true,
            passwords: vec!["admin-pw".to_string(), "admin-pw-2".to_string()],
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AcrApi for FakeAcr {
    async fn get_registry(&self, id: &AcrRegistryId) -> Result<AcrRegistry, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AcrRegistry {
            login_server: format!("{}.azurecr.io", id.registry_name),
            admin_user_enabled: self.admin_user_enabled,
        })
    }

    async fn list_credentials(&self, id: &AcrRegistryId) -> Result<AcrCredentials, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AcrCredentials {
            username: id.registry_name.clone(),
            passwords: self
                .passwords
                .iter()
                .enumerate()
                .map(|(i, value)| AcrPassword {
                    name: format!("password{}", i + 1),
                    value: value.clone(),
                })
                .collect(),
        })
    }
}

#[derive(Default)]
pub struct FakeGoogle {
    pub cached: Option<(String, String)>,
    pub cli: Option<String>,
    pub key_token: Option<String>,
    pub default_token: Option<String>,
    pub cli_calls: AtomicUsize,
    pub default_calls: AtomicUsize,
}

#[async_trait]
impl GoogleTokenSources for FakeGoogle {
    async fn cached_registry_auth(&self, _host: &str) -> Option<(String, String)> {
        self.cached.clone()
    }

    async fn cli_access_token(&self) -> Option<String> {
        self.cli_calls.fetch_add(1, Ordering::SeqCst);
        self.cli.clone()
    }

    async fn service_account_token(&self, _key_file: &Path) -> Option<String> {
        self.key_token.clone()
    }

    async fn default_credentials_token(&self) -> Option<String> {
        self.default_calls.fetch_add(1, Ordering::SeqCst);
        self.default_token.clone()
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakePlatform {
    pub saved: Option<(String, String)>,
    pub gh_token: Option<String>,
    pub aws_region: Option<String>,
}

impl PlatformCredentials for FakePlatform {
    fn saved_login(&self, _host: &str) -> Option<(String, String)> {
        self.saved.clone()
    }

    fn github_cli_token(&self) -> Option<String> {
        self.gh_token.clone()
    }

    fn aws_profile_region(&self) -> Option<String> {
        self.aws_region.clone()
    }
}
