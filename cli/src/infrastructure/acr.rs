//! Azure Container Registry management API
//!
//! Admin credentials come from the Resource Manager REST API. The bearer
//! token for it is obtained from a service principal in the environment or,
//! failing that, from the `az` CLI session.

use async_trait::async_trait;
use futures::FutureExt;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::fallback::{first_success_async, AsyncStrategy};
use crate::error::PublishError;
use crate::tools::{get_tool_path, tools};

const SERVICE: &str = "Azure";
const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
const LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
pub const API_VERSION: &str = "2023-07-01";

/// Resource coordinates of a container registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcrRegistryId {
    pub subscription_id: String,
    pub resource_group: String,
    pub registry_name: String,
}

impl AcrRegistryId {
    fn resource_path(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerRegistry/registries/{}",
            self.subscription_id, self.resource_group, self.registry_name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcrRegistry {
    pub login_server: String,
    pub admin_user_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AcrCredentials {
    pub username: String,
    #[serde(default)]
    pub passwords: Vec<AcrPassword>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AcrPassword {
    #[serde(default)]
    pub name: String,
    pub value: String,
}

#[async_trait]
pub trait AcrApi: Send + Sync {
    async fn get_registry(&self, id: &AcrRegistryId) -> Result<AcrRegistry, PublishError>;

    async fn list_credentials(&self, id: &AcrRegistryId) -> Result<AcrCredentials, PublishError>;
}

#[derive(Deserialize)]
struct RegistryResource {
    properties: RegistryProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryProperties {
    login_server: String,
    #[serde(default)]
    admin_user_enabled: bool,
}

#[derive(Deserialize)]
struct OAuthToken {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliAccessToken {
    access_token: String,
}

/// [`AcrApi`] over the Azure Resource Manager REST API
pub struct AzureManagementClient {
    http: reqwest::Client,
    token: OnceCell<String>,
}

impl AzureManagementClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            token: OnceCell::new(),
        }
    }

    /// Management bearer token, fetched once per client
    async fn bearer(&self) -> Result<&str, PublishError> {
        self.token
            .get_or_try_init(|| async {
                let found = first_success_async(vec![
                    AsyncStrategy::new(
                        "service principal (AZURE_CLIENT_ID)",
                        self.service_principal_token().boxed(),
                    ),
                    AsyncStrategy::new("az account get-access-token", cli_token().boxed()),
                ])
                .await
                .map_err(|exhausted| {
                    PublishError::cloud_api(
                        SERVICE,
                        format!(
                            "no management token available. Tried: {}",
                            exhausted.attempted.join(", ")
                        ),
                    )
                })?;
                debug!(source = %found.source, "Obtained Azure management token");
                Ok::<_, PublishError>(found.value)
            })
            .await
            .map(String::as_str)
    }

    async fn service_principal_token(&self) -> Option<String> {
        let client_id = non_empty_env("AZURE_CLIENT_ID")?;
        let client_secret = non_empty_env("AZURE_CLIENT_SECRET")?;
        let tenant_id = non_empty_env("AZURE_TENANT_ID")?;

        let url = format!("{}/{}/oauth2/v2.0/token", LOGIN_ENDPOINT, tenant_id);
        let scope = format!("{}/.default", MANAGEMENT_ENDPOINT);
        let response = match self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "Service principal token request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(status = %response.status(), "Service principal token rejected");
            return None;
        }
        response
            .json::<OAuthToken>()
            .await
            .ok()
            .map(|token| token.access_token)
    }

    async fn management_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, PublishError> {
        let token = self.bearer().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PublishError::cloud_api(SERVICE, format!("{}: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::cloud_api(
                SERVICE,
                format!("{} returned {}: {}", what, status, body.trim()),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| PublishError::cloud_api(SERVICE, format!("unexpected {} response: {}", what, e)))
    }
}

#[async_trait]
impl AcrApi for AzureManagementClient {
    async fn get_registry(&self, id: &AcrRegistryId) -> Result<AcrRegistry, PublishError> {
        let url = format!(
            "{}{}?api-version={}",
            MANAGEMENT_ENDPOINT,
            id.resource_path(),
            API_VERSION
        );
        let resource: RegistryResource = self
            .management_json(self.http.get(&url), "get registry")
            .await?;
        Ok(AcrRegistry {
            login_server: resource.properties.login_server,
            admin_user_enabled: resource.properties.admin_user_enabled,
        })
    }

    async fn list_credentials(&self, id: &AcrRegistryId) -> Result<AcrCredentials, PublishError> {
        let url = format!(
            "{}{}/listCredentials?api-version={}",
            MANAGEMENT_ENDPOINT,
            id.resource_path(),
            API_VERSION
        );
        self.management_json(self.http.post(&url), "list credentials")
            .await
    }
}

async fn cli_token() -> Option<String> {
    let program = get_tool_path(tools::AZ);
    let output = match Command::new(&program)
        .args([
            "account",
            "get-access-token",
            "--resource",
            "https://management.azure.com/",
            "--output",
            "json",
        ])
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            debug!(program = %program, error = %e, "az CLI unavailable");
            return None;
        }
    };

    if !output.status.success() {
        debug!(status = ?output.status.code(), "az account get-access-token failed");
        return None;
    }
    serde_json::from_slice::<CliAccessToken>(&output.stdout)
        .ok()
        .map(|token| token.access_token)
        .filter(|token| !token.is_empty())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}
