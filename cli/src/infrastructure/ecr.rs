//! AWS Elastic Container Registry operations
//!
//! Talks to ECR through the `aws` CLI so that every credential source the
//! CLI understands (profiles, SSO, instance roles) works unchanged.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::domain::EcrHost;
use crate::error::PublishError;
use crate::tools::{get_tool_path, tool_available, tools};

const SERVICE: &str = "ECR";

/// Authorization data returned by `get-authorization-token`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EcrAuthorization {
    /// Base64 of `AWS:<password>`
    #[serde(rename = "authorizationToken")]
    pub token: String,
    #[serde(rename = "proxyEndpoint")]
    pub proxy_endpoint: String,
}

#[async_trait]
pub trait EcrApi: Send + Sync {
    async fn repository_exists(&self, host: &EcrHost, repository: &str)
        -> Result<bool, PublishError>;

    async fn create_repository(&self, host: &EcrHost, repository: &str)
        -> Result<(), PublishError>;

    async fn authorization_token(&self, host: &EcrHost) -> Result<EcrAuthorization, PublishError>;

    /// Account of the ambient AWS identity (`sts get-caller-identity`)
    async fn caller_account_id(&self, region: &str) -> Result<String, PublishError>;
}

/// [`EcrApi`] backed by the `aws` CLI
#[derive(Debug, Clone, Default)]
pub struct AwsCliEcr;

impl AwsCliEcr {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<CliOutput, PublishError> {
        if !tool_available(tools::AWS) {
            return Err(PublishError::cloud_api(
                SERVICE,
                "aws CLI not found (install it or set AWS_BIN)",
            ));
        }
        let program = get_tool_path(tools::AWS);
        debug!(program = %program, ?args, "Running aws CLI");

        let output = Command::new(&program)
            .args(args)
            .args(["--output", "json"])
            .output()
            .await
            .map_err(|e| PublishError::cloud_api(SERVICE, format!("cannot run {}: {}", program, e)))?;

        Ok(CliOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

struct CliOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl CliOutput {
    fn into_json<T: DeserializeOwned>(self, what: &str) -> Result<T, PublishError> {
        if !self.success {
            return Err(PublishError::cloud_api(SERVICE, format!("{} failed: {}", what, self.stderr)));
        }
        serde_json::from_str(&self.stdout).map_err(|e| {
            PublishError::cloud_api(SERVICE, format!("unexpected {} output: {}", what, e))
        })
    }
}

#[derive(Deserialize)]
struct AuthorizationResponse {
    #[serde(rename = "authorizationData", default)]
    authorization_data: Vec<EcrAuthorization>,
}

#[derive(Deserialize)]
struct CallerIdentity {
    #[serde(rename = "Account")]
    account: String,
}

#[async_trait]
impl EcrApi for AwsCliEcr {
    async fn repository_exists(
        &self,
        host: &EcrHost,
        repository: &str,
    ) -> Result<bool, PublishError> {
        let output = self
            .run(&[
                "ecr",
                "describe-repositories",
                "--repository-names",
                repository,
                "--registry-id",
                &host.account_id,
                "--region",
                &host.region,
            ])
            .await?;

        if output.success {
            return Ok(true);
        }
        if is_repository_not_found(&output.stderr) {
            return Ok(false);
        }
        Err(PublishError::cloud_api(
            SERVICE,
            format!("describe-repositories failed: {}", output.stderr),
        ))
    }

    async fn create_repository(
        &self,
        host: &EcrHost,
        repository: &str,
    ) -> Result<(), PublishError> {
        let output = self
            .run(&[
                "ecr",
                "create-repository",
                "--repository-name",
                repository,
                "--registry-id",
                &host.account_id,
                "--region",
                &host.region,
            ])
            .await?;
        output
            .into_json::<serde_json::Value>("create-repository")
            .map(|_| ())
    }

    async fn authorization_token(&self, host: &EcrHost) -> Result<EcrAuthorization, PublishError> {
        let response: AuthorizationResponse = self
            .run(&[
                "ecr",
                "get-authorization-token",
                "--registry-ids",
                &host.account_id,
                "--region",
                &host.region,
            ])
            .await?
            .into_json("get-authorization-token")?;

        response.authorization_data.into_iter().next().ok_or_else(|| {
            PublishError::cloud_api(SERVICE, "get-authorization-token returned no data")
        })
    }

    async fn caller_account_id(&self, region: &str) -> Result<String, PublishError> {
        let identity: CallerIdentity = self
            .run(&["sts", "get-caller-identity", "--region", region])
            .await?
            .into_json("sts get-caller-identity")?;
        Ok(identity.account)
    }
}

fn is_repository_not_found(stderr: &str) -> bool {
    stderr.contains("RepositoryNotFoundException")
}
