//! Docker engine API client over the local Unix socket
//!
//! Only the four image operations the publisher needs are implemented:
//! inspect, tag, push (streamed) and remove.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use http_body_util::{BodyExt, BodyStream, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde::Deserialize;
use tokio::net::UnixStream;
use tracing::debug;

use crate::domain::{AuthToken, ImageReference};
use crate::error::EngineError;

/// Default engine socket on Linux and Docker Desktop
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Raw byte chunks of a push response body
pub type PushStream = BoxStream<'static, Result<Bytes, EngineError>>;

/// Local image store operations used by the publisher
#[async_trait]
pub trait ImageEngine: Send + Sync {
    /// Look up a local image; `ImageNotFound` when absent
    async fn inspect(&self, image: &str) -> Result<ImageInfo, EngineError>;

    /// Tag `source` as `target`
    async fn tag(&self, source: &str, target: &ImageReference) -> Result<(), EngineError>;

    /// Start a push and return the progress stream
    async fn push(&self, target: &ImageReference, auth: &AuthToken)
        -> Result<PushStream, EngineError>;

    /// Remove a local image tag
    async fn remove(&self, image: &str) -> Result<(), EngineError>;
}

/// Subset of `GET /images/{name}/json`
#[derive(Debug, Clone, Deserialize)]
pub struct ImageInfo {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Unix socket connector (tower::Service<Uri>)
// ---------------------------------------------------------------------------

/// Routes every request to a fixed Unix socket regardless of the URI host.
#[derive(Clone)]
struct UnixConnector {
    socket_path: PathBuf,
}

impl tower::Service<Uri> for UnixConnector {
    type Response = TokioIo<UnixStream>;
    type Error = std::io::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _uri: Uri) -> Self::Future {
        let path = self.socket_path.clone();
        Box::pin(async move {
            let stream = UnixStream::connect(&path).await?;
            Ok(TokioIo::new(stream))
        })
    }
}

// ---------------------------------------------------------------------------
// DockerEngine
// ---------------------------------------------------------------------------

/// Docker engine reached over its Unix socket
pub struct DockerEngine {
    client: Client<UnixConnector, Full<Bytes>>,
    socket_path: PathBuf,
}

impl DockerEngine {
    /// Connect using `DOCKER_HOST` (unix:// only) or the default socket
    pub fn from_env() -> Result<Self, EngineError> {
        match std::env::var("DOCKER_HOST") {
            Ok(host) if !host.is_empty() => match host.strip_prefix("unix://") {
                Some(path) => Ok(Self::with_socket(path)),
                None => Err(EngineError::UnsupportedHost { host }),
            },
            _ => Ok(Self::with_socket(DEFAULT_SOCKET)),
        }
    }

    pub fn with_socket(socket_path: impl AsRef<Path>) -> Self {
        let socket_path = socket_path.as_ref().to_path_buf();
        let connector = UnixConnector {
            socket_path: socket_path.clone(),
        };
        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            socket_path,
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        auth: Option<&AuthToken>,
    ) -> Result<Response<Incoming>, EngineError> {
        let uri: Uri = format!("http://localhost{}", path)
            .parse()
            .map_err(|e| EngineError::Transport(format!("invalid request path {}: {}", path, e)))?;

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header("Host", "localhost");
        if let Some(auth) = auth {
            builder = builder.header("X-Registry-Auth", auth.as_str());
        }
        let request = builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        debug!(%method, path, "engine request");
        self.client
            .request(request)
            .await
            .map_err(|e| EngineError::Unreachable {
                socket: self.socket_path.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Read a whole response body, turning non-2xx into an error
    async fn expect_success(
        response: Response<Incoming>,
        image: &str,
    ) -> Result<Bytes, EngineError> {
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?
            .to_bytes();

        if status.is_success() {
            return Ok(body);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(EngineError::ImageNotFound {
                reference: image.to_string(),
            });
        }
        Err(EngineError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }
}

#[async_trait]
impl ImageEngine for DockerEngine {
    async fn inspect(&self, image: &str) -> Result<ImageInfo, EngineError> {
        let response = self
            .send(Method::GET, &format!("/images/{}/json", image), None)
            .await?;
        let body = Self::expect_success(response, image).await?;
        serde_json::from_slice(&body)
            .map_err(|e| EngineError::Transport(format!("unexpected inspect response: {}", e)))
    }

    async fn tag(&self, source: &str, target: &ImageReference) -> Result<(), EngineError> {
        let path = format!(
            "/images/{}/tag?repo={}&tag={}",
            source,
            urlencoding::encode(&target.name()),
            urlencoding::encode(target.tag())
        );
        let response = self.send(Method::POST, &path, None).await?;
        Self::expect_success(response, source).await.map(|_| ())
    }

    async fn push(
        &self,
        target: &ImageReference,
        auth: &AuthToken,
    ) -> Result<PushStream, EngineError> {
        let path = format!(
            "/images/{}/push?tag={}",
            target.name(),
            urlencoding::encode(target.tag())
        );
        let response = self.send(Method::POST, &path, Some(auth)).await?;
        if !response.status().is_success() {
            return Self::expect_success(response, &target.to_string())
                .await
                .and_then(|_| Err(EngineError::Transport("push rejected".to_string())));
        }

        let stream = BodyStream::new(response.into_body()).filter_map(|frame| async move {
            match frame {
                Ok(frame) => frame.into_data().ok().map(Ok),
                Err(e) => Some(Err(EngineError::Transport(e.to_string()))),
            }
        });
        Ok(stream.boxed())
    }

    async fn remove(&self, image: &str) -> Result<(), EngineError> {
        let response = self
            .send(Method::DELETE, &format!("/images/{}?noprune=1", image), None)
            .await?;
        Self::expect_success(response, image).await.map(|_| ())
    }
}

/// Extract `{"message": ...}` from an engine error body
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_json_message() {
        assert_eq!(
            error_message(br#"{"message":"No such image: myapp:v1"}"#),
            "No such image: myapp:v1"
        );
        assert_eq!(error_message(b"plain failure\n"), "plain failure");
    }

    #[test]
    fn test_image_info_parses_inspect_subset() {
        let info: ImageInfo =
            serde_json::from_str(r#"{"Id":"sha256:abc","RepoTags":["myapp:v1"],"Size":10}"#)
                .unwrap();
        assert_eq!(info.id, "sha256:abc");
        assert_eq!(info.repo_tags, vec!["myapp:v1"]);
    }

    #[tokio::test]
    async fn test_unreachable_socket() {
        let engine = DockerEngine::with_socket("/nonexistent/hoist-test.sock");
        let err = engine.inspect("myapp:v1").await.unwrap_err();
        assert!(matches!(err, EngineError::Unreachable { .. }));
    }
}
