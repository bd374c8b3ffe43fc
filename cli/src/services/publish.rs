//! Publish service - orchestrates the push pipeline
//!
//! resolve target → credential cascade → tag → authenticate → push →
//! decode progress → optional cleanup. Each stage runs once and the first
//! failure ends the run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::domain::progress::{EventDecoder, EventOutcome, PushEvent};
use crate::domain::{
    AuthToken, ImageReference, LayerProgress, LayerSummary, PushProgress, RegistryKind,
};
use crate::error::PublishError;
use crate::infrastructure::{ImageEngine, PlatformCredentials};

use super::auth::{authenticator_for, CloudClients};
use super::credentials::{CredentialCascade, EnvSource, ExplicitCredentials, ResolvedCredentials};

/// Receives push progress as it is decoded
pub trait PushObserver: Send + Sync {
    fn on_layer(&self, _layer: &LayerProgress) {}

    fn on_status(&self, _status: &str) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl PushObserver for NoopObserver {}

/// Decides whether a resolved push may go ahead
pub trait Confirmation: Send + Sync {
    fn confirm(&self, target: &ImageReference) -> bool;
}

impl<F> Confirmation for F
where
    F: Fn(&ImageReference) -> bool + Send + Sync,
{
    fn confirm(&self, target: &ImageReference) -> bool {
        self(target)
    }
}

/// Final outcome of one publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushResult {
    pub success: bool,
    pub final_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub layers: LayerSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushResult {
    pub fn succeeded(target: &ImageReference, progress: &PushProgress) -> Self {
        Self {
            success: true,
            final_reference: target.to_string(),
            digest: progress.digest().map(String::from),
            layers: progress.summary(),
            cleanup_warning: None,
            error: None,
        }
    }

    pub fn failed(reference: impl Into<String>, error: &PublishError) -> Self {
        Self {
            success: false,
            final_reference: reference.into(),
            digest: None,
            layers: LayerSummary::default(),
            cleanup_warning: None,
            error: Some(error.to_string()),
        }
    }
}

/// Per-invocation options, built once by the command layer
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Local image to publish
    pub image: ImageReference,
    /// Target registry for short names; ignored for fully-qualified images
    pub registry: Option<RegistryKind>,
    pub explicit: ExplicitCredentials,
    /// Tag to publish under instead of the local tag
    pub tag: Option<String>,
    pub delete_after_push: bool,
    /// Skip the confirmation gate (`--yes`)
    pub assume_yes: bool,
    pub timeout: Option<Duration>,
}

impl PublishOptions {
    pub fn new(image: ImageReference) -> Self {
        Self {
            image,
            registry: None,
            explicit: ExplicitCredentials::default(),
            tag: None,
            delete_after_push: false,
            assume_yes: false,
            timeout: None,
        }
    }

    /// Registry family that will receive the image
    pub fn target_kind(&self) -> RegistryKind {
        if self.image.is_fully_qualified() {
            self.image.kind()
        } else {
            self.registry.unwrap_or(RegistryKind::DockerHub)
        }
    }
}

/// Resolved source/target pair plus the credentials to use
#[derive(Debug, Clone)]
pub struct PublishPlan {
    pub local: ImageReference,
    pub target: ImageReference,
    pub resolved: ResolvedCredentials,
}

// ---------------------------------------------------------------------------
// Publisher: tag, push, decode, cleanup
// ---------------------------------------------------------------------------

/// Drives the engine for a single image
pub struct Publisher {
    engine: Arc<dyn ImageEngine>,
}

impl Publisher {
    pub fn new(engine: Arc<dyn ImageEngine>) -> Self {
        Self { engine }
    }

    /// Push an already-tagged `target` and aggregate the progress stream
    pub async fn push(
        &self,
        target: &ImageReference,
        auth: &AuthToken,
        observer: &dyn PushObserver,
    ) -> Result<PushResult, PublishError> {
        info!(image = %target, "Pushing image");
        let push_failed = |message: String| PublishError::PushFailed {
            reference: target.to_string(),
            message,
        };

        let mut stream = self.engine.push(target, auth).await?;
        let mut decoder = EventDecoder::new();
        let mut progress = PushProgress::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| push_failed(e.to_string()))?;
            let events = decoder
                .feed(&chunk)
                .map_err(|e| push_failed(format!("malformed progress message: {}", e)))?;
            for event in &events {
                apply_event(&mut progress, event, observer).map_err(push_failed)?;
            }
        }
        if let Some(event) = decoder
            .finish()
            .map_err(|e| push_failed(format!("malformed progress message: {}", e)))?
        {
            apply_event(&mut progress, &event, observer).map_err(push_failed)?;
        }

        let result = PushResult::succeeded(target, &progress);
        info!(
            image = %target,
            digest = result.digest.as_deref().unwrap_or("unknown"),
            layers = result.layers.total(),
            "Push complete"
        );
        Ok(result)
    }

    /// Remove the local target tag; failures become a warning on the result
    pub async fn cleanup(&self, target: &ImageReference, result: &mut PushResult) {
        if let Err(e) = self.engine.remove(&target.to_string()).await {
            let warning = PublishError::CleanupWarning {
                reference: target.to_string(),
                message: e.to_string(),
            };
            warn!("{}", warning);
            result.cleanup_warning = Some(warning.to_string());
        } else {
            debug!(image = %target, "Removed local tag");
        }
    }

    /// Check that `local` exists and tag it as `target`; no network I/O
    pub async fn tag(&self, local: &ImageReference, target: &ImageReference) -> Result<(), PublishError> {
        let source = local.to_string();
        let tag_failed = |message: String| PublishError::TagFailed {
            source_image: source.clone(),
            target: target.to_string(),
            message,
        };

        self.engine
            .inspect(&source)
            .await
            .map_err(|e| tag_failed(e.to_string()))?;
        if local != target {
            self.engine
                .tag(&source, target)
                .await
                .map_err(|e| tag_failed(e.to_string()))?;
            debug!(source = %source, image = %target, "Tagged image");
        }
        Ok(())
    }
}

fn apply_event(
    progress: &mut PushProgress,
    event: &PushEvent,
    observer: &dyn PushObserver,
) -> Result<(), String> {
    match progress.apply(event)? {
        EventOutcome::Layer(layer) => observer.on_layer(&layer),
        EventOutcome::Status(status) => observer.on_status(&status),
        EventOutcome::Ignored => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PublishService: the whole pipeline
// ---------------------------------------------------------------------------

/// Everything the pipeline talks to
pub struct PublishService {
    engine: Arc<dyn ImageEngine>,
    clients: CloudClients,
    env: Arc<dyn EnvSource>,
    platform: Arc<dyn PlatformCredentials>,
    config: RegistryConfig,
}

impl PublishService {
    pub fn new(
        engine: Arc<dyn ImageEngine>,
        clients: CloudClients,
        env: Arc<dyn EnvSource>,
        platform: Arc<dyn PlatformCredentials>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            engine,
            clients,
            env,
            platform,
            config,
        }
    }

    /// Resolve credentials and the fully-qualified target
    ///
    /// Only an ECR short name without a known account reaches the network
    /// (caller identity lookup).
    pub async fn plan(&self, options: &PublishOptions) -> Result<PublishPlan, PublishError> {
        let kind = options.target_kind();
        let cascade =
            CredentialCascade::new(self.env.as_ref(), &self.config, self.platform.as_ref());
        let mut resolved = cascade.resolve(kind, &options.explicit, &options.image)?;

        if let ResolvedCredentials::Ecr(identity) = &mut resolved {
            if identity.account_id.is_none() && !options.image.is_fully_qualified() {
                let account_id = self.clients.ecr.caller_account_id(&identity.region).await?;
                debug!(account_id = %account_id, "Using caller account for ECR");
                identity.account_id = Some(account_id);
            }
        }

        let local = options.image.clone();
        let mut target = if local.is_fully_qualified() {
            local.clone()
        } else {
            local.resolve_target(&resolved.target_spec()?)?
        };
        if let Some(tag) = options.tag.as_deref() {
            target = target.with_tag(tag)?;
        }
        info!(registry = %resolved.kind(), image = %target, "Resolved push target");

        Ok(PublishPlan {
            local,
            target,
            resolved,
        })
    }

    /// Obtain the engine auth token for a plan
    pub async fn authenticate(&self, plan: &PublishPlan) -> Result<AuthToken, PublishError> {
        authenticator_for(&plan.resolved, &self.clients)
            .resolve(&plan.target)
            .await
    }

    /// Run the full pipeline under one deadline
    ///
    /// Time spent waiting for the confirmation prompt does not count against
    /// the deadline.
    pub async fn publish(
        &self,
        options: &PublishOptions,
        confirmation: &dyn Confirmation,
        observer: &dyn PushObserver,
    ) -> Result<PushResult, PublishError> {
        let mut deadline = options.timeout.map(Deadline::after);
        let plan = with_deadline(deadline.as_ref(), self.plan(options)).await?;

        if !options.assume_yes {
            let asked = Instant::now();
            if !confirmation.confirm(&plan.target) {
                return Err(PublishError::ConfirmationRequired {
                    reference: plan.target.to_string(),
                });
            }
            if let Some(deadline) = deadline.as_mut() {
                deadline.extend(asked.elapsed());
            }
        }

        with_deadline(deadline.as_ref(), self.execute(&plan, options, observer)).await
    }

    async fn execute(
        &self,
        plan: &PublishPlan,
        options: &PublishOptions,
        observer: &dyn PushObserver,
    ) -> Result<PushResult, PublishError> {
        let publisher = Publisher::new(self.engine.clone());
        publisher.tag(&plan.local, &plan.target).await?;

        let auth = self.authenticate(plan).await?;
        let mut result = publisher.push(&plan.target, &auth, observer).await?;

        if options.delete_after_push {
            publisher.cleanup(&plan.target, &mut result).await;
        }
        Ok(result)
    }
}

/// Point in time by which the whole operation must finish
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Push the deadline back, e.g. by time spent waiting on the user
    pub fn extend(&mut self, by: Duration) {
        self.at += by;
    }
}

/// Bound a pipeline stage by a shared deadline
pub async fn with_deadline<T>(
    deadline: Option<&Deadline>,
    stage: impl Future<Output = Result<T, PublishError>>,
) -> Result<T, PublishError> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline.at, stage)
            .await
            .map_err(|_| PublishError::Timeout {
                after: deadline.budget,
            })?,
        None => stage.await,
    }
}
