//! Services layer - orchestration logic
//!
//! This module coordinates between domain logic and infrastructure.
//! Services use infrastructure adapters to perform I/O operations.

pub mod auth;
pub mod credentials;
pub mod publish;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use auth::{authenticator_for, CloudClients, RegistryAuthenticator};
pub use credentials::{
    CredentialCascade, EnvSource, ExplicitCredentials, ProcessEnv, ResolvedCredentials,
};
pub use publish::{
    Confirmation, PublishOptions, PublishPlan, PublishService, PushObserver, PushResult,
};
