//! Domain layer - pure business logic
//!
//! This module contains business logic with no external I/O.
//! Types and functions here can be unit tested without mocking.

pub mod credentials;
pub mod fallback;
pub mod progress;
pub mod reference;

// Re-export commonly used types
pub use credentials::{AuthToken, Credentials};
pub use progress::{LayerProgress, LayerState, LayerSummary, PushProgress};
pub use reference::{EcrHost, ImageReference, RegistryKind, TargetSpec};
