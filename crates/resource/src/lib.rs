//! # Modelshed
//!
//! Lazy lifecycle management for expensive, shareable model handles.
//! Models are constructed on first use, kept alive while any consumer
//! holds an acquisition, and unloaded after a grace period of idleness.
//! Construction is serialized across all model kinds through a shared
//! single-worker loader, and a bounded-scope [`Overlay`] can own a
//! private subset of kinds while forwarding the rest to a primary
//! [`Manager`].

pub mod error;
pub mod model;

// Modules requiring the tokio runtime
#[cfg(feature = "tokio")]
pub mod delay;
#[cfg(feature = "tokio")]
pub mod guard;
#[cfg(feature = "tokio")]
pub mod host;
#[cfg(feature = "tokio")]
pub mod loader;
#[cfg(feature = "tokio")]
pub mod manager;
#[cfg(feature = "tokio")]
pub mod overlay;

pub use error::{BoxError, Error, Result};
pub use model::{AnyModel, Kind, Provider, Providers};

#[cfg(feature = "tokio")]
pub use delay::DelayedTask;
#[cfg(feature = "tokio")]
pub use guard::Lease;
#[cfg(feature = "tokio")]
pub use host::ModelHost;
#[cfg(feature = "tokio")]
pub use loader::Loader;
#[cfg(feature = "tokio")]
pub use manager::{Builder, Manager, ManagerConfig, ManagerStats, Reclaimer};
#[cfg(feature = "tokio")]
pub use overlay::Overlay;
