//! Two-level delegation — a private model subset layered on a primary
//! manager
//!
//! An [`Overlay`] owns providers for a subset of kinds (e.g. a
//! per-tenant fine-tuned embedding model) and forwards every other kind
//! to the primary [`Manager`]. Owned kinds live in a private manager
//! that shares the primary's loader, so construction stays globally
//! serialized across both levels.

use std::fmt;

use crate::error::Result;
use crate::guard::Lease;
use crate::manager::Manager;
use crate::model::{AnyModel, Kind, Providers};

/// A manager overlay with a private subset of kinds.
///
/// Routing is static: a kind registered in the overlay's own providers
/// is always served locally, even when the primary also knows it;
/// everything else goes to the primary unchanged. The overlay's private
/// instances are invisible to the primary and to sibling overlays.
pub struct Overlay<K: Kind> {
    primary: Manager<K>,
    owned: Manager<K>,
}

impl<K: Kind> Clone for Overlay<K> {
    fn clone(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            owned: self.owned.clone(),
        }
    }
}

impl<K: Kind> Overlay<K> {
    /// Layer `owned` providers over `primary`.
    ///
    /// The private level inherits the primary's grace period, reclaimer,
    /// and loader.
    #[must_use]
    pub fn new(primary: &Manager<K>, owned: Providers<K>) -> Self {
        let owned = Manager::builder(owned)
            .config(primary.config().clone())
            .loader(primary.loader())
            .reclaimer_arc(primary.reclaimer())
            .build();
        Self {
            primary: primary.clone(),
            owned,
        }
    }

    fn route(&self, kind: &K) -> &Manager<K> {
        if self.owned.owns(kind) {
            &self.owned
        } else {
            &self.primary
        }
    }

    /// Whether `kind` is served by the private level.
    #[must_use]
    pub fn is_owned(&self, kind: &K) -> bool {
        self.owned.owns(kind)
    }

    /// Whether this overlay can serve `kind` at either level.
    #[must_use]
    pub fn owns(&self, kind: &K) -> bool {
        self.owned.owns(kind) || self.primary.owns(kind)
    }

    /// The primary this overlay forwards to.
    #[must_use]
    pub fn primary(&self) -> &Manager<K> {
        &self.primary
    }

    /// See [`Manager::acquire`].
    pub async fn acquire(&self, kind: &K) -> Result<()> {
        self.route(kind).acquire(kind).await
    }

    /// See [`Manager::release`].
    pub async fn release(&self, kind: &K) -> Result<()> {
        self.route(kind).release(kind).await
    }

    /// See [`Manager::get`].
    pub async fn get(&self, kind: &K) -> Result<AnyModel> {
        self.route(kind).get(kind).await
    }

    /// See [`Manager::lease`].
    pub async fn lease(&self, kind: &K) -> Result<Lease<K>> {
        self.route(kind).lease(kind).await
    }

    /// See [`Manager::require_eager`].
    pub async fn require_eager(&self, kind: &K) -> Result<AnyModel> {
        self.route(kind).require_eager(kind).await
    }

    /// See [`Manager::release_eager`].
    pub async fn release_eager(&self, kind: &K) -> Result<()> {
        self.route(kind).release_eager(kind).await
    }

    /// See [`Manager::refcount`]. Answered by whichever level serves `kind`.
    pub async fn refcount(&self, kind: &K) -> Result<usize> {
        self.route(kind).refcount(kind).await
    }

    /// See [`Manager::is_loaded`]. Answered by whichever level serves `kind`.
    pub async fn is_loaded(&self, kind: &K) -> Result<bool> {
        self.route(kind).is_loaded(kind).await
    }

    /// Flush idle models at both levels, primary first.
    pub async fn flush_all_unused(&self) {
        self.primary.flush_all_unused().await;
        self.owned.flush_all_unused().await;
    }
}

impl<K: Kind> fmt::Debug for Overlay<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overlay")
            .field("owned", &self.owned)
            .field("primary", &self.primary)
            .finish()
    }
}
