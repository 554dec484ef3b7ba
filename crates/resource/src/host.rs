//! Common host interface over [`Manager`] and [`Overlay`]
//!
//! Consumers that don't care whether their models come from the shared
//! pool or a tenant overlay take a `&dyn ModelHost<K>` (or an
//! `Arc<dyn ModelHost<K>>`) and stay oblivious to the routing.

use async_trait::async_trait;

use crate::error::Result;
use crate::manager::Manager;
use crate::model::{AnyModel, Kind};
use crate::overlay::Overlay;

/// Object-safe model lifecycle interface.
#[async_trait]
pub trait ModelHost<K: Kind>: Send + Sync {
    /// Register one usage of `kind`, cancelling any pending eviction.
    async fn acquire(&self, kind: &K) -> Result<()>;

    /// Release one usage of `kind`, scheduling eviction on last release.
    async fn release(&self, kind: &K) -> Result<()>;

    /// Fetch the instance for `kind`, loading it if absent.
    async fn get(&self, kind: &K) -> Result<AnyModel>;

    /// Immediately unload every idle loaded model.
    async fn flush_all_unused(&self);

    /// Whether this host can serve `kind`.
    fn owns(&self, kind: &K) -> bool;

    /// Acquire and load in one step. The acquisition is kept even when
    /// the load fails.
    async fn require_eager(&self, kind: &K) -> Result<AnyModel> {
        self.acquire(kind).await?;
        self.get(kind).await
    }

    /// Release an acquisition made by [`require_eager`](Self::require_eager).
    async fn release_eager(&self, kind: &K) -> Result<()> {
        self.release(kind).await
    }
}

#[async_trait]
impl<K: Kind> ModelHost<K> for Manager<K> {
    async fn acquire(&self, kind: &K) -> Result<()> {
        Manager::acquire(self, kind).await
    }

    async fn release(&self, kind: &K) -> Result<()> {
        Manager::release(self, kind).await
    }

    async fn get(&self, kind: &K) -> Result<AnyModel> {
        Manager::get(self, kind).await
    }

    async fn flush_all_unused(&self) {
        Manager::flush_all_unused(self).await;
    }

    fn owns(&self, kind: &K) -> bool {
        Manager::owns(self, kind)
    }
}

#[async_trait]
impl<K: Kind> ModelHost<K> for Overlay<K> {
    async fn acquire(&self, kind: &K) -> Result<()> {
        Overlay::acquire(self, kind).await
    }

    async fn release(&self, kind: &K) -> Result<()> {
        Overlay::release(self, kind).await
    }

    async fn get(&self, kind: &K) -> Result<AnyModel> {
        Overlay::get(self, kind).await
    }

    async fn flush_all_unused(&self) {
        Overlay::flush_all_unused(self).await;
    }

    fn owns(&self, kind: &K) -> bool {
        Overlay::owns(self, kind)
    }
}
