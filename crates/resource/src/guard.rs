//! RAII usage guard for an acquired model kind

use std::fmt;

use crate::error::Result;
use crate::manager::Manager;
use crate::model::{AnyModel, Kind};

/// A held usage of one model kind, created by [`Manager::lease`].
///
/// Releasing happens explicitly via [`release`](Self::release), or
/// implicitly on drop. The drop path spawns the release onto the current
/// tokio runtime; outside a runtime it can only log the leak, so prefer
/// the explicit form on shutdown paths.
pub struct Lease<K: Kind> {
    slot: Option<(Manager<K>, K)>,
}

impl<K: Kind> Lease<K> {
    pub(crate) fn new(manager: Manager<K>, kind: K) -> Self {
        Self {
            slot: Some((manager, kind)),
        }
    }

    /// The kind this lease holds.
    #[must_use]
    pub fn kind(&self) -> &K {
        let (_, kind) = self.slot.as_ref().expect("lease used after release");
        kind
    }

    /// Fetch the instance for the held kind, loading it if absent.
    ///
    /// # Errors
    /// See [`Manager::get`].
    pub async fn get(&self) -> Result<AnyModel> {
        let (manager, kind) = self.slot.as_ref().expect("lease used after release");
        manager.get(kind).await
    }

    /// Release the held usage now, synchronously with the caller.
    ///
    /// # Errors
    /// See [`Manager::release`].
    pub async fn release(mut self) -> Result<()> {
        if let Some((manager, kind)) = self.slot.take() {
            manager.release(&kind).await?;
        }
        Ok(())
    }
}

impl<K: Kind> Drop for Lease<K> {
    fn drop(&mut self) {
        let Some((manager, kind)) = self.slot.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let _ = handle.spawn(async move {
                    if let Err(err) = manager.release(&kind).await {
                        tracing::warn!(model = ?kind, error = %err, "deferred lease release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(model = ?kind, "lease dropped outside a tokio runtime; usage leaked");
            }
        }
    }
}

impl<K: Kind> fmt::Debug for Lease<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("kind", &self.slot.as_ref().map(|(_, kind)| kind))
            .finish()
    }
}
