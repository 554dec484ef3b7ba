//! Model manager — refcounted acquire/release, lazy serialized loading,
//! and delayed eviction of idle instances.
//!
//! Each kind has its own entry and lock, so different kinds load and
//! release fully concurrently; the only cross-kind constraint is the
//! shared [`Loader`]'s single construction slot.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::delay::DelayedTask;
use crate::error::{BoxError, Error, Result};
use crate::guard::Lease;
use crate::loader::Loader;
use crate::model::{AnyModel, Kind, Provider, Providers};

// ---------------------------------------------------------------------------
// Config and stats
// ---------------------------------------------------------------------------

/// Configuration for a [`Manager`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ManagerConfig {
    /// How long an idle loaded model survives after its refcount reaches
    /// zero before it is unloaded.
    pub grace_period: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(60),
        }
    }
}

/// Lifecycle counters, exposed via [`Manager::stats`].
#[derive(Debug, Clone, Default)]
pub struct ManagerStats {
    /// Successful provider constructions.
    pub loads: u64,
    /// Instances dropped, whether by delayed eviction or flush.
    pub unloads: u64,
    /// Delayed evictions scheduled by a release that hit refcount zero.
    pub scheduled_evictions: u64,
    /// Pending evictions cancelled by a fresh acquire.
    pub cancelled_evictions: u64,
}

/// Post-unload memory reclamation hook (e.g. a device cache flush).
///
/// Failures are logged and swallowed; they never crash the manager.
pub type Reclaimer = Arc<dyn Fn() -> std::result::Result<(), BoxError> + Send + Sync>;

// ---------------------------------------------------------------------------
// Entry state
// ---------------------------------------------------------------------------

/// Per-kind mutable state, always accessed under the entry's lock.
///
/// Invariant: `eviction` is `Some` only while `refcount == 0` and
/// `model` is present.
#[derive(Default)]
struct EntryState {
    refcount: usize,
    model: Option<AnyModel>,
    eviction: Option<DelayedTask>,
    /// Bumped on every eviction schedule. A fired eviction task unloads
    /// only if its captured epoch still matches, so a task that lost a
    /// cancellation race can never act on a newer schedule.
    epoch: u64,
}

struct Inner<K> {
    providers: HashMap<K, Provider>,
    entries: HashMap<K, Mutex<EntryState>>,
    loader: Arc<Loader>,
    config: ManagerConfig,
    reclaimer: Option<Reclaimer>,
    stats: parking_lot::Mutex<ManagerStats>,
}

impl<K: Kind> Inner<K> {
    fn entry(&self, kind: &K) -> Result<&Mutex<EntryState>> {
        self.entries
            .get(kind)
            .ok_or_else(|| Error::unknown_kind(kind))
    }

    /// Drop the loaded instance and run the reclaimer.
    /// Caller holds the entry's lock.
    fn unload(&self, kind: &K, state: &mut EntryState) {
        state.model = None;
        self.stats.lock().unloads += 1;
        tracing::info!(model = ?kind, "freeing model");

        if let Some(reclaimer) = &self.reclaimer
            && let Err(err) = reclaimer()
        {
            tracing::warn!(model = ?kind, error = %err, "memory reclaim after model unload failed");
        }
    }

    /// Delayed-eviction body. Re-checks everything under the entry lock:
    /// a task that was cancelled too late, or that belongs to a superseded
    /// schedule, must have no observable effect.
    async fn evict_if_idle(&self, kind: &K, expected_epoch: u64) {
        let Ok(entry) = self.entry(kind) else { return };
        let mut state = entry.lock().await;
        if state.epoch != expected_epoch {
            return;
        }
        if state.refcount == 0 && state.model.is_some() {
            state.eviction = None;
            self.unload(kind, &mut state);
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Lifecycle manager for a fixed set of model kinds.
///
/// Cheap to clone (`Arc` inner); inject clones into consumers rather
/// than reaching for a global.
pub struct Manager<K: Kind> {
    inner: Arc<Inner<K>>,
}

impl<K: Kind> Clone for Manager<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Kind> Manager<K> {
    /// Create a manager with a private loader and default config.
    #[must_use]
    pub fn new(providers: Providers<K>) -> Self {
        Self::builder(providers).build()
    }

    /// Start building a manager with non-default settings.
    #[must_use]
    pub fn builder(providers: Providers<K>) -> Builder<K> {
        Builder {
            providers,
            config: ManagerConfig::default(),
            loader: None,
            reclaimer: None,
        }
    }

    /// Register one usage of `kind`, cancelling any pending eviction.
    ///
    /// Never loads the instance; pair with [`get`](Self::get) for that.
    ///
    /// # Errors
    /// [`Error::UnknownKind`] if no provider was registered for `kind`.
    pub async fn acquire(&self, kind: &K) -> Result<()> {
        let mut state = self.inner.entry(kind)?.lock().await;
        state.refcount += 1;
        if let Some(pending) = state.eviction.take() {
            pending.cancel();
            self.inner.stats.lock().cancelled_evictions += 1;
        }
        Ok(())
    }

    /// Release one usage of `kind`. When the last usage goes away while
    /// an instance is loaded, schedules its eviction after the grace
    /// period.
    ///
    /// # Errors
    /// [`Error::UnknownKind`] if no provider was registered for `kind`.
    ///
    /// # Panics
    /// Panics on a release without a matching acquire — that is a
    /// consumer protocol violation, not a recoverable condition.
    pub async fn release(&self, kind: &K) -> Result<()> {
        let mut state = self.inner.entry(kind)?.lock().await;
        assert!(
            state.refcount > 0,
            "release of model {kind:?} without a matching acquire"
        );
        state.refcount -= 1;

        if state.refcount == 0 && state.model.is_some() {
            if let Some(stale) = state.eviction.take() {
                stale.cancel();
            }
            state.epoch += 1;
            let epoch = state.epoch;
            let inner = Arc::clone(&self.inner);
            let owned_kind = kind.clone();
            state.eviction = Some(DelayedTask::spawn(
                self.inner.config.grace_period,
                async move {
                    inner.evict_if_idle(&owned_kind, epoch).await;
                },
            ));
            self.inner.stats.lock().scheduled_evictions += 1;
        }
        Ok(())
    }

    /// Get the instance for `kind`, constructing it through the shared
    /// loader if absent. Does not change the refcount.
    ///
    /// The returned handle must not be retained past the surrounding
    /// acquire/release span.
    ///
    /// # Errors
    /// [`Error::UnknownKind`] for unregistered kinds,
    /// [`Error::Construction`] when the provider fails (the entry stays
    /// empty, so the next `get` retries), [`Error::LoaderClosed`] when
    /// the loader worker is gone.
    pub async fn get(&self, kind: &K) -> Result<AnyModel> {
        let provider = self
            .inner
            .providers
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::unknown_kind(kind))?;

        // The entry lock is held across the loader await: concurrent gets
        // for the same kind queue here and find the instance loaded.
        let mut state = self.inner.entry(kind)?.lock().await;
        if let Some(model) = &state.model {
            return Ok(Arc::clone(model));
        }

        tracing::info!(model = ?kind, "initializing model");
        let built = self
            .inner
            .loader
            .submit(move || provider())
            .await
            .map_err(|_| Error::LoaderClosed)?
            .map_err(|source| Error::construction(kind, source))?;

        let model = Arc::clone(&built);
        state.model = Some(built);
        self.inner.stats.lock().loads += 1;
        Ok(model)
    }

    /// Acquire `kind` for the lifetime of the returned [`Lease`].
    ///
    /// The lease releases on drop, on every exit path including panics,
    /// so prefer this over raw acquire/release.
    ///
    /// # Errors
    /// [`Error::UnknownKind`] if no provider was registered for `kind`.
    pub async fn lease(&self, kind: &K) -> Result<Lease<K>> {
        self.acquire(kind).await?;
        Ok(Lease::new(self.clone(), kind.clone()))
    }

    /// Acquire `kind` and force the load now.
    ///
    /// The acquisition is kept even when the load fails; the caller
    /// still owes a [`release_eager`](Self::release_eager) either way.
    pub async fn require_eager(&self, kind: &K) -> Result<AnyModel> {
        self.acquire(kind).await?;
        self.get(kind).await
    }

    /// Release an acquisition made by [`require_eager`](Self::require_eager).
    ///
    /// # Panics
    /// Panics on a release without a matching acquire.
    pub async fn release_eager(&self, kind: &K) -> Result<()> {
        self.release(kind).await
    }

    /// Immediately unload every idle (`refcount == 0`) loaded model,
    /// without waiting for its grace period. Busy kinds are untouched.
    pub async fn flush_all_unused(&self) {
        for (kind, entry) in &self.inner.entries {
            let mut state = entry.lock().await;
            if state.refcount == 0 && state.model.is_some() {
                if let Some(pending) = state.eviction.take() {
                    pending.cancel();
                }
                self.inner.unload(kind, &mut state);
            }
        }
    }

    /// Whether this manager has a provider for `kind`.
    #[must_use]
    pub fn owns(&self, kind: &K) -> bool {
        self.inner.providers.contains_key(kind)
    }

    /// Current number of unmatched acquires for `kind`.
    ///
    /// # Errors
    /// [`Error::UnknownKind`] if no provider was registered for `kind`.
    pub async fn refcount(&self, kind: &K) -> Result<usize> {
        Ok(self.inner.entry(kind)?.lock().await.refcount)
    }

    /// Whether an instance of `kind` is currently loaded.
    ///
    /// # Errors
    /// [`Error::UnknownKind`] if no provider was registered for `kind`.
    pub async fn is_loaded(&self, kind: &K) -> Result<bool> {
        Ok(self.inner.entry(kind)?.lock().await.model.is_some())
    }

    /// Snapshot of the lifecycle counters.
    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        self.inner.stats.lock().clone()
    }

    /// The serialized loader this manager constructs through. Hand this
    /// to an [`Overlay`](crate::Overlay) (done automatically by
    /// `Overlay::new`) to keep construction globally serialized.
    #[must_use]
    pub fn loader(&self) -> Arc<Loader> {
        Arc::clone(&self.inner.loader)
    }

    /// This manager's configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub(crate) fn reclaimer(&self) -> Option<Reclaimer> {
        self.inner.reclaimer.clone()
    }
}

impl<K: Kind> fmt::Debug for Manager<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("kinds", &self.inner.entries.len())
            .field("grace_period", &self.inner.config.grace_period)
            .field("stats", &self.stats())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`Manager`], returned by [`Manager::builder`].
pub struct Builder<K: Kind> {
    providers: Providers<K>,
    config: ManagerConfig,
    loader: Option<Arc<Loader>>,
    reclaimer: Option<Reclaimer>,
}

impl<K: Kind> Builder<K> {
    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the idle grace period before eviction.
    #[must_use]
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.config.grace_period = grace_period;
        self
    }

    /// Share an existing loader instead of starting a private one.
    #[must_use]
    pub fn loader(mut self, loader: Arc<Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Install a post-unload memory reclamation hook.
    #[must_use]
    pub fn reclaimer<F>(mut self, reclaimer: F) -> Self
    where
        F: Fn() -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.reclaimer = Some(Arc::new(reclaimer));
        self
    }

    pub(crate) fn reclaimer_arc(mut self, reclaimer: Option<Reclaimer>) -> Self {
        self.reclaimer = reclaimer;
        self
    }

    /// Build the manager. The provider set is immutable from here on.
    #[must_use]
    pub fn build(self) -> Manager<K> {
        let providers = self.providers.into_map();
        let entries = providers
            .keys()
            .cloned()
            .map(|kind| (kind, Mutex::new(EntryState::default())))
            .collect();
        Manager {
            inner: Arc::new(Inner {
                providers,
                entries,
                loader: self.loader.unwrap_or_else(Loader::new),
                config: self.config,
                reclaimer: self.reclaimer,
                stats: parking_lot::Mutex::new(ManagerStats::default()),
            }),
        }
    }
}

impl<K: Kind> fmt::Debug for Builder<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("providers", &self.providers)
            .field("config", &self.config)
            .field("shared_loader", &self.loader.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
