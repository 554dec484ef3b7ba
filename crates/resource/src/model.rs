//! Model kinds, type-erased instances, and provider registration
//!
//! The manager is generic over the application's kind type and stores
//! instances type-erased as `Arc<dyn Any>`; consumers downcast to the
//! concrete handle they registered.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::BoxError;

/// Marker trait for model-kind keys.
///
/// The core treats kinds as opaque comparable keys; applications define
/// a closed enum (e.g. `Ocr`, `Transcriber`, `Clip`, `VisionLm`) and get
/// this impl for free through the blanket.
pub trait Kind: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> Kind for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// Type-erased model instance handle.
///
/// The manager's entry holds the owning `Arc`; `get` hands out clones.
/// A consumer must not retain a clone past its matching release — the
/// manager may drop its own `Arc` at eviction time, and a retained clone
/// would silently pin device memory the manager believes it has freed.
pub type AnyModel = Arc<dyn Any + Send + Sync>;

/// Blocking constructor for one model kind.
///
/// Invoked only on the serialized loader thread, never concurrently with
/// any other provider.
pub type Provider = Arc<dyn Fn() -> Result<AnyModel, BoxError> + Send + Sync>;

/// Immutable provider registry supplied at manager construction.
///
/// Built fluently:
///
/// ```
/// use modelshed_resource::{BoxError, Providers};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum ModelKind { Clip, Ocr }
///
/// let providers = Providers::new()
///     .provide(ModelKind::Clip, || Ok::<_, BoxError>(vec![0f32; 512]))
///     .provide(ModelKind::Ocr, || Ok::<_, BoxError>("ocr-engine".to_string()));
/// assert_eq!(providers.len(), 2);
/// ```
pub struct Providers<K> {
    map: HashMap<K, Provider>,
}

impl<K: Kind> Providers<K> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Register a typed provider for `kind`, erasing its instance type.
    ///
    /// Registering the same kind twice replaces the earlier provider.
    pub fn provide<T, E, F>(mut self, kind: K, provider: F) -> Self
    where
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        self.map.insert(
            kind,
            Arc::new(move || {
                provider()
                    .map(|instance| Arc::new(instance) as AnyModel)
                    .map_err(Into::into)
            }),
        );
        self
    }

    /// Whether a provider is registered for `kind`.
    #[must_use]
    pub fn contains(&self, kind: &K) -> bool {
        self.map.contains_key(kind)
    }

    /// Iterate over the registered kinds.
    pub fn kinds(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub(crate) fn into_map(self) -> HashMap<K, Provider> {
        self.map
    }
}

impl<K: Kind> Default for Providers<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kind> fmt::Debug for Providers<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Providers")
            .field("kinds", &self.map.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestKind {
        Clip,
        Ocr,
    }

    #[test]
    fn provide_registers_and_replaces() {
        let providers = Providers::new()
            .provide(TestKind::Clip, || Ok::<_, BoxError>(1u32))
            .provide(TestKind::Clip, || Ok::<_, BoxError>(2u32));
        assert_eq!(providers.len(), 1);
        assert!(providers.contains(&TestKind::Clip));
        assert!(!providers.contains(&TestKind::Ocr));
    }

    #[test]
    fn erased_provider_downcasts() {
        let providers = Providers::new().provide(TestKind::Ocr, || Ok::<_, BoxError>(42u32));
        let map = providers.into_map();
        let model = map[&TestKind::Ocr]().expect("provider should succeed");
        let value = model.downcast_ref::<u32>().expect("should downcast to u32");
        assert_eq!(*value, 42);
    }

    #[test]
    fn provider_error_is_boxed() {
        let providers = Providers::new().provide(TestKind::Clip, || {
            Err::<u32, _>(std::io::Error::other("no device"))
        });
        let map = providers.into_map();
        let err = map[&TestKind::Clip]().expect_err("provider should fail");
        assert!(err.to_string().contains("no device"));
    }
}
