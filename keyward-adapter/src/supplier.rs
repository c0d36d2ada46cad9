use std::sync::Arc;

use crate::error::BoxError;

/// A deferred factory: every call to [`get`](Supplier::get) invokes the
/// underlying function and returns either a value or an error.
///
/// Nothing is cached here. A supplier that should hand out a shared instance
/// is built with [`Supplier::constant`] or caches inside its own closure.
pub struct Supplier<T> {
    factory: Arc<dyn Fn() -> Result<T, BoxError> + Send + Sync>,
}

impl<T> Supplier<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
        }
    }

    /// Invoke the factory.
    pub fn get(&self) -> Result<T, BoxError> {
        (self.factory)()
    }
}

impl<T: Clone + Send + Sync + 'static> Supplier<T> {
    /// A supplier that always returns a clone of `value`.
    pub fn constant(value: T) -> Self {
        Self::new(move || Ok(value.clone()))
    }
}

impl<T> Clone for Supplier<T> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Supplier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supplier").finish_non_exhaustive()
    }
}
