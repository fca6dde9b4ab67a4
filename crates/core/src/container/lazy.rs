//! Deferred resolution wrapper
//!
//! A [`Lazy`] holds the token, a container handle, and an empty cell;
//! nothing resolves until the value is first requested. The first
//! resolution opens a fresh call state, so a lazy edge breaks a
//! construction cycle: by the time the value is forced, the original
//! in-flight stack is gone.

use std::sync::{Arc, RwLock};

use crate::container::container::Container;
use crate::container::context::ResolveOptions;
use crate::container::scope::RequestId;
use crate::container::token::Token;
use crate::errors::DiError;

pub struct Lazy<T: Send + Sync + 'static> {
    inner: Arc<LazyInner<T>>,
}

struct LazyInner<T: Send + Sync + 'static> {
    token: Token,
    container: Container,
    request: Option<RequestId>,
    cell: RwLock<Option<Arc<T>>>,
}

impl<T: Send + Sync + 'static> Lazy<T> {
    pub(crate) fn new(token: Token, container: Container, request: Option<RequestId>) -> Self {
        Self {
            inner: Arc::new(LazyInner {
                token,
                container,
                request,
                cell: RwLock::new(None),
            }),
        }
    }

    /// The wrapped token
    pub fn token(&self) -> &Token {
        &self.inner.token
    }

    /// Whether a value has been resolved into this wrapper
    pub fn is_resolved(&self) -> bool {
        self.inner
            .cell
            .read()
            .map(|cell| cell.is_some())
            .unwrap_or(false)
    }

    /// Resolve the value, caching it for every later access and every
    /// clone of this wrapper
    pub fn value(&self) -> Result<Arc<T>, DiError> {
        if let Ok(cell) = self.inner.cell.read() {
            if let Some(value) = cell.as_ref() {
                return Ok(Arc::clone(value));
            }
        }

        let resolved = self
            .inner
            .container
            .get_with::<T>(&self.inner.token, self.options())?;
        self.store(resolved)
    }

    /// Async counterpart of [`value`](Self::value); reaches async factories
    pub async fn value_async(&self) -> Result<Arc<T>, DiError> {
        if let Ok(cell) = self.inner.cell.read() {
            if let Some(value) = cell.as_ref() {
                return Ok(Arc::clone(value));
            }
        }

        let resolved = self
            .inner
            .container
            .get_async_with::<T>(&self.inner.token, self.options())
            .await?;
        self.store(resolved)
    }

    /// Explicit form of [`value`](Self::value); idempotent
    pub fn resolve(&self) -> Result<Arc<T>, DiError> {
        self.value()
    }

    /// Explicit form of [`value_async`](Self::value_async); idempotent,
    /// shares the cache with the synchronous accessors
    pub async fn resolve_async(&self) -> Result<Arc<T>, DiError> {
        self.value_async().await
    }

    /// Clear the cached value; the next access resolves again
    pub fn reset(&self) {
        if let Ok(mut cell) = self.inner.cell.write() {
            cell.take();
        }
    }

    fn options(&self) -> ResolveOptions {
        let mut options = ResolveOptions::new();
        options.request = self.inner.request;
        options
    }

    fn store(&self, resolved: Arc<T>) -> Result<Arc<T>, DiError> {
        let mut cell = self
            .inner
            .cell
            .write()
            .map_err(|_| DiError::lock("lazy cell"))?;
        // a concurrent forcing may have won; keep the first stored value
        match cell.as_ref() {
            Some(existing) => Ok(Arc::clone(existing)),
            None => {
                *cell = Some(Arc::clone(&resolved));
                Ok(resolved)
            }
        }
    }
}

impl<T: Send + Sync + 'static> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lazy")
            .field("token", &self.inner.token)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
