//! Lifecycle traits implemented by provided types
//!
//! Hook wiring happens on the [`ProviderDefinition`](crate::ProviderDefinition)
//! builders (`with_init`, `with_async_init`, `with_destroy`); these traits are
//! what the wired type implements.

use async_trait::async_trait;

use crate::errors::DiError;

/// Synchronous post-construction hook, honored on both resolution paths
pub trait Initializable: Send + Sync {
    fn initialize(&self) -> Result<(), DiError>;
}

/// Asynchronous post-construction hook; a provider carrying one can only
/// be resolved through the async path
#[async_trait]
pub trait AsyncInitializable: Send + Sync {
    async fn initialize(&self) -> Result<(), DiError>;
}

/// Teardown hook, invoked when the owning scope is released
#[async_trait]
pub trait Disposable: Send + Sync {
    async fn dispose(&self) -> Result<(), DiError>;
}
