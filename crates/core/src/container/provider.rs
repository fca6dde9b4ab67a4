//! Provider definitions: how a token's value gets produced
//!
//! A [`ProviderDefinition`] pairs one production strategy (constant value,
//! sync factory, async factory, or alias) with a [`Scope`], the declared
//! dependency list supplied by the metadata front-end, and optional
//! lifecycle hook adapters. The engine never infers dependencies from type
//! information; the declared list is what the graph analyzer sees.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::container::context::{Resolution, ResolutionContext};
use crate::container::lifecycle::{AsyncInitializable, Disposable, Initializable};
use crate::container::scope::Scope;
use crate::container::token::Token;
use crate::errors::DiError;

/// Type-erased instance produced by a provider
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Boxed future used throughout the async resolution path
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Synchronous factory function; receives the resolution handle for
/// recursive dependency access
pub type FactoryFn = Arc<dyn Fn(&Resolution) -> Result<Instance, DiError> + Send + Sync>;

/// Asynchronous factory function; takes the resolution handle by value so
/// the produced future is self-contained
pub type AsyncFactoryFn =
    Arc<dyn Fn(Resolution) -> BoxFuture<'static, Result<Instance, DiError>> + Send + Sync>;

pub(crate) type InitHookFn = Arc<dyn Fn(&Instance) -> Result<(), DiError> + Send + Sync>;
pub(crate) type AsyncHookFn =
    Arc<dyn Fn(Instance) -> BoxFuture<'static, Result<(), DiError>> + Send + Sync>;
pub(crate) type InjectObserverFn = Arc<dyn Fn(&ResolutionContext) + Send + Sync>;

/// Value-production strategy for a provider
#[derive(Clone)]
pub enum ProviderKind {
    /// Literal value, shared as-is
    Value(Instance),
    /// Synchronous factory
    Factory(FactoryFn),
    /// Asynchronous factory; only reachable through the async path
    AsyncFactory(AsyncFactoryFn),
    /// Alias to another token; inherits the target's resolution
    Alias(Token),
}

impl std::fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Value(_) => write!(f, "Value(<instance>)"),
            ProviderKind::Factory(_) => write!(f, "Factory(<factory_fn>)"),
            ProviderKind::AsyncFactory(_) => write!(f, "AsyncFactory(<factory_fn>)"),
            ProviderKind::Alias(target) => f.debug_tuple("Alias").field(target).finish(),
        }
    }
}

/// Resolution modifiers carried on a declared dependency
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Absence of the dependency is not an error
    pub optional: bool,
    /// Resolution is deferred behind a lazy wrapper
    pub lazy: bool,
    /// All registered providers are injected as an ordered sequence
    pub multi: bool,
    /// Only this container's own registry is consulted
    pub self_only: bool,
    /// Only parent containers are consulted
    pub skip_self: bool,
}

impl Modifiers {
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    pub fn self_only(mut self) -> Self {
        self.self_only = true;
        self
    }

    pub fn skip_self(mut self) -> Self {
        self.skip_self = true;
        self
    }
}

/// One declared dependency of a provider, as supplied by the metadata
/// front-end
#[derive(Debug, Clone)]
pub struct DependencySpec {
    pub token: Token,
    pub modifiers: Modifiers,
}

impl DependencySpec {
    pub fn new(token: Token) -> Self {
        Self {
            token,
            modifiers: Modifiers::default(),
        }
    }

    pub fn optional(token: Token) -> Self {
        Self {
            token,
            modifiers: Modifiers::default().optional(),
        }
    }

    pub fn lazy(token: Token) -> Self {
        Self {
            token,
            modifiers: Modifiers::default().lazy(),
        }
    }
}

/// Lifecycle hook adapters bound to the erased instance
#[derive(Clone, Default)]
pub(crate) struct HookSet {
    pub(crate) on_init: Option<InitHookFn>,
    pub(crate) on_init_async: Option<AsyncHookFn>,
    pub(crate) on_destroy: Option<AsyncHookFn>,
    pub(crate) on_inject: Option<InjectObserverFn>,
}

impl std::fmt::Debug for HookSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSet")
            .field("on_init", &self.on_init.is_some())
            .field("on_init_async", &self.on_init_async.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .field("on_inject", &self.on_inject.is_some())
            .finish()
    }
}

/// Provider definition: strategy + scope + declared dependencies + hooks
#[derive(Clone, Debug)]
pub struct ProviderDefinition {
    pub(crate) kind: ProviderKind,
    pub(crate) scope: Scope,
    pub(crate) dependencies: Vec<DependencySpec>,
    pub(crate) multi: bool,
    pub(crate) hooks: HookSet,
}

impl ProviderDefinition {
    fn from_kind(kind: ProviderKind) -> Self {
        Self {
            kind,
            scope: Scope::default(),
            dependencies: Vec::new(),
            multi: false,
            hooks: HookSet::default(),
        }
    }

    /// Provide a literal value
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_kind(ProviderKind::Value(Arc::new(value)))
    }

    /// Provide through a synchronous factory
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolution) -> Result<T, DiError> + Send + Sync + 'static,
    {
        let erased: FactoryFn =
            Arc::new(move |res| factory(res).map(|value| Arc::new(value) as Instance));
        Self::from_kind(ProviderKind::Factory(erased))
    }

    /// Provide through an asynchronous factory
    pub fn async_factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Resolution) -> BoxFuture<'static, Result<T, DiError>> + Send + Sync + 'static,
    {
        let erased: AsyncFactoryFn = Arc::new(move |res| {
            let fut = factory(res);
            Box::pin(async move { fut.await.map(|value| Arc::new(value) as Instance) })
        });
        Self::from_kind(ProviderKind::AsyncFactory(erased))
    }

    /// Alias another token; the alias inherits the target's resolution and
    /// has no scope of its own
    pub fn alias(target: Token) -> Self {
        Self::from_kind(ProviderKind::Alias(target))
    }

    /// Set the provider scope
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Attach the declared dependency list
    pub fn with_dependencies(mut self, dependencies: Vec<DependencySpec>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Add one declared dependency
    pub fn depends_on(mut self, token: Token) -> Self {
        self.dependencies.push(DependencySpec::new(token));
        self
    }

    /// Mark this registration as accumulating for multi-injection
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    /// Run `T`'s synchronous init hook after construction, on both
    /// resolution paths
    pub fn with_init<T: Initializable + 'static>(mut self) -> Self {
        self.hooks.on_init = Some(Arc::new(|instance: &Instance| {
            match instance.downcast_ref::<T>() {
                Some(value) => value.initialize(),
                None => Err(DiError::construction(format!(
                    "init hook expected {}",
                    std::any::type_name::<T>()
                ))),
            }
        }));
        self
    }

    /// Run `T`'s async init hook after construction; makes the provider
    /// async-only
    pub fn with_async_init<T: AsyncInitializable + 'static>(mut self) -> Self {
        self.hooks.on_init_async = Some(Arc::new(|instance: Instance| {
            Box::pin(async move {
                match instance.downcast::<T>() {
                    Ok(value) => value.initialize().await,
                    Err(_) => Err(DiError::construction(format!(
                        "async init hook expected {}",
                        std::any::type_name::<T>()
                    ))),
                }
            })
        }));
        self
    }

    /// Run `T`'s destroy hook when the owning scope is released
    pub fn with_destroy<T: Disposable + 'static>(mut self) -> Self {
        self.hooks.on_destroy = Some(Arc::new(|instance: Instance| {
            Box::pin(async move {
                match instance.downcast::<T>() {
                    Ok(value) => value.dispose().await,
                    Err(_) => Err(DiError::construction(format!(
                        "destroy hook expected {}",
                        std::any::type_name::<T>()
                    ))),
                }
            })
        }));
        self
    }

    /// Observe every injection of this provider (fresh or cached)
    pub fn with_inject_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ResolutionContext) + Send + Sync + 'static,
    {
        self.hooks.on_inject = Some(Arc::new(observer));
        self
    }

    /// The provider's scope
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// The provider's declared dependencies
    pub fn dependencies(&self) -> &[DependencySpec] {
        &self.dependencies
    }

    /// Whether this registration accumulates for multi-injection
    pub fn is_multi(&self) -> bool {
        self.multi
    }

    /// Whether resolving this provider requires the async path
    pub fn requires_async(&self) -> bool {
        matches!(self.kind, ProviderKind::AsyncFactory(_)) || self.hooks.on_init_async.is_some()
    }
}
