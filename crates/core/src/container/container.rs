//! The container: registration, scope-aware resolution, and teardown
//!
//! A [`Container`] is a cheap clone over shared inner state. Resolution
//! walks this container's registry first and falls back to the parent
//! chain unless modifiers say otherwise. Singletons cache per registration
//! behind a `tokio` `OnceCell` so concurrent async resolutions of one
//! token construct at most one instance; request-scoped instances cache in
//! per-request maps keyed by externally supplied [`RequestId`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tokio::sync::OnceCell;

use crate::container::context::{CallState, Resolution, ResolutionContext, ResolveOptions};
use crate::container::graph::{CycleAnalysis, DependencyGraph};
use crate::container::interceptor::{InterceptorChain, ResolveInterceptor};
use crate::container::lazy::Lazy;
use crate::container::provider::{
    AsyncHookFn, BoxFuture, Instance, ProviderDefinition, ProviderKind,
};
use crate::container::registry::ProviderRegistry;
use crate::container::scope::{RequestId, Scope};
use crate::container::token::Token;
use crate::errors::DiError;

/// Outcome of [`Container::validate`]; never an `Err`
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Point-in-time counters for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ContainerStatistics {
    pub providers: usize,
    pub singleton_providers: usize,
    pub transient_providers: usize,
    pub request_providers: usize,
    pub cached_singletons: usize,
    pub active_request_scopes: usize,
    pub interceptors: usize,
}

/// Constructed instance plus its bound destroy hook
#[derive(Clone)]
struct CachedEntry {
    instance: Instance,
    on_destroy: Option<AsyncHookFn>,
}

/// Cache key: one slot per registration of a token, so multi-bound
/// providers cache independently
type SlotKey = (Token, usize);

#[derive(Default)]
struct SingletonCache {
    cells: RwLock<HashMap<SlotKey, Arc<OnceCell<CachedEntry>>>>,
    /// Creation order, for reverse-order disposal
    created: Mutex<Vec<SlotKey>>,
}

#[derive(Default)]
struct RequestCache {
    entries: HashMap<SlotKey, CachedEntry>,
    order: Vec<SlotKey>,
}

struct ContainerInner {
    registry: RwLock<ProviderRegistry>,
    parent: Option<Container>,
    interceptors: InterceptorChain,
    singletons: SingletonCache,
    requests: RwLock<HashMap<RequestId, RequestCache>>,
    disposed: AtomicBool,
}

/// Scope-aware dependency injection container
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<Container>) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                registry: RwLock::new(ProviderRegistry::new()),
                parent,
                interceptors: InterceptorChain::new(),
                singletons: SingletonCache::default(),
                requests: RwLock::new(HashMap::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a child container. Lookups fall back to this container;
    /// the child's own registrations shadow it.
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    // ---- registration ----

    pub fn register(&self, token: Token, definition: ProviderDefinition) -> Result<(), DiError> {
        self.ensure_live()?;
        let mut registry = self
            .inner
            .registry
            .write()
            .map_err(|_| DiError::lock("provider registry"))?;
        registry.register(token, definition);
        Ok(())
    }

    pub fn register_all<I>(&self, definitions: I) -> Result<(), DiError>
    where
        I: IntoIterator<Item = (Token, ProviderDefinition)>,
    {
        self.ensure_live()?;
        let mut registry = self
            .inner
            .registry
            .write()
            .map_err(|_| DiError::lock("provider registry"))?;
        registry.register_all(definitions);
        Ok(())
    }

    pub fn add_interceptor(
        &self,
        interceptor: Arc<dyn ResolveInterceptor>,
    ) -> Result<(), DiError> {
        self.ensure_live()?;
        self.inner.interceptors.add(interceptor)
    }

    /// Whether a token is registered here or anywhere up the parent chain
    pub fn has(&self, token: &Token) -> bool {
        let own = self
            .inner
            .registry
            .read()
            .map(|r| r.has(token))
            .unwrap_or(false);
        own || self
            .inner
            .parent
            .as_ref()
            .map(|p| p.has(token))
            .unwrap_or(false)
    }

    // ---- typed resolution surface ----

    pub fn get<T: Send + Sync + 'static>(&self, token: &Token) -> Result<Arc<T>, DiError> {
        self.get_with(token, ResolveOptions::new())
    }

    pub fn get_with<T: Send + Sync + 'static>(
        &self,
        token: &Token,
        options: ResolveOptions,
    ) -> Result<Arc<T>, DiError> {
        let state = CallState::new();
        let result = self.resolve_erased(token, &options, &state);
        state.close();
        result.and_then(|instance| downcast::<T>(token, instance))
    }

    /// Resolve, treating an unregistered token as `None` rather than an
    /// error; every other failure still propagates
    pub fn get_optional<T: Send + Sync + 'static>(
        &self,
        token: &Token,
    ) -> Result<Option<Arc<T>>, DiError> {
        self.get_optional_with(token, ResolveOptions::new())
    }

    pub fn get_optional_with<T: Send + Sync + 'static>(
        &self,
        token: &Token,
        options: ResolveOptions,
    ) -> Result<Option<Arc<T>>, DiError> {
        match self.get_with::<T>(token, options) {
            Ok(instance) => Ok(Some(instance)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolve every registration for a multi-bound token, registration
    /// order; an unregistered token yields an empty list
    pub fn get_all<T: Send + Sync + 'static>(&self, token: &Token) -> Result<Vec<Arc<T>>, DiError> {
        let state = CallState::new();
        let result = self.resolve_all_erased(token, &ResolveOptions::new(), &state);
        state.close();
        result.and_then(|instances| {
            instances
                .into_iter()
                .map(|instance| downcast::<T>(token, instance))
                .collect()
        })
    }

    /// Wrap a token in a deferred handle; nothing resolves until the
    /// handle's value is first requested
    pub fn get_lazy<T: Send + Sync + 'static>(&self, token: &Token) -> Lazy<T> {
        Lazy::new(token.clone(), self.clone(), None)
    }

    pub fn get_lazy_with<T: Send + Sync + 'static>(
        &self,
        token: &Token,
        options: ResolveOptions,
    ) -> Lazy<T> {
        Lazy::new(token.clone(), self.clone(), options.request)
    }

    pub async fn get_async<T: Send + Sync + 'static>(
        &self,
        token: &Token,
    ) -> Result<Arc<T>, DiError> {
        self.get_async_with(token, ResolveOptions::new()).await
    }

    pub async fn get_async_with<T: Send + Sync + 'static>(
        &self,
        token: &Token,
        options: ResolveOptions,
    ) -> Result<Arc<T>, DiError> {
        let state = CallState::new();
        let result = self.resolve_erased_async(token, &options, &state).await;
        state.close();
        result.and_then(|instance| downcast::<T>(token, instance))
    }

    // ---- entry points for nested resolution inside factories ----

    pub(crate) fn get_nested<T: Send + Sync + 'static>(
        &self,
        token: &Token,
        options: ResolveOptions,
        state: &Arc<CallState>,
    ) -> Result<Arc<T>, DiError> {
        self.resolve_erased(token, &options, state)
            .and_then(|instance| downcast::<T>(token, instance))
    }

    pub(crate) fn get_all_nested<T: Send + Sync + 'static>(
        &self,
        token: &Token,
        options: ResolveOptions,
        state: &Arc<CallState>,
    ) -> Result<Vec<Arc<T>>, DiError> {
        self.resolve_all_erased(token, &options, state)?
            .into_iter()
            .map(|instance| downcast::<T>(token, instance))
            .collect()
    }

    pub(crate) async fn get_nested_async<T: Send + Sync + 'static>(
        &self,
        token: &Token,
        options: ResolveOptions,
        state: &Arc<CallState>,
    ) -> Result<Arc<T>, DiError> {
        let instance = self.resolve_erased_async(token, &options, state).await?;
        downcast::<T>(token, instance)
    }

    // ---- erased resolution, sync path ----

    fn resolve_erased(
        &self,
        token: &Token,
        options: &ResolveOptions,
        state: &Arc<CallState>,
    ) -> Result<Instance, DiError> {
        self.ensure_live()?;

        if options.skip_self {
            return match &self.inner.parent {
                Some(parent) => {
                    let mut opts = options.clone();
                    opts.skip_self = false;
                    parent.resolve_erased(token, &opts, state)
                }
                None => Err(DiError::not_found(token)),
            };
        }

        let Some((index, definition)) = self.lookup_winning(token)? else {
            return match (&self.inner.parent, options.self_only) {
                (Some(parent), false) => parent.resolve_erased(token, options, state),
                _ => Err(DiError::not_found(token)),
            };
        };

        if let ProviderKind::Alias(target) = &definition.kind {
            let target = target.clone();
            let mut opts = options.clone();
            opts.self_only = false;
            opts.skip_self = false;
            // alias hops stay on the in-flight stack so alias loops trip
            // the cycle guard
            let _guard = state.enter(token)?;
            return self.resolve_erased(&target, &opts, state);
        }

        self.resolve_definition(token, index, &definition, options, state)
    }

    fn resolve_all_erased(
        &self,
        token: &Token,
        options: &ResolveOptions,
        state: &Arc<CallState>,
    ) -> Result<Vec<Instance>, DiError> {
        self.ensure_live()?;

        if options.skip_self {
            return match &self.inner.parent {
                Some(parent) => {
                    let mut opts = options.clone();
                    opts.skip_self = false;
                    parent.resolve_all_erased(token, &opts, state)
                }
                None => Ok(Vec::new()),
            };
        }

        let definitions = {
            let registry = self
                .inner
                .registry
                .read()
                .map_err(|_| DiError::lock("provider registry"))?;
            registry.lookup_all(token).to_vec()
        };

        if definitions.is_empty() {
            return match (&self.inner.parent, options.self_only) {
                (Some(parent), false) => parent.resolve_all_erased(token, options, state),
                _ => Ok(Vec::new()),
            };
        }

        let mut instances = Vec::with_capacity(definitions.len());
        for (index, definition) in definitions.iter().enumerate() {
            let instance = match &definition.kind {
                ProviderKind::Alias(target) => {
                    let target = target.clone();
                    let mut opts = options.clone();
                    opts.self_only = false;
                    opts.skip_self = false;
                    let _guard = state.enter(token)?;
                    self.resolve_erased(&target, &opts, state)?
                }
                _ => self.resolve_definition(token, index, definition, options, state)?,
            };
            instances.push(instance);
        }
        Ok(instances)
    }

    fn resolve_definition(
        &self,
        token: &Token,
        index: usize,
        definition: &ProviderDefinition,
        options: &ResolveOptions,
        state: &Arc<CallState>,
    ) -> Result<Instance, DiError> {
        match definition.scope() {
            Scope::Transient => self
                .construct(token, definition, options, state)
                .map(|entry| entry.instance),
            Scope::Singleton => {
                let cell = self.singleton_cell(token, index)?;
                if let Some(entry) = cell.get() {
                    tracing::trace!(token = %token, "singleton cache hit");
                    self.notify_inject(token, definition, options);
                    return Ok(entry.instance.clone());
                }
                let entry = self.construct(token, definition, options, state)?;
                match cell.set(entry.clone()) {
                    Ok(()) => {
                        self.record_singleton(token, index)?;
                        Ok(entry.instance)
                    }
                    // lost a race; the first stored instance wins
                    Err(_) => Ok(cell
                        .get()
                        .map(|existing| existing.instance.clone())
                        .unwrap_or(entry.instance)),
                }
            }
            Scope::Request => {
                let request = options.request.ok_or_else(|| {
                    DiError::context_missing(format!(
                        "request-scoped provider '{}' requires an active request scope",
                        token
                    ))
                })?;
                let key = (token.clone(), index);
                {
                    let requests = self
                        .inner
                        .requests
                        .read()
                        .map_err(|_| DiError::lock("request caches"))?;
                    let cache = requests.get(&request).ok_or_else(|| {
                        DiError::context_missing(format!("request scope {} is not active", request))
                    })?;
                    if let Some(entry) = cache.entries.get(&key) {
                        self.notify_inject(token, definition, options);
                        return Ok(entry.instance.clone());
                    }
                }
                let entry = self.construct(token, definition, options, state)?;
                let mut requests = self
                    .inner
                    .requests
                    .write()
                    .map_err(|_| DiError::lock("request caches"))?;
                let cache = requests.get_mut(&request).ok_or_else(|| {
                    DiError::context_missing(format!(
                        "request scope {} ended during resolution",
                        request
                    ))
                })?;
                if let Some(existing) = cache.entries.get(&key) {
                    return Ok(existing.instance.clone());
                }
                cache.order.push(key.clone());
                cache.entries.insert(key, entry.clone());
                Ok(entry.instance)
            }
        }
    }

    fn construct(
        &self,
        token: &Token,
        definition: &ProviderDefinition,
        options: &ResolveOptions,
        state: &Arc<CallState>,
    ) -> Result<CachedEntry, DiError> {
        if definition.requires_async() {
            return Err(DiError::AsyncResolutionRequired {
                token: token.to_string(),
            });
        }

        let _guard = state.enter(token)?;
        let ctx = self.resolution_context(token, definition, options);

        let instance = match &definition.kind {
            ProviderKind::Value(value) => {
                let value = value.clone();
                self.inner.interceptors.execute(&ctx, move || Ok(value))?
            }
            ProviderKind::Factory(factory) => {
                let factory = factory.clone();
                let resolution = self.resolution_handle(token, options, state);
                self.inner
                    .interceptors
                    .execute(&ctx, move || factory(&resolution))?
            }
            ProviderKind::AsyncFactory(_) | ProviderKind::Alias(_) => {
                return Err(DiError::construction(format!(
                    "provider '{}' has no synchronous construction",
                    token
                )));
            }
        };

        if let Some(init) = &definition.hooks.on_init {
            init(&instance)?;
        }
        if let Some(observer) = &definition.hooks.on_inject {
            observer(&ctx);
        }
        tracing::debug!(token = %token, scope = %definition.scope(), "constructed instance");

        Ok(CachedEntry {
            instance,
            on_destroy: definition.hooks.on_destroy.clone(),
        })
    }

    // ---- erased resolution, async path ----

    fn resolve_erased_async<'a>(
        &'a self,
        token: &'a Token,
        options: &'a ResolveOptions,
        state: &'a Arc<CallState>,
    ) -> BoxFuture<'a, Result<Instance, DiError>> {
        Box::pin(async move {
            self.ensure_live()?;

            if options.skip_self {
                return match &self.inner.parent {
                    Some(parent) => {
                        let mut opts = options.clone();
                        opts.skip_self = false;
                        parent.resolve_erased_async(token, &opts, state).await
                    }
                    None => Err(DiError::not_found(token)),
                };
            }

            let Some((index, definition)) = self.lookup_winning(token)? else {
                return match (&self.inner.parent, options.self_only) {
                    (Some(parent), false) => {
                        parent.resolve_erased_async(token, options, state).await
                    }
                    _ => Err(DiError::not_found(token)),
                };
            };

            if let ProviderKind::Alias(target) = &definition.kind {
                let target = target.clone();
                let mut opts = options.clone();
                opts.self_only = false;
                opts.skip_self = false;
                let _guard = state.enter(token)?;
                return self.resolve_erased_async(&target, &opts, state).await;
            }

            self.resolve_definition_async(token, index, &definition, options, state)
                .await
        })
    }

    async fn resolve_definition_async(
        &self,
        token: &Token,
        index: usize,
        definition: &ProviderDefinition,
        options: &ResolveOptions,
        state: &Arc<CallState>,
    ) -> Result<Instance, DiError> {
        match definition.scope() {
            Scope::Transient => self
                .construct_async(token, definition, options, state)
                .await
                .map(|entry| entry.instance),
            Scope::Singleton => {
                let cell = self.singleton_cell(token, index)?;
                // a repeat token in this chain would await its own
                // in-progress initialization; surface the cycle instead
                if cell.get().is_none() {
                    state.check_not_in_flight(token)?;
                }
                let mut freshly_built = false;
                let entry = cell
                    .get_or_try_init(|| {
                        freshly_built = true;
                        self.construct_async(token, definition, options, state)
                    })
                    .await?;
                let instance = entry.instance.clone();
                if freshly_built {
                    self.record_singleton(token, index)?;
                } else {
                    tracing::trace!(token = %token, "singleton cache hit");
                    self.notify_inject(token, definition, options);
                }
                Ok(instance)
            }
            Scope::Request => {
                let request = options.request.ok_or_else(|| {
                    DiError::context_missing(format!(
                        "request-scoped provider '{}' requires an active request scope",
                        token
                    ))
                })?;
                let key = (token.clone(), index);
                {
                    let requests = self
                        .inner
                        .requests
                        .read()
                        .map_err(|_| DiError::lock("request caches"))?;
                    let cache = requests.get(&request).ok_or_else(|| {
                        DiError::context_missing(format!("request scope {} is not active", request))
                    })?;
                    if let Some(entry) = cache.entries.get(&key) {
                        self.notify_inject(token, definition, options);
                        return Ok(entry.instance.clone());
                    }
                }
                let entry = self.construct_async(token, definition, options, state).await?;
                let mut requests = self
                    .inner
                    .requests
                    .write()
                    .map_err(|_| DiError::lock("request caches"))?;
                let cache = requests.get_mut(&request).ok_or_else(|| {
                    DiError::context_missing(format!(
                        "request scope {} ended during resolution",
                        request
                    ))
                })?;
                if let Some(existing) = cache.entries.get(&key) {
                    return Ok(existing.instance.clone());
                }
                cache.order.push(key.clone());
                cache.entries.insert(key, entry.clone());
                Ok(entry.instance)
            }
        }
    }

    async fn construct_async(
        &self,
        token: &Token,
        definition: &ProviderDefinition,
        options: &ResolveOptions,
        state: &Arc<CallState>,
    ) -> Result<CachedEntry, DiError> {
        let _guard = state.enter(token)?;
        let ctx = self.resolution_context(token, definition, options);

        let terminal: BoxFuture<'static, Result<Instance, DiError>> = match &definition.kind {
            ProviderKind::Value(value) => {
                let value = value.clone();
                Box::pin(async move { Ok(value) })
            }
            ProviderKind::Factory(factory) => {
                let factory = factory.clone();
                let resolution = self.resolution_handle(token, options, state);
                Box::pin(async move { factory(&resolution) })
            }
            ProviderKind::AsyncFactory(factory) => factory(self.resolution_handle(
                token, options, state,
            )),
            ProviderKind::Alias(_) => {
                return Err(DiError::construction(format!(
                    "provider '{}' has no direct construction",
                    token
                )));
            }
        };

        let instance = self.inner.interceptors.execute_async(&ctx, terminal).await?;

        if let Some(init) = &definition.hooks.on_init {
            init(&instance)?;
        }
        if let Some(init) = &definition.hooks.on_init_async {
            init(instance.clone()).await?;
        }
        if let Some(observer) = &definition.hooks.on_inject {
            observer(&ctx);
        }
        tracing::debug!(token = %token, scope = %definition.scope(), "constructed instance");

        Ok(CachedEntry {
            instance,
            on_destroy: definition.hooks.on_destroy.clone(),
        })
    }

    // ---- request scopes ----

    /// Open a request scope; resolutions carrying the returned id cache
    /// request-scoped instances together
    pub fn create_request_scope(&self) -> Result<RequestId, DiError> {
        self.ensure_live()?;
        let id = RequestId::new();
        let mut requests = self
            .inner
            .requests
            .write()
            .map_err(|_| DiError::lock("request caches"))?;
        requests.insert(id, RequestCache::default());
        tracing::debug!(request = %id, "created request scope");
        Ok(id)
    }

    /// Close a request scope: destroy hooks run in reverse creation order,
    /// every failure is collected, the cache is dropped regardless
    pub async fn release_request_scope(&self, id: RequestId) -> Result<(), DiError> {
        let cache = {
            let mut requests = self
                .inner
                .requests
                .write()
                .map_err(|_| DiError::lock("request caches"))?;
            requests.remove(&id)
        }
        .ok_or_else(|| DiError::context_missing(format!("request scope {} is not active", id)))?;

        tracing::debug!(request = %id, instances = cache.order.len(), "releasing request scope");
        let mut failures = Vec::new();
        destroy_cache(cache, &mut failures).await;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::DisposalFailed { failures })
        }
    }

    // ---- teardown ----

    /// Tear the container down: open request scopes are released, singleton
    /// destroy hooks run in reverse creation order, and every later call
    /// fails with [`DiError::ContainerDisposed`]. Idempotent; hook failures
    /// are collected and reported together.
    pub async fn dispose(&self) -> Result<(), DiError> {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!("disposing container");

        let mut failures = Vec::new();

        let request_caches: Vec<RequestCache> = match self.inner.requests.write() {
            Ok(mut requests) => requests.drain().map(|(_, cache)| cache).collect(),
            Err(_) => {
                failures.push("request caches: lock poisoned".to_string());
                Vec::new()
            }
        };
        for cache in request_caches {
            destroy_cache(cache, &mut failures).await;
        }

        let order: Vec<SlotKey> = match self.inner.singletons.created.lock() {
            Ok(mut created) => std::mem::take(&mut *created),
            Err(_) => {
                failures.push("singleton creation order: lock poisoned".to_string());
                Vec::new()
            }
        };
        let cells = match self.inner.singletons.cells.write() {
            Ok(mut cells) => std::mem::take(&mut *cells),
            Err(_) => {
                failures.push("singleton cache: lock poisoned".to_string());
                HashMap::new()
            }
        };

        for key in order.iter().rev() {
            let entry = cells.get(key).and_then(|cell| cell.get().cloned());
            if let Some(entry) = entry {
                if let Some(hook) = &entry.on_destroy {
                    if let Err(err) = hook(entry.instance.clone()).await {
                        tracing::warn!(token = %key.0, error = %err, "destroy hook failed");
                        failures.push(format!("{}: {}", key.0, err));
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::DisposalFailed { failures })
        }
    }

    // ---- analysis ----

    /// Check the declared graph without instantiating anything. Missing
    /// mandatory dependencies and cycles are errors; scope-lifetime
    /// mismatches (a singleton holding a request-scoped dependency, a
    /// request-scoped provider holding a transient) are warnings.
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let graph = match self.build_graph() {
            Ok(graph) => graph,
            Err(err) => {
                errors.push(format!("graph construction failed: {}", err));
                return ValidationReport {
                    valid: false,
                    errors,
                    warnings,
                };
            }
        };

        let missing = graph.missing_dependencies();
        for token in graph.tokens() {
            if let Some(absent) = missing.get(token) {
                for dep in absent {
                    errors.push(format!("'{}' depends on unregistered '{}'", token, dep));
                }
            }
        }

        for cycle in graph.detect_cycles() {
            let mut path: Vec<String> = cycle.iter().map(|t| t.to_string()).collect();
            if let Some(first) = path.first().cloned() {
                path.push(first);
            }
            errors.push(format!("circular dependency: {}", path.join(" -> ")));
        }

        for token in graph.tokens() {
            let Some(node) = graph.node(token) else {
                continue;
            };
            for edge in &node.dependencies {
                let Some(dep) = graph.node(&edge.token) else {
                    continue;
                };
                match (node.scope, dep.scope) {
                    (Scope::Singleton, Scope::Request) => warnings.push(format!(
                        "singleton '{}' captures request-scoped '{}'",
                        token, edge.token
                    )),
                    (Scope::Request, Scope::Transient) => warnings.push(format!(
                        "request-scoped '{}' captures transient '{}'",
                        token, edge.token
                    )),
                    _ => {}
                }
            }
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn detect_cycles(&self) -> Result<Vec<Vec<Token>>, DiError> {
        Ok(self.build_graph()?.detect_cycles())
    }

    pub fn cycle_analysis(&self) -> Result<CycleAnalysis, DiError> {
        Ok(self.build_graph()?.cycle_analysis())
    }

    pub fn missing_dependencies(&self) -> Result<HashMap<Token, Vec<Token>>, DiError> {
        Ok(self.build_graph()?.missing_dependencies())
    }

    /// Topological order over the merged hierarchy graph, dependencies
    /// before dependents
    pub fn resolution_order(&self) -> Result<Vec<Token>, DiError> {
        self.build_graph()?.resolution_order()
    }

    pub fn visualize(&self) -> Result<String, DiError> {
        Ok(self.build_graph()?.visualize())
    }

    pub fn visualize_dot(&self) -> Result<String, DiError> {
        Ok(self.build_graph()?.visualize_dot())
    }

    pub fn visualize_json(&self) -> Result<String, DiError> {
        self.build_graph()?.visualize_json()
    }

    pub fn statistics(&self) -> Result<ContainerStatistics, DiError> {
        let registry = self
            .inner
            .registry
            .read()
            .map_err(|_| DiError::lock("provider registry"))?;

        let mut singleton_providers = 0;
        let mut transient_providers = 0;
        let mut request_providers = 0;
        for token in registry.tokens() {
            if let Some(def) = registry.lookup(token) {
                match def.scope() {
                    Scope::Singleton => singleton_providers += 1,
                    Scope::Transient => transient_providers += 1,
                    Scope::Request => request_providers += 1,
                }
            }
        }

        let cached_singletons = self
            .inner
            .singletons
            .created
            .lock()
            .map_err(|_| DiError::lock("singleton creation order"))?
            .len();
        let active_request_scopes = self
            .inner
            .requests
            .read()
            .map_err(|_| DiError::lock("request caches"))?
            .len();

        Ok(ContainerStatistics {
            providers: registry.len(),
            singleton_providers,
            transient_providers,
            request_providers,
            cached_singletons,
            active_request_scopes,
            interceptors: self.inner.interceptors.len(),
        })
    }

    // ---- internals ----

    fn ensure_live(&self) -> Result<(), DiError> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(DiError::ContainerDisposed);
        }
        Ok(())
    }

    fn lookup_winning(&self, token: &Token) -> Result<Option<(usize, ProviderDefinition)>, DiError> {
        let registry = self
            .inner
            .registry
            .read()
            .map_err(|_| DiError::lock("provider registry"))?;
        let defs = registry.lookup_all(token);
        Ok(defs.last().cloned().map(|def| (defs.len() - 1, def)))
    }

    fn singleton_cell(
        &self,
        token: &Token,
        index: usize,
    ) -> Result<Arc<OnceCell<CachedEntry>>, DiError> {
        let key = (token.clone(), index);
        {
            let cells = self
                .inner
                .singletons
                .cells
                .read()
                .map_err(|_| DiError::lock("singleton cache"))?;
            if let Some(cell) = cells.get(&key) {
                return Ok(Arc::clone(cell));
            }
        }
        let mut cells = self
            .inner
            .singletons
            .cells
            .write()
            .map_err(|_| DiError::lock("singleton cache"))?;
        Ok(Arc::clone(
            cells.entry(key).or_insert_with(|| Arc::new(OnceCell::new())),
        ))
    }

    fn record_singleton(&self, token: &Token, index: usize) -> Result<(), DiError> {
        let mut created = self
            .inner
            .singletons
            .created
            .lock()
            .map_err(|_| DiError::lock("singleton creation order"))?;
        created.push((token.clone(), index));
        Ok(())
    }

    fn resolution_context(
        &self,
        token: &Token,
        definition: &ProviderDefinition,
        options: &ResolveOptions,
    ) -> ResolutionContext {
        ResolutionContext {
            token: token.clone(),
            requested_by: options.requested_by.clone(),
            request: options.request,
            scope: definition.scope(),
        }
    }

    fn resolution_handle(
        &self,
        token: &Token,
        options: &ResolveOptions,
        state: &Arc<CallState>,
    ) -> Resolution {
        Resolution {
            container: self.clone(),
            state: Arc::clone(state),
            request: options.request,
            requested_by: Some(token.to_string()),
        }
    }

    fn notify_inject(
        &self,
        token: &Token,
        definition: &ProviderDefinition,
        options: &ResolveOptions,
    ) {
        if let Some(observer) = &definition.hooks.on_inject {
            observer(&self.resolution_context(token, definition, options));
        }
    }

    fn build_graph(&self) -> Result<DependencyGraph, DiError> {
        Ok(self.merged_registry()?.to_graph())
    }

    fn merged_registry(&self) -> Result<ProviderRegistry, DiError> {
        let mut merged = match &self.inner.parent {
            Some(parent) => parent.merged_registry()?,
            None => ProviderRegistry::new(),
        };
        let own = self
            .inner
            .registry
            .read()
            .map_err(|_| DiError::lock("provider registry"))?;
        merged.merge_overriding(&own);
        Ok(merged)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field(
                "providers",
                &self.inner.registry.read().map(|r| r.len()).unwrap_or(0),
            )
            .field("has_parent", &self.inner.parent.is_some())
            .field("disposed", &self.inner.disposed.load(Ordering::Acquire))
            .finish()
    }
}

async fn destroy_cache(cache: RequestCache, failures: &mut Vec<String>) {
    for key in cache.order.iter().rev() {
        if let Some(entry) = cache.entries.get(key) {
            if let Some(hook) = &entry.on_destroy {
                if let Err(err) = hook(entry.instance.clone()).await {
                    tracing::warn!(token = %key.0, error = %err, "destroy hook failed");
                    failures.push(format!("{}: {}", key.0, err));
                }
            }
        }
    }
}

fn downcast<T: Send + Sync + 'static>(token: &Token, instance: Instance) -> Result<Arc<T>, DiError> {
    instance.downcast::<T>().map_err(|_| DiError::TypeMismatch {
        token: token.to_string(),
        expected: std::any::type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::provider::DependencySpec;

    #[test]
    fn test_singleton_resolves_to_same_instance() {
        let container = Container::new();
        container
            .register(
                Token::key("counter"),
                ProviderDefinition::factory(|_res| Ok(Mutex::new(0u32))),
            )
            .unwrap();

        let a = container.get::<Mutex<u32>>(&Token::key("counter")).unwrap();
        let b = container.get::<Mutex<u32>>(&Token::key("counter")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_transient_resolves_fresh_instances() {
        let container = Container::new();
        container
            .register(
                Token::key("buf"),
                ProviderDefinition::factory(|_res| Ok(Vec::<u8>::new()))
                    .with_scope(Scope::Transient),
            )
            .unwrap();

        let a = container.get::<Vec<u8>>(&Token::key("buf")).unwrap();
        let b = container.get::<Vec<u8>>(&Token::key("buf")).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_not_found_and_optional() {
        let container = Container::new();
        let err = container.get::<u32>(&Token::key("ghost")).unwrap_err();
        assert!(err.is_not_found());
        assert!(container
            .get_optional::<u32>(&Token::key("ghost"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_type_mismatch() {
        let container = Container::new();
        container
            .register(Token::key("n"), ProviderDefinition::value(5u32))
            .unwrap();
        let err = container.get::<String>(&Token::key("n")).unwrap_err();
        assert!(matches!(err, DiError::TypeMismatch { .. }));
    }

    #[test]
    fn test_runtime_cycle_unwinds_cleanly() {
        let container = Container::new();
        container
            .register(
                Token::key("a"),
                ProviderDefinition::factory(|res| {
                    res.get::<String>(&Token::key("b")).map(|_| "a".to_string())
                }),
            )
            .unwrap();
        container
            .register(
                Token::key("b"),
                ProviderDefinition::factory(|res| {
                    res.get::<String>(&Token::key("a")).map(|_| "b".to_string())
                }),
            )
            .unwrap();

        let err = container.get::<String>(&Token::key("a")).unwrap_err();
        assert!(err.is_circular());
        assert!(err.to_string().contains("a -> b -> a"));

        // nothing half-built got cached; the same failure repeats
        let err = container.get::<String>(&Token::key("a")).unwrap_err();
        assert!(err.is_circular());
    }

    #[test]
    fn test_child_shadows_parent() {
        let parent = Container::new();
        parent
            .register(Token::key("name"), ProviderDefinition::value("parent".to_string()))
            .unwrap();
        let child = parent.child();

        assert_eq!(*child.get::<String>(&Token::key("name")).unwrap(), "parent");

        child
            .register(Token::key("name"), ProviderDefinition::value("child".to_string()))
            .unwrap();
        assert_eq!(*child.get::<String>(&Token::key("name")).unwrap(), "child");

        // self_only refuses parent fallback, skip_self refuses own binding
        let err = child
            .get_with::<String>(&Token::key("missing"), ResolveOptions::new().self_only())
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            *child
                .get_with::<String>(&Token::key("name"), ResolveOptions::new().skip_self())
                .unwrap(),
            "parent"
        );
    }

    #[test]
    fn test_sync_get_of_async_factory_fails() {
        let container = Container::new();
        container
            .register(
                Token::key("db"),
                ProviderDefinition::async_factory(|_res| {
                    Box::pin(async { Ok("pool".to_string()) })
                        as BoxFuture<'static, Result<String, DiError>>
                }),
            )
            .unwrap();

        let err = container.get::<String>(&Token::key("db")).unwrap_err();
        assert!(matches!(err, DiError::AsyncResolutionRequired { .. }));
    }

    #[test]
    fn test_validate_reports_missing_and_warns_on_captive() {
        let container = Container::new();
        container
            .register(
                Token::key("svc"),
                ProviderDefinition::factory(|_res| Ok(()))
                    .depends_on(Token::key("absent"))
                    .depends_on(Token::key("ctx")),
            )
            .unwrap();
        container
            .register(
                Token::key("ctx"),
                ProviderDefinition::factory(|_res| Ok(())).with_scope(Scope::Request),
            )
            .unwrap();

        let report = container.validate();
        assert!(!report.valid);
        assert_eq!(
            report.errors,
            vec!["'svc' depends on unregistered 'absent'".to_string()]
        );
        assert_eq!(
            report.warnings,
            vec!["singleton 'svc' captures request-scoped 'ctx'".to_string()]
        );
    }

    #[test]
    fn test_validate_optional_dependency_is_not_missing() {
        let container = Container::new();
        container
            .register(
                Token::key("svc"),
                ProviderDefinition::factory(|_res| Ok(()))
                    .with_dependencies(vec![DependencySpec::optional(Token::key("metrics"))]),
            )
            .unwrap();

        assert!(container.validate().valid);
    }

    #[test]
    fn test_alias_resolves_target() {
        let container = Container::new();
        container
            .register(Token::key("primary"), ProviderDefinition::value(7u32))
            .unwrap();
        container
            .register(
                Token::key("alias"),
                ProviderDefinition::alias(Token::key("primary")),
            )
            .unwrap();

        let direct = container.get::<u32>(&Token::key("primary")).unwrap();
        let aliased = container.get::<u32>(&Token::key("alias")).unwrap();
        assert!(Arc::ptr_eq(&direct, &aliased));
    }

    #[test]
    fn test_mutual_aliases_error_instead_of_recursing() {
        let container = Container::new();
        container
            .register(Token::key("a"), ProviderDefinition::alias(Token::key("b")))
            .unwrap();
        container
            .register(Token::key("b"), ProviderDefinition::alias(Token::key("a")))
            .unwrap();

        let err = container.get::<u32>(&Token::key("a")).unwrap_err();
        assert!(err.is_circular());
    }

    #[test]
    fn test_self_alias_errors() {
        let container = Container::new();
        container
            .register(
                Token::key("echo"),
                ProviderDefinition::alias(Token::key("echo")),
            )
            .unwrap();

        let err = container.get::<u32>(&Token::key("echo")).unwrap_err();
        assert!(err.is_circular());
    }

    #[test]
    fn test_validate_alias_of_request_scope_is_not_captive() {
        let container = Container::new();
        container
            .register(
                Token::key("ctx"),
                ProviderDefinition::factory(|_res| Ok(())).with_scope(Scope::Request),
            )
            .unwrap();
        container
            .register(
                Token::key("ctx_alias"),
                ProviderDefinition::alias(Token::key("ctx")),
            )
            .unwrap();

        let report = container.validate();
        assert!(report.valid, "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
    }

    #[tokio::test]
    async fn test_dispose_makes_container_unusable() {
        let container = Container::new();
        container
            .register(Token::key("n"), ProviderDefinition::value(1u32))
            .unwrap();
        container.dispose().await.unwrap();

        let err = container.get::<u32>(&Token::key("n")).unwrap_err();
        assert!(matches!(err, DiError::ContainerDisposed));
        // second dispose is a no-op
        container.dispose().await.unwrap();
    }
}
