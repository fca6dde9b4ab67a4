//! Resolution interceptors
//!
//! Interceptors wrap instance construction in registration order: the first
//! added is outermost. An interceptor can observe, replace the produced
//! instance, or short-circuit without calling through. Cached hits bypass
//! the chain; it runs only when an instance is actually constructed.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::container::context::ResolutionContext;
use crate::container::provider::{BoxFuture, Instance};
use crate::errors::DiError;

/// A resolution interceptor.
///
/// Implement `before`/`after` for hook-style interception that works on
/// both the sync and async paths, or override `intercept` /
/// `intercept_async` directly for full control over the continuation.
#[async_trait]
pub trait ResolveInterceptor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs before construction; an error aborts the resolution
    fn before(&self, _ctx: &ResolutionContext) -> Result<(), DiError> {
        Ok(())
    }

    /// Runs after construction; may replace the instance
    fn after(&self, _ctx: &ResolutionContext, instance: Instance) -> Result<Instance, DiError> {
        Ok(instance)
    }

    fn intercept(&self, ctx: &ResolutionContext, next: Next<'_>) -> Result<Instance, DiError> {
        self.before(ctx)?;
        let instance = next.run()?;
        self.after(ctx, instance)
    }

    async fn intercept_async(
        &self,
        ctx: &ResolutionContext,
        next: AsyncNext<'_>,
    ) -> Result<Instance, DiError> {
        self.before(ctx)?;
        let instance = next.run().await?;
        self.after(ctx, instance)
    }
}

/// Continuation of the synchronous chain
pub struct Next<'a> {
    chain: &'a [Arc<dyn ResolveInterceptor>],
    ctx: &'a ResolutionContext,
    terminal: Box<dyn FnOnce() -> Result<Instance, DiError> + Send>,
}

impl<'a> Next<'a> {
    pub fn run(self) -> Result<Instance, DiError> {
        match self.chain.split_first() {
            Some((head, tail)) => head.intercept(
                self.ctx,
                Next {
                    chain: tail,
                    ctx: self.ctx,
                    terminal: self.terminal,
                },
            ),
            None => (self.terminal)(),
        }
    }
}

/// Continuation of the asynchronous chain
pub struct AsyncNext<'a> {
    chain: &'a [Arc<dyn ResolveInterceptor>],
    ctx: &'a ResolutionContext,
    terminal: BoxFuture<'static, Result<Instance, DiError>>,
}

impl<'a> AsyncNext<'a> {
    pub fn run(self) -> BoxFuture<'a, Result<Instance, DiError>> {
        match self.chain.split_first() {
            Some((head, tail)) => head.intercept_async(
                self.ctx,
                AsyncNext {
                    chain: tail,
                    ctx: self.ctx,
                    terminal: self.terminal,
                },
            ),
            None => self.terminal,
        }
    }
}

/// Ordered interceptor chain shared by a container
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: RwLock<Vec<Arc<dyn ResolveInterceptor>>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, interceptor: Arc<dyn ResolveInterceptor>) -> Result<(), DiError> {
        let mut chain = self
            .interceptors
            .write()
            .map_err(|_| DiError::lock("interceptor chain"))?;
        tracing::debug!(interceptor = interceptor.name(), "adding resolve interceptor");
        chain.push(interceptor);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), DiError> {
        let mut chain = self
            .interceptors
            .write()
            .map_err(|_| DiError::lock("interceptor chain"))?;
        chain.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.interceptors.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Result<Vec<Arc<dyn ResolveInterceptor>>, DiError> {
        self.interceptors
            .read()
            .map(|c| c.clone())
            .map_err(|_| DiError::lock("interceptor chain"))
    }

    /// Run the chain around a synchronous construction
    pub fn execute<F>(&self, ctx: &ResolutionContext, construct: F) -> Result<Instance, DiError>
    where
        F: FnOnce() -> Result<Instance, DiError> + Send + 'static,
    {
        let chain = self.snapshot()?;
        Next {
            chain: &chain,
            ctx,
            terminal: Box::new(construct),
        }
        .run()
    }

    /// Run the chain around an asynchronous construction
    pub async fn execute_async(
        &self,
        ctx: &ResolutionContext,
        construct: BoxFuture<'static, Result<Instance, DiError>>,
    ) -> Result<Instance, DiError> {
        let chain = self.snapshot()?;
        AsyncNext {
            chain: &chain,
            ctx,
            terminal: construct,
        }
        .run()
        .await
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::scope::Scope;
    use crate::container::token::Token;
    use std::sync::Mutex;

    fn ctx() -> ResolutionContext {
        ResolutionContext {
            token: Token::key("svc"),
            requested_by: None,
            request: None,
            scope: Scope::Singleton,
        }
    }

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ResolveInterceptor for Recorder {
        fn before(&self, _ctx: &ResolutionContext) -> Result<(), DiError> {
            self.log.lock().unwrap().push(format!("{}:before", self.label));
            Ok(())
        }

        fn after(&self, _ctx: &ResolutionContext, instance: Instance) -> Result<Instance, DiError> {
            self.log.lock().unwrap().push(format!("{}:after", self.label));
            Ok(instance)
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl ResolveInterceptor for ShortCircuit {
        fn intercept(&self, _ctx: &ResolutionContext, _next: Next<'_>) -> Result<Instance, DiError> {
            Ok(Arc::new(99u32))
        }
    }

    #[test]
    fn test_chain_runs_in_added_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new();
        chain
            .add(Arc::new(Recorder {
                label: "outer",
                log: Arc::clone(&log),
            }))
            .unwrap();
        chain
            .add(Arc::new(Recorder {
                label: "inner",
                log: Arc::clone(&log),
            }))
            .unwrap();

        let instance = chain.execute(&ctx(), || Ok(Arc::new(1u32) as Instance)).unwrap();
        assert_eq!(*instance.downcast::<u32>().unwrap(), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer:before", "inner:before", "inner:after", "outer:after"]
        );
    }

    #[test]
    fn test_short_circuit_replaces_construction() {
        let chain = InterceptorChain::new();
        chain.add(Arc::new(ShortCircuit)).unwrap();

        let instance = chain
            .execute(&ctx(), || {
                Err(DiError::construction("terminal must not run"))
            })
            .unwrap();
        assert_eq!(*instance.downcast::<u32>().unwrap(), 99);
    }

    #[tokio::test]
    async fn test_hook_interceptor_participates_in_async_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new();
        chain
            .add(Arc::new(Recorder {
                label: "hook",
                log: Arc::clone(&log),
            }))
            .unwrap();

        let instance = chain
            .execute_async(&ctx(), Box::pin(async { Ok(Arc::new(7u32) as Instance) }))
            .await
            .unwrap();
        assert_eq!(*instance.downcast::<u32>().unwrap(), 7);
        assert_eq!(*log.lock().unwrap(), vec!["hook:before", "hook:after"]);
    }
}
