//! Resolution call state and the handle factories resolve through
//!
//! Every top-level `get` opens a [`CallState`] carrying the in-flight token
//! stack; nested resolutions inside factories share it, which is how
//! runtime cycle detection works. [`Resolution`] is the owned handle passed
//! into factories: it clones the container and the shared state, so async
//! factories can move it into their futures without borrowing anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::container::container::Container;
use crate::container::lazy::Lazy;
use crate::container::scope::{RequestId, Scope};
use crate::container::token::Token;
use crate::errors::DiError;

/// Per-call resolution options
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Consult only this container's own registry
    pub self_only: bool,
    /// Consult only parent containers
    pub skip_self: bool,
    /// Active request scope, required for request-scoped providers
    pub request: Option<RequestId>,
    /// The token whose factory initiated this resolution, for diagnostics
    pub requested_by: Option<String>,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn self_only(mut self) -> Self {
        self.self_only = true;
        self
    }

    pub fn skip_self(mut self) -> Self {
        self.skip_self = true;
        self
    }

    pub fn in_request(mut self, request: RequestId) -> Self {
        self.request = Some(request);
        self
    }
}

/// Snapshot handed to interceptors and inject observers
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub token: Token,
    pub requested_by: Option<String>,
    pub request: Option<RequestId>,
    pub scope: Scope,
}

/// In-flight token stack for error reporting and cycle detection
#[derive(Debug, Clone, Default)]
pub struct ResolutionPath {
    tokens: Vec<Token>,
}

impl ResolutionPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    pub fn pop(&mut self) -> Option<Token> {
        self.tokens.pop()
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.tokens.contains(token)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The path as a string for error messages
    pub fn path_string(&self) -> String {
        self.tokens
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Shared state of one top-level resolution call
#[derive(Debug, Default)]
pub struct CallState {
    stack: Mutex<ResolutionPath>,
    closed: AtomicBool,
}

impl CallState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Push a token onto the in-flight stack, failing if it is already
    /// there. The returned guard pops on drop, so the stack stays balanced
    /// on every exit path.
    pub fn enter(self: &Arc<Self>, token: &Token) -> Result<StackGuard, DiError> {
        let mut stack = self
            .stack
            .lock()
            .map_err(|_| DiError::lock("resolution stack"))?;

        if stack.contains(token) {
            let mut path = stack.clone();
            path.push(token.clone());
            return Err(DiError::CircularDependency {
                token: token.to_string(),
                path: path.path_string(),
            });
        }

        stack.push(token.clone());
        Ok(StackGuard {
            state: Arc::clone(self),
        })
    }

    pub fn path_string(&self) -> String {
        self.stack
            .lock()
            .map(|s| s.path_string())
            .unwrap_or_default()
    }

    /// Fail if the token is already in flight in this call chain. Used
    /// before awaiting a shared construction slot, where the repeat token
    /// would otherwise wait on its own in-progress initialization.
    pub fn check_not_in_flight(&self, token: &Token) -> Result<(), DiError> {
        let stack = self
            .stack
            .lock()
            .map_err(|_| DiError::lock("resolution stack"))?;
        if stack.contains(token) {
            let mut path = stack.clone();
            path.push(token.clone());
            return Err(DiError::CircularDependency {
                token: token.to_string(),
                path: path.path_string(),
            });
        }
        Ok(())
    }

    /// Mark the call finished; resolution handles escaping the factory that
    /// received them fail from then on.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Popped-on-drop stack entry
#[derive(Debug)]
pub struct StackGuard {
    state: Arc<CallState>,
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        if let Ok(mut stack) = self.state.stack.lock() {
            stack.pop();
        }
    }
}

/// Owned handle a factory resolves its dependencies through.
///
/// Shares the originating call's [`CallState`] so nested resolutions see
/// the full in-flight stack. Valid only for the duration of the factory
/// invocation; the container closes the state when the top-level call
/// returns.
#[derive(Clone)]
pub struct Resolution {
    pub(crate) container: Container,
    pub(crate) state: Arc<CallState>,
    pub(crate) request: Option<RequestId>,
    pub(crate) requested_by: Option<String>,
}

impl Resolution {
    fn ensure_open(&self) -> Result<(), DiError> {
        if self.state.is_closed() {
            return Err(DiError::context_missing(
                "resolution handle used after its originating call completed",
            ));
        }
        Ok(())
    }

    fn options(&self) -> ResolveOptions {
        ResolveOptions {
            self_only: false,
            skip_self: false,
            request: self.request,
            requested_by: self.requested_by.clone(),
        }
    }

    /// Resolve a mandatory dependency
    pub fn get<T: Send + Sync + 'static>(&self, token: &Token) -> Result<Arc<T>, DiError> {
        self.ensure_open()?;
        self.container
            .get_nested::<T>(token, self.options(), &self.state)
    }

    /// Resolve with explicit options (`self_only`, `skip_self`)
    pub fn get_with<T: Send + Sync + 'static>(
        &self,
        token: &Token,
        mut options: ResolveOptions,
    ) -> Result<Arc<T>, DiError> {
        self.ensure_open()?;
        if options.request.is_none() {
            options.request = self.request;
        }
        options.requested_by = self.requested_by.clone();
        self.container.get_nested::<T>(token, options, &self.state)
    }

    /// Resolve an optional dependency; an unregistered token yields `None`,
    /// any other failure is still an error
    pub fn get_optional<T: Send + Sync + 'static>(
        &self,
        token: &Token,
    ) -> Result<Option<Arc<T>>, DiError> {
        match self.get::<T>(token) {
            Ok(instance) => Ok(Some(instance)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolve every multi-bound provider for a token, registration order
    pub fn get_all<T: Send + Sync + 'static>(&self, token: &Token) -> Result<Vec<Arc<T>>, DiError> {
        self.ensure_open()?;
        self.container
            .get_all_nested::<T>(token, self.options(), &self.state)
    }

    /// Defer a dependency behind a lazy wrapper; nothing is resolved until
    /// the wrapper's value is first requested
    pub fn get_lazy<T: Send + Sync + 'static>(&self, token: &Token) -> Lazy<T> {
        Lazy::new(token.clone(), self.container.clone(), self.request)
    }

    /// Async counterpart of [`get`](Self::get); reaches async factories
    pub async fn get_async<T: Send + Sync + 'static>(
        &self,
        token: &Token,
    ) -> Result<Arc<T>, DiError> {
        self.ensure_open()?;
        self.container
            .get_nested_async::<T>(token, self.options(), &self.state)
            .await
    }

    /// The active request scope, if this resolution runs inside one
    pub fn request(&self) -> Option<RequestId> {
        self.request
    }
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("request", &self.request)
            .field("requested_by", &self.requested_by)
            .field("closed", &self.state.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_detects_repeat_token() {
        let state = CallState::new();
        let _a = state.enter(&Token::key("a")).unwrap();
        let _b = state.enter(&Token::key("b")).unwrap();

        let err = state.enter(&Token::key("a")).unwrap_err();
        assert!(err.is_circular());
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn test_guard_pops_on_drop() {
        let state = CallState::new();
        {
            let _a = state.enter(&Token::key("a")).unwrap();
            assert_eq!(state.path_string(), "a");
        }
        assert_eq!(state.path_string(), "");
        // the token can be entered again once the guard is gone
        let _a = state.enter(&Token::key("a")).unwrap();
    }

    #[test]
    fn test_close_is_observable() {
        let state = CallState::new();
        assert!(!state.is_closed());
        state.close();
        assert!(state.is_closed());
    }
}
