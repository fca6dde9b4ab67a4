//! wyre-core: a scope-aware dependency-injection runtime.
//!
//! Providers (factories, constant values, aliases) are registered under
//! [`Token`]s; the [`Container`] constructs the object graph on demand,
//! enforcing singleton/transient/request scoping, guarding against circular
//! dependencies, and running an interceptor chain around every construction.
//! A parallel, non-executing [`DependencyGraph`] supports cycle detection,
//! topological resolution ordering and missing-dependency reporting before
//! anything is instantiated.

pub mod container;
pub mod errors;

// Re-export key types for convenience
pub use container::{
    AsyncInitializable, AsyncNext, BoxFuture, Container, ContainerStatistics, CycleAnalysis, DependencyEdge,
    DependencyGraph, DependencyNode, DependencySpec, Disposable, Initializable, Instance,
    InterceptorChain, Lazy, Modifiers, Next, ProviderDefinition, ProviderKind, ProviderRegistry,
    RequestId, Resolution, ResolutionContext, ResolveInterceptor, ResolveOptions, Scope, Token,
    ValidationReport,
};
pub use errors::DiError;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
