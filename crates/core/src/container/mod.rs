#[allow(clippy::module_inception)]
pub mod container;
pub mod context;
pub mod graph;
pub mod interceptor;
pub mod lazy;
pub mod lifecycle;
pub mod provider;
pub mod registry;
pub mod scope;
pub mod token;

pub use container::{Container, ContainerStatistics, ValidationReport};
pub use context::{Resolution, ResolutionContext, ResolveOptions};
pub use graph::{CycleAnalysis, DependencyEdge, DependencyGraph, DependencyNode};
pub use interceptor::{AsyncNext, InterceptorChain, Next, ResolveInterceptor};
pub use lazy::Lazy;
pub use lifecycle::{AsyncInitializable, Disposable, Initializable};
pub use provider::{
    BoxFuture, DependencySpec, Instance, Modifiers, ProviderDefinition, ProviderKind,
};
pub use registry::ProviderRegistry;
pub use scope::{RequestId, Scope};
pub use token::Token;
