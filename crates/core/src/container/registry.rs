//! Provider registry: token to definition mapping with multi-binding support
//!
//! Non-multi registrations replace any previous binding for the token;
//! multi registrations accumulate in registration order. Registration order
//! across tokens is preserved so graph analysis and visualization stay
//! deterministic.

use std::collections::{HashMap, HashSet};

use crate::container::graph::DependencyGraph;
use crate::container::provider::{ProviderDefinition, ProviderKind};
use crate::container::scope::Scope;
use crate::container::token::Token;

#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Token, Vec<ProviderDefinition>>,
    order: Vec<Token>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for a token. A non-multi definition replaces
    /// everything previously bound; a multi definition appends.
    pub fn register(&mut self, token: Token, definition: ProviderDefinition) {
        tracing::debug!(
            token = %token,
            scope = %definition.scope(),
            multi = definition.is_multi(),
            "registering provider"
        );

        let entry = self.providers.entry(token.clone()).or_default();
        if entry.is_empty() {
            self.order.push(token);
        }
        if definition.is_multi() {
            entry.push(definition);
        } else {
            entry.clear();
            entry.push(definition);
        }
    }

    /// Register a batch, preserving iteration order
    pub fn register_all<I>(&mut self, definitions: I)
    where
        I: IntoIterator<Item = (Token, ProviderDefinition)>,
    {
        for (token, definition) in definitions {
            self.register(token, definition);
        }
    }

    /// The winning definition for a token (the most recent one)
    pub fn lookup(&self, token: &Token) -> Option<&ProviderDefinition> {
        self.providers.get(token).and_then(|defs| defs.last())
    }

    /// Every registered definition for a token, in registration order
    pub fn lookup_all(&self, token: &Token) -> &[ProviderDefinition] {
        self.providers
            .get(token)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has(&self, token: &Token) -> bool {
        self.providers
            .get(token)
            .map(|defs| !defs.is_empty())
            .unwrap_or(false)
    }

    /// Registered tokens in first-registration order
    pub fn tokens(&self) -> &[Token] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Overlay another registry on top of this one. Every token bound in
    /// `other` replaces this registry's bindings wholesale; used to merge a
    /// container hierarchy for graph analysis, child bindings winning.
    pub fn merge_overriding(&mut self, other: &ProviderRegistry) {
        for token in other.tokens() {
            let defs = other.lookup_all(token).to_vec();
            if defs.is_empty() {
                continue;
            }
            if !self.providers.contains_key(token) {
                self.order.push(token.clone());
            }
            self.providers.insert(token.clone(), defs);
        }
    }

    /// Build the static dependency graph from declared dependencies.
    ///
    /// For a multi-bound token the node's edges are the union of every
    /// registration's declared dependencies; an alias contributes a single
    /// edge to its target. Lazy edges are kept: the graph reports what the
    /// registrations declare, not what runtime deferral hides.
    pub fn to_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for token in &self.order {
            let defs = self.lookup_all(token);
            let Some(winning) = defs.last() else {
                continue;
            };

            if let ProviderKind::Alias(target) = &winning.kind {
                let scope = self.alias_target_scope(target);
                graph.add_alias_node(token.clone(), target.clone(), scope);
                continue;
            }

            let mut edges = Vec::new();
            for def in defs {
                for dep in def.dependencies() {
                    if !edges
                        .iter()
                        .any(|(t, _): &(Token, bool)| t == &dep.token)
                    {
                        edges.push((dep.token.clone(), dep.modifiers.optional));
                    }
                }
            }
            graph.add_node(token.clone(), edges, winning.scope());
        }
        graph.refresh_analysis();
        graph
    }

    /// The effective scope behind an alias, following alias chains.
    /// Unregistered or cyclic targets fall back to the default scope; the
    /// graph reports those as missing or circular separately.
    fn alias_target_scope(&self, target: &Token) -> Scope {
        let mut seen = HashSet::new();
        let mut current = target.clone();
        while seen.insert(current.clone()) {
            match self.lookup(&current) {
                Some(def) => match &def.kind {
                    ProviderKind::Alias(next) => current = next.clone(),
                    _ => return def.scope(),
                },
                None => break,
            }
        }
        Scope::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::scope::Scope;

    fn noop() -> ProviderDefinition {
        ProviderDefinition::factory(|_res| Ok(()))
    }

    #[test]
    fn test_non_multi_registration_replaces() {
        let mut registry = ProviderRegistry::new();
        registry.register(Token::key("svc"), noop().with_scope(Scope::Transient));
        registry.register(Token::key("svc"), noop());

        assert_eq!(registry.lookup_all(&Token::key("svc")).len(), 1);
        assert_eq!(
            registry.lookup(&Token::key("svc")).map(|d| d.scope()),
            Some(Scope::Singleton)
        );
    }

    #[test]
    fn test_multi_registration_accumulates_in_order() {
        let mut registry = ProviderRegistry::new();
        registry.register(Token::key("plugin"), ProviderDefinition::value(1u32).multi());
        registry.register(Token::key("plugin"), ProviderDefinition::value(2u32).multi());
        registry.register(Token::key("plugin"), ProviderDefinition::value(3u32).multi());

        assert_eq!(registry.lookup_all(&Token::key("plugin")).len(), 3);
        assert_eq!(registry.tokens(), &[Token::key("plugin")]);
    }

    #[test]
    fn test_tokens_preserve_first_registration_order() {
        let mut registry = ProviderRegistry::new();
        registry.register(Token::key("b"), noop());
        registry.register(Token::key("a"), noop());
        registry.register(Token::key("b"), noop());

        assert_eq!(registry.tokens(), &[Token::key("b"), Token::key("a")]);
    }

    #[test]
    fn test_alias_node_carries_target_scope() {
        let mut registry = ProviderRegistry::new();
        registry.register(Token::key("ctx"), noop().with_scope(Scope::Request));
        registry.register(
            Token::key("ctx_alias"),
            ProviderDefinition::alias(Token::key("ctx")),
        );
        // a second hop still lands on the target's scope
        registry.register(
            Token::key("ctx_alias2"),
            ProviderDefinition::alias(Token::key("ctx_alias")),
        );

        let graph = registry.to_graph();
        assert_eq!(
            graph.node(&Token::key("ctx_alias")).unwrap().scope,
            Scope::Request
        );
        assert_eq!(
            graph.node(&Token::key("ctx_alias2")).unwrap().scope,
            Scope::Request
        );
    }

    #[test]
    fn test_graph_unions_multi_dependencies() {
        let mut registry = ProviderRegistry::new();
        registry.register(
            Token::key("plugin"),
            noop().multi().depends_on(Token::key("db")),
        );
        registry.register(
            Token::key("plugin"),
            noop().multi().depends_on(Token::key("cache")),
        );

        let graph = registry.to_graph();
        let node = graph.node(&Token::key("plugin")).unwrap();
        let deps: Vec<_> = node.dependencies.iter().map(|e| e.token.clone()).collect();
        assert_eq!(deps, vec![Token::key("db"), Token::key("cache")]);
    }
}
