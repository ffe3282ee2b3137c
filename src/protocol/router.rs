//! # DN Router
//!
//! A prefix trie keyed by RDN components, walked from the root of the DN
//! towards the leaf. The router appends a synthetic `op=<kind>` component
//! at the root end of every path so one trie serves every operation kind:
//!
//! ```text
//! uid=:id,ou=Users,dc=example,dc=com  (bind)
//!   -> op=bind / dc=com / dc=example / ou=Users / uid=:id
//! ```
//!
//! A component whose value starts with `:` is a wildcard that matches any
//! value and captures it under that name. At every step an exact literal
//! child is tried before any wildcard child; among wildcard children, the
//! one with fewer wildcard values is tried first, then key order. The walk
//! backtracks, so a literal branch that dead-ends still lets a wildcard
//! sibling match. When nothing is bound at full depth, the deepest bound
//! ancestor over all branches wins; equal depths keep precedence order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::{ProtocolError, Result};
use crate::protocol::dn::{Dn, Rdn, WILDCARD_PREFIX};
use crate::service::handler::Handler;

#[inline]
fn is_wildcard(value: &str) -> bool {
    value.starts_with(WILDCARD_PREFIX)
}

fn wildcard_count(key: &Rdn) -> usize {
    key.iter().filter(|(_, v)| is_wildcard(v)).count()
}

fn key_matches(key: &Rdn, component: &Rdn) -> bool {
    key.same_format(component)
        && key
            .iter()
            .all(|(attr, v)| is_wildcard(v) || component.get(attr) == Some(v))
}

struct Node<V> {
    value: Option<V>,
    children: BTreeMap<Rdn, Node<V>>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

impl<V> Node<V> {
    /// Children that can consume `component`, in precedence order
    fn candidates<'a>(&'a self, component: &Rdn) -> Vec<(&'a Rdn, &'a Node<V>)> {
        let mut out: Vec<_> = self.children.get_key_value(component).into_iter().collect();
        let mut wild: Vec<_> = self
            .children
            .iter()
            .filter(|(key, _)| wildcard_count(key) > 0 && key_matches(key, component))
            .collect();
        wild.sort_by_key(|(key, _)| wildcard_count(key));
        out.extend(wild);
        out
    }

    /// First value bound at the full depth of `path`
    fn find(&self, path: &[&Rdn]) -> Option<&V> {
        let Some((head, rest)) = path.split_first() else {
            return self.value.as_ref();
        };
        self.candidates(head)
            .into_iter()
            .find_map(|(_, child)| child.find(rest))
    }

    /// Deepest bound node along any branch `path` can take
    fn deepest<'a>(&'a self, path: &[&Rdn], trail: &mut Vec<&'a Rdn>, best: &mut Option<Best<'a, V>>) {
        if let Some(value) = &self.value {
            if best.as_ref().map_or(true, |b| trail.len() > b.trail.len()) {
                *best = Some(Best {
                    value,
                    trail: trail.clone(),
                });
            }
        }
        let Some((head, rest)) = path.split_first() else {
            return;
        };
        for (key, child) in self.candidates(head) {
            trail.push(key);
            child.deepest(rest, trail, best);
            trail.pop();
            if best.as_ref().is_some_and(|b| b.trail.len() == trail.len() + 1 + rest.len()) {
                return;
            }
        }
    }
}

struct Best<'a, V> {
    value: &'a V,
    trail: Vec<&'a Rdn>,
}

/// Result of a [`Trie::matches`] walk
#[derive(Debug)]
pub struct TrieMatch<'a, V> {
    pub value: &'a V,
    /// Pattern of the bound node, leaf first
    pub pattern: Dn,
    /// Concrete DN prefix that reached it, leaf first
    pub matched: Dn,
    /// Wildcard name to captured value; the binding nearest the root wins
    pub captures: HashMap<String, String>,
}

/// Prefix trie over DN components
pub struct Trie<V> {
    root: Node<V>,
}

impl<V> Default for Trie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Trie<V> {
    pub fn new() -> Self {
        Self {
            root: Node::default(),
        }
    }

    /// Bind `value` at `path`, returning any value it replaces
    pub fn insert(&mut self, path: &Dn, value: V) -> Option<V> {
        let mut node = &mut self.root;
        for component in path.iter().rev() {
            node = node.children.entry(component.clone()).or_default();
        }
        node.value.replace(value)
    }

    /// Value bound exactly at a path matching `path`
    pub fn lookup(&self, path: &Dn) -> Option<&V> {
        let components: Vec<&Rdn> = path.iter().rev().collect();
        self.root.find(&components)
    }

    /// Value at `path`, or at its nearest bound ancestor
    pub fn matches(&self, path: &Dn) -> Option<TrieMatch<'_, V>> {
        let components: Vec<&Rdn> = path.iter().rev().collect();
        let mut best = None;
        self.root.deepest(&components, &mut Vec::new(), &mut best);
        let Best { value, trail } = best?;

        let mut captures = HashMap::new();
        for (key, actual) in trail.iter().zip(&components) {
            for (attr, v) in key.iter() {
                let (Some(name), Some(got)) = (v.strip_prefix(WILDCARD_PREFIX), actual.get(attr))
                else {
                    continue;
                };
                captures
                    .entry(name.to_string())
                    .or_insert_with(|| got.to_string());
            }
        }

        let pattern = Dn::from_rdns(trail.iter().rev().map(|k| (*k).clone()).collect());
        let matched = Dn::from_rdns(
            components[..trail.len()]
                .iter()
                .rev()
                .map(|c| (*c).clone())
                .collect(),
        );

        Some(TrieMatch {
            value,
            pattern,
            matched,
            captures,
        })
    }
}

/// Operation kinds that are routed by DN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Bind,
    Search,
    Add,
    Delete,
    Modify,
    ModifyDn,
    Compare,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Bind => "bind",
            OperationKind::Search => "search",
            OperationKind::Add => "add",
            OperationKind::Delete => "delete",
            OperationKind::Modify => "modify",
            OperationKind::ModifyDn => "modifydn",
            OperationKind::Compare => "compare",
        }
    }

    #[inline]
    fn component(self) -> Rdn {
        Rdn::new("op", self.as_str())
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved handler together with what the walk learned
#[derive(Clone)]
pub struct Route {
    pub handler: Arc<dyn Handler>,
    /// Registered pattern that produced the match
    pub pattern: Dn,
    /// Values captured by `:name` components
    pub params: HashMap<String, String>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern.to_string())
            .field("params", &self.params)
            .finish()
    }
}

fn with_operation(dn: &Dn, kind: OperationKind) -> Dn {
    let mut rdns = dn.rdns().to_vec();
    rdns.push(kind.component());
    Dn::from_rdns(rdns)
}

/// Maps (operation kind, DN pattern) to handlers.
///
/// Built before the server starts; shared read-only by every connection.
#[derive(Default)]
pub struct Router {
    trie: Trie<Arc<dyn Handler>>,
    fallback: Option<Arc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind` requests at or below `pattern`.
    ///
    /// An empty pattern registers the handler for every DN of that kind.
    pub fn route(&mut self, kind: OperationKind, pattern: &str, handler: Arc<dyn Handler>) -> Result<&mut Self> {
        let dn = Dn::parse(pattern).map_err(|e| {
            ProtocolError::ConfigError(format!("invalid route pattern {pattern:?}: {}", e.message))
        })?;
        tracing::info!(operation = %kind, pattern = %dn, "Registered route");
        self.trie.insert(&with_operation(&dn, kind), handler);
        Ok(self)
    }

    /// Handler used when no route matches
    pub fn fallback(&mut self, handler: Arc<dyn Handler>) -> &mut Self {
        self.fallback = Some(handler);
        self
    }

    /// Most specific handler for `kind` on `dn`
    pub fn resolve(&self, kind: OperationKind, dn: &Dn) -> Option<Route> {
        match self.trie.matches(&with_operation(dn, kind)) {
            Some(found) => {
                let mut pattern = found.pattern.rdns().to_vec();
                pattern.pop();
                Some(Route {
                    handler: Arc::clone(found.value),
                    pattern: Dn::from_rdns(pattern),
                    params: found.captures,
                })
            }
            None => self.fallback.as_ref().map(|handler| Route {
                handler: Arc::clone(handler),
                pattern: Dn::root(),
                params: HashMap::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn sample() -> Trie<&'static str> {
        let mut trie = Trie::new();
        trie.insert(&dn("ou=Users,dc=example,dc=org,op=bind"), "UsersBindTree");
        trie.insert(&dn("ou=Users,dc=example,dc=org,op=search"), "UsersSearchTree");
        trie.insert(&dn("ou=Groups,dc=example,dc=org,op=search"), "GroupsSearchTree");
        trie.insert(&dn("dc=example,dc=org,op=search"), "RootSearchValue");
        trie
    }

    #[test]
    fn test_lookup_exact_paths() {
        let trie = sample();
        assert_eq!(trie.lookup(&dn("ou=Users,dc=example,dc=org,op=bind")), Some(&"UsersBindTree"));
        assert_eq!(trie.lookup(&dn("ou=Users,dc=example,dc=org,op=search")), Some(&"UsersSearchTree"));
        assert_eq!(trie.lookup(&dn("ou=Groups,dc=example,dc=org,op=search")), Some(&"GroupsSearchTree"));
        assert_eq!(trie.lookup(&dn("dc=example,dc=org,op=search")), Some(&"RootSearchValue"));
        assert_eq!(trie.lookup(&dn("ou=DoesNotExist,dc=example,dc=org,op=search")), None);
        assert_eq!(trie.lookup(&dn("dc=example,dc=org,op=bind")), None);
    }

    #[test]
    fn test_match_nearest_ancestor() {
        let trie = sample();
        let found = trie
            .matches(&dn("cn=x,ou=DoesNotExist,dc=example,dc=org,op=search"))
            .unwrap();
        assert_eq!(*found.value, "RootSearchValue");
        assert_eq!(found.pattern, dn("dc=example,dc=org,op=search"));
        assert_eq!(found.matched, dn("dc=example,dc=org,op=search"));

        let found = trie.matches(&dn("uid=a,ou=Users,dc=example,dc=org,op=bind")).unwrap();
        assert_eq!(*found.value, "UsersBindTree");

        assert!(trie.matches(&dn("dc=other,op=bind")).is_none());
    }

    #[test]
    fn test_literal_beats_wildcard() {
        let mut trie = Trie::new();
        trie.insert(&dn("uid=:id,ou=Users,dc=example,dc=com"), "wildcard");
        trie.insert(&dn("uid=admin,ou=Users,dc=example,dc=com"), "literal");

        let found = trie.matches(&dn("uid=admin,ou=Users,dc=example,dc=com")).unwrap();
        assert_eq!(*found.value, "literal");
        assert!(found.captures.is_empty());

        let found = trie.matches(&dn("uid=jdoe,ou=Users,dc=example,dc=com")).unwrap();
        assert_eq!(*found.value, "wildcard");
        assert_eq!(found.captures["id"], "jdoe");
        assert_eq!(found.pattern, dn("uid=:id,ou=Users,dc=example,dc=com"));
    }

    #[test]
    fn test_backtracks_into_wildcard_branch() {
        let mut trie = Trie::new();
        trie.insert(&dn("cn=fixed,ou=admin,dc=com"), "deep-literal");
        trie.insert(&dn("cn=:name,ou=:unit,dc=com"), "wildcards");

        assert_eq!(trie.lookup(&dn("cn=other,ou=admin,dc=com")), Some(&"wildcards"));
        let found = trie.matches(&dn("cn=other,ou=admin,dc=com")).unwrap();
        assert_eq!(found.captures["unit"], "admin");
        assert_eq!(found.captures["name"], "other");
    }

    #[test]
    fn test_full_depth_wildcard_beats_literal_ancestor() {
        let mut trie = Trie::new();
        trie.insert(&dn("ou=admin,dc=com"), "ancestor");
        trie.insert(&dn("cn=:name,ou=:unit,dc=com"), "wildcards");

        let request = dn("cn=x,ou=admin,dc=com");
        assert_eq!(trie.lookup(&request), Some(&"wildcards"));
        let found = trie.matches(&request).unwrap();
        assert_eq!(*found.value, "wildcards");
        assert_eq!(found.matched, request);
        assert_eq!(found.captures["name"], "x");
        assert_eq!(found.captures["unit"], "admin");

        let found = trie.matches(&dn("ou=admin,dc=com")).unwrap();
        assert_eq!(*found.value, "ancestor");
    }

    #[test]
    fn test_deepest_ancestor_across_branches() {
        let mut trie = Trie::new();
        trie.insert(&dn("ou=admin,dc=com"), "literal");
        trie.insert(&dn("ou=:unit,dc=com"), "shallow");
        trie.insert(&dn("cn=:name,ou=:unit,dc=com"), "deep");

        let found = trie.matches(&dn("uid=a,cn=b,ou=admin,dc=com")).unwrap();
        assert_eq!(*found.value, "deep");
        assert_eq!(found.matched, dn("cn=b,ou=admin,dc=com"));

        let found = trie.matches(&dn("uid=a,ou=admin,dc=com")).unwrap();
        assert_eq!(*found.value, "literal");
    }

    #[test]
    fn test_resolve_prefers_full_depth_route() {
        use crate::service::handler::DefaultHandler;

        let mut router = Router::new();
        router
            .route(OperationKind::Search, "ou=admin,dc=com", Arc::new(DefaultHandler))
            .unwrap()
            .route(OperationKind::Search, "cn=:name,ou=:unit,dc=com", Arc::new(DefaultHandler))
            .unwrap();

        let route = router.resolve(OperationKind::Search, &dn("cn=x,ou=admin,dc=com")).unwrap();
        assert_eq!(route.pattern, dn("cn=:name,ou=:unit,dc=com"));
        assert_eq!(route.params["name"], "x");
        assert_eq!(route.params["unit"], "admin");
    }

    #[test]
    fn test_repeated_capture_root_side_wins() {
        let mut trie = Trie::new();
        trie.insert(&dn("o=:company,o=:company,c=GB"), "v");
        let found = trie
            .matches(&dn("o=Isode Limited,o=Companies,c=GB"))
            .unwrap();
        assert_eq!(found.captures["company"], "Companies");
    }

    #[test]
    fn test_insert_replaces() {
        let mut trie = Trie::new();
        assert_eq!(trie.insert(&dn("dc=com"), 1), None);
        assert_eq!(trie.insert(&dn("DC=com"), 2), Some(1));
        assert_eq!(trie.lookup(&dn("dc=com")), Some(&2));
    }

    #[test]
    fn test_root_binding_catches_everything() {
        let mut trie = Trie::new();
        trie.insert(&Dn::root(), "root");
        let found = trie.matches(&dn("cn=a,dc=b")).unwrap();
        assert_eq!(*found.value, "root");
        assert!(found.pattern.is_empty());
        assert_eq!(trie.lookup(&Dn::root()), Some(&"root"));
    }
}
