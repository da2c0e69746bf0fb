//! Mapping namespaces and the graph of legal remaps between them.
//!
//! Every namespace declares the namespaces it can be translated into. The
//! declaration is lazy so that a namespace may name peers that are registered
//! later; edges are resolved on first query. Path resolution is a breadth-first
//! search, so the returned path always has the fewest hops, and neighbours are
//! visited in registration order so equal-length paths resolve identically on
//! every run.

use crate::error::{ForgeError, Result};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// A symbol naming scheme, e.g. `official`, `intermediary` or `named`
#[derive(Clone)]
pub struct Namespace {
    name: Arc<str>,
    named: bool,
}

impl Namespace {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether symbols in this namespace are human readable
    pub fn is_named(&self) -> bool {
        self.named
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Namespace {}

impl Hash for Namespace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({}{})", self.name, if self.named { ", named" } else { "" })
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

type TargetProvider = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

struct NamespaceEntry {
    namespace: Namespace,
    providers: Vec<TargetProvider>,
    targets: OnceLock<Vec<String>>,
}

impl NamespaceEntry {
    fn target_names(&self) -> &[String] {
        self.targets.get_or_init(|| {
            let mut names: Vec<String> = Vec::new();
            for provider in &self.providers {
                for name in provider() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            trace!("[namespaces] {} remaps to {:?}", self.namespace, names);
            names
        })
    }
}

/// Registry of every namespace known to a project.
///
/// Passed explicitly to the components that need namespace lookups.
#[derive(Default)]
pub struct NamespaceRegistry {
    entries: Vec<NamespaceEntry>,
    index: FxHashMap<String, usize>,
}

impl fmt::Debug for NamespaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceRegistry")
            .field("namespaces", &self.entries.iter().map(|e| &e.namespace).collect::<Vec<_>>())
            .finish()
    }
}

impl NamespaceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a namespace, or return the existing one.
    ///
    /// `remaps_to` is evaluated lazily on the first graph query. Registering an
    /// existing name again with the same `named` flag adds its targets to the
    /// existing ones; a conflicting flag fails with `DuplicateNamespace`.
    pub fn register<F>(&mut self, name: &str, named: bool, remaps_to: F) -> Result<Namespace>
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        if let Some(&idx) = self.index.get(name) {
            let entry = &mut self.entries[idx];
            if entry.namespace.named != named {
                return Err(ForgeError::duplicate_namespace(name, entry.namespace.named));
            }
            entry.providers.push(Arc::new(remaps_to));
            entry.targets = OnceLock::new();
            debug!("[namespaces] extended targets of {}", name);
            return Ok(entry.namespace.clone());
        }

        let namespace = Namespace { name: Arc::from(name), named };
        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push(NamespaceEntry {
            namespace: namespace.clone(),
            providers: vec![Arc::new(remaps_to)],
            targets: OnceLock::new(),
        });
        debug!("[namespaces] registered {:?}", namespace);
        Ok(namespace)
    }

    /// Convenience for registering with a fixed target list
    pub fn register_with_targets(&mut self, name: &str, named: bool, targets: &[&str]) -> Result<Namespace> {
        let targets: Vec<String> = targets.iter().map(|s| s.to_string()).collect();
        self.register(name, named, move || targets.clone())
    }

    pub fn get(&self, name: &str) -> Result<Namespace> {
        self.index
            .get(name)
            .map(|&idx| self.entries[idx].namespace.clone())
            .ok_or_else(|| ForgeError::unknown_namespace(name, "namespace lookup"))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All namespaces in registration order
    pub fn namespaces(&self) -> Vec<Namespace> {
        self.entries.iter().map(|e| e.namespace.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Direct remap targets of `namespace`, ordered by their registration order
    pub fn remaps_to(&self, namespace: &Namespace) -> Result<Vec<Namespace>> {
        Ok(self.neighbour_indices(namespace.name())?.into_iter().map(|i| self.entries[i].namespace.clone()).collect())
    }

    fn neighbour_indices(&self, name: &str) -> Result<Vec<usize>> {
        let &idx = self
            .index
            .get(name)
            .ok_or_else(|| ForgeError::unknown_namespace(name, "remap graph"))?;

        let mut neighbours = Vec::new();
        for target in self.entries[idx].target_names() {
            let &target_idx = self.index.get(target).ok_or_else(|| {
                ForgeError::unknown_namespace(target.clone(), format!("declared as remap target of {name}"))
            })?;
            neighbours.push(target_idx);
        }
        neighbours.sort_unstable();
        neighbours.dedup();
        Ok(neighbours)
    }

    /// Whether `from` declares a direct edge to `to`
    pub fn can_remap(&self, from: &Namespace, to: &Namespace) -> Result<bool> {
        Ok(self.remaps_to(from)?.contains(to))
    }

    /// Compute the shortest chain of namespaces leading from `from` to `to`.
    ///
    /// The returned sequence excludes `from` and ends with `to`; every element
    /// is a direct remap target of its predecessor. Remapping into the current
    /// namespace yields an empty path. Fallback namespaces travel alongside the
    /// primaries and are validated here, but never change the route.
    pub fn resolve_path(
        &self,
        from: &Namespace,
        from_fallback: &Namespace,
        to: &Namespace,
        to_fallback: &Namespace,
    ) -> Result<Vec<Namespace>> {
        for ns in [from, from_fallback, to, to_fallback] {
            if !self.contains(ns.name()) {
                return Err(ForgeError::unknown_namespace(ns.name(), "remap path resolution"));
            }
        }

        if from == to {
            if from_fallback != to_fallback {
                debug!(
                    "[namespaces] {} already satisfied, fallback {} differs from requested {}",
                    from, from_fallback, to_fallback
                );
            }
            return Ok(Vec::new());
        }

        let start = self.index[from.name()];
        let goal = self.index[to.name()];

        let mut parent: Vec<Option<usize>> = vec![None; self.entries.len()];
        let mut visited = vec![false; self.entries.len()];
        let mut queue = VecDeque::new();
        visited[start] = true;
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            if current == goal {
                break;
            }
            let name = self.entries[current].namespace.name();
            for next in self.neighbour_indices(name)? {
                if !visited[next] {
                    visited[next] = true;
                    parent[next] = Some(current);
                    queue.push_back(next);
                }
            }
        }

        if !visited[goal] {
            return Err(ForgeError::no_remap_path(from.name(), to.name()));
        }

        let mut path = Vec::new();
        let mut cursor = goal;
        while cursor != start {
            path.push(self.entries[cursor].namespace.clone());
            cursor = parent[cursor].ok_or_else(|| ForgeError::no_remap_path(from.name(), to.name()))?;
        }
        path.reverse();

        debug!(
            "[namespaces] remap path {}/{} -> {}",
            from,
            from_fallback,
            path.iter().map(Namespace::name).collect::<Vec<_>>().join(" -> ")
        );
        Ok(path)
    }
}
