//! Hierarchical key-value store with lazy inheritance.
//!
//! A node chains to its parent and merges on read, so a child created
//! before the parent gains a key still sees it, and a child's local write
//! never leaks upward. Keys may hold leaves, nested nodes, or append-only
//! lists; nested nodes and lists chain to the parent's node/list under the
//! same key, giving the whole tree copy-on-write semantics.

use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// A single node in the configuration tree, generic over the leaf type.
/// Mutated only during registration; read-only (and lock-light) afterward.
pub struct ConfigNode<V> {
    parent: Option<Arc<ConfigNode<V>>>,
    inner: RwLock<NodeInner<V>>,
}

struct NodeInner<V> {
    entries: HashMap<String, Entry<V>>,
    nonheritable: HashSet<String>,
}

enum Entry<V> {
    Leaf(V),
    Nested(Arc<ConfigNode<V>>),
    List(Arc<AppendList<V>>),
}

impl<V> Clone for Entry<V>
where
    V: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Entry::Leaf(v) => Entry::Leaf(v.clone()),
            Entry::Nested(n) => Entry::Nested(Arc::clone(n)),
            Entry::List(l) => Entry::List(Arc::clone(l)),
        }
    }
}

/// A materialized view of one key, as returned by [`ConfigNode::to_map`].
pub enum ResolvedEntry<V> {
    Leaf(V),
    Nested(Arc<ConfigNode<V>>),
    List(Vec<V>),
}

impl<V: Clone> ConfigNode<V> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            inner: RwLock::new(NodeInner {
                entries: HashMap::new(),
                nonheritable: HashSet::new(),
            }),
        })
    }

    /// A child node whose reads fall through to `parent`.
    pub fn inherit(parent: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            inner: RwLock::new(NodeInner {
                entries: HashMap::new(),
                nonheritable: HashSet::new(),
            }),
        })
    }

    /// Nearest leaf value for `key`, local first, then up the parent chain.
    /// Ancestor entries marked non-heritable are invisible here (the walk
    /// continues past them); a node always sees its own entries.
    pub fn get(&self, key: &str) -> Option<V> {
        {
            let inner = self.inner.read().expect("config lock poisoned");
            if let Some(entry) = inner.entries.get(key) {
                return match entry {
                    Entry::Leaf(v) => Some(v.clone()),
                    _ => None,
                };
            }
        }
        let mut node = self.parent.clone();
        while let Some(current) = node {
            {
                let inner = current.inner.read().expect("config lock poisoned");
                if !inner.nonheritable.contains(key) {
                    if let Some(Entry::Leaf(v)) = inner.entries.get(key) {
                        return Some(v.clone());
                    }
                    if inner.entries.contains_key(key) {
                        return None;
                    }
                }
            }
            node = current.parent.clone();
        }
        None
    }

    /// Local write. Fails if `key` already resolves to a nested node or list.
    pub fn set(&self, key: impl Into<String>, value: V) -> Result<(), ConfigError> {
        self.write_leaf(key.into(), value, false)
    }

    /// Local write that descendants never see, even through later reads.
    pub fn set_nonheritable(&self, key: impl Into<String>, value: V) -> Result<(), ConfigError> {
        self.write_leaf(key.into(), value, true)
    }

    fn write_leaf(&self, key: String, value: V, nonheritable: bool) -> Result<(), ConfigError> {
        match self.visible_entry(&key) {
            Some(Entry::Nested(_)) => return Err(ConfigError::NestedOverride(key)),
            Some(Entry::List(_)) => return Err(ConfigError::ListOverride(key)),
            _ => {}
        }
        let mut inner = self.inner.write().expect("config lock poisoned");
        inner.entries.insert(key.clone(), Entry::Leaf(value));
        if nonheritable {
            inner.nonheritable.insert(key);
        } else {
            inner.nonheritable.remove(&key);
        }
        Ok(())
    }

    /// Create-or-return the nested node under `key`. When an ancestor holds
    /// a nested node under the same key, the local one chains to it, so the
    /// lineage stays single.
    pub fn nest(self: &Arc<Self>, key: &str) -> Result<Arc<Self>, ConfigError> {
        {
            let inner = self.inner.read().expect("config lock poisoned");
            match inner.entries.get(key) {
                Some(Entry::Nested(node)) => return Ok(Arc::clone(node)),
                Some(_) => return Err(ConfigError::NestedOverride(key.to_string())),
                None => {}
            }
        }
        let child = match self.inherited_entry(key) {
            Some(Entry::Nested(ancestor)) => ConfigNode::inherit(&ancestor),
            Some(_) => return Err(ConfigError::NestedOverride(key.to_string())),
            None => ConfigNode::new(),
        };
        let mut inner = self.inner.write().expect("config lock poisoned");
        inner
            .entries
            .insert(key.to_string(), Entry::Nested(Arc::clone(&child)));
        Ok(child)
    }

    /// Create-or-return the append-only list under `key`, chained to the
    /// ancestor's list when one exists (reads yield ancestor items first).
    pub fn append_list(self: &Arc<Self>, key: &str) -> Result<Arc<AppendList<V>>, ConfigError> {
        {
            let inner = self.inner.read().expect("config lock poisoned");
            match inner.entries.get(key) {
                Some(Entry::List(list)) => return Ok(Arc::clone(list)),
                Some(_) => return Err(ConfigError::ListOverride(key.to_string())),
                None => {}
            }
        }
        let list = match self.inherited_entry(key) {
            Some(Entry::List(ancestor)) => AppendList::inherit(&ancestor),
            Some(_) => return Err(ConfigError::ListOverride(key.to_string())),
            None => AppendList::new(),
        };
        let mut inner = self.inner.write().expect("config lock poisoned");
        inner
            .entries
            .insert(key.to_string(), Entry::List(Arc::clone(&list)));
        Ok(list)
    }

    /// The nested node visible at `key`, without creating one.
    pub fn nested(&self, key: &str) -> Option<Arc<Self>> {
        match self.visible_entry(key) {
            Some(Entry::Nested(node)) => Some(node),
            _ => None,
        }
    }

    /// The list items visible at `key`, ancestor items first.
    pub fn list(&self, key: &str) -> Option<Vec<V>> {
        match self.visible_entry(key) {
            Some(Entry::List(list)) => Some(list.items()),
            _ => None,
        }
    }

    /// Deduplicated union of ancestor and local keys, excluding
    /// non-heritable ancestor keys. Local values win on conflict.
    pub fn keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (key, _) in self.collect_entries() {
            if seen.insert(key.clone()) {
                out.push(key);
            }
        }
        out
    }

    pub fn to_map(&self) -> HashMap<String, ResolvedEntry<V>> {
        let mut out = HashMap::new();
        for (key, entry) in self.collect_entries() {
            let resolved = match entry {
                Entry::Leaf(v) => ResolvedEntry::Leaf(v),
                Entry::Nested(n) => ResolvedEntry::Nested(n),
                Entry::List(l) => ResolvedEntry::List(l.items()),
            };
            out.insert(key, resolved);
        }
        out
    }

    /// Effective entries, nearest definition winning: local first, then each
    /// ancestor's heritable entries.
    fn collect_entries(&self) -> Vec<(String, Entry<V>)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        {
            let inner = self.inner.read().expect("config lock poisoned");
            for (key, entry) in &inner.entries {
                seen.insert(key.clone());
                out.push((key.clone(), entry.clone()));
            }
        }
        let mut node = self.parent.clone();
        while let Some(current) = node {
            {
                let inner = current.inner.read().expect("config lock poisoned");
                for (key, entry) in &inner.entries {
                    if inner.nonheritable.contains(key) || seen.contains(key) {
                        continue;
                    }
                    seen.insert(key.clone());
                    out.push((key.clone(), entry.clone()));
                }
            }
            node = current.parent.clone();
        }
        out
    }

    /// Entry visible from this node (local or heritable ancestor).
    fn visible_entry(&self, key: &str) -> Option<Entry<V>> {
        {
            let inner = self.inner.read().expect("config lock poisoned");
            if let Some(entry) = inner.entries.get(key) {
                return Some(entry.clone());
            }
        }
        self.inherited_entry(key)
    }

    /// Entry visible from ancestors only, honoring non-heritable marks.
    fn inherited_entry(&self, key: &str) -> Option<Entry<V>> {
        let mut node = self.parent.clone();
        while let Some(current) = node {
            {
                let inner = current.inner.read().expect("config lock poisoned");
                if !inner.nonheritable.contains(key) {
                    if let Some(entry) = inner.entries.get(key) {
                        return Some(entry.clone());
                    }
                }
            }
            node = current.parent.clone();
        }
        None
    }
}

/// Ordered collection whose reads yield the ancestor's items followed by
/// items appended locally.
pub struct AppendList<V> {
    parent: Option<Arc<AppendList<V>>>,
    items: RwLock<Vec<V>>,
}

impl<V: Clone> AppendList<V> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            items: RwLock::new(Vec::new()),
        })
    }

    pub fn inherit(parent: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            items: RwLock::new(Vec::new()),
        })
    }

    pub fn push(&self, item: V) {
        self.items.write().expect("config lock poisoned").push(item);
    }

    pub fn items(&self) -> Vec<V> {
        let mut out = match &self.parent {
            Some(parent) => parent.items(),
            None => Vec::new(),
        };
        out.extend(self.items.read().expect("config lock poisoned").iter().cloned());
        out
    }
}
