//! Longest-prefix-match trie keyed by name components.
//!
//! [`Trie`] is a plain single-owner structure; [`SyncTrie`] wraps it in a
//! reader/writer lock for sharing between threads. Nodes whose value is
//! absent or empty (per [`LpmValue::is_empty`]) and that have no children
//! are pruned after every mutation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::name::Component;

/// Values stored in a trie say when they no longer carry anything, so that
/// a bucket emptied in place is pruned like a deleted one
pub trait LpmValue {
    fn is_empty(&self) -> bool;
}

impl<K, V> LpmValue for HashMap<K, V> {
    fn is_empty(&self) -> bool {
        HashMap::is_empty(self)
    }
}

impl<K, V> LpmValue for BTreeMap<K, V> {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

impl<T> LpmValue for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

#[derive(Debug, Clone)]
pub struct Trie<V> {
    value: Option<V>,
    children: HashMap<Component, Trie<V>>,
}

impl<V> Default for Trie<V> {
    fn default() -> Self {
        Self {
            value: None,
            children: HashMap::new(),
        }
    }
}

impl<V: LpmValue> Trie<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// No value and no children
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.value.iter().count() + self.children.values().map(Trie::len).sum::<usize>()
    }

    /// Value stored at the deepest prefix of `key` that has one
    pub fn match_longest(&self, key: &[Component]) -> Option<&V> {
        let mut node = self;
        let mut found = node.value.as_ref();
        for component in key {
            match node.children.get(component) {
                Some(child) => node = child,
                None => break,
            }
            if node.value.is_some() {
                found = node.value.as_ref();
            }
        }
        found
    }

    /// Value stored exactly at `key`
    pub fn get(&self, key: &[Component]) -> Option<&V> {
        self.node(key).and_then(|node| node.value.as_ref())
    }

    fn node(&self, key: &[Component]) -> Option<&Trie<V>> {
        key.iter()
            .try_fold(self, |node, component| node.children.get(component))
    }

    /// Store `value` at `key`, creating intermediate nodes as needed.
    /// An empty value is treated as a delete.
    pub fn update(&mut self, key: &[Component], value: V) {
        if value.is_empty() {
            self.delete(key);
            return;
        }

        let mut node = self;
        for component in key {
            node = node.children.entry(component.clone()).or_default();
        }
        node.value = Some(value);
    }

    /// Replace the value at `key` with `f` applied to the current one.
    /// `None` or an empty result deletes.
    pub fn modify<F>(&mut self, key: &[Component], f: F)
    where
        F: FnOnce(Option<V>) -> Option<V>,
    {
        let old = self.delete(key);
        if let Some(value) = f(old) {
            self.update(key, value);
        }
    }

    /// Remove the value at `key` and prune emptied ancestors
    pub fn delete(&mut self, key: &[Component]) -> Option<V> {
        match key.split_first() {
            None => self.value.take(),
            Some((first, rest)) => {
                let child = self.children.get_mut(first)?;
                let removed = child.delete(rest);
                if child.is_empty() {
                    self.children.remove(first);
                }
                removed
            }
        }
    }

    /// Rewrite the value at every prefix of `key`, longest first.
    ///
    /// `f` receives the prefix and the current value (taken out of the trie)
    /// and returns the value to store; `None` or an empty value deletes.
    /// The root (empty prefix) is not visited.
    pub fn update_all<F>(&mut self, key: &[Component], mut f: F)
    where
        F: FnMut(&[Component], Option<V>) -> Option<V>,
    {
        self.update_all_from(key, 0, &mut f);
    }

    fn update_all_from<F>(&mut self, key: &[Component], depth: usize, f: &mut F)
    where
        F: FnMut(&[Component], Option<V>) -> Option<V>,
    {
        if let Some(component) = key.get(depth) {
            let child = self.children.entry(component.clone()).or_default();
            child.update_all_from(key, depth + 1, f);
            if child.is_empty() {
                self.children.remove(component);
            }
        }

        if depth > 0 {
            let old = self.value.take();
            self.value = f(&key[..depth], old).filter(|v| !v.is_empty());
        }
    }

    /// Visit every stored value depth-first. `f` returns the value to keep,
    /// or `None` to delete it.
    pub fn visit<F>(&mut self, mut f: F)
    where
        F: FnMut(&[Component], V) -> Option<V>,
    {
        let mut prefix = Vec::new();
        self.visit_from(&mut prefix, &mut f);
    }

    fn visit_from<F>(&mut self, prefix: &mut Vec<Component>, f: &mut F)
    where
        F: FnMut(&[Component], V) -> Option<V>,
    {
        if let Some(value) = self.value.take() {
            self.value = f(prefix.as_slice(), value).filter(|v| !v.is_empty());
        }

        self.children.retain(|component, child| {
            prefix.push(component.clone());
            child.visit_from(prefix, f);
            prefix.pop();
            !child.is_empty()
        });
    }

    /// Read-only depth-first walk over every stored value
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&[Component], &V),
    {
        let mut prefix = Vec::new();
        self.for_each_from(&mut prefix, &mut f);
    }

    fn for_each_from<F>(&self, prefix: &mut Vec<Component>, f: &mut F)
    where
        F: FnMut(&[Component], &V),
    {
        if let Some(value) = &self.value {
            f(prefix.as_slice(), value);
        }
        for (component, child) in &self.children {
            prefix.push(component.clone());
            child.for_each_from(prefix, f);
            prefix.pop();
        }
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.value = None;
        self.children.clear();
    }
}

/// A [`Trie`] behind a reader/writer lock.
///
/// Readers run their closure under the shared lock, so they observe a
/// consistent snapshot of the bucket they look at; every mutator, including
/// a whole `update_all`, holds the exclusive lock.
#[derive(Debug)]
pub struct SyncTrie<V> {
    inner: RwLock<Trie<V>>,
}

impl<V> Default for SyncTrie<V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Trie::default()),
        }
    }
}

impl<V: LpmValue> SyncTrie<V> {
    /// An empty trie
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on the value at the longest stored prefix of `key`
    pub fn match_longest<R>(&self, key: &[Component], f: impl FnOnce(Option<&V>) -> R) -> R {
        let trie = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(trie.match_longest(key))
    }

    /// Run `f` on the value stored exactly at `key`
    pub fn get<R>(&self, key: &[Component], f: impl FnOnce(Option<&V>) -> R) -> R {
        let trie = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(trie.get(key))
    }

    /// Store `value` at `key`; an empty value deletes
    pub fn update(&self, key: &[Component], value: V) {
        self.write().update(key, value);
    }

    /// Remove and return the value at `key`
    pub fn delete(&self, key: &[Component]) -> Option<V> {
        self.write().delete(key)
    }

    /// Replace the value at `key` with `f(old)` under one exclusive lock
    pub fn modify<F>(&self, key: &[Component], f: F)
    where
        F: FnOnce(Option<V>) -> Option<V>,
    {
        self.write().modify(key, f);
    }

    /// [`Trie::update_all`] under one exclusive lock
    pub fn update_all<F>(&self, key: &[Component], f: F)
    where
        F: FnMut(&[Component], Option<V>) -> Option<V>,
    {
        self.write().update_all(key, f);
    }

    /// [`Trie::visit`] under one exclusive lock
    pub fn visit<F>(&self, f: F)
    where
        F: FnMut(&[Component], V) -> Option<V>,
    {
        self.write().visit(f);
    }

    /// Read every stored value under the shared lock
    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&[Component], &V),
    {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).for_each(f);
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    /// Remove everything
    pub fn clear(&self) {
        self.write().clear();
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Trie<V>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone + LpmValue> SyncTrie<V> {
    /// Cloned value at the longest matching prefix
    pub fn match_cloned(&self, key: &[Component]) -> Option<V> {
        self.match_longest(key, |v| v.cloned())
    }
}
