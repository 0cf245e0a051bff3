//! Ordered user selection over registry keys.

use std::collections::HashSet;

use super::{Registry, ResourceKind};

/// The set of resource keys chosen for transfer.
///
/// Iteration follows insertion order, which is the order archive entries and
/// dispatches follow. Selecting an already selected key keeps its original
/// position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl SelectionSet {
    /// Creates an empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` to the end of the selection. Returns `false` if it was
    /// already selected.
    pub fn select(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.members.contains(&key) {
            return false;
        }
        self.members.insert(key.clone());
        self.order.push(key);
        true
    }

    /// Removes `key`. Returns `false` if it was not selected.
    pub fn deselect(&mut self, key: &str) -> bool {
        if !self.members.remove(key) {
            return false;
        }
        self.order.retain(|k| k != key);
        true
    }

    /// Flips the selection state of `key` and returns the new state.
    pub fn toggle(&mut self, key: &str) -> bool {
        if self.deselect(key) {
            false
        } else {
            self.select(key)
        }
    }

    /// Selects every registry resource, in registry order.
    pub fn select_all(&mut self, registry: &Registry) {
        for descriptor in registry.iter() {
            self.select(descriptor.key());
        }
    }

    /// Selects every registry resource of `kind`, in registry order.
    pub fn select_kind(&mut self, registry: &Registry, kind: ResourceKind) {
        for descriptor in registry.iter().filter(|d| d.kind == kind) {
            self.select(descriptor.key());
        }
    }

    /// Removes all keys.
    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }

    /// Returns `true` if `key` is selected.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.members.contains(key)
    }

    /// Number of selected keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` when nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Selected keys in selection order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Snapshot of the selected keys, taken at dispatch time.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.order.clone()
    }
}

impl<S: Into<String>> FromIterator<S> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut selection = Self::new();
        for key in iter {
            selection.select(key);
        }
        selection
    }
}
