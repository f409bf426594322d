use std::collections::HashSet;
use std::hash::Hash;

use super::id::AtomId;

/// A set of identifiers. Insertion order is irrelevant.
///
/// Used to remember entities already observed during one pass and as the
/// "allocated this pass" record consulted by [`super::IdSpace`].
#[derive(Debug, Clone)]
pub struct IdSet<T = AtomId> {
    ids: HashSet<T>,
}

impl<T: Copy + Eq + Hash> IdSet<T> {
    pub fn new() -> Self {
        Self {
            ids: HashSet::new(),
        }
    }

    /// Adds `id`. Adding an id already present does nothing.
    /// Returns true if the id was newly inserted.
    pub fn add(&mut self, id: T) -> bool {
        self.ids.insert(id)
    }

    /// Removes `id`. Removing an absent id does nothing.
    pub fn remove(&mut self, id: T) {
        self.ids.remove(&id);
    }

    pub fn contains(&self, id: T) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<T: Copy + Eq + Hash> Default for IdSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Eq + Hash> FromIterator<T> for IdSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
