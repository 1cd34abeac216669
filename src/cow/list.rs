//! Copy-on-write list.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::slice;
use std::sync::Arc;

/// Growable list whose copies share storage until written.
pub struct CowList<T> {
    inner: Arc<Vec<T>>,
}

impl<T> CowList<T> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Vec::new()),
        }
    }

    /// O(1) copy. Both lists alias the same storage until one is written.
    pub fn deep_copy(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Whether another list currently aliases this one's storage.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.inner) > 1
    }

    /// Whether both lists alias the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.inner.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.inner.iter()
    }

    /// Read-only view of the backing list.
    pub fn as_slice(&self) -> &[T] {
        &self.inner
    }
}

impl<T: Clone> CowList<T> {
    /// Get exclusive access to the backing list, cloning it if shared.
    fn unshare(&mut self) -> &mut Vec<T> {
        if self.is_shared() {
            tracing::trace!(len = self.inner.len(), "unsharing list");
        }
        Arc::make_mut(&mut self.inner)
    }

    pub fn push(&mut self, value: T) {
        self.unshare().push(value);
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.inner.is_empty() {
            return None;
        }
        self.unshare().pop()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.inner.len() {
            return None;
        }
        self.unshare().get_mut(index)
    }

    /// Replace the element at `index`, returning the previous one.
    pub fn set(&mut self, index: usize, value: T) -> Option<T> {
        self.get_mut(index)
            .map(|slot| std::mem::replace(slot, value))
    }

    pub fn insert(&mut self, index: usize, value: T) {
        self.unshare().insert(index, value);
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.inner.len() {
            return None;
        }
        Some(self.unshare().remove(index))
    }

    pub fn truncate(&mut self, len: usize) {
        if len < self.inner.len() {
            self.unshare().truncate(len);
        }
    }

    pub fn clear(&mut self) {
        if self.is_shared() {
            self.inner = Arc::new(Vec::new());
        } else {
            self.unshare().clear();
        }
    }
}

impl<T: Clone> Extend<T> for CowList<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.unshare().extend(iter);
    }
}

impl<T> Clone for CowList<T> {
    fn clone(&self) -> Self {
        self.deep_copy()
    }
}

impl<T> Default for CowList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for CowList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for CowList<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || *self.inner == *other.inner
    }
}

impl<T> From<Vec<T>> for CowList<T> {
    fn from(list: Vec<T>) -> Self {
        Self {
            inner: Arc::new(list),
        }
    }
}

impl<T> FromIterator<T> for CowList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<T>>())
    }
}

impl<'a, T> IntoIterator for &'a CowList<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl<T: Serialize> Serialize for CowList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for CowList<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_is_isolated_from_writes() {
        let l1: CowList<i64> = vec![1, 2, 3].into();
        let mut l2 = l1.deep_copy();

        l2.push(4);
        l2.set(0, 10);

        assert_eq!(l1.as_slice(), &[1, 2, 3]);
        assert_eq!(l2.as_slice(), &[10, 2, 3, 4]);
    }

    #[test]
    fn test_noop_mutations_keep_sharing() {
        let l1: CowList<i64> = vec![1].into();
        let mut l2 = l1.deep_copy();

        assert_eq!(l2.set(5, 0), None);
        assert_eq!(l2.remove(5), None);
        l2.truncate(3);
        assert!(l1.ptr_eq(&l2));

        let empty: CowList<i64> = CowList::new();
        let mut copy = empty.deep_copy();
        assert_eq!(copy.pop(), None);
        assert!(empty.ptr_eq(&copy));
    }

    #[test]
    fn test_pop_and_truncate() {
        let l1: CowList<i64> = vec![1, 2, 3].into();
        let mut l2 = l1.deep_copy();

        assert_eq!(l2.pop(), Some(3));
        l2.truncate(1);

        assert_eq!(l1.len(), 3);
        assert_eq!(l2.as_slice(), &[1]);
    }

    #[test]
    fn test_nested_lists_share_untouched_elements() {
        let outer: CowList<CowList<i64>> =
            vec![vec![1, 2].into(), vec![3, 4].into()].into();
        let mut copy = outer.deep_copy();

        copy.get_mut(0).unwrap().push(5);

        assert!(outer.get(1).unwrap().ptr_eq(copy.get(1).unwrap()));
        assert_eq!(outer.get(0).unwrap().as_slice(), &[1, 2]);
        assert_eq!(copy.get(0).unwrap().as_slice(), &[1, 2, 5]);
    }

    #[test]
    fn test_extend() {
        let mut l: CowList<i64> = CowList::new();
        l.extend([1, 2]);
        assert_eq!(l.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }
}
