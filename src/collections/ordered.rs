use std::{hash::Hash, ops::Index, slice::Iter};

use serde::Serialize;

/// Insertion ordered set where every element keeps the index it was first inserted at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OrderedSet<T: Hash + PartialEq> {
    items: Vec<T>,
}

impl<T: Hash + PartialEq> Default for OrderedSet<T> {
    fn default() -> Self {
        Self { items: vec![] }
    }
}

impl<T: Hash + PartialEq> OrderedSet<T> {
    pub fn new(iter: impl IntoIterator<Item = T>) -> Self {
        let mut set = Self::default();
        for item in iter.into_iter() {
            set.insert(item);
        }
        set
    }

    /// Keeps duplicates, used by the decoder so that indices on disk stay valid.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn find(&self, value: &T) -> Option<u32> {
        self.items
            .iter()
            .position(|elem| elem == value)
            .map(|idx| idx as u32)
    }

    pub fn insert(&mut self, value: T) -> u32 {
        if let Some(index) = self.find(&value) {
            index
        } else {
            self.items.push(value);
            (self.items.len() - 1) as u32
        }
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.items.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.items.iter()
    }
}

impl<T: Hash + PartialEq> Index<u32> for OrderedSet<T> {
    type Output = T;

    fn index(&self, index: u32) -> &Self::Output {
        self.items.get(index as usize).expect("index out of bounds")
    }
}

impl<'a, T: Hash + PartialEq> IntoIterator for &'a OrderedSet<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_dedup() {
        let mut set = OrderedSet::new(["a".to_string(), "b".to_string()]);

        assert_eq!(set.insert("b".to_string()), 1);
        assert_eq!(set.insert("c".to_string()), 2);
        assert_eq!(set.len(), 3);
        assert_eq!(set[0], "a");
    }

    #[test]
    fn test_from_vec_keeps_duplicates() {
        let set = OrderedSet::from_vec(vec![1, 1, 2]);

        assert_eq!(set.len(), 3);
        assert_eq!(set.find(&1), Some(0));
        assert_eq!(set.get(3), None);
    }
}
