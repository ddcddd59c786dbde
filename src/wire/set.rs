use std::collections::BTreeSet;
use std::fmt;

use super::Address;

/// An ordered set of source addresses. Backed by a
/// `BTreeSet` so iteration order is address order, and `union`/
/// `intersection`/`difference` are O((|a|+|b|) log n) merge-join
/// operations, each allocating only the final result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSet(BTreeSet<Address>);

impl SourceSet {
    pub fn new() -> SourceSet {
        SourceSet(BTreeSet::new())
    }

    pub fn singleton(addr: Address) -> SourceSet {
        let mut s = BTreeSet::new();
        s.insert(addr);
        SourceSet(s)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.0.contains(addr)
    }

    pub fn insert(&mut self, addr: Address) -> bool {
        self.0.insert(addr)
    }

    pub fn remove(&mut self, addr: &Address) -> bool {
        self.0.remove(addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.0.iter()
    }

    /// `self ∪ other`.
    pub fn union(&self, other: &SourceSet) -> SourceSet {
        SourceSet(self.0.union(&other.0).cloned().collect())
    }

    /// `self ∩ other`.
    pub fn intersection(&self, other: &SourceSet) -> SourceSet {
        SourceSet(self.0.intersection(&other.0).cloned().collect())
    }

    /// `self \ other`.
    pub fn difference(&self, other: &SourceSet) -> SourceSet {
        SourceSet(self.0.difference(&other.0).cloned().collect())
    }
}

impl FromIterator<Address> for SourceSet {
    fn from_iter<T: IntoIterator<Item = Address>>(iter: T) -> SourceSet {
        SourceSet(iter.into_iter().collect())
    }
}

impl IntoIterator for SourceSet {
    type Item = Address;
    type IntoIter = std::collections::btree_set::IntoIter<Address>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a SourceSet {
    type Item = &'a Address;
    type IntoIter = std::collections::btree_set::Iter<'a, Address>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for SourceSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, addr) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", addr)?;
        }
        write!(f, "}}")
    }
}
