//! # Unit index.
//!
//! Registry of attached units, addressable by id, tag, class name and name.
//!
//! ## Rules
//! - Units are inserted on the first attach notification and removed on detach.
//! - Every unit is indexed under **each** class of its lineage, so a query for a
//!   base class also returns units of derived classes.
//! - Lookups return units in insertion order.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::units::unit::{Unit, UnitRef};

#[derive(Default)]
struct Tables {
    by_id: HashMap<Arc<str>, UnitRef>,
    ordered: Vec<UnitRef>,
    by_tag: HashMap<String, Vec<UnitRef>>,
    by_class: HashMap<String, Vec<UnitRef>>,
    by_name: HashMap<String, Vec<UnitRef>>,
}

/// Thread-safe unit registry.
#[derive(Default)]
pub struct UnitIndex {
    tables: RwLock<Tables>,
}

impl UnitIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `unit`; returns `false` if its id was already present.
    pub fn insert(&self, unit: &UnitRef) -> bool {
        let mut t = self.write();
        if t.by_id.contains_key(unit.id()) {
            return false;
        }
        t.by_id.insert(Arc::from(unit.id()), unit.clone());
        t.ordered.push(unit.clone());
        t.by_tag
            .entry(unit.tag().to_string())
            .or_default()
            .push(unit.clone());
        for class in unit.class().lineage() {
            t.by_class
                .entry(class.name().to_string())
                .or_default()
                .push(unit.clone());
        }
        if let Some(name) = unit.name() {
            t.by_name
                .entry(name.to_string())
                .or_default()
                .push(unit.clone());
        }
        true
    }

    /// Removes `unit` from every table; returns `false` if it was not indexed.
    ///
    /// Matching is by identity, so a different unit reusing the id is left alone.
    pub fn remove(&self, unit: &Unit) -> bool {
        let mut guard = self.write();
        let t = &mut *guard;
        let same = |u: &UnitRef| std::ptr::eq(Arc::as_ptr(u), unit);
        if !t.by_id.get(unit.id()).is_some_and(same) {
            return false;
        }
        t.by_id.remove(unit.id());
        t.ordered.retain(|u| !same(u));
        for table in [&mut t.by_tag, &mut t.by_class, &mut t.by_name] {
            table.retain(|_, list| {
                list.retain(|u| !same(u));
                !list.is_empty()
            });
        }
        true
    }

    /// Unit with the given id.
    pub fn get(&self, id: &str) -> Option<UnitRef> {
        self.read().by_id.get(id).cloned()
    }

    /// Units with the given tag.
    pub fn by_tag(&self, tag: &str) -> Vec<UnitRef> {
        self.read().by_tag.get(tag).cloned().unwrap_or_default()
    }

    /// Units whose class lineage contains `class`.
    pub fn by_class(&self, class: &str) -> Vec<UnitRef> {
        self.read().by_class.get(class).cloned().unwrap_or_default()
    }

    /// Units with the given name.
    pub fn by_name(&self, name: &str) -> Vec<UnitRef> {
        self.read().by_name.get(name).cloned().unwrap_or_default()
    }

    /// Every indexed unit, in insertion order.
    pub fn all(&self) -> Vec<UnitRef> {
        self.read().ordered.clone()
    }

    /// Number of indexed units.
    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    /// Returns `true` if no unit is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChainableStore;
    use crate::units::{UnitClass, UnitSpec};

    fn unit(spec: UnitSpec, class: Arc<UnitClass>) -> UnitRef {
        Unit::new(spec, class, Arc::new(ChainableStore::new()))
    }

    #[test]
    fn indexes_by_every_key_and_prunes() {
        let base = Arc::new(UnitClass::new("base"));
        let card = Arc::new(UnitClass::new("card").extends(base));
        let idx = UnitIndex::new();

        let a = unit(UnitSpec::new("x-card").with_id("a").with_name("first"), card.clone());
        let b = unit(UnitSpec::new("x-card").with_id("b"), card);
        assert!(idx.insert(&a));
        assert!(idx.insert(&b));
        assert!(!idx.insert(&a));

        assert_eq!(idx.get("a").map(|u| u.id().to_string()), Some("a".into()));
        assert_eq!(idx.by_tag("x-card").len(), 2);
        assert_eq!(idx.by_class("base").len(), 2);
        assert_eq!(idx.by_name("first").len(), 1);

        assert!(idx.remove(&a));
        assert!(!idx.remove(&a));
        assert!(idx.get("a").is_none());
        assert!(idx.by_name("first").is_empty());
        assert_eq!(idx.by_class("card").len(), 1);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn remove_only_prunes_the_given_unit() {
        let class = Arc::new(UnitClass::new("card"));
        let idx = UnitIndex::new();
        let live = unit(UnitSpec::new("x-card").with_id("dup"), class.clone());
        let twin = unit(UnitSpec::new("x-card").with_id("dup"), class);

        assert!(idx.insert(&live));
        assert!(!idx.insert(&twin));
        assert!(!idx.remove(&twin));
        assert!(Arc::ptr_eq(&idx.get("dup").unwrap(), &live));
        assert_eq!(idx.by_tag("x-card").len(), 1);
    }

    #[test]
    fn all_keeps_insertion_order() {
        let class = Arc::new(UnitClass::new("card"));
        let idx = UnitIndex::new();
        for id in ["c", "a", "d", "b"] {
            idx.insert(&unit(UnitSpec::new("x-card").with_id(id), class.clone()));
        }
        let a = idx.get("a").unwrap();
        idx.remove(&a);

        let ids: Vec<String> = idx.all().iter().map(|u| u.id().to_string()).collect();
        assert_eq!(ids, ["c", "d", "b"]);
    }
}
