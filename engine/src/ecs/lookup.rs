//! The concurrent archetype → table-group lookup.
//!
//! [`ArchetypeLookup`] interns archetypes by their bit mask and maps each
//! to its [`TableGroup`]. Finds are lock-free reads of a sharded map; every
//! get-or-create variant holds the single creation mutex across its second
//! probe and the insertion, so two racing creators always converge on one
//! group per mask.
//!
//! The `with_added` / `with_removed` variants probe with a mask derived
//! from an existing archetype's mask, and only build the transition
//! archetype on a miss — the common case of bouncing an entity between two
//! known archetypes never re-canonicalises a type list.
//!
//! A revision counter bumps on every insertion; queries record the
//! revision they last scanned at and rebuild their caches when it moves.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::ecs::{
    archetype::Archetype,
    bitset::TypeMask,
    component::Info,
    error::{Error, Result},
    storage::TableGroup,
};

/// A concurrent map from archetype mask to table group.
pub struct ArchetypeLookup {
    /// Groups indexed by their key archetype's mask. Lock-free reads via
    /// the sharded concurrent map.
    groups: DashMap<TypeMask, Arc<TableGroup>>,

    /// Serialises every get-or-create across its re-probe and insertion.
    create_lock: Mutex<()>,

    /// Bumped after every insertion; the identity token query caches
    /// observe.
    revision: AtomicU64,
}

impl Default for ArchetypeLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchetypeLookup {
    /// Create an empty lookup.
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
            create_lock: Mutex::new(()),
            revision: AtomicU64::new(0),
        }
    }

    /// Find the group for a mask, comparing on full mask equality.
    pub fn find(&self, mask: &TypeMask) -> Option<Arc<TableGroup>> {
        self.groups.get(mask).map(|entry| entry.value().clone())
    }

    /// Get the group for an archetype, interning a new group when absent.
    pub fn get(&self, archetype: &Archetype) -> Arc<TableGroup> {
        if let Some(group) = self.find(archetype.mask()) {
            return group;
        }

        let _guard = self.create_lock.lock().unwrap();
        if let Some(group) = self.find(archetype.mask()) {
            return group;
        }
        self.insert_locked(archetype.clone())
    }

    /// Get the group for an arbitrary type listing, canonicalising the
    /// archetype only when no group exists yet.
    pub fn get_from_types(&self, types: &[&'static Info]) -> Arc<TableGroup> {
        let mask = TypeMask::from_bits(types.iter().map(|info| info.id().index()));
        if let Some(group) = self.find(&mask) {
            return group;
        }

        let _guard = self.create_lock.lock().unwrap();
        if let Some(group) = self.find(&mask) {
            return group;
        }
        self.insert_locked(Archetype::new(types.iter().copied()))
    }

    /// Get the group for `archetype` with one type added, deriving the
    /// probe mask without materialising the transition archetype.
    pub fn get_with_added(&self, archetype: &Archetype, info: &'static Info) -> Arc<TableGroup> {
        let mask = archetype.mask().with_bit(info.id().index());
        if let Some(group) = self.find(&mask) {
            return group;
        }

        let _guard = self.create_lock.lock().unwrap();
        if let Some(group) = self.find(&mask) {
            return group;
        }
        self.insert_locked(archetype.add(info))
    }

    /// Get the group for `archetype` with one type removed. The derived
    /// probe mask shrinks when the removed bit emptied the high word, so
    /// it hashes identically to a directly-built mask.
    pub fn get_with_removed(&self, archetype: &Archetype, info: &'static Info) -> Arc<TableGroup> {
        let mask = archetype.mask().without_bit(info.id().index());
        if let Some(group) = self.find(&mask) {
            return group;
        }

        let _guard = self.create_lock.lock().unwrap();
        if let Some(group) = self.find(&mask) {
            return group;
        }
        self.insert_locked(archetype.remove(info))
    }

    /// Strictly insert a pre-built group.
    ///
    /// Fails with `DuplicateKey` when a group for the archetype already
    /// exists (the get-or-create operations return the existing group
    /// instead of failing).
    pub fn insert(&self, group: Arc<TableGroup>) -> Result<()> {
        let _guard = self.create_lock.lock().unwrap();
        if self.groups.contains_key(group.key().mask()) {
            return Err(Error::DuplicateKey);
        }
        let mask = group.key().mask().clone();
        self.groups.insert(mask, group);
        self.revision.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Intern a group for `archetype`. Caller holds the creation lock and
    /// has verified absence.
    fn insert_locked(&self, archetype: Archetype) -> Arc<TableGroup> {
        log::debug!("interning archetype {:?}", archetype);
        let group = Arc::new(TableGroup::new(archetype));
        self.groups.insert(group.key().mask().clone(), group.clone());
        self.revision.fetch_add(1, Ordering::Release);
        group
    }

    /// The identity token: moves exactly when a group is inserted.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// A point-in-time listing of every group, for linear scans.
    pub fn groups(&self) -> Vec<Arc<TableGroup>> {
        self.groups.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of interned groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no group has been interned.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
