//! Groups of tables sharing one archetype.

use std::sync::{Arc, RwLock};

use crate::ecs::{
    archetype::Archetype,
    error::{Error, Result},
    storage::table::Table,
};

/// A table shared between its group, the entity directory and query
/// snapshots. Structural mutations take the write half; iteration takes
/// the read half.
pub type SharedTable = Arc<RwLock<Table>>;

/// All tables holding rows of one archetype.
///
/// The key archetype is fixed for the group's lifetime. The table list is
/// published copy-on-write: mutations build a fresh list under the group
/// lock and swap it in, so a snapshot taken by a reader is never observed
/// mid-update.
pub struct TableGroup {
    /// The archetype every member table conforms to.
    key: Archetype,

    /// Copy-on-write list of member tables.
    tables: RwLock<Arc<Vec<SharedTable>>>,
}

impl TableGroup {
    /// Create an empty group for the given archetype.
    pub fn new(key: Archetype) -> Self {
        Self {
            key,
            tables: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// The archetype this group keys on.
    #[inline]
    pub fn key(&self) -> &Archetype {
        &self.key
    }

    /// Publish a new list with `table` appended.
    ///
    /// Fails with `ArchetypeMismatch` when the table's archetype disagrees
    /// with the group key.
    pub fn add(&self, table: SharedTable) -> Result<()> {
        if *table.read().unwrap().archetype() != self.key {
            return Err(Error::ArchetypeMismatch);
        }

        let mut current = self.tables.write().unwrap();
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(table);
        *current = Arc::new(next);
        Ok(())
    }

    /// Publish a new list with the first reference to `table` removed.
    ///
    /// Fails with `ArchetypeMismatch` when the table's archetype disagrees
    /// with the group key; removing a table that is not a member is a
    /// no-op.
    pub fn remove(&self, table: &SharedTable) -> Result<()> {
        if *table.read().unwrap().archetype() != self.key {
            return Err(Error::ArchetypeMismatch);
        }

        let mut current = self.tables.write().unwrap();
        if let Some(at) = current.iter().position(|member| Arc::ptr_eq(member, table)) {
            let mut next = Vec::with_capacity(current.len() - 1);
            next.extend(current[..at].iter().cloned());
            next.extend(current[at + 1..].iter().cloned());
            *current = Arc::new(next);
        }
        Ok(())
    }

    /// A point-in-time snapshot of the member tables, consistent with
    /// publication order.
    pub fn snapshot(&self) -> Arc<Vec<SharedTable>> {
        self.tables.read().unwrap().clone()
    }

    /// The first member table with a free row, if any.
    pub fn unfilled(&self) -> Option<SharedTable> {
        self.snapshot()
            .iter()
            .find(|table| !table.read().unwrap().is_full())
            .cloned()
    }

    /// Number of member tables.
    pub fn len(&self) -> usize {
        self.tables.read().unwrap().len()
    }

    /// Whether the group has no member tables.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TableGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableGroup")
            .field("key", &self.key)
            .field("tables", &self.len())
            .finish()
    }
}
