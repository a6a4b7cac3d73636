//! Fixed-capacity columnar tables.
//!
//! A [`Table`] stores the rows of one archetype: an entity column plus one
//! type-erased column per non-tag component, all row-aligned. Capacity is
//! fixed at construction — a full table never grows; the owning group gets
//! a fresh table instead.
//!
//! Tables owned by a registry are gated: structural mutations (append,
//! swap-delete, clear) are only accepted while the owning registry is
//! inside its sync point, and fail with [`Error::StructureLocked`]
//! otherwise, before any state is touched.

use std::sync::Arc;

use crate::ecs::{
    archetype::Archetype,
    component::{Component, try_type_of},
    entity::Entity,
    error::{Error, Result},
    registry::{RegistryId, SyncGate},
    storage::{Row, column::Column},
};

/// Ownership marker connecting a table to the registry that created it.
pub(crate) struct Owner {
    /// The owning registry.
    pub registry: RegistryId,

    /// The registry's sync gate, consulted before structural mutations.
    pub gate: Arc<SyncGate>,
}

/// A table stores entities and their component data in columnar form: one
/// contiguous typed column per non-tag component, kept row-aligned with the
/// entity column.
///
/// # Invariants
/// - every column has exactly `len()` live leading slots;
/// - columns appear in the archetype's `(Managed, Pod)` partition order;
/// - `version()` strictly increases across every structural mutation.
pub struct Table {
    /// The archetype every row of this table conforms to.
    archetype: Archetype,

    /// Set when a registry created this table; gates structural mutations.
    owner: Option<Owner>,

    /// The entities stored in this table (one per row).
    entities: Vec<Entity>,

    /// The component columns, one per non-tag archetype member.
    columns: Box<[Column]>,

    /// Fixed row capacity shared by every column.
    capacity: usize,

    /// Bumped on every structural mutation.
    version: u64,
}

impl Table {
    /// Create an unowned table (no structural gating).
    pub(crate) fn new(archetype: Archetype, capacity: usize) -> Self {
        Self::build(archetype, capacity, None)
    }

    /// Create a table owned by a registry.
    pub(crate) fn with_owner(archetype: Archetype, capacity: usize, owner: Owner) -> Self {
        Self::build(archetype, capacity, Some(owner))
    }

    fn build(archetype: Archetype, capacity: usize, owner: Option<Owner>) -> Self {
        let columns: Box<[Column]> = archetype.component_types()[..archetype.column_count()]
            .iter()
            .map(|&info| Column::new(info, capacity))
            .collect();
        Self {
            archetype,
            owner,
            entities: Vec::with_capacity(capacity),
            columns,
            capacity,
            version: 0,
        }
    }

    /// The archetype every row conforms to.
    #[inline]
    pub fn archetype(&self) -> &Archetype {
        &self.archetype
    }

    /// Fixed row capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether the table has no free row.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.entities.len() == self.capacity
    }

    /// Structural mutation counter; strictly increases on every mutation.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The entities stored in this table, one per live row.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The registry this table belongs to, if any.
    pub(crate) fn owner_registry(&self) -> Option<RegistryId> {
        self.owner.as_ref().map(|owner| owner.registry)
    }

    /// Fail with `StructureLocked` when an owning registry exists and is
    /// not inside its sync point.
    fn ensure_unlocked(&self) -> Result<()> {
        match &self.owner {
            Some(owner) if !owner.gate.is_open() => Err(Error::StructureLocked),
            _ => Ok(()),
        }
    }

    /// Append an entity, initialising every column slot of the new row to
    /// its component's cleared state.
    ///
    /// Fails with `Full` when the table is at capacity.
    pub fn append(&mut self, entity: Entity) -> Result<Row> {
        self.ensure_unlocked()?;
        if self.is_full() {
            return Err(Error::Full);
        }

        let row = self.entities.len();
        for column in self.columns.iter_mut() {
            // SAFETY: row < capacity and the slot holds no value.
            unsafe { column.init_slot(row) };
        }
        self.entities.push(entity);
        self.version += 1;

        Ok(Row::new(row))
    }

    /// Append an entity, filling the new row from `src[src_row]` where the
    /// two archetypes share a component and from the cleared state where
    /// they do not.
    ///
    /// Shared component values are moved bitwise — ownership transfers to
    /// this table, and the caller must release the source row with
    /// [`release_row`](Table::release_row) rather than delete it.
    ///
    /// Fails with `OutOfBounds` when `src_row` is not live in `src` and
    /// `Full` when this table is at capacity.
    pub fn append_from(&mut self, entity: Entity, src: &Table, src_row: Row) -> Result<Row> {
        self.ensure_unlocked()?;
        if src_row.index() >= src.entities.len() {
            return Err(Error::OutOfBounds {
                row: src_row.index(),
                len: src.entities.len(),
            });
        }
        if self.is_full() {
            return Err(Error::Full);
        }

        let row = self.entities.len();

        // Merge-walk the two column sequences; both are sorted by
        // (kind, id), so one forward pass pairs them up.
        let mut from = 0;
        for column in self.columns.iter_mut() {
            let key = column.info().sort_key();
            while from < src.columns.len() && src.columns[from].info().sort_key() < key {
                from += 1;
            }
            if from < src.columns.len() && src.columns[from].info().id() == column.info().id() {
                // SAFETY: src_row is live in src, row < capacity, types match.
                unsafe { column.copy_row_from(&src.columns[from], src_row.index(), row) };
                from += 1;
            } else {
                // SAFETY: row < capacity and the slot holds no value.
                unsafe { column.init_slot(row) };
            }
        }

        self.entities.push(entity);
        self.version += 1;

        Ok(Row::new(row))
    }

    /// Remove the row using swap-delete: the removed row's values are
    /// dropped and the last row moves into the gap.
    ///
    /// Returns the entity that was moved into the row, or `None` when the
    /// removed row was the last one — callers use this to patch that
    /// entity's recorded location.
    pub fn swap_delete(&mut self, row: Row) -> Result<Option<Entity>> {
        self.ensure_unlocked()?;
        let len = self.entities.len();
        if row.index() >= len {
            return Err(Error::OutOfBounds {
                row: row.index(),
                len,
            });
        }

        for column in self.columns.iter_mut() {
            // SAFETY: row < len == live slot count for every column.
            unsafe { column.swap_delete(row.index(), len) };
        }
        self.entities.swap_remove(row.index());
        self.version += 1;

        Ok(self.entities.get(row.index()).copied())
    }

    /// Remove the row after its shared values were moved to another table
    /// via [`append_from`](Table::append_from): columns the destination
    /// kept are released without dropping, columns it lacks are dropped.
    ///
    /// Returns the entity moved into the row, as `swap_delete` does.
    pub(crate) fn release_row(&mut self, row: Row, kept: &Archetype) -> Result<Option<Entity>> {
        self.ensure_unlocked()?;
        let len = self.entities.len();
        if row.index() >= len {
            return Err(Error::OutOfBounds {
                row: row.index(),
                len,
            });
        }

        for column in self.columns.iter_mut() {
            if kept.contains(column.info()) {
                // SAFETY: row < len; the value's bytes now live in the
                // destination table.
                unsafe { column.swap_release(row.index(), len) };
            } else {
                // SAFETY: row < len; the destination lacks this column, so
                // the value dies here.
                unsafe { column.swap_delete(row.index(), len) };
            }
        }
        self.entities.swap_remove(row.index());
        self.version += 1;

        Ok(self.entities.get(row.index()).copied())
    }

    /// Drop every row's values and reset the table to empty.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_unlocked()?;
        let len = self.entities.len();
        for column in self.columns.iter_mut() {
            // SAFETY: len is the live slot count for every column.
            unsafe { column.drop_range(len) };
        }
        self.entities.clear();
        self.version += 1;
        Ok(())
    }

    /// View the column storing `C` over the live rows.
    ///
    /// Fails with `ColumnNotFound` when `C` is not part of the archetype or
    /// is a tag type (tags carry no column).
    pub fn column<C: Component>(&self) -> Result<&[C]> {
        let index = self.column_index::<C>()?;
        // SAFETY: len() is the live slot count; the index was resolved for C.
        Ok(unsafe { self.columns[index].as_slice::<C>(self.entities.len()) })
    }

    /// Mutable view of the column storing `C` over the live rows.
    ///
    /// Fails with `ColumnNotFound` when `C` is not part of the archetype or
    /// is a tag type.
    pub fn column_mut<C: Component>(&mut self) -> Result<&mut [C]> {
        let index = self.column_index::<C>()?;
        let len = self.entities.len();
        // SAFETY: len is the live slot count; the index was resolved for C.
        Ok(unsafe { self.columns[index].as_mut_slice::<C>(len) })
    }

    /// Resolve the column index for `C` via the archetype's partition
    /// search.
    fn column_index<C: Component>(&self) -> Result<usize> {
        let not_found = || Error::ColumnNotFound {
            component: std::any::type_name::<C>(),
        };
        let info = try_type_of::<C>().ok_or_else(not_found)?;
        if info.is_tag() {
            return Err(not_found());
        }
        // Non-tag members precede tags in the listing, so the archetype
        // index is also the column index.
        self.archetype.index_of(info).ok_or_else(not_found)
    }

    /// Overwrite the `C` slot of a live row, dropping the previous value.
    pub(crate) fn write_component<C: Component>(&mut self, row: Row, value: C) -> Result<()> {
        let len = self.entities.len();
        let slice = self.column_mut::<C>()?;
        match slice.get_mut(row.index()) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::OutOfBounds {
                row: row.index(),
                len,
            }),
        }
    }

    /// Clone the `C` value of a live row out of the table.
    pub(crate) fn read_component<C: Component + Clone>(&self, row: Row) -> Result<C> {
        let len = self.entities.len();
        let slice = self.column::<C>()?;
        slice.get(row.index()).cloned().ok_or(Error::OutOfBounds {
            row: row.index(),
            len,
        })
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        let len = self.entities.len();
        for column in self.columns.iter_mut() {
            // SAFETY: len is the live slot count for every column.
            unsafe { column.drop_range(len) };
        }
    }
}
