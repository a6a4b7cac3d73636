//! The entity registry: identity, placement and structural mutation.
//!
//! A [`Registry`] owns an [`ArchetypeLookup`] and the entity directory — a
//! vector of entries indexed by entity id, which doubles as the storage of
//! the free-id stack (vacant entries chain the next free id through their
//! row field). An entity handle is live exactly when its entry holds a
//! table and the versions agree; destroying an entity bumps the entry
//! version, so recycled ids never validate old handles.
//!
//! Every structural mutation — create, destroy, move, component add and
//! remove — runs under the registry mutex, the *sync point*. While it is
//! held the registry's [`SyncGate`] is open, which is the cheap check the
//! owned tables perform before accepting a structural change; a table
//! reached outside the sync point fails `StructureLocked` instead.

use std::sync::{
    Arc, Mutex, MutexGuard, RwLock,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

use crate::ecs::{
    archetype::Archetype,
    component::{Component, Info, TypeList, type_of},
    entity::Entity,
    error::{Error, Result},
    lookup::ArchetypeLookup,
    query::{Predicate, Query},
    storage::{Owner, Row, SharedTable, Table, TableGroup},
};

/// Newly allocated tables are sized so one table spans roughly this many
/// bytes of row data.
pub const TARGET_TABLE_BYTES: usize = 16384;

/// Sentinel terminating the free-id chain threaded through vacant entries.
const FREE_END: u32 = u32::MAX;

/// Registry id allocation is process-wide so tables can name their owner.
static NEXT_REGISTRY_ID: AtomicU32 = AtomicU32::new(0);

/// Identifies one registry within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryId(u32);

impl RegistryId {
    #[inline]
    pub(crate) const fn new(id: u32) -> Self {
        Self(id)
    }
}

/// The flag owned tables consult before structural mutations: open exactly
/// while the owning registry holds its sync-point mutex.
pub(crate) struct SyncGate {
    open: AtomicBool,
}

impl SyncGate {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Release);
    }
}

/// One slot of the entity directory.
///
/// A live entry holds the entity's table and row. A vacant entry holds no
/// table and reuses `row` as the next link of the free-id chain; its
/// version is the value the *next* allocation of this id will carry.
struct Entry {
    /// The table holding the entity's row, or `None` while vacant.
    table: Option<SharedTable>,

    /// Live: the row index. Vacant: the next free id, or [`FREE_END`].
    row: u32,

    /// Bumped on every release of this slot.
    version: u32,
}

/// The entity directory: entries indexed by entity id plus the free-chain
/// head.
struct Directory {
    entries: Vec<Entry>,
    free_head: u32,
    live: usize,
}

impl Directory {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: FREE_END,
            live: 0,
        }
    }

    /// Allocate an entity id: pop the free chain when non-empty, extend
    /// the entry vector otherwise.
    fn alloc(&mut self) -> Entity {
        self.live += 1;
        if self.free_head != FREE_END {
            let id = self.free_head;
            let entry = &mut self.entries[id as usize];
            self.free_head = entry.row;
            entry.row = 0;
            Entity::new(id, entry.version)
        } else {
            let id = self.entries.len() as u32;
            assert!(id < FREE_END, "entity id space exhausted");
            self.entries.push(Entry {
                table: None,
                row: 0,
                version: 0,
            });
            Entity::new(id, 0)
        }
    }

    /// Resolve a handle to its table and row, validating the version.
    fn resolve(&self, entity: Entity) -> Result<(SharedTable, Row)> {
        match self.entries.get(entity.index()) {
            Some(Entry {
                table: Some(table),
                row,
                version,
            }) if *version == entity.version() => {
                Ok((table.clone(), Row::new(*row as usize)))
            }
            _ => Err(Error::EntityNotFound { entity }),
        }
    }

    /// Whether the handle currently refers to a live entity.
    fn is_live(&self, entity: Entity) -> bool {
        matches!(
            self.entries.get(entity.index()),
            Some(Entry {
                table: Some(_),
                version,
                ..
            }) if *version == entity.version()
        )
    }

    /// Record the entity's placement.
    fn place(&mut self, entity: Entity, table: SharedTable, row: Row) {
        let entry = &mut self.entries[entity.index()];
        entry.table = Some(table);
        entry.row = row.index() as u32;
    }

    /// Update the row of an entity that a swap-delete moved.
    fn patch_row(&mut self, moved: Entity, row: Row) {
        self.entries[moved.index()].row = row.index() as u32;
    }

    /// Release a live entity's slot onto the free chain, invalidating the
    /// handle by bumping the version.
    fn release(&mut self, entity: Entity) {
        let id = entity.id();
        let entry = &mut self.entries[entity.index()];
        entry.table = None;
        entry.version = entry.version.wrapping_add(1);
        entry.row = self.free_head;
        self.free_head = id;
        self.live -= 1;
    }
}

/// RAII sync point: the locked directory plus the opened gate. Owned
/// tables accept structural mutations only while one of these is alive.
struct SyncPoint<'a> {
    dir: MutexGuard<'a, Directory>,
    gate: &'a SyncGate,
}

impl Drop for SyncPoint<'_> {
    fn drop(&mut self) {
        self.gate.set_open(false);
    }
}

impl std::ops::Deref for SyncPoint<'_> {
    type Target = Directory;
    fn deref(&self) -> &Directory {
        &self.dir
    }
}

impl std::ops::DerefMut for SyncPoint<'_> {
    fn deref_mut(&mut self) -> &mut Directory {
        &mut self.dir
    }
}

/// Location of a live entity: its table, row and archetype at the time of
/// the call.
pub struct EntityLocation {
    table: SharedTable,
    row: Row,
    archetype: Archetype,
}

impl std::fmt::Debug for EntityLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityLocation")
            .field("row", &self.row)
            .field("archetype", &self.archetype)
            .finish()
    }
}

impl EntityLocation {
    /// The table holding the entity's row.
    #[inline]
    pub fn table(&self) -> &SharedTable {
        &self.table
    }

    /// The entity's row within the table.
    #[inline]
    pub fn row(&self) -> Row {
        self.row
    }

    /// The entity's archetype.
    #[inline]
    pub fn archetype(&self) -> &Archetype {
        &self.archetype
    }
}

/// Owner of the archetype lookup and the entity directory; all structural
/// mutations pass through here and are serialised by one mutex.
pub struct Registry {
    /// This registry's process-unique id, stamped into owned tables.
    id: RegistryId,

    /// The archetype → table-group lookup.
    lookup: Arc<ArchetypeLookup>,

    /// Gate owned tables consult for structural gating.
    gate: Arc<SyncGate>,

    /// The entity directory behind the sync-point mutex.
    inner: Mutex<Directory>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry with its own lookup.
    pub fn new() -> Self {
        Self {
            id: RegistryId::new(NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed)),
            lookup: Arc::new(ArchetypeLookup::new()),
            gate: Arc::new(SyncGate::new()),
            inner: Mutex::new(Directory::new()),
        }
    }

    /// This registry's id.
    #[inline]
    pub fn id(&self) -> RegistryId {
        self.id
    }

    /// The archetype lookup owned by this registry.
    #[inline]
    pub fn lookup(&self) -> &Arc<ArchetypeLookup> {
        &self.lookup
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.inner.lock().unwrap().live
    }

    /// Enter the sync point: lock the directory and open the gate.
    fn sync(&self) -> SyncPoint<'_> {
        let dir = self.inner.lock().unwrap();
        self.gate.set_open(true);
        SyncPoint {
            dir,
            gate: &self.gate,
        }
    }

    /// Intern (or fetch) the canonical archetype for a type listing.
    pub fn create_archetype<T: TypeList>(&self) -> Archetype {
        self.lookup.get_from_types(&T::types()).key().clone()
    }

    /// Create an entity with the given archetype. Every component slot of
    /// its row starts in the component's cleared state.
    pub fn create_entity(&self, archetype: &Archetype) -> Result<Entity> {
        let mut sync = self.sync();
        let group = self.lookup.get(archetype);
        let table = self.unfilled_table(&group);
        let entity = sync.alloc();
        let row = table.write().unwrap().append(entity)?;
        sync.place(entity, table, row);
        log::trace!("created entity {} in {:?}", entity, archetype);
        Ok(entity)
    }

    /// Create an entity whose archetype is named as a type list, e.g.
    /// `registry.create_entity_with::<(Position, Velocity)>()`.
    pub fn create_entity_with<T: TypeList>(&self) -> Result<Entity> {
        let archetype = self.create_archetype::<T>();
        self.create_entity(&archetype)
    }

    /// Create an entity directly in a specific table of this registry.
    ///
    /// Unlike [`create_entity`](Registry::create_entity), which always
    /// finds or allocates an unfilled table, this surfaces `Full` when the
    /// chosen table has no free row.
    pub fn create_entity_in(&self, table: &SharedTable) -> Result<Entity> {
        let mut sync = self.sync();
        if table.read().unwrap().owner_registry() != Some(self.id) {
            return Err(Error::TableNotOwned);
        }
        if table.read().unwrap().is_full() {
            return Err(Error::Full);
        }
        let entity = sync.alloc();
        let row = table.write().unwrap().append(entity)?;
        sync.place(entity, table.clone(), row);
        Ok(entity)
    }

    /// Destroy a live entity, dropping its component values and recycling
    /// its id.
    pub fn destroy_entity(&self, entity: Entity) -> Result<()> {
        let mut sync = self.sync();
        let (table, row) = sync.resolve(entity)?;
        let moved = table.write().unwrap().swap_delete(row)?;
        if let Some(moved) = moved {
            sync.patch_row(moved, row);
        }
        sync.release(entity);
        log::trace!("destroyed entity {}", entity);
        Ok(())
    }

    /// Whether the handle refers to a live entity of this registry.
    pub fn contains_entity(&self, entity: Entity) -> bool {
        self.inner.lock().unwrap().is_live(entity)
    }

    /// Locate a live entity: its table, row and archetype.
    pub fn find_entity(&self, entity: Entity) -> Result<EntityLocation> {
        let (table, row) = self.inner.lock().unwrap().resolve(entity)?;
        let archetype = table.read().unwrap().archetype().clone();
        Ok(EntityLocation {
            table,
            row,
            archetype,
        })
    }

    /// The archetype of a live entity.
    pub fn archetype_of(&self, entity: Entity) -> Result<Archetype> {
        Ok(self.find_entity(entity)?.archetype)
    }

    /// Add component `C` to an entity, moving its row to the grown
    /// archetype's group. The new slot starts in the cleared state.
    ///
    /// Returns `false` without changes when the entity already carries the
    /// component.
    pub fn add_component<C: Component>(&self, entity: Entity) -> Result<bool> {
        self.add_component_info(entity, type_of::<C>())
    }

    /// Type-erased form of [`add_component`](Registry::add_component).
    pub fn add_component_info(&self, entity: Entity, info: &'static Info) -> Result<bool> {
        let mut sync = self.sync();
        let (src, row) = sync.resolve(entity)?;
        let src_archetype = src.read().unwrap().archetype().clone();
        if src_archetype.contains(info) {
            return Ok(false);
        }

        let group = self.lookup.get_with_added(&src_archetype, info);
        self.shift_to_group(&mut sync, entity, &src, row, &group)?;
        Ok(true)
    }

    /// Remove component `C` from an entity, moving its row to the shrunk
    /// archetype's group and dropping the removed value.
    ///
    /// Returns `false` without changes when the entity does not carry the
    /// component.
    pub fn remove_component<C: Component>(&self, entity: Entity) -> Result<bool> {
        self.remove_component_info(entity, type_of::<C>())
    }

    /// Type-erased form of [`remove_component`](Registry::remove_component).
    pub fn remove_component_info(&self, entity: Entity, info: &'static Info) -> Result<bool> {
        let mut sync = self.sync();
        let (src, row) = sync.resolve(entity)?;
        let src_archetype = src.read().unwrap().archetype().clone();
        if !src_archetype.contains(info) {
            return Ok(false);
        }

        let group = self.lookup.get_with_removed(&src_archetype, info);
        self.shift_to_group(&mut sync, entity, &src, row, &group)?;
        Ok(true)
    }

    /// Write a component value, first moving the entity into a "has `C`"
    /// archetype when needed.
    pub fn set_component<C: Component>(&self, entity: Entity, value: C) -> Result<()> {
        let info = type_of::<C>();
        let mut sync = self.sync();
        let (mut table, mut row) = sync.resolve(entity)?;

        let archetype = table.read().unwrap().archetype().clone();
        if !archetype.contains(info) {
            let group = self.lookup.get_with_added(&archetype, info);
            self.shift_to_group(&mut sync, entity, &table, row, &group)?;
            (table, row) = sync.resolve(entity)?;
        }

        if info.is_tag() {
            // Tags carry no column; presence in the archetype is the value.
            return Ok(());
        }
        table.write().unwrap().write_component(row, value)
    }

    /// Read a component value. `None` when the entity's archetype lacks
    /// `C`; a present tag reads as its (zero-sized) default.
    pub fn get_component<C: Component + Clone>(&self, entity: Entity) -> Result<Option<C>> {
        let info = type_of::<C>();
        let (table, row) = self.inner.lock().unwrap().resolve(entity)?;
        let guard = table.read().unwrap();
        if !guard.archetype().contains(info) {
            return Ok(None);
        }
        if info.is_tag() {
            return Ok(Some(C::default()));
        }
        guard.read_component::<C>(row).map(Some)
    }

    /// Move a live entity into a specific destination table.
    ///
    /// The table must belong to this registry (`TableNotOwned` otherwise)
    /// and have a free row (`Full` otherwise). Components the destination
    /// archetype lacks are dropped; components it adds start cleared.
    pub fn move_entity(&self, entity: Entity, dst: &SharedTable) -> Result<()> {
        let mut sync = self.sync();
        let (src, row) = sync.resolve(entity)?;

        if dst.read().unwrap().owner_registry() != Some(self.id) {
            return Err(Error::TableNotOwned);
        }
        if Arc::ptr_eq(&src, dst) {
            return Ok(());
        }

        let new_row = {
            let src_guard = src.read().unwrap();
            dst.write().unwrap().append_from(entity, &src_guard, row)?
        };
        let dst_archetype = dst.read().unwrap().archetype().clone();
        let moved = src.write().unwrap().release_row(row, &dst_archetype)?;
        if let Some(moved) = moved {
            sync.patch_row(moved, row);
        }
        sync.place(entity, dst.clone(), new_row);
        Ok(())
    }

    /// Move a live entity to the given archetype, keeping the component
    /// values the two archetypes share.
    pub fn modify_entity(&self, entity: Entity, archetype: &Archetype) -> Result<()> {
        let mut sync = self.sync();
        let (src, row) = sync.resolve(entity)?;
        if src.read().unwrap().archetype() == archetype {
            return Ok(());
        }

        let group = self.lookup.get(archetype);
        self.shift_to_group(&mut sync, entity, &src, row, &group)
    }

    /// Create a query over this registry's lookup.
    pub fn create_query(&self, predicate: Predicate) -> Query {
        Query::new(self.lookup.clone(), predicate)
    }

    /// Move one row from `src` into an unfilled table of `group`, patching
    /// the directory for both the shifted entity and the entity its
    /// departure swapped down.
    fn shift_to_group(
        &self,
        sync: &mut SyncPoint<'_>,
        entity: Entity,
        src: &SharedTable,
        row: Row,
        group: &TableGroup,
    ) -> Result<()> {
        let dst = self.unfilled_table(group);
        debug_assert!(!Arc::ptr_eq(src, &dst), "source and destination alias");

        let new_row = {
            let src_guard = src.read().unwrap();
            dst.write().unwrap().append_from(entity, &src_guard, row)?
        };
        let moved = src.write().unwrap().release_row(row, group.key())?;
        if let Some(moved) = moved {
            sync.patch_row(moved, row);
        }
        sync.place(entity, dst, new_row);
        log::trace!("moved entity {} to {:?}", entity, group.key());
        Ok(())
    }

    /// The group's first table with a free row, or a freshly allocated one
    /// sized to [`TARGET_TABLE_BYTES`].
    fn unfilled_table(&self, group: &TableGroup) -> SharedTable {
        if let Some(table) = group.unfilled() {
            return table;
        }

        let rows = (TARGET_TABLE_BYTES / group.key().row_size_bytes() as usize).max(1);
        log::debug!("allocating table for {:?} ({} rows)", group.key(), rows);
        let table = Arc::new(RwLock::new(Table::with_owner(
            group.key().clone(),
            rows,
            Owner {
                registry: self.id,
                gate: self.gate.clone(),
            },
        )));
        group
            .add(table.clone())
            .expect("freshly built table matches its group");
        table
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use strata_macros::Component;

    use super::*;
    use crate::ecs::component::type_of;

    #[derive(Component, Default, Debug, PartialEq, Clone, Copy)]
    struct Pos {
        x: i32,
        y: i32,
    }

    #[derive(Component, Default, Debug, PartialEq, Clone, Copy)]
    struct Vel {
        dx: i32,
        dy: i32,
    }

    #[derive(Component, Default, Debug, PartialEq, Clone)]
    struct Named(String);

    #[derive(Component, Default, Debug, PartialEq, Clone, Copy)]
    struct Player;

    #[test]
    fn create_and_find_round_trip() {
        // Given
        let registry = Registry::new();
        let archetype = registry.create_archetype::<(Pos, Vel)>();

        // When
        let entity = registry.create_entity(&archetype).unwrap();

        // Then
        assert!(registry.contains_entity(entity));
        assert_eq!(registry.entity_count(), 1);
        let location = registry.find_entity(entity).unwrap();
        assert_eq!(*location.archetype(), archetype);
        let table = location.table().read().unwrap();
        assert_eq!(table.entities()[location.row().index()], entity);
    }

    #[test]
    fn destroy_invalidates_handle_even_after_id_reuse() {
        // Given
        let registry = Registry::new();
        let archetype = registry.create_archetype::<Pos>();
        let entity = registry.create_entity(&archetype).unwrap();

        // When
        registry.destroy_entity(entity).unwrap();
        let other_archetype = registry.create_archetype::<Vel>();
        let recycled = registry.create_entity(&other_archetype).unwrap();

        // Then - the id was recycled with a bumped version
        assert_eq!(recycled.id(), entity.id());
        assert_ne!(recycled.version(), entity.version());

        // Then - every operation on the stale handle fails
        assert!(!registry.contains_entity(entity));
        assert_eq!(
            registry.find_entity(entity).unwrap_err(),
            Error::EntityNotFound { entity }
        );
        assert_eq!(
            registry.destroy_entity(entity).unwrap_err(),
            Error::EntityNotFound { entity }
        );
        assert_eq!(
            registry.get_component::<Pos>(entity).unwrap_err(),
            Error::EntityNotFound { entity }
        );

        // And the recycled handle works
        assert!(registry.contains_entity(recycled));
    }

    #[test]
    fn component_lifecycle() {
        // Given
        let registry = Registry::new();
        let entity = registry.create_entity_with::<Pos>().unwrap();

        // When
        registry.set_component(entity, Pos { x: 1, y: 2 }).unwrap();
        registry.set_component(entity, Vel { dx: 3, dy: 4 }).unwrap();

        // Then
        assert_eq!(
            registry.get_component::<Pos>(entity).unwrap(),
            Some(Pos { x: 1, y: 2 })
        );
        assert_eq!(
            registry.get_component::<Vel>(entity).unwrap(),
            Some(Vel { dx: 3, dy: 4 })
        );

        // When
        assert!(registry.remove_component::<Vel>(entity).unwrap());

        // Then
        assert_eq!(registry.get_component::<Vel>(entity).unwrap(), None);
        assert_eq!(
            registry.get_component::<Pos>(entity).unwrap(),
            Some(Pos { x: 1, y: 2 })
        );
    }

    #[test]
    fn add_component_reports_presence() {
        // Given
        let registry = Registry::new();
        let entity = registry.create_entity_with::<Pos>().unwrap();

        // When / Then
        assert!(registry.add_component::<Vel>(entity).unwrap());
        assert!(!registry.add_component::<Vel>(entity).unwrap());
        assert!(!registry.remove_component::<Named>(entity).unwrap());
    }

    #[test]
    fn add_component_preserves_existing_values() {
        // Given
        let registry = Registry::new();
        let entity = registry.create_entity_with::<Pos>().unwrap();
        registry.set_component(entity, Pos { x: 7, y: 9 }).unwrap();

        // When - the row moves to the (Pos, Vel) table
        registry.add_component::<Vel>(entity).unwrap();

        // Then - the old value came along, the new slot is cleared
        assert_eq!(
            registry.get_component::<Pos>(entity).unwrap(),
            Some(Pos { x: 7, y: 9 })
        );
        assert_eq!(
            registry.get_component::<Vel>(entity).unwrap(),
            Some(Vel::default())
        );
    }

    #[test]
    fn swap_delete_patches_moved_entity_row() {
        // Given - three entities sharing one table
        let registry = Registry::new();
        let archetype = registry.create_archetype::<Pos>();
        let e1 = registry.create_entity(&archetype).unwrap();
        let e2 = registry.create_entity(&archetype).unwrap();
        let e3 = registry.create_entity(&archetype).unwrap();
        registry.set_component(e3, Pos { x: 3, y: 3 }).unwrap();

        let old_row = registry.find_entity(e1).unwrap().row();

        // When - destroying e1 swaps e3 into its row
        registry.destroy_entity(e1).unwrap();

        // Then - the directory agrees with the table's entity column
        let location = registry.find_entity(e3).unwrap();
        assert_eq!(location.row(), old_row);
        let table = location.table().read().unwrap();
        assert_eq!(table.entities()[location.row().index()], e3);
        assert_eq!(table.len(), 2);

        // And e2 is untouched
        assert!(registry.contains_entity(e2));
        assert_eq!(
            registry.get_component::<Pos>(e3).unwrap(),
            Some(Pos { x: 3, y: 3 })
        );
    }

    #[test]
    fn component_moves_patch_source_rows() {
        // Given - two entities in the same table
        let registry = Registry::new();
        let e1 = registry.create_entity_with::<Pos>().unwrap();
        let e2 = registry.create_entity_with::<Pos>().unwrap();
        registry.set_component(e1, Pos { x: 1, y: 1 }).unwrap();
        registry.set_component(e2, Pos { x: 2, y: 2 }).unwrap();

        // When - e1 leaves for the (Pos, Vel) table
        registry.add_component::<Vel>(e1).unwrap();

        // Then - e2 was swapped into e1's old row and still resolves
        let location = registry.find_entity(e2).unwrap();
        let table = location.table().read().unwrap();
        assert_eq!(table.entities()[location.row().index()], e2);
        assert_eq!(
            registry.get_component::<Pos>(e2).unwrap(),
            Some(Pos { x: 2, y: 2 })
        );
        assert_eq!(
            registry.get_component::<Pos>(e1).unwrap(),
            Some(Pos { x: 1, y: 1 })
        );
    }

    #[test]
    fn tag_components_round_trip() {
        // Given
        let registry = Registry::new();
        let entity = registry.create_entity_with::<Pos>().unwrap();

        // When
        registry.add_component::<Player>(entity).unwrap();

        // Then - presence in the archetype is the value
        assert_eq!(
            registry.get_component::<Player>(entity).unwrap(),
            Some(Player)
        );
        assert!(
            registry
                .archetype_of(entity)
                .unwrap()
                .contains(type_of::<Player>())
        );

        // When
        registry.remove_component::<Player>(entity).unwrap();

        // Then
        assert_eq!(registry.get_component::<Player>(entity).unwrap(), None);
    }

    #[test]
    fn managed_components_drop_exactly_once() {
        // Given
        #[derive(Component, Default, Debug)]
        struct Resource(Option<Arc<AtomicUsize>>);

        impl Drop for Resource {
            fn drop(&mut self) {
                if let Some(counter) = &self.0 {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let counter = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new();
        let entity = registry.create_entity_with::<Resource>().unwrap();
        registry
            .set_component(entity, Resource(Some(counter.clone())))
            .unwrap();

        // When - the row migrates twice, then the entity dies
        registry.add_component::<Pos>(entity).unwrap();
        registry.remove_component::<Pos>(entity).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        registry.destroy_entity(entity).unwrap();

        // Then - the value dropped exactly once, at destruction
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn modify_entity_keeps_shared_values() {
        // Given
        let registry = Registry::new();
        let entity = registry.create_entity_with::<(Pos, Vel)>().unwrap();
        registry.set_component(entity, Pos { x: 5, y: 5 }).unwrap();
        registry.set_component(entity, Vel { dx: 1, dy: 1 }).unwrap();

        // When - modify to an archetype sharing only Pos
        let target = registry.create_archetype::<(Pos, Named)>();
        registry.modify_entity(entity, &target).unwrap();

        // Then
        assert_eq!(registry.archetype_of(entity).unwrap(), target);
        assert_eq!(
            registry.get_component::<Pos>(entity).unwrap(),
            Some(Pos { x: 5, y: 5 })
        );
        assert_eq!(registry.get_component::<Vel>(entity).unwrap(), None);
        assert_eq!(
            registry.get_component::<Named>(entity).unwrap(),
            Some(Named::default())
        );
    }

    #[test]
    fn move_entity_validates_ownership_and_capacity() {
        // Given - two registries
        let home = Registry::new();
        let away = Registry::new();
        let entity = home.create_entity_with::<Pos>().unwrap();
        let foreign = away.create_entity_with::<Pos>().unwrap();
        let foreign_table = away.find_entity(foreign).unwrap().table().clone();

        // Then - a table of another registry is rejected
        assert_eq!(
            home.move_entity(entity, &foreign_table).unwrap_err(),
            Error::TableNotOwned
        );

        // Given - a destination table of this registry
        let dst = {
            let vel_entity = home.create_entity_with::<(Pos, Vel)>().unwrap();
            home.find_entity(vel_entity).unwrap().table().clone()
        };

        // When
        home.move_entity(entity, &dst).unwrap();

        // Then
        let location = home.find_entity(entity).unwrap();
        assert!(Arc::ptr_eq(location.table(), &dst));

        // And moving into the current table is a no-op
        home.move_entity(entity, &dst).unwrap();
    }

    #[test]
    fn empty_archetype_entities_live_in_the_base_group() {
        // Given
        let registry = Registry::new();
        let base = Archetype::base();

        // When
        let entity = registry.create_entity(&base).unwrap();

        // Then
        assert_eq!(registry.archetype_of(entity).unwrap(), base);
        assert_eq!(registry.get_component::<Pos>(entity).unwrap(), None);

        // And removing the last component of an entity lands it here too
        let other = registry.create_entity_with::<Pos>().unwrap();
        registry.remove_component::<Pos>(other).unwrap();
        assert_eq!(registry.archetype_of(other).unwrap(), base);
    }

    #[test]
    fn tables_fill_and_spill_into_fresh_ones() {
        // Given - a row wide enough that one table holds only a few; a
        // dedicated component keeps this group private to the test
        #[derive(Component, Debug, Clone, Copy)]
        struct Wide([u64; 512]);

        impl Default for Wide {
            fn default() -> Self {
                Wide([0; 512])
            }
        }

        let registry = Registry::new();
        let archetype = registry.create_archetype::<Wide>();
        let per_table = TARGET_TABLE_BYTES / archetype.row_size_bytes() as usize;

        // When - one more entity than a single table holds
        let entities: Vec<_> = (0..=per_table)
            .map(|_| registry.create_entity(&archetype).unwrap())
            .collect();

        // Then - the group spilled into a second table
        let group = registry.lookup().find(archetype.mask()).unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(registry.entity_count(), entities.len());

        // And every entity still resolves
        for entity in entities {
            assert!(registry.contains_entity(entity));
        }
    }

    #[test]
    fn create_entity_in_surfaces_full_and_ownership() {
        // Given - a registry and one of its tables
        let registry = Registry::new();
        let seed = registry.create_entity_with::<Pos>().unwrap();
        let table = registry.find_entity(seed).unwrap().table().clone();

        // When - creating directly into the table
        let entity = registry.create_entity_in(&table).unwrap();

        // Then
        assert!(registry.contains_entity(entity));
        assert!(Arc::ptr_eq(registry.find_entity(entity).unwrap().table(), &table));

        // Then - a foreign table is rejected
        let other = Registry::new();
        assert_eq!(
            other.create_entity_in(&table).unwrap_err(),
            Error::TableNotOwned
        );

        // When - the table fills up
        while !table.read().unwrap().is_full() {
            registry.create_entity_in(&table).unwrap();
        }

        // Then
        assert_eq!(registry.create_entity_in(&table).unwrap_err(), Error::Full);
    }

    #[test]
    fn structural_mutations_are_gated_outside_the_sync_point() {
        // Given - a table fetched from a live registry
        let registry = Registry::new();
        let entity = registry.create_entity_with::<Pos>().unwrap();
        let table = registry.find_entity(entity).unwrap().table().clone();

        // When - a caller pokes the table outside any registry operation
        let result = table.write().unwrap().append(Entity::new(999, 0));

        // Then
        assert_eq!(result, Err(Error::StructureLocked));
    }

    #[test]
    fn concurrent_creates_in_one_archetype() {
        // Given
        let registry = Arc::new(Registry::new());
        let archetype = registry.create_archetype::<(Pos, Vel)>();

        // When - several threads create entities at once
        let created: Vec<Entity> = crossbeam::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    let archetype = archetype.clone();
                    scope.spawn(move |_| {
                        (0..50)
                            .map(|_| registry.create_entity(&archetype).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        })
        .unwrap();

        // Then - all distinct, all live, one group
        let mut ids: Vec<_> = created.iter().map(|e| e.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), created.len());
        assert_eq!(registry.entity_count(), created.len());
        for entity in created {
            assert!(registry.contains_entity(entity));
        }
    }
}
