//! The process-wide component type registry.
//!
//! Component ids are used as bit indices in archetype masks, so they must
//! be dense and every registry in the process must agree on them. A single
//! global registry therefore owns the id counter; worlds never carry their
//! own copy.
//!
//! Reads are lock-free via a sharded concurrent map; registration takes a
//! single shard entry plus a short write lock on the by-id table, and is
//! idempotent under races (the entry API makes one thread the registrar,
//! the rest observe its result).

use std::{
    any::TypeId as StdTypeId,
    sync::{
        LazyLock, RwLock,
        atomic::{AtomicU32, Ordering},
    },
};

use dashmap::DashMap;

use crate::ecs::component::{Component, Id, Info};

/// Ids at or beyond this value would no longer round-trip through the
/// signed half of the id space; allocation past it is fatal.
const MAX_IDS: u32 = 1 << 31;

/// The singleton registry.
static REGISTRY: LazyLock<TypeRegistry> = LazyLock::new(TypeRegistry::new);

struct TypeRegistry {
    /// Map from Rust TypeId to the interned info. Lock-free reads.
    type_map: DashMap<StdTypeId, &'static Info>,

    /// Registered infos indexed by component id. Protected by RwLock for
    /// rare writes.
    by_id: RwLock<Vec<Option<&'static Info>>>,

    /// Next available component identifier.
    next_id: AtomicU32,
}

impl TypeRegistry {
    fn new() -> Self {
        Self {
            type_map: DashMap::new(),
            by_id: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(0),
        }
    }
}

/// Get the interned [`Info`] for component type `C`, registering it on
/// first access.
///
/// Thread-safe and idempotent: every call with the same `C` returns the
/// same reference, and sequential registrations from one thread observe
/// strictly increasing ids.
///
/// # Panics
/// Panics if the component id space (2^31 ids) is exhausted.
pub fn type_of<C: Component>() -> &'static Info {
    let std_id = StdTypeId::of::<C>();

    // Fast path: already registered (lock-free read)
    if let Some(info) = REGISTRY.type_map.get(&std_id) {
        return *info;
    }

    // Slow path: the entry API picks one registrar when two threads both
    // miss the fast path.
    *REGISTRY
        .type_map
        .entry(std_id)
        .or_insert_with(|| {
            let raw = REGISTRY.next_id.fetch_add(1, Ordering::Relaxed);
            assert!(raw < MAX_IDS, "component id space exhausted");

            let info: &'static Info = Box::leak(Box::new(Info::new::<C>(Id::new(raw))));

            // Record in the by-id table
            let mut by_id = REGISTRY.by_id.write().unwrap();
            let index = raw as usize;
            if index >= by_id.len() {
                by_id.resize(index + 1, None);
            }
            by_id[index] = Some(info);

            log::trace!(
                "registered component type {} as id {} ({:?})",
                info.type_name(),
                info.id(),
                info.kind()
            );

            info
        })
        .value()
}

/// Get the interned [`Info`] for `C` if it has been registered.
pub fn try_type_of<C: Component>() -> Option<&'static Info> {
    REGISTRY
        .type_map
        .get(&StdTypeId::of::<C>())
        .map(|entry| *entry.value())
}

/// Get the interned [`Info`] for a component id, if one was allocated.
pub fn info_by_id(id: Id) -> Option<&'static Info> {
    let by_id = REGISTRY.by_id.read().unwrap();
    by_id.get(id.index()).copied().flatten()
}

/// Number of component types registered so far.
pub fn registered_count() -> usize {
    REGISTRY.type_map.len()
}
