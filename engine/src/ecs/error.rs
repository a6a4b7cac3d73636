//! Error types surfaced at the data store's operation boundaries.
//!
//! Every fallible operation returns a typed [`Error`]; failures are reported
//! before any state is touched, so a returned error always leaves tables,
//! groups and the entity directory unchanged.

use crate::ecs::entity::Entity;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while operating on the data store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A component type reference did not carry a valid kind.
    #[error("component type has an invalid kind")]
    InvalidComponentType,

    /// A typed column access named a component the table's archetype does
    /// not store (absent, or a tag type which carries no column).
    #[error("no column for component type {component}")]
    ColumnNotFound {
        /// The requested component's type name.
        component: &'static str,
    },

    /// The table has no room for another row.
    #[error("table is full")]
    Full,

    /// A row index referred past the live rows of a table.
    #[error("row {row} out of bounds (table has {len} rows)")]
    OutOfBounds {
        /// The offending row index.
        row: usize,
        /// The number of live rows at the time of the call.
        len: usize,
    },

    /// A structural mutation was attempted on an owned table while its
    /// registry was not inside a sync point.
    #[error("table structure is locked outside the owning registry's sync point")]
    StructureLocked,

    /// A table was offered to a group whose key archetype disagrees with
    /// the table's archetype.
    #[error("archetype does not match the group key")]
    ArchetypeMismatch,

    /// A table passed to a registry operation belongs to a different
    /// registry (or to none).
    #[error("table is not owned by this registry")]
    TableNotOwned,

    /// The entity handle is stale (its id was recycled) or was never
    /// allocated by this registry.
    #[error("entity {entity:?} not found")]
    EntityNotFound {
        /// The stale or unknown handle.
        entity: Entity,
    },

    /// A strict insertion found the archetype bitset already present.
    #[error("a group for this archetype already exists")]
    DuplicateKey,
}
