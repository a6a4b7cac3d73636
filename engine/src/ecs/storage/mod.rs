//! Columnar storage for entities grouped by archetype.
//!
//! A [`Table`] holds the rows for one archetype: an entity column plus one
//! type-erased, fixed-capacity column per non-tag component. Tables that
//! share an archetype are collected in a [`TableGroup`], which acts as that
//! archetype's freelist of partially filled tables.
//!
//! The layering mirrors the rest of the crate: `FixedMemory` is the raw
//! allocation, `Column` adds per-component drop/init discipline on top of
//! it, `Table` keeps the columns row-aligned, and `TableGroup` publishes a
//! copy-on-write listing of tables for lock-free snapshots.

pub(crate) mod column;
pub(crate) mod mem;

mod group;
mod row;
mod table;

pub use group::{SharedTable, TableGroup};
pub use row::Row;
pub use table::Table;

pub(crate) use table::Owner;
