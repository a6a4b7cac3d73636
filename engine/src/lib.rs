//! An archetype-based entity-component data store.
//!
//! Entities carrying the exact same set of component types are grouped into
//! the same archetype, and each archetype's component data is stored in
//! fixed-capacity tables as parallel typed columns for cache-friendly bulk
//! iteration. Adding or removing a component moves the entity's row between
//! tables while the entity handle stays stable.
//!
//! The crate surface is the [`ecs`] module; the most commonly used entry
//! points are [`ecs::registry::Registry`] for entity and component
//! lifecycle, [`ecs::archetype::Archetype`] for canonical type-set
//! descriptors, and [`ecs::query`] for predicate-driven table iteration.

// Allow the derive macro to resolve `::strata_ecs::...` paths from within
// this crate's own tests.
extern crate self as strata_ecs;

pub mod ecs;
