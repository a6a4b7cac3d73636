//! Predicates and cached queries over the archetype lookup.
//!
//! A [`Predicate`] filters archetypes by three masks: every *required*
//! type must be present, at least one *included* type must be present
//! (vacuously true when no included types are named), and no *excluded*
//! type may be present. The empty predicate matches every archetype.
//!
//! A [`Query`] pairs a predicate with a registry's lookup and caches the
//! matching table groups. The cache is keyed on the lookup's revision:
//! as long as no new archetype was interned, repeat iterations reuse the
//! cached groups without rescanning the lookup.

use std::{fmt, sync::Arc};

use crate::ecs::{
    archetype::Archetype,
    bitset::TypeMask,
    component::{Component, Info, TypeList, type_of},
    lookup::ArchetypeLookup,
    storage::{SharedTable, Table, TableGroup},
};

/// An archetype filter over required / included / excluded type sets.
#[derive(Clone)]
pub struct Predicate {
    /// Every bit must be present in a matching archetype.
    required: TypeMask,

    /// At least one bit must be present, unless empty.
    included: TypeMask,

    /// No bit may be present.
    excluded: TypeMask,

    /// Canonical listings behind the three masks, kept for diagnostics.
    required_types: Vec<&'static Info>,
    included_types: Vec<&'static Info>,
    excluded_types: Vec<&'static Info>,
}

impl Predicate {
    /// Build a predicate from explicit type listings.
    pub fn new(
        required: &[&'static Info],
        included: &[&'static Info],
        excluded: &[&'static Info],
    ) -> Predicate {
        let canonicalise = |types: &[&'static Info]| {
            let mut types = types.to_vec();
            types.sort_by_key(|info| info.sort_key());
            types.dedup_by_key(|info| info.id());
            types
        };
        let required_types = canonicalise(required);
        let included_types = canonicalise(included);
        let excluded_types = canonicalise(excluded);
        Predicate {
            required: TypeMask::from_bits(required_types.iter().map(|i| i.id().index())),
            included: TypeMask::from_bits(included_types.iter().map(|i| i.id().index())),
            excluded: TypeMask::from_bits(excluded_types.iter().map(|i| i.id().index())),
            required_types,
            included_types,
            excluded_types,
        }
    }

    /// Build a predicate from type lists, e.g.
    /// `Predicate::of::<(Position, Velocity), (), Player>()`.
    pub fn of<R: TypeList, I: TypeList, X: TypeList>() -> Predicate {
        Predicate::new(&R::types(), &I::types(), &X::types())
    }

    /// The predicate that matches every archetype.
    pub fn universal() -> Predicate {
        Predicate::new(&[], &[], &[])
    }

    /// Start a fluent builder.
    pub fn builder() -> PredicateBuilder {
        PredicateBuilder::default()
    }

    /// Whether an archetype satisfies this predicate.
    pub fn matches(&self, archetype: &Archetype) -> bool {
        let mask = archetype.mask();
        mask.contains_all(&self.required)
            && (self.included.is_empty() || self.included.intersects(mask))
            && self.excluded.is_disjoint(mask)
    }

    /// The required mask.
    #[inline]
    pub fn required(&self) -> &TypeMask {
        &self.required
    }

    /// The included mask.
    #[inline]
    pub fn included(&self) -> &TypeMask {
        &self.included
    }

    /// The excluded mask.
    #[inline]
    pub fn excluded(&self) -> &TypeMask {
        &self.excluded
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |types: &[&'static Info]| {
            types.iter().map(|i| i.type_name()).collect::<Vec<_>>()
        };
        f.debug_struct("Predicate")
            .field("required", &names(&self.required_types))
            .field("included", &names(&self.included_types))
            .field("excluded", &names(&self.excluded_types))
            .finish()
    }
}

/// Fluent construction of a [`Predicate`].
#[derive(Default)]
pub struct PredicateBuilder {
    required: Vec<&'static Info>,
    included: Vec<&'static Info>,
    excluded: Vec<&'static Info>,
}

impl PredicateBuilder {
    /// Require component `C` to be present.
    pub fn require<C: Component>(mut self) -> Self {
        self.required.push(type_of::<C>());
        self
    }

    /// Ask for component `C` in the included (any-of) set.
    pub fn include<C: Component>(mut self) -> Self {
        self.included.push(type_of::<C>());
        self
    }

    /// Exclude archetypes carrying component `C`.
    pub fn exclude<C: Component>(mut self) -> Self {
        self.excluded.push(type_of::<C>());
        self
    }

    /// Finish the predicate.
    pub fn build(self) -> Predicate {
        Predicate::new(&self.required, &self.included, &self.excluded)
    }
}

/// A cached iterator over the tables whose archetype satisfies a
/// predicate.
///
/// The cache of matching groups is rebuilt by a linear scan of the lookup
/// whenever the lookup's revision moved since the last scan, and reused
/// unchanged otherwise.
pub struct Query {
    /// The lookup this query scans.
    lookup: Arc<ArchetypeLookup>,

    /// The archetype filter.
    predicate: Predicate,

    /// Matching groups as of `seen_revision`.
    cache: Vec<Arc<TableGroup>>,

    /// The lookup revision the cache was built against.
    seen_revision: Option<u64>,
}

impl Query {
    pub(crate) fn new(lookup: Arc<ArchetypeLookup>, predicate: Predicate) -> Query {
        Query {
            lookup,
            predicate,
            cache: Vec::new(),
            seen_revision: None,
        }
    }

    /// The predicate this query filters with.
    #[inline]
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Rebuild the group cache when the lookup moved underneath us.
    fn refresh(&mut self) {
        let revision = self.lookup.revision();
        if self.seen_revision == Some(revision) {
            return;
        }
        self.cache = self
            .lookup
            .groups()
            .into_iter()
            .filter(|group| self.predicate.matches(group.key()))
            .collect();
        self.seen_revision = Some(revision);
    }

    /// The matching groups, refreshed as needed.
    pub fn groups(&mut self) -> &[Arc<TableGroup>] {
        self.refresh();
        &self.cache
    }

    /// Every table of every matching group, as a point-in-time snapshot.
    pub fn tables(&mut self) -> Vec<SharedTable> {
        self.refresh();
        self.cache
            .iter()
            .flat_map(|group| group.snapshot().iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Visit every matching table under its read lock.
    pub fn for_each_table(&mut self, mut visit: impl FnMut(&Table)) {
        for table in self.tables() {
            visit(&table.read().unwrap());
        }
    }
}
