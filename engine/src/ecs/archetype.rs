//! Archetypes: canonical descriptors of component type sets.
//!
//! An [`Archetype`] is the identity every table and table group hangs off:
//! a sorted, duplicate-free listing of component types together with the
//! bit mask over their ids. Two archetypes are equal exactly when their
//! masks are equal. Archetypes are immutable once built; the `add`/`remove`
//! transitions produce new descriptors and leave the receiver untouched.
//!
//! The type listing is sorted by `(kind, id)`, which partitions it into
//! three contiguous runs: managed types, plain-data types, tags. The first
//! two runs are exactly the columns a table for this archetype allocates,
//! in order.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, LazyLock},
};

use crate::ecs::{
    bitset::TypeMask,
    component::{Info, Kind},
    entity::Entity,
};

/// The shared empty archetype.
static BASE: LazyLock<Archetype> = LazyLock::new(|| Archetype {
    types: Arc::from([]),
    mask: TypeMask::empty(),
    managed: 0,
    pod: 0,
    tag: 0,
    row_size: std::mem::size_of::<Entity>() as u32,
});

/// An immutable, canonical descriptor of a set of component types.
///
/// Cheap to clone: the type listing is shared and the mask is a handful of
/// words.
#[derive(Clone)]
pub struct Archetype {
    /// The member types, sorted by `(kind, id)`, without duplicates.
    types: Arc<[&'static Info]>,

    /// Bit `id` set exactly for the member type ids. Never stores a
    /// trailing zero word.
    mask: TypeMask,

    /// Number of managed types (the first partition of `types`).
    managed: usize,

    /// Number of plain-data types (the second partition).
    pod: usize,

    /// Number of tag types (the final partition).
    tag: usize,

    /// Bytes per table row: the entity handle plus every non-tag member.
    row_size: u32,
}

impl Archetype {
    /// The canonical empty archetype.
    #[inline]
    pub fn base() -> Archetype {
        BASE.clone()
    }

    /// Build the canonical archetype for a collection of component types.
    ///
    /// The input is copied, sorted by `(kind, id)` and deduplicated; order
    /// and multiplicity of the input do not matter. An empty collection
    /// yields the shared base archetype.
    pub fn new(types: impl IntoIterator<Item = &'static Info>) -> Archetype {
        let mut types: Vec<&'static Info> = types.into_iter().collect();
        types.sort_by_key(|info| info.sort_key());
        types.dedup_by_key(|info| info.id());

        if types.is_empty() {
            return Self::base();
        }

        let mask = TypeMask::from_bits(types.iter().map(|info| info.id().index()));
        let managed = types.iter().filter(|i| i.kind() == Kind::Managed).count();
        let pod = types.iter().filter(|i| i.kind() == Kind::Pod).count();
        let tag = types.len() - managed - pod;
        let row_size = std::mem::size_of::<Entity>() as u32
            + types.iter().map(|info| info.size_bytes()).sum::<u32>();

        Archetype {
            types: Arc::from(types),
            mask,
            managed,
            pod,
            tag,
            row_size,
        }
    }

    /// Produce the archetype with `info` added. Returns a clone of this
    /// archetype when the type is already a member.
    pub fn add(&self, info: &'static Info) -> Archetype {
        if self.contains(info) {
            return self.clone();
        }

        // Insert at the sorted position instead of re-canonicalising.
        let at = self
            .types
            .partition_point(|member| member.sort_key() < info.sort_key());
        let mut types = Vec::with_capacity(self.types.len() + 1);
        types.extend_from_slice(&self.types[..at]);
        types.push(info);
        types.extend_from_slice(&self.types[at..]);

        let (managed, pod, tag) = match info.kind() {
            Kind::Managed => (self.managed + 1, self.pod, self.tag),
            Kind::Pod => (self.managed, self.pod + 1, self.tag),
            Kind::Tag => (self.managed, self.pod, self.tag + 1),
        };

        Archetype {
            types: Arc::from(types),
            mask: self.mask.with_bit(info.id().index()),
            managed,
            pod,
            tag,
            row_size: self.row_size + info.size_bytes(),
        }
    }

    /// Produce the archetype with `info` removed. Returns a clone of this
    /// archetype when the type is not a member, and the base archetype when
    /// it was the only member.
    pub fn remove(&self, info: &'static Info) -> Archetype {
        if !self.contains(info) {
            return self.clone();
        }
        if self.types.len() == 1 {
            return Self::base();
        }

        let at = self
            .index_of(info)
            .expect("mask and type list out of sync");
        let mut types = Vec::with_capacity(self.types.len() - 1);
        types.extend_from_slice(&self.types[..at]);
        types.extend_from_slice(&self.types[at + 1..]);

        let (managed, pod, tag) = match info.kind() {
            Kind::Managed => (self.managed - 1, self.pod, self.tag),
            Kind::Pod => (self.managed, self.pod - 1, self.tag),
            Kind::Tag => (self.managed, self.pod, self.tag - 1),
        };

        Archetype {
            types: Arc::from(types),
            mask: self.mask.without_bit(info.id().index()),
            managed,
            pod,
            tag,
            row_size: self.row_size - info.size_bytes(),
        }
    }

    /// Whether `info` is a member, by mask test.
    #[inline]
    pub fn contains(&self, info: &'static Info) -> bool {
        self.mask.get(info.id().index())
    }

    /// Position of `info` in the type listing, or `None` when absent.
    ///
    /// Binary search restricted to the contiguous partition of `info`'s
    /// kind, so a present member of any kind is always located.
    pub fn index_of(&self, info: &'static Info) -> Option<usize> {
        let (start, end) = match info.kind() {
            Kind::Managed => (0, self.managed),
            Kind::Pod => (self.managed, self.managed + self.pod),
            Kind::Tag => (self.managed + self.pod, self.types.len()),
        };
        self.types[start..end]
            .binary_search_by_key(&info.id(), |member| member.id())
            .ok()
            .map(|offset| start + offset)
    }

    /// The member types, sorted by `(kind, id)`.
    #[inline]
    pub fn component_types(&self) -> &[&'static Info] {
        &self.types
    }

    /// The membership mask.
    #[inline]
    pub fn mask(&self) -> &TypeMask {
        &self.mask
    }

    /// Number of managed member types.
    #[inline]
    pub fn managed_count(&self) -> usize {
        self.managed
    }

    /// Number of plain-data member types.
    #[inline]
    pub fn pod_count(&self) -> usize {
        self.pod
    }

    /// Number of tag member types.
    #[inline]
    pub fn tag_count(&self) -> usize {
        self.tag
    }

    /// Number of columns a table for this archetype allocates (tags carry
    /// no column).
    #[inline]
    pub fn column_count(&self) -> usize {
        self.managed + self.pod
    }

    /// Bytes per table row, entity handle included.
    #[inline]
    pub fn row_size_bytes(&self) -> u32 {
        self.row_size
    }

    /// Number of member types.
    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether this is the empty archetype.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Archetypes with equal masks are equal.
impl PartialEq for Archetype {
    fn eq(&self, other: &Self) -> bool {
        self.mask == other.mask
    }
}

impl Eq for Archetype {}

impl Hash for Archetype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.mask.hash(state);
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.types.iter().map(|info| info.type_name()))
            .finish()
    }
}
