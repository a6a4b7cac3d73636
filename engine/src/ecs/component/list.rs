//! Conversion of type-level component lists into runtime type listings.

use crate::{
    ecs::component::{Component, Info, type_of},
    tuple_impls,
};

/// Trait for converting a type into a listing of component type infos.
///
/// Implemented for `()`, for every [`Component`] type and for tuples of
/// other `TypeList` types up to 26 elements, so call sites can name an
/// archetype's contents as `(Position, Velocity, Player)`.
pub trait TypeList<Marker = ()> {
    /// Resolve the listing, registering each component type on first use.
    fn types() -> Vec<&'static Info>;
}

/// [`TypeList`] implementation for the empty tuple.
impl TypeList for () {
    fn types() -> Vec<&'static Info> {
        Vec::new()
    }
}

/// [`TypeList`] implementation for single component types.
impl<C: Component> TypeList for C {
    fn types() -> Vec<&'static Info> {
        vec![type_of::<C>()]
    }
}

/// [`TypeList`] implementation for tuples of other [`TypeList`] types.
macro_rules! tuple_list {
    ($($name: ident),*) => {
        impl<$($name: TypeList),*> TypeList for ($($name,)*) {
            fn types() -> Vec<&'static Info> {
                let mut types = Vec::new();
                $(
                    types.extend(<$name>::types());
                )*
                types
            }
        }
    }
}

// Implement the tuple -> listing conversion for all tuples up to 26 elements.
tuple_impls!(tuple_list: A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, T, U, V, W, X, Y, Z);

#[cfg(test)]
mod tests {
    use strata_macros::Component;

    use super::*;

    #[derive(Component, Default)]
    struct First(#[allow(dead_code)] u32);

    #[derive(Component, Default)]
    struct Second(#[allow(dead_code)] u32);

    #[test]
    fn empty_list() {
        // Then
        assert!(<() as TypeList>::types().is_empty());
    }

    #[test]
    fn single_component_list() {
        // When
        let types = <First as TypeList>::types();

        // Then
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].id(), type_of::<First>().id());
    }

    #[test]
    fn tuple_list_concatenates() {
        // When
        let types = <(First, Second) as TypeList>::types();

        // Then - listed in declaration order, canonicalisation happens later
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].id(), type_of::<First>().id());
        assert_eq!(types[1].id(), type_of::<Second>().id());
    }
}
