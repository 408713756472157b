//! Per-type leaf-field layout tables.
//!
//! A "leaf" is a field of a composite type that is itself a primitive; the
//! unit at which byte swapping is applied. `u32` has a single leaf `(0, 4)`;
//! a struct's leaves are its fields' leaves shifted by the field offsets,
//! nested structs flattening recursively.

use bytemuck::Pod;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

/// One primitive field inside a fixed-layout type: byte offset and size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Leaf {
    pub offset: usize,
    pub size: usize,
}

static LAYOUTS: OnceLock<Mutex<HashMap<TypeId, &'static [Leaf]>>> = OnceLock::new();

/// A `Pod` type with a known leaf-field layout.
///
/// Implemented for all fixed-size primitives and for `[T; N]`. For
/// `#[repr(C)]` structs, use [`impl_wire_value!`](crate::impl_wire_value)
/// to generate the impl from the field list.
pub trait WireValue: Pod + 'static {
    /// Appends this type's leaves, shifted by `base`, to `out`.
    fn collect(base: usize, out: &mut Vec<Leaf>);

    /// The flattened leaf table, computed on first use and cached per type.
    fn layout() -> &'static [Leaf] {
        let cache = LAYOUTS.get_or_init(|| Mutex::new(HashMap::new()));
        let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(leaves) = cache.get(&TypeId::of::<Self>()) {
            return leaves;
        }
        let mut leaves = Vec::new();
        Self::collect(0, &mut leaves);
        let leaves: &'static [Leaf] = Box::leak(leaves.into_boxed_slice());
        cache.insert(TypeId::of::<Self>(), leaves);
        leaves
    }

    /// Reverses the bytes of each leaf field of an encoded value in place.
    ///
    /// `bytes` must be exactly `size_of::<Self>()` long. Padding bytes are
    /// not touched.
    fn swap_in_place(bytes: &mut [u8]) {
        debug_assert_eq!(bytes.len(), core::mem::size_of::<Self>());
        for leaf in Self::layout() {
            bytes[leaf.offset..leaf.offset + leaf.size].reverse();
        }
    }
}

macro_rules! impl_primitive {
    ($($ty:ty),+ $(,)?) => {$(
        impl WireValue for $ty {
            #[inline]
            fn collect(base: usize, out: &mut Vec<Leaf>) {
                out.push(Leaf { offset: base, size: core::mem::size_of::<$ty>() });
            }
        }
    )+};
}

impl_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, f32, f64);

impl<T: WireValue, const N: usize> WireValue for [T; N] {
    fn collect(base: usize, out: &mut Vec<Leaf>) {
        for i in 0..N {
            T::collect(base + i * core::mem::size_of::<T>(), out);
        }
    }
}

/// Implements [`WireValue`] for a `#[repr(C)]` struct by flattening the
/// listed fields. Every field must itself be a `WireValue`; nested structs
/// recurse into their own leaves.
///
/// The field list must name every swappable field of the struct. Fields
/// left out keep their bytes as-is on a byte-order change, so the list
/// should be the full set.
#[macro_export]
macro_rules! impl_wire_value {
    ($ty:ty { $($field:ident : $fty:ty),+ $(,)? }) => {
        impl $crate::WireValue for $ty {
            fn collect(base: usize, out: &mut ::std::vec::Vec<$crate::Leaf>) {
                $(
                    <$fty as $crate::WireValue>::collect(
                        base + ::core::mem::offset_of!($ty, $field),
                        out,
                    );
                )+
            }
        }
    };
}
