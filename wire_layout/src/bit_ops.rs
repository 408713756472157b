//! Bit-range pack/unpack within a single primitive.
//!
//! Bits are addressed least-significant-bit-first; ranges are inclusive on
//! both ends. Multi-byte bit fields spanning primitives are out of scope
//! here; streams handle individual bits through their own bit cursors.

/// Extraction and insertion of an inclusive bit range `from..=to`.
pub trait BitPack: Copy {
    /// Returns bits `from..=to` of `self`, shifted down to bit 0.
    fn unpack(self, from: u32, to: u32) -> Self;

    /// Writes `value` into bits `from..=to` of `self`, leaving the other
    /// bits unchanged. `value` is masked to the range width.
    fn pack(&mut self, value: Self, from: u32, to: u32);
}

macro_rules! impl_bit_pack {
    ($($ty:ty),+ $(,)?) => {$(
        impl BitPack for $ty {
            #[inline]
            fn unpack(self, from: u32, to: u32) -> Self {
                debug_assert!(from <= to && to < <$ty>::BITS);
                let width = to - from + 1;
                let mask = <$ty>::MAX >> (<$ty>::BITS - width);
                (self >> from) & mask
            }

            #[inline]
            fn pack(&mut self, value: Self, from: u32, to: u32) {
                debug_assert!(from <= to && to < <$ty>::BITS);
                let width = to - from + 1;
                let mask = <$ty>::MAX >> (<$ty>::BITS - width);
                *self = (*self & !(mask << from)) | ((value & mask) << from);
            }
        }
    )+};
}

impl_bit_pack!(u8, u16, u32, u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_extracts_range() {
        let v: u8 = 0b1101_0110;
        assert_eq!(v.unpack(1, 3), 0b011);
        assert_eq!(v.unpack(4, 7), 0b1101);
        assert_eq!(v.unpack(0, 7), v);
    }

    #[test]
    fn pack_preserves_other_bits() {
        let mut v: u16 = 0xFFFF;
        v.pack(0b0000, 4, 7);
        assert_eq!(v, 0xFF0F);
        v.pack(0b1010, 4, 7);
        assert_eq!(v, 0xFFAF);
    }

    #[test]
    fn pack_masks_oversized_value() {
        let mut v: u32 = 0;
        v.pack(0xFF, 0, 3);
        assert_eq!(v, 0x0F);
    }

    #[test]
    fn full_width_round_trip() {
        let mut v: u64 = 0;
        v.pack(0xDEAD_BEEF_DEAD_BEEF, 0, 63);
        assert_eq!(v.unpack(0, 63), 0xDEAD_BEEF_DEAD_BEEF);
    }
}
