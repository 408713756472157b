//! # wire_layout
//!
//! Byte-order primitives for fixed-layout binary data.
//!
//! The central piece is the [`WireValue`] trait: a flattened table of the
//! leaf primitive fields of a `Pod` type, computed on first use and cached
//! per type. The table is what lets a codec byte-swap an arbitrary
//! `#[repr(C)]` struct in place, reversing each leaf field individually
//! while leaving inter-field padding untouched.
//!
//! ```rust
//! use wire_layout::{impl_wire_value, WireValue};
//! use bytemuck_derive::{Pod, Zeroable};
//!
//! #[repr(C)]
//! #[derive(Clone, Copy, Pod, Zeroable)]
//! struct Header {
//!     magic: u32,
//!     version: u16,
//!     flags: u16,
//! }
//! impl_wire_value!(Header { magic: u32, version: u16, flags: u16 });
//!
//! let mut bytes = [0x12, 0x34, 0x56, 0x78, 0xAA, 0xBB, 0xCC, 0xDD];
//! Header::swap_in_place(&mut bytes);
//! // each field reversed on its own, not the struct as a whole
//! assert_eq!(bytes, [0x78, 0x56, 0x34, 0x12, 0xBB, 0xAA, 0xDD, 0xCC]);
//! ```

pub mod align;
pub mod bit_ops;
pub mod endian;
pub mod layout;

pub use align::align_up;
pub use bit_ops::BitPack;
pub use endian::Endianness;
pub use layout::{Leaf, WireValue};
