//! # value_codec
//!
//! Endianness-aware typed reading and writing over a seekable byte stream.
//!
//! [`ValueReader`] and [`ValueWriter`] move primitives, fixed-layout `Pod`
//! structs, arrays, strings, and individual bits between memory and any
//! `std::io` stream. Byte order is a per-instance setting applied to each
//! leaf primitive field through the [`wire_layout`] tables, so a
//! `#[repr(C)]` struct swaps field by field rather than as one byte blob.
//!
//! ```rust
//! use std::io::Cursor;
//! use value_codec::{ValueReader, ValueWriter};
//! use wire_layout::Endianness;
//!
//! let mut stream = Cursor::new(Vec::new());
//! {
//!     let mut writer = ValueWriter::new(&mut stream, Endianness::Big).unwrap();
//!     writer.write::<u32>(0xDEADBEEF).unwrap();
//!     writer.flush().unwrap();
//! }
//! assert_eq!(stream.get_ref().as_slice(), &[0xDE, 0xAD, 0xBE, 0xEF]);
//!
//! stream.set_position(0);
//! let mut reader = ValueReader::new(&mut stream, Endianness::Big).unwrap();
//! assert_eq!(reader.read::<u32>().unwrap(), 0xDEADBEEF);
//! ```
//!
//! ## Stream ownership
//!
//! Constructing over `S` by value transfers the stream to the codec; it is
//! released when the codec is dropped. Constructing over `&mut S` leaves
//! the stream with the caller. Both go through the same generic parameter.
//!
//! ## Buffering
//!
//! Both sides keep an internal block buffer ([`DEFAULT_BLOCK_SIZE`] bytes)
//! amortizing small operations; a block size of 0 disables it. Decoded
//! results are identical at every block size, including when a single
//! value's bytes straddle a refill boundary.

pub mod error;
pub mod reader;
pub mod string_format;
pub mod writer;

pub use error::CodecError;
pub use reader::ValueReader;
pub use string_format::StringFormat;
pub use writer::ValueWriter;

/// Block size used by [`ValueReader::new`] and [`ValueWriter::new`].
pub const DEFAULT_BLOCK_SIZE: usize = 4096;
