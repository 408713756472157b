//! Traits for types that serialize themselves through the object
//! reader/writer pair.

use std::io::{Read, Seek, Write};

use wire_layout::Endianness;

use crate::{ObjectReader, ObjectWriter, OffsetError};

/// Where an object's payload landed in the stream.
///
/// Filled in by the writer after the deferred payload is placed, and by
/// the reader after the payload is decoded, for types that expose a slot
/// via [`WireObject::source_info_mut`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceInfo {
    /// Absolute position of the payload.
    pub position: u64,
    /// Encoded length in bytes.
    pub length: u64,
    /// Byte order the payload was encoded with.
    pub endianness: Endianness,
}

/// A type that reads and writes itself as a node in an offset graph.
///
/// Implementations describe the node's inline fields in order; references
/// to other nodes go through the writer's `write_*_offset` operations and
/// the reader's `read_*_offset` counterparts.
pub trait WireObject: 'static {
    fn read<S: Read + Seek>(reader: &mut ObjectReader<S>) -> Result<Self, OffsetError>
    where
        Self: Sized;

    fn write<S: Read + Write + Seek + 'static>(
        &self,
        writer: &mut ObjectWriter<S>,
    ) -> Result<(), OffsetError>;

    /// Slot to record placement in, if the type keeps one.
    fn source_info_mut(&mut self) -> Option<&mut SourceInfo> {
        None
    }
}

/// Like [`WireObject`], for types whose encoding depends on external
/// context such as a format version or a shared string table.
pub trait WireObjectWith<C>: 'static {
    fn read_with<S: Read + Seek>(
        reader: &mut ObjectReader<S>,
        context: &C,
    ) -> Result<Self, OffsetError>
    where
        Self: Sized;

    fn write_with<S: Read + Write + Seek + 'static>(
        &self,
        writer: &mut ObjectWriter<S>,
        context: &C,
    ) -> Result<(), OffsetError>;

    fn source_info_mut(&mut self) -> Option<&mut SourceInfo> {
        None
    }
}
