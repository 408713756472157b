//! Offset-resolution serialization for object graphs.
//!
//! A graph node writes its inline fields immediately; anything it
//! references goes through an offset field. The writer emits a
//! placeholder for each offset field and queues the referenced payload;
//! flushing places queued payloads past the end of the stream, patches
//! each field with the payload's position relative to its origin, and
//! deduplicates payloads referenced from more than one field. The reader
//! mirrors this: offset fields resolve through an origin stack, and
//! object payloads decode through a position-keyed cache so shared and
//! cyclic references come back as shared handles.
//!
//! ```
//! use std::io::{Seek, SeekFrom};
//!
//! use offset_graph::{ObjectReader, ObjectWriter, OffsetFormat};
//! use wire_layout::Endianness;
//!
//! let file = tempfile::tempfile()?;
//! let mut writer =
//!     ObjectWriter::new(file.try_clone()?, Endianness::Little, OffsetFormat::U32)?;
//! writer.write_value_offset::<u32>(0xCAFE, 0)?;
//! writer.flush()?;
//! drop(writer);
//!
//! let mut file = file;
//! file.seek(SeekFrom::Start(0))?;
//! let mut reader = ObjectReader::new(file, Endianness::Little, OffsetFormat::U32)?;
//! assert_eq!(reader.read_value_offset::<u32>()?, Some(0xCAFE));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod handler;
pub mod object;
pub mod reader;
pub mod writer;

pub use error::OffsetError;
pub use handler::{OffsetFormat, OffsetHandler, ZeroHandling};
pub use object::{SourceInfo, WireObject, WireObjectWith};
pub use reader::ObjectReader;
pub use writer::{DEFAULT_ALIGNMENT, FlushMode, ObjectWriter, PLACEHOLDER_OFFSET};
