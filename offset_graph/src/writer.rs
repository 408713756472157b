//! Offset-resolution object writer.
//!
//! Offset fields are emitted as placeholders and queued as deferred
//! commands; [`flush`](ObjectWriter::flush) places each queued payload
//! past the end of the stream and patches the originating field with the
//! payload's position relative to the origin captured at emission.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use value_codec::{CodecError, StringFormat, ValueWriter};
use wire_layout::{Endianness, WireValue, align_up};

use crate::{OffsetError, OffsetFormat, OffsetHandler, SourceInfo, WireObject, WireObjectWith};

/// Value written into an offset field until the real offset is patched in.
pub const PLACEHOLDER_OFFSET: u32 = 0xDEAD_BABE;

/// Payload alignment used when a command requests alignment 0.
pub const DEFAULT_ALIGNMENT: u64 = 4;

/// Order in which queued offset commands are flushed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlushMode {
    /// Strict FIFO: payloads land in emission order, commands queued
    /// while flushing append to the back.
    #[default]
    Linear,
    /// Priority tiers, depth first: within each pending batch the lowest
    /// priority tier is placed first, and payloads queued by a tier are
    /// placed before the batch's remaining tiers.
    Recursive,
}

struct Command<S: Read + Write + Seek + 'static> {
    /// Position of the placeholder to patch.
    slot: u64,
    /// Origin captured when the command was emitted.
    origin: u64,
    /// Requested payload alignment; 0 selects the writer default.
    alignment: u64,
    priority: u32,
    /// Dedup key for shared objects; payloads with the same identity are
    /// placed once per flush.
    identity: Option<usize>,
    job: Box<dyn FnOnce(&mut ObjectWriter<S>) -> Result<(), OffsetError>>,
    info: Option<Box<dyn FnOnce(SourceInfo)>>,
}

/// Object graph writer over any `Read + Write + Seek` stream.
///
/// Derefs to [`ValueWriter`] for inline values; the `write_*_offset`
/// operations emit an offset field and defer the referenced payload
/// until the next flush. Dropping the writer flushes best-effort.
pub struct ObjectWriter<S: Read + Write + Seek + 'static> {
    codec: ValueWriter<S>,
    handler: OffsetHandler,
    format: OffsetFormat,
    mode: FlushMode,
    default_alignment: u64,
    queue: VecDeque<Command<S>>,
}

impl<S: Read + Write + Seek + 'static> ObjectWriter<S> {
    pub fn new(
        stream: S,
        endianness: Endianness,
        format: OffsetFormat,
    ) -> Result<Self, OffsetError> {
        Ok(Self::wrap(ValueWriter::new(stream, endianness)?, format))
    }

    pub fn with_block_size(
        stream: S,
        endianness: Endianness,
        format: OffsetFormat,
        block_size: usize,
    ) -> Result<Self, OffsetError> {
        Ok(Self::wrap(
            ValueWriter::with_block_size(stream, endianness, block_size)?,
            format,
        ))
    }

    fn wrap(codec: ValueWriter<S>, format: OffsetFormat) -> Self {
        ObjectWriter {
            codec,
            handler: OffsetHandler::new(),
            format,
            mode: FlushMode::default(),
            default_alignment: DEFAULT_ALIGNMENT,
            queue: VecDeque::new(),
        }
    }

    #[inline]
    pub fn offset_format(&self) -> OffsetFormat {
        self.format
    }

    pub fn set_flush_mode(&mut self, mode: FlushMode) {
        self.mode = mode;
    }

    pub fn set_default_alignment(&mut self, alignment: u64) {
        self.default_alignment = alignment.max(1);
    }

    pub fn handler(&self) -> &OffsetHandler {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut OffsetHandler {
        &mut self.handler
    }

    /// Pushes the current position as the new offset origin.
    pub fn push_origin(&mut self) {
        let position = self.codec.position();
        self.handler.push_origin(position);
    }

    pub fn push_origin_at(&mut self, origin: u64) {
        self.handler.push_origin(origin);
    }

    pub fn pop_origin(&mut self) -> Result<u64, OffsetError> {
        self.handler.pop_origin()
    }

    /// Writes the root object's inline fields at the current position.
    pub fn write_object<T: WireObject>(&mut self, object: &T) -> Result<(), OffsetError> {
        object.write(self)
    }

    pub fn write_object_with<T: WireObjectWith<C>, C>(
        &mut self,
        object: &T,
        context: &C,
    ) -> Result<(), OffsetError> {
        object.write_with(self, context)
    }

    /// Emits an offset field and defers `job` to write the payload it
    /// points at. The payload is aligned to `alignment` (0 selects the
    /// writer default) when placed.
    pub fn write_offset(
        &mut self,
        alignment: u64,
        priority: u32,
        job: impl FnOnce(&mut Self) -> Result<(), OffsetError> + 'static,
    ) -> Result<(), OffsetError> {
        self.defer(alignment, priority, None, Box::new(job), None)
    }

    /// Emits an offset field pointing at a single deferred value.
    pub fn write_value_offset<T: WireValue>(
        &mut self,
        value: T,
        alignment: u64,
    ) -> Result<(), OffsetError> {
        self.write_offset(alignment, 0, move |w| {
            w.write(value)?;
            Ok(())
        })
    }

    /// Emits an offset field pointing at a deferred contiguous array.
    pub fn write_array_offset<T: WireValue>(
        &mut self,
        values: &[T],
        alignment: u64,
    ) -> Result<(), OffsetError> {
        let values = values.to_vec();
        self.write_offset(alignment, 0, move |w| {
            w.write_array(&values)?;
            Ok(())
        })
    }

    /// Emits an offset field pointing at the deferred values of an
    /// iterator, written in order.
    pub fn write_collection_offset<T: WireValue, I: IntoIterator<Item = T>>(
        &mut self,
        values: I,
        alignment: u64,
    ) -> Result<(), OffsetError> {
        let values: Vec<T> = values.into_iter().collect();
        self.write_offset(alignment, 0, move |w| {
            w.write_array(&values)?;
            Ok(())
        })
    }

    /// Emits an offset field pointing at a deferred string.
    pub fn write_string_offset(
        &mut self,
        format: StringFormat,
        value: &str,
        alignment: u64,
    ) -> Result<(), OffsetError> {
        let value = value.to_owned();
        self.write_offset(alignment, 0, move |w| {
            w.write_string(format, &value)?;
            Ok(())
        })
    }

    /// Emits an offset field pointing at a deferred run of strings.
    pub fn write_string_array_offset<V: AsRef<str>>(
        &mut self,
        format: StringFormat,
        values: &[V],
        alignment: u64,
    ) -> Result<(), OffsetError> {
        let values: Vec<String> = values.iter().map(|v| v.as_ref().to_owned()).collect();
        self.write_offset(alignment, 0, move |w| {
            w.write_string_array(format, &values)?;
            Ok(())
        })
    }

    /// Emits an offset field referencing a shared object, or a null
    /// offset for `None`. Objects are deduplicated by identity: the same
    /// `Rc` referenced from several fields is placed once per flush, with
    /// every field patched to the single payload.
    pub fn write_object_offset<T: WireObject>(
        &mut self,
        object: Option<&Rc<RefCell<T>>>,
        alignment: u64,
        priority: u32,
    ) -> Result<(), OffsetError> {
        let Some(object) = object else {
            return self.write_null_offset();
        };
        let identity = Rc::as_ptr(object) as usize;
        let job = Rc::clone(object);
        let info = Rc::clone(object);
        self.defer(
            alignment,
            priority,
            Some(identity),
            Box::new(move |w| job.borrow().write(w)),
            Some(Box::new(move |source| {
                if let Some(slot) = info.borrow_mut().source_info_mut() {
                    *slot = source;
                }
            })),
        )
    }

    /// [`write_object_offset`](Self::write_object_offset) with encoding
    /// context passed through to the deferred payload.
    pub fn write_object_offset_with<T: WireObjectWith<C>, C: 'static>(
        &mut self,
        object: Option<&Rc<RefCell<T>>>,
        context: C,
        alignment: u64,
        priority: u32,
    ) -> Result<(), OffsetError> {
        let Some(object) = object else {
            return self.write_null_offset();
        };
        let identity = Rc::as_ptr(object) as usize;
        let job = Rc::clone(object);
        let info = Rc::clone(object);
        self.defer(
            alignment,
            priority,
            Some(identity),
            Box::new(move |w| job.borrow().write_with(w, &context)),
            Some(Box::new(move |source| {
                if let Some(slot) = info.borrow_mut().source_info_mut() {
                    *slot = source;
                }
            })),
        )
    }

    /// Writes an already-resolved offset field pointing at `target`.
    pub fn write_offset_to(&mut self, target: u64) -> Result<(), OffsetError> {
        let slot = self.codec.position();
        self.handler.register_slot(slot);
        let relative = self.handler.calculate_offset(target);
        self.write_resolved(relative)
    }

    /// Writes a null offset field.
    pub fn write_null_offset(&mut self) -> Result<(), OffsetError> {
        let slot = self.codec.position();
        self.handler.register_slot(slot);
        self.write_resolved(0)
    }

    /// Places all queued payloads and patches their offset fields, then
    /// flushes the underlying value writer. Idempotent.
    pub fn flush(&mut self) -> Result<(), OffsetError> {
        self.flush_offsets()?;
        self.codec.flush()?;
        Ok(())
    }

    /// Places queued payloads without flushing the underlying stream.
    pub fn flush_offsets(&mut self) -> Result<(), OffsetError> {
        let mut placed = HashMap::new();
        match self.mode {
            FlushMode::Linear => self.flush_linear(&mut placed),
            FlushMode::Recursive => self.flush_recursive(&mut placed),
        }
    }

    fn flush_linear(&mut self, placed: &mut HashMap<usize, u64>) -> Result<(), OffsetError> {
        while let Some(cmd) = self.queue.pop_front() {
            self.exec(cmd, placed)?;
        }
        Ok(())
    }

    fn flush_recursive(&mut self, placed: &mut HashMap<usize, u64>) -> Result<(), OffsetError> {
        let mut frames = vec![std::mem::take(&mut self.queue)];
        while !frames.is_empty() {
            let tier = {
                let Some(frame) = frames.last_mut() else { break };
                let Some(min) = frame.iter().map(|cmd| cmd.priority).min() else {
                    frames.pop();
                    continue;
                };
                let mut tier = VecDeque::new();
                let mut rest = VecDeque::new();
                for cmd in frame.drain(..) {
                    if cmd.priority == min {
                        tier.push_back(cmd);
                    } else {
                        rest.push_back(cmd);
                    }
                }
                *frame = rest;
                tier
            };
            let mut children = VecDeque::new();
            for cmd in tier {
                self.exec(cmd, placed)?;
                children.append(&mut self.queue);
            }
            if !children.is_empty() {
                frames.push(children);
            }
        }
        Ok(())
    }

    fn exec(
        &mut self,
        cmd: Command<S>,
        placed: &mut HashMap<usize, u64>,
    ) -> Result<(), OffsetError> {
        let target = match cmd.identity.and_then(|id| placed.get(&id).copied()) {
            Some(position) => position,
            None => {
                let alignment = if cmd.alignment == 0 {
                    self.default_alignment
                } else {
                    cmd.alignment
                };
                let end = self.codec.seek(SeekFrom::End(0))?;
                let position = align_up(end, alignment);
                self.codec.seek(SeekFrom::Start(position))?;
                if let Some(id) = cmd.identity {
                    placed.insert(id, position);
                }
                (cmd.job)(self)?;
                if let Some(info) = cmd.info {
                    let length = self.codec.position().saturating_sub(position);
                    info(SourceInfo {
                        position,
                        length,
                        endianness: self.codec.endianness(),
                    });
                }
                position
            }
        };
        let relative = target.wrapping_sub(cmd.origin);
        self.patch(cmd.slot, relative)?;
        Ok(())
    }

    fn defer(
        &mut self,
        alignment: u64,
        priority: u32,
        identity: Option<usize>,
        job: Box<dyn FnOnce(&mut Self) -> Result<(), OffsetError>>,
        info: Option<Box<dyn FnOnce(SourceInfo)>>,
    ) -> Result<(), OffsetError> {
        let slot = self.codec.position();
        self.handler.register_slot(slot);
        self.write_placeholder()?;
        let origin = self.handler.origin();
        self.queue.push_back(Command {
            slot,
            origin,
            alignment,
            priority,
            identity,
            job,
            info,
        });
        Ok(())
    }

    fn write_placeholder(&mut self) -> Result<(), CodecError> {
        match self.format {
            OffsetFormat::U32 => self.codec.write::<u32>(PLACEHOLDER_OFFSET),
            OffsetFormat::U64 => self.codec.write::<u64>(PLACEHOLDER_OFFSET as u64),
        }
    }

    fn write_resolved(&mut self, raw: u64) -> Result<(), OffsetError> {
        match self.format {
            OffsetFormat::U32 => self.codec.write::<u32>(raw as u32)?,
            OffsetFormat::U64 => self.codec.write::<u64>(raw)?,
        }
        Ok(())
    }

    fn patch(&mut self, slot: u64, relative: u64) -> Result<(), CodecError> {
        match self.format {
            OffsetFormat::U32 => self.codec.write_at(slot, |w| w.write::<u32>(relative as u32)),
            OffsetFormat::U64 => self.codec.write_at(slot, |w| w.write::<u64>(relative)),
        }
    }
}

impl<S: Read + Write + Seek + 'static> Deref for ObjectWriter<S> {
    type Target = ValueWriter<S>;

    fn deref(&self) -> &ValueWriter<S> {
        &self.codec
    }
}

impl<S: Read + Write + Seek + 'static> DerefMut for ObjectWriter<S> {
    fn deref_mut(&mut self) -> &mut ValueWriter<S> {
        &mut self.codec
    }
}

impl<S: Read + Write + Seek + 'static> Drop for ObjectWriter<S> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
