//! Offset-resolution object reader.
//!
//! Offset fields resolve against the handler's origin stack; payloads
//! are decoded at the resolved position with the read cursor restored
//! afterwards. Object payloads are cached by position so shared
//! references decode to a shared `Rc`, and each cache entry is
//! registered before its payload is decoded so cyclic graphs terminate.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use value_codec::{StringFormat, ValueReader};
use wire_layout::{Endianness, WireValue};

use crate::{OffsetError, OffsetFormat, OffsetHandler, SourceInfo, WireObject, WireObjectWith};

/// Object graph reader over any `Read + Seek` stream.
///
/// Derefs to [`ValueReader`] for inline values.
pub struct ObjectReader<S: Read + Seek> {
    codec: ValueReader<S>,
    handler: OffsetHandler,
    format: OffsetFormat,
    cache: HashMap<u64, Rc<dyn Any>>,
}

impl<S: Read + Seek> ObjectReader<S> {
    pub fn new(
        stream: S,
        endianness: Endianness,
        format: OffsetFormat,
    ) -> Result<Self, OffsetError> {
        Ok(Self::wrap(ValueReader::new(stream, endianness)?, format))
    }

    pub fn with_block_size(
        stream: S,
        endianness: Endianness,
        format: OffsetFormat,
        block_size: usize,
    ) -> Result<Self, OffsetError> {
        Ok(Self::wrap(
            ValueReader::with_block_size(stream, endianness, block_size)?,
            format,
        ))
    }

    fn wrap(codec: ValueReader<S>, format: OffsetFormat) -> Self {
        ObjectReader {
            codec,
            handler: OffsetHandler::new(),
            format,
            cache: HashMap::new(),
        }
    }

    #[inline]
    pub fn offset_format(&self) -> OffsetFormat {
        self.format
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

    /// Decodes the root object's inline fields at the current position.
    pub fn read_object<T: WireObject>(&mut self) -> Result<T, OffsetError> {
        T::read(self)
    }

    pub fn read_object_with<T: WireObjectWith<C>, C>(
        &mut self,
        context: &C,
    ) -> Result<T, OffsetError> {
        T::read_with(self, context)
    }

    /// Reads one offset field and resolves it to an absolute position.
    /// The field position is registered as a slot. Null, overflowing, and
    /// out-of-bounds offsets resolve to `None`.
    pub fn read_offset(&mut self) -> Result<Option<u64>, OffsetError> {
        let slot = self.codec.position();
        self.handler.register_slot(slot);
        let raw = match self.format {
            OffsetFormat::U32 => self.codec.read::<u32>()? as u64,
            OffsetFormat::U64 => self.codec.read::<u64>()?,
        };
        Ok(self.handler.resolve(raw, self.codec.length()))
    }

    /// Reads an offset field and runs `action` at the resolved position,
    /// restoring the cursor afterwards. Null offsets skip the action.
    pub fn read_at_offset<R>(
        &mut self,
        action: impl FnOnce(&mut Self) -> Result<R, OffsetError>,
    ) -> Result<Option<R>, OffsetError> {
        let Some(target) = self.read_offset()? else {
            return Ok(None);
        };
        let prev = self.codec.position();
        self.codec.seek(SeekFrom::Start(target))?;
        let result = action(self);
        let restore = self.codec.seek(SeekFrom::Start(prev));
        let value = result?;
        restore?;
        Ok(Some(value))
    }

    /// Follows an offset field to a single value.
    pub fn read_value_offset<T: WireValue>(&mut self) -> Result<Option<T>, OffsetError> {
        self.read_at_offset(|r| Ok(r.codec.read::<T>()?))
    }

    /// Follows an offset field to a contiguous array.
    pub fn read_array_offset<T: WireValue>(
        &mut self,
        count: usize,
    ) -> Result<Option<Vec<T>>, OffsetError> {
        self.read_at_offset(|r| Ok(r.codec.read_array::<T>(count)?))
    }

    /// Follows an offset field to a string.
    pub fn read_string_offset(
        &mut self,
        format: StringFormat,
    ) -> Result<Option<String>, OffsetError> {
        self.read_at_offset(|r| Ok(r.codec.read_string(format)?))
    }

    /// Follows an offset field to a run of strings.
    pub fn read_string_array_offset(
        &mut self,
        format: StringFormat,
        count: usize,
    ) -> Result<Option<Vec<String>>, OffsetError> {
        self.read_at_offset(|r| Ok(r.codec.read_string_array(format, count)?))
    }

    /// Follows an offset field to an object payload.
    ///
    /// Payloads are cached by resolved position: a position already
    /// decoded (or currently being decoded, for cycles) returns the
    /// cached `Rc` instead of decoding again. The cache entry is
    /// registered before the payload is decoded, so a cycle reaching
    /// back to an in-progress object observes the shared handle and the
    /// decode terminates; the handle's content is completed when the
    /// outer decode finishes.
    pub fn read_object_offset<T: WireObject + Default>(
        &mut self,
    ) -> Result<Option<Rc<RefCell<T>>>, OffsetError> {
        let Some(target) = self.read_offset()? else {
            return Ok(None);
        };
        self.read_object_at(target, T::read, T::source_info_mut)
            .map(Some)
    }

    /// [`read_object_offset`](Self::read_object_offset) with decoding
    /// context passed through to the payload.
    pub fn read_object_offset_with<T, C>(
        &mut self,
        context: &C,
    ) -> Result<Option<Rc<RefCell<T>>>, OffsetError>
    where
        T: WireObjectWith<C> + Default,
    {
        let Some(target) = self.read_offset()? else {
            return Ok(None);
        };
        self.read_object_at(
            target,
            |r| T::read_with(r, context),
            <T as WireObjectWith<C>>::source_info_mut,
        )
        .map(Some)
    }

    fn read_object_at<T: Default + 'static>(
        &mut self,
        target: u64,
        read: impl FnOnce(&mut Self) -> Result<T, OffsetError>,
        info: impl FnOnce(&mut T) -> Option<&mut SourceInfo>,
    ) -> Result<Rc<RefCell<T>>, OffsetError> {
        if let Some(cached) = self.cache.get(&target) {
            return Rc::clone(cached)
                .downcast::<RefCell<T>>()
                .map_err(|_| OffsetError::IdentityTypeMismatch { position: target });
        }
        let object: Rc<RefCell<T>> = Rc::new(RefCell::new(T::default()));
        self.cache.insert(target, Rc::clone(&object) as Rc<dyn Any>);

        let prev = self.codec.position();
        if let Err(err) = self.codec.seek(SeekFrom::Start(target)) {
            self.cache.remove(&target);
            return Err(err.into());
        }
        let result = read(self);
        let end = self.codec.position();
        let restore = self.codec.seek(SeekFrom::Start(prev));
        let mut value = match result {
            Ok(value) => value,
            Err(err) => {
                self.cache.remove(&target);
                return Err(err);
            }
        };
        if let Err(err) = restore {
            self.cache.remove(&target);
            return Err(err.into());
        }
        if let Some(slot) = info(&mut value) {
            *slot = SourceInfo {
                position: target,
                length: end.saturating_sub(target),
                endianness: self.codec.endianness(),
            };
        }
        *object.borrow_mut() = value;
        Ok(object)
    }
}

impl<S: Read + Seek> Deref for ObjectReader<S> {
    type Target = ValueReader<S>;

    fn deref(&self) -> &ValueReader<S> {
        &self.codec
    }
}

impl<S: Read + Seek> DerefMut for ObjectReader<S> {
    fn deref_mut(&mut self) -> &mut ValueReader<S> {
        &mut self.codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>) -> ObjectReader<Cursor<Vec<u8>>> {
        ObjectReader::new(Cursor::new(bytes), Endianness::Little, OffsetFormat::U32)
            .expect("reader")
    }

    #[derive(Default, Debug, PartialEq)]
    struct Leaf {
        value: u32,
    }

    impl WireObject for Leaf {
        fn read<S: Read + Seek>(r: &mut ObjectReader<S>) -> Result<Self, OffsetError> {
            Ok(Leaf { value: r.read::<u32>()? })
        }

        fn write<S: Read + std::io::Write + Seek + 'static>(
            &self,
            w: &mut crate::ObjectWriter<S>,
        ) -> Result<(), OffsetError> {
            w.write(self.value)?;
            Ok(())
        }
    }

    #[derive(Default, Debug, PartialEq)]
    struct Tagged {
        tag: u32,
        info: SourceInfo,
    }

    impl WireObject for Tagged {
        fn read<S: Read + Seek>(r: &mut ObjectReader<S>) -> Result<Self, OffsetError> {
            Ok(Tagged { tag: r.read::<u32>()?, info: SourceInfo::default() })
        }

        fn write<S: Read + std::io::Write + Seek + 'static>(
            &self,
            w: &mut crate::ObjectWriter<S>,
        ) -> Result<(), OffsetError> {
            w.write(self.tag)?;
            Ok(())
        }

        fn source_info_mut(&mut self) -> Option<&mut SourceInfo> {
            Some(&mut self.info)
        }
    }

    #[test]
    fn value_offset_follows_and_restores() {
        let mut bytes = vec![8, 0, 0, 0, 0xAA, 0xAA, 0xAA, 0xAA];
        bytes.extend_from_slice(&0xCAFEu32.to_le_bytes());
        let mut r = reader(bytes);
        assert_eq!(r.read_value_offset::<u32>().unwrap(), Some(0xCAFE));
        assert_eq!(r.position(), 4);
        assert!(r.handler().is_registered(0));
    }

    #[test]
    fn zero_offset_is_null() {
        let mut r = reader(vec![0, 0, 0, 0]);
        assert_eq!(r.read_value_offset::<u32>().unwrap(), None);
        assert_eq!(r.read_offset().unwrap_err().to_string(), {
            // second read runs off the end of the stream
            value_codec::CodecError::UnexpectedEof.to_string()
        });
    }

    #[test]
    fn string_offset() {
        let bytes = vec![4, 0, 0, 0, b'H', b'I', 0];
        let mut r = reader(bytes);
        assert_eq!(
            r.read_string_offset(StringFormat::NullTerminated).unwrap(),
            Some("HI".to_owned())
        );
    }

    #[test]
    fn array_offset() {
        let mut bytes = vec![8, 0, 0, 0, 0, 0, 0, 0];
        for v in [1u16, 2, 3] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let mut r = reader(bytes);
        assert_eq!(
            r.read_array_offset::<u16>(3).unwrap(),
            Some(vec![1, 2, 3])
        );
    }

    #[test]
    fn shared_target_decodes_to_shared_rc() {
        let mut bytes = vec![12, 0, 0, 0, 12, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(&42u32.to_le_bytes());
        let mut r = reader(bytes);
        let first = r.read_object_offset::<Leaf>().unwrap().expect("first");
        let second = r.read_object_offset::<Leaf>().unwrap().expect("second");
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.borrow().value, 42);
        assert_eq!(r.read_object_offset::<Leaf>().unwrap(), None);
    }

    #[test]
    fn cached_type_mismatch_is_reported() {
        let mut bytes = vec![12, 0, 0, 0, 12, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(&42u32.to_le_bytes());
        let mut r = reader(bytes);
        r.read_object_offset::<Leaf>().unwrap();
        assert!(matches!(
            r.read_object_offset::<Tagged>(),
            Err(OffsetError::IdentityTypeMismatch { position: 12 })
        ));
    }

    #[test]
    fn source_info_records_payload_span() {
        let mut bytes = vec![8, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(&7u32.to_le_bytes());
        let mut r = reader(bytes);
        let tagged = r.read_object_offset::<Tagged>().unwrap().expect("object");
        assert_eq!(
            tagged.borrow().info,
            SourceInfo {
                position: 8,
                length: 4,
                endianness: Endianness::Little,
            }
        );
    }

    #[test]
    fn out_of_bounds_offset_resolves_to_none() {
        let mut r = reader(vec![16, 0, 0, 0]);
        assert_eq!(r.read_object_offset::<Leaf>().unwrap(), None);
    }

    #[test]
    fn failed_decode_is_not_cached() {
        // in-bounds offset, but the payload is truncated
        let mut r = reader(vec![4, 0, 0, 0, 0xAA]);
        assert!(r.read_object_offset::<Leaf>().is_err());
        // a later read of the same position must retry, not return a
        // half-initialized cache entry
        let mut bytes = vec![8, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(&9u32.to_le_bytes());
        let mut r = reader(bytes);
        assert!(r.read_object_offset::<Leaf>().unwrap().is_some());
    }

    #[test]
    fn origin_applies_to_resolution() {
        // header, then an offset relative to origin 4
        let mut bytes = vec![0xFF, 0xFF, 0xFF, 0xFF, 4, 0, 0, 0];
        bytes.extend_from_slice(&0xBEEFu32.to_le_bytes());
        let mut r = reader(bytes);
        r.skip(4).unwrap();
        r.push_origin();
        assert_eq!(r.read_value_offset::<u32>().unwrap(), Some(0xBEEF));
        r.pop_origin().unwrap();
        assert!(matches!(
            r.pop_origin(),
            Err(OffsetError::OriginStackEmpty)
        ));
    }
}
