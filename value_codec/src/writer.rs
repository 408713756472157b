//! Typed, buffered writing over a seekable stream.

use std::io::{self, Read, Seek, SeekFrom, Write};

use wire_layout::{Endianness, WireValue, align_up};

use crate::{CodecError, DEFAULT_BLOCK_SIZE, StringFormat};

/// Endianness-aware value writer over any `Read + Write + Seek` stream.
///
/// `Read` is required because bit-level writes are read-modify-write:
/// bits not explicitly set keep whatever the underlying byte held. The
/// writer keeps a write-behind run of contiguous bytes; any seek or
/// non-contiguous write flushes it. Dropping the writer flushes pending
/// state, ignoring I/O errors; call [`flush`](Self::flush) for the
/// error-visible path.
pub struct ValueWriter<S: Read + Write + Seek> {
    stream: S,
    endianness: Endianness,
    /// Logical write position.
    pos: u64,
    /// High-water mark: known stream length including pending bytes.
    len: u64,
    /// Physical position of the underlying stream.
    stream_pos: u64,
    /// Pending contiguous bytes starting at `run_start`.
    run: Vec<u8>,
    run_start: u64,
    block_size: usize,
    working: u8,
    bit_pos: u64,
    bit_cursor: u8,
    bit_active: bool,
    bit_dirty: bool,
}

impl<S: Read + Write + Seek> ValueWriter<S> {
    /// Creates a writer with the default block size.
    pub fn new(stream: S, endianness: Endianness) -> Result<Self, CodecError> {
        Self::with_block_size(stream, endianness, DEFAULT_BLOCK_SIZE)
    }

    /// Creates a writer with an explicit block size; 0 disables buffering.
    pub fn with_block_size(
        mut stream: S,
        endianness: Endianness,
        block_size: usize,
    ) -> Result<Self, CodecError> {
        let pos = stream.stream_position()?;
        let len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(pos))?;
        Ok(ValueWriter {
            stream,
            endianness,
            pos,
            len,
            stream_pos: pos,
            run: Vec::new(),
            run_start: 0,
            block_size,
            working: 0,
            bit_pos: 0,
            bit_cursor: 0,
            bit_active: false,
            bit_dirty: false,
        })
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Stream length including bytes still pending in the buffer.
    #[inline]
    pub fn length(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    /// Repositions the writer, committing any partial bit state first.
    pub fn seek(&mut self, target: SeekFrom) -> Result<u64, CodecError> {
        self.flush_bits()?;
        let pos = match target {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
            SeekFrom::End(d) => self.len.checked_add_signed(d),
        };
        self.pos = pos.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
        })?;
        Ok(self.pos)
    }

    pub fn skip(&mut self, offset: i64) -> Result<u64, CodecError> {
        self.seek(SeekFrom::Current(offset))
    }

    /// Advances the position to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: u64) -> Result<u64, CodecError> {
        let aligned = align_up(self.pos, alignment);
        self.seek(SeekFrom::Start(aligned))
    }

    /// Runs `action` with the writer positioned at `pos`, restoring the
    /// previous position afterwards whether or not the action succeeds.
    pub fn write_at<R>(
        &mut self,
        pos: u64,
        action: impl FnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        let prev = self.pos;
        self.seek(SeekFrom::Start(pos))?;
        let result = action(self);
        let commit = self.flush_bits();
        self.pos = prev;
        let value = result?;
        commit?;
        Ok(value)
    }

    /// Writes raw bytes at the current position.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.flush_bits()?;
        self.raw_write(bytes)
    }

    /// Writes one value, swapping leaf fields if the configured byte order
    /// differs from the host.
    pub fn write<T: WireValue>(&mut self, value: T) -> Result<(), CodecError> {
        let mut tmp = value;
        let bytes = bytemuck::bytes_of_mut(&mut tmp);
        if !self.endianness.is_native() {
            T::swap_in_place(bytes);
        }
        self.flush_bits()?;
        self.raw_write(bytes)
    }

    /// Writes a contiguous slice of values. Byte-for-byte equivalent to
    /// one [`write`](Self::write) call per element.
    pub fn write_array<T: WireValue>(&mut self, values: &[T]) -> Result<(), CodecError> {
        let size = core::mem::size_of::<T>();
        if values.is_empty() || size == 0 {
            return Ok(());
        }
        if self.endianness.is_native() {
            self.write_bytes(bytemuck::cast_slice(values))
        } else {
            let mut bytes = bytemuck::cast_slice(values).to_vec();
            for chunk in bytes.chunks_exact_mut(size) {
                T::swap_in_place(chunk);
            }
            self.write_bytes(&bytes)
        }
    }

    /// Writes every value produced by the iterator, in order.
    pub fn write_collection<T: WireValue, I: IntoIterator<Item = T>>(
        &mut self,
        values: I,
    ) -> Result<(), CodecError> {
        for value in values {
            self.write(value)?;
        }
        Ok(())
    }

    /// Writes the next bit at the bit cursor. The working byte is acquired
    /// by read-modify-write, so bits not explicitly set keep the prior
    /// content of the underlying byte.
    pub fn write_bit(&mut self, value: bool) -> Result<(), CodecError> {
        self.acquire_working()?;
        let mask = 1u8 << self.bit_cursor;
        if value {
            self.working |= mask;
        } else {
            self.working &= !mask;
        }
        self.bit_dirty = true;
        self.bit_cursor += 1;
        if self.bit_cursor == 8 {
            self.flush_bits()?;
        }
        Ok(())
    }

    /// Sets bit `index` of the working byte without moving the bit cursor.
    pub fn write_bit_at(&mut self, index: u8, value: bool) -> Result<(), CodecError> {
        if index > 7 {
            return Err(CodecError::BitIndexOutOfRange(index));
        }
        self.acquire_working()?;
        let mask = 1u8 << index;
        if value {
            self.working |= mask;
        } else {
            self.working &= !mask;
        }
        self.bit_dirty = true;
        Ok(())
    }

    /// Commits a partially written working byte and resets the bit cursor.
    /// No-op when no bit write is pending.
    pub fn flush_bits(&mut self) -> Result<(), CodecError> {
        if self.bit_active {
            self.bit_active = false;
            self.bit_cursor = 0;
            if self.bit_dirty {
                self.bit_dirty = false;
                let byte = [self.working];
                let pos = self.bit_pos;
                self.raw_write_at(pos, &byte)?;
            }
        }
        Ok(())
    }

    /// Encodes a string in the given wire format.
    pub fn write_string(&mut self, format: StringFormat, value: &str) -> Result<(), CodecError> {
        let bytes = value.as_bytes();
        match format {
            StringFormat::NullTerminated => {
                self.write_bytes(bytes)?;
                self.write::<u8>(0)
            }
            StringFormat::NullTerminatedCapped(cap) => {
                if bytes.len() + 1 > cap {
                    return Err(CodecError::StringTooLong {
                        len: bytes.len() + 1,
                        capacity: cap,
                    });
                }
                self.write_bytes(bytes)?;
                self.write_zeros(cap - bytes.len())
            }
            StringFormat::FixedLength(len) => {
                // Truncation happens at a byte boundary; callers storing
                // multi-byte characters are responsible for the cap.
                let take = bytes.len().min(len);
                self.write_bytes(&bytes[..take])?;
                self.write_zeros(len - take)
            }
            StringFormat::Prefixed8 => {
                let len = prefix_len(bytes.len(), u8::MAX as usize)?;
                self.write::<u8>(len as u8)?;
                self.write_bytes(bytes)
            }
            StringFormat::Prefixed16 => {
                let len = prefix_len(bytes.len(), u16::MAX as usize)?;
                self.write::<u16>(len as u16)?;
                self.write_bytes(bytes)
            }
            StringFormat::Prefixed32 => {
                let len = prefix_len(bytes.len(), u32::MAX as usize)?;
                self.write::<u32>(len as u32)?;
                self.write_bytes(bytes)
            }
            StringFormat::Prefixed64 => {
                self.write::<u64>(bytes.len() as u64)?;
                self.write_bytes(bytes)
            }
        }
    }

    /// Encodes each string in order, all in the same format.
    pub fn write_string_array<V: AsRef<str>>(
        &mut self,
        format: StringFormat,
        values: &[V],
    ) -> Result<(), CodecError> {
        for value in values {
            self.write_string(format, value.as_ref())?;
        }
        Ok(())
    }

    /// Commits bit state, drains the write-behind buffer, and flushes the
    /// underlying stream. Idempotent.
    pub fn flush(&mut self) -> Result<(), CodecError> {
        self.flush_bits()?;
        self.flush_run()?;
        self.stream.flush()?;
        Ok(())
    }

    fn write_zeros(&mut self, count: usize) -> Result<(), CodecError> {
        if count > 0 {
            self.write_bytes(&vec![0u8; count])?;
        }
        Ok(())
    }

    fn acquire_working(&mut self) -> Result<(), CodecError> {
        if !self.bit_active {
            self.working = self.byte_at_or_zero(self.pos)?;
            self.bit_pos = self.pos;
            self.bit_cursor = 0;
            self.bit_dirty = false;
            self.bit_active = true;
            self.pos += 1;
            if self.pos > self.len {
                self.len = self.pos;
            }
        }
        Ok(())
    }

    /// Reads the byte at `pos`, seeing pending buffered bytes; positions
    /// never written read as zero.
    fn byte_at_or_zero(&mut self, pos: u64) -> Result<u8, CodecError> {
        if !self.run.is_empty() {
            let end = self.run_start + self.run.len() as u64;
            if pos >= self.run_start && pos < end {
                return Ok(self.run[(pos - self.run_start) as usize]);
            }
        }
        if pos >= self.len {
            return Ok(0);
        }
        self.seek_stream(pos)?;
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte) {
                Ok(0) => return Ok(0),
                Ok(_) => {
                    self.stream_pos = pos + 1;
                    return Ok(byte[0]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Raw positioned write; does not touch bit state.
    fn raw_write(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        if bytes.is_empty() {
            return Ok(());
        }
        if self.block_size == 0 {
            self.seek_stream(self.pos)?;
            self.stream.write_all(bytes)?;
            self.stream_pos += bytes.len() as u64;
        } else {
            if self.run.is_empty() {
                self.run_start = self.pos;
            } else if self.pos != self.run_start + self.run.len() as u64 {
                self.flush_run()?;
                self.run_start = self.pos;
            }
            self.run.extend_from_slice(bytes);
            if self.run.len() >= self.block_size {
                self.flush_run()?;
            }
        }
        self.pos += bytes.len() as u64;
        if self.pos > self.len {
            self.len = self.pos;
        }
        Ok(())
    }

    fn raw_write_at(&mut self, pos: u64, bytes: &[u8]) -> Result<(), CodecError> {
        let prev = self.pos;
        self.pos = pos;
        let result = self.raw_write(bytes);
        self.pos = prev;
        result
    }

    fn flush_run(&mut self) -> Result<(), CodecError> {
        if self.run.is_empty() {
            return Ok(());
        }
        self.seek_stream(self.run_start)?;
        self.stream.write_all(&self.run)?;
        self.stream_pos = self.run_start + self.run.len() as u64;
        self.run.clear();
        Ok(())
    }

    fn seek_stream(&mut self, pos: u64) -> Result<(), CodecError> {
        if self.stream_pos != pos {
            self.stream.seek(SeekFrom::Start(pos))?;
            self.stream_pos = pos;
        }
        Ok(())
    }
}

fn prefix_len(len: usize, max: usize) -> Result<usize, CodecError> {
    if len > max {
        return Err(CodecError::StringTooLong { len, capacity: max });
    }
    Ok(len)
}

impl<S: Read + Write + Seek> Drop for ValueWriter<S> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueReader;
    use bytemuck_derive::{Pod, Zeroable};
    use std::io::Cursor;
    use wire_layout::impl_wire_value;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Inner {
        a: u16,
        b: u16,
    }
    impl_wire_value!(Inner { a: u16, b: u16 });

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct Mixed {
        id: i32,
        mask: u32,
        scale: f32,
        inner: Inner,
    }
    impl_wire_value!(Mixed { id: i32, mask: u32, scale: f32, inner: Inner });

    fn write_to_vec(
        endianness: Endianness,
        block: usize,
        f: impl FnOnce(&mut ValueWriter<&mut Cursor<Vec<u8>>>),
    ) -> Vec<u8> {
        let mut stream = Cursor::new(Vec::new());
        {
            let mut writer = ValueWriter::with_block_size(&mut stream, endianness, block)
                .expect("writer");
            f(&mut writer);
            writer.flush().expect("flush");
        }
        stream.into_inner()
    }

    #[test]
    fn bit_sequence_produces_expected_bytes() {
        for block in [DEFAULT_BLOCK_SIZE, 0, 2] {
            let bytes = write_to_vec(Endianness::Little, block, |w| {
                w.write_bit(true).unwrap();
                w.write_bit(true).unwrap();
                w.write_bit(false).unwrap();
                w.write_bit(true).unwrap();
                w.seek(SeekFrom::Current(3)).unwrap();
                w.write_bit(false).unwrap();
                w.write_bit(false).unwrap();
                w.write_bit(true).unwrap();
                w.write_bit(false).unwrap();
            });
            assert_eq!(bytes, [0b0000_1011, 0x00, 0x00, 0x00, 0b0000_0100]);
        }
    }

    #[test]
    fn indexed_bit_writes_produce_expected_bytes() {
        let bytes = write_to_vec(Endianness::Little, DEFAULT_BLOCK_SIZE, |w| {
            w.write_bit_at(0, true).unwrap();
            w.write_bit_at(1, true).unwrap();
            w.write_bit_at(3, true).unwrap();
            w.seek(SeekFrom::Current(3)).unwrap();
            w.write_bit_at(2, true).unwrap();
        });
        assert_eq!(bytes, [0b0000_1011, 0x00, 0x00, 0x00, 0b0000_0100]);
    }

    #[test]
    fn bit_writes_preserve_existing_byte_content() {
        let mut stream = Cursor::new(vec![0b1111_0000u8]);
        {
            let mut writer =
                ValueWriter::new(&mut stream, Endianness::Little).expect("writer");
            writer.write_bit(true).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(stream.into_inner(), vec![0b1111_0001]);
    }

    #[test]
    fn scalar_writes_both_endians() {
        let write_all = |w: &mut ValueWriter<&mut Cursor<Vec<u8>>>| {
            w.write::<i32>(0x12345678).unwrap();
            w.write::<u32>(0xDEADBEEF).unwrap();
            w.write::<f32>(1.0).unwrap();
            w.write::<u8>(0xFF).unwrap();
        };
        let le = write_to_vec(Endianness::Little, DEFAULT_BLOCK_SIZE, write_all);
        let be = write_to_vec(Endianness::Big, DEFAULT_BLOCK_SIZE, write_all);
        assert_eq!(
            le,
            [0x78, 0x56, 0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE, 0x00, 0x00, 0x80, 0x3F, 0xFF]
        );
        assert_eq!(
            be,
            [0x12, 0x34, 0x56, 0x78, 0xDE, 0xAD, 0xBE, 0xEF, 0x3F, 0x80, 0x00, 0x00, 0xFF]
        );
    }

    #[test]
    fn struct_round_trip_swaps_leaves_not_whole_struct() {
        let value = Mixed {
            id: 0x12345678,
            mask: 0xDEADBEEF,
            scale: 1.0,
            inner: Inner { a: 0xAABB, b: 0x1122 },
        };
        for endianness in [Endianness::Little, Endianness::Big, Endianness::Native] {
            let bytes = write_to_vec(endianness, DEFAULT_BLOCK_SIZE, |w| {
                w.write(value).unwrap();
            });
            let mut r =
                ValueReader::new(Cursor::new(bytes.clone()), endianness).expect("reader");
            assert_eq!(r.read::<Mixed>().unwrap(), value);

            // field-level check against plain integer encoding
            let mut r = ValueReader::new(Cursor::new(bytes), endianness).expect("reader");
            assert_eq!(r.read::<i32>().unwrap(), 0x12345678);
            assert_eq!(r.read::<u32>().unwrap(), 0xDEADBEEF);
            assert_eq!(r.read::<f32>().unwrap(), 1.0);
            assert_eq!(r.read::<u16>().unwrap(), 0xAABB);
            assert_eq!(r.read::<u16>().unwrap(), 0x1122);
        }
    }

    #[test]
    fn array_write_matches_sequential_writes() {
        let values = [1.0f32, 2.0, 3.0];
        for endianness in [Endianness::Little, Endianness::Big] {
            let bulk = write_to_vec(endianness, DEFAULT_BLOCK_SIZE, |w| {
                w.write_array(&values).unwrap();
            });
            let single = write_to_vec(endianness, DEFAULT_BLOCK_SIZE, |w| {
                for v in values {
                    w.write(v).unwrap();
                }
            });
            assert_eq!(bulk, single);
        }
    }

    #[test]
    fn collection_write_matches_array_write() {
        let values = vec![7u16, 8, 9];
        let a = write_to_vec(Endianness::Big, 0, |w| {
            w.write_collection(values.iter().copied()).unwrap();
        });
        let b = write_to_vec(Endianness::Big, 0, |w| {
            w.write_array(&values).unwrap();
        });
        assert_eq!(a, b);
    }

    #[test]
    fn string_formats_round_trip() {
        let formats = [
            StringFormat::NullTerminated,
            StringFormat::NullTerminatedCapped(16),
            StringFormat::FixedLength(8),
            StringFormat::Prefixed8,
            StringFormat::Prefixed16,
            StringFormat::Prefixed32,
            StringFormat::Prefixed64,
        ];
        for format in formats {
            let bytes = write_to_vec(Endianness::Little, DEFAULT_BLOCK_SIZE, |w| {
                w.write_string(format, "TEST").unwrap();
            });
            let mut r =
                ValueReader::new(Cursor::new(bytes), Endianness::Little).expect("reader");
            assert_eq!(r.read_string(format).unwrap(), "TEST", "{format:?}");
        }
    }

    #[test]
    fn prefixed_string_length_is_endianness_aware() {
        let bytes = write_to_vec(Endianness::Big, DEFAULT_BLOCK_SIZE, |w| {
            w.write_string(StringFormat::Prefixed32, "TEST").unwrap();
        });
        assert_eq!(&bytes[..4], &[0, 0, 0, 4]);
        assert_eq!(&bytes[4..], b"TEST");
    }

    #[test]
    fn capped_string_rejects_overflow() {
        let mut stream = Cursor::new(Vec::new());
        let mut writer = ValueWriter::new(&mut stream, Endianness::Little).expect("writer");
        assert!(matches!(
            writer.write_string(StringFormat::NullTerminatedCapped(4), "TEST"),
            Err(CodecError::StringTooLong { len: 5, capacity: 4 })
        ));
    }

    #[test]
    fn fixed_length_pads_and_truncates() {
        let bytes = write_to_vec(Endianness::Little, 0, |w| {
            w.write_string(StringFormat::FixedLength(5), "HELLO WORLD").unwrap();
            w.write_string(StringFormat::FixedLength(5), "HI").unwrap();
        });
        assert_eq!(&bytes, b"HELLOHI\0\0\0");
    }

    #[test]
    fn non_contiguous_write_flushes_run() {
        let bytes = write_to_vec(Endianness::Little, DEFAULT_BLOCK_SIZE, |w| {
            w.write::<u32>(0x11111111).unwrap();
            w.write::<u32>(0x22222222).unwrap();
            w.seek(SeekFrom::Start(0)).unwrap();
            w.write::<u32>(0x33333333).unwrap();
        });
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &0x33333333u32.to_le_bytes());
        assert_eq!(&bytes[4..], &0x22222222u32.to_le_bytes());
    }

    #[test]
    fn write_at_restores_position() {
        let bytes = write_to_vec(Endianness::Little, DEFAULT_BLOCK_SIZE, |w| {
            w.write::<u32>(0xAAAAAAAA).unwrap();
            w.write::<u32>(0).unwrap();
            let end = w.position();
            w.write_at(0, |w| w.write::<u32>(0xBBBBBBBB)).unwrap();
            assert_eq!(w.position(), end);
            w.write::<u32>(0xCCCCCCCC).unwrap();
        });
        assert_eq!(&bytes[..4], &0xBBBBBBBBu32.to_le_bytes());
        assert_eq!(&bytes[8..], &0xCCCCCCCCu32.to_le_bytes());
    }

    #[test]
    fn drop_flushes_pending_bytes() {
        let mut stream = Cursor::new(Vec::new());
        {
            let mut writer = ValueWriter::new(&mut stream, Endianness::Little).expect("writer");
            writer.write::<u16>(0xBEEF).unwrap();
            // no explicit flush
        }
        assert_eq!(stream.into_inner(), 0xBEEFu16.to_le_bytes());
    }
}
