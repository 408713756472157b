//! Typed, buffered reading over a seekable stream.

use std::io::{self, Read, Seek, SeekFrom};

use wire_layout::{Endianness, WireValue, align_up};

use crate::{CodecError, DEFAULT_BLOCK_SIZE, StringFormat};

/// Endianness-aware value reader over any `Read + Seek` stream.
///
/// The reader keeps its own logical position, a read-ahead block buffer,
/// and a bit cursor for sub-byte access. Seeking or any byte-level read
/// discards partial bit state and resets the bit cursor.
pub struct ValueReader<S: Read + Seek> {
    stream: S,
    endianness: Endianness,
    /// Logical read position.
    pos: u64,
    /// Stream length, captured at construction.
    len: u64,
    /// Physical position of the underlying stream.
    stream_pos: u64,
    block: Vec<u8>,
    block_start: u64,
    block_size: usize,
    /// Working byte for bit access; valid while `bit_active`.
    working: u8,
    bit_cursor: u8,
    bit_active: bool,
}

impl<S: Read + Seek> ValueReader<S> {
    /// Creates a reader with the default block size.
    pub fn new(stream: S, endianness: Endianness) -> Result<Self, CodecError> {
        Self::with_block_size(stream, endianness, DEFAULT_BLOCK_SIZE)
    }

    /// Creates a reader with an explicit block size; 0 disables buffering.
    pub fn with_block_size(
        mut stream: S,
        endianness: Endianness,
        block_size: usize,
    ) -> Result<Self, CodecError> {
        let pos = stream.stream_position()?;
        let len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(pos))?;
        Ok(ValueReader {
            stream,
            endianness,
            pos,
            len,
            stream_pos: pos,
            block: Vec::new(),
            block_start: 0,
            block_size,
            working: 0,
            bit_cursor: 0,
            bit_active: false,
        })
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Stream length as captured at construction.
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

    /// Repositions the reader, discarding any partial bit state.
    pub fn seek(&mut self, target: SeekFrom) -> Result<u64, CodecError> {
        self.bit_active = false;
        self.bit_cursor = 0;
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

    pub fn align(&mut self, alignment: u64) -> Result<u64, CodecError> {
        let aligned = align_up(self.pos, alignment);
        self.seek(SeekFrom::Start(aligned))
    }

    /// Runs `action` with the reader positioned at `pos`, restoring the
    /// previous position afterwards whether or not the action succeeds.
    pub fn read_at<R>(
        &mut self,
        pos: u64,
        action: impl FnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        let prev = self.pos;
        self.seek(SeekFrom::Start(pos))?;
        let result = action(self);
        let restore = self.seek(SeekFrom::Start(prev));
        let value = result?;
        restore?;
        Ok(value)
    }

    /// Reads exactly `out.len()` bytes at the current position.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<(), CodecError> {
        self.bit_active = false;
        self.bit_cursor = 0;
        self.fetch(out)
    }

    /// Reads one value, swapping leaf fields if the configured byte order
    /// differs from the host.
    pub fn read<T: WireValue>(&mut self) -> Result<T, CodecError> {
        let mut value = T::zeroed();
        let bytes = bytemuck::bytes_of_mut(&mut value);
        self.read_bytes(bytes)?;
        if !self.endianness.is_native() {
            T::swap_in_place(bytes);
        }
        Ok(value)
    }

    /// Reads `count` contiguous values. Byte-for-byte equivalent to
    /// `count` single [`read`](Self::read) calls.
    pub fn read_array<T: WireValue>(&mut self, count: usize) -> Result<Vec<T>, CodecError> {
        let mut values = vec![T::zeroed(); count];
        let size = core::mem::size_of::<T>();
        if count == 0 || size == 0 {
            return Ok(values);
        }
        let bytes = bytemuck::cast_slice_mut(&mut values);
        self.read_bytes(bytes)?;
        if !self.endianness.is_native() {
            for chunk in bytes.chunks_exact_mut(size) {
                T::swap_in_place(chunk);
            }
        }
        Ok(values)
    }

    /// Reads `count` values into any append-only destination.
    pub fn read_collection<T: WireValue, C: Extend<T>>(
        &mut self,
        count: usize,
        into: &mut C,
    ) -> Result<(), CodecError> {
        into.extend(self.read_array::<T>(count)?);
        Ok(())
    }

    /// Reads the next bit at the bit cursor, loading a fresh working byte
    /// (and advancing the byte position) when none is held.
    pub fn read_bit(&mut self) -> Result<bool, CodecError> {
        self.load_working_byte()?;
        let value = (self.working >> self.bit_cursor) & 1 == 1;
        self.bit_cursor += 1;
        if self.bit_cursor == 8 {
            self.bit_active = false;
            self.bit_cursor = 0;
        }
        Ok(value)
    }

    /// Reads bit `index` of the working byte without moving the bit cursor.
    pub fn read_bit_at(&mut self, index: u8) -> Result<bool, CodecError> {
        if index > 7 {
            return Err(CodecError::BitIndexOutOfRange(index));
        }
        self.load_working_byte()?;
        Ok((self.working >> index) & 1 == 1)
    }

    /// Decodes a string in the given wire format.
    pub fn read_string(&mut self, format: StringFormat) -> Result<String, CodecError> {
        let bytes = match format {
            StringFormat::NullTerminated => {
                let mut bytes = Vec::new();
                loop {
                    let byte = self.read::<u8>()?;
                    if byte == 0 {
                        break;
                    }
                    bytes.push(byte);
                }
                bytes
            }
            StringFormat::NullTerminatedCapped(cap) => {
                let mut bytes = vec![0u8; cap];
                self.read_bytes(&mut bytes)?;
                if let Some(end) = bytes.iter().position(|&b| b == 0) {
                    bytes.truncate(end);
                }
                bytes
            }
            StringFormat::FixedLength(len) => {
                let mut bytes = vec![0u8; len];
                self.read_bytes(&mut bytes)?;
                while bytes.last() == Some(&0) {
                    bytes.pop();
                }
                bytes
            }
            StringFormat::Prefixed8 => {
                let len = self.read::<u8>()? as usize;
                self.read_array::<u8>(len)?
            }
            StringFormat::Prefixed16 => {
                let len = self.read::<u16>()? as usize;
                self.read_array::<u8>(len)?
            }
            StringFormat::Prefixed32 => {
                let len = self.read::<u32>()?;
                let len = usize::try_from(len).map_err(|_| CodecError::LengthOutOfRange(len as u64))?;
                self.read_array::<u8>(len)?
            }
            StringFormat::Prefixed64 => {
                let len = self.read::<u64>()?;
                let len = usize::try_from(len).map_err(|_| CodecError::LengthOutOfRange(len))?;
                self.read_array::<u8>(len)?
            }
        };
        Ok(String::from_utf8(bytes)?)
    }

    /// Decodes `count` consecutive strings in the same format.
    pub fn read_string_array(
        &mut self,
        format: StringFormat,
        count: usize,
    ) -> Result<Vec<String>, CodecError> {
        let mut strings = Vec::with_capacity(count);
        for _ in 0..count {
            strings.push(self.read_string(format)?);
        }
        Ok(strings)
    }

    fn load_working_byte(&mut self) -> Result<(), CodecError> {
        if !self.bit_active {
            let mut byte = [0u8; 1];
            self.fetch(&mut byte)?;
            self.working = byte[0];
            self.bit_cursor = 0;
            self.bit_active = true;
        }
        Ok(())
    }

    /// Raw positioned read; does not touch bit state.
    fn fetch(&mut self, out: &mut [u8]) -> Result<(), CodecError> {
        if out.is_empty() {
            return Ok(());
        }
        if self.block_size == 0 {
            self.seek_stream(self.pos)?;
            self.stream.read_exact(out).map_err(map_eof)?;
            self.stream_pos += out.len() as u64;
            self.pos += out.len() as u64;
            return Ok(());
        }

        let mut filled = 0;
        while filled < out.len() {
            let pos = self.pos + filled as u64;
            let block_end = self.block_start + self.block.len() as u64;
            if pos >= self.block_start && pos < block_end {
                let offset = (pos - self.block_start) as usize;
                let n = (self.block.len() - offset).min(out.len() - filled);
                out[filled..filled + n].copy_from_slice(&self.block[offset..offset + n]);
                filled += n;
            } else {
                self.refill(pos)?;
            }
        }
        self.pos += out.len() as u64;
        Ok(())
    }

    fn refill(&mut self, pos: u64) -> Result<(), CodecError> {
        self.seek_stream(pos)?;
        self.block.resize(self.block_size, 0);
        let mut n = 0;
        while n < self.block.len() {
            match self.stream.read(&mut self.block[n..]) {
                Ok(0) => break,
                Ok(m) => n += m,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.block.truncate(n);
        self.block_start = pos;
        self.stream_pos = pos + n as u64;
        if n == 0 {
            return Err(CodecError::UnexpectedEof);
        }
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

fn map_eof(e: io::Error) -> CodecError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        CodecError::UnexpectedEof
    } else {
        CodecError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: &[u8], endianness: Endianness, block: usize) -> ValueReader<Cursor<Vec<u8>>> {
        ValueReader::with_block_size(Cursor::new(bytes.to_vec()), endianness, block)
            .expect("reader")
    }

    #[test]
    fn read_bit_sequence() {
        let bytes = [0b0000_1011u8, 0x00, 0x00, 0x00, 0b0000_0100];
        let mut r = reader(&bytes, Endianness::Little, DEFAULT_BLOCK_SIZE);
        assert!(r.read_bit().unwrap());
        assert!(r.read_bit().unwrap());
        assert!(!r.read_bit().unwrap());
        assert!(r.read_bit().unwrap());
        r.seek(SeekFrom::Current(3)).unwrap();
        assert!(!r.read_bit().unwrap());
        assert!(!r.read_bit().unwrap());
        assert!(r.read_bit().unwrap());
        assert!(!r.read_bit().unwrap());
    }

    #[test]
    fn read_bit_indexed() {
        let bytes = [0b0000_1011u8, 0x00, 0x00, 0x00, 0b0000_0100];
        let mut r = reader(&bytes, Endianness::Little, DEFAULT_BLOCK_SIZE);
        assert!(r.read_bit_at(0).unwrap());
        assert!(r.read_bit_at(1).unwrap());
        assert!(!r.read_bit_at(2).unwrap());
        assert!(r.read_bit_at(3).unwrap());
        r.seek(SeekFrom::Current(3)).unwrap();
        assert!(!r.read_bit_at(0).unwrap());
        assert!(!r.read_bit_at(1).unwrap());
        assert!(r.read_bit_at(2).unwrap());
        assert!(!r.read_bit_at(3).unwrap());
        assert!(matches!(
            r.read_bit_at(8),
            Err(CodecError::BitIndexOutOfRange(8))
        ));
    }

    #[test]
    fn indexed_access_leaves_bit_cursor() {
        // 0b0000_0110: sequential reads walk bits 0,1 while an indexed
        // peek in between must not advance the cursor.
        let mut r = reader(&[0b0000_0110u8], Endianness::Little, 0);
        assert!(!r.read_bit().unwrap());
        assert!(r.read_bit_at(2).unwrap());
        assert!(r.read_bit().unwrap());
    }

    #[test]
    fn scalar_reads_both_endians_all_block_sizes() {
        let le = [
            0x78, 0x56, 0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE, 0x00, 0x00, 0x80, 0x3F, 0xFF,
        ];
        let be = [
            0x12, 0x34, 0x56, 0x78, 0xDE, 0xAD, 0xBE, 0xEF, 0x3F, 0x80, 0x00, 0x00, 0xFF,
        ];
        for block in [DEFAULT_BLOCK_SIZE, 0, 3] {
            for (bytes, endianness) in [(&le, Endianness::Little), (&be, Endianness::Big)] {
                let mut r = reader(bytes, endianness, block);
                assert_eq!(r.read::<i32>().unwrap(), 0x12345678);
                assert_eq!(r.read::<u32>().unwrap(), 0xDEADBEEF);
                assert_eq!(r.read::<f32>().unwrap(), 1.0);
                assert_eq!(r.read::<u8>().unwrap(), 0xFF);
                assert!(matches!(r.read::<u8>(), Err(CodecError::UnexpectedEof)));
            }
        }
    }

    #[test]
    fn array_read_matches_sequential_reads() {
        let bytes: Vec<u8> = (0..32).collect();
        for block in [DEFAULT_BLOCK_SIZE, 0, 3, 5] {
            let mut a = reader(&bytes, Endianness::Big, block);
            let mut b = reader(&bytes, Endianness::Big, block);
            let bulk = a.read_array::<u32>(8).unwrap();
            let single: Vec<u32> = (0..8).map(|_| b.read::<u32>().unwrap()).collect();
            assert_eq!(bulk, single);
        }
    }

    #[test]
    fn collection_read_appends() {
        let bytes = [1u8, 0, 2, 0, 3, 0];
        let mut r = reader(&bytes, Endianness::Little, 0);
        let mut out: Vec<u16> = vec![99];
        r.read_collection::<u16, _>(3, &mut out).unwrap();
        assert_eq!(out, vec![99, 1, 2, 3]);
    }

    #[test]
    fn null_terminated_stops_at_first_zero() {
        let mut r = reader(b"TEST\0DEAD\0", Endianness::Little, DEFAULT_BLOCK_SIZE);
        assert_eq!(r.read_string(StringFormat::NullTerminated).unwrap(), "TEST");
        assert_eq!(r.position(), 5);
    }

    #[test]
    fn fixed_length_trims_trailing_zeros() {
        let mut r = reader(b"TEST\0\0\0\0", Endianness::Little, 0);
        assert_eq!(
            r.read_string(StringFormat::FixedLength(8)).unwrap(),
            "TEST"
        );
        assert_eq!(r.position(), 8);
    }

    #[test]
    fn value_straddles_refill_boundary() {
        let mut bytes = vec![0u8; 7];
        bytes.extend_from_slice(&0x1122334455667788u64.to_le_bytes());
        let mut r = reader(&bytes, Endianness::Little, 4);
        r.seek(SeekFrom::Start(7)).unwrap();
        assert_eq!(r.read::<u64>().unwrap(), 0x1122334455667788);
    }
}
