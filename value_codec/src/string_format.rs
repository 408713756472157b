/// Wire representation of a length-delimited string.
///
/// All formats carry UTF-8 bytes; length prefixes are written in the
/// codec's configured endianness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringFormat {
    /// Bytes followed by a single zero terminator; reading stops at the
    /// first zero byte.
    NullTerminated,
    /// Zero-terminated within a fixed-size area of `n` bytes; the area is
    /// zero-padded on write and reading stops at the first zero byte.
    NullTerminatedCapped(usize),
    /// Exactly `n` bytes, truncated or zero-padded on write; trailing zero
    /// bytes are trimmed on read.
    FixedLength(usize),
    /// Unsigned 8-bit byte-length prefix.
    Prefixed8,
    /// Unsigned 16-bit byte-length prefix.
    Prefixed16,
    /// Unsigned 32-bit byte-length prefix.
    Prefixed32,
    /// Unsigned 64-bit byte-length prefix.
    Prefixed64,
}
