use thiserror::Error;

/// Errors surfaced by [`ValueReader`](crate::ValueReader) and
/// [`ValueWriter`](crate::ValueWriter).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("invalid UTF-8 in string data: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A value does not fit in the fixed capacity reserved for it. This is
    /// a caller error and is reported eagerly rather than truncating.
    #[error("string of {len} bytes does not fit in {capacity}")]
    StringTooLong { len: usize, capacity: usize },

    #[error("length prefix {0} exceeds addressable memory")]
    LengthOutOfRange(u64),

    #[error("bit index {0} out of range for a byte")]
    BitIndexOutOfRange(u8),
}
