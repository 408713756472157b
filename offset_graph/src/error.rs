use std::io;

use thiserror::Error;
use value_codec::CodecError;

/// Errors from offset resolution and object graph (de)serialization.
#[derive(Debug, Error)]
pub enum OffsetError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An object at this position was first decoded as a different type.
    #[error("cached object at {position:#x} has a different type")]
    IdentityTypeMismatch { position: u64 },

    /// `pop_origin` was called with only the root origin on the stack.
    #[error("offset origin stack underflow")]
    OriginStackEmpty,
}

impl From<io::Error> for OffsetError {
    fn from(err: io::Error) -> Self {
        OffsetError::Codec(CodecError::Io(err))
    }
}
