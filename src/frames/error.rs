use crate::codec;

/// Errors raised by the frame codecs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The header contradicts itself (doff below 2, size below 8).
    #[error("malformed frame header")]
    FramingError,

    /// A frame type this client does not speak.
    #[error("frame type 0x{0:02x} is not implemented")]
    NotImplemented(u8),

    #[error(transparent)]
    Codec(#[from] codec::Error),
}
