use crate::codec::format_code::FormatCode;

/// Errors raised while encoding or decoding AMQP values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The input ended before a complete value could be decoded.
    #[error("not enough bytes for a complete value")]
    Truncated,

    /// A byte that is not a valid AMQP format code.
    #[error("invalid format code 0x{0:02x}")]
    InvalidFormatCode(u8),

    /// A well-formed format code in a position where a different type was
    /// required.
    #[error("unexpected format code {code} while decoding {expecting}")]
    UnexpectedFormatCode {
        code: FormatCode,
        expecting: &'static str,
    },

    /// A described-type constructor whose descriptor is not the expected
    /// ulong domain/code value.
    #[error("unexpected descriptor 0x{found:08x} while decoding {expecting}")]
    UnexpectedDescriptor { found: u64, expecting: &'static str },

    /// A composite list is missing a mandatory field.
    #[error("malformed composite: {0} is mandatory")]
    MalformedComposite(&'static str),

    /// Map keys must be comparable scalars.
    #[error("map keys must not be lists, maps, or arrays")]
    InvalidMapKey,

    /// Array elements must share a single constructor.
    #[error("unsupported array element type")]
    UnsupportedArrayElement,

    /// A string or symbol payload is not valid UTF-8.
    #[error("string is not valid utf-8")]
    InvalidUtf8,

    /// A char payload is not a valid Unicode scalar value.
    #[error("invalid utf-32 char 0x{0:08x}")]
    InvalidChar(u32),

    /// A size or count field that contradicts the surrounding frame.
    #[error("invalid length prefix")]
    InvalidLength,
}
