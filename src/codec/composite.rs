//! Described-list encoding of composite types.
//!
//! Composites are encoded as a described list whose descriptor is the ulong
//! domain/code of the type. Marshaling follows the declared field order and
//! elides trailing defaulted fields; unmarshaling substitutes per-field
//! defaults for nulls and for fields the peer left off the end of the list.

use crate::buffer::Buffer;
use crate::codec::format_code::FormatCode;
use crate::codec::value::{
    append_compound, encode_null, encode_ulong, read_format_code, try_read_null,
};
use crate::codec::{Decode, Encode, Error};

/// One slot of a composite's encode table.
pub(crate) struct EncodeField<'a> {
    pub value: &'a dyn Encode,
    pub omit: bool,
}

/// Encodes a composite as `0x00 <code> <list>`, eliding trailing omitted
/// fields and writing null for omitted fields in the middle of the table.
pub(crate) fn encode_composite(
    buf: &mut Buffer,
    code: u64,
    fields: &[EncodeField<'_>],
) -> Result<(), Error> {
    buf.append_u8(FormatCode::Described as u8);
    encode_ulong(buf, code);

    let count = match fields.iter().rposition(|field| !field.omit) {
        Some(last) => last + 1,
        None => {
            buf.append_u8(FormatCode::List0 as u8);
            return Ok(());
        }
    };

    let mut scratch = Buffer::new();
    for field in &fields[..count] {
        if field.omit {
            encode_null(&mut scratch);
        } else {
            field.value.encode(&mut scratch)?;
        }
    }
    append_compound(buf, FormatCode::List8, FormatCode::List32, count, scratch);
    Ok(())
}

/// Reads the described-type constructor and returns the ulong descriptor
/// code. Symbolic descriptors are not produced by any peer this client talks
/// to and are rejected.
pub(crate) fn decode_descriptor(buf: &mut Buffer) -> Result<u64, Error> {
    let code = read_format_code(buf)?;
    if code != FormatCode::Described {
        return Err(Error::UnexpectedFormatCode {
            code,
            expecting: "a described type",
        });
    }
    match read_format_code(buf)? {
        FormatCode::Ulong0 => Ok(0),
        FormatCode::SmallUlong => Ok(buf.read_u8()? as u64),
        FormatCode::Ulong => buf.read_u64(),
        code => Err(Error::UnexpectedFormatCode {
            code,
            expecting: "a ulong descriptor",
        }),
    }
}

/// Reads the descriptor code from the first bytes of an encoded body without
/// consuming or allocating anything. Frame and section dispatch use this to
/// pick the right composite decoder.
pub(crate) fn peek_descriptor_code(bytes: &[u8]) -> Result<u64, Error> {
    if bytes.len() < 2 {
        return Err(Error::Truncated);
    }
    if bytes[0] != FormatCode::Described as u8 {
        return Err(Error::UnexpectedFormatCode {
            code: FormatCode::try_from(bytes[0])?,
            expecting: "a described type",
        });
    }
    match FormatCode::try_from(bytes[1])? {
        FormatCode::Ulong0 => Ok(0),
        FormatCode::SmallUlong => bytes.get(2).copied().map(u64::from).ok_or(Error::Truncated),
        FormatCode::Ulong => {
            if bytes.len() < 10 {
                return Err(Error::Truncated);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[2..10]);
            Ok(u64::from_be_bytes(raw))
        }
        code => Err(Error::UnexpectedFormatCode {
            code,
            expecting: "a ulong descriptor",
        }),
    }
}

/// Consumes the described-type constructor, failing unless it carries the
/// expected code.
pub(crate) fn expect_descriptor(
    buf: &mut Buffer,
    code: u64,
    expecting: &'static str,
) -> Result<(), Error> {
    let found = decode_descriptor(buf)?;
    if found != code {
        return Err(Error::UnexpectedDescriptor { found, expecting });
    }
    Ok(())
}

/// Field-by-field reader over a composite's list body.
pub(crate) struct CompositeFields {
    remaining: usize,
    end: usize,
}

impl CompositeFields {
    /// Reads the list header. The descriptor must already have been consumed
    /// (and dispatched on) by the caller.
    pub fn read(buf: &mut Buffer) -> Result<Self, Error> {
        let (remaining, end) = match read_format_code(buf)? {
            FormatCode::List0 => (0, buf.pos()),
            FormatCode::List8 => {
                let size = buf.read_u8()? as usize;
                let start = buf.pos();
                let count = buf.read_u8()? as usize;
                (count, start + size)
            }
            FormatCode::List32 => {
                let size = buf.read_u32()? as usize;
                let start = buf.pos();
                let count = buf.read_u32()? as usize;
                (count, start + size)
            }
            code => {
                return Err(Error::UnexpectedFormatCode {
                    code,
                    expecting: "a composite list",
                })
            }
        };
        if end > buf.pos() + buf.remaining() {
            return Err(Error::Truncated);
        }
        Ok(Self { remaining, end })
    }

    /// Expects `0x00 <code> <list>` and validates the descriptor.
    pub fn read_described(
        buf: &mut Buffer,
        code: u64,
        expecting: &'static str,
    ) -> Result<Self, Error> {
        let found = decode_descriptor(buf)?;
        if found != code {
            return Err(Error::UnexpectedDescriptor { found, expecting });
        }
        Self::read(buf)
    }

    /// Reads the next field, substituting the type's default when the field
    /// is null or was elided off the end of the list.
    pub fn field<T: Decode + Default>(&mut self, buf: &mut Buffer) -> Result<T, Error> {
        if self.remaining == 0 {
            return Ok(T::default());
        }
        self.remaining -= 1;
        if try_read_null(buf) {
            return Ok(T::default());
        }
        T::decode(buf)
    }

    /// Reads the next field, failing when it is null or missing.
    pub fn mandatory<T: Decode>(&mut self, buf: &mut Buffer, name: &'static str) -> Result<T, Error> {
        if self.remaining == 0 {
            return Err(Error::MalformedComposite(name));
        }
        self.remaining -= 1;
        if try_read_null(buf) {
            return Err(Error::MalformedComposite(name));
        }
        T::decode(buf)
    }

    /// Skips any fields this decoder does not know about.
    pub fn finish(self, buf: &mut Buffer) -> Result<(), Error> {
        if buf.pos() < self.end {
            buf.skip(self.end - buf.pos())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_defaults_are_elided() {
        let name = "n".to_string();
        let handle = 3u32;
        let absent: Option<u32> = None;
        let mut buf = Buffer::new();
        encode_composite(
            &mut buf,
            0x12,
            &[
                EncodeField {
                    value: &name,
                    omit: false,
                },
                EncodeField {
                    value: &handle,
                    omit: false,
                },
                EncodeField {
                    value: &absent,
                    omit: true,
                },
                EncodeField {
                    value: &absent,
                    omit: true,
                },
            ],
        )
        .unwrap();

        let mut read = Buffer::from(buf.unread());
        let mut fields = CompositeFields::read_described(&mut read, 0x12, "attach").unwrap();
        assert_eq!(fields.remaining, 2);
        let decoded_name: String = fields.mandatory(&mut read, "name").unwrap();
        let decoded_handle: u32 = fields.mandatory(&mut read, "handle").unwrap();
        fields.finish(&mut read).unwrap();
        assert_eq!(decoded_name, "n");
        assert_eq!(decoded_handle, 3);
        assert_eq!(read.remaining(), 0);
    }

    #[test]
    fn interior_omitted_field_becomes_null() {
        let first = 1u32;
        let third = 3u32;
        let mut buf = Buffer::new();
        encode_composite(
            &mut buf,
            0x99,
            &[
                EncodeField {
                    value: &first,
                    omit: false,
                },
                EncodeField {
                    value: &first,
                    omit: true,
                },
                EncodeField {
                    value: &third,
                    omit: false,
                },
            ],
        )
        .unwrap();

        let mut read = Buffer::from(buf.unread());
        let mut fields = CompositeFields::read_described(&mut read, 0x99, "test").unwrap();
        assert_eq!(fields.field::<u32>(&mut read).unwrap(), 1);
        assert_eq!(fields.field::<u32>(&mut read).unwrap(), 0);
        assert_eq!(fields.field::<u32>(&mut read).unwrap(), 3);
        fields.finish(&mut read).unwrap();
    }

    #[test]
    fn all_fields_omitted_encodes_list0() {
        let absent: Option<u32> = None;
        let mut buf = Buffer::new();
        encode_composite(
            &mut buf,
            0x24,
            &[EncodeField {
                value: &absent,
                omit: true,
            }],
        )
        .unwrap();
        assert_eq!(buf.unread(), &[0x00, 0x53, 0x24, 0x45]);
    }

    #[test]
    fn missing_mandatory_field_is_an_error() {
        let mut buf = Buffer::from(&[0x00, 0x53, 0x12, 0x45][..]);
        let mut fields = CompositeFields::read_described(&mut buf, 0x12, "attach").unwrap();
        assert!(matches!(
            fields.mandatory::<String>(&mut buf, "name"),
            Err(Error::MalformedComposite("name"))
        ));
    }

    #[test]
    fn peeks_descriptor_without_consuming() {
        assert_eq!(peek_descriptor_code(&[0x00, 0x53, 0x14, 0x45]).unwrap(), 0x14);
        assert_eq!(peek_descriptor_code(&[0x00, 0x44]).unwrap(), 0);
        assert_eq!(
            peek_descriptor_code(&[0x00, 0x80, 0, 0, 0, 0, 0, 0, 0, 0x75]).unwrap(),
            0x75
        );
        assert!(peek_descriptor_code(&[0x00]).is_err());
        assert!(peek_descriptor_code(&[0x40, 0x40]).is_err());
    }
}
