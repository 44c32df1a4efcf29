//! AMQP 1.0 type encoding and decoding.

pub(crate) mod composite;
mod error;
pub mod format_code;
pub mod value;

pub use error::Error;
pub use format_code::FormatCode;
pub use value::{Described, Value};

use crate::buffer::Buffer;
use crate::primitives::{Binary, Symbol, Timestamp, Uuid};

/// A type with a canonical AMQP encoding.
pub(crate) trait Encode {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error>;
}

/// A type decodable from its AMQP encoding.
pub(crate) trait Decode: Sized {
    fn decode(buf: &mut Buffer) -> Result<Self, Error>;
}

impl Encode for Value {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        Value::encode(self, buf)
    }
}

impl Decode for Value {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        Value::decode(buf)
    }
}

impl Encode for bool {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        value::encode_bool(buf, *self);
        Ok(())
    }
}

impl Decode for bool {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        match value::read_format_code(buf)? {
            FormatCode::BooleanTrue => Ok(true),
            FormatCode::BooleanFalse => Ok(false),
            FormatCode::Boolean => Ok(buf.read_u8()? != 0),
            code => Err(Error::UnexpectedFormatCode {
                code,
                expecting: "boolean",
            }),
        }
    }
}

impl Encode for u8 {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        value::encode_ubyte(buf, *self);
        Ok(())
    }
}

impl Decode for u8 {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        match value::read_format_code(buf)? {
            FormatCode::Ubyte => buf.read_u8(),
            code => Err(Error::UnexpectedFormatCode {
                code,
                expecting: "ubyte",
            }),
        }
    }
}

impl Encode for u16 {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        value::encode_ushort(buf, *self);
        Ok(())
    }
}

impl Decode for u16 {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        match value::read_format_code(buf)? {
            FormatCode::Ushort => buf.read_u16(),
            code => Err(Error::UnexpectedFormatCode {
                code,
                expecting: "ushort",
            }),
        }
    }
}

impl Encode for u32 {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        value::encode_uint(buf, *self);
        Ok(())
    }
}

impl Decode for u32 {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        match value::read_format_code(buf)? {
            FormatCode::Uint0 => Ok(0),
            FormatCode::SmallUint => Ok(buf.read_u8()? as u32),
            FormatCode::Uint => buf.read_u32(),
            code => Err(Error::UnexpectedFormatCode {
                code,
                expecting: "uint",
            }),
        }
    }
}

impl Encode for u64 {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        value::encode_ulong(buf, *self);
        Ok(())
    }
}

impl Decode for u64 {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        match value::read_format_code(buf)? {
            FormatCode::Ulong0 => Ok(0),
            FormatCode::SmallUlong => Ok(buf.read_u8()? as u64),
            FormatCode::Ulong => buf.read_u64(),
            code => Err(Error::UnexpectedFormatCode {
                code,
                expecting: "ulong",
            }),
        }
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        value::encode_string(buf, self);
        Ok(())
    }
}

impl Decode for String {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        match Value::decode(buf)? {
            Value::String(s) => Ok(s),
            _ => Err(Error::UnexpectedFormatCode {
                code: FormatCode::Str8,
                expecting: "string",
            }),
        }
    }
}

impl Encode for Symbol {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        value::encode_symbol(buf, self);
        Ok(())
    }
}

impl Decode for Symbol {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        match Value::decode(buf)? {
            Value::Symbol(s) => Ok(s),
            _ => Err(Error::UnexpectedFormatCode {
                code: FormatCode::Sym8,
                expecting: "symbol",
            }),
        }
    }
}

impl Encode for Binary {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        value::encode_binary(buf, self);
        Ok(())
    }
}

impl Decode for Binary {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        match Value::decode(buf)? {
            Value::Binary(b) => Ok(b),
            _ => Err(Error::UnexpectedFormatCode {
                code: FormatCode::Vbin8,
                expecting: "binary",
            }),
        }
    }
}

impl Encode for Timestamp {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        value::encode_timestamp(buf, *self);
        Ok(())
    }
}

impl Decode for Timestamp {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        match value::read_format_code(buf)? {
            FormatCode::Timestamp => Ok(Timestamp(buf.read_u64()? as i64)),
            code => Err(Error::UnexpectedFormatCode {
                code,
                expecting: "timestamp",
            }),
        }
    }
}

impl Encode for Uuid {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        value::encode_uuid(buf, self);
        Ok(())
    }
}

impl Decode for Uuid {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        match value::read_format_code(buf)? {
            FormatCode::Uuid => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(buf.next(16)?);
                Ok(Uuid(bytes))
            }
            code => Err(Error::UnexpectedFormatCode {
                code,
                expecting: "uuid",
            }),
        }
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        match self {
            Some(inner) => inner.encode(buf),
            None => {
                value::encode_null(buf);
                Ok(())
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        if value::try_read_null(buf) {
            Ok(None)
        } else {
            T::decode(buf).map(Some)
        }
    }
}

/// Fields declared `multiple="true"` are encoded as an array but may arrive
/// as a bare element.
impl Encode for Vec<Symbol> {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        let elements: Vec<Value> = self.iter().cloned().map(Value::Symbol).collect();
        value::encode_array(buf, &elements)
    }
}

impl Decode for Vec<Symbol> {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        match Value::decode(buf)? {
            Value::Symbol(symbol) => Ok(vec![symbol]),
            Value::Array(elements) | Value::List(elements) => elements
                .into_iter()
                .map(|element| match element {
                    Value::Symbol(symbol) => Ok(symbol),
                    _ => Err(Error::UnexpectedFormatCode {
                        code: FormatCode::Sym8,
                        expecting: "symbol array",
                    }),
                })
                .collect(),
            _ => Err(Error::UnexpectedFormatCode {
                code: FormatCode::Sym8,
                expecting: "symbol or symbol array",
            }),
        }
    }
}

fn encode_map_pairs<K: Encode, V: Encode>(buf: &mut Buffer, pairs: &[(K, V)]) -> Result<(), Error> {
    let mut scratch = Buffer::new();
    for (key, val) in pairs {
        key.encode(&mut scratch)?;
        val.encode(&mut scratch)?;
    }
    value::append_compound(
        buf,
        FormatCode::Map8,
        FormatCode::Map32,
        pairs.len() * 2,
        scratch,
    );
    Ok(())
}

fn decode_map_pairs<K: Decode, V: Decode>(buf: &mut Buffer) -> Result<Vec<(K, V)>, Error> {
    let wide = match value::read_format_code(buf)? {
        FormatCode::Map8 => false,
        FormatCode::Map32 => true,
        code => {
            return Err(Error::UnexpectedFormatCode {
                code,
                expecting: "map",
            })
        }
    };
    let (_, count) = if wide {
        (buf.read_u32()? as usize, buf.read_u32()? as usize)
    } else {
        (buf.read_u8()? as usize, buf.read_u8()? as usize)
    };
    if count % 2 != 0 {
        return Err(Error::InvalidLength);
    }
    let mut pairs = Vec::with_capacity((count / 2).min(64));
    for _ in 0..count / 2 {
        let key = K::decode(buf)?;
        let value = V::decode(buf)?;
        pairs.push((key, value));
    }
    Ok(pairs)
}

impl Encode for Vec<(Symbol, Value)> {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        encode_map_pairs(buf, self)
    }
}

impl Decode for Vec<(Symbol, Value)> {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        decode_map_pairs(buf)
    }
}

impl Encode for Vec<(String, Value)> {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        encode_map_pairs(buf, self)
    }
}

impl Decode for Vec<(String, Value)> {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        decode_map_pairs(buf)
    }
}

impl Encode for Vec<(Binary, Value)> {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        encode_map_pairs(buf, self)
    }
}

impl Decode for Vec<(Binary, Value)> {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        decode_map_pairs(buf)
    }
}

impl Encode for Vec<(Value, Value)> {
    fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        value::encode_map(buf, self)
    }
}

impl Decode for Vec<(Value, Value)> {
    fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        decode_map_pairs(buf)
    }
}
