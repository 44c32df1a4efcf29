//! The dynamic AMQP value model.
//!
//! Every dynamically-typed spot in the protocol (annotation values, filter
//! sets, application properties, described extension types) is represented by
//! [`Value`], a tagged variant with one constructor per AMQP type. Encoding
//! always picks the smallest wire form that fits; decoding maps every wire
//! form back to its canonical variant, so `decode(encode(v)) == v` for every
//! supported value.

use ordered_float::OrderedFloat;

use crate::buffer::Buffer;
use crate::codec::format_code::FormatCode;
use crate::codec::Error;
use crate::primitives::{Binary, Symbol, Timestamp, Uuid};

/// A dynamically-typed AMQP value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Ubyte(u8),
    Ushort(u16),
    Uint(u32),
    Ulong(u64),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(OrderedFloat<f32>),
    Double(OrderedFloat<f64>),
    Char(char),
    Timestamp(Timestamp),
    Uuid(Uuid),
    Binary(Binary),
    String(String),
    Symbol(Symbol),
    /// A polymorphic list; elements carry their own constructors.
    List(Vec<Value>),
    /// Key/value pairs in insertion order. Re-encoding preserves the order.
    Map(Vec<(Value, Value)>),
    /// A monomorphic sequence sharing a single element constructor.
    Array(Vec<Value>),
    Described(Box<Described>),
}

/// A value paired with the descriptor identifying its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Described {
    pub descriptor: Value,
    pub value: Value,
}

impl Value {
    pub fn described(descriptor: impl Into<Value>, value: impl Into<Value>) -> Self {
        Value::Described(Box::new(Described {
            descriptor: descriptor.into(),
            value: value.into(),
        }))
    }

    /// Map keys are restricted to scalar types.
    fn is_valid_map_key(&self) -> bool {
        !matches!(
            self,
            Value::List(_) | Value::Map(_) | Value::Array(_) | Value::Described(_)
        )
    }

    pub fn encode(&self, buf: &mut Buffer) -> Result<(), Error> {
        match self {
            Value::Null => {
                encode_null(buf);
                Ok(())
            }
            Value::Bool(v) => {
                encode_bool(buf, *v);
                Ok(())
            }
            Value::Ubyte(v) => {
                encode_ubyte(buf, *v);
                Ok(())
            }
            Value::Ushort(v) => {
                encode_ushort(buf, *v);
                Ok(())
            }
            Value::Uint(v) => {
                encode_uint(buf, *v);
                Ok(())
            }
            Value::Ulong(v) => {
                encode_ulong(buf, *v);
                Ok(())
            }
            Value::Byte(v) => {
                encode_byte(buf, *v);
                Ok(())
            }
            Value::Short(v) => {
                encode_short(buf, *v);
                Ok(())
            }
            Value::Int(v) => {
                encode_int(buf, *v);
                Ok(())
            }
            Value::Long(v) => {
                encode_long(buf, *v);
                Ok(())
            }
            Value::Float(v) => {
                encode_float(buf, v.into_inner());
                Ok(())
            }
            Value::Double(v) => {
                encode_double(buf, v.into_inner());
                Ok(())
            }
            Value::Char(v) => {
                encode_char(buf, *v);
                Ok(())
            }
            Value::Timestamp(v) => {
                encode_timestamp(buf, *v);
                Ok(())
            }
            Value::Uuid(v) => {
                encode_uuid(buf, v);
                Ok(())
            }
            Value::Binary(v) => {
                encode_binary(buf, v);
                Ok(())
            }
            Value::String(v) => {
                encode_string(buf, v);
                Ok(())
            }
            Value::Symbol(v) => {
                encode_symbol(buf, v);
                Ok(())
            }
            Value::List(elements) => encode_list(buf, elements),
            Value::Map(pairs) => encode_map(buf, pairs),
            Value::Array(elements) => encode_array(buf, elements),
            Value::Described(described) => {
                buf.append_u8(FormatCode::Described as u8);
                described.descriptor.encode(buf)?;
                described.value.encode(buf)
            }
        }
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self, Error> {
        let code = read_format_code(buf)?;
        Self::decode_with_code(code, buf)
    }

    fn decode_with_code(code: FormatCode, buf: &mut Buffer) -> Result<Self, Error> {
        let value = match code {
            FormatCode::Described => {
                let descriptor = Value::decode(buf)?;
                let value = Value::decode(buf)?;
                Value::Described(Box::new(Described { descriptor, value }))
            }
            FormatCode::Null => Value::Null,
            FormatCode::Boolean => Value::Bool(buf.read_u8()? != 0),
            FormatCode::BooleanTrue => Value::Bool(true),
            FormatCode::BooleanFalse => Value::Bool(false),
            FormatCode::Ubyte => Value::Ubyte(buf.read_u8()?),
            FormatCode::Ushort => Value::Ushort(buf.read_u16()?),
            FormatCode::Uint => Value::Uint(buf.read_u32()?),
            FormatCode::SmallUint => Value::Uint(buf.read_u8()? as u32),
            FormatCode::Uint0 => Value::Uint(0),
            FormatCode::Ulong => Value::Ulong(buf.read_u64()?),
            FormatCode::SmallUlong => Value::Ulong(buf.read_u8()? as u64),
            FormatCode::Ulong0 => Value::Ulong(0),
            FormatCode::Byte => Value::Byte(buf.read_u8()? as i8),
            FormatCode::Short => Value::Short(buf.read_u16()? as i16),
            FormatCode::Int => Value::Int(buf.read_u32()? as i32),
            FormatCode::SmallInt => Value::Int(buf.read_u8()? as i8 as i32),
            FormatCode::Long => Value::Long(buf.read_u64()? as i64),
            FormatCode::SmallLong => Value::Long(buf.read_u8()? as i8 as i64),
            FormatCode::Float => Value::Float(OrderedFloat(f32::from_bits(buf.read_u32()?))),
            FormatCode::Double => Value::Double(OrderedFloat(f64::from_bits(buf.read_u64()?))),
            FormatCode::Char => {
                let bits = buf.read_u32()?;
                Value::Char(char::from_u32(bits).ok_or(Error::InvalidChar(bits))?)
            }
            FormatCode::Timestamp => Value::Timestamp(Timestamp(buf.read_u64()? as i64)),
            FormatCode::Uuid => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(buf.next(16)?);
                Value::Uuid(Uuid(bytes))
            }
            FormatCode::Vbin8 => {
                let len = buf.read_u8()? as usize;
                Value::Binary(buf.read_bytes(len)?)
            }
            FormatCode::Vbin32 => {
                let len = buf.read_u32()? as usize;
                Value::Binary(buf.read_bytes(len)?)
            }
            FormatCode::Str8 | FormatCode::Str32 => {
                let len = if code == FormatCode::Str8 {
                    buf.read_u8()? as usize
                } else {
                    buf.read_u32()? as usize
                };
                Value::String(read_utf8(buf, len)?)
            }
            FormatCode::Sym8 | FormatCode::Sym32 => {
                let len = if code == FormatCode::Sym8 {
                    buf.read_u8()? as usize
                } else {
                    buf.read_u32()? as usize
                };
                Value::Symbol(Symbol(read_utf8(buf, len)?))
            }
            FormatCode::List0 => Value::List(Vec::new()),
            FormatCode::List8 | FormatCode::List32 => {
                let (_, count) = read_compound_header(buf, code == FormatCode::List32)?;
                let mut elements = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    elements.push(Value::decode(buf)?);
                }
                Value::List(elements)
            }
            FormatCode::Map8 | FormatCode::Map32 => {
                let (_, count) = read_compound_header(buf, code == FormatCode::Map32)?;
                if count % 2 != 0 {
                    return Err(Error::InvalidLength);
                }
                let mut pairs = Vec::with_capacity((count / 2).min(64));
                for _ in 0..count / 2 {
                    let key = Value::decode(buf)?;
                    let value = Value::decode(buf)?;
                    pairs.push((key, value));
                }
                Value::Map(pairs)
            }
            FormatCode::Array8 | FormatCode::Array32 => {
                let (_, count) = read_compound_header(buf, code == FormatCode::Array32)?;
                let constructor = read_format_code(buf)?;
                let mut elements = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    elements.push(Value::decode_with_code(constructor, buf)?);
                }
                Value::Array(elements)
            }
            FormatCode::Decimal32 | FormatCode::Decimal64 | FormatCode::Decimal128 => {
                return Err(Error::UnexpectedFormatCode {
                    code,
                    expecting: "a supported value",
                })
            }
        };
        Ok(value)
    }
}

pub(crate) fn read_format_code(buf: &mut Buffer) -> Result<FormatCode, Error> {
    FormatCode::try_from(buf.read_u8()?)
}

/// Consumes a null constructor if one is next.
pub(crate) fn try_read_null(buf: &mut Buffer) -> bool {
    if buf.peek() == Some(FormatCode::Null as u8) {
        let _ = buf.skip(1);
        true
    } else {
        false
    }
}

fn read_utf8(buf: &mut Buffer, len: usize) -> Result<String, Error> {
    let bytes = buf.next(len)?;
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| Error::InvalidUtf8)
}

/// Reads the size/count header shared by list, map, and array encodings,
/// returning `(size, count)`.
fn read_compound_header(buf: &mut Buffer, wide: bool) -> Result<(usize, usize), Error> {
    let (size, count) = if wide {
        (buf.read_u32()? as usize, buf.read_u32()? as usize)
    } else {
        (buf.read_u8()? as usize, buf.read_u8()? as usize)
    };
    // size counts the bytes following the size field, count field included
    let count_width = if wide { 4 } else { 1 };
    if size < count_width || size - count_width > buf.remaining() {
        return Err(Error::InvalidLength);
    }
    Ok((size, count))
}

/* ----------------------------- scalar encoders ---------------------------- */

pub(crate) fn encode_null(buf: &mut Buffer) {
    buf.append_u8(FormatCode::Null as u8);
}

pub(crate) fn encode_bool(buf: &mut Buffer, value: bool) {
    let code = if value {
        FormatCode::BooleanTrue
    } else {
        FormatCode::BooleanFalse
    };
    buf.append_u8(code as u8);
}

pub(crate) fn encode_ubyte(buf: &mut Buffer, value: u8) {
    buf.append_u8(FormatCode::Ubyte as u8);
    buf.append_u8(value);
}

pub(crate) fn encode_ushort(buf: &mut Buffer, value: u16) {
    buf.append_u8(FormatCode::Ushort as u8);
    buf.append_u16(value);
}

pub(crate) fn encode_uint(buf: &mut Buffer, value: u32) {
    if value == 0 {
        buf.append_u8(FormatCode::Uint0 as u8);
    } else if value <= u8::MAX as u32 {
        buf.append_u8(FormatCode::SmallUint as u8);
        buf.append_u8(value as u8);
    } else {
        buf.append_u8(FormatCode::Uint as u8);
        buf.append_u32(value);
    }
}

pub(crate) fn encode_ulong(buf: &mut Buffer, value: u64) {
    if value == 0 {
        buf.append_u8(FormatCode::Ulong0 as u8);
    } else if value <= u8::MAX as u64 {
        buf.append_u8(FormatCode::SmallUlong as u8);
        buf.append_u8(value as u8);
    } else {
        buf.append_u8(FormatCode::Ulong as u8);
        buf.append_u64(value);
    }
}

pub(crate) fn encode_byte(buf: &mut Buffer, value: i8) {
    buf.append_u8(FormatCode::Byte as u8);
    buf.append_u8(value as u8);
}

pub(crate) fn encode_short(buf: &mut Buffer, value: i16) {
    buf.append_u8(FormatCode::Short as u8);
    buf.append_u16(value as u16);
}

pub(crate) fn encode_int(buf: &mut Buffer, value: i32) {
    if (i8::MIN as i32..=i8::MAX as i32).contains(&value) {
        buf.append_u8(FormatCode::SmallInt as u8);
        buf.append_u8(value as i8 as u8);
    } else {
        buf.append_u8(FormatCode::Int as u8);
        buf.append_u32(value as u32);
    }
}

pub(crate) fn encode_long(buf: &mut Buffer, value: i64) {
    if (i8::MIN as i64..=i8::MAX as i64).contains(&value) {
        buf.append_u8(FormatCode::SmallLong as u8);
        buf.append_u8(value as i8 as u8);
    } else {
        buf.append_u8(FormatCode::Long as u8);
        buf.append_u64(value as u64);
    }
}

pub(crate) fn encode_float(buf: &mut Buffer, value: f32) {
    buf.append_u8(FormatCode::Float as u8);
    buf.append_u32(value.to_bits());
}

pub(crate) fn encode_double(buf: &mut Buffer, value: f64) {
    buf.append_u8(FormatCode::Double as u8);
    buf.append_u64(value.to_bits());
}

pub(crate) fn encode_char(buf: &mut Buffer, value: char) {
    buf.append_u8(FormatCode::Char as u8);
    buf.append_u32(value as u32);
}

pub(crate) fn encode_timestamp(buf: &mut Buffer, value: Timestamp) {
    buf.append_u8(FormatCode::Timestamp as u8);
    buf.append_u64(value.0 as u64);
}

pub(crate) fn encode_uuid(buf: &mut Buffer, value: &Uuid) {
    buf.append_u8(FormatCode::Uuid as u8);
    buf.append(&value.0);
}

pub(crate) fn encode_binary(buf: &mut Buffer, value: &[u8]) {
    if value.len() <= u8::MAX as usize {
        buf.append_u8(FormatCode::Vbin8 as u8);
        buf.append_u8(value.len() as u8);
    } else {
        buf.append_u8(FormatCode::Vbin32 as u8);
        buf.append_u32(value.len() as u32);
    }
    buf.append(value);
}

pub(crate) fn encode_string(buf: &mut Buffer, value: &str) {
    if value.len() <= u8::MAX as usize {
        buf.append_u8(FormatCode::Str8 as u8);
        buf.append_u8(value.len() as u8);
    } else {
        buf.append_u8(FormatCode::Str32 as u8);
        buf.append_u32(value.len() as u32);
    }
    buf.append_string(value);
}

pub(crate) fn encode_symbol(buf: &mut Buffer, value: &Symbol) {
    let bytes = value.as_str().as_bytes();
    if bytes.len() <= u8::MAX as usize {
        buf.append_u8(FormatCode::Sym8 as u8);
        buf.append_u8(bytes.len() as u8);
    } else {
        buf.append_u8(FormatCode::Sym32 as u8);
        buf.append_u32(bytes.len() as u32);
    }
    buf.append(bytes);
}

/* ---------------------------- compound encoders ---------------------------- */

/// Writes the size/count header for a compound encoding whose payload was
/// staged in `scratch`, then the payload itself.
pub(crate) fn append_compound(
    buf: &mut Buffer,
    narrow_code: FormatCode,
    wide_code: FormatCode,
    count: usize,
    scratch: Buffer,
) {
    let payload = scratch.into_bytes();
    if count <= u8::MAX as usize && payload.len() + 1 <= u8::MAX as usize {
        buf.append_u8(narrow_code as u8);
        buf.append_u8((payload.len() + 1) as u8);
        buf.append_u8(count as u8);
    } else {
        buf.append_u8(wide_code as u8);
        buf.append_u32((payload.len() + 4) as u32);
        buf.append_u32(count as u32);
    }
    buf.append(&payload);
}

pub(crate) fn encode_list(buf: &mut Buffer, elements: &[Value]) -> Result<(), Error> {
    if elements.is_empty() {
        buf.append_u8(FormatCode::List0 as u8);
        return Ok(());
    }
    let mut scratch = Buffer::new();
    for element in elements {
        element.encode(&mut scratch)?;
    }
    append_compound(
        buf,
        FormatCode::List8,
        FormatCode::List32,
        elements.len(),
        scratch,
    );
    Ok(())
}

pub(crate) fn encode_map(buf: &mut Buffer, pairs: &[(Value, Value)]) -> Result<(), Error> {
    let mut scratch = Buffer::new();
    for (key, value) in pairs {
        if !key.is_valid_map_key() {
            return Err(Error::InvalidMapKey);
        }
        key.encode(&mut scratch)?;
        value.encode(&mut scratch)?;
    }
    append_compound(
        buf,
        FormatCode::Map8,
        FormatCode::Map32,
        pairs.len() * 2,
        scratch,
    );
    Ok(())
}

/// Encodes a monomorphic array. All elements share one constructor, chosen as
/// the smallest form that fits every element.
pub(crate) fn encode_array(buf: &mut Buffer, elements: &[Value]) -> Result<(), Error> {
    let mut scratch = Buffer::new();
    if elements.is_empty() {
        scratch.append_u8(FormatCode::Null as u8);
        append_compound(buf, FormatCode::Array8, FormatCode::Array32, 0, scratch);
        return Ok(());
    }

    match &elements[0] {
        Value::Bool(_) => {
            scratch.append_u8(FormatCode::Boolean as u8);
            for element in elements {
                match element {
                    Value::Bool(v) => scratch.append_u8(*v as u8),
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
        }
        Value::Ubyte(_) => {
            scratch.append_u8(FormatCode::Ubyte as u8);
            for element in elements {
                match element {
                    Value::Ubyte(v) => scratch.append_u8(*v),
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
        }
        Value::Ushort(_) => {
            scratch.append_u8(FormatCode::Ushort as u8);
            for element in elements {
                match element {
                    Value::Ushort(v) => scratch.append_u16(*v),
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
        }
        Value::Uint(_) => {
            let mut small = true;
            for element in elements {
                match element {
                    Value::Uint(v) => small &= *v <= u8::MAX as u32,
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
            let code = if small {
                FormatCode::SmallUint
            } else {
                FormatCode::Uint
            };
            scratch.append_u8(code as u8);
            for element in elements {
                if let Value::Uint(v) = element {
                    if small {
                        scratch.append_u8(*v as u8);
                    } else {
                        scratch.append_u32(*v);
                    }
                }
            }
        }
        Value::Ulong(_) => {
            let mut small = true;
            for element in elements {
                match element {
                    Value::Ulong(v) => small &= *v <= u8::MAX as u64,
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
            let code = if small {
                FormatCode::SmallUlong
            } else {
                FormatCode::Ulong
            };
            scratch.append_u8(code as u8);
            for element in elements {
                if let Value::Ulong(v) = element {
                    if small {
                        scratch.append_u8(*v as u8);
                    } else {
                        scratch.append_u64(*v);
                    }
                }
            }
        }
        Value::Byte(_) => {
            scratch.append_u8(FormatCode::Byte as u8);
            for element in elements {
                match element {
                    Value::Byte(v) => scratch.append_u8(*v as u8),
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
        }
        Value::Short(_) => {
            scratch.append_u8(FormatCode::Short as u8);
            for element in elements {
                match element {
                    Value::Short(v) => scratch.append_u16(*v as u16),
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
        }
        Value::Int(_) => {
            let mut small = true;
            for element in elements {
                match element {
                    Value::Int(v) => small &= (i8::MIN as i32..=i8::MAX as i32).contains(v),
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
            let code = if small {
                FormatCode::SmallInt
            } else {
                FormatCode::Int
            };
            scratch.append_u8(code as u8);
            for element in elements {
                if let Value::Int(v) = element {
                    if small {
                        scratch.append_u8(*v as i8 as u8);
                    } else {
                        scratch.append_u32(*v as u32);
                    }
                }
            }
        }
        Value::Long(_) => {
            let mut small = true;
            for element in elements {
                match element {
                    Value::Long(v) => small &= (i8::MIN as i64..=i8::MAX as i64).contains(v),
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
            let code = if small {
                FormatCode::SmallLong
            } else {
                FormatCode::Long
            };
            scratch.append_u8(code as u8);
            for element in elements {
                if let Value::Long(v) = element {
                    if small {
                        scratch.append_u8(*v as i8 as u8);
                    } else {
                        scratch.append_u64(*v as u64);
                    }
                }
            }
        }
        Value::Float(_) => {
            scratch.append_u8(FormatCode::Float as u8);
            for element in elements {
                match element {
                    Value::Float(v) => scratch.append_u32(v.into_inner().to_bits()),
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
        }
        Value::Double(_) => {
            scratch.append_u8(FormatCode::Double as u8);
            for element in elements {
                match element {
                    Value::Double(v) => scratch.append_u64(v.into_inner().to_bits()),
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
        }
        Value::Timestamp(_) => {
            scratch.append_u8(FormatCode::Timestamp as u8);
            for element in elements {
                match element {
                    Value::Timestamp(v) => scratch.append_u64(v.0 as u64),
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
        }
        Value::Uuid(_) => {
            scratch.append_u8(FormatCode::Uuid as u8);
            for element in elements {
                match element {
                    Value::Uuid(v) => scratch.append(&v.0),
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
        }
        Value::Binary(_) => {
            let mut narrow = true;
            for element in elements {
                match element {
                    Value::Binary(v) => narrow &= v.len() <= u8::MAX as usize,
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
            let code = if narrow {
                FormatCode::Vbin8
            } else {
                FormatCode::Vbin32
            };
            scratch.append_u8(code as u8);
            for element in elements {
                if let Value::Binary(v) = element {
                    if narrow {
                        scratch.append_u8(v.len() as u8);
                    } else {
                        scratch.append_u32(v.len() as u32);
                    }
                    scratch.append(v);
                }
            }
        }
        Value::String(_) => {
            let mut narrow = true;
            for element in elements {
                match element {
                    Value::String(v) => narrow &= v.len() <= u8::MAX as usize,
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
            let code = if narrow {
                FormatCode::Str8
            } else {
                FormatCode::Str32
            };
            scratch.append_u8(code as u8);
            for element in elements {
                if let Value::String(v) = element {
                    if narrow {
                        scratch.append_u8(v.len() as u8);
                    } else {
                        scratch.append_u32(v.len() as u32);
                    }
                    scratch.append_string(v);
                }
            }
        }
        Value::Symbol(_) => {
            let mut narrow = true;
            for element in elements {
                match element {
                    Value::Symbol(v) => narrow &= v.as_str().len() <= u8::MAX as usize,
                    _ => return Err(Error::UnsupportedArrayElement),
                }
            }
            let code = if narrow {
                FormatCode::Sym8
            } else {
                FormatCode::Sym32
            };
            scratch.append_u8(code as u8);
            for element in elements {
                if let Value::Symbol(v) = element {
                    if narrow {
                        scratch.append_u8(v.as_str().len() as u8);
                    } else {
                        scratch.append_u32(v.as_str().len() as u32);
                    }
                    scratch.append(v.as_str().as_bytes());
                }
            }
        }
        _ => return Err(Error::UnsupportedArrayElement),
    }

    append_compound(
        buf,
        FormatCode::Array8,
        FormatCode::Array32,
        elements.len(),
        scratch,
    );
    Ok(())
}

/* ------------------------------- conversions ------------------------------ */

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Value::Ubyte(value)
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::Ushort(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Uint(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Ulong(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(OrderedFloat(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(OrderedFloat(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Symbol> for Value {
    fn from(value: Symbol) -> Self {
        Value::Symbol(value)
    }
}

impl From<Timestamp> for Value {
    fn from(value: Timestamp) -> Self {
        Value::Timestamp(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<Binary> for Value {
    fn from(value: Binary) -> Self {
        Value::Binary(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) {
        let mut buf = Buffer::new();
        value.encode(&mut buf).unwrap();
        let decoded = Value::decode(&mut buf).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn scalars_round_trip() {
        round_trip(Value::Null);
        round_trip(Value::Bool(true));
        round_trip(Value::Bool(false));
        round_trip(Value::Ubyte(0x7f));
        round_trip(Value::Ushort(0xbeef));
        round_trip(Value::Uint(0));
        round_trip(Value::Uint(200));
        round_trip(Value::Uint(70_000));
        round_trip(Value::Ulong(0));
        round_trip(Value::Ulong(255));
        round_trip(Value::Ulong(1 << 40));
        round_trip(Value::Byte(-4));
        round_trip(Value::Short(-1000));
        round_trip(Value::Int(-2));
        round_trip(Value::Int(40_000));
        round_trip(Value::Long(-2));
        round_trip(Value::Long(1 << 40));
        round_trip(Value::Float(OrderedFloat(1.5)));
        round_trip(Value::Double(OrderedFloat(-0.25)));
        round_trip(Value::Char('☃'));
        round_trip(Value::Timestamp(Timestamp(1_311_704_463_521)));
        round_trip(Value::Uuid(Uuid([7; 16])));
        round_trip(Value::Binary(Binary::from_static(b"\x00\x01\x02")));
        round_trip(Value::String("quick brown fox".to_string()));
        round_trip(Value::Symbol(Symbol::from("amqp:decode-error")));
    }

    #[test]
    fn long_variable_width_values_round_trip() {
        round_trip(Value::String("x".repeat(300)));
        round_trip(Value::Binary(Binary::from(vec![0xau8; 999])));
    }

    #[test]
    fn compounds_round_trip() {
        round_trip(Value::List(vec![]));
        round_trip(Value::List(vec![
            Value::Uint(1),
            Value::String("two".to_string()),
            Value::Null,
        ]));
        round_trip(Value::Map(vec![
            (Value::Symbol(Symbol::from("a")), Value::Int(1)),
            (Value::Symbol(Symbol::from("b")), Value::Int(2)),
        ]));
        round_trip(Value::Array(vec![
            Value::Uint(1),
            Value::Uint(2),
            Value::Uint(3),
        ]));
        round_trip(Value::Array(vec![
            Value::Symbol(Symbol::from("x")),
            Value::Symbol(Symbol::from("y")),
        ]));
        round_trip(Value::described(
            Value::Ulong(0x28),
            Value::List(vec![Value::String("addr".to_string())]),
        ));
    }

    #[test]
    fn map_preserves_insertion_order() {
        let pairs = vec![
            (Value::Symbol(Symbol::from("zebra")), Value::Uint(1)),
            (Value::Symbol(Symbol::from("apple")), Value::Uint(2)),
            (Value::Symbol(Symbol::from("mango")), Value::Uint(3)),
        ];
        let value = Value::Map(pairs.clone());
        let mut buf = Buffer::new();
        value.encode(&mut buf).unwrap();
        match Value::decode(&mut buf).unwrap() {
            Value::Map(decoded) => assert_eq!(decoded, pairs),
            other => panic!("expected a map, got {other:?}"),
        }
    }

    #[test]
    fn compound_map_key_is_rejected() {
        let value = Value::Map(vec![(Value::List(vec![]), Value::Null)]);
        let mut buf = Buffer::new();
        assert!(matches!(value.encode(&mut buf), Err(Error::InvalidMapKey)));
    }

    #[test]
    fn smallest_form_is_chosen() {
        let mut buf = Buffer::new();
        encode_uint(&mut buf, 0);
        encode_uint(&mut buf, 5);
        encode_uint(&mut buf, 300);
        assert_eq!(
            buf.unread(),
            &[0x43, 0x52, 0x05, 0x70, 0x00, 0x00, 0x01, 0x2c]
        );
    }

    #[test]
    fn array_uses_single_small_constructor() {
        let mut buf = Buffer::new();
        encode_array(
            &mut buf,
            &[Value::Uint(1), Value::Uint(2), Value::Uint(250)],
        )
        .unwrap();
        // array8, size, count, smalluint constructor, then raw payload bytes
        assert_eq!(buf.unread(), &[0xe0, 0x05, 0x03, 0x52, 0x01, 0x02, 0xfa]);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut buf = Buffer::from(&[0xa1, 0x05, b'a'][..]);
        assert!(matches!(Value::decode(&mut buf), Err(Error::Truncated)));
    }
}
