use crate::buffer::Buffer;
use crate::codec::composite::{encode_composite, expect_descriptor, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode};
use crate::definitions;

/// 2.7.9 Close. Closes the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Close {
    pub error: Option<definitions::Error>,
}

impl Close {
    pub const CODE: u64 = 0x18;
}

impl Encode for Close {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[EncodeField {
                value: &self.error,
                omit: self.error.is_none(),
            }],
        )
    }
}

impl Close {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let close = Self {
            error: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(close)
    }
}

impl Decode for Close {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "close")?;
        Self::decode_body(buf)
    }
}
