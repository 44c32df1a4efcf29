use crate::buffer::Buffer;
use crate::codec::composite::{encode_composite, expect_descriptor, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode};
use crate::definitions;

/// 2.7.8 End. Ends the session on this channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct End {
    pub error: Option<definitions::Error>,
}

impl End {
    pub const CODE: u64 = 0x17;
}

impl Encode for End {
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

impl End {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let end = Self {
            error: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(end)
    }
}

impl Decode for End {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "end")?;
        Self::decode_body(buf)
    }
}
