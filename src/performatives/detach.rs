use crate::buffer::Buffer;
use crate::codec::composite::{encode_composite, expect_descriptor, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode};
use crate::definitions::{self, Handle};

/// 2.7.7 Detach. Detaches a link; `closed` tears it down for good.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detach {
    pub handle: Handle,
    pub closed: bool,
    pub error: Option<definitions::Error>,
}

impl Detach {
    pub const CODE: u64 = 0x16;
}

impl Encode for Detach {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[
                EncodeField {
                    value: &self.handle,
                    omit: false,
                },
                EncodeField {
                    value: &self.closed,
                    omit: !self.closed,
                },
                EncodeField {
                    value: &self.error,
                    omit: self.error.is_none(),
                },
            ],
        )
    }
}

impl Detach {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let detach = Self {
            handle: fields.mandatory(buf, "handle")?,
            closed: fields.field(buf)?,
            error: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(detach)
    }
}

impl Decode for Detach {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "detach")?;
        Self::decode_body(buf)
    }
}
