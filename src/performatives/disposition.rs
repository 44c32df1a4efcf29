use crate::buffer::Buffer;
use crate::codec::composite::{encode_composite, expect_descriptor, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode};
use crate::definitions::{DeliveryNumber, Role};
use crate::messaging::DeliveryState;

/// 2.7.6 Disposition. Communicates delivery state for a contiguous range of
/// delivery-ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disposition {
    pub role: Role,
    pub first: DeliveryNumber,
    pub last: Option<DeliveryNumber>,
    pub settled: bool,
    pub state: Option<DeliveryState>,
    pub batchable: bool,
}

impl Disposition {
    pub const CODE: u64 = 0x15;

    /// The inclusive range of delivery ids this disposition names.
    pub fn range(&self) -> std::ops::RangeInclusive<DeliveryNumber> {
        self.first..=self.last.unwrap_or(self.first)
    }
}

impl Encode for Disposition {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[
                EncodeField {
                    value: &self.role,
                    omit: false,
                },
                EncodeField {
                    value: &self.first,
                    omit: false,
                },
                EncodeField {
                    value: &self.last,
                    omit: self.last.is_none(),
                },
                EncodeField {
                    value: &self.settled,
                    omit: !self.settled,
                },
                EncodeField {
                    value: &self.state,
                    omit: self.state.is_none(),
                },
                EncodeField {
                    value: &self.batchable,
                    omit: !self.batchable,
                },
            ],
        )
    }
}

impl Disposition {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let disposition = Self {
            role: fields.mandatory(buf, "role")?,
            first: fields.mandatory(buf, "first")?,
            last: fields.field(buf)?,
            settled: fields.field(buf)?,
            state: fields.field(buf)?,
            batchable: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(disposition)
    }
}

impl Decode for Disposition {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "disposition")?;
        Self::decode_body(buf)
    }
}
