use crate::buffer::Buffer;
use crate::codec::composite::{encode_composite, expect_descriptor, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode};
use crate::definitions::{
    DeliveryNumber, DeliveryTag, Handle, MessageFormat, ReceiverSettleMode,
};
use crate::messaging::DeliveryState;

/// 2.7.5 Transfer. Carries (part of) one delivery.
///
/// Only the first transfer of a delivery carries `delivery_id`,
/// `delivery_tag` and `message_format`; continuation frames repeat the handle
/// and set `more` on all but the last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transfer {
    pub handle: Handle,
    pub delivery_id: Option<DeliveryNumber>,
    pub delivery_tag: Option<DeliveryTag>,
    pub message_format: Option<MessageFormat>,
    pub settled: Option<bool>,
    pub more: bool,
    pub rcv_settle_mode: Option<ReceiverSettleMode>,
    pub state: Option<DeliveryState>,
    pub resume: bool,
    pub aborted: bool,
    pub batchable: bool,
}

impl Transfer {
    pub const CODE: u64 = 0x14;
}

impl Encode for Transfer {
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
                    value: &self.delivery_id,
                    omit: self.delivery_id.is_none(),
                },
                EncodeField {
                    value: &self.delivery_tag,
                    omit: self.delivery_tag.is_none(),
                },
                EncodeField {
                    value: &self.message_format,
                    omit: self.message_format.is_none(),
                },
                EncodeField {
                    value: &self.settled,
                    omit: self.settled.is_none(),
                },
                EncodeField {
                    value: &self.more,
                    omit: !self.more,
                },
                EncodeField {
                    value: &self.rcv_settle_mode,
                    omit: self.rcv_settle_mode.is_none(),
                },
                EncodeField {
                    value: &self.state,
                    omit: self.state.is_none(),
                },
                EncodeField {
                    value: &self.resume,
                    omit: !self.resume,
                },
                EncodeField {
                    value: &self.aborted,
                    omit: !self.aborted,
                },
                EncodeField {
                    value: &self.batchable,
                    omit: !self.batchable,
                },
            ],
        )
    }
}

impl Transfer {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let transfer = Self {
            handle: fields.mandatory(buf, "handle")?,
            delivery_id: fields.field(buf)?,
            delivery_tag: fields.field(buf)?,
            message_format: fields.field(buf)?,
            settled: fields.field(buf)?,
            more: fields.field(buf)?,
            rcv_settle_mode: fields.field(buf)?,
            state: fields.field(buf)?,
            resume: fields.field(buf)?,
            aborted: fields.field(buf)?,
            batchable: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(transfer)
    }
}

impl Decode for Transfer {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "transfer")?;
        Self::decode_body(buf)
    }
}
