use crate::buffer::Buffer;
use crate::codec::composite::{encode_composite, expect_descriptor, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode};
use crate::definitions::{Fields, Handle, SequenceNo, TransferNumber};

/// 2.7.4 Flow. Updates session windows and link credit.
///
/// When the handle field is set, the flow also carries link endpoint state;
/// without it the frame only synchronises the session windows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flow {
    pub next_incoming_id: Option<TransferNumber>,
    pub incoming_window: u32,
    pub next_outgoing_id: TransferNumber,
    pub outgoing_window: u32,
    pub handle: Option<Handle>,
    pub delivery_count: Option<SequenceNo>,
    pub link_credit: Option<u32>,
    pub available: Option<u32>,
    pub drain: bool,
    pub echo: bool,
    pub properties: Option<Fields>,
}

impl Flow {
    pub const CODE: u64 = 0x13;
}

impl Encode for Flow {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[
                EncodeField {
                    value: &self.next_incoming_id,
                    omit: self.next_incoming_id.is_none(),
                },
                EncodeField {
                    value: &self.incoming_window,
                    omit: false,
                },
                EncodeField {
                    value: &self.next_outgoing_id,
                    omit: false,
                },
                EncodeField {
                    value: &self.outgoing_window,
                    omit: false,
                },
                EncodeField {
                    value: &self.handle,
                    omit: self.handle.is_none(),
                },
                EncodeField {
                    value: &self.delivery_count,
                    omit: self.delivery_count.is_none(),
                },
                EncodeField {
                    value: &self.link_credit,
                    omit: self.link_credit.is_none(),
                },
                EncodeField {
                    value: &self.available,
                    omit: self.available.is_none(),
                },
                EncodeField {
                    value: &self.drain,
                    omit: !self.drain,
                },
                EncodeField {
                    value: &self.echo,
                    omit: !self.echo,
                },
                EncodeField {
                    value: &self.properties,
                    omit: self.properties.is_none(),
                },
            ],
        )
    }
}

impl Flow {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let flow = Self {
            next_incoming_id: fields.field(buf)?,
            incoming_window: fields.mandatory(buf, "incoming-window")?,
            next_outgoing_id: fields.mandatory(buf, "next-outgoing-id")?,
            outgoing_window: fields.mandatory(buf, "outgoing-window")?,
            handle: fields.field(buf)?,
            delivery_count: fields.field(buf)?,
            link_credit: fields.field(buf)?,
            available: fields.field(buf)?,
            drain: fields.field(buf)?,
            echo: fields.field(buf)?,
            properties: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(flow)
    }
}

impl Decode for Flow {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "flow")?;
        Self::decode_body(buf)
    }
}
