use crate::buffer::Buffer;
use crate::codec::composite::{encode_composite, expect_descriptor, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode};
use crate::definitions::{Fields, Handle, TransferNumber};
use crate::primitives::Symbol;

/// 2.7.2 Begin. Starts a session on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Begin {
    /// Set on the reply to name the channel the initiator used.
    pub remote_channel: Option<u16>,
    pub next_outgoing_id: TransferNumber,
    pub incoming_window: u32,
    pub outgoing_window: u32,
    pub handle_max: Handle,
    pub offered_capabilities: Option<Vec<Symbol>>,
    pub desired_capabilities: Option<Vec<Symbol>>,
    pub properties: Option<Fields>,
}

impl Default for Begin {
    fn default() -> Self {
        Self {
            remote_channel: None,
            next_outgoing_id: 0,
            incoming_window: 0,
            outgoing_window: 0,
            handle_max: u32::MAX,
            offered_capabilities: None,
            desired_capabilities: None,
            properties: None,
        }
    }
}

impl Begin {
    pub const CODE: u64 = 0x11;
}

impl Encode for Begin {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[
                EncodeField {
                    value: &self.remote_channel,
                    omit: self.remote_channel.is_none(),
                },
                EncodeField {
                    value: &self.next_outgoing_id,
                    omit: false,
                },
                EncodeField {
                    value: &self.incoming_window,
                    omit: false,
                },
                EncodeField {
                    value: &self.outgoing_window,
                    omit: false,
                },
                EncodeField {
                    value: &self.handle_max,
                    omit: self.handle_max == u32::MAX,
                },
                EncodeField {
                    value: &self.offered_capabilities,
                    omit: self.offered_capabilities.is_none(),
                },
                EncodeField {
                    value: &self.desired_capabilities,
                    omit: self.desired_capabilities.is_none(),
                },
                EncodeField {
                    value: &self.properties,
                    omit: self.properties.is_none(),
                },
            ],
        )
    }
}

impl Begin {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let begin = Self {
            remote_channel: fields.field(buf)?,
            next_outgoing_id: fields.mandatory(buf, "next-outgoing-id")?,
            incoming_window: fields.mandatory(buf, "incoming-window")?,
            outgoing_window: fields.mandatory(buf, "outgoing-window")?,
            handle_max: fields.field::<Option<u32>>(buf)?.unwrap_or(u32::MAX),
            offered_capabilities: fields.field(buf)?,
            desired_capabilities: fields.field(buf)?,
            properties: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(begin)
    }
}

impl Decode for Begin {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "begin")?;
        Self::decode_body(buf)
    }
}
