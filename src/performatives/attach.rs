use crate::buffer::Buffer;
use crate::codec::composite::{encode_composite, expect_descriptor, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode, Value};
use crate::definitions::{
    DeliveryTag, Fields, Handle, ReceiverSettleMode, Role, SenderSettleMode, SequenceNo,
};
use crate::messaging::{Source, Target};
use crate::primitives::Symbol;

/// 2.7.3 Attach. Attaches a link to a session.
///
/// <type name="attach" class="composite" source="list" provides="frame">
///     <descriptor name="amqp:attach:list" code="0x00000000:0x00000012"/>
///     <field name="name" type="string" mandatory="true"/>
///     <field name="handle" type="handle" mandatory="true"/>
///     <field name="role" type="role" mandatory="true"/>
///     <field name="snd-settle-mode" type="sender-settle-mode" default="mixed"/>
///     <field name="rcv-settle-mode" type="receiver-settle-mode" default="first"/>
///     <field name="source" type="*" requires="source"/>
///     <field name="target" type="*" requires="target"/>
///     <field name="unsettled" type="map"/>
///     <field name="incomplete-unsettled" type="boolean" default="false"/>
///     <field name="initial-delivery-count" type="sequence-no"/>
///     <field name="max-message-size" type="ulong"/>
///     <field name="offered-capabilities" type="symbol" multiple="true"/>
///     <field name="desired-capabilities" type="symbol" multiple="true"/>
///     <field name="properties" type="fields"/>
/// </type>
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attach {
    pub name: String,
    pub handle: Handle,
    pub role: Role,
    pub snd_settle_mode: SenderSettleMode,
    pub rcv_settle_mode: ReceiverSettleMode,
    pub source: Option<Source>,
    pub target: Option<Target>,
    pub unsettled: Option<Vec<(DeliveryTag, Value)>>,
    pub incomplete_unsettled: bool,
    /// MUST NOT be null if role is sender; ignored for receivers.
    pub initial_delivery_count: Option<SequenceNo>,
    pub max_message_size: Option<u64>,
    pub offered_capabilities: Option<Vec<Symbol>>,
    pub desired_capabilities: Option<Vec<Symbol>>,
    pub properties: Option<Fields>,
}

impl Attach {
    pub const CODE: u64 = 0x12;
}

impl Encode for Attach {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[
                EncodeField {
                    value: &self.name,
                    omit: false,
                },
                EncodeField {
                    value: &self.handle,
                    omit: false,
                },
                EncodeField {
                    value: &self.role,
                    omit: false,
                },
                EncodeField {
                    value: &self.snd_settle_mode,
                    omit: self.snd_settle_mode == SenderSettleMode::Mixed,
                },
                EncodeField {
                    value: &self.rcv_settle_mode,
                    omit: self.rcv_settle_mode == ReceiverSettleMode::First,
                },
                EncodeField {
                    value: &self.source,
                    omit: self.source.is_none(),
                },
                EncodeField {
                    value: &self.target,
                    omit: self.target.is_none(),
                },
                EncodeField {
                    value: &self.unsettled,
                    omit: self.unsettled.is_none(),
                },
                EncodeField {
                    value: &self.incomplete_unsettled,
                    omit: !self.incomplete_unsettled,
                },
                EncodeField {
                    value: &self.initial_delivery_count,
                    omit: self.initial_delivery_count.is_none(),
                },
                EncodeField {
                    value: &self.max_message_size,
                    omit: self.max_message_size.is_none(),
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

impl Attach {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let attach = Self {
            name: fields.mandatory(buf, "name")?,
            handle: fields.mandatory(buf, "handle")?,
            role: fields.mandatory(buf, "role")?,
            snd_settle_mode: fields.field(buf)?,
            rcv_settle_mode: fields.field(buf)?,
            source: decode_terminus(&mut fields, buf, Source::decode_body)?,
            target: decode_terminus(&mut fields, buf, Target::decode_body)?,
            unsettled: fields.field(buf)?,
            incomplete_unsettled: fields.field(buf)?,
            initial_delivery_count: fields.field(buf)?,
            max_message_size: fields.field(buf)?,
            offered_capabilities: fields.field(buf)?,
            desired_capabilities: fields.field(buf)?,
            properties: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(attach)
    }
}

/// Source and target arrive as described types; decode them through their
/// own descriptors so a null (absent terminus) stays `None`.
fn decode_terminus<T>(
    fields: &mut CompositeFields,
    buf: &mut Buffer,
    decode_body: impl FnOnce(&mut Buffer) -> Result<T, codec::Error>,
) -> Result<Option<T>, codec::Error>
where
    T: DescribedTerminus,
{
    let value: Option<DescribedSlot> = fields.field(buf)?;
    match value {
        None => Ok(None),
        Some(slot) => {
            if slot.code != T::CODE {
                return Err(codec::Error::UnexpectedDescriptor {
                    found: slot.code,
                    expecting: T::EXPECTING,
                });
            }
            decode_body(buf).map(Some)
        }
    }
}

pub(crate) trait DescribedTerminus {
    const CODE: u64;
    const EXPECTING: &'static str;
}

impl DescribedTerminus for Source {
    const CODE: u64 = Source::CODE;
    const EXPECTING: &'static str = "source";
}

impl DescribedTerminus for Target {
    const CODE: u64 = Target::CODE;
    const EXPECTING: &'static str = "target";
}

/// Reads just the descriptor of a described field, leaving the body for the
/// terminus decoder.
struct DescribedSlot {
    code: u64,
}

impl Decode for DescribedSlot {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        crate::codec::composite::decode_descriptor(buf).map(|code| DescribedSlot { code })
    }
}

impl Decode for Attach {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "attach")?;
        Self::decode_body(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_round_trip() {
        let attach = Attach {
            name: "sender-1".to_string(),
            handle: 0,
            role: Role::Sender,
            snd_settle_mode: SenderSettleMode::Unsettled,
            source: Some(Source::default()),
            target: Some(Target::new("q1")),
            initial_delivery_count: Some(0),
            max_message_size: Some(1024 * 1024),
            ..Default::default()
        };
        let mut buf = Buffer::new();
        attach.encode(&mut buf).unwrap();
        assert_eq!(Attach::decode(&mut buf).unwrap(), attach);
    }

    #[test]
    fn absent_termini_stay_absent() {
        let attach = Attach {
            name: "n".to_string(),
            handle: 9,
            role: Role::Receiver,
            ..Default::default()
        };
        let mut buf = Buffer::new();
        attach.encode(&mut buf).unwrap();
        let decoded = Attach::decode(&mut buf).unwrap();
        assert_eq!(decoded.source, None);
        assert_eq!(decoded.target, None);
        assert_eq!(decoded.snd_settle_mode, SenderSettleMode::Mixed);
        assert_eq!(decoded.rcv_settle_mode, ReceiverSettleMode::First);
    }
}
