use crate::buffer::Buffer;
use crate::codec::composite::{encode_composite, expect_descriptor, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode};
use crate::definitions::{Fields, Milliseconds};
use crate::primitives::Symbol;

/// 2.7.1 Open. Negotiates connection parameters.
///
/// <type name="open" class="composite" source="list" provides="frame">
///     <descriptor name="amqp:open:list" code="0x00000000:0x00000010"/>
///     <field name="container-id" type="string" mandatory="true"/>
///     <field name="hostname" type="string"/>
///     <field name="max-frame-size" type="uint" default="4294967295"/>
///     <field name="channel-max" type="ushort" default="65535"/>
///     <field name="idle-time-out" type="milliseconds"/>
///     <field name="outgoing-locales" type="ietf-language-tag" multiple="true"/>
///     <field name="incoming-locales" type="ietf-language-tag" multiple="true"/>
///     <field name="offered-capabilities" type="symbol" multiple="true"/>
///     <field name="desired-capabilities" type="symbol" multiple="true"/>
///     <field name="properties" type="fields"/>
/// </type>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Open {
    pub container_id: String,
    pub hostname: Option<String>,
    pub max_frame_size: u32,
    pub channel_max: u16,
    pub idle_time_out: Option<Milliseconds>,
    pub outgoing_locales: Option<Vec<Symbol>>,
    pub incoming_locales: Option<Vec<Symbol>>,
    pub offered_capabilities: Option<Vec<Symbol>>,
    pub desired_capabilities: Option<Vec<Symbol>>,
    pub properties: Option<Fields>,
}

impl Default for Open {
    fn default() -> Self {
        Self {
            container_id: String::new(),
            hostname: None,
            max_frame_size: u32::MAX,
            channel_max: u16::MAX,
            idle_time_out: None,
            outgoing_locales: None,
            incoming_locales: None,
            offered_capabilities: None,
            desired_capabilities: None,
            properties: None,
        }
    }
}

impl Open {
    pub const CODE: u64 = 0x10;
}

impl Encode for Open {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[
                EncodeField {
                    value: &self.container_id,
                    omit: false,
                },
                EncodeField {
                    value: &self.hostname,
                    omit: self.hostname.is_none(),
                },
                EncodeField {
                    value: &self.max_frame_size,
                    omit: self.max_frame_size == u32::MAX,
                },
                EncodeField {
                    value: &self.channel_max,
                    omit: self.channel_max == u16::MAX,
                },
                EncodeField {
                    value: &self.idle_time_out,
                    omit: self.idle_time_out.is_none(),
                },
                EncodeField {
                    value: &self.outgoing_locales,
                    omit: self.outgoing_locales.is_none(),
                },
                EncodeField {
                    value: &self.incoming_locales,
                    omit: self.incoming_locales.is_none(),
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

impl Open {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let open = Self {
            container_id: fields.mandatory(buf, "container-id")?,
            hostname: fields.field(buf)?,
            max_frame_size: fields.field::<Option<u32>>(buf)?.unwrap_or(u32::MAX),
            channel_max: fields.field::<Option<u16>>(buf)?.unwrap_or(u16::MAX),
            idle_time_out: fields.field(buf)?,
            outgoing_locales: fields.field(buf)?,
            incoming_locales: fields.field(buf)?,
            offered_capabilities: fields.field(buf)?,
            desired_capabilities: fields.field(buf)?,
            properties: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(open)
    }
}

impl Decode for Open {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "open")?;
        Self::decode_body(buf)
    }
}
