//! The bare message format, 3.2.
//!
//! A message is a sequence of typed sections. Any section may be absent;
//! when present they appear in the order header, delivery-annotations,
//! message-annotations, properties, application-properties, body, footer.

use bytes::Bytes;

use crate::buffer::Buffer;
use crate::codec::composite::{
    decode_descriptor, encode_composite, CompositeFields, EncodeField,
};
use crate::codec::{self, value, Decode, Encode, Value};
use crate::definitions::Milliseconds;
use crate::messaging::Annotations;
use crate::primitives::{Binary, Symbol, Timestamp};

mod section {
    pub const HEADER: u64 = 0x70;
    pub const DELIVERY_ANNOTATIONS: u64 = 0x71;
    pub const MESSAGE_ANNOTATIONS: u64 = 0x72;
    pub const PROPERTIES: u64 = 0x73;
    pub const APPLICATION_PROPERTIES: u64 = 0x74;
    pub const DATA: u64 = 0x75;
    pub const AMQP_SEQUENCE: u64 = 0x76;
    pub const AMQP_VALUE: u64 = 0x77;
    pub const FOOTER: u64 = 0x78;
}

/// 3.2.1 Header. Transport headers for a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub durable: bool,
    pub priority: u8,
    pub ttl: Option<Milliseconds>,
    pub first_acquirer: bool,
    pub delivery_count: u32,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            durable: false,
            priority: 4,
            ttl: None,
            first_acquirer: false,
            delivery_count: 0,
        }
    }
}

impl Header {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            section::HEADER,
            &[
                EncodeField {
                    value: &self.durable,
                    omit: !self.durable,
                },
                EncodeField {
                    value: &self.priority,
                    omit: self.priority == 4,
                },
                EncodeField {
                    value: &self.ttl,
                    omit: self.ttl.is_none(),
                },
                EncodeField {
                    value: &self.first_acquirer,
                    omit: !self.first_acquirer,
                },
                EncodeField {
                    value: &self.delivery_count,
                    omit: self.delivery_count == 0,
                },
            ],
        )
    }

    fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let header = Self {
            durable: fields.field(buf)?,
            priority: fields.field::<Option<u8>>(buf)?.unwrap_or(4),
            ttl: fields.field(buf)?,
            first_acquirer: fields.field(buf)?,
            delivery_count: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(header)
    }
}

/// 3.2.4 Properties. Immutable application properties of the message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    pub message_id: Option<Value>,
    pub user_id: Option<Binary>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub reply_to: Option<String>,
    pub correlation_id: Option<Value>,
    pub content_type: Option<Symbol>,
    pub content_encoding: Option<Symbol>,
    pub absolute_expiry_time: Option<Timestamp>,
    pub creation_time: Option<Timestamp>,
    pub group_id: Option<String>,
    pub group_sequence: Option<u32>,
    pub reply_to_group_id: Option<String>,
}

impl Properties {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            section::PROPERTIES,
            &[
                EncodeField {
                    value: &self.message_id,
                    omit: self.message_id.is_none(),
                },
                EncodeField {
                    value: &self.user_id,
                    omit: self.user_id.is_none(),
                },
                EncodeField {
                    value: &self.to,
                    omit: self.to.is_none(),
                },
                EncodeField {
                    value: &self.subject,
                    omit: self.subject.is_none(),
                },
                EncodeField {
                    value: &self.reply_to,
                    omit: self.reply_to.is_none(),
                },
                EncodeField {
                    value: &self.correlation_id,
                    omit: self.correlation_id.is_none(),
                },
                EncodeField {
                    value: &self.content_type,
                    omit: self.content_type.is_none(),
                },
                EncodeField {
                    value: &self.content_encoding,
                    omit: self.content_encoding.is_none(),
                },
                EncodeField {
                    value: &self.absolute_expiry_time,
                    omit: self.absolute_expiry_time.is_none(),
                },
                EncodeField {
                    value: &self.creation_time,
                    omit: self.creation_time.is_none(),
                },
                EncodeField {
                    value: &self.group_id,
                    omit: self.group_id.is_none(),
                },
                EncodeField {
                    value: &self.group_sequence,
                    omit: self.group_sequence.is_none(),
                },
                EncodeField {
                    value: &self.reply_to_group_id,
                    omit: self.reply_to_group_id.is_none(),
                },
            ],
        )
    }

    fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let properties = Self {
            message_id: fields.field(buf)?,
            user_id: fields.field(buf)?,
            to: fields.field(buf)?,
            subject: fields.field(buf)?,
            reply_to: fields.field(buf)?,
            correlation_id: fields.field(buf)?,
            content_type: fields.field(buf)?,
            content_encoding: fields.field(buf)?,
            absolute_expiry_time: fields.field(buf)?,
            creation_time: fields.field(buf)?,
            group_id: fields.field(buf)?,
            group_sequence: fields.field(buf)?,
            reply_to_group_id: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(properties)
    }
}

/// String-keyed application properties, 3.2.5.
pub type ApplicationProperties = Vec<(String, Value)>;

/// The body of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    /// No body section at all.
    #[default]
    Empty,
    /// One or more `data` sections of opaque binary.
    Data(Vec<Binary>),
    /// A single `amqp-sequence` section.
    Sequence(Vec<Value>),
    /// A single `amqp-value` section.
    Value(Value),
}

/// An annotated message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub header: Option<Header>,
    pub delivery_annotations: Option<Annotations>,
    pub message_annotations: Option<Annotations>,
    pub properties: Option<Properties>,
    pub application_properties: Option<ApplicationProperties>,
    pub body: Body,
    pub footer: Option<Annotations>,
}

impl Message {
    /// A message whose body is a single binary `data` section.
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Self {
            body: Body::Data(vec![payload.into()]),
            ..Default::default()
        }
    }

    /// A message whose body is a single `amqp-value` section.
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            body: Body::Value(value.into()),
            ..Default::default()
        }
    }

    pub fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        if let Some(header) = &self.header {
            header.encode(buf)?;
        }
        if let Some(annotations) = &self.delivery_annotations {
            encode_annotation_section(buf, section::DELIVERY_ANNOTATIONS, annotations)?;
        }
        if let Some(annotations) = &self.message_annotations {
            encode_annotation_section(buf, section::MESSAGE_ANNOTATIONS, annotations)?;
        }
        if let Some(properties) = &self.properties {
            if !properties.is_empty() {
                properties.encode(buf)?;
            }
        }
        if let Some(application_properties) = &self.application_properties {
            buf.append_u8(codec::FormatCode::Described as u8);
            value::encode_ulong(buf, section::APPLICATION_PROPERTIES);
            application_properties.encode(buf)?;
        }
        match &self.body {
            Body::Empty => {}
            Body::Data(chunks) => {
                for chunk in chunks {
                    buf.append_u8(codec::FormatCode::Described as u8);
                    value::encode_ulong(buf, section::DATA);
                    value::encode_binary(buf, chunk);
                }
            }
            Body::Sequence(elements) => {
                buf.append_u8(codec::FormatCode::Described as u8);
                value::encode_ulong(buf, section::AMQP_SEQUENCE);
                value::encode_list(buf, elements)?;
            }
            Body::Value(value) => {
                buf.append_u8(codec::FormatCode::Described as u8);
                value::encode_ulong(buf, section::AMQP_VALUE);
                value.encode(buf)?;
            }
        }
        if let Some(footer) = &self.footer {
            encode_annotation_section(buf, section::FOOTER, footer)?;
        }
        Ok(())
    }

    /// The encoded size of the message, used for max-message-size checks.
    pub fn encoded_size(&self) -> Result<usize, codec::Error> {
        let mut buf = Buffer::new();
        self.encode(&mut buf)?;
        Ok(buf.len())
    }

    pub fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut message = Message::default();
        while buf.remaining() > 0 {
            let code = decode_descriptor(buf)?;
            match code {
                section::HEADER => message.header = Some(Header::decode_body(buf)?),
                section::DELIVERY_ANNOTATIONS => {
                    message.delivery_annotations = Some(Annotations::decode(buf)?)
                }
                section::MESSAGE_ANNOTATIONS => {
                    message.message_annotations = Some(Annotations::decode(buf)?)
                }
                section::PROPERTIES => message.properties = Some(Properties::decode_body(buf)?),
                section::APPLICATION_PROPERTIES => {
                    message.application_properties = Some(ApplicationProperties::decode(buf)?)
                }
                section::DATA => {
                    let chunk = Binary::decode(buf)?;
                    match &mut message.body {
                        Body::Data(chunks) => chunks.push(chunk),
                        _ => message.body = Body::Data(vec![chunk]),
                    }
                }
                section::AMQP_SEQUENCE => match Value::decode(buf)? {
                    Value::List(elements) => message.body = Body::Sequence(elements),
                    _ => return Err(codec::Error::MalformedComposite("amqp-sequence")),
                },
                section::AMQP_VALUE => message.body = Body::Value(Value::decode(buf)?),
                section::FOOTER => message.footer = Some(Annotations::decode(buf)?),
                found => {
                    return Err(codec::Error::UnexpectedDescriptor {
                        found,
                        expecting: "a message section",
                    })
                }
            }
        }
        Ok(message)
    }
}

fn encode_annotation_section(
    buf: &mut Buffer,
    code: u64,
    annotations: &Annotations,
) -> Result<(), codec::Error> {
    buf.append_u8(codec::FormatCode::Described as u8);
    value::encode_ulong(buf, code);
    value::encode_map(buf, annotations)
}

impl From<&str> for Message {
    fn from(body: &str) -> Self {
        Message::value(body)
    }
}

impl From<String> for Message {
    fn from(body: String) -> Self {
        Message::value(body)
    }
}

impl From<Vec<u8>> for Message {
    fn from(body: Vec<u8>) -> Self {
        Message::data(body)
    }
}

impl From<Bytes> for Message {
    fn from(body: Bytes) -> Self {
        Message::data(body)
    }
}

impl From<Value> for Message {
    fn from(body: Value) -> Self {
        Message::value(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::Symbol;

    #[test]
    fn data_body_matches_the_wire_layout() {
        // data section descriptor 0x75 followed by a vbin8 payload
        let message = Message::data(&b"test"[..]);
        let mut buf = Buffer::new();
        message.encode(&mut buf).unwrap();
        assert_eq!(
            buf.unread(),
            &[0x00, 0x53, 0x75, 0xa0, 0x04, 0x74, 0x65, 0x73, 0x74]
        );
    }

    #[test]
    fn full_message_round_trip() {
        let message = Message {
            header: Some(Header {
                durable: true,
                priority: 9,
                ttl: Some(30_000),
                ..Default::default()
            }),
            delivery_annotations: None,
            message_annotations: Some(vec![(
                Value::Symbol(Symbol::from("x-opt-partition-key")),
                Value::String("p0".to_string()),
            )]),
            properties: Some(Properties {
                message_id: Some(Value::Ulong(42)),
                to: Some("q1".to_string()),
                content_type: Some(Symbol::from("application/octet-stream")),
                ..Default::default()
            }),
            application_properties: Some(vec![("retries".to_string(), Value::Int(3))]),
            body: Body::Data(vec![Binary::from_static(b"payload")]),
            footer: None,
        };

        let mut buf = Buffer::new();
        message.encode(&mut buf).unwrap();
        assert_eq!(Message::decode(&mut buf).unwrap(), message);
    }

    #[test]
    fn value_and_sequence_bodies_round_trip() {
        for message in [
            Message::value("hello"),
            Message {
                body: Body::Sequence(vec![Value::Int(1), Value::String("two".to_string())]),
                ..Default::default()
            },
        ] {
            let mut buf = Buffer::new();
            message.encode(&mut buf).unwrap();
            assert_eq!(Message::decode(&mut buf).unwrap(), message);
        }
    }

    #[test]
    fn multiple_data_sections_accumulate() {
        let mut buf = Buffer::new();
        Message::data(&b"ab"[..]).encode(&mut buf).unwrap();
        Message::data(&b"cd"[..]).encode(&mut buf).unwrap();
        let decoded = Message::decode(&mut buf).unwrap();
        assert_eq!(
            decoded.body,
            Body::Data(vec![Binary::from_static(b"ab"), Binary::from_static(b"cd")])
        );
    }

    #[test]
    fn header_defaults_are_elided_and_restored() {
        let message = Message {
            header: Some(Header::default()),
            body: Body::Value(Value::Null),
            ..Default::default()
        };
        let mut buf = Buffer::new();
        message.encode(&mut buf).unwrap();
        // header section is descriptor + empty list
        assert_eq!(&buf.unread()[..4], &[0x00, 0x53, 0x70, 0x45]);
        assert_eq!(Message::decode(&mut buf).unwrap(), message);
    }
}
