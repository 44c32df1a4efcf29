//! Source and target termini of a link.

use crate::buffer::Buffer;
use crate::codec::composite::{encode_composite, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode, Value};
use crate::definitions::{Fields, Seconds};
use crate::messaging::FilterSet;
use crate::primitives::Symbol;

/// What terminus state is retained durably.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum TerminusDurability {
    #[default]
    None = 0,
    Configuration = 1,
    UnsettledState = 2,
}

impl Encode for TerminusDurability {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        (*self as u32).encode(buf)
    }
}

impl Decode for TerminusDurability {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        match u32::decode(buf)? {
            0 => Ok(TerminusDurability::None),
            1 => Ok(TerminusDurability::Configuration),
            2 => Ok(TerminusDurability::UnsettledState),
            _ => Err(codec::Error::MalformedComposite("durable")),
        }
    }
}

/// When the expiry timer of a terminus starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TerminusExpiryPolicy {
    LinkDetach,
    #[default]
    SessionEnd,
    ConnectionClose,
    Never,
}

impl TerminusExpiryPolicy {
    fn as_symbol(&self) -> Symbol {
        Symbol::from(match self {
            TerminusExpiryPolicy::LinkDetach => "link-detach",
            TerminusExpiryPolicy::SessionEnd => "session-end",
            TerminusExpiryPolicy::ConnectionClose => "connection-close",
            TerminusExpiryPolicy::Never => "never",
        })
    }
}

impl Encode for TerminusExpiryPolicy {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        self.as_symbol().encode(buf)
    }
}

impl Decode for TerminusExpiryPolicy {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        match Symbol::decode(buf)?.as_str() {
            "link-detach" => Ok(TerminusExpiryPolicy::LinkDetach),
            "session-end" => Ok(TerminusExpiryPolicy::SessionEnd),
            "connection-close" => Ok(TerminusExpiryPolicy::ConnectionClose),
            "never" => Ok(TerminusExpiryPolicy::Never),
            _ => Err(codec::Error::MalformedComposite("expiry-policy")),
        }
    }
}

/// Lifetime policies of a dynamically created node, 3.5.10–3.5.13.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimePolicy {
    DeleteOnClose,
    DeleteOnNoLinks,
    DeleteOnNoMessages,
    DeleteOnNoLinksOrMessages,
}

impl LifetimePolicy {
    pub fn code(&self) -> u64 {
        match self {
            LifetimePolicy::DeleteOnClose => 0x2b,
            LifetimePolicy::DeleteOnNoLinks => 0x2c,
            LifetimePolicy::DeleteOnNoMessages => 0x2d,
            LifetimePolicy::DeleteOnNoLinksOrMessages => 0x2e,
        }
    }
}

impl From<LifetimePolicy> for Value {
    fn from(policy: LifetimePolicy) -> Self {
        Value::described(Value::Ulong(policy.code()), Value::List(Vec::new()))
    }
}

impl Encode for LifetimePolicy {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(buf, self.code(), &[])
    }
}

/// 3.5.3 Source.
///
/// <type name="source" class="composite" source="list" provides="source">
///     <descriptor name="amqp:source:list" code="0x00000000:0x00000028"/>
/// </type>
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Source {
    pub address: Option<String>,
    pub durable: TerminusDurability,
    pub expiry_policy: TerminusExpiryPolicy,
    pub timeout: Seconds,
    pub dynamic: bool,
    pub dynamic_node_properties: Option<Fields>,
    pub distribution_mode: Option<Symbol>,
    pub filter: Option<FilterSet>,
    pub default_outcome: Option<Value>,
    pub outcomes: Option<Vec<Symbol>>,
    pub capabilities: Option<Vec<Symbol>>,
}

impl Source {
    pub const CODE: u64 = 0x28;
}

impl Encode for Source {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[
                EncodeField {
                    value: &self.address,
                    omit: self.address.is_none(),
                },
                EncodeField {
                    value: &self.durable,
                    omit: self.durable == TerminusDurability::None,
                },
                EncodeField {
                    value: &self.expiry_policy,
                    omit: self.expiry_policy == TerminusExpiryPolicy::SessionEnd,
                },
                EncodeField {
                    value: &self.timeout,
                    omit: self.timeout == 0,
                },
                EncodeField {
                    value: &self.dynamic,
                    omit: !self.dynamic,
                },
                EncodeField {
                    value: &self.dynamic_node_properties,
                    omit: self.dynamic_node_properties.is_none(),
                },
                EncodeField {
                    value: &self.distribution_mode,
                    omit: self.distribution_mode.is_none(),
                },
                EncodeField {
                    value: &self.filter,
                    omit: self.filter.is_none(),
                },
                EncodeField {
                    value: &self.default_outcome,
                    omit: self.default_outcome.is_none(),
                },
                EncodeField {
                    value: &self.outcomes,
                    omit: self.outcomes.is_none(),
                },
                EncodeField {
                    value: &self.capabilities,
                    omit: self.capabilities.is_none(),
                },
            ],
        )
    }
}

impl Decode for Source {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read_described(buf, Self::CODE, "source")?;
        let source = Self::decode_fields(&mut fields, buf)?;
        fields.finish(buf)?;
        Ok(source)
    }
}

impl Source {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let source = Self::decode_fields(&mut fields, buf)?;
        fields.finish(buf)?;
        Ok(source)
    }

    fn decode_fields(fields: &mut CompositeFields, buf: &mut Buffer) -> Result<Self, codec::Error> {
        Ok(Self {
            address: fields.field(buf)?,
            durable: fields.field(buf)?,
            expiry_policy: fields.field(buf)?,
            timeout: fields.field(buf)?,
            dynamic: fields.field(buf)?,
            dynamic_node_properties: fields.field(buf)?,
            distribution_mode: fields.field(buf)?,
            filter: fields.field(buf)?,
            default_outcome: fields.field(buf)?,
            outcomes: fields.field(buf)?,
            capabilities: fields.field(buf)?,
        })
    }
}

/// 3.5.4 Target.
///
/// <type name="target" class="composite" source="list" provides="target">
///     <descriptor name="amqp:target:list" code="0x00000000:0x00000029"/>
/// </type>
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub address: Option<String>,
    pub durable: TerminusDurability,
    pub expiry_policy: TerminusExpiryPolicy,
    pub timeout: Seconds,
    pub dynamic: bool,
    pub dynamic_node_properties: Option<Fields>,
    pub capabilities: Option<Vec<Symbol>>,
}

impl Target {
    pub const CODE: u64 = 0x29;

    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Default::default()
        }
    }
}

impl Encode for Target {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[
                EncodeField {
                    value: &self.address,
                    omit: self.address.is_none(),
                },
                EncodeField {
                    value: &self.durable,
                    omit: self.durable == TerminusDurability::None,
                },
                EncodeField {
                    value: &self.expiry_policy,
                    omit: self.expiry_policy == TerminusExpiryPolicy::SessionEnd,
                },
                EncodeField {
                    value: &self.timeout,
                    omit: self.timeout == 0,
                },
                EncodeField {
                    value: &self.dynamic,
                    omit: !self.dynamic,
                },
                EncodeField {
                    value: &self.dynamic_node_properties,
                    omit: self.dynamic_node_properties.is_none(),
                },
                EncodeField {
                    value: &self.capabilities,
                    omit: self.capabilities.is_none(),
                },
            ],
        )
    }
}

impl Decode for Target {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read_described(buf, Self::CODE, "target")?;
        let target = Self::decode_fields(&mut fields, buf)?;
        fields.finish(buf)?;
        Ok(target)
    }
}

impl Target {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let target = Self::decode_fields(&mut fields, buf)?;
        fields.finish(buf)?;
        Ok(target)
    }

    fn decode_fields(fields: &mut CompositeFields, buf: &mut Buffer) -> Result<Self, codec::Error> {
        Ok(Self {
            address: fields.field(buf)?,
            durable: fields.field(buf)?,
            expiry_policy: fields.field(buf)?,
            timeout: fields.field(buf)?,
            dynamic: fields.field(buf)?,
            dynamic_node_properties: fields.field(buf)?,
            capabilities: fields.field(buf)?,
        })
    }
}

impl From<&str> for Target {
    fn from(address: &str) -> Self {
        Target::new(address)
    }
}

impl From<String> for Target {
    fn from(address: String) -> Self {
        Target::new(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_round_trip_with_defaults_restored() {
        let source = Source {
            address: Some("q1".to_string()),
            dynamic: false,
            capabilities: Some(vec![Symbol::from("queue")]),
            ..Default::default()
        };
        let mut buf = Buffer::new();
        source.encode(&mut buf).unwrap();
        let decoded = Source::decode(&mut buf).unwrap();
        assert_eq!(decoded, source);
        assert_eq!(decoded.expiry_policy, TerminusExpiryPolicy::SessionEnd);
    }

    #[test]
    fn empty_target_is_a_bare_descriptor() {
        let target = Target::default();
        let mut buf = Buffer::new();
        target.encode(&mut buf).unwrap();
        assert_eq!(buf.unread(), &[0x00, 0x53, 0x29, 0x45]);
        assert_eq!(Target::decode(&mut buf).unwrap(), target);
    }
}
