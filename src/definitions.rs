//! Shared definitions from part 2 of the AMQP 1.0 specification.

use std::fmt::{self, Display};

use crate::buffer::Buffer;
use crate::codec::composite::{encode_composite, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode, Value};
use crate::primitives::{Binary, Symbol};

/// The smallest max-frame-size a peer is allowed to advertise; also the
/// limit in force until the Open exchange completes.
pub const MIN_MAX_FRAME_SIZE: u32 = 512;

/// A delivery tag may be at most 32 bytes.
pub const MAX_DELIVERY_TAG_LENGTH: usize = 32;

pub type Handle = u32;
pub type SequenceNo = u32;
pub type TransferNumber = u32;
pub type DeliveryNumber = u32;
pub type MessageFormat = u32;
pub type Milliseconds = u32;
pub type Seconds = u32;
pub type DeliveryTag = Binary;

/// Insertion-ordered symbol-keyed map used for properties and capabilities.
pub type Fields = Vec<(Symbol, Value)>;

/// Link endpoint role. On the wire the sender is `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    Sender,
    Receiver,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => f.write_str("Sender"),
            Role::Receiver => f.write_str("Receiver"),
        }
    }
}

impl Encode for Role {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        (*self == Role::Receiver).encode(buf)
    }
}

impl Decode for Role {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        Ok(match bool::decode(buf)? {
            false => Role::Sender,
            true => Role::Receiver,
        })
    }
}

/// The sender's delivery settlement policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum SenderSettleMode {
    Unsettled = 0,
    Settled = 1,
    #[default]
    Mixed = 2,
}

impl Display for SenderSettleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderSettleMode::Unsettled => f.write_str("unsettled"),
            SenderSettleMode::Settled => f.write_str("settled"),
            SenderSettleMode::Mixed => f.write_str("mixed"),
        }
    }
}

impl Encode for SenderSettleMode {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        (*self as u8).encode(buf)
    }
}

impl Decode for SenderSettleMode {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        match u8::decode(buf)? {
            0 => Ok(SenderSettleMode::Unsettled),
            1 => Ok(SenderSettleMode::Settled),
            2 => Ok(SenderSettleMode::Mixed),
            _ => Err(codec::Error::MalformedComposite("snd-settle-mode")),
        }
    }
}

/// The receiver's delivery settlement policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ReceiverSettleMode {
    #[default]
    First = 0,
    Second = 1,
}

impl Display for ReceiverSettleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverSettleMode::First => f.write_str("first"),
            ReceiverSettleMode::Second => f.write_str("second"),
        }
    }
}

impl Encode for ReceiverSettleMode {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        (*self as u8).encode(buf)
    }
}

impl Decode for ReceiverSettleMode {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        match u8::decode(buf)? {
            0 => Ok(ReceiverSettleMode::First),
            1 => Ok(ReceiverSettleMode::Second),
            _ => Err(codec::Error::MalformedComposite("rcv-settle-mode")),
        }
    }
}

/// Standard error conditions.
pub mod condition {
    pub const INTERNAL_ERROR: &str = "amqp:internal-error";
    pub const NOT_FOUND: &str = "amqp:not-found";
    pub const UNAUTHORIZED_ACCESS: &str = "amqp:unauthorized-access";
    pub const DECODE_ERROR: &str = "amqp:decode-error";
    pub const RESOURCE_LIMIT_EXCEEDED: &str = "amqp:resource-limit-exceeded";
    pub const NOT_ALLOWED: &str = "amqp:not-allowed";
    pub const INVALID_FIELD: &str = "amqp:invalid-field";
    pub const NOT_IMPLEMENTED: &str = "amqp:not-implemented";
    pub const RESOURCE_LOCKED: &str = "amqp:resource-locked";
    pub const PRECONDITION_FAILED: &str = "amqp:precondition-failed";
    pub const RESOURCE_DELETED: &str = "amqp:resource-deleted";
    pub const ILLEGAL_STATE: &str = "amqp:illegal-state";
    pub const FRAME_SIZE_TOO_SMALL: &str = "amqp:frame-size-too-small";

    pub const CONNECTION_FORCED: &str = "amqp:connection:forced";
    pub const FRAMING_ERROR: &str = "amqp:connection:framing-error";
    pub const CONNECTION_REDIRECT: &str = "amqp:connection:redirect";

    pub const WINDOW_VIOLATION: &str = "amqp:session:window-violation";
    pub const ERRANT_LINK: &str = "amqp:session:errant-link";
    pub const HANDLE_IN_USE: &str = "amqp:session:handle-in-use";
    pub const UNATTACHED_HANDLE: &str = "amqp:session:unattached-handle";

    pub const DETACH_FORCED: &str = "amqp:link:detach-forced";
    pub const TRANSFER_LIMIT_EXCEEDED: &str = "amqp:link:transfer-limit-exceeded";
    pub const MESSAGE_SIZE_EXCEEDED: &str = "amqp:link:message-size-exceeded";
    pub const LINK_REDIRECT: &str = "amqp:link:redirect";
    pub const STOLEN: &str = "amqp:link:stolen";
}

/// 2.8.14 Error. Carried by Close, End, Detach and the rejected outcome.
///
/// <type name="error" class="composite" source="list">
///     <descriptor name="amqp:error:list" code="0x00000000:0x0000001d"/>
///     <field name="condition" type="symbol" mandatory="true" requires="error-condition"/>
///     <field name="description" type="string"/>
///     <field name="info" type="fields"/>
/// </type>
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Error {
    pub condition: Symbol,
    pub description: Option<String>,
    pub info: Option<Fields>,
}

impl Error {
    pub const CODE: u64 = 0x1d;

    pub fn new(condition: impl Into<Symbol>, description: impl Into<Option<String>>) -> Self {
        Self {
            condition: condition.into(),
            description: description.into(),
            info: None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", self.condition, description),
            None => write!(f, "{}", self.condition),
        }
    }
}

impl std::error::Error for Error {}

impl Encode for Error {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[
                EncodeField {
                    value: &self.condition,
                    omit: false,
                },
                EncodeField {
                    value: &self.description,
                    omit: self.description.is_none(),
                },
                EncodeField {
                    value: &self.info,
                    omit: self.info.is_none(),
                },
            ],
        )
    }
}

impl Decode for Error {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read_described(buf, Self::CODE, "error")?;
        let error = Self {
            condition: fields.mandatory(buf, "condition")?,
            description: fields.field(buf)?,
            info: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_round_trip() {
        let error = Error {
            condition: Symbol::from(condition::DETACH_FORCED),
            description: Some("administratively detached".to_string()),
            info: None,
        };
        let mut buf = Buffer::new();
        error.encode(&mut buf).unwrap();
        assert_eq!(Error::decode(&mut buf).unwrap(), error);
    }

    #[test]
    fn settle_modes_render_like_the_wire_names() {
        assert_eq!(SenderSettleMode::Settled.to_string(), "settled");
        assert_eq!(SenderSettleMode::Unsettled.to_string(), "unsettled");
        assert_eq!(ReceiverSettleMode::Second.to_string(), "second");
    }
}
