//! Delivery states, 3.4.

use crate::buffer::Buffer;
use crate::codec::composite::{decode_descriptor, encode_composite, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode};
use crate::definitions;
use crate::messaging::Annotations;

/// 3.4.1 Received. Partial transfer state; not terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Received {
    pub section_number: u32,
    pub section_offset: u64,
}

impl Received {
    pub const CODE: u64 = 0x23;
}

/// 3.4.2 Accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accepted {}

impl Accepted {
    pub const CODE: u64 = 0x24;
}

/// 3.4.3 Rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rejected {
    pub error: Option<definitions::Error>,
}

impl Rejected {
    pub const CODE: u64 = 0x25;
}

/// 3.4.4 Released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Released {}

impl Released {
    pub const CODE: u64 = 0x26;
}

/// 3.4.5 Modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modified {
    pub delivery_failed: bool,
    pub undeliverable_here: bool,
    pub message_annotations: Option<Annotations>,
}

impl Modified {
    pub const CODE: u64 = 0x27;
}

/// The state of a delivery at one of the link endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    Received(Received),
    Accepted(Accepted),
    Rejected(Rejected),
    Released(Released),
    Modified(Modified),
}

impl DeliveryState {
    /// Terminal states settle the delivery; `Received` does not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryState::Received(_))
    }

    pub fn accepted() -> Self {
        DeliveryState::Accepted(Accepted {})
    }

    pub fn released() -> Self {
        DeliveryState::Released(Released {})
    }

    pub fn rejected(error: Option<definitions::Error>) -> Self {
        DeliveryState::Rejected(Rejected { error })
    }

    pub(crate) fn decode_with_code(code: u64, buf: &mut Buffer) -> Result<Self, codec::Error> {
        let state = match code {
            Received::CODE => {
                let mut fields = CompositeFields::read(buf)?;
                let state = Received {
                    section_number: fields.mandatory(buf, "section-number")?,
                    section_offset: fields.mandatory(buf, "section-offset")?,
                };
                fields.finish(buf)?;
                DeliveryState::Received(state)
            }
            Accepted::CODE => {
                CompositeFields::read(buf)?.finish(buf)?;
                DeliveryState::Accepted(Accepted {})
            }
            Rejected::CODE => {
                let mut fields = CompositeFields::read(buf)?;
                let state = Rejected {
                    error: fields.field(buf)?,
                };
                fields.finish(buf)?;
                DeliveryState::Rejected(state)
            }
            Released::CODE => {
                CompositeFields::read(buf)?.finish(buf)?;
                DeliveryState::Released(Released {})
            }
            Modified::CODE => {
                let mut fields = CompositeFields::read(buf)?;
                let state = Modified {
                    delivery_failed: fields.field(buf)?,
                    undeliverable_here: fields.field(buf)?,
                    message_annotations: fields.field(buf)?,
                };
                fields.finish(buf)?;
                DeliveryState::Modified(state)
            }
            found => {
                return Err(codec::Error::UnexpectedDescriptor {
                    found,
                    expecting: "delivery-state",
                })
            }
        };
        Ok(state)
    }
}

impl Encode for DeliveryState {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        match self {
            DeliveryState::Received(state) => encode_composite(
                buf,
                Received::CODE,
                &[
                    EncodeField {
                        value: &state.section_number,
                        omit: false,
                    },
                    EncodeField {
                        value: &state.section_offset,
                        omit: false,
                    },
                ],
            ),
            DeliveryState::Accepted(_) => encode_composite(buf, Accepted::CODE, &[]),
            DeliveryState::Rejected(state) => encode_composite(
                buf,
                Rejected::CODE,
                &[EncodeField {
                    value: &state.error,
                    omit: state.error.is_none(),
                }],
            ),
            DeliveryState::Released(_) => encode_composite(buf, Released::CODE, &[]),
            DeliveryState::Modified(state) => encode_composite(
                buf,
                Modified::CODE,
                &[
                    EncodeField {
                        value: &state.delivery_failed,
                        omit: !state.delivery_failed,
                    },
                    EncodeField {
                        value: &state.undeliverable_here,
                        omit: !state.undeliverable_here,
                    },
                    EncodeField {
                        value: &state.message_annotations,
                        omit: state.message_annotations.is_none(),
                    },
                ],
            ),
        }
    }
}

impl Decode for DeliveryState {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let code = decode_descriptor(buf)?;
        Self::decode_with_code(code, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::condition;
    use crate::primitives::Symbol;

    fn round_trip(state: DeliveryState) {
        let mut buf = Buffer::new();
        state.encode(&mut buf).unwrap();
        assert_eq!(DeliveryState::decode(&mut buf).unwrap(), state);
    }

    #[test]
    fn states_round_trip() {
        round_trip(DeliveryState::accepted());
        round_trip(DeliveryState::released());
        round_trip(DeliveryState::rejected(Some(definitions::Error::new(
            Symbol::from(condition::MESSAGE_SIZE_EXCEEDED),
            Some("too big".to_string()),
        ))));
        round_trip(DeliveryState::Received(Received {
            section_number: 1,
            section_offset: 512,
        }));
        round_trip(DeliveryState::Modified(Modified {
            delivery_failed: true,
            undeliverable_here: false,
            message_annotations: None,
        }));
    }

    #[test]
    fn accepted_is_a_bare_descriptor() {
        let mut buf = Buffer::new();
        DeliveryState::accepted().encode(&mut buf).unwrap();
        assert_eq!(buf.unread(), &[0x00, 0x53, 0x24, 0x45]);
    }

    #[test]
    fn terminal_classification() {
        assert!(DeliveryState::accepted().is_terminal());
        assert!(!DeliveryState::Received(Received::default()).is_terminal());
    }
}
