//! SASL negotiation performatives, 5.3.3.

use crate::buffer::Buffer;
use crate::codec::composite::{encode_composite, expect_descriptor, CompositeFields, EncodeField};
use crate::codec::{self, Decode, Encode};
use crate::primitives::{Binary, Symbol};

/// 5.3.3.1 SASL Mechanisms. Advertised by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaslMechanisms {
    pub sasl_server_mechanisms: Vec<Symbol>,
}

impl SaslMechanisms {
    pub const CODE: u64 = 0x40;
}

impl Encode for SaslMechanisms {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[EncodeField {
                value: &self.sasl_server_mechanisms,
                omit: false,
            }],
        )
    }
}

impl SaslMechanisms {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let mechanisms = Self {
            sasl_server_mechanisms: fields.mandatory(buf, "sasl-server-mechanisms")?,
        };
        fields.finish(buf)?;
        Ok(mechanisms)
    }
}

impl Decode for SaslMechanisms {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "sasl-mechanisms")?;
        Self::decode_body(buf)
    }
}

/// 5.3.3.2 SASL Init. Selects the mechanism and carries the initial
/// response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaslInit {
    pub mechanism: Symbol,
    pub initial_response: Option<Binary>,
    pub hostname: Option<String>,
}

impl SaslInit {
    pub const CODE: u64 = 0x41;
}

impl Encode for SaslInit {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[
                EncodeField {
                    value: &self.mechanism,
                    omit: false,
                },
                EncodeField {
                    value: &self.initial_response,
                    omit: self.initial_response.is_none(),
                },
                EncodeField {
                    value: &self.hostname,
                    omit: self.hostname.is_none(),
                },
            ],
        )
    }
}

impl SaslInit {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let init = Self {
            mechanism: fields.mandatory(buf, "mechanism")?,
            initial_response: fields.field(buf)?,
            hostname: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(init)
    }
}

impl Decode for SaslInit {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "sasl-init")?;
        Self::decode_body(buf)
    }
}

/// 5.3.3.3 SASL Challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaslChallenge {
    pub challenge: Binary,
}

impl SaslChallenge {
    pub const CODE: u64 = 0x42;
}

impl Encode for SaslChallenge {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[EncodeField {
                value: &self.challenge,
                omit: false,
            }],
        )
    }
}

impl SaslChallenge {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let challenge = Self {
            challenge: fields.mandatory(buf, "challenge")?,
        };
        fields.finish(buf)?;
        Ok(challenge)
    }
}

impl Decode for SaslChallenge {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "sasl-challenge")?;
        Self::decode_body(buf)
    }
}

/// 5.3.3.4 SASL Response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaslResponse {
    pub response: Binary,
}

impl SaslResponse {
    pub const CODE: u64 = 0x43;
}

impl Encode for SaslResponse {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[EncodeField {
                value: &self.response,
                omit: false,
            }],
        )
    }
}

impl SaslResponse {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let response = Self {
            response: fields.mandatory(buf, "response")?,
        };
        fields.finish(buf)?;
        Ok(response)
    }
}

impl Decode for SaslResponse {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "sasl-response")?;
        Self::decode_body(buf)
    }
}

/// Outcome codes of the SASL exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum SaslCode {
    #[default]
    Ok = 0,
    Auth = 1,
    Sys = 2,
    SysPerm = 3,
    SysTemp = 4,
}

impl Encode for SaslCode {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        (*self as u8).encode(buf)
    }
}

impl Decode for SaslCode {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        match u8::decode(buf)? {
            0 => Ok(SaslCode::Ok),
            1 => Ok(SaslCode::Auth),
            2 => Ok(SaslCode::Sys),
            3 => Ok(SaslCode::SysPerm),
            4 => Ok(SaslCode::SysTemp),
            _ => Err(codec::Error::MalformedComposite("code")),
        }
    }
}

/// 5.3.3.5 SASL Outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaslOutcome {
    pub code: SaslCode,
    pub additional_data: Option<Binary>,
}

impl SaslOutcome {
    pub const CODE: u64 = 0x44;
}

impl Encode for SaslOutcome {
    fn encode(&self, buf: &mut Buffer) -> Result<(), codec::Error> {
        encode_composite(
            buf,
            Self::CODE,
            &[
                EncodeField {
                    value: &self.code,
                    omit: false,
                },
                EncodeField {
                    value: &self.additional_data,
                    omit: self.additional_data.is_none(),
                },
            ],
        )
    }
}

impl SaslOutcome {
    pub(crate) fn decode_body(buf: &mut Buffer) -> Result<Self, codec::Error> {
        let mut fields = CompositeFields::read(buf)?;
        let outcome = Self {
            code: fields.mandatory(buf, "code")?,
            additional_data: fields.field(buf)?,
        };
        fields.finish(buf)?;
        Ok(outcome)
    }
}

impl Decode for SaslOutcome {
    fn decode(buf: &mut Buffer) -> Result<Self, codec::Error> {
        expect_descriptor(buf, Self::CODE, "sasl-outcome")?;
        Self::decode_body(buf)
    }
}
