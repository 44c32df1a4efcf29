//! SASL frame encoder and decoder.
//!
//! SASL frames share the AMQP frame layout with frame type 1 and no channel
//! semantics (the field is always 0).

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::buffer::Buffer;
use crate::codec::composite::{decode_descriptor, peek_descriptor_code};
use crate::codec::Encode;
use crate::frames::{Error, FRAME_TYPE_SASL};
use crate::sasl::{SaslChallenge, SaslInit, SaslMechanisms, SaslOutcome, SaslResponse};

#[derive(Debug)]
pub enum SaslFrame {
    Mechanisms(SaslMechanisms),
    Init(SaslInit),
    Challenge(SaslChallenge),
    Response(SaslResponse),
    Outcome(SaslOutcome),
}

#[derive(Debug)]
pub struct SaslFrameCodec {}

impl Encoder<SaslFrame> for SaslFrameCodec {
    type Error = Error;

    fn encode(&mut self, item: SaslFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(2); // doff
        dst.put_u8(FRAME_TYPE_SASL);
        dst.put_u16(0);

        let mut buf = Buffer::new();
        match item {
            SaslFrame::Mechanisms(body) => body.encode(&mut buf)?,
            SaslFrame::Init(body) => body.encode(&mut buf)?,
            SaslFrame::Challenge(body) => body.encode(&mut buf)?,
            SaslFrame::Response(body) => body.encode(&mut buf)?,
            SaslFrame::Outcome(body) => body.encode(&mut buf)?,
        }
        dst.extend_from_slice(&buf.into_bytes());
        Ok(())
    }
}

impl Decoder for SaslFrameCodec {
    type Item = SaslFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Err(Error::FramingError);
        }
        let doff = src.get_u8();
        let ftype = src.get_u8();
        let _channel = src.get_u16();

        if ftype != FRAME_TYPE_SASL {
            return Err(Error::NotImplemented(ftype));
        }
        if doff < 2 {
            return Err(Error::FramingError);
        }
        let skip = (doff as usize - 2) * 4;
        if src.len() < skip {
            return Err(Error::FramingError);
        }
        src.advance(skip);

        let code = peek_descriptor_code(src)?;
        let mut buf = Buffer::from(src.split());
        decode_descriptor(&mut buf)?;
        let frame = match code {
            SaslMechanisms::CODE => SaslFrame::Mechanisms(SaslMechanisms::decode_body(&mut buf)?),
            SaslInit::CODE => SaslFrame::Init(SaslInit::decode_body(&mut buf)?),
            SaslChallenge::CODE => SaslFrame::Challenge(SaslChallenge::decode_body(&mut buf)?),
            SaslResponse::CODE => SaslFrame::Response(SaslResponse::decode_body(&mut buf)?),
            SaslOutcome::CODE => SaslFrame::Outcome(SaslOutcome::decode_body(&mut buf)?),
            found => {
                return Err(Error::Codec(crate::codec::Error::UnexpectedDescriptor {
                    found,
                    expecting: "a sasl performative",
                }))
            }
        };
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::Symbol;

    #[test]
    fn init_round_trip() {
        let init = SaslInit {
            mechanism: Symbol::from("PLAIN"),
            initial_response: Some(bytes::Bytes::from_static(b"\x00user\x00pass")),
            hostname: None,
        };
        let mut dst = BytesMut::new();
        SaslFrameCodec {}
            .encode(SaslFrame::Init(init.clone()), &mut dst)
            .unwrap();
        match (SaslFrameCodec {}).decode(&mut dst).unwrap().unwrap() {
            SaslFrame::Init(decoded) => assert_eq!(decoded, init),
            other => panic!("expected Init, got {other:?}"),
        }
    }
}
