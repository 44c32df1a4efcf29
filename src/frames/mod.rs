//! Frame encoder and decoder.
//!
//! A frame is the 8-byte header (size, doff, type, channel) followed by zero
//! or one performative and an optional payload. The 4-byte size prefix is
//! handled by `LengthDelimitedCodec` in the transport; the codecs here take
//! over from the doff byte.

mod error;
pub(crate) mod sasl;

pub use error::Error;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::buffer::Buffer;
use crate::codec::composite::peek_descriptor_code;
use crate::codec::Encode;
use crate::performatives::{
    Attach, Begin, Close, Detach, Disposition, End, Flow, Open, Transfer,
};

/// Type byte of an AMQP frame.
pub const FRAME_TYPE_AMQP: u8 = 0x00;

/// Type byte of a SASL frame.
pub const FRAME_TYPE_SASL: u8 = 0x01;

/// Bytes of frame header and performative a transfer frame may need at most.
/// Chunked payloads are sized against the negotiated max-frame-size minus
/// this allowance.
pub const MAX_TRANSFER_FRAME_HEADER: usize = 64;

/// The message payload carried by a transfer frame.
pub type Payload = Bytes;

#[derive(Debug)]
pub struct Frame {
    pub channel: u16,
    pub body: FrameBody,
}

impl Frame {
    pub fn new(channel: u16, body: FrameBody) -> Self {
        Self { channel, body }
    }

    /// An empty frame, used only as an idle-timeout keepalive.
    pub fn empty() -> Self {
        Self {
            channel: 0,
            body: FrameBody::Empty,
        }
    }
}

#[derive(Debug)]
pub enum FrameBody {
    // Frames handled by a link
    Attach(Attach),
    Flow(Flow),
    Transfer {
        performative: Transfer,
        payload: Payload,
    },
    Disposition(Disposition),
    Detach(Detach),

    // Frames handled by a session
    Begin(Begin),
    End(End),

    // Frames handled by the connection
    Open(Open),
    Close(Close),

    /// A zero-length body: the keepalive frame.
    Empty,
}

#[derive(Debug)]
pub struct FrameCodec {}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // the extended header is never used, doff is always 2
        dst.put_u8(2);
        dst.put_u8(FRAME_TYPE_AMQP);
        dst.put_u16(item.channel);

        let mut buf = Buffer::new();
        match item.body {
            FrameBody::Open(performative) => performative.encode(&mut buf)?,
            FrameBody::Begin(performative) => performative.encode(&mut buf)?,
            FrameBody::Attach(performative) => performative.encode(&mut buf)?,
            FrameBody::Flow(performative) => performative.encode(&mut buf)?,
            FrameBody::Transfer {
                performative,
                payload,
            } => {
                performative.encode(&mut buf)?;
                dst.extend_from_slice(&buf.into_bytes());
                dst.extend_from_slice(&payload);
                return Ok(());
            }
            FrameBody::Disposition(performative) => performative.encode(&mut buf)?,
            FrameBody::Detach(performative) => performative.encode(&mut buf)?,
            FrameBody::End(performative) => performative.encode(&mut buf)?,
            FrameBody::Close(performative) => performative.encode(&mut buf)?,
            FrameBody::Empty => {}
        }
        dst.extend_from_slice(&buf.into_bytes());
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Err(Error::FramingError);
        }
        let doff = src.get_u8();
        let ftype = src.get_u8();
        let channel = src.get_u16();

        if ftype != FRAME_TYPE_AMQP {
            return Err(Error::NotImplemented(ftype));
        }
        // doff counts 4-byte words including the 8-byte header
        if doff < 2 {
            return Err(Error::FramingError);
        }
        let skip = (doff as usize - 2) * 4;
        if src.len() < skip {
            return Err(Error::FramingError);
        }
        src.advance(skip);

        if src.is_empty() {
            return Ok(Some(Frame::new(channel, FrameBody::Empty)));
        }

        let code = peek_descriptor_code(src)?;
        let mut buf = Buffer::from(src.split());
        let body = match code {
            Open::CODE => FrameBody::Open(decode_performative(&mut buf, Open::decode_body)?),
            Begin::CODE => FrameBody::Begin(decode_performative(&mut buf, Begin::decode_body)?),
            Attach::CODE => FrameBody::Attach(decode_performative(&mut buf, Attach::decode_body)?),
            Flow::CODE => FrameBody::Flow(decode_performative(&mut buf, Flow::decode_body)?),
            Transfer::CODE => {
                let performative = decode_performative(&mut buf, Transfer::decode_body)?;
                let payload = Bytes::copy_from_slice(buf.unread());
                FrameBody::Transfer {
                    performative,
                    payload,
                }
            }
            Disposition::CODE => {
                FrameBody::Disposition(decode_performative(&mut buf, Disposition::decode_body)?)
            }
            Detach::CODE => FrameBody::Detach(decode_performative(&mut buf, Detach::decode_body)?),
            End::CODE => FrameBody::End(decode_performative(&mut buf, End::decode_body)?),
            Close::CODE => FrameBody::Close(decode_performative(&mut buf, Close::decode_body)?),
            found => {
                return Err(Error::Codec(crate::codec::Error::UnexpectedDescriptor {
                    found,
                    expecting: "a performative",
                }))
            }
        };
        Ok(Some(Frame::new(channel, body)))
    }
}

fn decode_performative<T>(
    buf: &mut Buffer,
    decode_body: impl FnOnce(&mut Buffer) -> Result<T, crate::codec::Error>,
) -> Result<T, Error> {
    crate::codec::composite::decode_descriptor(buf)?;
    decode_body(buf).map_err(Error::Codec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_body() {
        let mut dst = BytesMut::new();
        FrameCodec {}.encode(Frame::empty(), &mut dst).unwrap();
        assert_eq!(&dst[..], &[0x02, 0x00, 0x00, 0x00]);

        let mut src = BytesMut::from(&[0x02, 0x00, 0x00, 0x00][..]);
        let frame = FrameCodec {}.decode(&mut src).unwrap().unwrap();
        assert!(matches!(frame.body, FrameBody::Empty));
    }

    #[test]
    fn open_frame_round_trip() {
        let open = Open {
            container_id: "1234".to_string(),
            hostname: Some("127.0.0.1".to_string()),
            max_frame_size: 1000,
            channel_max: 9,
            idle_time_out: Some(5),
            ..Default::default()
        };

        let mut dst = BytesMut::new();
        FrameCodec {}
            .encode(Frame::new(0, FrameBody::Open(open.clone())), &mut dst)
            .unwrap();

        let frame = FrameCodec {}.decode(&mut dst).unwrap().unwrap();
        assert_eq!(frame.channel, 0);
        match frame.body {
            FrameBody::Open(decoded) => assert_eq!(decoded, open),
            other => panic!("expected Open, got {other:?}"),
        }
    }

    #[test]
    fn transfer_keeps_its_payload() {
        let transfer = Transfer {
            handle: 0,
            delivery_id: Some(1),
            delivery_tag: Some(Bytes::from_static(&[0, 0, 0, 0, 0, 0, 0, 1])),
            message_format: Some(0),
            settled: Some(false),
            ..Default::default()
        };
        let payload = Bytes::from_static(b"\x00\x53\x75\xa0\x04test");

        let mut dst = BytesMut::new();
        FrameCodec {}
            .encode(
                Frame::new(
                    3,
                    FrameBody::Transfer {
                        performative: transfer.clone(),
                        payload: payload.clone(),
                    },
                ),
                &mut dst,
            )
            .unwrap();

        let frame = FrameCodec {}.decode(&mut dst).unwrap().unwrap();
        assert_eq!(frame.channel, 3);
        match frame.body {
            FrameBody::Transfer {
                performative,
                payload: decoded,
            } => {
                assert_eq!(performative, transfer);
                assert_eq!(decoded, payload);
            }
            other => panic!("expected Transfer, got {other:?}"),
        }
    }

    #[test]
    fn extended_header_is_skipped() {
        let mut dst = BytesMut::new();
        FrameCodec {}.encode(Frame::empty(), &mut dst).unwrap();
        // rewrite doff to 3 and splice in a 4-byte extended header
        let mut raw = vec![0x03, 0x00, 0x00, 0x00, 0xde, 0xad, 0xbe, 0xef];
        raw.extend_from_slice(&[]);
        let mut src = BytesMut::from(&raw[..]);
        let frame = FrameCodec {}.decode(&mut src).unwrap().unwrap();
        assert!(matches!(frame.body, FrameBody::Empty));
    }
}
