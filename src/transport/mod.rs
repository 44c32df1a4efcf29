//! Low level transport framing.
//!
//! Two layer design: `tokio_util::codec::LengthDelimitedCodec` handles the
//! 4-byte size prefix over the raw `AsyncRead + AsyncWrite`; [`FrameCodec`]
//! turns the length-delimited bodies into typed [`Frame`]s. The transport
//! also owns the inbound idle timeout: if the peer stays silent for the full
//! interval the stream yields a framing error.

pub mod protocol_header;

use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::{Future, Sink, Stream};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder, Framed, LengthDelimitedCodec};

use crate::frames::sasl::{SaslFrame, SaslFrameCodec};
use crate::frames::{Frame, FrameCodec};
use crate::util::IdleTimeout;

use protocol_header::ProtocolHeader;

/// Errors raised below the connection state machine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The peer sent nothing for the whole local idle-timeout interval.
    #[error("idle timeout elapsed")]
    IdleTimeoutElapsed,

    /// An inbound frame exceeds the size this end advertised.
    #[error("max frame size exceeded")]
    MaxFrameSizeExceeded,

    #[error("unexpected protocol header {0:?}")]
    UnexpectedProtocolHeader([u8; 8]),

    #[error(transparent)]
    Frames(#[from] crate::frames::Error),
}

fn length_codec(max_frame_size: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .big_endian()
        .length_field_length(4)
        // the size field counts itself
        .length_adjustment(-4)
        .max_frame_length(max_frame_size)
        .new_codec()
}

pin_project! {
    /// Typed frame stream/sink over a raw byte stream.
    #[derive(Debug)]
    pub struct Transport<Io> {
        #[pin]
        framed: Framed<Io, LengthDelimitedCodec>,
        #[pin]
        idle_timeout: Option<IdleTimeout>,
    }
}

impl<Io> Transport<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    /// Binds the transport with the pre-negotiation frame size limit. The
    /// limit is raised once the Open exchange settles on a value.
    pub fn bind(io: Io, max_frame_size: usize, idle_timeout: Option<Duration>) -> Self {
        let framed = Framed::new(io, length_codec(max_frame_size));
        let idle_timeout = idle_timeout
            .filter(|duration| !duration.is_zero())
            .map(IdleTimeout::new);
        Self {
            framed,
            idle_timeout,
        }
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: usize) -> &mut Self {
        self.framed.codec_mut().set_max_frame_length(max_frame_size);
        self
    }

    /// Exchanges protocol headers, failing if the peer answers with anything
    /// but an exact echo.
    pub async fn negotiate(io: &mut Io, proto_header: ProtocolHeader) -> Result<(), Error> {
        let outbound: [u8; 8] = proto_header.clone().into();
        io.write_all(&outbound).await?;
        io.flush().await?;

        let mut inbound = [0u8; 8];
        io.read_exact(&mut inbound).await?;
        let incoming =
            ProtocolHeader::try_from(inbound).map_err(Error::UnexpectedProtocolHeader)?;
        if incoming != proto_header {
            return Err(Error::UnexpectedProtocolHeader(inbound));
        }
        Ok(())
    }
}

impl<Io> Sink<Frame> for Transport<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    type Error = Error;

    fn poll_ready(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        this.framed.poll_ready(cx).map_err(Into::into)
    }

    fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        let mut body = BytesMut::new();
        FrameCodec {}.encode(item, &mut body)?;

        let this = self.project();
        this.framed.start_send(body.freeze()).map_err(Into::into)
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        this.framed.poll_flush(cx).map_err(Into::into)
    }

    fn poll_close(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        this.framed.poll_close(cx).map_err(Into::into)
    }
}

impl<Io> Stream for Transport<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<Frame, Error>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.framed.poll_next(cx) {
            Poll::Ready(next) => {
                // any inbound bytes keep the peer alive
                if let Some(delay) = this.idle_timeout.get_mut() {
                    delay.reset();
                }
                match next {
                    Some(Ok(mut body)) => {
                        Poll::Ready(FrameCodec {}.decode(&mut body).map_err(Error::from).transpose())
                    }
                    Some(Err(err)) => {
                        if err.kind() == std::io::ErrorKind::InvalidData {
                            // LengthDelimitedCodec signals an oversized frame
                            // with InvalidData
                            Poll::Ready(Some(Err(Error::MaxFrameSizeExceeded)))
                        } else {
                            Poll::Ready(Some(Err(err.into())))
                        }
                    }
                    None => Poll::Ready(None),
                }
            }
            Poll::Pending => {
                if let Some(delay) = this.idle_timeout.as_pin_mut() {
                    if delay.poll(cx).is_ready() {
                        return Poll::Ready(Some(Err(Error::IdleTimeoutElapsed)));
                    }
                }
                Poll::Pending
            }
        }
    }
}

/* ------------------------------ SASL exchange ----------------------------- */

/// Writes one SASL frame directly on the raw stream. Only used during the
/// pre-AMQP negotiation, before the transport is bound.
pub(crate) async fn write_sasl_frame<Io>(io: &mut Io, frame: SaslFrame) -> Result<(), Error>
where
    Io: AsyncWrite + Unpin,
{
    let mut body = BytesMut::new();
    SaslFrameCodec {}.encode(frame, &mut body)?;
    let size = (body.len() + 4) as u32;
    io.write_all(&size.to_be_bytes()).await?;
    io.write_all(&body).await?;
    io.flush().await?;
    Ok(())
}

/// Reads one SASL frame directly off the raw stream.
pub(crate) async fn read_sasl_frame<Io>(io: &mut Io) -> Result<SaslFrame, Error>
where
    Io: AsyncRead + Unpin,
{
    let mut size = [0u8; 4];
    io.read_exact(&mut size).await?;
    let size = u32::from_be_bytes(size) as usize;
    if size < 8 {
        return Err(Error::Frames(crate::frames::Error::FramingError));
    }
    let mut body = vec![0u8; size - 4];
    io.read_exact(&mut body).await?;
    let mut body = BytesMut::from(&body[..]);
    SaslFrameCodec {}
        .decode(&mut body)?
        .ok_or(Error::Frames(crate::frames::Error::FramingError))
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_test::io::Builder;

    use super::*;
    use crate::frames::FrameBody;
    use crate::performatives::Open;

    #[tokio::test]
    async fn header_exchange() {
        let mut mock = Builder::new()
            .write(b"AMQP")
            .write(&[0, 1, 0, 0])
            .read(b"AMQP")
            .read(&[0, 1, 0, 0])
            .build();

        Transport::negotiate(&mut mock, ProtocolHeader::amqp())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn mismatched_header_fails() {
        let mut mock = Builder::new()
            .write(b"AMQP")
            .write(&[0, 1, 0, 0])
            .read(b"AMQP")
            .read(&[3, 1, 0, 0])
            .build();

        let outcome = Transport::negotiate(&mut mock, ProtocolHeader::amqp()).await;
        assert!(matches!(outcome, Err(Error::UnexpectedProtocolHeader(_))));
    }

    #[tokio::test]
    async fn empty_frame_on_the_wire() {
        let mock = Builder::new()
            .write(&[0x00, 0x00, 0x00, 0x08])
            .write(&[0x02, 0x00, 0x00, 0x00])
            .build();
        let mut transport = Transport::bind(mock, 512, None);
        transport.send(Frame::empty()).await.unwrap();
    }

    #[tokio::test]
    async fn reads_an_open_frame() {
        let open = Open {
            container_id: "c1".to_string(),
            max_frame_size: 4096,
            channel_max: 7,
            ..Default::default()
        };
        let mut body = BytesMut::new();
        FrameCodec {}
            .encode(Frame::new(0, FrameBody::Open(open.clone())), &mut body)
            .unwrap();
        let mut wire = Vec::new();
        wire.extend_from_slice(&((body.len() + 4) as u32).to_be_bytes());
        wire.extend_from_slice(&body);

        let mock = Builder::new().read(&wire).build();
        let mut transport = Transport::bind(mock, 512, None);
        let frame = transport.next().await.unwrap().unwrap();
        match frame.body {
            FrameBody::Open(decoded) => assert_eq!(decoded, open),
            other => panic!("expected Open, got {other:?}"),
        }
    }
}
