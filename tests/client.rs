//! End-to-end tests against a scripted in-process peer.
//!
//! The peer speaks raw frames through the crate's own transport layer over a
//! `tokio::io::duplex` pipe, playing the broker half of each exchange.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use azurite_amqp::connection::Connection;
use azurite_amqp::definitions::{ReceiverSettleMode, Role, SenderSettleMode};
use azurite_amqp::frames::{Frame, FrameBody};
use azurite_amqp::link::{Receiver, SendError, Sender};
use azurite_amqp::messaging::{Body, DeliveryState, Message, Source, Target};
use azurite_amqp::performatives::{Attach, Begin, Close, Detach, Disposition, End, Flow, Open, Transfer};
use azurite_amqp::primitives::Symbol;
use azurite_amqp::session::Session;
use azurite_amqp::transport::Transport;
use azurite_amqp::{definitions, Value};

/// The broker half of the conversation.
struct Peer {
    transport: Transport<DuplexStream>,
    /// Windows mirrored from the client's Begin.
    next_incoming_id: u32,
    next_outgoing_id: u32,
}

impl Peer {
    /// Accepts the protocol header and the Open exchange.
    async fn accept(mut io: DuplexStream, max_frame_size: u32) -> Self {
        let mut header = [0u8; 8];
        io.read_exact(&mut header).await.unwrap();
        assert_eq!(&header, b"AMQP\x00\x01\x00\x00");
        io.write_all(&header).await.unwrap();

        let mut transport = Transport::bind(io, 1024 * 1024, None);
        let frame = transport.next().await.unwrap().unwrap();
        match frame.body {
            FrameBody::Open(_) => {}
            other => panic!("expected Open, got {other:?}"),
        }
        let open = Open {
            container_id: "mock-broker".to_string(),
            max_frame_size,
            ..Default::default()
        };
        transport
            .send(Frame::new(0, FrameBody::Open(open)))
            .await
            .unwrap();
        Self {
            transport,
            next_incoming_id: 0,
            next_outgoing_id: 0,
        }
    }

    async fn next_body(&mut self) -> FrameBody {
        loop {
            let frame = self.transport.next().await.unwrap().unwrap();
            match frame.body {
                FrameBody::Empty => continue,
                body => return body,
            }
        }
    }

    async fn send(&mut self, channel: u16, body: FrameBody) {
        self.transport
            .send(Frame::new(channel, body))
            .await
            .unwrap();
    }

    /// Serves the Begin exchange on channel 0.
    async fn serve_begin(&mut self) {
        let begin = match self.next_body().await {
            FrameBody::Begin(begin) => begin,
            other => panic!("expected Begin, got {other:?}"),
        };
        self.next_incoming_id = begin.next_outgoing_id;
        let reply = Begin {
            remote_channel: Some(0),
            next_outgoing_id: 0,
            incoming_window: 5000,
            outgoing_window: 5000,
            ..Default::default()
        };
        self.send(0, FrameBody::Begin(reply)).await;
    }

    /// Serves an Attach exchange, echoing the client's termini and settle
    /// modes unless overridden.
    async fn serve_attach(&mut self, reply: impl FnOnce(&Attach) -> Attach) -> Attach {
        let attach = match self.next_body().await {
            FrameBody::Attach(attach) => attach,
            other => panic!("expected Attach, got {other:?}"),
        };
        let response = reply(&attach);
        self.send(0, FrameBody::Attach(response)).await;
        attach
    }

    fn echo_attach(attach: &Attach) -> Attach {
        Attach {
            name: attach.name.clone(),
            handle: 0,
            role: match attach.role {
                Role::Sender => Role::Receiver,
                Role::Receiver => Role::Sender,
            },
            snd_settle_mode: attach.snd_settle_mode,
            rcv_settle_mode: attach.rcv_settle_mode,
            source: attach.source.clone().or_else(|| Some(Source::default())),
            target: attach.target.clone().or_else(|| Some(Target::default())),
            initial_delivery_count: match attach.role {
                // in the reply the peer is the sender
                Role::Sender => None,
                Role::Receiver => Some(0),
            },
            ..Default::default()
        }
    }

    /// Grants the sender link credit.
    async fn grant_credit(&mut self, handle: u32, delivery_count: u32, credit: u32) {
        let flow = Flow {
            next_incoming_id: Some(self.next_incoming_id),
            incoming_window: 5000,
            next_outgoing_id: self.next_outgoing_id,
            outgoing_window: 5000,
            handle: Some(handle),
            delivery_count: Some(delivery_count),
            link_credit: Some(credit),
            ..Default::default()
        };
        self.send(0, FrameBody::Flow(flow)).await;
    }

    async fn expect_transfer(&mut self) -> (Transfer, Bytes) {
        match self.next_body().await {
            FrameBody::Transfer {
                performative,
                payload,
            } => {
                self.next_incoming_id = self.next_incoming_id.wrapping_add(1);
                (performative, payload)
            }
            other => panic!("expected Transfer, got {other:?}"),
        }
    }

    async fn settle(&mut self, delivery_id: u32, state: DeliveryState) {
        let disposition = Disposition {
            role: Role::Receiver,
            first: delivery_id,
            last: None,
            settled: true,
            state: Some(state),
            batchable: false,
        };
        self.send(0, FrameBody::Disposition(disposition)).await;
    }

    async fn expect_detach(&mut self) -> Detach {
        match self.next_body().await {
            FrameBody::Detach(detach) => detach,
            other => panic!("expected Detach, got {other:?}"),
        }
    }

    async fn expect_flow(&mut self) -> Flow {
        match self.next_body().await {
            FrameBody::Flow(flow) => flow,
            other => panic!("expected Flow, got {other:?}"),
        }
    }

    async fn expect_disposition(&mut self) -> Disposition {
        match self.next_body().await {
            FrameBody::Disposition(disposition) => disposition,
            other => panic!("expected Disposition, got {other:?}"),
        }
    }

    /// Serves the End/Close tail of a clean shutdown.
    async fn serve_shutdown(&mut self) {
        loop {
            match self.next_body().await {
                FrameBody::End(_) => {
                    self.send(0, FrameBody::End(End { error: None })).await;
                }
                FrameBody::Detach(detach) => {
                    self.send(
                        0,
                        FrameBody::Detach(Detach {
                            handle: detach.handle,
                            closed: true,
                            error: None,
                        }),
                    )
                    .await;
                }
                FrameBody::Close(_) => {
                    self.send(0, FrameBody::Close(Close { error: None })).await;
                    return;
                }
                other => panic!("unexpected frame during shutdown: {other:?}"),
            }
        }
    }
}

/// Frame-level traces show up under `RUST_LOG=azurite_amqp=trace`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn open_pair(peer_max_frame_size: u32) -> (Connection, Peer) {
    init_tracing();
    let (client_io, peer_io) = tokio::io::duplex(1024 * 1024);
    let peer = tokio::spawn(Peer::accept(peer_io, peer_max_frame_size));
    let connection = Connection::builder()
        .container_id("test-client")
        .open_with_stream(client_io)
        .await
        .unwrap();
    (connection, peer.await.unwrap())
}

#[tokio::test]
async fn open_and_close() {
    let (connection, mut peer) = open_pair(65536).await;
    let shutdown = tokio::spawn(async move {
        match peer.next_body().await {
            FrameBody::Close(_) => peer.send(0, FrameBody::Close(Close { error: None })).await,
            other => panic!("expected Close, got {other:?}"),
        }
    });
    connection.close().await.unwrap();
    shutdown.await.unwrap();
}

#[tokio::test]
async fn remote_close_with_error_is_surfaced() {
    let (connection, mut peer) = open_pair(65536).await;
    let error = definitions::Error::new(
        Symbol::from("amqp:connection:forced"),
        Some("maintenance".to_string()),
    );
    peer.send(
        0,
        FrameBody::Close(Close { error: Some(error) }),
    )
    .await;
    // the client answers the close before winding down
    match peer.next_body().await {
        FrameBody::Close(_) => {}
        other => panic!("expected Close, got {other:?}"),
    }
    let err = connection.close().await.unwrap_err();
    assert!(err.to_string().contains("amqp:connection:forced"));
}

/// Scenario: attach in unsettled mode, get credit, send "test", see exactly
/// one transfer with the canonical body bytes, get accepted.
#[tokio::test]
async fn happy_send() {
    let (mut connection, mut peer) = open_pair(65536).await;

    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        let attach = peer.serve_attach(Peer::echo_attach).await;
        assert_eq!(attach.role, Role::Sender);
        assert_eq!(attach.snd_settle_mode, SenderSettleMode::Unsettled);

        peer.grant_credit(0, 0, 100).await;

        let (transfer, payload) = peer.expect_transfer().await;
        assert_eq!(transfer.delivery_id, Some(0));
        assert_eq!(transfer.message_format, Some(0));
        assert_eq!(transfer.settled, Some(false));
        assert!(!transfer.more);
        assert_eq!(
            &payload[..],
            &[0x00, 0x53, 0x75, 0xa0, 0x04, 0x74, 0x65, 0x73, 0x74]
        );

        peer.settle(0, DeliveryState::accepted()).await;
        peer
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let sender = Sender::builder()
        .name("sender-1")
        .target(Target::new("q1"))
        .settle_mode(SenderSettleMode::Unsettled)
        .attach(&mut session)
        .await
        .unwrap();

    sender
        .send(vec![0x74, 0x65, 0x73, 0x74])
        .await
        .unwrap();
    broker.await.unwrap();
}

/// Scenario: a payload larger than the peer max frame size goes out as
/// consecutive transfers, ids only on the first, `more` on all but the last.
#[tokio::test]
async fn multi_frame_send() {
    let (mut connection, mut peer) = open_pair(128).await;

    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        peer.serve_attach(Peer::echo_attach).await;
        peer.grant_credit(0, 0, 10).await;

        let mut total = 0usize;
        let mut frames = 0usize;
        loop {
            let (transfer, payload) = peer.expect_transfer().await;
            if frames == 0 {
                assert_eq!(transfer.delivery_id, Some(0));
                assert_eq!(transfer.message_format, Some(0));
            } else {
                assert_eq!(transfer.delivery_id, None);
                assert_eq!(transfer.delivery_tag, None);
                assert_eq!(transfer.message_format, None);
            }
            assert!(payload.len() <= 128 - 64);
            frames += 1;
            total += payload.len();
            if !transfer.more {
                break;
            }
        }
        assert_eq!(frames, 8);
        assert_eq!(total, 512);

        peer.settle(0, DeliveryState::accepted()).await;
        peer
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let sender = Sender::builder()
        .name("sender-1")
        .target(Target::new("q1"))
        .settle_mode(SenderSettleMode::Unsettled)
        .attach(&mut session)
        .await
        .unwrap();

    // a 504 byte data section encodes to exactly 512 bytes
    sender.send(vec![0xa5u8; 504]).await.unwrap();
    broker.await.unwrap();
}

/// Scenario: a rejected disposition detaches the link by default and the
/// rejection error surfaces wrapped in the detach error.
#[tokio::test]
async fn reject_detaches_by_default() {
    let (mut connection, mut peer) = open_pair(65536).await;

    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        peer.serve_attach(Peer::echo_attach).await;
        peer.grant_credit(0, 0, 100).await;

        let (transfer, _) = peer.expect_transfer().await;
        let reject = DeliveryState::rejected(Some(definitions::Error::new(
            Symbol::from("rejected"),
            None,
        )));
        peer.settle(transfer.delivery_id.unwrap(), reject).await;

        // the link detaches itself
        let detach = peer.expect_detach().await;
        assert!(detach.closed);
        peer.send(
            0,
            FrameBody::Detach(Detach {
                handle: 0,
                closed: true,
                error: None,
            }),
        )
        .await;
        peer
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let sender = Sender::builder()
        .name("sender-1")
        .target(Target::new("q1"))
        .settle_mode(SenderSettleMode::Unsettled)
        .attach(&mut session)
        .await
        .unwrap();

    let err = sender.send("boom").await.unwrap_err();
    match err {
        SendError::Detached(detach) => {
            assert_eq!(
                detach.remote_error.unwrap().condition,
                Symbol::from("rejected")
            );
        }
        other => panic!("expected a detach error, got {other:?}"),
    }
    broker.await.unwrap();
}

/// Scenario: with `ignore_disposition_errors` the rejection surfaces as-is
/// and the link keeps working.
#[tokio::test]
async fn reject_with_ignore_disposition_errors() {
    let (mut connection, mut peer) = open_pair(65536).await;

    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        peer.serve_attach(Peer::echo_attach).await;
        peer.grant_credit(0, 0, 100).await;

        let (transfer, _) = peer.expect_transfer().await;
        let reject = DeliveryState::rejected(Some(definitions::Error::new(
            Symbol::from("amqp:resource-limit-exceeded"),
            Some("throttled".to_string()),
        )));
        peer.settle(transfer.delivery_id.unwrap(), reject).await;

        // the link stays up and accepts the next delivery
        let (transfer, _) = peer.expect_transfer().await;
        peer.settle(transfer.delivery_id.unwrap(), DeliveryState::accepted())
            .await;
        peer
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let sender = Sender::builder()
        .name("sender-1")
        .target(Target::new("q1"))
        .settle_mode(SenderSettleMode::Unsettled)
        .ignore_disposition_errors(true)
        .attach(&mut session)
        .await
        .unwrap();

    let err = sender.send("first").await.unwrap_err();
    assert!(matches!(err, SendError::Rejected(_)));

    sender.send("second").await.unwrap();
    broker.await.unwrap();
}

/// Scenario: the peer grants a different sender settle mode than the one
/// explicitly requested.
#[tokio::test]
async fn settle_mode_mismatch_fails_attach() {
    let (mut connection, mut peer) = open_pair(65536).await;

    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        peer.serve_attach(|attach| {
            let mut reply = Peer::echo_attach(attach);
            reply.snd_settle_mode = SenderSettleMode::Unsettled;
            reply
        })
        .await;

        // the client gives up on the link with a closing detach
        let detach = peer.expect_detach().await;
        assert!(detach.closed);
        peer.send(
            0,
            FrameBody::Detach(Detach {
                handle: 0,
                closed: true,
                error: None,
            }),
        )
        .await;
        peer
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let err = Sender::builder()
        .name("sender-1")
        .target(Target::new("q1"))
        .settle_mode(SenderSettleMode::Settled)
        .attach(&mut session)
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        r#"sender settlement mode "settled" requested, received "unsettled" from server"#
    );
    broker.await.unwrap();
}

/// Requesting exactly-once (receiver settle mode second with an unsettled
/// sender) is refused before anything goes on the wire.
#[tokio::test]
async fn exactly_once_is_refused() {
    let (mut connection, mut peer) = open_pair(65536).await;
    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        peer
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let err = Sender::builder()
        .name("sender-1")
        .target(Target::new("q1"))
        .settle_mode(SenderSettleMode::Unsettled)
        .requested_receiver_settle_mode(ReceiverSettleMode::Second)
        .attach(&mut session)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "sender does not support exactly-once guarantee");
    broker.await.unwrap();
}

/// Scenario: no credit ever arrives; the send times out cleanly and a later
/// credit grant does not produce a phantom transfer.
#[tokio::test]
async fn credit_starvation_timeout() {
    let (mut connection, mut peer) = open_pair(65536).await;

    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        peer.serve_attach(Peer::echo_attach).await;
        peer
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let sender = Sender::builder()
        .name("sender-1")
        .target(Target::new("q1"))
        .settle_mode(SenderSettleMode::Unsettled)
        .attach(&mut session)
        .await
        .unwrap();
    let mut peer = broker.await.unwrap();

    let result = sender
        .send_with_timeout("late", Duration::from_millis(10))
        .await;
    assert!(result.is_err(), "expected the deadline to elapse");

    // grant credit after the fact; nothing must come out
    peer.grant_credit(0, 0, 100).await;
    let quiet = tokio::time::timeout(Duration::from_millis(100), peer.next_body()).await;
    assert!(quiet.is_err(), "no transfer may follow an abandoned send");
}

/// Scenario: drain on a manual-credit receiver blocks until the peer echoes
/// the drain flow.
#[tokio::test]
async fn manual_credit_drain_round_trip() {
    let (mut connection, mut peer) = open_pair(65536).await;

    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        peer.serve_attach(Peer::echo_attach).await;

        let flow = peer.expect_flow().await;
        assert_eq!(flow.link_credit, Some(1));
        assert!(!flow.drain);

        let flow = peer.expect_flow().await;
        assert!(flow.drain);
        assert_eq!(flow.link_credit, Some(1));

        // the sender consumed no messages; it advances delivery-count and
        // echoes drain
        let reply = Flow {
            next_incoming_id: Some(peer.next_incoming_id),
            incoming_window: 5000,
            next_outgoing_id: 0,
            outgoing_window: 5000,
            handle: Some(0),
            delivery_count: Some(flow.link_credit.unwrap()),
            link_credit: Some(0),
            drain: true,
            ..Default::default()
        };
        peer.send(0, FrameBody::Flow(reply)).await;
        peer
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let mut receiver = Receiver::builder()
        .name("receiver-1")
        .source("q1")
        .manual_credit(true)
        .credit(1)
        .attach(&mut session)
        .await
        .unwrap();

    receiver.issue_credit(1).await.unwrap();
    receiver.drain().await.unwrap();
    broker.await.unwrap();
}

/// Credit guards on a manual receiver: no credit during drain, no credit
/// past the queue capacity.
#[tokio::test]
async fn manual_credit_guards() {
    let (mut connection, mut peer) = open_pair(65536).await;

    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        peer.serve_attach(Peer::echo_attach).await;
        let _ = peer.expect_flow().await; // issue_credit(1)
        let _ = peer.expect_flow().await; // drain
        peer
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let mut receiver = Receiver::builder()
        .name("receiver-1")
        .source("q1")
        .manual_credit(true)
        .credit(2)
        .attach(&mut session)
        .await
        .unwrap();

    // would exceed the two-message queue capacity
    let err = receiver.issue_credit(3).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "link credit exceeded, too many outstanding messages"
    );

    receiver.issue_credit(1).await.unwrap();

    let mut drain = std::pin::pin!(receiver.drain());
    // the drain blocks until the echo; poll it once so the flow goes out
    assert!(tokio::time::timeout(Duration::from_millis(50), drain.as_mut())
        .await
        .is_err());
    broker.await.unwrap();
}

/// Auto-credit receiver: prefetch flows at attach, messages are assembled
/// and accepted, replenishment follows consumption.
#[tokio::test]
async fn receive_and_accept() {
    let (mut connection, mut peer) = open_pair(65536).await;

    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        peer.serve_attach(Peer::echo_attach).await;

        // prefetch window opens at attach
        let flow = peer.expect_flow().await;
        assert_eq!(flow.link_credit, Some(2));

        let mut buf = azurite_amqp::buffer::Buffer::new();
        Message::data(&b"payload"[..]).encode(&mut buf).unwrap();
        let transfer = Transfer {
            handle: 0,
            delivery_id: Some(0),
            delivery_tag: Some(Bytes::from_static(b"\x00\x01")),
            message_format: Some(0),
            settled: Some(false),
            ..Default::default()
        };
        peer.send(
            0,
            FrameBody::Transfer {
                performative: transfer,
                payload: buf.into_bytes(),
            },
        )
        .await;

        // the consumed prefetch is replenished before the settlement
        let replenish = peer.expect_flow().await;
        assert_eq!(replenish.link_credit, Some(2));

        let disposition = peer.expect_disposition().await;
        assert_eq!(disposition.role, Role::Receiver);
        assert_eq!(disposition.first, 0);
        assert!(disposition.settled);
        assert!(matches!(
            disposition.state,
            Some(DeliveryState::Accepted(_))
        ));
        peer
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let mut receiver = Receiver::builder()
        .name("receiver-1")
        .source("q1")
        .credit(2)
        .attach(&mut session)
        .await
        .unwrap();

    let delivery = receiver.receive().await.unwrap();
    assert_eq!(delivery.delivery_id(), 0);
    assert_eq!(
        delivery.message().body,
        Body::Data(vec![Bytes::from_static(b"payload")])
    );
    receiver.accept(&delivery).await.unwrap();
    broker.await.unwrap();
}

/// A delivery split across transfers is assembled before it reaches the
/// application.
#[tokio::test]
async fn multi_frame_receive() {
    let (mut connection, mut peer) = open_pair(65536).await;

    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        peer.serve_attach(Peer::echo_attach).await;
        let _ = peer.expect_flow().await;

        let mut buf = azurite_amqp::buffer::Buffer::new();
        Message::value("a long and winding body").encode(&mut buf).unwrap();
        let encoded = buf.into_bytes();
        let (head, tail) = encoded.split_at(7);

        peer.send(
            0,
            FrameBody::Transfer {
                performative: Transfer {
                    handle: 0,
                    delivery_id: Some(0),
                    delivery_tag: Some(Bytes::from_static(b"t")),
                    message_format: Some(0),
                    more: true,
                    ..Default::default()
                },
                payload: Bytes::copy_from_slice(head),
            },
        )
        .await;
        peer.send(
            0,
            FrameBody::Transfer {
                performative: Transfer {
                    handle: 0,
                    settled: Some(true),
                    more: false,
                    ..Default::default()
                },
                payload: Bytes::copy_from_slice(tail),
            },
        )
        .await;
        peer
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let mut receiver = Receiver::builder()
        .name("receiver-1")
        .source("q1")
        .credit(1)
        .attach(&mut session)
        .await
        .unwrap();

    let delivery = receiver.receive().await.unwrap();
    assert!(delivery.is_settled());
    assert_eq!(
        delivery.message().body,
        Body::Value(Value::String("a long and winding body".to_string()))
    );
    broker.await.unwrap();
}

/// An unsettled disposition from the peer is answered with the sender's
/// settling disposition.
#[tokio::test]
async fn sender_settles_after_unsettled_disposition() {
    let (mut connection, mut peer) = open_pair(65536).await;

    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        peer.serve_attach(Peer::echo_attach).await;
        peer.grant_credit(0, 0, 10).await;

        let (transfer, _) = peer.expect_transfer().await;
        let disposition = Disposition {
            role: Role::Receiver,
            first: transfer.delivery_id.unwrap(),
            last: None,
            settled: false,
            state: Some(DeliveryState::accepted()),
            batchable: false,
        };
        peer.send(0, FrameBody::Disposition(disposition)).await;

        let settling = peer.expect_disposition().await;
        assert_eq!(settling.role, Role::Sender);
        assert_eq!(settling.first, transfer.delivery_id.unwrap());
        assert!(settling.settled);
        peer
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let sender = Sender::builder()
        .name("sender-1")
        .target(Target::new("q1"))
        .settle_mode(SenderSettleMode::Unsettled)
        .attach(&mut session)
        .await
        .unwrap();

    sender.send("settle me").await.unwrap();
    broker.await.unwrap();
}

/// A full clean teardown: link, session, connection.
#[tokio::test]
async fn orderly_shutdown() {
    let (mut connection, mut peer) = open_pair(65536).await;

    let broker = tokio::spawn(async move {
        peer.serve_begin().await;
        peer.serve_attach(Peer::echo_attach).await;
        peer.grant_credit(0, 0, 1).await;
        let (transfer, _) = peer.expect_transfer().await;
        peer.settle(transfer.delivery_id.unwrap(), DeliveryState::accepted())
            .await;
        peer.serve_shutdown().await;
    });

    let mut session = Session::begin(&mut connection).await.unwrap();
    let sender = Sender::builder()
        .name("sender-1")
        .target(Target::new("q1"))
        .settle_mode(SenderSettleMode::Unsettled)
        .attach(&mut session)
        .await
        .unwrap();

    sender.send("bye").await.unwrap();
    sender.close().await.unwrap();
    session.end().await.unwrap();
    connection.close().await.unwrap();
    broker.await.unwrap();
}
