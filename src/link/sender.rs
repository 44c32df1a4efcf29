//! The sending half of a link.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::error::Elapsed;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::buffer::Buffer;
use crate::control::SessionControl;
use crate::definitions::{
    self, condition, DeliveryNumber, DeliveryTag, Handle, MessageFormat, ReceiverSettleMode,
    Role, SenderSettleMode, SequenceNo, MAX_DELIVERY_TAG_LENGTH,
};
use crate::frames::MAX_TRANSFER_FRAME_HEADER;
use crate::link::builder::{close_rejected_attach, exchange_attach, AttachOutcome};
use crate::link::{
    AttachError, DetachError, LinkFrame, LinkIncoming, LinkState, LinkTransfer, SendError,
    Sendable, SenderBuilder,
};
use crate::messaging::{DeliveryState, Source, Target};
use crate::performatives::{Attach, Detach, Disposition, Flow, Transfer};
use crate::primitives::Symbol;
use crate::session::SessionHandle;
use crate::util::random_name;

/// An AMQP 1.0 sender.
///
/// ```rust,ignore
/// let mut sender = Sender::attach(&mut session, "sender-1", "q1").await?;
/// sender.send("hello").await?;
/// sender.close().await?;
/// ```
///
/// `send` is safe to call concurrently; a delivery occupies the link only
/// while its transfer frames are being emitted, so waiting for settlement of
/// one delivery does not block the next.
pub struct Sender {
    command: mpsc::Sender<SenderCommand>,
    detached: watch::Receiver<Option<DetachError>>,
    name: String,
    address: Option<String>,
    max_message_size: u64,
    snd_settle_mode: SenderSettleMode,
    rcv_settle_mode: ReceiverSettleMode,
    detach_on_reject: bool,
    scratch: Mutex<Scratch>,
}

/// Serialisation scratch space shared by concurrent `send` callers.
struct Scratch {
    buf: Buffer,
    next_delivery_tag: u64,
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish()
    }
}

enum SenderCommand {
    Send(SendRequest),
    Close {
        responder: oneshot::Sender<Result<(), DetachError>>,
    },
}

struct SendRequest {
    payload: Bytes,
    delivery_tag: DeliveryTag,
    message_format: MessageFormat,
    settled: bool,
    responder: oneshot::Sender<Result<Option<DeliveryState>, SendError>>,
}

impl Sender {
    /// Creates a builder for a [`Sender`] link.
    pub fn builder() -> SenderBuilder {
        SenderBuilder::new()
    }

    /// Attaches a sender to the session with default configuration.
    pub async fn attach(
        session: &mut SessionHandle,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Result<Sender, AttachError> {
        Self::builder()
            .name(name)
            .target(Target::new(address))
            .attach(session)
            .await
    }

    /// The name of the link.
    pub fn link_name(&self) -> &str {
        &self.name
    }

    /// The target address, which for a dynamic link is assigned by the peer.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// The peer's max-message-size for this link; zero means unlimited.
    pub fn max_message_size(&self) -> u64 {
        self.max_message_size
    }

    /// Sends a message and waits for its settlement.
    ///
    /// Returns `Ok` once the peer accepts (or for sender-settled deliveries,
    /// once the transfer is emitted). A rejected delivery either detaches the
    /// link (the default) or surfaces [`SendError::Rejected`] when the link
    /// was built with `ignore_disposition_errors`.
    pub async fn send(&self, sendable: impl Into<Sendable>) -> Result<(), SendError> {
        let Sendable {
            message,
            message_format,
            settled,
            delivery_tag,
        } = sendable.into();

        let (payload, delivery_tag) = {
            let mut scratch = self
                .scratch
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            scratch.buf.reset();
            message.encode(&mut scratch.buf)?;
            if self.max_message_size != 0 && scratch.buf.len() as u64 > self.max_message_size {
                return Err(SendError::MessageTooLarge {
                    size: scratch.buf.len() as u64,
                    max: self.max_message_size,
                });
            }
            let delivery_tag = match delivery_tag {
                Some(tag) => {
                    if tag.len() > MAX_DELIVERY_TAG_LENGTH {
                        return Err(SendError::DeliveryTagTooLong(tag.len()));
                    }
                    tag
                }
                None => {
                    let tag = Bytes::copy_from_slice(&scratch.next_delivery_tag.to_be_bytes());
                    scratch.next_delivery_tag += 1;
                    tag
                }
            };
            (Bytes::copy_from_slice(scratch.buf.unread()), delivery_tag)
        };

        let settled = match self.snd_settle_mode {
            SenderSettleMode::Settled => true,
            SenderSettleMode::Unsettled => false,
            SenderSettleMode::Mixed => settled.unwrap_or(false),
        };

        let (responder, response) = oneshot::channel();
        let request = SendRequest {
            payload,
            delivery_tag,
            message_format,
            settled,
            responder,
        };
        if self
            .command
            .send(SenderCommand::Send(request))
            .await
            .is_err()
        {
            return Err(self.latched_error());
        }

        match response.await {
            Ok(Ok(None)) => Ok(()),
            Ok(Ok(Some(state))) => match state {
                DeliveryState::Rejected(rejected) => {
                    if self.detach_on_reject() {
                        Err(SendError::Detached(DetachError {
                            is_closed_by_remote: false,
                            remote_error: rejected.error,
                        }))
                    } else {
                        Err(SendError::Rejected(rejected))
                    }
                }
                _ => Ok(()),
            },
            Ok(Err(err)) => Err(err),
            Err(_) => Err(self.latched_error()),
        }
    }

    /// [`Sender::send`] bounded by a deadline. The delivery is abandoned if
    /// the deadline passes before any transfer frame went out; a later
    /// credit grant will not produce a phantom transfer.
    pub async fn send_with_timeout(
        &self,
        sendable: impl Into<Sendable>,
        duration: Duration,
    ) -> Result<Result<(), SendError>, Elapsed> {
        timeout(duration, self.send(sendable)).await
    }

    /// Closes the link with a closed-Detach exchange.
    pub async fn close(self) -> Result<(), DetachError> {
        let (responder, response) = oneshot::channel();
        if self
            .command
            .send(SenderCommand::Close { responder })
            .await
            .is_err()
        {
            return match self.detached.borrow().clone() {
                Some(error) => Err(error),
                None => Ok(()),
            };
        }
        match response.await {
            Ok(result) => result,
            Err(_) => match self.detached.borrow().clone() {
                Some(error) => Err(error),
                None => Ok(()),
            },
        }
    }

    /// Detaching on rejection only applies while dispositions settle in
    /// first mode; in second mode the rejection is part of the settlement
    /// exchange.
    fn detach_on_reject(&self) -> bool {
        self.detach_on_reject && self.rcv_settle_mode == ReceiverSettleMode::First
    }

    fn latched_error(&self) -> SendError {
        match self.detached.borrow().clone() {
            Some(error) => SendError::Detached(error),
            None => SendError::SessionDropped,
        }
    }
}

pub(crate) async fn attach_sender(
    builder: SenderBuilder,
    session: &mut SessionHandle,
) -> Result<Sender, AttachError> {
    let snd_settle_mode = builder.settle_mode.unwrap_or_default();

    // Sending unsettled while the receiver settles in second mode would
    // require unsettled state to survive reconnects, which this client does
    // not keep.
    if builder.requested_receiver_settle_mode == Some(ReceiverSettleMode::Second)
        && snd_settle_mode != SenderSettleMode::Settled
    {
        return Err(AttachError::ExactlyOnceUnsupported);
    }

    if let Some(properties) = &builder.properties {
        if properties.iter().any(|(key, _)| key.as_str().is_empty()) {
            return Err(AttachError::InvalidOption(
                "link property key must not be empty",
            ));
        }
    }

    let name = builder.name.clone().unwrap_or_else(random_name);
    let mut target = builder.target.clone().unwrap_or_default();
    if builder.dynamic_address {
        target.address = None;
        target.dynamic = true;
    }

    let source = Source {
        address: builder.source_address.clone(),
        durable: builder.durability,
        expiry_policy: builder.expiry_policy,
        timeout: builder.expiry_timeout,
        capabilities: builder.capabilities.clone(),
        ..Default::default()
    };

    let attach = Attach {
        name: name.clone(),
        handle: 0,
        role: Role::Sender,
        snd_settle_mode,
        rcv_settle_mode: builder.requested_receiver_settle_mode.unwrap_or_default(),
        source: Some(source),
        target: Some(target),
        initial_delivery_count: Some(0),
        properties: builder.properties.clone(),
        ..Default::default()
    };

    let AttachOutcome {
        output_handle,
        mut incoming,
        remote_attach,
    } = exchange_attach(session, attach).await?;

    // a reply without a target means the peer refused the link and will
    // follow up with a detach carrying the reason
    if remote_attach.target.is_none() {
        let error = close_rejected_attach(session, output_handle, &mut incoming).await;
        return Err(AttachError::RejectedByRemote(error));
    }

    if let Some(requested) = builder.settle_mode {
        if remote_attach.snd_settle_mode != requested {
            let _ = close_rejected_attach(session, output_handle, &mut incoming).await;
            return Err(AttachError::SettleModeMismatch {
                requested,
                granted: remote_attach.snd_settle_mode,
            });
        }
    }

    let address = if builder.dynamic_address {
        remote_attach.target.as_ref().and_then(|t| t.address.clone())
    } else {
        builder.target.and_then(|t| t.address)
    };
    let max_message_size = remote_attach.max_message_size.unwrap_or(0);
    let rcv_settle_mode = remote_attach.rcv_settle_mode;

    let (command_tx, command_rx) = mpsc::channel(32);
    let (detached_tx, detached_rx) = watch::channel(None);

    let link = SenderLink {
        output_handle,
        outgoing: session.outgoing.clone(),
        transfers: session.outgoing_transfers.clone(),
        session_control: session.control.clone(),
        incoming,
        commands: command_rx,
        next_delivery_id: session.next_delivery_id.clone(),
        peer_max_frame_size: session.peer_max_frame_size,
        delivery_count: 0,
        link_credit: 0,
        detach_on_reject: !builder.ignore_disposition_errors,
        rcv_settle_mode,
        unsettled: std::collections::BTreeMap::new(),
        pending: None,
        detached_tx,
        state: LinkState::Attached,
    };
    tokio::spawn(link.event_loop());

    Ok(Sender {
        command: command_tx,
        detached: detached_rx,
        name,
        address,
        max_message_size,
        snd_settle_mode: remote_attach.snd_settle_mode,
        rcv_settle_mode,
        detach_on_reject: !builder.ignore_disposition_errors,
        scratch: Mutex::new(Scratch {
            buf: Buffer::new(),
            next_delivery_tag: 0,
        }),
    })
}

/// The sender's event loop: single consumer of send requests, single owner
/// of credit and unsettled-delivery state.
struct SenderLink {
    output_handle: Handle,
    outgoing: mpsc::Sender<LinkFrame>,
    transfers: mpsc::Sender<LinkTransfer>,
    session_control: mpsc::Sender<SessionControl>,
    incoming: mpsc::Receiver<LinkIncoming>,
    commands: mpsc::Receiver<SenderCommand>,
    next_delivery_id: Arc<AtomicU32>,
    peer_max_frame_size: u32,
    delivery_count: SequenceNo,
    link_credit: u32,
    detach_on_reject: bool,
    rcv_settle_mode: ReceiverSettleMode,
    unsettled:
        std::collections::BTreeMap<DeliveryNumber, oneshot::Sender<Result<Option<DeliveryState>, SendError>>>,
    pending: Option<SendRequest>,
    detached_tx: watch::Sender<Option<DetachError>>,
    state: LinkState,
}

enum Verdict {
    Continue,
    Detached(DetachError),
}

impl SenderLink {
    async fn event_loop(mut self) {
        let error = loop {
            if self.link_credit > 0 {
                if let Some(request) = self.pending.take() {
                    if let Some(error) = self.emit_transfers(request).await {
                        break error;
                    }
                    continue;
                }
            }

            tokio::select! {
                incoming = self.incoming.recv() => {
                    match incoming {
                        Some(frame) => match self.on_incoming(frame).await {
                            Verdict::Continue => {}
                            Verdict::Detached(error) => break error,
                        },
                        // session engine is gone
                        None => break DetachError::default(),
                    }
                },
                command = self.commands.recv(), if self.pending.is_none() => {
                    match command {
                        Some(SenderCommand::Send(request)) => {
                            if self.link_credit > 0 {
                                if let Some(error) = self.emit_transfers(request).await {
                                    break error;
                                }
                            } else {
                                trace!(handle = self.output_handle, "sender idle: no link credit");
                                self.pending = Some(request);
                            }
                        }
                        Some(SenderCommand::Close { responder }) => {
                            let result = self.close_exchange().await;
                            let error = match &result {
                                Ok(()) => DetachError::default(),
                                Err(err) => err.clone(),
                            };
                            let _ = responder.send(result);
                            self.finish(error);
                            return;
                        }
                        // handle dropped without close; detach quietly
                        None => {
                            let error = match self.close_exchange().await {
                                Ok(()) => DetachError::default(),
                                Err(err) => err,
                            };
                            self.finish(error);
                            return;
                        }
                    }
                },
            }
        };

        // terminal: tell the peer if it does not already know
        if self.state == LinkState::Attached {
            let _ = self
                .outgoing
                .send(LinkFrame::Detach(Detach {
                    handle: self.output_handle,
                    closed: true,
                    error: None,
                }))
                .await;
        }
        let _ = self
            .session_control
            .send(SessionControl::DeallocateLink(self.output_handle))
            .await;
        self.finish(error);
    }

    /// Emits the transfer frames of one delivery. Returns a detach error
    /// only when the session vanished mid-delivery.
    async fn emit_transfers(&mut self, request: SendRequest) -> Option<DetachError> {
        let SendRequest {
            mut payload,
            delivery_tag,
            message_format,
            settled,
            responder,
        } = request;

        // the caller gave up before any frame went out; nothing was
        // committed, so nothing is sent
        if responder.is_closed() {
            debug!(handle = self.output_handle, "send abandoned before emission");
            return None;
        }

        let delivery_id = self.next_delivery_id.fetch_add(1, Ordering::Relaxed);
        let max_payload = self.peer_max_frame_size as usize - MAX_TRANSFER_FRAME_HEADER;

        let mut first = true;
        loop {
            let chunk = payload.split_to(payload.len().min(max_payload));
            let more = !payload.is_empty();
            let performative = Transfer {
                handle: self.output_handle,
                delivery_id: first.then_some(delivery_id),
                delivery_tag: first.then(|| delivery_tag.clone()),
                message_format: first.then_some(message_format),
                settled: (!more).then_some(settled),
                more,
                ..Default::default()
            };
            first = false;

            if self
                .transfers
                .send(LinkTransfer {
                    performative,
                    payload: chunk,
                })
                .await
                .is_err()
            {
                let _ = responder.send(Err(SendError::SessionDropped));
                return Some(DetachError::default());
            }
            if !more {
                break;
            }
        }

        // credit is consumed by the delivery, not by its frames
        self.delivery_count = self.delivery_count.wrapping_add(1);
        self.link_credit -= 1;
        trace!(
            handle = self.output_handle,
            delivery_id,
            link_credit = self.link_credit,
            "delivery emitted"
        );

        if settled {
            let _ = responder.send(Ok(None));
        } else {
            self.unsettled.insert(delivery_id, responder);
        }
        None
    }

    async fn on_incoming(&mut self, frame: LinkIncoming) -> Verdict {
        match frame {
            LinkIncoming::Flow(flow) => self.on_flow(flow).await,
            LinkIncoming::Disposition { id, settled, state } => {
                self.on_disposition(id, settled, state).await
            }
            LinkIncoming::Detach(detach) => {
                // remote-initiated detach; answer in kind and latch
                let error = DetachError {
                    is_closed_by_remote: detach.closed,
                    remote_error: detach.error,
                };
                let _ = self
                    .outgoing
                    .send(LinkFrame::Detach(Detach {
                        handle: self.output_handle,
                        closed: true,
                        error: None,
                    }))
                    .await;
                self.state = LinkState::Closed;
                Verdict::Detached(error)
            }
            LinkIncoming::Transfer { .. } => {
                // a transfer addressed to a sender is a per-link protocol
                // violation
                let error = definitions::Error::new(
                    Symbol::from(condition::NOT_ALLOWED),
                    Some("transfer on a sender link".to_string()),
                );
                Verdict::Detached(DetachError::with_error(error))
            }
            LinkIncoming::Attach(_) => {
                warn!(handle = self.output_handle, "unexpected attach ignored");
                Verdict::Continue
            }
        }
    }

    async fn on_flow(&mut self, flow: Flow) -> Verdict {
        // link-credit_snd := delivery-count_rcv + link-credit_rcv
        //                    - delivery-count_snd
        if let Some(link_credit) = flow.link_credit {
            let delivery_count_rcv = flow.delivery_count.unwrap_or(0);
            self.link_credit = delivery_count_rcv
                .wrapping_add(link_credit)
                .wrapping_sub(self.delivery_count);
        }
        trace!(
            handle = self.output_handle,
            link_credit = self.link_credit,
            drain = flow.drain,
            "RX flow"
        );

        if flow.drain {
            // consume all credit and report the advanced delivery-count
            self.delivery_count = self.delivery_count.wrapping_add(self.link_credit);
            self.link_credit = 0;
            return self.send_link_flow(true).await;
        }
        if flow.echo {
            return self.send_link_flow(false).await;
        }
        Verdict::Continue
    }

    async fn send_link_flow(&mut self, drain: bool) -> Verdict {
        let flow = Flow {
            handle: Some(self.output_handle),
            delivery_count: Some(self.delivery_count),
            link_credit: Some(self.link_credit),
            drain,
            ..Default::default()
        };
        match self.outgoing.send(LinkFrame::Flow(flow)).await {
            Ok(()) => Verdict::Continue,
            Err(_) => Verdict::Detached(DetachError::default()),
        }
    }

    async fn on_disposition(
        &mut self,
        id: DeliveryNumber,
        settled: bool,
        state: Option<DeliveryState>,
    ) -> Verdict {
        let rejected = matches!(&state, Some(DeliveryState::Rejected(_)));
        if rejected && self.detach_on_reject && self.rcv_settle_mode == ReceiverSettleMode::First
        {
            // surface the rejection to its caller, fail everyone else with
            // the detach
            let remote_error = match state {
                Some(DeliveryState::Rejected(rejected)) => rejected.error,
                _ => None,
            };
            if let Some(responder) = self.unsettled.remove(&id) {
                let _ = responder.send(Ok(Some(DeliveryState::rejected(remote_error.clone()))));
            }
            return Verdict::Detached(DetachError {
                is_closed_by_remote: false,
                remote_error,
            });
        }

        if let Some(responder) = self.unsettled.remove(&id) {
            let _ = responder.send(Ok(state));
        }
        if !settled {
            // the receiver still holds the delivery as unsettled; settle it
            let disposition = Disposition {
                role: Role::Sender,
                first: id,
                last: None,
                settled: true,
                state: None,
                batchable: false,
            };
            if self
                .outgoing
                .send(LinkFrame::Disposition(disposition))
                .await
                .is_err()
            {
                return Verdict::Detached(DetachError::default());
            }
        }
        Verdict::Continue
    }

    /// Local close: send the closing detach and wait for the peer's.
    async fn close_exchange(&mut self) -> Result<(), DetachError> {
        if self
            .outgoing
            .send(LinkFrame::Detach(Detach {
                handle: self.output_handle,
                closed: true,
                error: None,
            }))
            .await
            .is_err()
        {
            return Err(DetachError::default());
        }
        self.state = LinkState::CloseSent;

        let result = loop {
            match self.incoming.recv().await {
                Some(LinkIncoming::Detach(detach)) => {
                    break match detach.error {
                        Some(error) => Err(DetachError::closed_by_remote(Some(error))),
                        None => Ok(()),
                    };
                }
                Some(LinkIncoming::Disposition { id, settled, state }) => {
                    // settlements may still race the detach
                    let _ = self.on_disposition(id, settled, state).await;
                }
                Some(_) => continue,
                None => break Err(DetachError::default()),
            }
        };
        self.state = LinkState::Closed;
        let _ = self
            .session_control
            .send(SessionControl::DeallocateLink(self.output_handle))
            .await;
        result
    }

    /// Latches the terminal state and fails everything still pending.
    fn finish(&mut self, error: DetachError) {
        if let Some(request) = self.pending.take() {
            let _ = request
                .responder
                .send(Err(SendError::Detached(error.clone())));
        }
        for (_, responder) in std::mem::take(&mut self.unsettled) {
            let _ = responder.send(Err(SendError::Detached(error.clone())));
        }
        let has_remote_reason = error.is_closed_by_remote || error.remote_error.is_some();
        let _ = self
            .detached_tx
            .send(has_remote_reason.then_some(error));
    }
}
