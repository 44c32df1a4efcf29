//! The receiving half of a link.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::error::Elapsed;
use tokio::time::timeout;
use tracing::{trace, warn};

use crate::buffer::Buffer;
use crate::control::SessionControl;
use crate::definitions::{
    self, condition, DeliveryNumber, DeliveryTag, Handle, MessageFormat, ReceiverSettleMode,
    Role, SequenceNo,
};
use crate::link::builder::{close_rejected_attach, exchange_attach, AttachOutcome};
use crate::link::{
    AttachError, Delivery, DetachError, LinkFrame, LinkIncoming, LinkState, ReceiverBuilder,
    RecvError,
};
use crate::messaging::{DeliveryState, Message, Modified, Source, Target};
use crate::performatives::{Attach, Detach, Disposition, Flow};
use crate::primitives::Symbol;
use crate::session::SessionHandle;
use crate::util::random_name;

/// An AMQP 1.0 receiver.
///
/// ```rust,ignore
/// let mut receiver = Receiver::attach(&mut session, "receiver-1", "q1").await?;
/// let delivery = receiver.receive().await?;
/// receiver.accept(&delivery).await?;
/// ```
pub struct Receiver {
    command: mpsc::UnboundedSender<ReceiverCommand>,
    deliveries: mpsc::Receiver<Delivery>,
    detached: watch::Receiver<Option<DetachError>>,
    name: String,
    address: Option<String>,
    manual_credit: bool,
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish()
    }
}

enum ReceiverCommand {
    /// The application took one message off the queue.
    Consumed,
    IssueCredit {
        credits: u32,
        responder: oneshot::Sender<Result<(), RecvError>>,
    },
    Drain {
        responder: oneshot::Sender<Result<(), RecvError>>,
    },
    Dispose {
        delivery_id: DeliveryNumber,
        state: DeliveryState,
        responder: oneshot::Sender<Result<(), RecvError>>,
    },
    Close {
        responder: oneshot::Sender<Result<(), DetachError>>,
    },
}

impl Receiver {
    /// Creates a builder for a [`Receiver`] link.
    pub fn builder() -> ReceiverBuilder {
        ReceiverBuilder::new()
    }

    /// Attaches a receiver to the session with default configuration
    /// (auto-credit with a prefetch of one).
    pub async fn attach(
        session: &mut SessionHandle,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Receiver, AttachError> {
        Self::builder()
            .name(name)
            .source(source)
            .attach(session)
            .await
    }

    pub fn link_name(&self) -> &str {
        &self.name
    }

    /// The source address, which for a dynamic link is assigned by the peer.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Waits for the next delivery.
    pub async fn receive(&mut self) -> Result<Delivery, RecvError> {
        match self.deliveries.recv().await {
            Some(delivery) => {
                let _ = self.command.send(ReceiverCommand::Consumed);
                Ok(delivery)
            }
            None => Err(self.latched_error()),
        }
    }

    /// [`Receiver::receive`] bounded by a deadline.
    pub async fn receive_with_timeout(
        &mut self,
        duration: Duration,
    ) -> Result<Result<Delivery, RecvError>, Elapsed> {
        timeout(duration, self.receive()).await
    }

    /// Accepts the delivery.
    pub async fn accept(&mut self, delivery: &Delivery) -> Result<(), RecvError> {
        self.dispose(delivery, DeliveryState::accepted()).await
    }

    /// Rejects the delivery, optionally naming the reason.
    pub async fn reject(
        &mut self,
        delivery: &Delivery,
        error: Option<definitions::Error>,
    ) -> Result<(), RecvError> {
        self.dispose(delivery, DeliveryState::rejected(error)).await
    }

    /// Releases the delivery back to the sender.
    pub async fn release(&mut self, delivery: &Delivery) -> Result<(), RecvError> {
        self.dispose(delivery, DeliveryState::released()).await
    }

    /// Modifies and releases the delivery.
    pub async fn modify(
        &mut self,
        delivery: &Delivery,
        modified: Modified,
    ) -> Result<(), RecvError> {
        self.dispose(delivery, DeliveryState::Modified(modified))
            .await
    }

    async fn dispose(
        &mut self,
        delivery: &Delivery,
        state: DeliveryState,
    ) -> Result<(), RecvError> {
        if delivery.is_settled() {
            // the sender settled on transfer; there is nothing to dispose
            return Ok(());
        }
        let (responder, response) = oneshot::channel();
        self.command
            .send(ReceiverCommand::Dispose {
                delivery_id: delivery.delivery_id,
                state,
                responder,
            })
            .map_err(|_| self.latched_error())?;
        response.await.map_err(|_| self.latched_error())?
    }

    /// Grants `credits` more deliveries to the sender. Only valid on links
    /// built with `manual_credit`.
    pub async fn issue_credit(&mut self, credits: u32) -> Result<(), RecvError> {
        let (responder, response) = oneshot::channel();
        self.command
            .send(ReceiverCommand::IssueCredit { credits, responder })
            .map_err(|_| self.latched_error())?;
        response.await.map_err(|_| self.latched_error())?
    }

    /// Asks the sender to use up or void all outstanding credit, and waits
    /// for the flow echo that confirms it.
    pub async fn drain(&mut self) -> Result<(), RecvError> {
        let (responder, response) = oneshot::channel();
        self.command
            .send(ReceiverCommand::Drain { responder })
            .map_err(|_| self.latched_error())?;
        response.await.map_err(|_| self.latched_error())?
    }

    /// Closes the link with a closed-Detach exchange.
    pub async fn close(self) -> Result<(), DetachError> {
        let (responder, response) = oneshot::channel();
        if self
            .command
            .send(ReceiverCommand::Close { responder })
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

    /// Whether this link uses manual credit management.
    pub fn is_manual_credit(&self) -> bool {
        self.manual_credit
    }

    fn latched_error(&self) -> RecvError {
        match self.detached.borrow().clone() {
            Some(error) => RecvError::Detached(error),
            None => RecvError::SessionDropped,
        }
    }
}

pub(crate) async fn attach_receiver(
    builder: ReceiverBuilder,
    session: &mut SessionHandle,
) -> Result<Receiver, AttachError> {
    let name = builder.name.clone().unwrap_or_else(random_name);

    let source = Source {
        address: if builder.dynamic_address {
            None
        } else {
            builder.source_address.clone()
        },
        durable: builder.durability,
        expiry_policy: builder.expiry_policy,
        timeout: builder.expiry_timeout,
        dynamic: builder.dynamic_address,
        filter: builder.filters.clone(),
        ..Default::default()
    };

    let attach = Attach {
        name: name.clone(),
        handle: 0,
        role: Role::Receiver,
        source: Some(source),
        target: Some(Target::default()),
        properties: builder.properties.clone(),
        ..Default::default()
    };

    let AttachOutcome {
        output_handle,
        mut incoming,
        remote_attach,
    } = exchange_attach(session, attach).await?;

    // a reply without a source means the peer refused the link
    if remote_attach.source.is_none() {
        let error = close_rejected_attach(session, output_handle, &mut incoming).await;
        return Err(AttachError::RejectedByRemote(error));
    }

    let address = if builder.dynamic_address {
        remote_attach.source.as_ref().and_then(|s| s.address.clone())
    } else {
        builder.source_address
    };

    let capacity = builder.credit.max(1);
    let (deliveries_tx, deliveries_rx) = mpsc::channel(capacity as usize);
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (detached_tx, detached_rx) = watch::channel(None);

    let link = ReceiverLink {
        output_handle,
        outgoing: session.outgoing.clone(),
        session_control: session.control.clone(),
        incoming,
        commands: command_rx,
        deliveries: deliveries_tx,
        rcv_settle_mode: remote_attach.rcv_settle_mode,
        auto_credit: !builder.manual_credit,
        target_credit: builder.credit,
        link_credit: 0,
        delivery_count: remote_attach.initial_delivery_count.unwrap_or(0),
        consumed: 0,
        in_queue: 0,
        draining: None,
        incomplete: None,
        pending_second: BTreeMap::new(),
        detached_tx,
        state: LinkState::Attached,
    };
    tokio::spawn(link.event_loop());

    Ok(Receiver {
        command: command_tx,
        deliveries: deliveries_rx,
        detached: detached_rx,
        name,
        address,
        manual_credit: builder.manual_credit,
    })
}

/// A delivery whose transfer frames have not all arrived yet.
struct IncompleteDelivery {
    delivery_id: DeliveryNumber,
    delivery_tag: DeliveryTag,
    message_format: MessageFormat,
    settled: bool,
    buffer: BytesMut,
}

/// The receiver's event loop: owns credit, assembly, and settlement state.
struct ReceiverLink {
    output_handle: Handle,
    outgoing: mpsc::Sender<LinkFrame>,
    session_control: mpsc::Sender<SessionControl>,
    incoming: mpsc::Receiver<LinkIncoming>,
    commands: mpsc::UnboundedReceiver<ReceiverCommand>,
    deliveries: mpsc::Sender<Delivery>,
    rcv_settle_mode: ReceiverSettleMode,
    auto_credit: bool,
    /// Prefetch target in auto mode; queue capacity in manual mode.
    target_credit: u32,
    link_credit: u32,
    delivery_count: SequenceNo,
    /// Credit consumed by the application since the last replenishment.
    consumed: u32,
    /// Deliveries handed to the queue but not yet taken by the application.
    in_queue: u32,
    draining: Option<oneshot::Sender<Result<(), RecvError>>>,
    incomplete: Option<IncompleteDelivery>,
    /// Second-mode settlements waiting for the sender's settling
    /// disposition.
    pending_second: BTreeMap<DeliveryNumber, DeliveryState>,
    detached_tx: watch::Sender<Option<DetachError>>,
    state: LinkState,
}

enum Verdict {
    Continue,
    Detached(DetachError),
}

impl ReceiverLink {
    async fn event_loop(mut self) {
        // open the gate: grant the prefetch window up front
        if self.auto_credit && self.target_credit > 0 {
            self.link_credit = self.target_credit;
            if let Verdict::Detached(error) = self.send_link_flow(false).await {
                self.finish(error);
                return;
            }
        }

        let error = loop {
            tokio::select! {
                incoming = self.incoming.recv() => {
                    match incoming {
                        Some(frame) => match self.on_incoming(frame).await {
                            Verdict::Continue => {}
                            Verdict::Detached(error) => break error,
                        },
                        None => break DetachError::default(),
                    }
                },
                command = self.commands.recv() => {
                    match command {
                        Some(ReceiverCommand::Consumed) => {
                            if let Verdict::Detached(error) = self.on_consumed().await {
                                break error;
                            }
                        }
                        Some(ReceiverCommand::IssueCredit { credits, responder }) => {
                            let result = self.on_issue_credit(credits).await;
                            match result {
                                Ok(verdict) => {
                                    let _ = responder.send(Ok(()));
                                    if let Verdict::Detached(error) = verdict {
                                        break error;
                                    }
                                }
                                Err(err) => {
                                    let _ = responder.send(Err(err));
                                }
                            }
                        }
                        Some(ReceiverCommand::Drain { responder }) => {
                            if let Some(error) = self.on_drain(responder).await {
                                break error;
                            }
                        }
                        Some(ReceiverCommand::Dispose { delivery_id, state, responder }) => {
                            let verdict = self.on_dispose(delivery_id, state).await;
                            let _ = responder.send(Ok(()));
                            if let Verdict::Detached(error) = verdict {
                                break error;
                            }
                        }
                        Some(ReceiverCommand::Close { responder }) => {
                            let result = self.close_exchange().await;
                            let error = match &result {
                                Ok(()) => DetachError::default(),
                                Err(err) => err.clone(),
                            };
                            let _ = responder.send(result);
                            self.finish(error);
                            return;
                        }
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

        if self.state == LinkState::Attached {
            let _ = self
                .outgoing
                .send(LinkFrame::Detach(Detach {
                    handle: self.output_handle,
                    closed: true,
                    error: error.remote_error.clone().filter(|_| !error.is_closed_by_remote),
                }))
                .await;
        }
        let _ = self
            .session_control
            .send(SessionControl::DeallocateLink(self.output_handle))
            .await;
        self.finish(error);
    }

    async fn on_incoming(&mut self, frame: LinkIncoming) -> Verdict {
        match frame {
            LinkIncoming::Transfer {
                performative,
                payload,
            } => self.on_transfer(performative, payload).await,
            LinkIncoming::Flow(flow) => self.on_flow(flow).await,
            LinkIncoming::Disposition { id, settled, .. } => {
                if settled {
                    // second mode: the sender settled; finish the exchange
                    if let Some(state) = self.pending_second.remove(&id) {
                        return self.send_disposition(id, true, Some(state)).await;
                    }
                }
                Verdict::Continue
            }
            LinkIncoming::Detach(detach) => {
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
            LinkIncoming::Attach(_) => {
                warn!(handle = self.output_handle, "unexpected attach ignored");
                Verdict::Continue
            }
        }
    }

    async fn on_transfer(
        &mut self,
        performative: crate::performatives::Transfer,
        payload: crate::frames::Payload,
    ) -> Verdict {
        if performative.aborted {
            self.incomplete = None;
            return Verdict::Continue;
        }

        if let Some(incomplete) = &mut self.incomplete {
            incomplete.settled |= performative.settled == Some(true);
            incomplete.buffer.extend_from_slice(&payload);
        } else {
            let delivery_id = match performative.delivery_id {
                Some(delivery_id) => delivery_id,
                None => {
                    warn!(
                        handle = self.output_handle,
                        "continuation transfer without a delivery in flight"
                    );
                    return Verdict::Continue;
                }
            };
            self.incomplete = Some(IncompleteDelivery {
                delivery_id,
                delivery_tag: performative.delivery_tag.clone().unwrap_or_default(),
                message_format: performative.message_format.unwrap_or(0),
                settled: performative.settled == Some(true),
                buffer: BytesMut::from(&payload[..]),
            });
        }

        if performative.more {
            return Verdict::Continue;
        }

        let incomplete = match self.incomplete.take() {
            Some(incomplete) => incomplete,
            None => return Verdict::Continue,
        };

        let mut buf = Buffer::from(incomplete.buffer);
        let message = match Message::decode(&mut buf) {
            Ok(message) => message,
            Err(err) => {
                let error = definitions::Error::new(
                    Symbol::from(condition::DECODE_ERROR),
                    Some(err.to_string()),
                );
                return Verdict::Detached(DetachError::with_error(error));
            }
        };

        self.delivery_count = self.delivery_count.wrapping_add(1);
        self.link_credit = self.link_credit.saturating_sub(1);
        self.in_queue += 1;
        trace!(
            handle = self.output_handle,
            delivery_id = incomplete.delivery_id,
            link_credit = self.link_credit,
            "delivery assembled"
        );

        let delivery = Delivery {
            message,
            delivery_id: incomplete.delivery_id,
            delivery_tag: incomplete.delivery_tag,
            message_format: incomplete.message_format,
            settled: incomplete.settled,
        };
        if self.deliveries.send(delivery).await.is_err() {
            // the application handle is gone
            return Verdict::Detached(DetachError::default());
        }
        Verdict::Continue
    }

    async fn on_flow(&mut self, flow: Flow) -> Verdict {
        if flow.drain {
            // the sender consumed or voided everything outstanding
            if let Some(delivery_count) = flow.delivery_count {
                self.delivery_count = delivery_count;
            }
            self.link_credit = 0;
            if let Some(responder) = self.draining.take() {
                let _ = responder.send(Ok(()));
            }
            return Verdict::Continue;
        }
        if flow.echo {
            return self.send_link_flow(false).await;
        }
        Verdict::Continue
    }

    async fn on_consumed(&mut self) -> Verdict {
        self.in_queue = self.in_queue.saturating_sub(1);
        if !self.auto_credit {
            return Verdict::Continue;
        }
        self.consumed += 1;
        // top back up once half the prefetch window has been worked off
        let threshold = (self.target_credit / 2).max(1);
        if self.consumed >= threshold {
            self.link_credit += self.consumed;
            self.consumed = 0;
            return self.send_link_flow(false).await;
        }
        Verdict::Continue
    }

    async fn on_issue_credit(&mut self, credits: u32) -> Result<Verdict, RecvError> {
        if self.auto_credit {
            return Err(RecvError::NotManualCredit);
        }
        if self.draining.is_some() {
            return Err(RecvError::LinkDraining);
        }
        // credit the queue cannot absorb would wedge delivery assembly
        let capacity = self.target_credit.max(1);
        if self.in_queue + self.link_credit + credits > capacity {
            return Err(RecvError::CreditLimitExceeded);
        }
        self.link_credit += credits;
        Ok(self.send_link_flow(false).await)
    }

    async fn on_drain(
        &mut self,
        responder: oneshot::Sender<Result<(), RecvError>>,
    ) -> Option<DetachError> {
        if self.auto_credit {
            let _ = responder.send(Err(RecvError::NotManualCredit));
            return None;
        }
        if self.draining.is_some() {
            let _ = responder.send(Err(RecvError::AlreadyDraining));
            return None;
        }
        self.draining = Some(responder);
        match self.send_link_flow(true).await {
            Verdict::Continue => None,
            Verdict::Detached(error) => Some(error),
        }
    }

    async fn on_dispose(&mut self, delivery_id: DeliveryNumber, state: DeliveryState) -> Verdict {
        match self.rcv_settle_mode {
            ReceiverSettleMode::First => self.send_disposition(delivery_id, true, Some(state)).await,
            ReceiverSettleMode::Second => {
                let verdict = self
                    .send_disposition(delivery_id, false, Some(state.clone()))
                    .await;
                self.pending_second.insert(delivery_id, state);
                verdict
            }
        }
    }

    async fn send_disposition(
        &mut self,
        delivery_id: DeliveryNumber,
        settled: bool,
        state: Option<DeliveryState>,
    ) -> Verdict {
        let disposition = Disposition {
            role: Role::Receiver,
            first: delivery_id,
            last: None,
            settled,
            state,
            batchable: false,
        };
        match self.outgoing.send(LinkFrame::Disposition(disposition)).await {
            Ok(()) => Verdict::Continue,
            Err(_) => Verdict::Detached(DetachError::default()),
        }
    }

    async fn send_link_flow(&mut self, drain: bool) -> Verdict {
        let flow = Flow {
            handle: Some(self.output_handle),
            delivery_count: Some(self.delivery_count),
            link_credit: Some(self.link_credit),
            drain,
            ..Default::default()
        };
        trace!(
            handle = self.output_handle,
            link_credit = self.link_credit,
            drain,
            "TX flow"
        );
        match self.outgoing.send(LinkFrame::Flow(flow)).await {
            Ok(()) => Verdict::Continue,
            Err(_) => Verdict::Detached(DetachError::default()),
        }
    }

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

    fn finish(&mut self, error: DetachError) {
        if let Some(responder) = self.draining.take() {
            let _ = responder.send(Err(RecvError::Detached(error.clone())));
        }
        let has_remote_reason = error.is_closed_by_remote || error.remote_error.is_some();
        let _ = self.detached_tx.send(has_remote_reason.then_some(error));
    }
}
