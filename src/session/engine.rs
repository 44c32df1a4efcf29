//! The session engine: one task per session owning all session state.

use std::collections::{BTreeMap, HashMap, HashSet};

use slab::Slab;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::control::{ConnectionControl, SessionControl};
use crate::definitions::{self, condition, DeliveryNumber, Handle, TransferNumber};
use crate::link::{LinkFrame, LinkIncoming, LinkTransfer};
use crate::performatives::{Begin, Detach, Disposition, End, Flow};
use crate::primitives::Symbol;
use crate::session::{
    AllocLinkError, Error, SessionFrame, SessionFrameBody, SessionIncomingItem, SessionState,
};
use crate::util::Running;

struct LinkEntry {
    tx: Sender<LinkIncoming>,
    name: String,
    /// Delivery id of the outgoing delivery currently in flight on this
    /// link, with its settled flag; cleared on the final transfer frame.
    outgoing_delivery: Option<(DeliveryNumber, bool)>,
}

pub(crate) struct SessionEngine {
    conn_control: Sender<ConnectionControl>,
    session_id: usize,
    outgoing_channel: u16,
    local_state: SessionState,

    // 2.5.6 session flow control
    next_outgoing_id: TransferNumber,
    incoming_window: u32,
    configured_incoming_window: u32,
    outgoing_window: u32,
    next_incoming_id: TransferNumber,
    remote_incoming_window: u32,
    remote_outgoing_window: u32,

    handle_max: Handle,

    control: Receiver<SessionControl>,
    incoming: Receiver<SessionIncomingItem>,
    outgoing: Sender<SessionFrame>,
    link_frames: Receiver<LinkFrame>,
    link_transfers: Receiver<LinkTransfer>,

    links: Slab<LinkEntry>,
    links_by_name: HashMap<String, usize>,
    by_input_handle: HashMap<Handle, usize>,
    /// Handles whose attach was abandoned; owed a compensating Detach.
    abandoned: HashSet<Handle>,

    /// Outgoing delivery id -> owning link, for disposition routing.
    unsettled_out: BTreeMap<DeliveryNumber, usize>,
    /// Incoming delivery id -> owning link, for second-mode settlement.
    unsettled_in: BTreeMap<DeliveryNumber, usize>,

    remote_error: Option<definitions::Error>,
}

impl SessionEngine {
    #[allow(clippy::too_many_arguments)]
    pub async fn begin(
        conn_control: Sender<ConnectionControl>,
        outgoing: Sender<SessionFrame>,
        session_id: usize,
        outgoing_channel: u16,
        incoming_window: u32,
        outgoing_window: u32,
        handle_max: Handle,
        control: Receiver<SessionControl>,
        incoming: Receiver<SessionIncomingItem>,
        link_frames: Receiver<LinkFrame>,
        link_transfers: Receiver<LinkTransfer>,
    ) -> Result<Self, Error> {
        let mut engine = Self {
            conn_control,
            session_id,
            outgoing_channel,
            local_state: SessionState::Unmapped,
            next_outgoing_id: 0,
            incoming_window,
            configured_incoming_window: incoming_window,
            outgoing_window,
            next_incoming_id: 0,
            remote_incoming_window: 0,
            remote_outgoing_window: 0,
            handle_max,
            control,
            incoming,
            outgoing,
            link_frames,
            link_transfers,
            links: Slab::new(),
            links_by_name: HashMap::new(),
            by_input_handle: HashMap::new(),
            abandoned: HashSet::new(),
            unsettled_out: BTreeMap::new(),
            unsettled_in: BTreeMap::new(),
            remote_error: None,
        };

        let begin = Begin {
            remote_channel: None,
            next_outgoing_id: engine.next_outgoing_id,
            incoming_window: engine.incoming_window,
            outgoing_window: engine.outgoing_window,
            handle_max: engine.handle_max,
            ..Default::default()
        };
        trace!(channel = engine.outgoing_channel, "TX begin");
        engine
            .outgoing
            .send(SessionFrame::new(
                engine.outgoing_channel,
                SessionFrameBody::Begin(begin),
            ))
            .await
            .map_err(|_| Error::ConnectionDropped)?;
        engine.local_state = SessionState::BeginSent;

        let frame = engine
            .incoming
            .recv()
            .await
            .ok_or(Error::ConnectionDropped)?;
        match frame.body {
            SessionFrameBody::Begin(begin) => engine.on_incoming_begin(begin)?,
            SessionFrameBody::End(end) => {
                return Err(match end.error {
                    Some(error) => Error::RemoteEndedWithError(error),
                    None => Error::IllegalState,
                })
            }
            _ => return Err(Error::IllegalState),
        }
        Ok(engine)
    }

    pub fn spawn(self) -> JoinHandle<Result<(), Error>> {
        tokio::spawn(self.event_loop())
    }

    fn on_incoming_begin(&mut self, begin: Begin) -> Result<(), Error> {
        match self.local_state {
            SessionState::BeginSent => self.local_state = SessionState::Mapped,
            _ => return Err(Error::IllegalState),
        }
        self.next_incoming_id = begin.next_outgoing_id;
        self.remote_incoming_window = begin.incoming_window;
        self.remote_outgoing_window = begin.outgoing_window;
        Ok(())
    }

    /// The session-level fields every outbound Flow carries.
    fn session_flow(&self) -> Flow {
        Flow {
            next_incoming_id: Some(self.next_incoming_id),
            incoming_window: self.incoming_window,
            next_outgoing_id: self.next_outgoing_id,
            outgoing_window: self.outgoing_window,
            ..Default::default()
        }
    }

    async fn send_frame(&mut self, body: SessionFrameBody) -> Result<(), Error> {
        self.outgoing
            .send(SessionFrame::new(self.outgoing_channel, body))
            .await
            .map_err(|_| Error::ConnectionDropped)
    }

    async fn on_incoming(&mut self, frame: SessionIncomingItem) -> Result<Running, Error> {
        let SessionFrame { channel: _, body } = frame;
        match body {
            SessionFrameBody::Begin(_) => return Err(Error::IllegalState),
            SessionFrameBody::Attach(attach) => {
                let input_handle = attach.handle;
                let index = match self.links_by_name.get(&attach.name) {
                    Some(index) => *index,
                    None => {
                        warn!(name = %attach.name, "attach for an unknown link");
                        return Ok(Running::Continue);
                    }
                };
                let output_handle = index as Handle;
                if self.abandoned.remove(&output_handle) {
                    // the local half gave up waiting; compensate and free
                    debug!(handle = output_handle, "closing abandoned link");
                    self.send_frame(SessionFrameBody::Detach(Detach {
                        handle: output_handle,
                        closed: true,
                        error: None,
                    }))
                    .await?;
                    self.free_link(output_handle);
                    return Ok(Running::Continue);
                }
                self.by_input_handle.insert(input_handle, index);
                if let Some(entry) = self.links.get(index) {
                    let _ = entry.tx.send(LinkIncoming::Attach(attach)).await;
                }
            }
            SessionFrameBody::Flow(flow) => {
                // 2.5.6: recompute windows from the peer's view
                self.next_incoming_id = flow.next_outgoing_id;
                self.remote_outgoing_window = flow.outgoing_window;
                self.remote_incoming_window = match flow.next_incoming_id {
                    Some(next_incoming_id) => next_incoming_id
                        .wrapping_add(flow.incoming_window)
                        .wrapping_sub(self.next_outgoing_id),
                    None => flow.incoming_window,
                };

                match flow.handle {
                    Some(input_handle) => {
                        let index = self
                            .by_input_handle
                            .get(&input_handle)
                            .copied()
                            .ok_or(Error::UnattachedHandle(input_handle))?;
                        if let Some(entry) = self.links.get(index) {
                            let _ = entry.tx.send(LinkIncoming::Flow(flow)).await;
                        }
                    }
                    None => {
                        if flow.echo {
                            let reply = self.session_flow();
                            self.send_frame(SessionFrameBody::Flow(reply)).await?;
                        }
                    }
                }
            }
            SessionFrameBody::Transfer {
                performative,
                payload,
            } => {
                if self.incoming_window == 0 {
                    let error = definitions::Error::new(
                        Symbol::from(condition::WINDOW_VIOLATION),
                        Some("transfer past the incoming window".to_string()),
                    );
                    self.send_frame(SessionFrameBody::End(End { error: Some(error) }))
                        .await?;
                    return Err(Error::WindowViolation);
                }
                self.next_incoming_id = self.next_incoming_id.wrapping_add(1);
                self.incoming_window -= 1;
                // replenish before the peer can stall
                if self.incoming_window < self.configured_incoming_window / 2 {
                    self.incoming_window = self.configured_incoming_window;
                    let flow = self.session_flow();
                    self.send_frame(SessionFrameBody::Flow(flow)).await?;
                }

                let index = self
                    .by_input_handle
                    .get(&performative.handle)
                    .copied()
                    .ok_or(Error::UnattachedHandle(performative.handle))?;
                if let Some(delivery_id) = performative.delivery_id {
                    if performative.settled != Some(true) {
                        self.unsettled_in.insert(delivery_id, index);
                    }
                }
                if let Some(entry) = self.links.get(index) {
                    let _ = entry
                        .tx
                        .send(LinkIncoming::Transfer {
                            performative,
                            payload,
                        })
                        .await;
                }
            }
            SessionFrameBody::Disposition(disposition) => {
                self.route_disposition(disposition).await;
            }
            SessionFrameBody::Detach(detach) => {
                let input_handle = detach.handle;
                match self.by_input_handle.get(&input_handle).copied() {
                    Some(index) => {
                        if let Some(entry) = self.links.get(index) {
                            let _ = entry.tx.send(LinkIncoming::Detach(detach)).await;
                        }
                    }
                    None => warn!(handle = input_handle, "detach for an unattached handle"),
                }
            }
            SessionFrameBody::End(end) => {
                debug!(error = ?end.error, "RX end");
                self.remote_error = end.error;
                match self.local_state {
                    SessionState::Mapped => {
                        self.send_frame(SessionFrameBody::End(End { error: None }))
                            .await?;
                    }
                    SessionState::EndSent => {}
                    _ => return Err(Error::IllegalState),
                }
                self.local_state = SessionState::Unmapped;
                return Ok(Running::Stop);
            }
        }
        Ok(Running::Continue)
    }

    /// Delivers a disposition range id-by-id to the links that own the
    /// deliveries.
    async fn route_disposition(&mut self, disposition: Disposition) {
        let settled = disposition.settled;
        let by_receiver = disposition.role == definitions::Role::Receiver;
        for id in disposition.range() {
            let map = if by_receiver {
                &mut self.unsettled_out
            } else {
                &mut self.unsettled_in
            };
            let index = match map.get(&id) {
                Some(index) => *index,
                None => continue,
            };
            if settled {
                map.remove(&id);
            }
            if let Some(entry) = self.links.get(index) {
                let _ = entry
                    .tx
                    .send(LinkIncoming::Disposition {
                        id,
                        settled,
                        state: disposition.state.clone(),
                    })
                    .await;
            }
        }
    }

    async fn on_control(&mut self, control: SessionControl) -> Result<Running, Error> {
        match control {
            SessionControl::End(error) => match self.local_state {
                SessionState::Mapped => {
                    trace!("TX end");
                    self.send_frame(SessionFrameBody::End(End { error })).await?;
                    self.local_state = SessionState::EndSent;
                }
                SessionState::EndSent | SessionState::Unmapped => {}
                _ => return Err(Error::IllegalState),
            },
            SessionControl::AllocateLink {
                name,
                tx,
                responder,
            } => {
                let result = self.allocate_link(name, tx);
                let _ = responder.send(result);
            }
            SessionControl::DeallocateLink(handle) => self.free_link(handle),
            SessionControl::AbandonLink(handle) => {
                let index = handle as usize;
                if !self.links.contains(index) {
                    return Ok(Running::Continue);
                }
                let attached = self.by_input_handle.values().any(|i| *i == index);
                if attached {
                    // the remote half exists; close it out right away
                    self.send_frame(SessionFrameBody::Detach(Detach {
                        handle,
                        closed: true,
                        error: None,
                    }))
                    .await?;
                    self.free_link(handle);
                } else {
                    self.abandoned.insert(handle);
                }
            }
        }
        Ok(Running::Continue)
    }

    fn allocate_link(
        &mut self,
        name: String,
        tx: Sender<LinkIncoming>,
    ) -> Result<Handle, AllocLinkError> {
        if self.local_state != SessionState::Mapped {
            return Err(AllocLinkError::IllegalState);
        }
        if self.links_by_name.contains_key(&name) {
            return Err(AllocLinkError::DuplicatedLinkName);
        }
        let entry = self.links.vacant_entry();
        let index = entry.key();
        if index as u32 > self.handle_max {
            return Err(AllocLinkError::HandleMaxReached);
        }
        entry.insert(LinkEntry {
            tx,
            name: name.clone(),
            outgoing_delivery: None,
        });
        self.links_by_name.insert(name, index);
        Ok(index as Handle)
    }

    fn free_link(&mut self, handle: Handle) {
        let index = handle as usize;
        if self.links.contains(index) {
            let entry = self.links.remove(index);
            self.links_by_name.remove(&entry.name);
        }
        self.by_input_handle.retain(|_, i| *i != index);
        self.abandoned.remove(&handle);
        self.unsettled_out.retain(|_, i| *i != index);
        self.unsettled_in.retain(|_, i| *i != index);
    }

    async fn on_link_frame(&mut self, frame: LinkFrame) -> Result<Running, Error> {
        if self.local_state != SessionState::Mapped {
            return Ok(Running::Continue);
        }
        match frame {
            LinkFrame::Attach(attach) => {
                self.send_frame(SessionFrameBody::Attach(attach)).await?;
            }
            LinkFrame::Flow(link_flow) => {
                // link fields ride on the session's window state
                let mut flow = self.session_flow();
                flow.handle = link_flow.handle;
                flow.delivery_count = link_flow.delivery_count;
                flow.link_credit = link_flow.link_credit;
                flow.available = link_flow.available;
                flow.drain = link_flow.drain;
                flow.echo = link_flow.echo;
                flow.properties = link_flow.properties;
                self.send_frame(SessionFrameBody::Flow(flow)).await?;
            }
            LinkFrame::Disposition(disposition) => {
                self.send_frame(SessionFrameBody::Disposition(disposition))
                    .await?;
            }
            LinkFrame::Detach(detach) => {
                self.send_frame(SessionFrameBody::Detach(detach)).await?;
            }
        }
        Ok(Running::Continue)
    }

    /// Only polled while `remote_incoming_window > 0`.
    async fn on_link_transfer(&mut self, transfer: LinkTransfer) -> Result<Running, Error> {
        let LinkTransfer {
            performative,
            payload,
        } = transfer;

        let index = performative.handle as usize;
        if let Some(entry) = self.links.get_mut(index) {
            if let Some(delivery_id) = performative.delivery_id {
                let settled = performative.settled == Some(true);
                entry.outgoing_delivery = Some((delivery_id, settled));
            }
            if !performative.more {
                if let Some((delivery_id, settled)) = entry.outgoing_delivery.take() {
                    // the settled flag may ride on the first or final frame
                    if !(settled || performative.settled == Some(true)) {
                        self.unsettled_out.insert(delivery_id, index);
                    }
                }
            }
        }

        self.next_outgoing_id = self.next_outgoing_id.wrapping_add(1);
        self.remote_incoming_window -= 1;
        self.send_frame(SessionFrameBody::Transfer {
            performative,
            payload,
        })
        .await?;
        Ok(Running::Continue)
    }

    async fn event_loop(mut self) -> Result<(), Error> {
        let result = loop {
            let result = tokio::select! {
                incoming = self.incoming.recv() => {
                    match incoming {
                        Some(incoming) => self.on_incoming(incoming).await,
                        None => break Err(Error::ConnectionDropped),
                    }
                },
                control = self.control.recv() => {
                    match control {
                        Some(control) => self.on_control(control).await,
                        // handle and all links dropped without an End
                        None => Ok(Running::Stop),
                    }
                },
                frame = self.link_frames.recv() => {
                    match frame {
                        Some(frame) => self.on_link_frame(frame).await,
                        None => Ok(Running::Stop),
                    }
                },
                transfer = self.link_transfers.recv(),
                    if self.remote_incoming_window > 0 && self.local_state == SessionState::Mapped =>
                {
                    match transfer {
                        Some(transfer) => self.on_link_transfer(transfer).await,
                        None => Ok(Running::Stop),
                    }
                },
            };

            match result {
                Ok(Running::Continue) => {}
                Ok(Running::Stop) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        debug!(channel = self.outgoing_channel, "session engine exited");
        let _ = self
            .conn_control
            .send(ConnectionControl::DropSession(self.session_id))
            .await;

        match self.remote_error.take() {
            Some(error) => Err(Error::RemoteEndedWithError(error)),
            None => result,
        }
    }
}
