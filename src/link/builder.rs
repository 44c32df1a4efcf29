//! Builders for sender and receiver links, plus the attach exchange both
//! roles share.

use tokio::sync::mpsc;
use tracing::trace;

use crate::definitions::{
    self, Fields, Handle, ReceiverSettleMode, SenderSettleMode, Seconds,
};
use crate::link::{
    receiver, sender, AttachError, AttachGuard, LinkFrame, LinkIncoming, Receiver, Sender,
};
use crate::messaging::{FilterSet, Target, TerminusDurability, TerminusExpiryPolicy};
use crate::performatives::{Attach, Detach};
use crate::primitives::Symbol;
use crate::session::{Error as SessionError, SessionHandle};

/// Builder for a [`Sender`] link.
#[derive(Debug)]
pub struct SenderBuilder {
    pub name: Option<String>,
    pub target: Option<Target>,
    pub source_address: Option<String>,
    /// `None` requests nothing and accepts whatever the peer grants.
    pub settle_mode: Option<SenderSettleMode>,
    pub requested_receiver_settle_mode: Option<ReceiverSettleMode>,
    pub durability: TerminusDurability,
    pub expiry_policy: TerminusExpiryPolicy,
    pub expiry_timeout: Seconds,
    pub capabilities: Option<Vec<Symbol>>,
    pub dynamic_address: bool,
    /// Keep the link attached when a delivery is rejected. Some brokers
    /// throttle with rejections and expect the link to survive them.
    pub ignore_disposition_errors: bool,
    pub properties: Option<Fields>,
}

impl Default for SenderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SenderBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            target: None,
            source_address: None,
            settle_mode: None,
            requested_receiver_settle_mode: None,
            durability: TerminusDurability::None,
            expiry_policy: TerminusExpiryPolicy::SessionEnd,
            expiry_timeout: 0,
            capabilities: None,
            dynamic_address: false,
            ignore_disposition_errors: false,
            properties: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn target(mut self, target: impl Into<Target>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn source_address(mut self, address: impl Into<String>) -> Self {
        self.source_address = Some(address.into());
        self
    }

    pub fn settle_mode(mut self, mode: SenderSettleMode) -> Self {
        self.settle_mode = Some(mode);
        self
    }

    pub fn requested_receiver_settle_mode(mut self, mode: ReceiverSettleMode) -> Self {
        self.requested_receiver_settle_mode = Some(mode);
        self
    }

    pub fn durability(mut self, durability: TerminusDurability) -> Self {
        self.durability = durability;
        self
    }

    pub fn expiry_policy(mut self, policy: TerminusExpiryPolicy) -> Self {
        self.expiry_policy = policy;
        self
    }

    pub fn expiry_timeout(mut self, seconds: Seconds) -> Self {
        self.expiry_timeout = seconds;
        self
    }

    pub fn add_capability(mut self, capability: impl Into<Symbol>) -> Self {
        self.capabilities
            .get_or_insert_with(Vec::new)
            .push(capability.into());
        self
    }

    pub fn dynamic_address(mut self, dynamic: bool) -> Self {
        self.dynamic_address = dynamic;
        self
    }

    pub fn ignore_disposition_errors(mut self, ignore: bool) -> Self {
        self.ignore_disposition_errors = ignore;
        self
    }

    pub fn properties(mut self, properties: Fields) -> Self {
        self.properties = Some(properties);
        self
    }

    pub async fn attach(self, session: &mut SessionHandle) -> Result<Sender, AttachError> {
        sender::attach_sender(self, session).await
    }
}

/// Builder for a [`Receiver`] link.
#[derive(Debug)]
pub struct ReceiverBuilder {
    pub name: Option<String>,
    pub source_address: Option<String>,
    /// Credit window; in auto mode the prefetch target, in manual mode the
    /// message queue capacity.
    pub credit: u32,
    pub manual_credit: bool,
    pub filters: Option<FilterSet>,
    pub durability: TerminusDurability,
    pub expiry_policy: TerminusExpiryPolicy,
    pub expiry_timeout: Seconds,
    pub dynamic_address: bool,
    pub properties: Option<Fields>,
}

impl Default for ReceiverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            source_address: None,
            credit: 1,
            manual_credit: false,
            filters: None,
            durability: TerminusDurability::None,
            expiry_policy: TerminusExpiryPolicy::SessionEnd,
            expiry_timeout: 0,
            dynamic_address: false,
            properties: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn source(mut self, address: impl Into<String>) -> Self {
        self.source_address = Some(address.into());
        self
    }

    /// Prefetch target in auto-credit mode; queue capacity in manual mode.
    pub fn credit(mut self, credit: u32) -> Self {
        self.credit = credit;
        self
    }

    /// Switches off automatic replenishment; credit is then issued with
    /// `issue_credit` and `drain`.
    pub fn manual_credit(mut self, manual: bool) -> Self {
        self.manual_credit = manual;
        self
    }

    pub fn add_filter(mut self, name: impl Into<Symbol>, filter: impl Into<crate::codec::Value>) -> Self {
        self.filters
            .get_or_insert_with(Vec::new)
            .push((name.into(), filter.into()));
        self
    }

    pub fn durability(mut self, durability: TerminusDurability) -> Self {
        self.durability = durability;
        self
    }

    pub fn expiry_policy(mut self, policy: TerminusExpiryPolicy) -> Self {
        self.expiry_policy = policy;
        self
    }

    pub fn expiry_timeout(mut self, seconds: Seconds) -> Self {
        self.expiry_timeout = seconds;
        self
    }

    pub fn dynamic_address(mut self, dynamic: bool) -> Self {
        self.dynamic_address = dynamic;
        self
    }

    pub fn properties(mut self, properties: Fields) -> Self {
        self.properties = Some(properties);
        self
    }

    pub async fn attach(self, session: &mut SessionHandle) -> Result<Receiver, AttachError> {
        receiver::attach_receiver(self, session).await
    }
}

/* --------------------------- the attach exchange -------------------------- */

pub(crate) struct AttachOutcome {
    pub output_handle: Handle,
    pub incoming: mpsc::Receiver<LinkIncoming>,
    pub remote_attach: Attach,
}

/// Allocates a handle, sends Attach, and waits for the peer's Attach. If the
/// caller abandons the wait, the guard leaves the session a note to detach
/// the half-attached link.
pub(crate) async fn exchange_attach(
    session: &mut SessionHandle,
    mut attach: Attach,
) -> Result<AttachOutcome, AttachError> {
    let (tx, mut incoming) = mpsc::channel(session.buffer_size);
    let output_handle = session.allocate_link(attach.name.clone(), tx).await?;
    let guard = AttachGuard::new(session.control.clone(), output_handle);

    attach.handle = output_handle;
    trace!(name = %attach.name, handle = output_handle, "TX attach");
    if session
        .outgoing
        .send(LinkFrame::Attach(attach))
        .await
        .is_err()
    {
        guard.disarm();
        return Err(AttachError::Session(SessionError::EngineDropped));
    }

    loop {
        match incoming.recv().await {
            Some(LinkIncoming::Attach(remote_attach)) => {
                guard.disarm();
                return Ok(AttachOutcome {
                    output_handle,
                    incoming,
                    remote_attach,
                });
            }
            Some(LinkIncoming::Detach(detach)) => {
                guard.disarm();
                let error = detach.error.clone();
                let _ = session
                    .outgoing
                    .send(LinkFrame::Detach(Detach {
                        handle: output_handle,
                        closed: true,
                        error: None,
                    }))
                    .await;
                deallocate(session, output_handle).await;
                return Err(AttachError::RejectedByRemote(error));
            }
            Some(_) => continue,
            None => {
                guard.disarm();
                return Err(AttachError::Session(SessionError::EngineDropped));
            }
        }
    }
}

/// The peer's attach reply was unusable; close our half and wait for the
/// detach that carries the reason.
pub(crate) async fn close_rejected_attach(
    session: &mut SessionHandle,
    output_handle: Handle,
    incoming: &mut mpsc::Receiver<LinkIncoming>,
) -> Option<definitions::Error> {
    let _ = session
        .outgoing
        .send(LinkFrame::Detach(Detach {
            handle: output_handle,
            closed: true,
            error: None,
        }))
        .await;

    let mut remote_error = None;
    loop {
        match incoming.recv().await {
            Some(LinkIncoming::Detach(detach)) => {
                remote_error = detach.error;
                break;
            }
            Some(_) => continue,
            None => break,
        }
    }
    deallocate(session, output_handle).await;
    remote_error
}

pub(crate) async fn deallocate(session: &mut SessionHandle, handle: Handle) {
    let _ = session
        .control
        .send(crate::control::SessionControl::DeallocateLink(handle))
        .await;
}
