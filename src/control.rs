//! Control messages from handles to their engine tasks.

use tokio::sync::{mpsc, oneshot};

use crate::definitions::{self, Handle};
use crate::link::LinkIncoming;
use crate::session::{AllocLinkError, SessionIncomingItem};

pub(crate) enum ConnectionControl {
    /// Send Close, optionally with an error, and wind the connection down.
    Close(Option<definitions::Error>),
    CreateSession {
        tx: mpsc::Sender<SessionIncomingItem>,
        responder: oneshot::Sender<Result<(u16, usize), AllocSessionError>>,
    },
    DropSession(usize),
}

/// Session slots are bounded by the negotiated channel-max.
#[derive(Debug, Clone, Copy, thiserror::Error)]
pub(crate) enum AllocSessionError {
    #[error("channel max reached")]
    ChannelMaxReached,

    #[error("connection is not in a state to begin sessions")]
    IllegalState,
}

pub(crate) enum SessionControl {
    /// Send End, optionally with an error.
    End(Option<definitions::Error>),
    AllocateLink {
        name: String,
        tx: mpsc::Sender<LinkIncoming>,
        responder: oneshot::Sender<Result<Handle, AllocLinkError>>,
    },
    /// Frees the slot after a clean detach.
    DeallocateLink(Handle),
    /// An attach was abandoned mid-flight; the session owes the peer a
    /// compensating closing Detach before the slot can be reused.
    AbandonLink(Handle),
}
