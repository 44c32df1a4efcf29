//! Links: attach/detach state machines, credit management, and the
//! sender/receiver endpoints.

mod builder;
mod delivery;
mod error;
mod frame;
mod receiver;
mod sender;

pub use builder::{ReceiverBuilder, SenderBuilder};
pub use delivery::{Delivery, Sendable, SendableBuilder};
pub use error::{AttachError, DetachError, RecvError, SendError};
pub use receiver::Receiver;
pub use sender::Sender;

pub(crate) use frame::{LinkFrame, LinkIncoming, LinkTransfer};

use tokio::sync::mpsc;

use crate::control::SessionControl;
use crate::definitions::Handle;

/// Link endpoint states. There is no official state table for links in the
/// specification; this is the subset the event loops track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkState {
    Attached,
    /// A closing detach has been sent; waiting for the peer's.
    CloseSent,
    Closed,
}

/// Keeps the session owing a compensating detach if the attach future is
/// dropped before the exchange completes.
pub(crate) struct AttachGuard {
    control: mpsc::Sender<SessionControl>,
    handle: Handle,
    armed: bool,
}

impl AttachGuard {
    pub fn new(control: mpsc::Sender<SessionControl>, handle: Handle) -> Self {
        Self {
            control,
            handle,
            armed: true,
        }
    }

    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = self
                .control
                .try_send(SessionControl::AbandonLink(self.handle));
        }
    }
}
