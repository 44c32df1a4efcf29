//! Session lifecycle: channel bookkeeping, transfer windows, link handles,
//! and disposition routing.

mod builder;
mod engine;
mod error;
mod frame;

pub use builder::Builder;
pub use error::{AllocLinkError, Error};

pub(crate) use frame::{SessionFrame, SessionFrameBody, SessionIncomingItem};

use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::connection::Connection;
use crate::control::SessionControl;
use crate::definitions::Handle;
use crate::link::{LinkFrame, LinkIncoming, LinkTransfer};

/// 2.5.5 Session states (the subset a client traverses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Unmapped,
    BeginSent,
    Mapped,
    EndSent,
}

/// Entry point mirroring the builder idiom of [`Connection`].
#[derive(Debug)]
pub struct Session {}

impl Session {
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Begins a session on the connection with default windows.
    pub async fn begin(connection: &mut Connection) -> Result<SessionHandle, Error> {
        Self::builder().begin(connection).await
    }
}

/// A handle to a running session.
pub struct SessionHandle {
    pub(crate) control: mpsc::Sender<SessionControl>,
    engine: JoinHandle<Result<(), Error>>,

    /// Non-transfer link frames, never window-gated.
    pub(crate) outgoing: mpsc::Sender<LinkFrame>,
    /// Transfer frames, gated on the remote incoming window.
    pub(crate) outgoing_transfers: mpsc::Sender<LinkTransfer>,

    /// Session-unique delivery ids, assigned at the first transfer frame of
    /// each delivery.
    pub(crate) next_delivery_id: Arc<AtomicU32>,
    pub(crate) peer_max_frame_size: u32,
    pub(crate) buffer_size: usize,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish()
    }
}

impl SessionHandle {
    /// Performs the End exchange and waits for the engine to finish.
    pub async fn end(mut self) -> Result<(), Error> {
        let _ = self.control.send(SessionControl::End(None)).await;
        match (&mut self.engine).await {
            Ok(result) => result,
            Err(_) => Err(Error::EngineDropped),
        }
    }

    pub(crate) async fn allocate_link(
        &mut self,
        name: String,
        tx: mpsc::Sender<LinkIncoming>,
    ) -> Result<Handle, Error> {
        let (responder, response) = oneshot::channel();
        self.control
            .send(SessionControl::AllocateLink {
                name,
                tx,
                responder,
            })
            .await
            .map_err(|_| Error::EngineDropped)?;
        let result = response.await.map_err(|_| Error::EngineDropped)?;
        result.map_err(Error::Alloc)
    }
}
