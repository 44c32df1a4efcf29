use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::definitions::Handle;
use crate::session::engine::SessionEngine;
use crate::session::{Error, SessionHandle};

pub(crate) const DEFAULT_CONTROL_CHAN_BUF: usize = 128;

/// Default session window, in transfer frames.
pub const DEFAULT_WINDOW: u32 = 5000;

/// Session builder.
#[derive(Debug)]
pub struct Builder {
    pub incoming_window: u32,
    pub outgoing_window: u32,
    /// Bounds the number of concurrently attached links.
    pub handle_max: Handle,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            incoming_window: DEFAULT_WINDOW,
            outgoing_window: DEFAULT_WINDOW,
            handle_max: u32::MAX,
        }
    }

    pub fn incoming_window(mut self, incoming_window: u32) -> Self {
        self.incoming_window = incoming_window;
        self
    }

    pub fn outgoing_window(mut self, outgoing_window: u32) -> Self {
        self.outgoing_window = outgoing_window;
        self
    }

    /// Caps concurrent links; `max_links` links means handles `0..max_links`.
    pub fn max_links(mut self, max_links: u32) -> Self {
        self.handle_max = max_links.saturating_sub(1);
        self
    }

    /// Sends Begin and waits for the peer's Begin.
    pub async fn begin(self, connection: &mut Connection) -> Result<SessionHandle, Error> {
        let buffer_size = connection.session_buffer_size;
        let (incoming_tx, incoming_rx) = mpsc::channel(buffer_size);
        let (control_tx, control_rx) = mpsc::channel(DEFAULT_CONTROL_CHAN_BUF);
        let (link_frames_tx, link_frames_rx) = mpsc::channel(buffer_size);
        let (link_transfers_tx, link_transfers_rx) = mpsc::channel(buffer_size);

        let (outgoing_channel, session_id) = connection.create_session(incoming_tx).await?;

        let engine = SessionEngine::begin(
            connection.control.clone(),
            connection.outgoing.clone(),
            session_id,
            outgoing_channel,
            self.incoming_window,
            self.outgoing_window,
            self.handle_max,
            control_rx,
            incoming_rx,
            link_frames_rx,
            link_transfers_rx,
        )
        .await?;
        let engine = engine.spawn();

        Ok(SessionHandle {
            control: control_tx,
            engine,
            outgoing: link_frames_tx,
            outgoing_transfers: link_transfers_tx,
            next_delivery_id: Arc::new(AtomicU32::new(0)),
            peer_max_frame_size: connection.peer_max_frame_size,
            buffer_size,
        })
    }
}
