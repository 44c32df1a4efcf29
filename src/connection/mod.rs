//! Connection lifecycle and the engine driving its socket.

mod builder;
mod engine;
mod error;
mod heartbeat;

pub use builder::Builder;
pub use error::{Error, OpenError};

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::control::{AllocSessionError, ConnectionControl};
use crate::session::{SessionFrame, SessionIncomingItem};

/// 2.4.6 Connection states (the subset a client traverses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Start,
    HeaderExchange,
    OpenSent,
    Opened,
    CloseSent,
    End,
}

/// An open AMQP connection.
///
/// Dropping the handle tears the connection down without a Close exchange;
/// call [`Connection::close`] for an orderly shutdown.
pub struct Connection {
    pub(crate) control: mpsc::Sender<ConnectionControl>,
    engine: JoinHandle<Result<(), Error>>,
    pub(crate) outgoing: mpsc::Sender<SessionFrame>,
    pub(crate) session_buffer_size: usize,
    /// The peer's advertised max-frame-size; outbound transfers are chunked
    /// against it.
    pub(crate) peer_max_frame_size: u32,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_max_frame_size", &self.peer_max_frame_size)
            .finish()
    }
}

impl Connection {
    /// Creates a builder for a [`Connection`].
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Opens a connection to `url` with default configuration. The scheme
    /// must be `amqp`; userinfo in the url selects a PLAIN SASL profile.
    pub async fn open(url: impl AsRef<str>) -> Result<Connection, OpenError> {
        Builder::new().open(url).await
    }

    /// Performs the Close exchange and waits for the engine to finish. The
    /// first error the connection encountered, if any, is returned here.
    pub async fn close(mut self) -> Result<(), Error> {
        // a dropped engine already has its verdict in the join handle
        let _ = self.control.send(ConnectionControl::Close(None)).await;
        match (&mut self.engine).await {
            Ok(result) => result,
            Err(_) => Err(Error::EngineDropped),
        }
    }

    pub(crate) async fn create_session(
        &mut self,
        tx: mpsc::Sender<SessionIncomingItem>,
    ) -> Result<(u16, usize), Error> {
        let (responder, response) = oneshot::channel();
        self.control
            .send(ConnectionControl::CreateSession { tx, responder })
            .await
            .map_err(|_| Error::EngineDropped)?;
        let result = response.await.map_err(|_| Error::EngineDropped)?;
        result.map_err(|err| match err {
            AllocSessionError::ChannelMaxReached => Error::ChannelMaxReached,
            AllocSessionError::IllegalState => Error::IllegalState,
        })
    }
}
