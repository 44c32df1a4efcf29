use crate::connection;
use crate::definitions;

/// Errors of a session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Connection(#[from] connection::Error),

    /// The peer ended the session and named a reason.
    #[error("remote ended session with error: {0}")]
    RemoteEndedWithError(definitions::Error),

    /// The connection engine went away while the session was alive.
    #[error("connection dropped")]
    ConnectionDropped,

    /// A frame that is illegal in the current session state.
    #[error("illegal session state")]
    IllegalState,

    /// The peer transferred past the incoming window.
    #[error("session window violation")]
    WindowViolation,

    /// A link frame arrived on a handle no link is attached to.
    #[error("unattached handle {0}")]
    UnattachedHandle(u32),

    /// The engine task stopped before the operation completed.
    #[error("session engine dropped")]
    EngineDropped,

    #[error(transparent)]
    Alloc(#[from] AllocLinkError),
}

/// Why a link slot could not be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocLinkError {
    #[error("session is not mapped")]
    IllegalState,

    #[error("handle max reached")]
    HandleMaxReached,

    #[error("link name must be unique within the session")]
    DuplicatedLinkName,
}
