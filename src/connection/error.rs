use crate::definitions;
use crate::sasl_profile;
use crate::transport;

/// Errors opening a connection.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Only `amqp` connects a TCP stream itself. `amqps` needs a
    /// caller-established TLS stream via `open_with_stream`.
    #[error("scheme {0:?} requires a caller-supplied stream")]
    UnsupportedScheme(String),

    #[error("url has no host")]
    InvalidDomain,

    /// max-frame-size below the protocol minimum of 512.
    #[error("max frame size {0} is below the minimum of 512")]
    InvalidMaxFrameSize(u32),

    #[error(transparent)]
    Sasl(#[from] sasl_profile::Error),

    #[error(transparent)]
    Transport(#[from] transport::Error),

    /// The peer answered the Open with something else.
    #[error("expecting an open frame")]
    UnexpectedFrame,

    /// The peer closed while the open exchange was in flight.
    #[error("connection rejected: {}", crate::connection::error::display_remote(.0))]
    RemoteClosed(Option<definitions::Error>),
}

/// Errors of an established connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] transport::Error),

    /// The peer sent Close carrying an error.
    #[error("remote closed with error: {0}")]
    RemoteClosedWithError(definitions::Error),

    /// A frame arrived on a channel with no session mapped to it.
    #[error("unattached channel {0}")]
    UnattachedChannel(u16),

    /// A frame that is illegal in the current connection state.
    #[error("illegal connection state")]
    IllegalState,

    /// No channel left under the negotiated channel-max.
    #[error("channel max reached")]
    ChannelMaxReached,

    /// The engine task stopped before the operation completed.
    #[error("connection engine dropped")]
    EngineDropped,
}

pub(crate) fn display_remote(error: &Option<definitions::Error>) -> String {
    match error {
        Some(error) => error.to_string(),
        None => "no error provided".to_string(),
    }
}
