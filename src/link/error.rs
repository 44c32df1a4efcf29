use crate::codec;
use crate::definitions::{self, SenderSettleMode};
use crate::messaging::Rejected;
use crate::session;

/// A link reached its terminal state.
///
/// `remote_error` is `None` when the link was detached gracefully.
#[derive(Debug, Clone, Default, thiserror::Error)]
#[error("link detached, reason: {remote_error:?}")]
pub struct DetachError {
    /// The peer sent the closing detach first.
    pub is_closed_by_remote: bool,
    pub remote_error: Option<definitions::Error>,
}

impl DetachError {
    pub(crate) fn closed_by_remote(error: Option<definitions::Error>) -> Self {
        Self {
            is_closed_by_remote: true,
            remote_error: error,
        }
    }

    pub(crate) fn with_error(error: definitions::Error) -> Self {
        Self {
            is_closed_by_remote: false,
            remote_error: Some(error),
        }
    }
}

/// Errors attaching a link.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error(transparent)]
    Session(#[from] session::Error),

    /// The peer granted a sender settle mode other than the one explicitly
    /// requested.
    #[error("sender settlement mode \"{requested}\" requested, received \"{granted}\" from server")]
    SettleModeMismatch {
        requested: SenderSettleMode,
        granted: SenderSettleMode,
    },

    /// Unsettled sends with receiver-settle-mode second would require
    /// retained unsettled state across reconnects.
    #[error("sender does not support exactly-once guarantee")]
    ExactlyOnceUnsupported,

    /// The peer answered the attach without a terminus and detached.
    #[error("attach rejected by the peer: {0:?}")]
    RejectedByRemote(Option<definitions::Error>),

    #[error(transparent)]
    Detached(#[from] DetachError),

    /// An option that cannot be expressed on the wire.
    #[error("invalid option: {0}")]
    InvalidOption(&'static str),
}

/// Errors returned by `Sender::send`.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Delivery tags are limited to 32 bytes.
    #[error("delivery tag is over the allowed 32 bytes, len: {0}")]
    DeliveryTagTooLong(usize),

    /// The encoded message does not fit the link's max-message-size.
    #[error("encoded message size {size} exceeds max of {max}")]
    MessageTooLarge { size: u64, max: u64 },

    #[error(transparent)]
    Encode(#[from] codec::Error),

    /// The link is (or while sending became) detached.
    #[error(transparent)]
    Detached(#[from] DetachError),

    /// The peer rejected the delivery and the link stays attached.
    #[error("delivery rejected: {:?}", .0.error)]
    Rejected(Rejected),

    /// The session or connection went away under the link.
    #[error("session dropped")]
    SessionDropped,
}

/// Errors returned by receiver operations.
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    #[error(transparent)]
    Detached(#[from] DetachError),

    /// The assembled message payload failed to decode.
    #[error(transparent)]
    Decode(#[from] codec::Error),

    /// Credit can only be issued manually on a manual-credit link.
    #[error("credit management is not manual")]
    NotManualCredit,

    /// No credit may be issued while a drain is in progress.
    #[error("link is currently draining, no credits can be added")]
    LinkDraining,

    /// A drain is already in progress.
    #[error("drain already in process")]
    AlreadyDraining,

    /// Issuing this credit could overflow the message queue.
    #[error("link credit exceeded, too many outstanding messages")]
    CreditLimitExceeded,

    /// The session or connection went away under the link.
    #[error("session dropped")]
    SessionDropped,
}
