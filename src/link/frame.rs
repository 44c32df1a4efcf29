//! Frames exchanged between link endpoints and their session engine.

use crate::definitions::DeliveryNumber;
use crate::frames::Payload;
use crate::messaging::DeliveryState;
use crate::performatives::{Attach, Detach, Disposition, Flow, Transfer};

/// Non-transfer frames a link asks the session to emit. Flow frames carry
/// only link fields; the session engine fills in its window state.
#[derive(Debug)]
pub(crate) enum LinkFrame {
    Attach(Attach),
    Flow(Flow),
    Disposition(Disposition),
    Detach(Detach),
}

/// One transfer frame queued for emission. Transfers travel on their own
/// queue because the session gates them on the remote incoming window.
#[derive(Debug)]
pub(crate) struct LinkTransfer {
    pub performative: Transfer,
    pub payload: Payload,
}

/// Frames the session relays into a link endpoint.
#[derive(Debug)]
pub(crate) enum LinkIncoming {
    Attach(Attach),
    Flow(Flow),
    Transfer {
        performative: Transfer,
        payload: Payload,
    },
    /// One delivery id out of a disposition range.
    Disposition {
        id: DeliveryNumber,
        settled: bool,
        state: Option<DeliveryState>,
    },
    Detach(Detach),
}
