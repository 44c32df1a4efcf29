//! Frames exchanged between the connection engine and session engines.

use crate::frames::Payload;
use crate::performatives::{Attach, Begin, Detach, Disposition, End, Flow, Transfer};

#[derive(Debug)]
pub(crate) struct SessionFrame {
    pub channel: u16,
    pub body: SessionFrameBody,
}

impl SessionFrame {
    pub fn new(channel: u16, body: SessionFrameBody) -> Self {
        Self { channel, body }
    }
}

#[derive(Debug)]
pub(crate) enum SessionFrameBody {
    Begin(Begin),
    Attach(Attach),
    Flow(Flow),
    Transfer {
        performative: Transfer,
        payload: Payload,
    },
    Disposition(Disposition),
    Detach(Detach),
    End(End),
}

pub(crate) type SessionIncomingItem = SessionFrame;
