//! The engine drives the socket: one task owns the transport, the
//! heartbeat, and the routing of inbound frames to session engines.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use slab::Slab;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::connection::heartbeat::HeartBeat;
use crate::connection::{ConnectionState, Error, OpenError};
use crate::control::{AllocSessionError, ConnectionControl};
use crate::definitions::{self, condition};
use crate::frames::{Frame, FrameBody};
use crate::performatives::{Close, Open};
use crate::primitives::Symbol;
use crate::session::{SessionFrame, SessionFrameBody, SessionIncomingItem};
use crate::transport::Transport;
use crate::util::Running;

struct SessionEntry {
    tx: Sender<SessionIncomingItem>,
    outgoing_channel: u16,
}

pub(crate) struct ConnectionEngine<Io> {
    transport: Transport<Io>,
    local_state: ConnectionState,
    channel_max: u16,
    control: Receiver<ConnectionControl>,
    outgoing: Receiver<SessionFrame>,
    sessions: Slab<SessionEntry>,
    by_remote_channel: HashMap<u16, usize>,
    heartbeat: HeartBeat,
    remote_error: Option<definitions::Error>,
}

impl<Io> ConnectionEngine<Io>
where
    Io: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Performs the Open exchange and returns the engine ready to run,
    /// together with the peer's Open.
    pub async fn open(
        mut transport: Transport<Io>,
        local_open: Open,
        control: Receiver<ConnectionControl>,
        outgoing: Receiver<SessionFrame>,
    ) -> Result<(Self, Open), OpenError> {
        let channel_max = local_open.channel_max;
        trace!(container_id = %local_open.container_id, "TX open");
        transport
            .send(Frame::new(0, FrameBody::Open(local_open)))
            .await?;

        let remote_open = loop {
            let frame = match transport.next().await {
                Some(frame) => frame?,
                None => return Err(OpenError::RemoteClosed(None)),
            };
            match frame.body {
                FrameBody::Open(open) => break open,
                FrameBody::Close(close) => return Err(OpenError::RemoteClosed(close.error)),
                FrameBody::Empty => continue,
                _ => return Err(OpenError::UnexpectedFrame),
            }
        };
        trace!(container_id = %remote_open.container_id, "RX open");

        let heartbeat = match remote_open.idle_time_out {
            // keepalives at half the peer deadline
            Some(millis) if millis > 0 => {
                HeartBeat::new(Duration::from_millis(millis as u64 / 2))
            }
            _ => HeartBeat::never(),
        };

        let engine = Self {
            transport,
            local_state: ConnectionState::Opened,
            channel_max: channel_max.min(remote_open.channel_max),
            control,
            outgoing,
            sessions: Slab::new(),
            by_remote_channel: HashMap::new(),
            heartbeat,
            remote_error: None,
        };
        Ok((engine, remote_open))
    }

    pub fn spawn(self) -> JoinHandle<Result<(), Error>> {
        tokio::spawn(self.event_loop())
    }

    async fn forward_to_session(&mut self, channel: u16, frame: SessionFrame) -> Result<(), Error> {
        let session_id = self
            .by_remote_channel
            .get(&channel)
            .copied()
            .ok_or(Error::UnattachedChannel(channel))?;
        if let Some(entry) = self.sessions.get(session_id) {
            // a session that stopped listening is already winding down
            let _ = entry.tx.send(frame).await;
        }
        Ok(())
    }

    async fn on_incoming(&mut self, frame: Frame) -> Result<Running, Error> {
        let Frame { channel, body } = frame;

        match body {
            FrameBody::Open(_) => return Err(Error::IllegalState),
            FrameBody::Begin(begin) => {
                // the reply names our channel in remote-channel
                let local_channel = begin.remote_channel.ok_or(Error::IllegalState)?;
                let session_id = self
                    .sessions
                    .iter()
                    .find(|(_, entry)| entry.outgoing_channel == local_channel)
                    .map(|(id, _)| id)
                    .ok_or(Error::UnattachedChannel(local_channel))?;
                self.by_remote_channel.insert(channel, session_id);
                let frame = SessionFrame::new(channel, SessionFrameBody::Begin(begin));
                if let Some(entry) = self.sessions.get(session_id) {
                    let _ = entry.tx.send(frame).await;
                }
            }
            FrameBody::Attach(attach) => {
                let frame = SessionFrame::new(channel, SessionFrameBody::Attach(attach));
                self.forward_to_session(channel, frame).await?;
            }
            FrameBody::Flow(flow) => {
                let frame = SessionFrame::new(channel, SessionFrameBody::Flow(flow));
                self.forward_to_session(channel, frame).await?;
            }
            FrameBody::Transfer {
                performative,
                payload,
            } => {
                let frame = SessionFrame::new(
                    channel,
                    SessionFrameBody::Transfer {
                        performative,
                        payload,
                    },
                );
                self.forward_to_session(channel, frame).await?;
            }
            FrameBody::Disposition(disposition) => {
                let frame = SessionFrame::new(channel, SessionFrameBody::Disposition(disposition));
                self.forward_to_session(channel, frame).await?;
            }
            FrameBody::Detach(detach) => {
                let frame = SessionFrame::new(channel, SessionFrameBody::Detach(detach));
                self.forward_to_session(channel, frame).await?;
            }
            FrameBody::End(end) => {
                let frame = SessionFrame::new(channel, SessionFrameBody::End(end));
                self.forward_to_session(channel, frame).await?;
            }
            FrameBody::Close(close) => {
                debug!(error = ?close.error, "RX close");
                self.remote_error = close.error;
                match self.local_state {
                    ConnectionState::CloseSent => {}
                    _ => {
                        let frame = Frame::new(0, FrameBody::Close(Close { error: None }));
                        self.transport.send(frame).await?;
                    }
                }
                self.local_state = ConnectionState::End;
                return Ok(Running::Stop);
            }
            FrameBody::Empty => {
                // keepalive; the transport already reset its idle timer
            }
        }
        Ok(Running::Continue)
    }

    async fn on_control(&mut self, control: ConnectionControl) -> Result<Running, Error> {
        match control {
            ConnectionControl::Close(error) => match self.local_state {
                ConnectionState::Opened => {
                    trace!("TX close");
                    let frame = Frame::new(0, FrameBody::Close(Close { error }));
                    self.transport.send(frame).await?;
                    self.local_state = ConnectionState::CloseSent;
                }
                ConnectionState::CloseSent | ConnectionState::End => {}
                _ => return Err(Error::IllegalState),
            },
            ConnectionControl::CreateSession { tx, responder } => {
                let result = self.allocate_session(tx);
                let _ = responder.send(result);
            }
            ConnectionControl::DropSession(session_id) => {
                if self.sessions.contains(session_id) {
                    self.sessions.remove(session_id);
                }
                self.by_remote_channel.retain(|_, id| *id != session_id);
            }
        }
        Ok(Running::Continue)
    }

    fn allocate_session(
        &mut self,
        tx: Sender<SessionIncomingItem>,
    ) -> Result<(u16, usize), AllocSessionError> {
        if self.local_state != ConnectionState::Opened {
            return Err(AllocSessionError::IllegalState);
        }
        let entry = self.sessions.vacant_entry();
        let session_id = entry.key();
        if session_id > self.channel_max as usize {
            return Err(AllocSessionError::ChannelMaxReached);
        }
        let outgoing_channel = session_id as u16;
        entry.insert(SessionEntry {
            tx,
            outgoing_channel,
        });
        Ok((outgoing_channel, session_id))
    }

    async fn on_outgoing(&mut self, frame: SessionFrame) -> Result<Running, Error> {
        match self.local_state {
            ConnectionState::Opened => {}
            // frames racing a close are dropped, as the peer will discard
            // them anyway
            ConnectionState::CloseSent | ConnectionState::End => return Ok(Running::Continue),
            _ => return Err(Error::IllegalState),
        }

        let SessionFrame { channel, body } = frame;
        let body = match body {
            SessionFrameBody::Begin(begin) => FrameBody::Begin(begin),
            SessionFrameBody::Attach(attach) => FrameBody::Attach(attach),
            SessionFrameBody::Flow(flow) => FrameBody::Flow(flow),
            SessionFrameBody::Transfer {
                performative,
                payload,
            } => FrameBody::Transfer {
                performative,
                payload,
            },
            SessionFrameBody::Disposition(disposition) => FrameBody::Disposition(disposition),
            SessionFrameBody::Detach(detach) => FrameBody::Detach(detach),
            SessionFrameBody::End(end) => FrameBody::End(end),
        };
        self.transport.send(Frame::new(channel, body)).await?;
        Ok(Running::Continue)
    }

    async fn on_heartbeat(&mut self) -> Result<Running, Error> {
        match self.local_state {
            ConnectionState::CloseSent | ConnectionState::End => return Ok(Running::Continue),
            _ => {}
        }
        self.transport.send(Frame::empty()).await?;
        Ok(Running::Continue)
    }

    /// Best effort: a decode failure closes the connection with
    /// amqp:decode-error before the error surfaces.
    async fn close_on_decode_error(&mut self) {
        let error = definitions::Error::new(
            Symbol::from(condition::DECODE_ERROR),
            Some("malformed frame".to_string()),
        );
        let frame = Frame::new(0, FrameBody::Close(Close { error: Some(error) }));
        let _ = self.transport.send(frame).await;
    }

    async fn event_loop(mut self) -> Result<(), Error> {
        let result = loop {
            let result = tokio::select! {
                _ = self.heartbeat.next() => self.on_heartbeat().await,
                incoming = self.transport.next() => {
                    match incoming {
                        Some(Ok(frame)) => self.on_incoming(frame).await,
                        Some(Err(err)) => {
                            if matches!(
                                &err,
                                crate::transport::Error::Frames(crate::frames::Error::Codec(_))
                            ) {
                                self.close_on_decode_error().await;
                            }
                            break Err(Error::Transport(err));
                        }
                        None => {
                            // EOF; treat an expected one as a clean stop
                            break match self.local_state {
                                ConnectionState::CloseSent | ConnectionState::End => Ok(()),
                                _ => Err(Error::Transport(crate::transport::Error::Io(
                                    std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
                                ))),
                            };
                        }
                    }
                },
                control = self.control.recv() => {
                    match control {
                        Some(control) => self.on_control(control).await,
                        // every handle is gone; nothing left to serve
                        None => Ok(Running::Stop),
                    }
                },
                frame = self.outgoing.recv() => {
                    match frame {
                        Some(frame) => self.on_outgoing(frame).await,
                        None => Ok(Running::Stop),
                    }
                }
            };

            match result {
                Ok(Running::Continue) => {}
                Ok(Running::Stop) => break Ok(()),
                Err(err) => {
                    error!(%err, "connection engine error");
                    break Err(err);
                }
            }
        };

        debug!("connection engine exited");
        match self.remote_error.take() {
            Some(error) => Err(Error::RemoteClosedWithError(error)),
            None => result,
        }
    }
}
