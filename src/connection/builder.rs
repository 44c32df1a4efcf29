use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use url::Url;

use crate::connection::engine::ConnectionEngine;
use crate::connection::{Connection, OpenError};
use crate::definitions::{Fields, Milliseconds, MIN_MAX_FRAME_SIZE};
use crate::performatives::Open;
use crate::primitives::Symbol;
use crate::sasl_profile::SaslProfile;
use crate::transport::{protocol_header::ProtocolHeader, Transport};
use crate::util::random_name;

pub(crate) const DEFAULT_CONTROL_CHAN_BUF: usize = 128;

/// Default capacity of the multi-producer outgoing frame queue.
pub const DEFAULT_OUTGOING_BUFFER_SIZE: usize = u16::MAX as usize;

/// Default local max-frame-size advertised in Open.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 65_536;

/// Connection builder.
#[derive(Debug)]
pub struct Builder {
    /// Defaults to a generated name.
    pub container_id: Option<String>,
    pub hostname: Option<String>,
    pub max_frame_size: u32,
    pub channel_max: u16,
    /// Advertised to the peer and enforced locally on inbound silence.
    pub idle_time_out: Option<Milliseconds>,
    pub offered_capabilities: Option<Vec<Symbol>>,
    pub desired_capabilities: Option<Vec<Symbol>>,
    pub properties: Option<Fields>,
    pub sasl_profile: Option<SaslProfile>,
    pub buffer_size: usize,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            container_id: None,
            hostname: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            channel_max: u16::MAX,
            idle_time_out: None,
            offered_capabilities: None,
            desired_capabilities: None,
            properties: None,
            sasl_profile: None,
            buffer_size: DEFAULT_OUTGOING_BUFFER_SIZE,
        }
    }

    pub fn container_id(mut self, id: impl Into<String>) -> Self {
        self.container_id = Some(id.into());
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn channel_max(mut self, channel_max: u16) -> Self {
        self.channel_max = channel_max;
        self
    }

    pub fn idle_time_out(mut self, millis: Milliseconds) -> Self {
        self.idle_time_out = Some(millis);
        self
    }

    pub fn add_offered_capability(mut self, capability: impl Into<Symbol>) -> Self {
        self.offered_capabilities
            .get_or_insert_with(Vec::new)
            .push(capability.into());
        self
    }

    pub fn add_desired_capability(mut self, capability: impl Into<Symbol>) -> Self {
        self.desired_capabilities
            .get_or_insert_with(Vec::new)
            .push(capability.into());
        self
    }

    pub fn properties(mut self, properties: Fields) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn sasl_profile(mut self, profile: impl Into<SaslProfile>) -> Self {
        self.sasl_profile = Some(profile.into());
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Resolves `url`, connects a TCP stream, and opens the connection.
    ///
    /// Only the `amqp` scheme is dialed directly; `amqps` (or any other
    /// secured transport) is established by the caller, who then hands the
    /// stream to [`Builder::open_with_stream`].
    pub async fn open(mut self, url: impl AsRef<str>) -> Result<Connection, OpenError> {
        let url = Url::parse(url.as_ref())?;
        if url.scheme() != "amqp" {
            return Err(OpenError::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = url.host_str().ok_or(OpenError::InvalidDomain)?.to_string();
        let port = url.port().unwrap_or(5672);

        if self.hostname.is_none() {
            self.hostname = Some(host.clone());
        }
        if self.sasl_profile.is_none() {
            self.sasl_profile = SaslProfile::try_from(&url).ok();
        }

        let stream = TcpStream::connect((host.as_str(), port)).await?;
        self.open_with_stream(stream).await
    }

    /// Opens the connection over a caller-supplied stream (a TLS session, a
    /// proxied tunnel, an in-memory duplex in tests).
    pub async fn open_with_stream<Io>(self, mut io: Io) -> Result<Connection, OpenError>
    where
        Io: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.max_frame_size < MIN_MAX_FRAME_SIZE {
            return Err(OpenError::InvalidMaxFrameSize(self.max_frame_size));
        }

        if let Some(profile) = &self.sasl_profile {
            profile.negotiate(&mut io, self.hostname.as_deref()).await?;
        }

        Transport::negotiate(&mut io, ProtocolHeader::amqp()).await?;
        let idle_timeout = self
            .idle_time_out
            .map(|millis| Duration::from_millis(millis as u64));
        let transport = Transport::bind(io, self.max_frame_size as usize, idle_timeout);

        let local_open = Open {
            container_id: self.container_id.unwrap_or_else(random_name),
            hostname: self.hostname,
            max_frame_size: self.max_frame_size,
            channel_max: self.channel_max,
            idle_time_out: self.idle_time_out,
            offered_capabilities: self.offered_capabilities,
            desired_capabilities: self.desired_capabilities,
            properties: self.properties,
            ..Default::default()
        };

        let (control_tx, control_rx) = mpsc::channel(DEFAULT_CONTROL_CHAN_BUF);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(self.buffer_size);

        let (engine, remote_open) =
            ConnectionEngine::open(transport, local_open, control_rx, outgoing_rx).await?;
        let peer_max_frame_size = remote_open.max_frame_size;
        let engine = engine.spawn();

        Ok(Connection {
            control: control_tx,
            engine,
            outgoing: outgoing_tx,
            session_buffer_size: self.buffer_size,
            peer_max_frame_size,
        })
    }
}
