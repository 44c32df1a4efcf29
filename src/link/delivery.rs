//! Sendable and received deliveries.

use bytes::Bytes;

use crate::definitions::{DeliveryNumber, DeliveryTag, MessageFormat};
use crate::messaging::Message;

/// A message staged for sending, with its per-delivery options.
#[derive(Debug)]
pub struct Sendable {
    pub message: Message,
    pub message_format: MessageFormat,
    /// Per-send settlement override, honored in mixed mode.
    pub settled: Option<bool>,
    /// Delivery tag of up to 32 bytes; generated when absent.
    pub delivery_tag: Option<DeliveryTag>,
}

impl Sendable {
    pub fn builder() -> SendableBuilder {
        SendableBuilder::new()
    }
}

impl<T> From<T> for Sendable
where
    T: Into<Message>,
{
    fn from(value: T) -> Self {
        Self {
            message: value.into(),
            message_format: 0,
            settled: None,
            delivery_tag: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SendableBuilder {
    message: Message,
    message_format: MessageFormat,
    settled: Option<bool>,
    delivery_tag: Option<DeliveryTag>,
}

impl SendableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: impl Into<Message>) -> Self {
        self.message = message.into();
        self
    }

    pub fn message_format(mut self, message_format: MessageFormat) -> Self {
        self.message_format = message_format;
        self
    }

    pub fn settled(mut self, settled: impl Into<Option<bool>>) -> Self {
        self.settled = settled.into();
        self
    }

    pub fn delivery_tag(mut self, delivery_tag: impl Into<Bytes>) -> Self {
        self.delivery_tag = Some(delivery_tag.into());
        self
    }

    pub fn build(self) -> Sendable {
        Sendable {
            message: self.message,
            message_format: self.message_format,
            settled: self.settled,
            delivery_tag: self.delivery_tag,
        }
    }
}

/// A message received on a link, with the identifiers needed to settle it.
#[derive(Debug)]
pub struct Delivery {
    pub(crate) message: Message,
    pub(crate) delivery_id: DeliveryNumber,
    pub(crate) delivery_tag: DeliveryTag,
    pub(crate) message_format: MessageFormat,
    pub(crate) settled: bool,
}

impl Delivery {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn delivery_id(&self) -> DeliveryNumber {
        self.delivery_id
    }

    pub fn delivery_tag(&self) -> &DeliveryTag {
        &self.delivery_tag
    }

    pub fn message_format(&self) -> MessageFormat {
        self.message_format
    }

    /// Whether the sender already settled this delivery.
    pub fn is_settled(&self) -> bool {
        self.settled
    }
}
