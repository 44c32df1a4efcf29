//! Messaging-layer types: termini, delivery states, and the message format.

mod delivery_state;
mod message;
mod terminus;

pub use delivery_state::{Accepted, DeliveryState, Modified, Received, Rejected, Released};
pub use message::{ApplicationProperties, Body, Header, Message, Properties};
pub use terminus::{LifetimePolicy, Source, Target, TerminusDurability, TerminusExpiryPolicy};

use crate::codec::Value;

/// Annotation keys must be symbols or (long) integers; values are any AMQP
/// value. Insertion order is preserved on re-encode.
pub type Annotations = Vec<(Value, Value)>;

/// A set of named filter predicates on a source.
pub type FilterSet = crate::definitions::Fields;
