//! Opaque reference to a broker-side consumer.

use std::fmt;
use std::sync::Arc;

/// Identity of one subscribing party.
///
/// The broker owns the consumer; the bridge holds this non-owning reference
/// only, as a map key and as the address for outbound delivery. Cheap to
/// clone.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConsumerRef {
    id: Arc<str>,
}

impl ConsumerRef {
    /// Creates a reference from the broker's identifier for the consumer.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self { id: id.into() }
    }

    /// The broker-side identifier.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for ConsumerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConsumerRef").field(&self.id).finish()
    }
}

impl fmt::Display for ConsumerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
