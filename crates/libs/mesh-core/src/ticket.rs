use std::time::Instant;

use mesh_codec::Instance;

/// Correlation key for an application message awaiting acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub sequence: u32,
    pub destination: Instance,
}

impl Ticket {
    pub fn new(sequence: u32, destination: Instance) -> Self {
        Self { sequence, destination }
    }
}

/// Application-visible handle for a sent payload. The core does not retain
/// the payload bytes past enqueueing it for transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    pub identifier: u32,
    pub destination: Instance,
    pub want_ack: bool,
}

impl MessageInfo {
    pub fn new(identifier: u32, destination: Instance, want_ack: bool) -> Self {
        Self { identifier, destination, want_ack }
    }
}

pub(crate) struct PendingTicket {
    pub info: MessageInfo,
    pub created_at: Instant,
}
