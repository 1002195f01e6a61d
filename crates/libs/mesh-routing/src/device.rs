use std::fmt;

/// A local handle to a peer reachable over one direct radio link.
///
/// The routing table only needs the stable identifier — the actual byte
/// channel lives on the transport side (`mesh-io`). Two `Device`s referring
/// to the same remote instance over different transports are distinct.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Device(String);

impl Device {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device({})", self.0)
    }
}

impl From<&str> for Device {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Device {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
