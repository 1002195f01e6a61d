use std::fmt;

/// Network-wide identity of one application running on one device.
///
/// The first 4 bytes are the app identifier shared by cooperating peers; the
/// remaining 12 bytes are a device identifier drawn once per host at startup.
/// Equality and hashing cover the full 16 bytes. Immutable once constructed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instance([u8; 16]);

impl Instance {
    pub const LEN: usize = 16;

    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn from_parts(app_id: [u8; 4], device_id: [u8; 12]) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..4].copy_from_slice(&app_id);
        bytes[4..].copy_from_slice(&device_id);
        Self(bytes)
    }

    pub fn app_id(&self) -> [u8; 4] {
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.0[..4]);
        out
    }

    pub fn device_id(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out.copy_from_slice(&self.0[4..]);
        out
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 16] {
        self.0
    }
}

impl From<[u8; 16]> for Instance {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance(")?;
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
