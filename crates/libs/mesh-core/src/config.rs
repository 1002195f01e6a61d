use serde::{Deserialize, Serialize};

use crate::error::MeshError;

fn default_ack_timeout_ms() -> u64 {
    30_000
}

/// Host configuration, set once at `configure()` time. `app_identifier`
/// filters peers at discovery: nodes with a different app identifier are
/// never installed in the routing table even if they share a radio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostConfig {
    pub app_identifier: String,
    pub context: String,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

impl HostConfig {
    pub fn new(app_identifier: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            app_identifier: app_identifier.into(),
            context: context.into(),
            ack_timeout_ms: default_ack_timeout_ms(),
        }
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        let id = &self.app_identifier;
        if id.len() != 8 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MeshError::Unknown(format!(
                "app_identifier must be exactly 8 hex characters, got {id:?}"
            )));
        }
        if self.context.is_empty() {
            return Err(MeshError::Unknown("context must not be empty".into()));
        }
        Ok(())
    }

    /// The 4-byte app identifier encoded in every `Instance` this host mints.
    pub fn app_id_bytes(&self) -> [u8; 4] {
        let mut out = [0u8; 4];
        hex_decode(&self.app_identifier, &mut out);
        out
    }
}

fn hex_decode(s: &str, out: &mut [u8]) {
    let bytes = s.as_bytes();
    for (i, chunk) in out.iter_mut().enumerate() {
        let hi = (bytes[i * 2] as char).to_digit(16).unwrap_or(0) as u8;
        let lo = (bytes[i * 2 + 1] as char).to_digit(16).unwrap_or(0) as u8;
        *chunk = (hi << 4) | lo;
    }
}
