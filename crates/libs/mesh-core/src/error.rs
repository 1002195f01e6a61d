use mesh_io::TransportError;

/// Stable-coded error taxonomy surfaced to the embedding application.
/// Codes are part of the wire-adjacent contract — do not renumber.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("unclassified failure: {0}")]
    Unknown(String),
    #[error("radio adapter disabled")]
    AdapterDisabled,
    #[error("radio adapter unauthorized")]
    AdapterUnauthorized,
    #[error("radio adapter does not support this capability")]
    AdapterNotSupported,
    #[error("radio adapter busy")]
    AdapterBusy,
    #[error("peer violated the protocol")]
    ProtocolViolation,
    #[error("operation requires an established link")]
    NotConnected,
    #[error("peer refused connection")]
    NotConnectable,
    #[error("link-up deadline exceeded")]
    ConnectionTimeout,
    #[error("stream was closed before use")]
    StreamNotOpen,
}

impl MeshError {
    /// Stable numeric code, independent of Rust's enum discriminant layout.
    pub fn code(&self) -> u8 {
        match self {
            MeshError::Unknown(_) => 0,
            MeshError::AdapterDisabled => 1,
            MeshError::AdapterUnauthorized => 2,
            MeshError::AdapterNotSupported => 3,
            MeshError::AdapterBusy => 4,
            MeshError::ProtocolViolation => 5,
            MeshError::NotConnected => 6,
            MeshError::NotConnectable => 7,
            MeshError::ConnectionTimeout => 8,
            MeshError::StreamNotOpen => 9,
        }
    }
}

impl From<TransportError> for MeshError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::StreamNotOpen => MeshError::StreamNotOpen,
            TransportError::Invalidated => MeshError::NotConnected,
            TransportError::Unknown(msg) => MeshError::Unknown(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_the_stable_taxonomy() {
        assert_eq!(MeshError::Unknown("x".into()).code(), 0);
        assert_eq!(MeshError::StreamNotOpen.code(), 9);
    }

    #[test]
    fn transport_errors_classify_into_mesh_errors() {
        assert_eq!(MeshError::from(TransportError::StreamNotOpen), MeshError::StreamNotOpen);
        assert_eq!(MeshError::from(TransportError::Invalidated), MeshError::NotConnected);
    }
}
