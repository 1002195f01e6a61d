//! Wire protocol for the mesh bridge.
//!
//! ```text
//! +---------+------+--------------+------------------------------+
//! | version |  type | sequence    | kind-specific body            |
//! |  u8     |  u8   | u32 BE      |                                |
//! +---------+------+--------------+------------------------------+
//! ```
//!
//! Six packet kinds share this header: `Handshake`, `Update`, `Data`,
//! `Acknowledgement`, `Internet`, `InternetResponse`. [`Codec`] is a registry
//! keyed by type tag; unknown tags are reported, not treated as errors, so
//! that future packet kinds can be added without breaking older peers.

pub mod instance;
pub mod packet;
pub mod wire;

pub use instance::Instance;
pub use packet::Packet;
pub use wire::{
    Codec, DecodeOutcome, HEADER_LEN, TYPE_ACKNOWLEDGEMENT, TYPE_DATA, TYPE_HANDSHAKE,
    TYPE_INTERNET, TYPE_INTERNET_RESPONSE, TYPE_UPDATE, WIRE_VERSION,
};
