//! Stream framing, sequencing, and the stop-and-wait send/receive engine for
//! the mesh bridge.
//!
//! [`IoController`] owns the single outbound queue (exactly one write in
//! flight at a time) and the per-device receive loops that feed the codec.
//! [`DeviceTransport`] is the abstract seam to a radio adapter;
//! [`LoopbackTransport`] is the in-process stand-in used by tests and the
//! demo binary.

pub mod io_controller;
pub mod sequence;
pub mod stream_buffer;
pub mod transport;

pub use io_controller::{IoController, IoDelegate, IoPacket};
pub use sequence::SequenceGen;
pub use stream_buffer::StreamBuffer;
pub use transport::{DeviceTransport, LoopbackTransport, TransportError};
