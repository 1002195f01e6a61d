//! Device/link routing table for the mesh bridge.
//!
//! Tracks, per directly-connected [`Device`], the set of [`Link`]s reachable
//! through it, and answers "what's the best path to this instance" queries
//! with split-horizon support. The table emits [`RoutingEvent`]s describing
//! what changed rather than holding an observer registry itself — callers
//! collect the returned events and dispatch them.

pub mod device;
pub mod events;
pub mod link;
pub mod table;

pub use device::Device;
pub use events::RoutingEvent;
pub use link::{Link, INTERNET_UNREACHABLE};
pub use table::{RoutingTable, MAX_HOP_COUNT};
