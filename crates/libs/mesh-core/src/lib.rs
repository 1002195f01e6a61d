//! Facade and protocol glue for the mesh bridge.
//!
//! [`Mesh`] is the five-entry-point public surface (`configure`, `start`,
//! `stop`, `send`, `subscribe`); [`NetworkController`] underneath it
//! implements the handshake / route-propagation / forwarding / ack /
//! Internet-relay protocol described by `mesh-routing` and `mesh-io`.

pub mod config;
pub mod controller;
pub mod error;
pub mod mesh;
pub mod observer;
pub mod ticket;

pub use config::HostConfig;
pub use controller::{InternetEgress, NetworkController};
pub use error::MeshError;
pub use mesh::Mesh;
pub use observer::MeshObserver;
pub use ticket::{MessageInfo, Ticket};
