//! Shared pieces of the `meshd` demo binary: TOML config loading and a
//! logging [`mesh_core::MeshObserver`]. Kept in the library target so the
//! binary's `main.rs` stays a thin wiring script.

pub mod config;
pub mod observer;

pub use config::DaemonConfig;
pub use observer::LoggingObserver;
