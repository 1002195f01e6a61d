use mesh_codec::Instance;

use crate::error::MeshError;
use crate::ticket::MessageInfo;

/// Receives lifecycle and protocol notifications from a [`crate::Mesh`].
/// Every method has a no-op default; implementors override only what they
/// need. Invoked with no internal lock held.
pub trait MeshObserver: Send + Sync {
    fn on_started(&self) {}
    fn on_stopped(&self, _error: Option<MeshError>) {}
    fn on_failed_start(&self, _error: MeshError) {}
    fn on_ready(&self) {}
    fn on_instance_found(&self, _instance: Instance) {}
    fn on_instance_lost(&self, _instance: Instance, _error: Option<MeshError>) {}
    fn on_message_received(&self, _bytes: Vec<u8>, _source: Instance) {}
    fn on_message_sent(&self, _info: MessageInfo, _destination: Instance, _progress: f32, _done: bool) {}
    fn on_message_delivered(&self, _info: MessageInfo, _destination: Instance, _progress: f32, _done: bool) {}
    fn on_message_failed_sending(&self, _info: MessageInfo, _destination: Instance, _error: MeshError) {}
}
