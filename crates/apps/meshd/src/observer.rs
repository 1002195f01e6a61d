use mesh_codec::Instance;
use mesh_core::{MeshError, MeshObserver, MessageInfo};

/// Prints lifecycle and protocol events through `log`, tagged with a label
/// so a demo running several in-process hosts stays readable on one screen.
pub struct LoggingObserver {
    label: String,
}

impl LoggingObserver {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl MeshObserver for LoggingObserver {
    fn on_started(&self) {
        log::info!("[{}] started", self.label);
    }

    fn on_stopped(&self, error: Option<MeshError>) {
        match error {
            Some(err) => log::warn!("[{}] stopped: {err}", self.label),
            None => log::info!("[{}] stopped", self.label),
        }
    }

    fn on_failed_start(&self, error: MeshError) {
        log::error!("[{}] failed to start: {error}", self.label);
    }

    fn on_ready(&self) {
        log::debug!("[{}] ready", self.label);
    }

    fn on_instance_found(&self, instance: Instance) {
        log::info!("[{}] found peer {instance:?}", self.label);
    }

    fn on_instance_lost(&self, instance: Instance, error: Option<MeshError>) {
        log::info!("[{}] lost peer {instance:?} ({error:?})", self.label);
    }

    fn on_message_received(&self, bytes: Vec<u8>, source: Instance) {
        let text = String::from_utf8_lossy(&bytes);
        log::info!("[{}] received {text:?} from {source:?}", self.label);
    }

    fn on_message_sent(&self, info: MessageInfo, destination: Instance, _progress: f32, _done: bool) {
        log::debug!("[{}] sent #{} to {destination:?}", self.label, info.identifier);
    }

    fn on_message_delivered(&self, info: MessageInfo, destination: Instance, _progress: f32, _done: bool) {
        log::info!("[{}] delivered #{} to {destination:?}", self.label, info.identifier);
    }

    fn on_message_failed_sending(&self, info: MessageInfo, destination: Instance, error: MeshError) {
        log::warn!("[{}] failed to deliver #{} to {destination:?}: {error}", self.label, info.identifier);
    }
}
