use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use mesh_codec::Instance;
use mesh_io::DeviceTransport;
use mesh_routing::Device;
use mesh_state::{StateMachine, StateMachineObserver};
use rand_core::{OsRng, RngCore};

use crate::config::HostConfig;
use crate::controller::{InternetEgress, NetworkController};
use crate::error::MeshError;
use crate::observer::MeshObserver;
use crate::ticket::MessageInfo;

static HOST_SINGLETON: OnceLock<Arc<Mesh>> = OnceLock::new();

/// Forwards lifecycle transitions from the generic state machine to every
/// subscribed `MeshObserver`. This core has no slow external dependency of
/// its own (radio readiness lives one layer up, in the transport), so
/// `start`/`stop` settle synchronously — `on_ready` fires alongside
/// `on_started` rather than waiting on a second signal.
struct LifecycleBridge {
    observers: Arc<Mutex<Vec<Arc<dyn MeshObserver>>>>,
}

impl StateMachineObserver<MeshError> for LifecycleBridge {
    fn on_start(&self) {
        for observer in self.observers.lock().unwrap().iter() {
            observer.on_started();
            observer.on_ready();
        }
    }
    fn on_stop(&self, error: Option<MeshError>) {
        for observer in self.observers.lock().unwrap().iter() {
            observer.on_stopped(error.clone());
        }
    }
    fn on_failed_start(&self, error: MeshError) {
        for observer in self.observers.lock().unwrap().iter() {
            observer.on_failed_start(error.clone());
        }
    }
}

/// The bridge's public facade: one per process, reachable either through
/// the `Arc` returned by [`Mesh::configure`] or, afterward, via
/// [`Mesh::instance`].
pub struct Mesh {
    config: HostConfig,
    host_instance: Instance,
    controller: Arc<NetworkController>,
    state: StateMachine<MeshError>,
    observers: Arc<Mutex<Vec<Arc<dyn MeshObserver>>>>,
}

impl Mesh {
    /// Validates `config`, mints the host `Instance`, and eagerly builds
    /// every component (routing table, I/O controller, lifecycle engine).
    /// Doubles as the host-instance singleton setter: a second `configure`
    /// call still returns a fresh, independent `Mesh`, but only the first
    /// one ever populates `Mesh::instance()`.
    pub fn configure(config: HostConfig) -> Result<Arc<Mesh>, MeshError> {
        Self::configure_with_egress(config, None)
    }

    pub fn configure_with_egress(config: HostConfig, egress: Option<Arc<dyn InternetEgress>>) -> Result<Arc<Mesh>, MeshError> {
        config.validate()?;

        let mut device_id = [0u8; 12];
        OsRng.fill_bytes(&mut device_id);
        let host_instance = Instance::from_parts(config.app_id_bytes(), device_id);

        let observers: Arc<Mutex<Vec<Arc<dyn MeshObserver>>>> = Arc::new(Mutex::new(Vec::new()));
        let controller = NetworkController::new(
            host_instance,
            observers.clone(),
            egress,
            Duration::from_millis(config.ack_timeout_ms),
        );
        let bridge = Arc::new(LifecycleBridge { observers: observers.clone() });
        let state = StateMachine::new(bridge);

        let mesh = Arc::new(Mesh { config, host_instance, controller, state, observers });
        let _ = HOST_SINGLETON.set(Arc::clone(&mesh));
        Ok(mesh)
    }

    /// The first `Mesh` ever configured in this process, if any.
    pub fn instance() -> Option<Arc<Mesh>> {
        HOST_SINGLETON.get().cloned()
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn host_instance(&self) -> Instance {
        self.host_instance
    }

    pub fn subscribe(&self, observer: Arc<dyn MeshObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// No real adapter-level startup latency exists at this layer, so the
    /// request and its completion are reported back to back.
    pub fn start(&self) {
        self.state.start();
        self.controller.start();
        self.state.notify_started();
    }

    pub fn stop(&self) {
        self.state.stop();
        self.controller.stop();
        self.state.notify_stopped(None);
    }

    pub async fn send(&self, payload: Vec<u8>, destination: Instance, want_ack: bool) -> MessageInfo {
        self.controller.send(payload, destination, want_ack).await
    }

    /// Integration seam for whatever owns radio discovery: hand the core a
    /// newly opened direct link. Not one of the five application-facing
    /// entry points, but something has to register transports.
    pub async fn device_connected(&self, device: Device, transport: Arc<dyn DeviceTransport>) {
        self.controller.device_connected(device, transport).await;
    }

    pub async fn device_disconnected(&self, device: &Device) {
        self.controller.device_disconnected(device).await;
    }

    pub fn send_internet_request(&self, url: String, body: String, test_id: u8) -> u32 {
        self.controller.send_internet_request(url, body, test_id)
    }

    pub fn take_internet_response(&self, sequence: u32) -> Option<(u16, String)> {
        self.controller.take_internet_response(sequence)
    }
}
