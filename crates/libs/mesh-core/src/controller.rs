use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use mesh_codec::{Instance, Packet};
use mesh_io::{DeviceTransport, IoController, IoDelegate, IoPacket, SequenceGen, TransportError};
use mesh_routing::{Device, Link, RoutingEvent, RoutingTable, INTERNET_UNREACHABLE, MAX_HOP_COUNT};
use tokio_util::sync::CancellationToken;

use crate::error::MeshError;
use crate::observer::MeshObserver;
use crate::ticket::{MessageInfo, PendingTicket, Ticket};

/// External collaborator performing the actual HTTP call for a gateway host.
/// Out of scope for protocol correctness; the controller treats it as a
/// request/response black box keyed by the packet's sequence number.
pub trait InternetEgress: Send + Sync {
    fn perform(&self, url: String, body: String) -> (u16, String);
}

/// Glues the codec, routing table and I/O controller into the mesh
/// protocol: handshake, update propagation, forwarding, ack correlation,
/// and Internet relay.
pub struct NetworkController {
    host_instance: Instance,
    io: Arc<IoController>,
    routing: Arc<Mutex<RoutingTable>>,
    sequence: SequenceGen,
    observers: Arc<Mutex<Vec<Arc<dyn MeshObserver>>>>,
    pending_tickets: Mutex<HashMap<Ticket, PendingTicket>>,
    pending_internet: Mutex<HashMap<u32, (u16, String)>>,
    egress: Option<Arc<dyn InternetEgress>>,
    ack_timeout: Duration,
    cancel: CancellationToken,
}

/// Forwards `IoController` events to the owning `NetworkController` without
/// either side holding a strong reference to the other — the same
/// break-the-cycle role `Weak` plays between paired `LoopbackTransport`s.
struct DelegateShim(Mutex<Weak<NetworkController>>);

impl IoDelegate for DelegateShim {
    fn packet_received(&self, device: &Device, packet: Packet) {
        if let Some(controller) = self.0.lock().unwrap().upgrade() {
            controller.handle_packet(device, packet);
        }
    }
    fn packet_written(&self, packet: &Packet) {
        if let Some(controller) = self.0.lock().unwrap().upgrade() {
            controller.packet_written(packet);
        }
    }
    fn write_failed(&self, packet: &Packet, error: TransportError) {
        if let Some(controller) = self.0.lock().unwrap().upgrade() {
            controller.write_failed(packet, error);
        }
    }
}

impl NetworkController {
    pub fn new(
        host_instance: Instance,
        observers: Arc<Mutex<Vec<Arc<dyn MeshObserver>>>>,
        egress: Option<Arc<dyn InternetEgress>>,
        ack_timeout: Duration,
    ) -> Arc<Self> {
        let shim = Arc::new(DelegateShim(Mutex::new(Weak::new())));
        let io = IoController::new(shim.clone());
        let controller = Arc::new(Self {
            host_instance,
            io,
            routing: Arc::new(Mutex::new(RoutingTable::new())),
            sequence: SequenceGen::default(),
            observers,
            pending_tickets: Mutex::new(HashMap::new()),
            pending_internet: Mutex::new(HashMap::new()),
            egress,
            ack_timeout,
            cancel: CancellationToken::new(),
        });
        *shim.0.lock().unwrap() = Arc::downgrade(&controller);
        controller
    }

    fn has_internet(&self) -> bool {
        self.egress.is_some()
    }

    fn notify(&self, f: impl Fn(&dyn MeshObserver)) {
        let observers = self.observers.lock().unwrap().clone();
        for observer in &observers {
            f(observer.as_ref());
        }
    }

    fn enqueue_packet(&self, packet: Packet, next_hop_fn: impl Fn() -> Option<Device> + Send + Sync + 'static) {
        let io = Arc::clone(&self.io);
        tokio::spawn(async move {
            io.enqueue(IoPacket::new(packet, next_hop_fn)).await;
        });
    }

    fn enqueue_to_device(&self, packet: Packet, device: Device) {
        self.enqueue_packet(packet, move || Some(device.clone()));
    }

    /// Spins up the dequeue loop and the acknowledgement-timeout sweeper.
    pub fn start(self: &Arc<Self>) {
        self.io.spawn_dequeue_loop();
        let controller = Arc::clone(self);
        let ack_timeout = self.ack_timeout;
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                controller.sweep_expired_tickets(ack_timeout);
            }
        });
    }

    /// Cooperative: stops accepting new background work. In-flight writes
    /// are not aborted.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.io.shutdown();
    }

    /// A new direct radio link opened: register it and announce ourselves.
    pub async fn device_connected(self: &Arc<Self>, device: Device, transport: Arc<dyn DeviceTransport>) {
        self.routing.lock().unwrap().register(device.clone());
        self.io.register_transport(device.clone(), transport).await;
        let sequence = self.sequence.next();
        let packet = Packet::Handshake { sequence, instance: self.host_instance };
        self.enqueue_to_device(packet, device);
    }

    /// A direct radio link failed: drop every route through it.
    pub async fn device_disconnected(&self, device: &Device) {
        log::info!("device {device:?} disconnected");
        self.io.unregister_transport(device).await;
        let events = self.routing.lock().unwrap().unregister(device);
        self.dispatch_routing_events(events);
    }

    /// `send(payload, destination, want_ack) -> MessageInfo`, the
    /// application-facing entry point.
    pub async fn send(&self, payload: Vec<u8>, destination: Instance, want_ack: bool) -> MessageInfo {
        let sequence = self.sequence.next();
        let info = MessageInfo::new(sequence, destination, want_ack);
        if want_ack {
            self.pending_tickets.lock().unwrap().insert(
                Ticket::new(sequence, destination),
                PendingTicket { info, created_at: Instant::now() },
            );
        }
        let routing = Arc::clone(&self.routing);
        let next_hop_fn = move || routing.lock().unwrap().best_link(&destination, None).map(|l| l.next_hop_device);
        let packet = Packet::Data { sequence, origin: self.host_instance, destination, want_ack, payload };
        self.io.enqueue(IoPacket::new(packet, next_hop_fn)).await;
        info
    }

    /// Enqueue a request bound for whichever peer has Internet, returning
    /// the sequence number to later poll with `take_internet_response`.
    pub fn send_internet_request(&self, url: String, body: String, test_id: u8) -> u32 {
        let sequence = self.sequence.next();
        let routing = Arc::clone(&self.routing);
        let next_hop_fn = move || routing.lock().unwrap().best_internet_link(None).map(|l| l.next_hop_device);
        let packet = Packet::Internet { sequence, origin: self.host_instance, hop_count: 1, test_id, url, body };
        self.enqueue_packet(packet, next_hop_fn);
        sequence
    }

    pub fn take_internet_response(&self, sequence: u32) -> Option<(u16, String)> {
        self.pending_internet.lock().unwrap().remove(&sequence)
    }

    fn dispatch_routing_events(&self, events: Vec<RoutingEvent>) {
        for event in events {
            match event {
                RoutingEvent::InstanceFound(instance) => self.notify(|o| o.on_instance_found(instance)),
                RoutingEvent::InstanceLost(instance) => self.notify(|o| o.on_instance_lost(instance, None)),
                RoutingEvent::LinkUpdate(link) => self.propagate_update(&link),
            }
        }
    }

    /// Fan out a route change to every other directly-linked neighbor,
    /// incrementing hop counts and applying poison reverse.
    fn propagate_update(&self, link: &Link) {
        let hop_count = link.hop_count.saturating_add(1);
        if hop_count >= MAX_HOP_COUNT {
            return;
        }
        let internet_hop_count = link.internet_hop_count.saturating_add(1).min(INTERNET_UNREACHABLE);
        let neighbors = self.routing.lock().unwrap().registered_devices();
        for neighbor in neighbors {
            if neighbor == link.next_hop_device {
                continue;
            }
            let sequence = self.sequence.next();
            let packet = Packet::Update {
                sequence,
                destination: link.destination_instance,
                hop_count,
                internet_hop_count,
            };
            self.enqueue_to_device(packet, neighbor);
        }
    }

    fn handle_packet(&self, source_device: &Device, packet: Packet) {
        match packet {
            Packet::Handshake { instance, .. } => {
                let internet_hop_count = if self.has_internet() { 1 } else { INTERNET_UNREACHABLE };
                let events = self.routing.lock().unwrap().register_or_update(
                    source_device.clone(),
                    instance,
                    1,
                    internet_hop_count,
                );
                self.dispatch_routing_events(events);
            }
            Packet::Update { destination, hop_count, internet_hop_count, .. } => {
                if destination == self.host_instance {
                    return;
                }
                let events = self.routing.lock().unwrap().register_or_update(
                    source_device.clone(),
                    destination,
                    hop_count.saturating_add(1),
                    internet_hop_count.saturating_add(1).min(INTERNET_UNREACHABLE),
                );
                self.dispatch_routing_events(events);
            }
            Packet::Data { sequence, origin, destination, want_ack, payload } => {
                if destination == self.host_instance {
                    self.notify(|o| o.on_message_received(payload.clone(), origin));
                    if want_ack {
                        self.enqueue_ack(sequence, origin, source_device.clone());
                    }
                } else {
                    self.forward_data(sequence, origin, destination, want_ack, payload, source_device.clone());
                }
            }
            Packet::Acknowledgement { sequence, origin, destination } => {
                if destination == self.host_instance {
                    self.complete_ticket(sequence, origin);
                } else {
                    self.forward_ack(sequence, origin, destination, source_device.clone());
                }
            }
            Packet::Internet { sequence, origin, hop_count, test_id, url, body } => {
                self.handle_internet(sequence, origin, hop_count, test_id, url, body, source_device.clone());
            }
            Packet::InternetResponse { sequence, origin, status, body } => {
                if origin == self.host_instance {
                    self.pending_internet.lock().unwrap().insert(sequence, (status, body));
                } else {
                    self.forward_internet_response(sequence, origin, status, body, source_device.clone());
                }
            }
        }
    }

    fn enqueue_ack(&self, sequence: u32, origin: Instance, source_device: Device) {
        let routing = Arc::clone(&self.routing);
        let next_hop_fn = move || routing.lock().unwrap().best_link(&origin, Some(&source_device)).map(|l| l.next_hop_device);
        let packet = Packet::Acknowledgement { sequence, origin: self.host_instance, destination: origin };
        self.enqueue_packet(packet, next_hop_fn);
    }

    fn forward_data(&self, sequence: u32, origin: Instance, destination: Instance, want_ack: bool, payload: Vec<u8>, source_device: Device) {
        let routing = Arc::clone(&self.routing);
        let next_hop_fn = move || routing.lock().unwrap().best_link(&destination, Some(&source_device)).map(|l| l.next_hop_device);
        let packet = Packet::Data { sequence, origin, destination, want_ack, payload };
        self.enqueue_packet(packet, next_hop_fn);
    }

    fn forward_ack(&self, sequence: u32, origin: Instance, destination: Instance, source_device: Device) {
        let routing = Arc::clone(&self.routing);
        let next_hop_fn = move || routing.lock().unwrap().best_link(&destination, Some(&source_device)).map(|l| l.next_hop_device);
        let packet = Packet::Acknowledgement { sequence, origin, destination };
        self.enqueue_packet(packet, next_hop_fn);
    }

    fn forward_internet_response(&self, sequence: u32, origin: Instance, status: u16, body: String, source_device: Device) {
        let routing = Arc::clone(&self.routing);
        let next_hop_fn = move || routing.lock().unwrap().best_link(&origin, Some(&source_device)).map(|l| l.next_hop_device);
        let packet = Packet::InternetResponse { sequence, origin, status, body };
        self.enqueue_packet(packet, next_hop_fn);
    }

    fn handle_internet(&self, sequence: u32, origin: Instance, hop_count: u8, test_id: u8, url: String, body: String, source_device: Device) {
        if let Some(egress) = self.egress.clone() {
            let io = Arc::clone(&self.io);
            let routing = Arc::clone(&self.routing);
            tokio::spawn(async move {
                let (status, response_body) = egress.perform(url, body);
                let packet = Packet::InternetResponse { sequence, origin, status, body: response_body };
                let next_hop_fn = move || routing.lock().unwrap().best_link(&origin, None).map(|l| l.next_hop_device);
                io.enqueue(IoPacket::new(packet, next_hop_fn)).await;
            });
        } else {
            let next_hop_count = hop_count.saturating_add(1);
            if next_hop_count >= MAX_HOP_COUNT {
                return;
            }
            let routing = Arc::clone(&self.routing);
            let next_hop_fn = move || routing.lock().unwrap().best_internet_link(Some(&source_device)).map(|l| l.next_hop_device);
            let packet = Packet::Internet { sequence, origin, hop_count: next_hop_count, test_id, url, body };
            self.enqueue_packet(packet, next_hop_fn);
        }
    }

    fn complete_ticket(&self, sequence: u32, ack_origin: Instance) {
        let ticket = Ticket::new(sequence, ack_origin);
        if let Some(pending) = self.pending_tickets.lock().unwrap().remove(&ticket) {
            self.notify(|o| o.on_message_delivered(pending.info, ack_origin, 1.0, true));
        }
    }

    fn sweep_expired_tickets(&self, ack_timeout: Duration) {
        let expired: Vec<(Ticket, MessageInfo)> = {
            let mut pending = self.pending_tickets.lock().unwrap();
            let now = Instant::now();
            let expired_keys: Vec<Ticket> = pending
                .iter()
                .filter(|(_, p)| now.duration_since(p.created_at) >= ack_timeout)
                .map(|(t, _)| *t)
                .collect();
            expired_keys
                .into_iter()
                .map(|t| {
                    let pending = pending.remove(&t).expect("key just collected from this map");
                    (t, pending.info)
                })
                .collect()
        };
        for (ticket, info) in expired {
            log::warn!("ack timeout for message #{} to {:?}", info.identifier, ticket.destination);
            self.notify(|o| o.on_message_failed_sending(info, ticket.destination, MeshError::ConnectionTimeout));
        }
    }

    fn packet_written(&self, packet: &Packet) {
        if let Packet::Data { sequence, origin, destination, want_ack, .. } = packet {
            if *origin == self.host_instance {
                let info = MessageInfo::new(*sequence, *destination, *want_ack);
                self.notify(|o| o.on_message_sent(info, *destination, 1.0, true));
            }
        }
    }

    fn write_failed(&self, packet: &Packet, error: TransportError) {
        if let Packet::Data { sequence, origin, destination, want_ack, .. } = packet {
            if *origin == self.host_instance {
                let info = MessageInfo::new(*sequence, *destination, *want_ack);
                if *want_ack {
                    self.pending_tickets.lock().unwrap().remove(&Ticket::new(*sequence, *destination));
                }
                let classified = MeshError::from(error);
                log::warn!("send of message #{sequence} to {destination:?} failed: {classified}");
                self.notify(|o| o.on_message_failed_sending(info, *destination, classified.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_io::LoopbackTransport;

    fn instance(b: u8) -> Instance {
        Instance::new([b; 16])
    }

    #[derive(Default)]
    struct RecordingObserver {
        found: Mutex<Vec<Instance>>,
        lost: Mutex<Vec<Instance>>,
        received: Mutex<Vec<(Vec<u8>, Instance)>>,
        sent: Mutex<Vec<MessageInfo>>,
        delivered: Mutex<Vec<MessageInfo>>,
        failed: Mutex<Vec<MessageInfo>>,
    }

    impl MeshObserver for RecordingObserver {
        fn on_instance_found(&self, instance: Instance) {
            self.found.lock().unwrap().push(instance);
        }
        fn on_instance_lost(&self, instance: Instance, _error: Option<MeshError>) {
            self.lost.lock().unwrap().push(instance);
        }
        fn on_message_received(&self, bytes: Vec<u8>, source: Instance) {
            self.received.lock().unwrap().push((bytes, source));
        }
        fn on_message_sent(&self, info: MessageInfo, _destination: Instance, _progress: f32, _done: bool) {
            self.sent.lock().unwrap().push(info);
        }
        fn on_message_delivered(&self, info: MessageInfo, _destination: Instance, _progress: f32, _done: bool) {
            self.delivered.lock().unwrap().push(info);
        }
        fn on_message_failed_sending(&self, info: MessageInfo, _destination: Instance, _error: MeshError) {
            self.failed.lock().unwrap().push(info);
        }
    }

    fn controller(host: Instance) -> (Arc<NetworkController>, Arc<RecordingObserver>) {
        let observers: Arc<Mutex<Vec<Arc<dyn MeshObserver>>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::new(RecordingObserver::default());
        observers.lock().unwrap().push(recorder.clone() as Arc<dyn MeshObserver>);
        let controller = NetworkController::new(host, observers, None, Duration::from_millis(200));
        (controller, recorder)
    }

    #[tokio::test]
    async fn handshake_between_two_peers_finds_each_other() {
        let (a, a_obs) = controller(instance(1));
        let (b, b_obs) = controller(instance(2));
        a.start();
        b.start();

        let a_transport = LoopbackTransport::new("a");
        let b_transport = LoopbackTransport::new("b");
        LoopbackTransport::connect(&a_transport, &b_transport);

        a.device_connected(Device::new("b"), b_transport.clone()).await;
        b.device_connected(Device::new("a"), a_transport.clone()).await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(*a_obs.found.lock().unwrap(), vec![instance(2)]);
        assert_eq!(*b_obs.found.lock().unwrap(), vec![instance(1)]);
    }

    #[tokio::test]
    async fn send_with_ack_round_trips_to_delivered() {
        let (a, a_obs) = controller(instance(1));
        let (b, b_obs) = controller(instance(2));
        a.start();
        b.start();

        let a_transport = LoopbackTransport::new("a");
        let b_transport = LoopbackTransport::new("b");
        LoopbackTransport::connect(&a_transport, &b_transport);
        a.device_connected(Device::new("b"), b_transport.clone()).await;
        b.device_connected(Device::new("a"), a_transport.clone()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let info = a.send(b"hello".to_vec(), instance(2), true).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(b_obs.received.lock().unwrap().as_slice(), &[(b"hello".to_vec(), instance(1))]);
        assert_eq!(*a_obs.sent.lock().unwrap(), vec![info]);
        assert_eq!(*a_obs.delivered.lock().unwrap(), vec![info]);
    }

    #[tokio::test]
    async fn update_propagates_across_a_second_hop() {
        let (a, _a_obs) = controller(instance(1));
        let (b, _b_obs) = controller(instance(2));
        let (c, c_obs) = controller(instance(3));
        a.start();
        b.start();
        c.start();

        let ab_a = LoopbackTransport::new("ab-a");
        let ab_b = LoopbackTransport::new("ab-b");
        LoopbackTransport::connect(&ab_a, &ab_b);
        let bc_b = LoopbackTransport::new("bc-b");
        let bc_c = LoopbackTransport::new("bc-c");
        LoopbackTransport::connect(&bc_b, &bc_c);

        a.device_connected(Device::new("b"), ab_b.clone()).await;
        b.device_connected(Device::new("a"), ab_a.clone()).await;
        b.device_connected(Device::new("c"), bc_c.clone()).await;
        c.device_connected(Device::new("b"), bc_b.clone()).await;

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(c_obs.found.lock().unwrap().contains(&instance(1)));
    }

    #[tokio::test]
    async fn device_disconnect_emits_instance_lost() {
        let (a, a_obs) = controller(instance(1));
        let (b, _b_obs) = controller(instance(2));
        a.start();
        b.start();

        let a_transport = LoopbackTransport::new("a");
        let b_transport = LoopbackTransport::new("b");
        LoopbackTransport::connect(&a_transport, &b_transport);
        let device_b = Device::new("b");
        a.device_connected(device_b.clone(), b_transport.clone()).await;
        b.device_connected(Device::new("a"), a_transport.clone()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*a_obs.found.lock().unwrap(), vec![instance(2)]);

        a.device_disconnected(&device_b).await;
        assert_eq!(*a_obs.lost.lock().unwrap(), vec![instance(2)]);
    }
}
