use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use mesh_codec::{Codec, DecodeOutcome, Packet};
use mesh_routing::Device;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::stream_buffer::StreamBuffer;
use crate::transport::{DeviceTransport, TransportError};

/// A queued outbound packet with lazily-resolved next hop. The hop is
/// re-resolved at dequeue time, not at enqueue time, since the route may
/// have changed by then.
pub struct IoPacket {
    packet: Packet,
    next_hop_fn: Box<dyn Fn() -> Option<Device> + Send + Sync>,
}

impl IoPacket {
    pub fn new(packet: Packet, next_hop_fn: impl Fn() -> Option<Device> + Send + Sync + 'static) -> Self {
        Self {
            packet,
            next_hop_fn: Box::new(next_hop_fn),
        }
    }

    pub fn next_hop(&self) -> Option<Device> {
        (self.next_hop_fn)()
    }
}

/// Notified of events the dequeue/receive loops observe. Kept free of any
/// lock the controller itself holds — implementations are called with no
/// controller-internal mutex held.
pub trait IoDelegate: Send + Sync {
    fn packet_received(&self, device: &Device, packet: Packet);
    fn packet_written(&self, packet: &Packet);
    fn write_failed(&self, packet: &Packet, error: TransportError);
}

struct QueueState {
    queue: VecDeque<IoPacket>,
    in_flight: bool,
}

/// Owns the single FIFO outbound queue (stop-and-wait: exactly one write in
/// flight at a time) and the per-input-stream receive buffers for every
/// registered device.
pub struct IoController {
    state: AsyncMutex<QueueState>,
    dequeue_signal: Notify,
    transports: AsyncMutex<HashMap<Device, Arc<dyn DeviceTransport>>>,
    delegate: Arc<dyn IoDelegate>,
    cancel: CancellationToken,
}

impl IoController {
    pub fn new(delegate: Arc<dyn IoDelegate>) -> Arc<Self> {
        Arc::new(Self {
            state: AsyncMutex::new(QueueState {
                queue: VecDeque::new(),
                in_flight: false,
            }),
            dequeue_signal: Notify::new(),
            transports: AsyncMutex::new(HashMap::new()),
            delegate,
            cancel: CancellationToken::new(),
        })
    }

    /// Non-blocking: append to the tail of the outbound queue and wake the
    /// dequeue loop.
    pub async fn enqueue(&self, packet: IoPacket) {
        self.state.lock().await.queue.push_back(packet);
        self.dequeue_signal.notify_one();
    }

    /// Registers a device's transport and spawns its receive/invalidation
    /// task. Call once per newly opened stream.
    pub async fn register_transport(self: &Arc<Self>, device: Device, transport: Arc<dyn DeviceTransport>) {
        self.transports
            .lock()
            .await
            .insert(device.clone(), Arc::clone(&transport));
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.receive_loop(device, transport).await;
        });
    }

    pub async fn unregister_transport(&self, device: &Device) {
        self.transports.lock().await.remove(device);
        self.handle_stream_invalidated(device).await;
    }

    /// Spawns the single global dequeue loop. Idempotent to call once.
    pub fn spawn_dequeue_loop(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.dequeue_loop().await;
        });
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn dequeue_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = self.dequeue_signal.notified() => {}
            }
            self.drain_queue().await;
        }
    }

    async fn drain_queue(self: &Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let next = {
                let mut state = self.state.lock().await;
                if state.in_flight {
                    return;
                }
                match state.queue.pop_front() {
                    None => return,
                    Some(pkt) => {
                        state.in_flight = true;
                        pkt
                    }
                }
            };

            let Some(device) = next.next_hop() else {
                self.delegate
                    .write_failed(&next.packet, TransportError::StreamNotOpen);
                self.clear_in_flight().await;
                continue;
            };

            let transport = self.transports.lock().await.get(&device).cloned();
            let Some(transport) = transport else {
                self.delegate
                    .write_failed(&next.packet, TransportError::StreamNotOpen);
                self.clear_in_flight().await;
                continue;
            };

            let bytes = Codec::encode(&next.packet);
            // Register interest before writing: `write` may signal
            // completion synchronously (as `LoopbackTransport` does), and
            // `Notify::notify_waiters` stores no permit for a waiter that
            // subscribes afterward — that ordering would park this await
            // forever.
            let done = transport.written_notify().notified();
            if let Err(err) = transport.write(bytes) {
                self.delegate.write_failed(&next.packet, err);
                self.clear_in_flight().await;
                continue;
            }

            done.await;
            match transport.take_write_result() {
                Some(Ok(())) => self.delegate.packet_written(&next.packet),
                Some(Err(err)) => self.delegate.write_failed(&next.packet, err),
                None => self
                    .delegate
                    .write_failed(&next.packet, TransportError::Unknown("no write result".into())),
            }
            self.clear_in_flight().await;
        }
    }

    async fn clear_in_flight(&self) {
        self.state.lock().await.in_flight = false;
        self.dequeue_signal.notify_one();
    }

    /// On stream failure: drop every queued packet targeting that device (or
    /// unresolvable ones), reporting each as a write failure so callers don't
    /// see it simply vanish. An in-flight write targeting the failed device
    /// resolves on its own through the normal write-failure path once the
    /// transport reports it.
    pub async fn handle_stream_invalidated(&self, device: &Device) {
        let mut state = self.state.lock().await;
        let (keep, drop_packets): (Vec<IoPacket>, Vec<IoPacket>) =
            state.queue.drain(..).partition(|pkt| match pkt.next_hop() {
                Some(d) => &d != device,
                None => false,
            });
        state.queue = keep.into();
        drop(state);
        for pkt in &drop_packets {
            self.delegate.write_failed(&pkt.packet, TransportError::StreamNotOpen);
        }
        self.dequeue_signal.notify_one();
    }

    async fn receive_loop(self: Arc<Self>, device: Device, transport: Arc<dyn DeviceTransport>) {
        let mut buffer = StreamBuffer::default();
        let codec = Codec::default();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = transport.invalidated_notify().notified() => {
                    self.handle_stream_invalidated(&device).await;
                    return;
                }
                _ = transport.inbound_notify().notified() => {}
            }

            let bytes = transport.drain_inbound();
            if buffer.append(&bytes).is_err() {
                log::warn!("stream {} exceeded buffer cap, closing", device.id());
                self.handle_stream_invalidated(&device).await;
                return;
            }

            loop {
                match codec.decode(buffer.peek()) {
                    DecodeOutcome::NeedMoreData | DecodeOutcome::UnknownType => break,
                    DecodeOutcome::Malformed(consumed) => {
                        log::warn!("protocol violation from {}: malformed packet", device.id());
                        buffer.trim(consumed);
                    }
                    DecodeOutcome::Decoded(packet, consumed) => {
                        buffer.trim(consumed);
                        self.delegate.packet_received(&device, packet);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;
    use mesh_codec::Instance;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingDelegate {
        received: Mutex<Vec<(Device, Packet)>>,
        written: Mutex<Vec<Packet>>,
        failed: Mutex<Vec<(Packet, TransportError)>>,
    }

    impl IoDelegate for RecordingDelegate {
        fn packet_received(&self, device: &Device, packet: Packet) {
            self.received.lock().unwrap().push((device.clone(), packet));
        }
        fn packet_written(&self, packet: &Packet) {
            self.written.lock().unwrap().push(packet.clone());
        }
        fn write_failed(&self, packet: &Packet, error: TransportError) {
            self.failed.lock().unwrap().push((packet.clone(), error));
        }
    }

    fn handshake(seq: u32, b: u8) -> Packet {
        Packet::Handshake {
            sequence: seq,
            instance: Instance::new([b; 16]),
        }
    }

    #[tokio::test]
    async fn single_packet_is_written_and_received() {
        let a_delegate = Arc::new(RecordingDelegate::default());
        let b_delegate = Arc::new(RecordingDelegate::default());
        let a_controller = IoController::new(a_delegate.clone());
        let b_controller = IoController::new(b_delegate.clone());
        a_controller.spawn_dequeue_loop();
        b_controller.spawn_dequeue_loop();

        let a_transport = LoopbackTransport::new("a");
        let b_transport = LoopbackTransport::new("b");
        LoopbackTransport::connect(&a_transport, &b_transport);

        let device_b = Device::new("b");
        a_controller.register_transport(device_b.clone(), b_transport.clone()).await;
        b_controller.register_transport(Device::new("a"), a_transport.clone()).await;

        a_controller
            .enqueue(IoPacket::new(handshake(0, 1), move || Some(device_b.clone())))
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(a_delegate.written.lock().unwrap().len(), 1);
        assert_eq!(b_delegate.received.lock().unwrap().len(), 1);
    }

    /// A second write must not get stuck behind the first: the dequeue loop
    /// has to keep draining after a write completes synchronously.
    #[tokio::test]
    async fn queue_keeps_draining_across_multiple_writes() {
        let a_delegate = Arc::new(RecordingDelegate::default());
        let b_delegate = Arc::new(RecordingDelegate::default());
        let a_controller = IoController::new(a_delegate.clone());
        let b_controller = IoController::new(b_delegate.clone());
        a_controller.spawn_dequeue_loop();
        b_controller.spawn_dequeue_loop();

        let a_transport = LoopbackTransport::new("a");
        let b_transport = LoopbackTransport::new("b");
        LoopbackTransport::connect(&a_transport, &b_transport);

        let device_b = Device::new("b");
        a_controller.register_transport(device_b.clone(), b_transport.clone()).await;
        b_controller.register_transport(Device::new("a"), a_transport.clone()).await;

        for seq in 0..3u32 {
            let device_b = device_b.clone();
            a_controller
                .enqueue(IoPacket::new(handshake(seq, 1), move || Some(device_b.clone())))
                .await;
        }

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(a_delegate.written.lock().unwrap().len(), 3);
        assert_eq!(b_delegate.received.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unresolved_next_hop_fails_immediately() {
        let delegate = Arc::new(RecordingDelegate::default());
        let controller = IoController::new(delegate.clone());
        controller.spawn_dequeue_loop();

        controller
            .enqueue(IoPacket::new(handshake(0, 1), || None))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(delegate.failed.lock().unwrap().len(), 1);
        assert!(delegate.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalidated_stream_drops_queued_packets() {
        let delegate = Arc::new(RecordingDelegate::default());
        let controller = IoController::new(delegate.clone());
        // Do not spawn the dequeue loop: we want the queue to stay populated
        // so we can observe invalidation purging it deterministically.
        let device = Device::new("gone");
        for seq in 0..3u32 {
            let device = device.clone();
            controller
                .enqueue(IoPacket::new(handshake(seq, 1), move || Some(device.clone())))
                .await;
        }
        controller.handle_stream_invalidated(&device).await;
        let remaining = controller.state.lock().await.queue.len();
        assert_eq!(remaining, 0);
        assert_eq!(delegate.failed.lock().unwrap().len(), 3);
    }
}
