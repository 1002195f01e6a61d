use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;

/// Transport-level failures, distinct from the protocol-level error
/// taxonomy surfaced by `mesh-core` (those are classified from these).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("stream is not open")]
    StreamNotOpen,
    #[error("stream was invalidated mid-write")]
    Invalidated,
    #[error("unclassified transport failure: {0}")]
    Unknown(String),
}

/// One direct, bidirectional, reliable byte channel to a peer device.
///
/// This is the abstract seam between the bridge core and a real radio
/// adapter: discovery, connect, and MTU negotiation all happen upstream of
/// this trait. Every suspension point is a `Notify`, matching the
/// signal-driven (never busy-waiting) suspension model the bridge requires.
pub trait DeviceTransport: Send + Sync {
    fn device_id(&self) -> &str;

    /// Hand bytes to the transport for writing. Non-blocking: completion is
    /// reported asynchronously through `written_notify` + `take_write_result`.
    fn write(&self, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Fires once after each write attempt completes (successfully or not).
    fn written_notify(&self) -> &Notify;

    /// Consumes the result of the most recently completed write, if any.
    fn take_write_result(&self) -> Option<Result<(), TransportError>>;

    /// Fires whenever new inbound bytes are available to drain.
    fn inbound_notify(&self) -> &Notify;

    /// Drains and returns all inbound bytes accumulated since the last call.
    fn drain_inbound(&self) -> Vec<u8>;

    /// Fires exactly once when the stream becomes unusable.
    fn invalidated_notify(&self) -> &Notify;
}

/// An in-process `DeviceTransport` used for tests and the CLI demo in place
/// of a real radio. Two instances are wired together with
/// [`LoopbackTransport::connect`] so that writes on one surface as inbound
/// bytes on the other.
pub struct LoopbackTransport {
    device_id: String,
    inbound: Mutex<VecDeque<u8>>,
    last_write_result: Mutex<Option<Result<(), TransportError>>>,
    invalidated: Mutex<bool>,
    peer: Mutex<Option<Weak<LoopbackTransport>>>,
    written: Notify,
    inbound_available: Notify,
    invalidated_notify: Notify,
}

impl LoopbackTransport {
    pub fn new(device_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            device_id: device_id.into(),
            inbound: Mutex::new(VecDeque::new()),
            last_write_result: Mutex::new(None),
            invalidated: Mutex::new(false),
            peer: Mutex::new(None),
            written: Notify::new(),
            inbound_available: Notify::new(),
            invalidated_notify: Notify::new(),
        })
    }

    /// Connects two loopback transports so each one's writes become the
    /// other's inbound bytes.
    pub fn connect(a: &Arc<LoopbackTransport>, b: &Arc<LoopbackTransport>) {
        *a.peer.lock().unwrap() = Some(Arc::downgrade(b));
        *b.peer.lock().unwrap() = Some(Arc::downgrade(a));
    }

    /// Simulate a radio disconnection: any in-flight write fails, inbound
    /// stops, and `invalidated_notify` fires once.
    pub fn invalidate(&self) {
        let mut flag = self.invalidated.lock().unwrap();
        if *flag {
            return;
        }
        *flag = true;
        drop(flag);
        *self.last_write_result.lock().unwrap() = Some(Err(TransportError::Invalidated));
        self.written.notify_waiters();
        self.invalidated_notify.notify_waiters();
    }

    fn is_invalidated(&self) -> bool {
        *self.invalidated.lock().unwrap()
    }
}

impl DeviceTransport for LoopbackTransport {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn write(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if self.is_invalidated() {
            return Err(TransportError::Invalidated);
        }
        let peer = self.peer.lock().unwrap().as_ref().and_then(Weak::upgrade);
        let result = match peer {
            Some(peer) if !peer.is_invalidated() => {
                peer.inbound.lock().unwrap().extend(bytes);
                peer.inbound_available.notify_waiters();
                Ok(())
            }
            Some(_) => Err(TransportError::Invalidated),
            None => Err(TransportError::StreamNotOpen),
        };
        *self.last_write_result.lock().unwrap() = Some(result.clone());
        self.written.notify_waiters();
        result
    }

    fn written_notify(&self) -> &Notify {
        &self.written
    }

    fn take_write_result(&self) -> Option<Result<(), TransportError>> {
        self.last_write_result.lock().unwrap().take()
    }

    fn inbound_notify(&self) -> &Notify {
        &self.inbound_available
    }

    fn drain_inbound(&self) -> Vec<u8> {
        self.inbound.lock().unwrap().drain(..).collect()
    }

    fn invalidated_notify(&self) -> &Notify {
        &self.invalidated_notify
    }
}
