use std::sync::atomic::{AtomicU32, Ordering};

/// Default modulus for sequence wraparound, per the wire contract.
pub const DEFAULT_MODULUS: u32 = 1 << 16;

/// Per-host monotonic counter modulo a configured maximum.
///
/// `next()` returns the counter's value *before* incrementing — the first
/// call returns 0 — preserved for wire compatibility with the original
/// sequence generator this protocol was distilled from.
pub struct SequenceGen {
    counter: AtomicU32,
    modulus: u32,
}

impl SequenceGen {
    pub fn new(modulus: u32) -> Self {
        assert!(modulus > 0, "sequence modulus must be nonzero");
        Self {
            counter: AtomicU32::new(0),
            modulus,
        }
    }

    pub fn next(&self) -> u32 {
        let modulus = self.modulus;
        self.counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some((v + 1) % modulus)
            })
            .expect("update closure always returns Some")
    }
}

impl Default for SequenceGen {
    fn default() -> Self {
        Self::new(DEFAULT_MODULUS)
    }
}
