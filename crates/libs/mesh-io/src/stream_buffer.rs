/// Default per-stream capacity: 16 x a conservative BLE-class MTU.
pub const DEFAULT_CAPACITY: usize = 16 * 247;

#[derive(Debug, thiserror::Error)]
#[error("stream buffer exceeded its {capacity}-byte cap")]
pub struct Overflow {
    pub capacity: usize,
}

/// Growable byte buffer accumulating bytes read off one input stream until
/// the codec can make a full packet out of the front of it.
///
/// Not internally synchronized: callers serialize access with their own
/// per-stream lock, exactly as `append` and the decode step that follows it
/// must run under the same critical section.
pub struct StreamBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl StreamBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<(), Overflow> {
        if self.data.len() + bytes.len() > self.capacity {
            return Err(Overflow {
                capacity: self.capacity,
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn peek(&self) -> &[u8] {
        &self.data
    }

    pub fn trim(&mut self, n: usize) {
        self.data.drain(..n);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_trim_leaves_remainder() {
        let mut buf = StreamBuffer::new(16);
        buf.append(b"hello").unwrap();
        buf.append(b"world").unwrap();
        assert_eq!(buf.peek(), b"helloworld");
        buf.trim(5);
        assert_eq!(buf.peek(), b"world");
    }

    #[test]
    fn append_past_capacity_overflows() {
        let mut buf = StreamBuffer::new(4);
        assert!(buf.append(b"hello").is_err());
    }

    #[test]
    fn trim_to_empty_then_append_again_works() {
        let mut buf = StreamBuffer::new(8);
        buf.append(b"abcd").unwrap();
        buf.trim(4);
        assert!(buf.is_empty());
        buf.append(b"efgh").unwrap();
        assert_eq!(buf.peek(), b"efgh");
    }
}
