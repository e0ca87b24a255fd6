//! Growable byte buffer holding the trailing incomplete line of a file.
//!
//! One carry buffer exists per tracked file. It is the only allocation that
//! crosses chunk boundaries: the scanner stashes whatever follows the last
//! newline of a chunk here and prepends it to the next chunk.

/// Starting capacity for the first non-empty append.
const INITIAL_CAPACITY: usize = 64;

/// Byte buffer with amortised-doubling growth and explicit release.
///
/// `len` counts valid bytes and never the allocation. `clear` keeps the
/// backing array for reuse; `release` drops it entirely.
#[derive(Debug, Default)]
pub struct CarryBuffer {
    buf: Vec<u8>,
}

impl CarryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of valid bytes held.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Allocated capacity. Always >= `len`.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Appends `bytes`, doubling capacity until it covers the requirement.
    /// An empty append is a no-op and does not allocate.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let required = self.buf.len() + bytes.len();
        if required > self.buf.capacity() {
            let mut cap = self.buf.capacity().max(INITIAL_CAPACITY);
            while cap < required {
                cap *= 2;
            }
            self.buf.reserve_exact(cap - self.buf.len());
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Discards the first `consumed` bytes, moving the remainder to the
    /// front. Capacity is retained.
    pub fn discard_front(&mut self, consumed: usize) {
        debug_assert!(consumed <= self.buf.len());
        if consumed == 0 {
            return;
        }
        let len = self.buf.len();
        self.buf.copy_within(consumed..len, 0);
        self.buf.truncate(len - consumed);
    }

    /// Zeroes the length, keeping the backing array.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Zeroes the length and drops the backing array. Called when a file's
    /// state is finalised so a deleted path does not pin memory.
    pub fn release(&mut self) {
        self.buf = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_append_is_noop() {
        let mut carry = CarryBuffer::new();
        carry.append(b"");
        assert_eq!(carry.len(), 0);
        assert_eq!(carry.capacity(), 0);
    }

    #[test]
    fn test_append_grows_by_doubling() {
        let mut carry = CarryBuffer::new();
        carry.append(b"ab");
        assert_eq!(carry.capacity(), INITIAL_CAPACITY);

        carry.append(&[b'x'; 100]);
        assert_eq!(carry.len(), 102);
        // 64 -> 128 covers the requirement.
        assert_eq!(carry.capacity(), 128);

        carry.append(&[b'y'; 1000]);
        assert_eq!(carry.len(), 1102);
        // 128 doubles until >= 1102.
        assert_eq!(carry.capacity(), 2048);
    }

    #[test]
    fn test_clear_retains_capacity() {
        let mut carry = CarryBuffer::new();
        carry.append(&[0u8; 500]);
        let cap = carry.capacity();
        carry.clear();
        assert_eq!(carry.len(), 0);
        assert_eq!(carry.capacity(), cap);
    }

    #[test]
    fn test_release_drops_allocation() {
        let mut carry = CarryBuffer::new();
        carry.append(&[0u8; 500]);
        carry.release();
        assert_eq!(carry.len(), 0);
        assert_eq!(carry.capacity(), 0);
    }

    #[test]
    fn test_discard_front_keeps_tail() {
        let mut carry = CarryBuffer::new();
        carry.append(b"hello\nworld");
        carry.discard_front(6);
        assert_eq!(carry.as_slice(), b"world");

        carry.discard_front(5);
        assert!(carry.is_empty());
    }
}
