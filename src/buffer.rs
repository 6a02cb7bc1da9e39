//! Fixed-capacity byte buffer for one direction of one connection.
//!
//! This is not a true ring: the reactor always re-compacts after a
//! partial consume, which is simpler and correct at the data rates this
//! runtime targets (one request in flight per connection at a time, per
//! the read-side back-pressure rule: a slot stops accepting new bytes
//! while it still owes a response). `fill` appends bytes received
//! from the socket; `consume` drops a prefix once the protocol engine
//! has parsed or sent it.

#[derive(Debug)]
pub(crate) struct Buffer {
    data: Vec<u8>,
    capacity: usize,
}

impl Buffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline(always)]
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the filled region, for the in-place percent-decode
    /// the request parser performs on the URI before handing it to a route.
    #[inline(always)]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline(always)]
    pub(crate) fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    #[inline(always)]
    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }

    /// Appends as many bytes from `src` as fit; returns the number
    /// consumed from `src` (may be 0 if the buffer is already full,
    /// which the caller treats as "stop reading this slot" back-pressure).
    pub(crate) fn fill(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.remaining_capacity());
        self.data.extend_from_slice(&src[..n]);
        n
    }

    /// Drops the first `n` bytes, shifting the remainder to the front.
    pub(crate) fn consume(&mut self, n: usize) {
        let n = n.min(self.data.len());
        self.data.drain(..n);
    }

    /// Appends owned bytes to the outbound direction (`Reactor::send`).
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_respects_capacity() {
        let mut buf = Buffer::with_capacity(4);
        assert_eq!(buf.fill(b"abcdef"), 4);
        assert_eq!(buf.as_slice(), b"abcd");
        assert_eq!(buf.fill(b"x"), 0);
    }

    #[test]
    fn consume_shifts_remainder() {
        let mut buf = Buffer::with_capacity(16);
        buf.fill(b"GET / HTTP/1.1\r\n\r\n");
        buf.consume(4);
        assert_eq!(&buf.as_slice()[..2], b" /");
    }
}
