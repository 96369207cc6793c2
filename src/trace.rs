// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-character debug trace.
//!
//! The engines narrate what they do one byte at a time (`S` for a SETUP,
//! `I` for an IN and so on). The bytes go to a [`Trace`] sink, which on real
//! hardware is a [`TraceRing`] drained by a UART transmit interrupt.

use crate::config::TRACE_OVERFLOW_MARKER;

/// Somewhere to put trace characters. Must never block.
pub trait Trace {
    fn debug_write(&mut self, byte: u8);

    fn debug_str(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.debug_write(b);
        }
    }

    /// Writes the two-character form used for small numbers: `'0'` plus
    /// the high nibble, then `'0'` plus the low one. Nibbles above 9 come
    /// out as `:;<=>?`.
    fn debug_nibbles(&mut self, value: u8) {
        self.debug_write(b'0' + (value >> 4));
        self.debug_write(b'0' + (value & 0x0F));
    }
}

/// Tracing turned off.
impl Trace for () {
    fn debug_write(&mut self, _byte: u8) {}
}

/// Circular byte buffer feeding a transmitter one byte at a time.
///
/// One slot is always left empty, so a ring of `N` holds `N - 1` bytes. The
/// byte at `tail` is the one currently on the wire. When the ring is full,
/// new bytes are lost and the newest queued byte is overwritten with `X` so
/// whoever reads the trace can tell.
#[derive(Debug)]
pub struct TraceRing<const N: usize> {
    buf: [u8; N],
    /// Next free slot.
    head: usize,
    /// Byte being transmitted.
    tail: usize,
}

impl<const N: usize> TraceRing<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            head: 0,
            tail: 0,
        }
    }

    /// Queues `byte`. Returns it back if the ring was empty, in which case
    /// the caller has to start the transmitter with it.
    pub fn write(&mut self, byte: u8) -> Option<u8> {
        let next = (self.head + 1) % N;
        if next == self.tail {
            let newest = (self.head + N - 1) % N;
            self.buf[newest] = TRACE_OVERFLOW_MARKER;
            return None;
        }
        let was_empty = self.head == self.tail;
        self.buf[self.head] = byte;
        self.head = next;
        was_empty.then_some(byte)
    }

    /// The byte at `tail` has gone out. Returns the next one to send, if
    /// any.
    pub fn tx_complete(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        self.tail = (self.tail + 1) % N;
        if self.is_empty() {
            None
        } else {
            Some(self.buf[self.tail])
        }
    }

    /// Bytes queued, including the one in flight.
    pub fn len(&self) -> usize {
        (self.head + N - self.tail) % N
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }
}

impl<const N: usize> Default for TraceRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_byte_kicks_the_transmitter() {
        let mut ring = TraceRing::<8>::new();
        assert_eq!(ring.write(b'S'), Some(b'S'));
        assert_eq!(ring.write(b'D'), None);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.tx_complete(), Some(b'D'));
        assert_eq!(ring.tx_complete(), None);
        assert!(ring.is_empty());
        // Empty again, so the next byte kicks once more.
        assert_eq!(ring.write(b'I'), Some(b'I'));
    }

    #[test]
    fn overflow_marks_newest_byte() {
        let mut ring = TraceRing::<4>::new();
        ring.write(b'a');
        ring.write(b'b');
        ring.write(b'c');
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.write(b'd'), None);
        assert_eq!(ring.len(), 3);

        let mut out = vec![];
        while let Some(b) = ring.tx_complete() {
            out.push(b);
        }
        // 'a' was already on the wire; 'c' became the marker.
        assert_eq!(out, b"bX");
    }

    #[test]
    fn tx_complete_on_empty_ring_is_harmless() {
        let mut ring = TraceRing::<4>::new();
        assert_eq!(ring.tx_complete(), None);
        assert_eq!(ring.write(b'x'), Some(b'x'));
    }

    #[test]
    fn nibbles_are_offset_from_zero() {
        struct Rec(Vec<u8>);
        impl Trace for Rec {
            fn debug_write(&mut self, b: u8) {
                self.0.push(b);
            }
        }
        let mut r = Rec(vec![]);
        r.debug_nibbles(0x12);
        r.debug_nibbles(0x4A);
        assert_eq!(r.0, b"124:");
    }
}
