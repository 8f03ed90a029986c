//! Lock-free single-producer single-consumer byte rings.
//!
//! The serial and remote-cmd streams cross the emulation/I-O thread boundary
//! through a pair of these.  One side only pushes and the other side only
//! pops; neither ever blocks.  Capacity is fixed at construction and rounded
//! up to a power of two so the wrapping counters can be masked into indices.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct RingBuffer {
    buf: Box<[UnsafeCell<u8>]>,
    mask: usize,
    /// Total bytes ever pushed.  Written by the producer only.
    tail: AtomicUsize,
    /// Total bytes ever popped.  Written by the consumer only.
    head: AtomicUsize,
}

// The atomics order all access to `buf`: the producer publishes slots with a
// release store of `tail`, the consumer releases them back with `head`.
unsafe impl Sync for RingBuffer {}
unsafe impl Send for RingBuffer {}

impl RingBuffer {
    /// Create a ring holding at least `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        Self {
            buf: (0..capacity).map(|_| UnsafeCell::new(0)).collect(),
            mask: capacity - 1,
            tail: AtomicUsize::new(0),
            head: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently queued.
    pub fn len(&self) -> usize {
        self.tail
            .load(Ordering::Acquire)
            .wrapping_sub(self.head.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push one byte.  Returns `false` (dropping the byte) when full; the
    /// streams carried here tolerate loss the way a real serial line does.
    pub fn push(&self, byte: u8) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= self.buf.len() {
            return false;
        }
        unsafe {
            *self.buf[tail & self.mask].get() = byte;
        }
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        true
    }

    /// Pop one byte, or `None` when empty.
    pub fn pop(&self) -> Option<u8> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let byte = unsafe { *self.buf[head & self.mask].get() };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(byte)
    }

    /// Push as much of `data` as fits; returns how many bytes made it in.
    pub fn push_slice(&self, data: &[u8]) -> usize {
        let mut pushed = 0;
        for &byte in data {
            if !self.push(byte) {
                break;
            }
            pushed += 1;
        }
        pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_push_pop() {
        let ring = RingBuffer::new(8);
        assert!(ring.is_empty());
        assert!(ring.push(0x41));
        assert!(ring.push(0x42));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.pop(), Some(0x41));
        assert_eq!(ring.pop(), Some(0x42));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_full_ring_drops() {
        let ring = RingBuffer::new(4);
        for byte in 0..4 {
            assert!(ring.push(byte));
        }
        assert!(!ring.push(99));
        assert_eq!(ring.pop(), Some(0));
        assert!(ring.push(99));
    }

    #[test]
    fn test_wraps_around() {
        let ring = RingBuffer::new(4);
        for round in 0u8..20 {
            assert!(ring.push(round));
            assert_eq!(ring.pop(), Some(round));
        }
    }

    #[test]
    fn test_cross_thread_stream() {
        let ring = Arc::new(RingBuffer::new(64));
        let producer = Arc::clone(&ring);
        let handle = std::thread::spawn(move || {
            for byte in 0u8..=255 {
                while !producer.push(byte) {
                    std::thread::yield_now();
                }
            }
        });

        let mut got = Vec::new();
        while got.len() < 256 {
            if let Some(byte) = ring.pop() {
                got.push(byte);
            } else {
                std::thread::yield_now();
            }
        }
        handle.join().unwrap();
        let expect: Vec<u8> = (0u8..=255).collect();
        assert_eq!(got, expect);
    }
}
