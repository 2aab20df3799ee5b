//! The request buffer: a bounded ring of connection handles shared
//! between one or more producers and the worker pool (spec.md §4.1).
//!
//! This type holds no lock of its own — it is a plain data structure
//! manipulated only while [`crate::server::Server`] holds its single
//! global mutex, exactly as spec.md §5 describes. The two condition
//! variables that implement the blocking `submit`/`take` protocol live
//! on `Server`, not here.

/// A classic fixed-capacity ring buffer of connection handles.
///
/// `capacity == 0` is allowed (the degenerate `max_requests == 0`
/// configuration in spec.md §4.1); [`RingBuffer::is_full`] is then always
/// `true`, so nothing can ever be pushed — callers that still route
/// through this type with a zero-capacity buffer will block forever,
/// which is the expected (if unhelpful) outcome of that misconfiguration
/// rather than a case this type needs to special-case.
pub(crate) struct RingBuffer<C> {
    slots: Vec<Option<C>>,
    capacity: usize,
    head: usize,
    tail: usize,
    count: usize,
}

impl<C> RingBuffer<C> {
    pub(crate) fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        RingBuffer {
            slots,
            capacity,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    /// Pushes `fd` at the tail. Caller must have already checked
    /// `!is_full()` while holding the server's lock.
    pub(crate) fn push(&mut self, fd: C) {
        debug_assert!(!self.is_full());
        self.slots[self.tail] = Some(fd);
        self.tail = (self.tail + 1) % self.capacity;
        self.count += 1;
    }

    /// Pops the head element. Caller must have already checked
    /// `!is_empty()` while holding the server's lock.
    pub(crate) fn pop(&mut self) -> C {
        debug_assert!(!self.is_empty());
        let fd = self.slots[self.head]
            .take()
            .expect("ring buffer slot within [head, head+count) is always occupied");
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        fd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let mut buf = RingBuffer::new(4);
        buf.push(1);
        buf.push(2);
        buf.push(3);
        assert_eq!(buf.pop(), 1);
        buf.push(4);
        assert_eq!(buf.pop(), 2);
        assert_eq!(buf.pop(), 3);
        assert_eq!(buf.pop(), 4);
        assert!(buf.is_empty());
    }

    #[test]
    fn wraps_around_capacity() {
        let mut buf = RingBuffer::new(2);
        buf.push(1);
        assert_eq!(buf.pop(), 1);
        buf.push(2);
        buf.push(3);
        assert!(buf.is_full());
        assert_eq!(buf.pop(), 2);
        assert_eq!(buf.pop(), 3);
    }

    #[test]
    fn capacity_one_serializes_correctly() {
        let mut buf: RingBuffer<u32> = RingBuffer::new(1);
        assert!(buf.is_empty());
        buf.push(42);
        assert!(buf.is_full());
        assert_eq!(buf.pop(), 42);
        assert!(buf.is_empty());
    }
}
