//! Fixed-capacity ring buffer of slot expiry timestamps.

use crate::error::QueueFull;

/// Stable reference to an enqueued slot.
///
/// Tickets are sequence numbers handed out in enqueue order. Since the queue is FIFO, a ticket
/// maps to logical offset `ticket - head_sequence` for as long as its slot is still queued,
/// which lets the holder rewrite that slot in place without aliasing the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

/// Circular buffer of expiry timestamps (milliseconds).
///
/// Invariants: `len() <= capacity()`; the entry at logical offset `i` lives in physical slot
/// `(start + i) % capacity`.
///
/// ```rust
/// use outbound::rate_limit::AdmissionQueue;
///
/// let mut queue = AdmissionQueue::new(2);
/// queue.enqueue(10).unwrap();
/// queue.enqueue(20).unwrap();
/// assert!(queue.enqueue(30).is_err());
/// assert_eq!(queue.dequeue(), Some(10));
/// assert_eq!(queue.peek_at(0), Some(20));
/// ```
#[derive(Debug, Clone)]
pub struct AdmissionQueue {
    slots: Box<[Option<u64>]>,
    start: usize,
    count: usize,
    head_sequence: u64,
}

impl AdmissionQueue {
    /// Create an empty queue. A zero-capacity queue is permanently full.
    pub fn new(capacity: usize) -> Self {
        Self { slots: vec![None; capacity].into_boxed_slice(), start: 0, count: 0, head_sequence: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Occupied slots.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.slots.len()
    }

    /// Store `expires_at` in the tail slot.
    pub fn enqueue(&mut self, expires_at: u64) -> Result<Ticket, QueueFull> {
        if self.is_full() {
            return Err(QueueFull { capacity: self.capacity() });
        }
        let index = self.physical(self.count);
        self.slots[index] = Some(expires_at);
        let ticket = Ticket(self.head_sequence + self.count as u64);
        self.count += 1;
        Ok(ticket)
    }

    /// Remove and return the head entry.
    pub fn dequeue(&mut self) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        let item = self.slots[self.start].take();
        self.start = (self.start + 1) % self.slots.len();
        self.count -= 1;
        self.head_sequence += 1;
        item
    }

    /// Entry at logical `offset` from the head, without removing it.
    pub fn peek_at(&self, offset: usize) -> Option<u64> {
        if offset >= self.count {
            return None;
        }
        self.slots[self.physical(offset)]
    }

    /// Overwrite the slot behind `ticket`.
    ///
    /// Returns `false` if the slot has already been dequeued.
    pub fn update(&mut self, ticket: Ticket, expires_at: u64) -> bool {
        let offset = match ticket.0.checked_sub(self.head_sequence) {
            Some(offset) if offset < self.count as u64 => offset as usize,
            _ => return false,
        };
        let index = self.physical(offset);
        self.slots[index] = Some(expires_at);
        true
    }

    /// Entries from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.count).filter_map(move |offset| self.peek_at(offset))
    }

    fn physical(&self, offset: usize) -> usize {
        (self.start + offset) % self.slots.len()
    }
}
