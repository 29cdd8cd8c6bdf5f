//! Bounded Event Buffer Implementation

use crate::{CentroidEvent, EventSink};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Default buffer capacity (100k events, about one badly saturated frame)
pub const DEFAULT_CAPACITY: usize = 100_000;

/// State guarded by the buffer mutex
#[derive(Debug)]
struct Pending {
    /// Pre-allocated FIFO storage, never grows past capacity
    events: Vec<CentroidEvent>,
    /// Set once the producer has finished
    closed: bool,
}

/// Result of a waiting drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// This many events were appended to the output
    Events(usize),
    /// Nothing arrived before the timeout
    TimedOut,
    /// The producer closed the buffer and nothing is left
    Closed,
}

/// Lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub pushed: usize,
    pub dropped: usize,
    pub drained: usize,
}

/// Fixed-capacity, mutex-protected collection of pending centroids
pub struct SharedEventBuffer {
    pending: Mutex<Pending>,
    /// Signalled when a push burst adds events or the buffer closes
    available: Condvar,
    capacity: usize,
    total_pushed: AtomicUsize,
    total_dropped: AtomicUsize,
    total_drained: AtomicUsize,
}

impl SharedEventBuffer {
    /// Create a new buffer with given capacity
    pub fn new(capacity: usize) -> Self {
        debug!("Allocating event buffer for {} events", capacity);
        Self {
            pending: Mutex::new(Pending {
                events: Vec::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
            total_pushed: AtomicUsize::new(0),
            total_dropped: AtomicUsize::new(0),
            total_drained: AtomicUsize::new(0),
        }
    }

    /// Create a buffer with default capacity (100k events)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    // Pending holds plain data, so a panicked holder cannot leave it torn.
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold the lock for a whole frame's worth of pushes
    pub fn lock_burst(&self) -> PushBurst<'_> {
        PushBurst {
            buffer: self,
            pending: self.lock(),
            pushed: 0,
            dropped: 0,
        }
    }

    /// Push a single event; `false` if the buffer is full or closed
    pub fn push(&self, event: CentroidEvent) -> bool {
        self.lock_burst().push(event)
    }

    fn take(&self, pending: &mut Pending, out: &mut Vec<CentroidEvent>) -> usize {
        let count = pending.events.len();
        out.extend(pending.events.drain(..));
        self.total_drained.fetch_add(count, Ordering::Relaxed);
        count
    }

    /// Move every pending event into `out` in push order; never blocks on empty
    pub fn drain_into(&self, out: &mut Vec<CentroidEvent>) -> usize {
        let mut pending = self.lock();
        self.take(&mut pending, out)
    }

    /// Move every pending event out in push order; empty if nothing is pending
    pub fn drain_all(&self) -> Vec<CentroidEvent> {
        let mut out = Vec::new();
        self.drain_into(&mut out);
        out
    }

    /// Wait up to `timeout` for at least one event (or close), then drain
    pub fn wait_drain_into(&self, out: &mut Vec<CentroidEvent>, timeout: Duration) -> Drain {
        let pending = self.lock();
        let (mut pending, _) = self
            .available
            .wait_timeout_while(pending, timeout, |p| p.events.is_empty() && !p.closed)
            .unwrap_or_else(PoisonError::into_inner);

        if !pending.events.is_empty() {
            Drain::Events(self.take(&mut pending, out))
        } else if pending.closed {
            Drain::Closed
        } else {
            Drain::TimedOut
        }
    }

    /// Mark the end of production; pending events stay drainable
    pub fn close(&self) {
        let mut pending = self.lock();
        pending.closed = true;
        drop(pending);
        self.available.notify_all();
        debug!("Event buffer closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            pushed: self.total_pushed.load(Ordering::Relaxed),
            dropped: self.total_dropped.load(Ordering::Relaxed),
            drained: self.total_drained.load(Ordering::Relaxed),
        }
    }
}

/// Lock held across many pushes; consumers are woken when it is dropped
pub struct PushBurst<'a> {
    buffer: &'a SharedEventBuffer,
    pending: MutexGuard<'a, Pending>,
    pushed: usize,
    dropped: usize,
}

impl PushBurst<'_> {
    /// Append if there is room; `false` means the event was dropped
    pub fn push(&mut self, event: CentroidEvent) -> bool {
        if self.pending.closed || self.pending.events.len() >= self.buffer.capacity {
            self.dropped += 1;
            return false;
        }
        self.pending.events.push(event);
        self.pushed += 1;
        true
    }

    /// Free slots left
    pub fn remaining(&self) -> usize {
        self.buffer.capacity.saturating_sub(self.pending.events.len())
    }

    /// Events accepted during this burst
    pub fn pushed(&self) -> usize {
        self.pushed
    }

    /// Events refused during this burst
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl EventSink for PushBurst<'_> {
    fn offer(&mut self, event: CentroidEvent) -> bool {
        self.push(event)
    }
}

impl Drop for PushBurst<'_> {
    fn drop(&mut self) {
        self.buffer
            .total_pushed
            .fetch_add(self.pushed, Ordering::Relaxed);
        self.buffer
            .total_dropped
            .fetch_add(self.dropped, Ordering::Relaxed);
        if self.pushed > 0 {
            self.buffer.available.notify_all();
        }
    }
}
