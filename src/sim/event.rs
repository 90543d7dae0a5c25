//! The discrete event queue.
//!
//! Events are totally ordered by `(timestamp, sequence)`, where the sequence
//! number records arrival order into the queue. Two events scheduled for the
//! same simulated instant therefore fire in the order they were scheduled,
//! which keeps traces reproducible run to run.
//!
//! Every schedule call returns a [`TimerHandle`]; cancelling a handle marks
//! the entry dead and the pop loop skips it. Arming a replacement timer is
//! always "cancel the prior handle, then schedule".

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use crate::net::packet::Packet;
use crate::net::NodeId;
use crate::sim::AppId;
use crate::sim::time::SimTime;

/// Opaque identifier for a scheduled event, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// What happens when a scheduled event fires.
#[derive(Debug, Clone)]
pub(crate) enum EventKind {
    /// A packet arrives at a node after traversing a channel.
    Deliver { node: NodeId, packet: Packet },
    /// An application timer fires. The token is application-defined.
    Timer { app: AppId, token: u64 },
    /// An application starts.
    Start { app: AppId },
    /// An application stops.
    Stop { app: AppId },
}

#[derive(Debug)]
struct Scheduled {
    at: SimTime,
    seq: u64,
    id: u64,
    kind: EventKind,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// Min-heap of pending events plus the simulated clock.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    cancelled: HashSet<u64>,
    now: SimTime,
    next_seq: u64,
    next_id: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedules an event at an absolute simulated time.
    ///
    /// Times in the past are clamped to `now`; the event still fires after
    /// everything already queued for the current instant.
    pub(crate) fn schedule_at(&mut self, at: SimTime, kind: EventKind) -> TimerHandle {
        let at = at.max(self.now);
        let id = self.next_id;
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Scheduled { at, seq, id, kind }));
        TimerHandle(id)
    }

    /// Schedules an event after a relative delay.
    pub(crate) fn schedule_in(&mut self, delay: Duration, kind: EventKind) -> TimerHandle {
        self.schedule_at(self.now + delay, kind)
    }

    /// Cancels a previously scheduled event. Cancelling an event that has
    /// already fired is a no-op.
    pub fn cancel(&mut self, handle: TimerHandle) {
        self.cancelled.insert(handle.0);
    }

    /// Pops the next live event at or before `limit`, advancing the clock
    /// to its timestamp. Returns `None` when nothing is due.
    pub(crate) fn pop_due(&mut self, limit: Option<SimTime>) -> Option<(SimTime, EventKind)> {
        loop {
            let next_at = self.heap.peek()?.0.at;
            if let Some(limit) = limit
                && next_at > limit
            {
                return None;
            }
            let Reverse(event) = self.heap.pop()?;
            if self.cancelled.remove(&event.id) {
                continue;
            }
            self.now = event.at;
            return Some((event.at, event.kind));
        }
    }

    /// Forces the clock forward (used when a run window ends with events
    /// still pending beyond it).
    pub(crate) fn advance_to(&mut self, at: SimTime) {
        if at > self.now {
            self.now = at;
        }
    }

    /// Number of scheduled events, including cancelled ones not yet skipped.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
