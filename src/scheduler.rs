use core::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::{clock::Timestamp, sequence::SequenceGenerator};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

struct Scheduled<E> {
    at: Timestamp,
    id: EventId,
    event: E,
}

// Ordered by time, then by insertion so events at the same time run first in, first out
impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.id.cmp(&other.id))
    }
}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> Eq for Scheduled<E> {}

/// A discrete-event queue.
pub struct Scheduler<E> {
    queue: BinaryHeap<Reverse<Scheduled<E>>>,
    ids: SequenceGenerator,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            ids: SequenceGenerator::new(),
        }
    }

    pub fn schedule(&mut self, at: Timestamp, event: E) -> EventId {
        let id = EventId(self.ids.next());
        self.queue.push(Reverse(Scheduled { at, id, event }));
        id
    }

    pub fn next_time(&self) -> Option<Timestamp> {
        self.queue.peek().map(|Reverse(scheduled)| scheduled.at)
    }

    /// Takes the earliest event if it is due at `now`.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<(Timestamp, E)> {
        if self.next_time()? > now {
            return None;
        }
        self.queue
            .pop()
            .map(|Reverse(scheduled)| (scheduled.at, scheduled.event))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
