use core::sync::atomic::{AtomicU64, Ordering};

/// A reserved run of consecutive sequence numbers, `[start, start + count)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SequenceBlock {
    pub start: u64,
    pub count: u64,
}

impl SequenceBlock {
    pub fn end(&self) -> u64 {
        self.start.wrapping_add(self.count)
    }

    pub fn contains(&self, value: u64) -> bool {
        value.wrapping_sub(self.start) < self.count
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> {
        let start = self.start;
        (0..self.count).map(move |i| start.wrapping_add(i))
    }
}

/// Hands out non-overlapping blocks of sequence numbers.
///
/// The cursor is atomic, so a generator can be shared between threads, but
/// nothing guards against wrapping around after 2^64 numbers.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    next: AtomicU64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    pub fn next_block(&self, count: u64) -> SequenceBlock {
        let start = self.next.fetch_add(count, Ordering::Relaxed);
        SequenceBlock { start, count }
    }

    pub fn next(&self) -> u64 {
        self.next_block(1).start
    }

    /// The first number the next block will start at.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}
