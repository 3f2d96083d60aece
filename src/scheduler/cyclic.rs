//! Periodic release of cyclic frames: period, start offset and skip-N.
use alloc::vec::Vec;
use embassy_time::{Duration, Instant};

use crate::protocol::transport::bus_frame::FrameKey;

/// One cyclic frame of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclicEntry {
    /// Position of the frame in the session frame list.
    pub slot: usize,
    pub key: FrameKey,
    pub period: Duration,
    /// Phase of the first release relative to the session start.
    pub offset: Duration,
    next: Instant,
    skip: u32,
}

/// A release decided by the cyclic schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclicRelease {
    pub slot: usize,
    /// Nominal release time of the cycle.
    pub at: Instant,
    /// `false` for cycles suppressed by skip-N.
    pub transmit: bool,
}

/// Release times of every cyclic frame of a session.
#[derive(Debug, Clone, Default)]
pub struct CyclicSchedule {
    entries: Vec<CyclicEntry>,
}

impl CyclicSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a frame. Zero periods are not cyclic and are ignored.
    pub fn add(&mut self, slot: usize, key: FrameKey, period: Duration, offset: Duration) {
        if period.as_ticks() == 0 {
            return;
        }
        self.entries.push(CyclicEntry {
            slot,
            key,
            period,
            offset,
            next: Instant::from_ticks(0),
            skip: 0,
        });
    }

    pub fn entries(&self) -> &[CyclicEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Anchor every entry at `now + offset`.
    pub fn start(&mut self, now: Instant) {
        for entry in &mut self.entries {
            entry.next = now + entry.offset;
        }
    }

    /// Suppress the next `count` cycles of every entry. The schedule keeps
    /// running so phases are preserved.
    pub fn skip_next(&mut self, count: u32) {
        for entry in &mut self.entries {
            entry.skip = count;
        }
    }

    /// Cycles still to be skipped by the entry of `slot`.
    pub fn skip_remaining(&self, slot: usize) -> Option<u32> {
        self.entries.iter().find(|e| e.slot == slot).map(|e| e.skip)
    }

    /// Earliest pending release.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.next).min()
    }

    /// Releases due at `now`, at most one per entry.
    ///
    /// Cycles missed by a late poll are dropped and the entry is realigned
    /// on its original phase.
    pub fn poll(&mut self, now: Instant) -> Vec<CyclicRelease> {
        let mut releases = Vec::new();
        for entry in &mut self.entries {
            if entry.next > now {
                continue;
            }
            let transmit = entry.skip == 0;
            if !transmit {
                entry.skip -= 1;
            }
            releases.push(CyclicRelease {
                slot: entry.slot,
                at: entry.next,
                transmit,
            });
            while entry.next <= now {
                entry.next += entry.period;
            }
        }
        releases
    }
}

/// Whether two periodic streams ever release in the same instant.
///
/// Releases of `(p1, o1)` and `(p2, o2)` coincide iff `o1 ≡ o2` modulo
/// `gcd(p1, p2)`.
pub fn phases_overlap(p1: Duration, o1: Duration, p2: Duration, o2: Duration) -> bool {
    let (p1, p2) = (p1.as_ticks(), p2.as_ticks());
    if p1 == 0 || p2 == 0 {
        return false;
    }
    let g = gcd(p1, p2);
    o1.as_ticks() % g == o2.as_ticks() % g
}

pub(crate) const fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}
