//! FlexRay slot and cycle placement.
//!
//! The cluster repeats 64 numbered communication cycles. A frame occupies
//! its slot in every cycle whose counter matches its base cycle modulo its
//! repetition; inside a cycle the slot starts at a fixed offset given by
//! the cluster timing.
use alloc::vec::Vec;
use embassy_time::{Duration, Instant};

use super::cyclic::gcd;
use crate::core::FlexRayChannel;
use crate::database::{FlexRaySlot, FlexRayTiming};

/// Number of cycles after which the cycle counter wraps.
pub const CYCLE_COUNT: u64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexRayEntry {
    /// Position of the frame in the session frame list.
    pub slot_index: usize,
    pub slot: u16,
    pub placement: FlexRaySlot,
    /// Static-segment slot; dynamic slots only transmit fresh data.
    pub is_static: bool,
    next_cycle: u64,
}

impl FlexRayEntry {
    fn repetition(&self) -> u64 {
        self.placement.cycle_repetition.max(1) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexRayRelease {
    pub slot_index: usize,
    pub slot: u16,
    /// Cycle counter (0..=63) of the release.
    pub cycle: u8,
    pub channels: FlexRayChannel,
    pub is_static: bool,
    pub at: Instant,
}

/// Placement of a session's FlexRay frames on the cycle grid.
#[derive(Debug, Clone)]
pub struct FlexRayPlan {
    timing: FlexRayTiming,
    entries: Vec<FlexRayEntry>,
    start: Instant,
}

impl FlexRayPlan {
    pub fn new(timing: FlexRayTiming) -> Self {
        Self {
            timing,
            entries: Vec::new(),
            start: Instant::from_ticks(0),
        }
    }

    pub fn add(&mut self, slot_index: usize, slot: u16, placement: FlexRaySlot) {
        self.entries.push(FlexRayEntry {
            slot_index,
            slot,
            placement,
            is_static: self.timing.is_static(slot),
            next_cycle: 0,
        });
    }

    pub fn entries(&self) -> &[FlexRayEntry] {
        &self.entries
    }

    pub fn timing(&self) -> &FlexRayTiming {
        &self.timing
    }

    /// Cycle 0 starts at `now`.
    pub fn start(&mut self, now: Instant) {
        self.start = now;
        for entry in &mut self.entries {
            entry.next_cycle = entry.placement.base_cycle as u64 % entry.repetition();
        }
    }

    /// Start of `slot` in the absolute cycle `cycle` (counted from start).
    pub fn slot_start(&self, cycle: u64, slot: u16) -> Instant {
        slot_start(self.start, &self.timing, cycle, slot)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .iter()
            .map(|e| self.slot_start(e.next_cycle, e.slot))
            .min()
    }

    /// Slot occurrences due at `now`, at most one per frame.
    pub fn poll(&mut self, now: Instant) -> Vec<FlexRayRelease> {
        let (start, timing) = (self.start, self.timing);
        let mut releases = Vec::new();
        for entry in &mut self.entries {
            let at = slot_start(start, &timing, entry.next_cycle, entry.slot);
            if at > now {
                continue;
            }
            releases.push(FlexRayRelease {
                slot_index: entry.slot_index,
                slot: entry.slot,
                cycle: (entry.next_cycle % CYCLE_COUNT) as u8,
                channels: entry.placement.channels,
                is_static: entry.is_static,
                at,
            });
            let repetition = entry.repetition();
            entry.next_cycle += repetition;
            while timing.cycle_us > 0
                && slot_start(start, &timing, entry.next_cycle, entry.slot) <= now
            {
                entry.next_cycle += repetition;
            }
        }
        releases
    }

    /// First pair of frames sharing a slot, a channel and a cycle.
    pub fn conflict(&self) -> Option<(usize, usize)> {
        for (i, a) in self.entries.iter().enumerate() {
            for b in &self.entries[i + 1..] {
                if placements_collide(a.slot, &a.placement, b.slot, &b.placement) {
                    return Some((a.slot_index, b.slot_index));
                }
            }
        }
        None
    }
}

/// Whether two placements ever use the same slot of the same channel in the
/// same cycle.
pub fn placements_collide(slot_a: u16, a: &FlexRaySlot, slot_b: u16, b: &FlexRaySlot) -> bool {
    if slot_a != slot_b || !a.channels.overlaps(b.channels) {
        return false;
    }
    let g = gcd(a.cycle_repetition.max(1) as u64, b.cycle_repetition.max(1) as u64);
    a.base_cycle as u64 % g == b.base_cycle as u64 % g
}

fn slot_start(start: Instant, timing: &FlexRayTiming, cycle: u64, slot: u16) -> Instant {
    let offset = cycle * timing.cycle_us as u64 + timing.slot_offset_us(slot) as u64;
    start + Duration::from_micros(offset)
}
