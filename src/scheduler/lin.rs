//! LIN master schedule table runner.
//!
//! One table is active at a time. Requests for another table take effect
//! at the next slot boundary, so a header is never cut short. Run-once
//! tables hand control back to the continuous table they interrupted and
//! the null table halts the master.
use alloc::vec::Vec;
use embassy_time::{Duration, Instant};

use crate::database::{EntryType, FrameRef, LinSchedule, RunMode};
use crate::error::SessionError;

/// Timing-relevant copy of a schedule entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinTableEntry {
    pub kind: EntryType,
    pub frames: Vec<FrameRef>,
    pub delay: Duration,
    pub event_id: u8,
}

/// Timing-relevant copy of a schedule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinTable {
    pub run_mode: RunMode,
    pub entries: Vec<LinTableEntry>,
}

impl From<&LinSchedule> for LinTable {
    fn from(schedule: &LinSchedule) -> Self {
        Self {
            run_mode: schedule.run_mode,
            entries: schedule
                .entries
                .iter()
                .map(|e| LinTableEntry {
                    kind: e.kind,
                    frames: e.frames.clone(),
                    delay: Duration::from_micros(e.delay_us as u64),
                    event_id: e.event_id,
                })
                .collect(),
        }
    }
}

/// Slot the master must serve now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinSlot {
    /// Index of the table in the session's table list.
    pub table: usize,
    pub entry: usize,
    pub kind: EntryType,
    pub frames: Vec<FrameRef>,
    pub event_id: u8,
    /// Start of the slot.
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    table: usize,
    entry: usize,
    next_slot: Instant,
}

/// Schedule table state of one LIN master interface.
#[derive(Debug, Clone, Default)]
pub struct LinScheduleRunner {
    tables: Vec<LinTable>,
    active: Option<Cursor>,
    pending: Option<usize>,
    resume: Option<usize>,
}

impl LinScheduleRunner {
    pub fn new(tables: Vec<LinTable>) -> Self {
        Self {
            tables,
            ..Self::default()
        }
    }

    pub fn tables(&self) -> &[LinTable] {
        &self.tables
    }

    /// Table currently running.
    pub fn active(&self) -> Option<usize> {
        self.active.map(|c| c.table)
    }

    /// Table waiting for the next slot boundary.
    pub fn pending(&self) -> Option<usize> {
        self.pending
    }

    /// Select table `index`. With no table running it starts at `now`;
    /// otherwise the switch happens when the current slot ends.
    pub fn request(&mut self, index: usize, now: Instant) -> Result<(), SessionError> {
        if index >= self.tables.len() {
            return Err(SessionError::InvalidSchedule {
                index: index as u32,
            });
        }
        if self.active.is_none() {
            self.pending = None;
            self.apply(index, now);
        } else {
            self.pending = Some(index);
        }
        Ok(())
    }

    /// Halt the master without waiting for a slot boundary.
    pub fn stop(&mut self) {
        self.active = None;
        self.pending = None;
        self.resume = None;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.map(|c| c.next_slot)
    }

    /// Slot starting at or before `now`, if any.
    pub fn poll(&mut self, now: Instant) -> Option<LinSlot> {
        let boundary = self.active?.next_slot;
        if boundary > now {
            return None;
        }
        if let Some(index) = self.pending.take() {
            self.apply(index, boundary);
        }
        let mut cursor = self.active?;
        let table = &self.tables[cursor.table];
        let Some(entry) = table.entries.get(cursor.entry) else {
            self.active = None;
            return None;
        };
        let slot = LinSlot {
            table: cursor.table,
            entry: cursor.entry,
            kind: entry.kind,
            frames: entry.frames.clone(),
            event_id: entry.event_id,
            at: cursor.next_slot,
        };
        cursor.next_slot += entry.delay;
        cursor.entry += 1;
        let finished = cursor.entry >= table.entries.len();
        let run_mode = table.run_mode;
        self.active = Some(cursor);
        if finished {
            match run_mode {
                RunMode::Continuous => {
                    self.active = Some(Cursor { entry: 0, ..cursor });
                }
                RunMode::Once => {
                    self.active = self.resume.take().map(|table| Cursor {
                        table,
                        entry: 0,
                        next_slot: cursor.next_slot,
                    });
                }
                RunMode::Null => self.active = None,
            }
        }
        Some(slot)
    }

    fn apply(&mut self, index: usize, at: Instant) {
        let start = Cursor {
            table: index,
            entry: 0,
            next_slot: at,
        };
        match self.tables[index].run_mode {
            RunMode::Null => {
                self.active = None;
                self.resume = None;
            }
            RunMode::Once => {
                if let Some(current) = self.active {
                    if self.tables[current.table].run_mode == RunMode::Continuous {
                        self.resume = Some(current.table);
                    }
                }
                self.active = Some(start);
            }
            RunMode::Continuous => {
                self.resume = None;
                self.active = Some(start);
            }
        }
    }
}
