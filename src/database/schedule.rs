//! LIN master schedule tables.
use alloc::string::String;
use alloc::vec::Vec;

use super::{ClusterRef, FrameRef};
use crate::core::coded_enum;

/// How a schedule behaves once its last entry ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RunMode {
    /// Wraps around to the first entry.
    Continuous,
    /// Runs once, then the previous continuous schedule resumes.
    Once,
    /// Stops all schedule activity.
    Null,
}

coded_enum!(RunMode {
    Continuous = 0,
    Once = 1,
    Null = 2,
});

/// Kind of slot an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntryType {
    /// Always sends the header of its single frame.
    Unconditional,
    /// Sends the first of its frames that has fresh data, or nothing.
    Sporadic,
    /// Header answered by any slave with fresh data.
    EventTriggered,
    /// Master request / slave response diagnostic slot.
    Diagnostic,
}

coded_enum!(EntryType {
    Unconditional = 0,
    Sporadic = 1,
    EventTriggered = 2,
    Diagnostic = 3,
});

/// One slot of a schedule table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinScheduleEntry {
    pub name: String,
    pub kind: EntryType,
    /// Frames served by the slot; one for unconditional entries.
    pub frames: Vec<FrameRef>,
    /// Time from the start of this slot to the start of the next (µs).
    pub delay_us: u32,
    /// Identifier of an event-triggered slot.
    pub event_id: u8,
    /// Schedule run on collision of an event-triggered slot.
    pub collision_resolving: Option<super::ScheduleRef>,
}

impl LinScheduleEntry {
    pub fn unconditional(name: &str, frame: FrameRef, delay_us: u32) -> Self {
        Self {
            name: String::from(name),
            kind: EntryType::Unconditional,
            frames: alloc::vec![frame],
            delay_us,
            event_id: 0,
            collision_resolving: None,
        }
    }

    pub fn sporadic(name: &str, frames: Vec<FrameRef>, delay_us: u32) -> Self {
        Self {
            name: String::from(name),
            kind: EntryType::Sporadic,
            frames,
            delay_us,
            event_id: 0,
            collision_resolving: None,
        }
    }

    pub fn event_triggered(name: &str, event_id: u8, frames: Vec<FrameRef>, delay_us: u32) -> Self {
        Self {
            name: String::from(name),
            kind: EntryType::EventTriggered,
            frames,
            delay_us,
            event_id,
            collision_resolving: None,
        }
    }
}

/// Ordered table of slots run by the LIN master.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinSchedule {
    pub name: String,
    /// Lower value wins when several schedules are requested.
    pub priority: u8,
    pub run_mode: RunMode,
    pub entries: Vec<LinScheduleEntry>,
    pub(crate) cluster: ClusterRef,
}

impl LinSchedule {
    pub fn new(name: &str, run_mode: RunMode) -> Self {
        Self {
            name: String::from(name),
            priority: 0,
            run_mode,
            entries: Vec::new(),
            cluster: ClusterRef(u32::MAX),
        }
    }

    pub fn entry(mut self, entry: LinScheduleEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn cluster(&self) -> ClusterRef {
        self.cluster
    }

    /// Sum of the entry delays (µs).
    pub fn period_us(&self) -> u64 {
        self.entries.iter().map(|e| e.delay_us as u64).sum()
    }
}
