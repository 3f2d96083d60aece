//! Bus-wide cluster definition.
use alloc::string::String;
use alloc::vec::Vec;

use super::{EcuRef, FrameRef, PduRef, ScheduleRef};
use crate::core::Protocol;
use crate::error::DatabaseError;

/// Default classic CAN bit rate (bit/s).
pub const DEFAULT_CAN_BAUD_RATE: u64 = 500_000;
/// J1939-11 bit rate (bit/s).
pub const DEFAULT_J1939_BAUD_RATE: u64 = 250_000;
/// Common LIN bit rate (bit/s).
pub const DEFAULT_LIN_BAUD_RATE: u64 = 19_200;
/// LIN schedule tick used when a cluster does not declare one (µs).
pub const DEFAULT_LIN_TICK_US: u32 = 5_000;

/// Cycle layout of a FlexRay cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlexRayTiming {
    /// Length of one communication cycle (µs).
    pub cycle_us: u32,
    /// Number of static slots, slot ids 1..=count.
    pub static_slot_count: u16,
    /// Duration of one static slot (µs).
    pub static_slot_us: u32,
    /// Number of minislots in the dynamic segment.
    pub minislot_count: u16,
    /// Duration of one minislot (µs).
    pub minislot_us: u32,
    /// Network idle time closing the cycle (µs).
    pub network_idle_us: u32,
}

impl Default for FlexRayTiming {
    fn default() -> Self {
        Self {
            cycle_us: 5_000,
            static_slot_count: 60,
            static_slot_us: 50,
            minislot_count: 200,
            minislot_us: 8,
            network_idle_us: 200,
        }
    }
}

impl FlexRayTiming {
    /// Offset of `slot` from the start of its cycle (µs).
    ///
    /// Dynamic slots are placed on their first minislot, which is the
    /// earliest they may start.
    pub fn slot_offset_us(&self, slot: u16) -> u32 {
        let slot = slot.max(1);
        if slot <= self.static_slot_count {
            (slot as u32 - 1) * self.static_slot_us
        } else {
            let dynamic_index = (slot - self.static_slot_count - 1) as u32;
            self.static_slot_count as u32 * self.static_slot_us
                + dynamic_index.min(self.minislot_count as u32) * self.minislot_us
        }
    }

    /// Whether `slot` falls inside the static segment.
    pub fn is_static(&self, slot: u16) -> bool {
        (1..=self.static_slot_count).contains(&slot)
    }

    /// The cycle is non-empty and holds both segments and the idle time.
    pub fn check(&self) -> Result<(), &'static str> {
        if self.cycle_us == 0 {
            return Err("cycle duration is zero");
        }
        let used = self.static_slot_count as u64 * self.static_slot_us as u64
            + self.minislot_count as u64 * self.minislot_us as u64
            + self.network_idle_us as u64;
        if used > self.cycle_us as u64 {
            return Err("segments exceed the cycle duration");
        }
        Ok(())
    }
}

/// Bus-wide definition: one protocol, its bit rates and the objects it owns.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cluster {
    pub name: String,
    pub protocol: Protocol,
    /// Nominal bit rate (bit/s); 0 when unknown.
    pub baud_rate: u64,
    /// CAN FD data phase bit rate; 0 for classic CAN.
    pub can_fd_baud_rate: u64,
    pub flexray: FlexRayTiming,
    /// LIN schedule tick (µs).
    pub lin_tick_us: u32,
    pub comment: String,
    pub(crate) frames: Vec<FrameRef>,
    pub(crate) pdus: Vec<PduRef>,
    pub(crate) ecus: Vec<EcuRef>,
    pub(crate) schedules: Vec<ScheduleRef>,
}

impl Cluster {
    /// Cluster with the usual bit rate of `protocol`.
    pub fn new(name: &str, protocol: Protocol) -> Self {
        let baud_rate = match protocol {
            Protocol::Can => DEFAULT_CAN_BAUD_RATE,
            Protocol::J1939 => DEFAULT_J1939_BAUD_RATE,
            Protocol::Lin => DEFAULT_LIN_BAUD_RATE,
            Protocol::FlexRay => 10_000_000,
        };
        Self {
            name: String::from(name),
            protocol,
            baud_rate,
            can_fd_baud_rate: 0,
            flexray: FlexRayTiming::default(),
            lin_tick_us: DEFAULT_LIN_TICK_US,
            comment: String::new(),
            frames: Vec::new(),
            pdus: Vec::new(),
            ecus: Vec::new(),
            schedules: Vec::new(),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u64) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_flexray_timing(mut self, timing: FlexRayTiming) -> Self {
        self.flexray = timing;
        self
    }

    /// Cluster-wide timing of FlexRay clusters.
    pub fn check(&self) -> Result<(), DatabaseError> {
        if self.protocol != Protocol::FlexRay {
            return Ok(());
        }
        self.flexray
            .check()
            .map_err(|detail| DatabaseError::InvalidTiming {
                cluster: self.name.clone(),
                detail,
            })
    }

    pub fn frames(&self) -> &[FrameRef] {
        &self.frames
    }

    pub fn pdus(&self) -> &[PduRef] {
        &self.pdus
    }

    pub fn ecus(&self) -> &[EcuRef] {
        &self.ecus
    }

    pub fn schedules(&self) -> &[ScheduleRef] {
        &self.schedules
    }
}
