//! Frame and PDU definitions.
//!
//! A PDU is the payload container that owns signals; a frame carries one or
//! more PDUs at byte-aligned start bits. CAN frames normally map exactly one
//! PDU at bit 0 ([`crate::database::Database::add_frame_with_pdu`]).
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use super::{ClusterRef, FrameRef, PduRef, SignalRef, SubframeRef};
use crate::core::{coded_enum, FlexRayChannel, Protocol};
use crate::error::DatabaseError;

//==================================================================================TIMING
/// Transmission trigger of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimingType {
    /// Sent every `tx_time`.
    Cyclic,
    /// Sent when written.
    Event,
    /// Sent every `tx_time` and additionally when written.
    CyclicAndEvent,
}

coded_enum!(TimingType {
    Cyclic = 0,
    Event = 1,
    CyclicAndEvent = 2,
});

impl TimingType {
    pub const fn is_cyclic(self) -> bool {
        matches!(self, TimingType::Cyclic | TimingType::CyclicAndEvent)
    }
}

/// LIN checksum model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinChecksum {
    /// Data bytes only (LIN 1.x, diagnostic frames).
    Classic,
    /// Data bytes plus protected identifier (LIN 2.x).
    Enhanced,
}

coded_enum!(LinChecksum {
    Classic = 0,
    Enhanced = 1,
});

/// Slot/cycle placement of a FlexRay frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlexRaySlot {
    /// First cycle (0..=63) in which the frame appears.
    pub base_cycle: u8,
    /// Cycle repetition (power of two, 1..=64).
    pub cycle_repetition: u8,
    pub channels: FlexRayChannel,
}

impl Default for FlexRaySlot {
    fn default() -> Self {
        Self {
            base_cycle: 0,
            cycle_repetition: 1,
            channels: FlexRayChannel::A,
        }
    }
}

impl FlexRaySlot {
    /// Whether the frame occupies its slot in `cycle` (0..=63).
    pub const fn occurs_in(&self, cycle: u8) -> bool {
        let repetition = if self.cycle_repetition == 0 {
            1
        } else {
            self.cycle_repetition
        };
        cycle % repetition == self.base_cycle % repetition
    }
}

//==================================================================================PDU_MAPPING
/// Placement of a PDU inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PduMapping {
    pub pdu: PduRef,
    /// Frame-relative start bit; must be a multiple of 8.
    pub start_bit: u16,
    /// Optional frame-relative bit flagging that the PDU carries fresh data.
    pub update_bit: Option<u16>,
}

impl PduMapping {
    /// Byte offset of the PDU in the frame payload.
    pub const fn byte_offset(&self) -> usize {
        (self.start_bit / 8) as usize
    }
}

//==================================================================================FRAME
/// Bus frame definition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    pub name: String,
    /// CAN arbitration id, FlexRay slot id or LIN id.
    pub id: u32,
    /// 29-bit identifier (CAN/J1939 only).
    pub can_extended: bool,
    /// Payload length, or maximum length for variable payload frames.
    pub payload_len: usize,
    pub variable_payload: bool,
    pub default_payload: Vec<u8>,
    pub timing: TimingType,
    /// Cycle period in microseconds for cyclic timing.
    pub tx_time_us: u32,
    pub flexray: FlexRaySlot,
    pub lin_checksum: LinChecksum,
    pub comment: String,
    pub(crate) cluster: ClusterRef,
    pub(crate) pdus: Vec<PduMapping>,
}

impl Frame {
    fn with_id(name: &str, id: u32, payload_len: usize) -> Self {
        Self {
            name: String::from(name),
            id,
            can_extended: false,
            payload_len,
            variable_payload: false,
            default_payload: vec![0; payload_len],
            timing: TimingType::Event,
            tx_time_us: 0,
            flexray: FlexRaySlot::default(),
            lin_checksum: LinChecksum::Enhanced,
            comment: String::new(),
            cluster: ClusterRef(u32::MAX),
            pdus: Vec::new(),
        }
    }

    /// Event-triggered CAN frame with a standard identifier.
    pub fn can(name: &str, id: u32, payload_len: usize) -> Self {
        Self::with_id(name, id, payload_len)
    }

    /// Event-triggered CAN frame with an extended identifier.
    pub fn can_extended(name: &str, id: u32, payload_len: usize) -> Self {
        let mut frame = Self::with_id(name, id, payload_len);
        frame.can_extended = true;
        frame
    }

    /// Static-segment FlexRay frame in `slot`.
    pub fn flexray(name: &str, slot: u16, payload_len: usize, placement: FlexRaySlot) -> Self {
        let mut frame = Self::with_id(name, slot as u32, payload_len);
        frame.flexray = placement;
        frame.timing = TimingType::Cyclic;
        frame
    }

    /// Unconditional LIN frame.
    pub fn lin(name: &str, id: u8, payload_len: usize) -> Self {
        Self::with_id(name, id as u32, payload_len)
    }

    /// Cyclic transmission with the given period.
    pub fn cyclic(mut self, period_us: u32) -> Self {
        self.timing = TimingType::Cyclic;
        self.tx_time_us = period_us;
        self
    }

    pub fn with_timing(mut self, timing: TimingType, period_us: u32) -> Self {
        self.timing = timing;
        self.tx_time_us = period_us;
        self
    }

    pub fn with_default_payload(mut self, payload: &[u8]) -> Self {
        self.default_payload = payload.to_vec();
        self
    }

    pub fn variable(mut self) -> Self {
        self.variable_payload = true;
        self
    }

    pub fn cluster(&self) -> ClusterRef {
        self.cluster
    }

    pub fn pdu_mappings(&self) -> &[PduMapping] {
        &self.pdus
    }

    /// Default payload padded (or cut) to the declared length.
    pub fn default_bytes(&self) -> Vec<u8> {
        let mut bytes = self.default_payload.clone();
        bytes.resize(self.payload_len, 0);
        bytes
    }

    pub(crate) fn check(&self, protocol: Protocol) -> Result<(), DatabaseError> {
        let id_ok = match protocol {
            Protocol::Can if self.can_extended => self.id <= 0x1FFF_FFFF,
            Protocol::Can => self.id <= 0x7FF,
            Protocol::J1939 => self.can_extended && self.id <= 0x1FFF_FFFF,
            Protocol::Lin => self.id <= 0x3F,
            Protocol::FlexRay => (1..=2047).contains(&self.id),
        };
        if !id_ok {
            return Err(DatabaseError::InvalidFrameId {
                frame: self.name.clone(),
                id: self.id,
            });
        }
        if self.payload_len > protocol.max_payload() {
            return Err(DatabaseError::PayloadTooLarge {
                object: self.name.clone(),
                len: self.payload_len,
                max: protocol.max_payload(),
            });
        }
        if protocol == Protocol::FlexRay {
            let rep = self.flexray.cycle_repetition;
            if rep == 0 || rep > 64 || !rep.is_power_of_two() || self.flexray.base_cycle >= rep {
                return Err(DatabaseError::ProtocolMismatch {
                    object: self.name.clone(),
                    protocol,
                });
            }
        }
        if let Some(update_bit) = self.pdus.iter().filter_map(|m| m.update_bit).max() {
            if update_bit as usize >= self.payload_len * 8 {
                return Err(DatabaseError::PayloadTooLarge {
                    object: self.name.clone(),
                    len: update_bit as usize / 8 + 1,
                    max: self.payload_len,
                });
            }
        }
        Ok(())
    }
}

//==================================================================================PDU
/// Multiplexing description of a PDU.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PduMux {
    pub selector: SignalRef,
    pub subframes: Vec<SubframeRef>,
}

/// Payload container owning signal definitions.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pdu {
    pub name: String,
    pub payload_len: usize,
    pub default_payload: Vec<u8>,
    pub comment: String,
    pub(crate) cluster: ClusterRef,
    /// Static signals and the selector, in insertion order.
    pub(crate) signals: Vec<SignalRef>,
    pub(crate) mux: Option<PduMux>,
    pub(crate) frames: Vec<FrameRef>,
}

impl Pdu {
    pub fn new(name: &str, payload_len: usize) -> Self {
        Self {
            name: String::from(name),
            payload_len,
            default_payload: vec![0; payload_len],
            comment: String::new(),
            cluster: ClusterRef(u32::MAX),
            signals: Vec::new(),
            mux: None,
            frames: Vec::new(),
        }
    }

    pub fn with_default_payload(mut self, payload: &[u8]) -> Self {
        self.default_payload = payload.to_vec();
        self
    }

    pub fn cluster(&self) -> ClusterRef {
        self.cluster
    }

    /// Static signals plus the selector.
    pub fn signals(&self) -> &[SignalRef] {
        &self.signals
    }

    pub fn mux(&self) -> Option<&PduMux> {
        self.mux.as_ref()
    }

    pub fn is_muxed(&self) -> bool {
        self.mux.is_some()
    }

    /// Frames carrying this PDU.
    pub fn frames(&self) -> &[FrameRef] {
        &self.frames
    }

    /// Default payload padded (or cut) to the declared length.
    pub fn default_bytes(&self) -> Vec<u8> {
        let mut bytes = self.default_payload.clone();
        bytes.resize(self.payload_len, 0);
        bytes
    }
}
