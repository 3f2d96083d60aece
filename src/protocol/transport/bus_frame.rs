//! Raw frame as exchanged with the bus boundary, for every supported
//! protocol.
use alloc::vec::Vec;
use embassy_time::Instant;
use embedded_can::{ExtendedId, Id, StandardId};

use crate::core::{FlexRayChannel, Protocol};
use crate::database::Frame;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;

/// Bus address of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameKey {
    /// CAN (and J1939) arbitration identifier.
    Can(Id),
    /// FlexRay slot, cycle counter and channel(s).
    FlexRay {
        slot: u16,
        cycle: u8,
        channel: FlexRayChannel,
    },
    /// LIN frame identifier (0..=63).
    Lin(u8),
}

impl FrameKey {
    /// Key under which frames of `frame` travel, with FlexRay cycle 0.
    pub fn for_frame(frame: &Frame, protocol: Protocol) -> Option<Self> {
        match protocol {
            Protocol::Can | Protocol::J1939 => can_id(frame.id, frame.can_extended).map(FrameKey::Can),
            Protocol::Lin => u8::try_from(frame.id).ok().map(FrameKey::Lin),
            Protocol::FlexRay => Some(FrameKey::FlexRay {
                slot: u16::try_from(frame.id).ok()?,
                cycle: frame.flexray.base_cycle,
                channel: frame.flexray.channels,
            }),
        }
    }

    /// Numeric identifier and extended flag, as stored in the database.
    pub fn raw_id(&self) -> (u32, bool) {
        match self {
            FrameKey::Can(Id::Standard(id)) => (id.as_raw() as u32, false),
            FrameKey::Can(Id::Extended(id)) => (id.as_raw(), true),
            FrameKey::FlexRay { slot, .. } => (*slot as u32, false),
            FrameKey::Lin(id) => (*id as u32, false),
        }
    }

    /// Whether two keys address the same database frame. FlexRay keys
    /// match on slot only since the cycle counter changes every cycle.
    pub fn same_frame(&self, other: &FrameKey) -> bool {
        match (self, other) {
            (FrameKey::FlexRay { slot: a, .. }, FrameKey::FlexRay { slot: b, .. }) => a == b,
            _ => self == other,
        }
    }
}

/// `embedded-can` identifier from a raw id and format flag.
pub fn can_id(id: u32, extended: bool) -> Option<Id> {
    if extended {
        ExtendedId::new(id).map(Id::Extended)
    } else {
        u16::try_from(id)
            .ok()
            .and_then(StandardId::new)
            .map(Id::Standard)
    }
}

/// Frame crossing the bus boundary.
///
/// A LIN frame with an empty payload is a bare header sent by the master
/// for another node to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusFrame {
    pub key: FrameKey,
    pub payload: Vec<u8>,
    /// Receive time for inbound frames, release time for outbound ones.
    pub timestamp: Option<Instant>,
    /// Set on transmitted frames looped back into the inbound queue.
    pub echo: bool,
}

impl BusFrame {
    pub fn new(key: FrameKey, payload: &[u8]) -> Self {
        Self {
            key,
            payload: payload.to_vec(),
            timestamp: None,
            echo: false,
        }
    }

    /// CAN frame; `None` when `id` does not fit the format.
    pub fn can(id: u32, extended: bool, payload: &[u8]) -> Option<Self> {
        can_id(id, extended).map(|id| Self::new(FrameKey::Can(id), payload))
    }

    pub fn lin(id: u8, payload: &[u8]) -> Self {
        Self::new(FrameKey::Lin(id & 0x3F), payload)
    }

    pub fn flexray(slot: u16, cycle: u8, channel: FlexRayChannel, payload: &[u8]) -> Self {
        Self::new(
            FrameKey::FlexRay {
                slot,
                cycle,
                channel,
            },
            payload,
        )
    }

    pub fn with_timestamp(mut self, timestamp: Instant) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl From<&CanFrame> for BusFrame {
    fn from(frame: &CanFrame) -> Self {
        let id = ExtendedId::new(frame.id.0 & 0x1FFF_FFFF)
            .map(Id::Extended)
            .unwrap_or(Id::Extended(ExtendedId::ZERO));
        Self::new(FrameKey::Can(id), &frame.data[..frame.len])
    }
}

impl TryFrom<&BusFrame> for CanFrame {
    type Error = ();

    /// Only 29-bit CAN frames of at most 8 bytes are J1939 frames.
    fn try_from(frame: &BusFrame) -> Result<Self, Self::Error> {
        match frame.key {
            FrameKey::Can(Id::Extended(id)) if frame.payload.len() <= 8 => {
                Ok(CanFrame::new(CanId(id.as_raw()), &frame.payload))
            }
            _ => Err(()),
        }
    }
}
