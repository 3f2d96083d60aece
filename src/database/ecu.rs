//! Network node definitions.
use alloc::string::String;
use alloc::vec::Vec;

use super::{ClusterRef, FrameRef};
use crate::core::FlexRayChannel;

/// LIN node attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinNode {
    /// Master nodes own the schedule tables.
    pub master: bool,
    /// Protocol version encoded as `major << 4 | minor` (0x21 for LIN 2.1).
    pub protocol_version: u8,
    pub initial_nad: u8,
    pub configured_nad: u8,
    pub supplier_id: u16,
    pub function_id: u16,
    /// P2 minimum response time (µs).
    pub p2_min_us: u32,
    /// ST minimum separation time (µs).
    pub st_min_us: u32,
}

/// FlexRay node attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlexRayNode {
    /// Node may send startup frames to bring the cluster up.
    pub coldstart: bool,
    /// Channel carrying the wakeup pattern, if any.
    pub wakeup_channel: Option<FlexRayChannel>,
}

/// J1939 node attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct J1939Node {
    pub preferred_address: u8,
    /// 64-bit NAME; see [`crate::protocol::j1939::name::J1939Name`].
    pub name: u64,
}

impl Default for J1939Node {
    fn default() -> Self {
        Self {
            preferred_address: crate::protocol::j1939::NULL_ADDRESS,
            name: 0,
        }
    }
}

/// Named node with its transmit and receive frame sets.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ecu {
    pub name: String,
    pub lin: LinNode,
    pub flexray: FlexRayNode,
    pub j1939: J1939Node,
    pub comment: String,
    pub(crate) cluster: ClusterRef,
    pub(crate) tx_frames: Vec<FrameRef>,
    pub(crate) rx_frames: Vec<FrameRef>,
}

impl Ecu {
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            lin: LinNode::default(),
            flexray: FlexRayNode::default(),
            j1939: J1939Node::default(),
            comment: String::new(),
            cluster: ClusterRef(u32::MAX),
            tx_frames: Vec::new(),
            rx_frames: Vec::new(),
        }
    }

    pub fn lin_master(mut self) -> Self {
        self.lin.master = true;
        self
    }

    pub fn coldstart(mut self) -> Self {
        self.flexray.coldstart = true;
        self
    }

    pub fn j1939(mut self, preferred_address: u8, name: u64) -> Self {
        self.j1939 = J1939Node {
            preferred_address,
            name,
        };
        self
    }

    pub fn cluster(&self) -> ClusterRef {
        self.cluster
    }

    pub fn tx_frames(&self) -> &[FrameRef] {
        &self.tx_frames
    }

    pub fn rx_frames(&self) -> &[FrameRef] {
        &self.rx_frames
    }
}
