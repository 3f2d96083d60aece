//! In-memory database model: clusters, frames, PDUs, signals, subframes,
//! ECUs and LIN schedules.
//!
//! The [`Database`] owns every object in flat arenas; relations are stored
//! as typed index handles ([`FrameRef`], [`PduRef`], ...) so the graph stays
//! acyclic and a finished database can be shared read-only between sessions
//! behind an `Arc`. Objects are added through the `add_*` builders, which
//! validate references and placement as they go; [`Database::validate`]
//! re-checks the whole model after fields were edited in place.
use alloc::string::String;
use alloc::vec::Vec;

pub mod cluster;
pub mod ecu;
pub mod frame;
pub mod schedule;
pub mod signal;

pub use cluster::{Cluster, FlexRayTiming};
pub use ecu::{Ecu, FlexRayNode, J1939Node, LinNode};
pub use frame::{FlexRaySlot, Frame, LinChecksum, Pdu, PduMapping, PduMux, TimingType};
pub use schedule::{EntryType, LinSchedule, LinScheduleEntry, RunMode};
pub use signal::{MuxRole, Signal, Subframe};

use crate::core::{DataType, Protocol};
use crate::error::DatabaseError;

//==================================================================================HANDLES
macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Kind name used in error reports.
            pub const KIND: &'static str = $kind;

            /// Position of the object in its arena.
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// Handle from a raw arena index, as received from the property
            /// surface. The index is checked on first use.
            pub const fn from_index(index: u32) -> Self {
                Self(index)
            }

            fn invalid(self) -> DatabaseError {
                DatabaseError::InvalidReference {
                    kind: $kind,
                    index: self.0,
                }
            }
        }
    };
}

handle!(/// Handle to a [`Cluster`].
    ClusterRef, "cluster");
handle!(/// Handle to a [`Frame`].
    FrameRef, "frame");
handle!(/// Handle to a [`Pdu`].
    PduRef, "pdu");
handle!(/// Handle to a [`Signal`].
    SignalRef, "signal");
handle!(/// Handle to a [`Subframe`].
    SubframeRef, "subframe");
handle!(/// Handle to an [`Ecu`].
    EcuRef, "ecu");
handle!(/// Handle to a [`LinSchedule`].
    ScheduleRef, "schedule");

fn next_handle(len: usize) -> u32 {
    len as u32
}

//==================================================================================DATABASE
/// Owner of every model object.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Database {
    pub name: String,
    clusters: Vec<Cluster>,
    frames: Vec<Frame>,
    pdus: Vec<Pdu>,
    signals: Vec<Signal>,
    subframes: Vec<Subframe>,
    ecus: Vec<Ecu>,
    schedules: Vec<LinSchedule>,
}

impl Database {
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            ..Self::default()
        }
    }

    //------------------------------------------------------------------------------BUILDERS
    pub fn add_cluster(&mut self, cluster: Cluster) -> Result<ClusterRef, DatabaseError> {
        if self.clusters.iter().any(|c| c.name == cluster.name) {
            return Err(DatabaseError::DuplicateName { name: cluster.name });
        }
        cluster.check()?;
        let handle = ClusterRef(next_handle(self.clusters.len()));
        self.clusters.push(cluster);
        Ok(handle)
    }

    /// Add a PDU to `cluster`.
    pub fn add_pdu(&mut self, cluster: ClusterRef, mut pdu: Pdu) -> Result<PduRef, DatabaseError> {
        let protocol = self.cluster(cluster)?.protocol;
        if self.find_pdu(cluster, &pdu.name).is_some() {
            return Err(DatabaseError::DuplicateName { name: pdu.name });
        }
        if pdu.payload_len > protocol.max_payload() {
            return Err(DatabaseError::PayloadTooLarge {
                object: pdu.name,
                len: pdu.payload_len,
                max: protocol.max_payload(),
            });
        }
        pdu.cluster = cluster;
        let handle = PduRef(next_handle(self.pdus.len()));
        self.pdus.push(pdu);
        self.clusters[cluster.index()].pdus.push(handle);
        Ok(handle)
    }

    /// Add a static signal to `pdu`.
    pub fn add_signal(&mut self, pdu: PduRef, signal: Signal) -> Result<SignalRef, DatabaseError> {
        self.insert_signal(pdu, signal, MuxRole::Static)
    }

    /// Declare the mux selector of `pdu`. A PDU has at most one selector and
    /// it must be an integer signal.
    pub fn set_mux_selector(
        &mut self,
        pdu: PduRef,
        signal: Signal,
    ) -> Result<SignalRef, DatabaseError> {
        let owner = self.pdu(pdu)?;
        if owner.mux.is_some() {
            return Err(DatabaseError::InvalidMux {
                pdu: owner.name.clone(),
                detail: "selector already defined",
            });
        }
        if signal.data_type == DataType::Float {
            return Err(DatabaseError::InvalidMux {
                pdu: owner.name.clone(),
                detail: "selector must be an integer signal",
            });
        }
        let selector = self.insert_signal(pdu, signal, MuxRole::Selector)?;
        self.pdus[pdu.index()].mux = Some(PduMux {
            selector,
            subframes: Vec::new(),
        });
        Ok(selector)
    }

    /// Add a subframe chosen by raw selector value `mux_value`.
    pub fn add_subframe(
        &mut self,
        pdu: PduRef,
        name: &str,
        mux_value: u64,
    ) -> Result<SubframeRef, DatabaseError> {
        let owner = self.pdu(pdu)?;
        let Some(mux) = owner.mux.as_ref() else {
            return Err(DatabaseError::InvalidMux {
                pdu: owner.name.clone(),
                detail: "subframe added before the selector",
            });
        };
        for existing in &mux.subframes {
            let existing = &self.subframes[existing.index()];
            if existing.mux_value == mux_value {
                return Err(DatabaseError::InvalidMux {
                    pdu: owner.name.clone(),
                    detail: "duplicate mux value",
                });
            }
            if existing.name == name {
                return Err(DatabaseError::DuplicateName {
                    name: String::from(name),
                });
            }
        }
        let handle = SubframeRef(next_handle(self.subframes.len()));
        self.subframes.push(Subframe {
            name: String::from(name),
            mux_value,
            pdu,
            signals: Vec::new(),
        });
        if let Some(mux) = self.pdus[pdu.index()].mux.as_mut() {
            mux.subframes.push(handle);
        }
        Ok(handle)
    }

    /// Add a signal present only in `subframe`.
    pub fn add_dynamic_signal(
        &mut self,
        subframe: SubframeRef,
        signal: Signal,
    ) -> Result<SignalRef, DatabaseError> {
        let pdu = self.subframe(subframe)?.pdu;
        let handle = self.insert_signal(pdu, signal, MuxRole::Dynamic(subframe))?;
        Ok(handle)
    }

    fn insert_signal(
        &mut self,
        pdu: PduRef,
        mut signal: Signal,
        role: MuxRole,
    ) -> Result<SignalRef, DatabaseError> {
        let owner = self.pdu(pdu)?;
        if self.pdu_signals(pdu).any(|s| self.signals[s.index()].name == signal.name) {
            return Err(DatabaseError::DuplicateName { name: signal.name });
        }
        signal.check(owner.payload_len)?;
        signal.pdu = pdu;
        signal.mux_role = role;
        let handle = SignalRef(next_handle(self.signals.len()));
        self.signals.push(signal);
        match role {
            MuxRole::Dynamic(subframe) => self.subframes[subframe.index()].signals.push(handle),
            MuxRole::Static | MuxRole::Selector => self.pdus[pdu.index()].signals.push(handle),
        }
        Ok(handle)
    }

    /// Add a frame to `cluster`; PDUs are mapped separately with
    /// [`Self::map_pdu`].
    pub fn add_frame(
        &mut self,
        cluster: ClusterRef,
        mut frame: Frame,
    ) -> Result<FrameRef, DatabaseError> {
        let protocol = self.cluster(cluster)?.protocol;
        if self.find_frame(cluster, &frame.name).is_some() {
            return Err(DatabaseError::DuplicateName { name: frame.name });
        }
        frame.check(protocol)?;
        frame.cluster = cluster;
        let handle = FrameRef(next_handle(self.frames.len()));
        self.frames.push(frame);
        self.clusters[cluster.index()].frames.push(handle);
        Ok(handle)
    }

    /// Place `pdu` inside `frame` at a byte-aligned `start_bit`.
    pub fn map_pdu(
        &mut self,
        frame: FrameRef,
        pdu: PduRef,
        start_bit: u16,
        update_bit: Option<u16>,
    ) -> Result<(), DatabaseError> {
        let target = self.frame(frame)?;
        let payload = self.pdu(pdu)?;
        if payload.cluster != target.cluster {
            return Err(pdu.invalid());
        }
        if start_bit % 8 != 0 {
            return Err(DatabaseError::UnalignedPdu {
                pdu: payload.name.clone(),
                start_bit,
            });
        }
        let mapping = PduMapping {
            pdu,
            start_bit,
            update_bit,
        };
        let update_fits = update_bit.map_or(true, |bit| (bit as usize) < target.payload_len * 8);
        if mapping.byte_offset() + payload.payload_len > target.payload_len || !update_fits {
            return Err(DatabaseError::PduExceedsFrame {
                pdu: payload.name.clone(),
                frame: target.name.clone(),
            });
        }
        self.frames[frame.index()].pdus.push(mapping);
        self.pdus[pdu.index()].frames.push(frame);
        Ok(())
    }

    /// Add a frame together with a PDU of the same name and length mapped at
    /// bit 0, the usual shape of CAN and LIN frames.
    pub fn add_frame_with_pdu(
        &mut self,
        cluster: ClusterRef,
        frame: Frame,
    ) -> Result<(FrameRef, PduRef), DatabaseError> {
        let pdu = Pdu::new(&frame.name, frame.payload_len).with_default_payload(&frame.default_payload);
        let pdu = self.add_pdu(cluster, pdu)?;
        let frame = self.add_frame(cluster, frame)?;
        self.map_pdu(frame, pdu, 0, None)?;
        Ok((frame, pdu))
    }

    pub fn add_ecu(&mut self, cluster: ClusterRef, mut ecu: Ecu) -> Result<EcuRef, DatabaseError> {
        self.cluster(cluster)?;
        if self.find_ecu(cluster, &ecu.name).is_some() {
            return Err(DatabaseError::DuplicateName { name: ecu.name });
        }
        ecu.cluster = cluster;
        let handle = EcuRef(next_handle(self.ecus.len()));
        self.ecus.push(ecu);
        self.clusters[cluster.index()].ecus.push(handle);
        Ok(handle)
    }

    /// Declare the frames `ecu` transmits and receives.
    pub fn set_ecu_frames(
        &mut self,
        ecu: EcuRef,
        tx: &[FrameRef],
        rx: &[FrameRef],
    ) -> Result<(), DatabaseError> {
        let cluster = self.ecu(ecu)?.cluster;
        for frame in tx.iter().chain(rx) {
            if self.frame(*frame)?.cluster != cluster {
                return Err(frame.invalid());
            }
        }
        let node = &mut self.ecus[ecu.index()];
        node.tx_frames = tx.to_vec();
        node.rx_frames = rx.to_vec();
        Ok(())
    }

    /// Add a LIN schedule table to `cluster`.
    pub fn add_schedule(
        &mut self,
        cluster: ClusterRef,
        mut schedule: LinSchedule,
    ) -> Result<ScheduleRef, DatabaseError> {
        let protocol = self.cluster(cluster)?.protocol;
        if protocol != Protocol::Lin {
            return Err(DatabaseError::ProtocolMismatch {
                object: schedule.name,
                protocol,
            });
        }
        if self.find_schedule(cluster, &schedule.name).is_some() {
            return Err(DatabaseError::DuplicateName {
                name: schedule.name,
            });
        }
        schedule.cluster = cluster;
        self.check_schedule_body(&schedule)?;
        let handle = ScheduleRef(next_handle(self.schedules.len()));
        self.schedules.push(schedule);
        self.clusters[cluster.index()].schedules.push(handle);
        Ok(handle)
    }

    //------------------------------------------------------------------------------GETTERS
    pub fn cluster(&self, handle: ClusterRef) -> Result<&Cluster, DatabaseError> {
        self.clusters.get(handle.index()).ok_or(handle.invalid())
    }

    pub fn frame(&self, handle: FrameRef) -> Result<&Frame, DatabaseError> {
        self.frames.get(handle.index()).ok_or(handle.invalid())
    }

    pub fn pdu(&self, handle: PduRef) -> Result<&Pdu, DatabaseError> {
        self.pdus.get(handle.index()).ok_or(handle.invalid())
    }

    pub fn signal(&self, handle: SignalRef) -> Result<&Signal, DatabaseError> {
        self.signals.get(handle.index()).ok_or(handle.invalid())
    }

    pub fn subframe(&self, handle: SubframeRef) -> Result<&Subframe, DatabaseError> {
        self.subframes.get(handle.index()).ok_or(handle.invalid())
    }

    pub fn ecu(&self, handle: EcuRef) -> Result<&Ecu, DatabaseError> {
        self.ecus.get(handle.index()).ok_or(handle.invalid())
    }

    pub fn schedule(&self, handle: ScheduleRef) -> Result<&LinSchedule, DatabaseError> {
        self.schedules.get(handle.index()).ok_or(handle.invalid())
    }

    pub fn cluster_mut(&mut self, handle: ClusterRef) -> Result<&mut Cluster, DatabaseError> {
        self.clusters.get_mut(handle.index()).ok_or(handle.invalid())
    }

    pub fn frame_mut(&mut self, handle: FrameRef) -> Result<&mut Frame, DatabaseError> {
        self.frames.get_mut(handle.index()).ok_or(handle.invalid())
    }

    pub fn pdu_mut(&mut self, handle: PduRef) -> Result<&mut Pdu, DatabaseError> {
        self.pdus.get_mut(handle.index()).ok_or(handle.invalid())
    }

    pub fn signal_mut(&mut self, handle: SignalRef) -> Result<&mut Signal, DatabaseError> {
        self.signals.get_mut(handle.index()).ok_or(handle.invalid())
    }

    pub fn subframe_mut(&mut self, handle: SubframeRef) -> Result<&mut Subframe, DatabaseError> {
        self.subframes.get_mut(handle.index()).ok_or(handle.invalid())
    }

    pub fn ecu_mut(&mut self, handle: EcuRef) -> Result<&mut Ecu, DatabaseError> {
        self.ecus.get_mut(handle.index()).ok_or(handle.invalid())
    }

    pub fn schedule_mut(&mut self, handle: ScheduleRef) -> Result<&mut LinSchedule, DatabaseError> {
        self.schedules.get_mut(handle.index()).ok_or(handle.invalid())
    }

    /// Handles of every cluster, in insertion order.
    pub fn clusters(&self) -> impl Iterator<Item = ClusterRef> + '_ {
        (0..self.clusters.len()).map(|i| ClusterRef(i as u32))
    }

    /// Protocol of the cluster owning `frame`.
    pub fn frame_protocol(&self, frame: FrameRef) -> Result<Protocol, DatabaseError> {
        Ok(self.cluster(self.frame(frame)?.cluster)?.protocol)
    }

    //------------------------------------------------------------------------------LOOKUPS
    pub fn find_cluster(&self, name: &str) -> Option<ClusterRef> {
        self.clusters
            .iter()
            .position(|c| c.name == name)
            .map(|i| ClusterRef(i as u32))
    }

    pub fn find_frame(&self, cluster: ClusterRef, name: &str) -> Option<FrameRef> {
        let cluster = self.clusters.get(cluster.index())?;
        cluster
            .frames
            .iter()
            .copied()
            .find(|f| self.frames[f.index()].name == name)
    }

    /// Frame of `cluster` carrying identifier `id`. For CAN clusters the
    /// identifier format must match as well.
    pub fn find_frame_by_id(
        &self,
        cluster: ClusterRef,
        id: u32,
        extended: bool,
    ) -> Option<FrameRef> {
        let owner = self.clusters.get(cluster.index())?;
        let check_format = matches!(owner.protocol, Protocol::Can | Protocol::J1939);
        owner.frames.iter().copied().find(|f| {
            let frame = &self.frames[f.index()];
            frame.id == id && (!check_format || frame.can_extended == extended)
        })
    }

    pub fn find_pdu(&self, cluster: ClusterRef, name: &str) -> Option<PduRef> {
        let cluster = self.clusters.get(cluster.index())?;
        cluster
            .pdus
            .iter()
            .copied()
            .find(|p| self.pdus[p.index()].name == name)
    }

    pub fn find_ecu(&self, cluster: ClusterRef, name: &str) -> Option<EcuRef> {
        let cluster = self.clusters.get(cluster.index())?;
        cluster
            .ecus
            .iter()
            .copied()
            .find(|e| self.ecus[e.index()].name == name)
    }

    pub fn find_schedule(&self, cluster: ClusterRef, name: &str) -> Option<ScheduleRef> {
        let cluster = self.clusters.get(cluster.index())?;
        cluster
            .schedules
            .iter()
            .copied()
            .find(|s| self.schedules[s.index()].name == name)
    }

    /// Every signal of `pdu`: static signals and selector first, then the
    /// dynamic signals of each subframe.
    pub fn pdu_signals(&self, pdu: PduRef) -> impl Iterator<Item = SignalRef> + '_ {
        let owner = self.pdus.get(pdu.index());
        let fixed = owner.map(|p| p.signals.as_slice()).unwrap_or(&[]);
        let subframes = owner
            .and_then(|p| p.mux.as_ref())
            .map(|m| m.subframes.as_slice())
            .unwrap_or(&[]);
        fixed.iter().copied().chain(
            subframes
                .iter()
                .flat_map(move |s| self.subframes[s.index()].signals.iter().copied()),
        )
    }

    /// Signal of `pdu` called `name`.
    pub fn find_signal(&self, pdu: PduRef, name: &str) -> Option<SignalRef> {
        self.pdu_signals(pdu)
            .find(|s| self.signals[s.index()].name == name)
    }

    /// Signal of `frame` called `name` together with the mapping of its PDU.
    pub fn find_frame_signal(&self, frame: FrameRef, name: &str) -> Option<(PduMapping, SignalRef)> {
        let frame = self.frames.get(frame.index())?;
        frame
            .pdus
            .iter()
            .find_map(|m| self.find_signal(m.pdu, name).map(|s| (*m, s)))
    }

    /// Every signal carried by `frame`, in mapping order.
    pub fn frame_signals(&self, frame: FrameRef) -> Vec<SignalRef> {
        let Some(frame) = self.frames.get(frame.index()) else {
            return Vec::new();
        };
        frame
            .pdus
            .iter()
            .flat_map(|m| self.pdu_signals(m.pdu))
            .collect()
    }

    /// Subframe of `pdu` selected by raw selector value `mux_value`.
    pub fn subframe_for(&self, pdu: PduRef, mux_value: u64) -> Option<SubframeRef> {
        let mux = self.pdus.get(pdu.index())?.mux.as_ref()?;
        mux.subframes
            .iter()
            .copied()
            .find(|s| self.subframes[s.index()].mux_value == mux_value)
    }

    //------------------------------------------------------------------------------VALIDATION
    /// Re-check every object, stopping at the first problem.
    pub fn validate(&self) -> Result<(), DatabaseError> {
        for cluster in &self.clusters {
            cluster.check()?;
        }
        for i in 0..self.frames.len() {
            self.check_frame(FrameRef(i as u32))?;
        }
        for i in 0..self.pdus.len() {
            self.check_pdu(PduRef(i as u32))?;
        }
        for i in 0..self.schedules.len() {
            self.check_schedule(ScheduleRef(i as u32))?;
        }
        Ok(())
    }

    /// Frame identifier, length and PDU placement.
    pub fn check_frame(&self, handle: FrameRef) -> Result<(), DatabaseError> {
        let frame = self.frame(handle)?;
        frame.check(self.cluster(frame.cluster)?.protocol)?;
        for mapping in &frame.pdus {
            let pdu = self.pdu(mapping.pdu)?;
            if mapping.byte_offset() + pdu.payload_len > frame.payload_len {
                return Err(DatabaseError::PduExceedsFrame {
                    pdu: pdu.name.clone(),
                    frame: frame.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// PDU length, signal placement and multiplexing.
    pub fn check_pdu(&self, handle: PduRef) -> Result<(), DatabaseError> {
        let pdu = self.pdu(handle)?;
        let protocol = self.cluster(pdu.cluster)?.protocol;
        if pdu.payload_len > protocol.max_payload() {
            return Err(DatabaseError::PayloadTooLarge {
                object: pdu.name.clone(),
                len: pdu.payload_len,
                max: protocol.max_payload(),
            });
        }
        for signal in self.pdu_signals(handle) {
            self.signal(signal)?.check(pdu.payload_len)?;
        }
        if let Some(mux) = &pdu.mux {
            if self.signal(mux.selector)?.data_type == DataType::Float {
                return Err(DatabaseError::InvalidMux {
                    pdu: pdu.name.clone(),
                    detail: "selector must be an integer signal",
                });
            }
        }
        Ok(())
    }

    /// Placement of one signal inside its PDU.
    pub fn check_signal(&self, handle: SignalRef) -> Result<(), DatabaseError> {
        let signal = self.signal(handle)?;
        signal.check(self.pdu(signal.pdu)?.payload_len)
    }

    pub fn check_schedule(&self, handle: ScheduleRef) -> Result<(), DatabaseError> {
        self.check_schedule_body(self.schedule(handle)?)
    }

    fn check_schedule_body(&self, schedule: &LinSchedule) -> Result<(), DatabaseError> {
        let invalid = |detail| DatabaseError::InvalidSchedule {
            schedule: schedule.name.clone(),
            detail,
        };
        if schedule.run_mode != RunMode::Null && schedule.entries.is_empty() {
            return Err(invalid("schedule has no entries"));
        }
        for entry in &schedule.entries {
            if entry.delay_us == 0 {
                return Err(invalid("entry delay must be positive"));
            }
            let frame_count_ok = match entry.kind {
                EntryType::Unconditional => entry.frames.len() == 1,
                EntryType::Sporadic | EntryType::EventTriggered => !entry.frames.is_empty(),
                EntryType::Diagnostic => true,
            };
            if !frame_count_ok {
                return Err(invalid("entry frame count does not match its type"));
            }
            for frame in &entry.frames {
                if self.frame(*frame)?.cluster != schedule.cluster {
                    return Err(frame.invalid());
                }
            }
            if let Some(collision) = entry.collision_resolving {
                self.schedule(collision)?;
            }
        }
        Ok(())
    }
}

//==================================================================================TEST_DATABASE
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
