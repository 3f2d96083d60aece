//! Generic typed property access.
//!
//! Every observable or settable attribute of the database model and of a
//! session is addressed by an `(ObjectRef, PropertyId)` pair and carries a
//! [`PropertyValue`] of the kind declared in the [`PROPERTIES`] table. The
//! table is the single source of truth for value kind, owning object class,
//! access direction and whether the property is frozen while a session
//! runs; the owners ([`crate::database::Database`] and
//! [`crate::session::Session`]) each expose one `get_property` /
//! `set_property` pair that checks the descriptor before dispatching.
//!
//! Durations travel as `f64` seconds, enumerations as their `u32` code and
//! object relations as [`ObjectRef`] values.
use alloc::string::String;
use alloc::vec::Vec;

use crate::database::{ClusterRef, EcuRef, FrameRef, PduRef, ScheduleRef, SignalRef, SubframeRef};
use crate::error::PropertyError;

mod database;

/// Marker for "no update bit" in `frame_pdu_update_bits`.
pub const NO_UPDATE_BIT: u32 = u32::MAX;

//==================================================================================VALUES
/// Kind of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValueKind {
    Bool,
    U32,
    U64,
    F64,
    String,
    Bytes,
    U32Array,
    StringArray,
    Ref,
    RefArray,
}

/// Typed property value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PropertyValue {
    Bool(bool),
    U32(u32),
    U64(u64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    U32Array(Vec<u32>),
    StringArray(Vec<String>),
    Ref(ObjectRef),
    RefArray(Vec<ObjectRef>),
}

impl PropertyValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            PropertyValue::Bool(_) => ValueKind::Bool,
            PropertyValue::U32(_) => ValueKind::U32,
            PropertyValue::U64(_) => ValueKind::U64,
            PropertyValue::F64(_) => ValueKind::F64,
            PropertyValue::String(_) => ValueKind::String,
            PropertyValue::Bytes(_) => ValueKind::Bytes,
            PropertyValue::U32Array(_) => ValueKind::U32Array,
            PropertyValue::StringArray(_) => ValueKind::StringArray,
            PropertyValue::Ref(_) => ValueKind::Ref,
            PropertyValue::RefArray(_) => ValueKind::RefArray,
        }
    }
}

macro_rules! value_conversions {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        $(
            impl From<$ty> for PropertyValue {
                fn from(value: $ty) -> Self {
                    PropertyValue::$variant(value)
                }
            }

            impl TryFrom<PropertyValue> for $ty {
                /// Kind of the rejected value.
                type Error = ValueKind;

                fn try_from(value: PropertyValue) -> Result<Self, ValueKind> {
                    match value {
                        PropertyValue::$variant(inner) => Ok(inner),
                        other => Err(other.kind()),
                    }
                }
            }
        )+
    };
}

value_conversions!(
    Bool(bool),
    U32(u32),
    U64(u64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    U32Array(Vec<u32>),
    StringArray(Vec<String>),
    Ref(ObjectRef),
    RefArray(Vec<ObjectRef>),
);

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(String::from(value))
    }
}

//==================================================================================OBJECTS
/// Class of object a property belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ObjectClass {
    Database,
    Cluster,
    Frame,
    Pdu,
    Signal,
    Subframe,
    Ecu,
    LinSchedule,
    LinScheduleEntry,
    Session,
    /// One frame of a session's frame list.
    SessionFrame,
}

/// Address of a property owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectRef {
    Database,
    Cluster(ClusterRef),
    Frame(FrameRef),
    Pdu(PduRef),
    Signal(SignalRef),
    Subframe(SubframeRef),
    Ecu(EcuRef),
    LinSchedule(ScheduleRef),
    LinScheduleEntry { schedule: ScheduleRef, entry: u32 },
    Session,
    /// Frame at this position of the session frame list.
    SessionFrame(u32),
}

impl ObjectRef {
    pub fn class(&self) -> ObjectClass {
        match self {
            ObjectRef::Database => ObjectClass::Database,
            ObjectRef::Cluster(_) => ObjectClass::Cluster,
            ObjectRef::Frame(_) => ObjectClass::Frame,
            ObjectRef::Pdu(_) => ObjectClass::Pdu,
            ObjectRef::Signal(_) => ObjectClass::Signal,
            ObjectRef::Subframe(_) => ObjectClass::Subframe,
            ObjectRef::Ecu(_) => ObjectClass::Ecu,
            ObjectRef::LinSchedule(_) => ObjectClass::LinSchedule,
            ObjectRef::LinScheduleEntry { .. } => ObjectClass::LinScheduleEntry,
            ObjectRef::Session => ObjectClass::Session,
            ObjectRef::SessionFrame(_) => ObjectClass::SessionFrame,
        }
    }
}

//==================================================================================DESCRIPTORS
/// Direction in which a property may be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub const fn readable(self) -> bool {
        !matches!(self, Access::Write)
    }

    pub const fn writable(self) -> bool {
        !matches!(self, Access::Read)
    }
}

/// Row of the property table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub id: PropertyId,
    /// Stable numeric identifier, `class << 8 | index`.
    pub code: u32,
    pub name: &'static str,
    pub class: ObjectClass,
    pub kind: ValueKind,
    pub access: Access,
    /// Writes are refused while the owning session runs.
    pub stopped_only: bool,
}

impl PropertyDescriptor {
    /// Check class and direction of an access.
    pub fn check(&self, object: &ObjectRef, write: bool) -> Result<(), PropertyError> {
        if object.class() != self.class {
            return Err(PropertyError::WrongClass {
                property: self.name,
                class: object.class(),
            });
        }
        match (write, self.access.readable(), self.access.writable()) {
            (false, false, _) => Err(PropertyError::WriteOnly { property: self.name }),
            (true, _, false) => Err(PropertyError::ReadOnly { property: self.name }),
            _ => Ok(()),
        }
    }

    /// Unwrap a value of the declared kind.
    pub fn extract<T>(&self, value: PropertyValue) -> Result<T, PropertyError>
    where
        T: TryFrom<PropertyValue, Error = ValueKind>,
    {
        T::try_from(value).map_err(|found| PropertyError::TypeMismatch {
            property: self.name,
            expected: self.kind,
            found,
        })
    }

    pub fn invalid(&self) -> PropertyError {
        PropertyError::InvalidValue { property: self.name }
    }
}

macro_rules! properties {
    ($(
        $(#[$meta:meta])*
        $id:ident = $code:literal, $name:literal, $class:ident, $kind:ident, $access:ident, $stopped:literal;
    )+) => {
        /// Identifier of every property of the engine.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub enum PropertyId {
            $($(#[$meta])* $id,)+
        }

        /// The property table, in [`PropertyId`] declaration order.
        pub static PROPERTIES: &[PropertyDescriptor] = &[
            $(PropertyDescriptor {
                id: PropertyId::$id,
                code: $code,
                name: $name,
                class: ObjectClass::$class,
                kind: ValueKind::$kind,
                access: Access::$access,
                stopped_only: $stopped,
            },)+
        ];

        impl PropertyId {
            pub fn descriptor(self) -> &'static PropertyDescriptor {
                &PROPERTIES[self as usize]
            }

            pub fn code(self) -> u32 {
                self.descriptor().code
            }

            pub fn from_code(code: u32) -> Option<Self> {
                PROPERTIES.iter().find(|d| d.code == code).map(|d| d.id)
            }

            pub fn from_name(name: &str) -> Option<Self> {
                PROPERTIES.iter().find(|d| d.name == name).map(|d| d.id)
            }

            pub fn name(self) -> &'static str {
                self.descriptor().name
            }
        }
    };
}

properties! {
    DatabaseName = 0x0001, "database_name", Database, String, Read, false;
    DatabaseClusters = 0x0002, "database_clst_refs", Database, RefArray, Read, false;

    ClusterName = 0x0101, "cluster_name", Cluster, String, ReadWrite, false;
    ClusterProtocol = 0x0102, "cluster_protocol", Cluster, U32, Read, false;
    ClusterBaudRate = 0x0103, "cluster_baud_rate64", Cluster, U64, ReadWrite, false;
    ClusterCanFdBaudRate = 0x0104, "cluster_can_fd_baud_rate64", Cluster, U64, ReadWrite, false;
    ClusterComment = 0x0105, "cluster_comment", Cluster, String, ReadWrite, false;
    ClusterConfigStatus = 0x0106, "cluster_config_status", Cluster, U32, Read, false;
    ClusterDatabase = 0x0107, "cluster_database_ref", Cluster, Ref, Read, false;
    ClusterFrames = 0x0108, "cluster_frm_refs", Cluster, RefArray, Read, false;
    ClusterPdus = 0x0109, "cluster_pdu_refs", Cluster, RefArray, Read, false;
    ClusterSignals = 0x010A, "cluster_sig_refs", Cluster, RefArray, Read, false;
    ClusterEcus = 0x010B, "cluster_ecu_refs", Cluster, RefArray, Read, false;
    ClusterLinSchedules = 0x010C, "cluster_lin_schedules", Cluster, RefArray, Read, false;
    /// Seconds.
    ClusterLinTick = 0x010D, "cluster_lin_tick", Cluster, F64, ReadWrite, false;
    /// Microseconds.
    ClusterFlexRayCycle = 0x010E, "cluster_flex_ray_cycle", Cluster, U32, ReadWrite, false;
    ClusterFlexRayStaticSlotCount = 0x010F, "cluster_flex_ray_num_stat_slt", Cluster, U32, ReadWrite, false;
    /// Microseconds.
    ClusterFlexRayStaticSlot = 0x0110, "cluster_flex_ray_stat_slot", Cluster, U32, ReadWrite, false;
    ClusterFlexRayMinislotCount = 0x0111, "cluster_flex_ray_num_minislt", Cluster, U32, ReadWrite, false;
    /// Microseconds.
    ClusterFlexRayMinislot = 0x0112, "cluster_flex_ray_minislot", Cluster, U32, ReadWrite, false;
    /// Microseconds.
    ClusterFlexRayNit = 0x0113, "cluster_flex_ray_nit", Cluster, U32, ReadWrite, false;

    FrameName = 0x0201, "frame_name", Frame, String, ReadWrite, false;
    FrameId = 0x0202, "frame_id", Frame, U32, ReadWrite, false;
    FrameCanExtendedId = 0x0203, "frame_can_ext_id", Frame, Bool, ReadWrite, false;
    FramePayloadLen = 0x0204, "frame_payload_len", Frame, U32, ReadWrite, false;
    FrameVariablePayload = 0x0205, "frame_variable_payload", Frame, Bool, ReadWrite, false;
    FrameDefaultPayload = 0x0206, "frame_default_payload", Frame, Bytes, ReadWrite, false;
    FrameComment = 0x0207, "frame_comment", Frame, String, ReadWrite, false;
    FrameConfigStatus = 0x0208, "frame_config_status", Frame, U32, Read, false;
    FrameCluster = 0x0209, "frame_cluster_ref", Frame, Ref, Read, false;
    FramePdus = 0x020A, "frame_pdu_refs", Frame, RefArray, Read, false;
    FramePduStartBits = 0x020B, "frame_pdu_start_bits", Frame, U32Array, Read, false;
    FramePduUpdateBits = 0x020C, "frame_pdu_update_bits", Frame, U32Array, Read, false;
    FrameSignals = 0x020D, "frame_sig_refs", Frame, RefArray, Read, false;
    FrameMuxIsMuxed = 0x020E, "frame_mux_is_muxed", Frame, Bool, Read, false;
    FrameCanTimingType = 0x020F, "frame_can_timing_type", Frame, U32, ReadWrite, false;
    /// Seconds.
    FrameCanTxTime = 0x0210, "frame_can_tx_time", Frame, F64, ReadWrite, false;
    FrameFlexRayBaseCycle = 0x0211, "frame_flex_ray_base_cycle", Frame, U32, ReadWrite, false;
    FrameFlexRayCycleRep = 0x0212, "frame_flex_ray_cycle_rep", Frame, U32, ReadWrite, false;
    FrameFlexRayChannelAssign = 0x0213, "frame_flex_ray_ch_assign", Frame, U32, ReadWrite, false;
    FrameLinChecksum = 0x0214, "frame_lin_checksum", Frame, U32, ReadWrite, false;

    PduName = 0x0301, "pdu_name", Pdu, String, ReadWrite, false;
    PduPayloadLen = 0x0302, "pdu_payload_len", Pdu, U32, ReadWrite, false;
    PduDefaultPayload = 0x0303, "pdu_default_payload", Pdu, Bytes, ReadWrite, false;
    PduComment = 0x0304, "pdu_comment", Pdu, String, ReadWrite, false;
    PduConfigStatus = 0x0305, "pdu_config_status", Pdu, U32, Read, false;
    PduCluster = 0x0306, "pdu_cluster_ref", Pdu, Ref, Read, false;
    PduFrames = 0x0307, "pdu_frm_refs", Pdu, RefArray, Read, false;
    PduSignals = 0x0308, "pdu_sig_refs", Pdu, RefArray, Read, false;
    PduMuxIsMuxed = 0x0309, "pdu_mux_is_muxed", Pdu, Bool, Read, false;
    PduMuxSelector = 0x030A, "pdu_mux_data_mux_sig_ref", Pdu, Ref, Read, false;
    PduMuxStaticSignals = 0x030B, "pdu_mux_static_sig_refs", Pdu, RefArray, Read, false;
    PduMuxSubframes = 0x030C, "pdu_mux_subframe_refs", Pdu, RefArray, Read, false;

    SignalName = 0x0401, "signal_name", Signal, String, ReadWrite, false;
    SignalStartBit = 0x0402, "signal_start_bit", Signal, U32, ReadWrite, false;
    SignalNumBits = 0x0403, "signal_num_bits", Signal, U32, ReadWrite, false;
    SignalByteOrder = 0x0404, "signal_byte_ordr", Signal, U32, ReadWrite, false;
    SignalDataType = 0x0405, "signal_data_type", Signal, U32, ReadWrite, false;
    SignalScaleFactor = 0x0406, "signal_scale_fac", Signal, F64, ReadWrite, false;
    SignalScaleOffset = 0x0407, "signal_scale_off", Signal, F64, ReadWrite, false;
    SignalMin = 0x0408, "signal_min", Signal, F64, ReadWrite, false;
    SignalMax = 0x0409, "signal_max", Signal, F64, ReadWrite, false;
    SignalUnit = 0x040A, "signal_unit", Signal, String, ReadWrite, false;
    SignalDefault = 0x040B, "signal_default", Signal, F64, ReadWrite, false;
    SignalComment = 0x040C, "signal_comment", Signal, String, ReadWrite, false;
    SignalConfigStatus = 0x040D, "signal_config_status", Signal, U32, Read, false;
    SignalPdu = 0x040E, "signal_pdu_ref", Signal, Ref, Read, false;
    SignalFrame = 0x040F, "signal_frame_ref", Signal, Ref, Read, false;
    SignalMuxIsSelector = 0x0410, "signal_mux_is_data_mux", Signal, Bool, Read, false;
    SignalMuxIsDynamic = 0x0411, "signal_mux_is_dynamic", Signal, Bool, Read, false;
    SignalMuxValue = 0x0412, "signal_mux_value", Signal, U32, Read, false;
    SignalMuxSubframe = 0x0413, "signal_mux_subfrm_ref", Signal, Ref, Read, false;

    SubframeName = 0x0501, "subframe_name", Subframe, String, ReadWrite, false;
    SubframeMuxValue = 0x0502, "subframe_mux_value", Subframe, U32, ReadWrite, false;
    SubframeSignals = 0x0503, "subframe_dyn_sig_refs", Subframe, RefArray, Read, false;
    SubframePdu = 0x0504, "subframe_pdu_ref", Subframe, Ref, Read, false;
    SubframeConfigStatus = 0x0505, "subframe_config_status", Subframe, U32, Read, false;

    EcuName = 0x0601, "ecu_name", Ecu, String, ReadWrite, false;
    EcuComment = 0x0602, "ecu_comment", Ecu, String, ReadWrite, false;
    EcuConfigStatus = 0x0603, "ecu_config_status", Ecu, U32, Read, false;
    EcuCluster = 0x0604, "ecu_clst_ref", Ecu, Ref, Read, false;
    EcuTxFrames = 0x0605, "ecu_tx_frm_refs", Ecu, RefArray, ReadWrite, false;
    EcuRxFrames = 0x0606, "ecu_rx_frm_refs", Ecu, RefArray, ReadWrite, false;
    EcuFlexRayColdstart = 0x0607, "ecu_flex_ray_is_coldstart", Ecu, Bool, ReadWrite, false;
    /// Channel code, 0 when the node has no wakeup channel.
    EcuFlexRayWakeupChannels = 0x0608, "ecu_flex_ray_wakeup_chs", Ecu, U32, ReadWrite, false;
    EcuLinMaster = 0x0609, "ecu_lin_master", Ecu, Bool, ReadWrite, false;
    EcuLinProtocolVersion = 0x060A, "ecu_lin_protocol_ver", Ecu, U32, ReadWrite, false;
    EcuLinInitialNad = 0x060B, "ecu_lin_initial_nad", Ecu, U32, ReadWrite, false;
    EcuLinConfigNad = 0x060C, "ecu_lin_config_nad", Ecu, U32, ReadWrite, false;
    EcuLinSupplierId = 0x060D, "ecu_lin_supplier_id", Ecu, U32, ReadWrite, false;
    EcuLinFunctionId = 0x060E, "ecu_lin_function_id", Ecu, U32, ReadWrite, false;
    /// Seconds.
    EcuLinP2Min = 0x060F, "ecu_linp_2min", Ecu, F64, ReadWrite, false;
    /// Seconds.
    EcuLinStMin = 0x0610, "ecu_lins_tmin", Ecu, F64, ReadWrite, false;
    EcuJ1939PreferredAddress = 0x0611, "ecu_j1939_preferred_address", Ecu, U32, ReadWrite, false;
    EcuJ1939NodeName = 0x0612, "ecu_j1939_node_name", Ecu, U64, ReadWrite, false;

    LinSchedName = 0x0701, "lin_sched_name", LinSchedule, String, ReadWrite, false;
    LinSchedPriority = 0x0702, "lin_sched_priority", LinSchedule, U32, ReadWrite, false;
    LinSchedRunMode = 0x0703, "lin_sched_run_mode", LinSchedule, U32, ReadWrite, false;
    LinSchedEntries = 0x0704, "lin_sched_entries", LinSchedule, RefArray, Read, false;
    LinSchedCluster = 0x0705, "lin_sched_clst_ref", LinSchedule, Ref, Read, false;
    LinSchedConfigStatus = 0x0706, "lin_sched_config_status", LinSchedule, U32, Read, false;

    LinSchedEntryName = 0x0801, "lin_sched_entry_name", LinScheduleEntry, String, ReadWrite, false;
    LinSchedEntryType = 0x0802, "lin_sched_entry_type", LinScheduleEntry, U32, ReadWrite, false;
    LinSchedEntryFrames = 0x0803, "lin_sched_entry_frames", LinScheduleEntry, RefArray, ReadWrite, false;
    /// Seconds.
    LinSchedEntryDelay = 0x0804, "lin_sched_entry_delay", LinScheduleEntry, F64, ReadWrite, false;
    LinSchedEntryEventId = 0x0805, "lin_sched_entry_event_id", LinScheduleEntry, U32, ReadWrite, false;
    LinSchedEntryCollisionResSched = 0x0806, "lin_sched_entry_collision_res_sched", LinScheduleEntry, Ref, Read, false;
    LinSchedEntrySched = 0x0807, "lin_sched_entry_sched", LinScheduleEntry, Ref, Read, false;

    SessionMode = 0x1001, "session_mode", Session, U32, Read, false;
    SessionProtocol = 0x1002, "session_protocol", Session, U32, Read, false;
    SessionState = 0x1003, "session_state", Session, U32, Read, false;
    SessionDatabaseName = 0x1004, "session_database_name", Session, String, Read, false;
    SessionClusterName = 0x1005, "session_cluster_name", Session, String, Read, false;
    SessionList = 0x1006, "session_list", Session, StringArray, Read, false;
    SessionNumFrames = 0x1007, "session_num_frames", Session, U32, Read, false;
    SessionNumInList = 0x1008, "session_num_in_list", Session, U32, Read, false;
    SessionNumPend = 0x1009, "session_num_pend", Session, U32, Read, false;
    SessionNumUnused = 0x100A, "session_num_unused", Session, U32, Read, false;
    SessionNumOverflow = 0x100B, "session_num_overflow", Session, U32, Read, false;
    SessionPayldLenMax = 0x100C, "session_payld_len_max", Session, U32, Read, false;
    SessionQueueSize = 0x100D, "session_queue_size", Session, U32, ReadWrite, true;
    SessionAutoStart = 0x100E, "session_auto_start", Session, Bool, ReadWrite, false;
    SessionSkipNCyclicFrames = 0x100F, "session_skip_n_cyclic_frames", Session, U32, Write, false;
    SessionIntfName = 0x1010, "session_intf_name", Session, String, Read, false;
    SessionIntfBaudRate = 0x1011, "session_intf_baud_rate64", Session, U64, ReadWrite, true;
    SessionIntfCanFdBaudRate = 0x1012, "session_intf_can_fd_baud_rate64", Session, U64, ReadWrite, true;
    SessionIntfCanTerm = 0x1013, "session_intf_can_term", Session, U32, ReadWrite, true;
    SessionIntfCanTransmitPause = 0x1014, "session_intf_can_transmit_pause", Session, Bool, ReadWrite, true;
    SessionIntfCanListenOnly = 0x1015, "session_intf_can_lstn_only", Session, Bool, ReadWrite, true;
    SessionIntfEchoTx = 0x1016, "session_intf_echo_tx", Session, Bool, ReadWrite, true;
    SessionIntfLinMaster = 0x1017, "session_intf_lin_master", Session, Bool, ReadWrite, true;
    SessionIntfLinTerm = 0x1018, "session_intf_lin_term", Session, U32, ReadWrite, true;
    SessionIntfLinSchedNames = 0x1019, "session_intf_lin_sched_names", Session, StringArray, Read, false;
    SessionJ1939Address = 0x1020, "session_j1939_address", Session, U32, ReadWrite, false;
    SessionJ1939Name = 0x1021, "session_j1939_name", Session, U64, ReadWrite, false;
    SessionJ1939EcuBusy = 0x1022, "session_j1939ecu_busy", Session, Bool, ReadWrite, false;
    /// Seconds.
    SessionJ1939TimeoutT1 = 0x1023, "session_j1939_timeout_t1", Session, F64, ReadWrite, false;
    /// Seconds.
    SessionJ1939TimeoutT2 = 0x1024, "session_j1939_timeout_t2", Session, F64, ReadWrite, false;
    /// Seconds.
    SessionJ1939TimeoutT3 = 0x1025, "session_j1939_timeout_t3", Session, F64, ReadWrite, false;
    /// Seconds.
    SessionJ1939TimeoutT4 = 0x1026, "session_j1939_timeout_t4", Session, F64, ReadWrite, false;
    /// Seconds.
    SessionJ1939ResponseTimeTr = 0x1027, "session_j1939_response_time_tr", Session, F64, ReadWrite, false;
    /// Seconds.
    SessionJ1939HoldTimeTh = 0x1028, "session_j1939_hold_time_th", Session, F64, ReadWrite, false;
    SessionJ1939MaxRepeatCts = 0x1029, "session_j1939_max_repeat_cts", Session, U32, ReadWrite, false;
    SessionJ1939NumPacketsRecv = 0x102A, "session_j1939_num_packets_recv", Session, U32, ReadWrite, false;
    SessionJ1939NumPacketsResp = 0x102B, "session_j1939_num_packets_resp", Session, U32, ReadWrite, false;
    SessionJ1939FillByte = 0x102C, "session_j1939_fill_byte", Session, U32, ReadWrite, false;
    SessionJ1939WriteQueueSize = 0x102D, "session_j1939_write_queue_size", Session, U32, ReadWrite, true;

    /// Seconds.
    SessionCanTxTime = 0x1101, "session_can_tx_time", SessionFrame, F64, ReadWrite, true;
    /// Seconds.
    SessionCanStartTimeOff = 0x1102, "session_can_start_time_off", SessionFrame, F64, ReadWrite, true;
    SessionFrameLatestValue = 0x1103, "session_frame_latest_value", SessionFrame, Bool, ReadWrite, true;
}
