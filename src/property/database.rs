//! Property access on the database model.
use alloc::string::String;
use alloc::vec::Vec;

use super::{ObjectRef, PropertyDescriptor, PropertyId, PropertyValue, NO_UPDATE_BIT};
use crate::core::{
    duration_as_secs_f64, duration_from_secs_f64, ByteOrder, DataType, FlexRayChannel,
};
use crate::database::{
    ClusterRef, Database, EcuRef, EntryType, FrameRef, LinChecksum, LinScheduleEntry, MuxRole,
    RunMode, ScheduleRef, TimingType,
};
use crate::error::{DatabaseError, PropertyError};

use embassy_time::Duration;

fn refs<T: Copy>(handles: &[T], wrap: fn(T) -> ObjectRef) -> PropertyValue {
    PropertyValue::RefArray(handles.iter().copied().map(wrap).collect())
}

fn micros_as_secs(us: u32) -> f64 {
    duration_as_secs_f64(Duration::from_micros(us as u64))
}

fn secs_as_micros(desc: &PropertyDescriptor, seconds: f64) -> Result<u32, PropertyError> {
    u32::try_from(duration_from_secs_f64(seconds).as_micros()).map_err(|_| desc.invalid())
}

fn narrow<T: TryFrom<u32>>(desc: &PropertyDescriptor, value: u32) -> Result<T, PropertyError> {
    T::try_from(value).map_err(|_| desc.invalid())
}

fn frame_refs(desc: &PropertyDescriptor, value: Vec<ObjectRef>) -> Result<Vec<FrameRef>, PropertyError> {
    value
        .into_iter()
        .map(|r| match r {
            ObjectRef::Frame(frame) => Ok(frame),
            _ => Err(desc.invalid()),
        })
        .collect()
}

fn status(result: Result<(), DatabaseError>) -> PropertyValue {
    PropertyValue::U32(result.err().map_or(0, |e| e.code()))
}

impl Database {
    //------------------------------------------------------------------------------PROPERTIES
    /// Read property `id` of `object`.
    pub fn get_property(&self, object: ObjectRef, id: PropertyId) -> Result<PropertyValue, PropertyError> {
        let desc = id.descriptor();
        desc.check(&object, false)?;
        use PropertyId as P;
        let value: PropertyValue = match object {
            ObjectRef::Database => match id {
                P::DatabaseName => self.name.clone().into(),
                _ => PropertyValue::RefArray(self.clusters().map(ObjectRef::Cluster).collect()),
            },
            ObjectRef::Cluster(handle) => {
                let cluster = self.cluster(handle)?;
                match id {
                    P::ClusterName => cluster.name.clone().into(),
                    P::ClusterProtocol => cluster.protocol.code().into(),
                    P::ClusterBaudRate => cluster.baud_rate.into(),
                    P::ClusterCanFdBaudRate => cluster.can_fd_baud_rate.into(),
                    P::ClusterComment => cluster.comment.clone().into(),
                    P::ClusterConfigStatus => status(self.check_cluster(handle)),
                    P::ClusterDatabase => ObjectRef::Database.into(),
                    P::ClusterFrames => refs(cluster.frames(), ObjectRef::Frame),
                    P::ClusterPdus => refs(cluster.pdus(), ObjectRef::Pdu),
                    P::ClusterSignals => PropertyValue::RefArray(
                        cluster
                            .pdus()
                            .iter()
                            .flat_map(|p| self.pdu_signals(*p))
                            .map(ObjectRef::Signal)
                            .collect(),
                    ),
                    P::ClusterEcus => refs(cluster.ecus(), ObjectRef::Ecu),
                    P::ClusterLinSchedules => refs(cluster.schedules(), ObjectRef::LinSchedule),
                    P::ClusterLinTick => micros_as_secs(cluster.lin_tick_us).into(),
                    P::ClusterFlexRayCycle => cluster.flexray.cycle_us.into(),
                    P::ClusterFlexRayStaticSlotCount => (cluster.flexray.static_slot_count as u32).into(),
                    P::ClusterFlexRayStaticSlot => cluster.flexray.static_slot_us.into(),
                    P::ClusterFlexRayMinislotCount => (cluster.flexray.minislot_count as u32).into(),
                    P::ClusterFlexRayMinislot => cluster.flexray.minislot_us.into(),
                    _ => cluster.flexray.network_idle_us.into(),
                }
            }
            ObjectRef::Frame(handle) => {
                let frame = self.frame(handle)?;
                match id {
                    P::FrameName => frame.name.clone().into(),
                    P::FrameId => frame.id.into(),
                    P::FrameCanExtendedId => frame.can_extended.into(),
                    P::FramePayloadLen => (frame.payload_len as u32).into(),
                    P::FrameVariablePayload => frame.variable_payload.into(),
                    P::FrameDefaultPayload => frame.default_payload.clone().into(),
                    P::FrameComment => frame.comment.clone().into(),
                    P::FrameConfigStatus => status(self.check_frame(handle)),
                    P::FrameCluster => ObjectRef::Cluster(frame.cluster()).into(),
                    P::FramePdus => PropertyValue::RefArray(
                        frame.pdu_mappings().iter().map(|m| ObjectRef::Pdu(m.pdu)).collect(),
                    ),
                    P::FramePduStartBits => PropertyValue::U32Array(
                        frame.pdu_mappings().iter().map(|m| m.start_bit as u32).collect(),
                    ),
                    P::FramePduUpdateBits => PropertyValue::U32Array(
                        frame
                            .pdu_mappings()
                            .iter()
                            .map(|m| m.update_bit.map_or(NO_UPDATE_BIT, u32::from))
                            .collect(),
                    ),
                    P::FrameSignals => refs(&self.frame_signals(handle), ObjectRef::Signal),
                    P::FrameMuxIsMuxed => frame
                        .pdu_mappings()
                        .iter()
                        .any(|m| self.pdu(m.pdu).map_or(false, |p| p.is_muxed()))
                        .into(),
                    P::FrameCanTimingType => frame.timing.code().into(),
                    P::FrameCanTxTime => micros_as_secs(frame.tx_time_us).into(),
                    P::FrameFlexRayBaseCycle => (frame.flexray.base_cycle as u32).into(),
                    P::FrameFlexRayCycleRep => (frame.flexray.cycle_repetition as u32).into(),
                    P::FrameFlexRayChannelAssign => frame.flexray.channels.code().into(),
                    _ => frame.lin_checksum.code().into(),
                }
            }
            ObjectRef::Pdu(handle) => {
                let pdu = self.pdu(handle)?;
                match id {
                    P::PduName => pdu.name.clone().into(),
                    P::PduPayloadLen => (pdu.payload_len as u32).into(),
                    P::PduDefaultPayload => pdu.default_payload.clone().into(),
                    P::PduComment => pdu.comment.clone().into(),
                    P::PduConfigStatus => status(self.check_pdu(handle)),
                    P::PduCluster => ObjectRef::Cluster(pdu.cluster()).into(),
                    P::PduFrames => refs(pdu.frames(), ObjectRef::Frame),
                    P::PduSignals => PropertyValue::RefArray(
                        self.pdu_signals(handle).map(ObjectRef::Signal).collect(),
                    ),
                    P::PduMuxIsMuxed => pdu.is_muxed().into(),
                    P::PduMuxSelector => match pdu.mux() {
                        Some(mux) => ObjectRef::Signal(mux.selector).into(),
                        None => return Err(desc.invalid()),
                    },
                    P::PduMuxStaticSignals => PropertyValue::RefArray(
                        pdu.signals()
                            .iter()
                            .copied()
                            .filter(|s| pdu.mux().map_or(true, |m| m.selector != *s))
                            .map(ObjectRef::Signal)
                            .collect(),
                    ),
                    _ => PropertyValue::RefArray(
                        pdu.mux()
                            .map(|m| m.subframes.iter().copied().map(ObjectRef::Subframe).collect())
                            .unwrap_or_default(),
                    ),
                }
            }
            ObjectRef::Signal(handle) => {
                let signal = self.signal(handle)?;
                match id {
                    P::SignalName => signal.name.clone().into(),
                    P::SignalStartBit => (signal.start_bit as u32).into(),
                    P::SignalNumBits => (signal.num_bits as u32).into(),
                    P::SignalByteOrder => signal.byte_order.code().into(),
                    P::SignalDataType => signal.data_type.code().into(),
                    P::SignalScaleFactor => signal.scale_fac.into(),
                    P::SignalScaleOffset => signal.scale_off.into(),
                    P::SignalMin => signal.min.into(),
                    P::SignalMax => signal.max.into(),
                    P::SignalUnit => signal.unit.clone().into(),
                    P::SignalDefault => signal.default.into(),
                    P::SignalComment => signal.comment.clone().into(),
                    P::SignalConfigStatus => status(self.check_signal(handle)),
                    P::SignalPdu => ObjectRef::Pdu(signal.pdu()).into(),
                    P::SignalFrame => match self.pdu(signal.pdu())?.frames().first() {
                        Some(frame) => ObjectRef::Frame(*frame).into(),
                        None => return Err(desc.invalid()),
                    },
                    P::SignalMuxIsSelector => (signal.mux_role() == MuxRole::Selector).into(),
                    P::SignalMuxIsDynamic => matches!(signal.mux_role(), MuxRole::Dynamic(_)).into(),
                    P::SignalMuxValue => match signal.mux_role() {
                        MuxRole::Dynamic(subframe) => u32::try_from(self.subframe(subframe)?.mux_value)
                            .map_err(|_| desc.invalid())?
                            .into(),
                        _ => 0u32.into(),
                    },
                    _ => match signal.mux_role() {
                        MuxRole::Dynamic(subframe) => ObjectRef::Subframe(subframe).into(),
                        _ => return Err(desc.invalid()),
                    },
                }
            }
            ObjectRef::Subframe(handle) => {
                let subframe = self.subframe(handle)?;
                match id {
                    P::SubframeName => subframe.name.clone().into(),
                    P::SubframeMuxValue => u32::try_from(subframe.mux_value)
                        .map_err(|_| desc.invalid())?
                        .into(),
                    P::SubframeSignals => refs(subframe.signals(), ObjectRef::Signal),
                    P::SubframePdu => ObjectRef::Pdu(subframe.pdu()).into(),
                    _ => status(self.check_pdu(subframe.pdu())),
                }
            }
            ObjectRef::Ecu(handle) => {
                let ecu = self.ecu(handle)?;
                match id {
                    P::EcuName => ecu.name.clone().into(),
                    P::EcuComment => ecu.comment.clone().into(),
                    P::EcuConfigStatus => status(self.check_ecu(handle)),
                    P::EcuCluster => ObjectRef::Cluster(ecu.cluster()).into(),
                    P::EcuTxFrames => refs(ecu.tx_frames(), ObjectRef::Frame),
                    P::EcuRxFrames => refs(ecu.rx_frames(), ObjectRef::Frame),
                    P::EcuFlexRayColdstart => ecu.flexray.coldstart.into(),
                    P::EcuFlexRayWakeupChannels => {
                        ecu.flexray.wakeup_channel.map_or(0, FlexRayChannel::code).into()
                    }
                    P::EcuLinMaster => ecu.lin.master.into(),
                    P::EcuLinProtocolVersion => (ecu.lin.protocol_version as u32).into(),
                    P::EcuLinInitialNad => (ecu.lin.initial_nad as u32).into(),
                    P::EcuLinConfigNad => (ecu.lin.configured_nad as u32).into(),
                    P::EcuLinSupplierId => (ecu.lin.supplier_id as u32).into(),
                    P::EcuLinFunctionId => (ecu.lin.function_id as u32).into(),
                    P::EcuLinP2Min => micros_as_secs(ecu.lin.p2_min_us).into(),
                    P::EcuLinStMin => micros_as_secs(ecu.lin.st_min_us).into(),
                    P::EcuJ1939PreferredAddress => (ecu.j1939.preferred_address as u32).into(),
                    _ => ecu.j1939.name.into(),
                }
            }
            ObjectRef::LinSchedule(handle) => {
                let schedule = self.schedule(handle)?;
                match id {
                    P::LinSchedName => schedule.name.clone().into(),
                    P::LinSchedPriority => (schedule.priority as u32).into(),
                    P::LinSchedRunMode => schedule.run_mode.code().into(),
                    P::LinSchedEntries => PropertyValue::RefArray(
                        (0..schedule.entries.len() as u32)
                            .map(|entry| ObjectRef::LinScheduleEntry {
                                schedule: handle,
                                entry,
                            })
                            .collect(),
                    ),
                    P::LinSchedCluster => ObjectRef::Cluster(schedule.cluster()).into(),
                    _ => status(self.check_schedule(handle)),
                }
            }
            ObjectRef::LinScheduleEntry { schedule, entry } => {
                let owner = self.schedule(schedule)?;
                let row = schedule_entry(&owner.entries, entry)?;
                match id {
                    P::LinSchedEntryName => row.name.clone().into(),
                    P::LinSchedEntryType => row.kind.code().into(),
                    P::LinSchedEntryFrames => refs(&row.frames, ObjectRef::Frame),
                    P::LinSchedEntryDelay => micros_as_secs(row.delay_us).into(),
                    P::LinSchedEntryEventId => (row.event_id as u32).into(),
                    P::LinSchedEntryCollisionResSched => match row.collision_resolving {
                        Some(handle) => ObjectRef::LinSchedule(handle).into(),
                        None => return Err(desc.invalid()),
                    },
                    _ => ObjectRef::LinSchedule(schedule).into(),
                }
            }
            ObjectRef::Session | ObjectRef::SessionFrame(_) => {
                return Err(PropertyError::WrongClass {
                    property: desc.name,
                    class: object.class(),
                })
            }
        };
        Ok(value)
    }

    /// Write property `id` of `object`.
    ///
    /// Values are checked for kind and domain; cross-object consistency is
    /// reported afterwards through the `*_config_status` properties.
    pub fn set_property(
        &mut self,
        object: ObjectRef,
        id: PropertyId,
        value: PropertyValue,
    ) -> Result<(), PropertyError> {
        let desc = id.descriptor();
        desc.check(&object, true)?;
        use PropertyId as P;
        match object {
            ObjectRef::Cluster(handle) => {
                if id == P::ClusterName {
                    let name: String = desc.extract(value)?;
                    if self.find_cluster(&name).is_some_and(|c| c != handle) {
                        return Err(DatabaseError::DuplicateName { name }.into());
                    }
                    self.cluster_mut(handle)?.name = name;
                    return Ok(());
                }
                let cluster = self.cluster_mut(handle)?;
                match id {
                    P::ClusterBaudRate => cluster.baud_rate = desc.extract(value)?,
                    P::ClusterCanFdBaudRate => cluster.can_fd_baud_rate = desc.extract(value)?,
                    P::ClusterComment => cluster.comment = desc.extract(value)?,
                    P::ClusterLinTick => {
                        cluster.lin_tick_us = secs_as_micros(desc, desc.extract(value)?)?
                    }
                    P::ClusterFlexRayCycle => cluster.flexray.cycle_us = desc.extract(value)?,
                    P::ClusterFlexRayStaticSlotCount => {
                        cluster.flexray.static_slot_count = narrow(desc, desc.extract(value)?)?
                    }
                    P::ClusterFlexRayStaticSlot => cluster.flexray.static_slot_us = desc.extract(value)?,
                    P::ClusterFlexRayMinislotCount => {
                        cluster.flexray.minislot_count = narrow(desc, desc.extract(value)?)?
                    }
                    P::ClusterFlexRayMinislot => cluster.flexray.minislot_us = desc.extract(value)?,
                    _ => cluster.flexray.network_idle_us = desc.extract(value)?,
                }
            }
            ObjectRef::Frame(handle) => {
                if id == P::FrameName {
                    let name: String = desc.extract(value)?;
                    let cluster = self.frame(handle)?.cluster();
                    if self.find_frame(cluster, &name).is_some_and(|f| f != handle) {
                        return Err(DatabaseError::DuplicateName { name }.into());
                    }
                    self.frame_mut(handle)?.name = name;
                    return Ok(());
                }
                let frame = self.frame_mut(handle)?;
                match id {
                    P::FrameId => frame.id = desc.extract(value)?,
                    P::FrameCanExtendedId => frame.can_extended = desc.extract(value)?,
                    P::FramePayloadLen => {
                        let len: u32 = desc.extract(value)?;
                        frame.payload_len = len as usize;
                    }
                    P::FrameVariablePayload => frame.variable_payload = desc.extract(value)?,
                    P::FrameDefaultPayload => frame.default_payload = desc.extract(value)?,
                    P::FrameComment => frame.comment = desc.extract(value)?,
                    P::FrameCanTimingType => {
                        frame.timing = TimingType::from_code(desc.extract(value)?)
                            .ok_or(desc.invalid())?
                    }
                    P::FrameCanTxTime => frame.tx_time_us = secs_as_micros(desc, desc.extract(value)?)?,
                    P::FrameFlexRayBaseCycle => {
                        frame.flexray.base_cycle = narrow(desc, desc.extract(value)?)?
                    }
                    P::FrameFlexRayCycleRep => {
                        frame.flexray.cycle_repetition = narrow(desc, desc.extract(value)?)?
                    }
                    P::FrameFlexRayChannelAssign => {
                        frame.flexray.channels = FlexRayChannel::from_code(desc.extract(value)?)
                            .ok_or(desc.invalid())?
                    }
                    _ => {
                        frame.lin_checksum = LinChecksum::from_code(desc.extract(value)?)
                            .ok_or(desc.invalid())?
                    }
                }
            }
            ObjectRef::Pdu(handle) => {
                if id == P::PduName {
                    let name: String = desc.extract(value)?;
                    let cluster = self.pdu(handle)?.cluster();
                    if self.find_pdu(cluster, &name).is_some_and(|p| p != handle) {
                        return Err(DatabaseError::DuplicateName { name }.into());
                    }
                    self.pdu_mut(handle)?.name = name;
                    return Ok(());
                }
                let pdu = self.pdu_mut(handle)?;
                match id {
                    P::PduPayloadLen => {
                        let len: u32 = desc.extract(value)?;
                        pdu.payload_len = len as usize;
                    }
                    P::PduDefaultPayload => pdu.default_payload = desc.extract(value)?,
                    _ => pdu.comment = desc.extract(value)?,
                }
            }
            ObjectRef::Signal(handle) => {
                let signal = self.signal_mut(handle)?;
                match id {
                    P::SignalName => signal.name = desc.extract(value)?,
                    P::SignalStartBit => signal.start_bit = narrow(desc, desc.extract(value)?)?,
                    P::SignalNumBits => signal.num_bits = narrow(desc, desc.extract(value)?)?,
                    P::SignalByteOrder => {
                        signal.byte_order =
                            ByteOrder::from_code(desc.extract(value)?).ok_or(desc.invalid())?
                    }
                    P::SignalDataType => {
                        signal.data_type =
                            DataType::from_code(desc.extract(value)?).ok_or(desc.invalid())?
                    }
                    P::SignalScaleFactor => signal.scale_fac = desc.extract(value)?,
                    P::SignalScaleOffset => signal.scale_off = desc.extract(value)?,
                    P::SignalMin => signal.min = desc.extract(value)?,
                    P::SignalMax => signal.max = desc.extract(value)?,
                    P::SignalUnit => signal.unit = desc.extract(value)?,
                    P::SignalDefault => signal.default = desc.extract(value)?,
                    _ => signal.comment = desc.extract(value)?,
                }
            }
            ObjectRef::Subframe(handle) => {
                let subframe = self.subframe_mut(handle)?;
                match id {
                    P::SubframeName => subframe.name = desc.extract(value)?,
                    _ => {
                        let mux_value: u32 = desc.extract(value)?;
                        subframe.mux_value = mux_value as u64;
                    }
                }
            }
            ObjectRef::Ecu(handle) => {
                match id {
                    P::EcuName => {
                        let name: String = desc.extract(value)?;
                        let cluster = self.ecu(handle)?.cluster();
                        if self.find_ecu(cluster, &name).is_some_and(|e| e != handle) {
                            return Err(DatabaseError::DuplicateName { name }.into());
                        }
                        self.ecu_mut(handle)?.name = name;
                        return Ok(());
                    }
                    P::EcuTxFrames | P::EcuRxFrames => {
                        let frames = frame_refs(desc, desc.extract(value)?)?;
                        let ecu = self.ecu(handle)?;
                        let (tx, rx) = if id == P::EcuTxFrames {
                            (frames, ecu.rx_frames().to_vec())
                        } else {
                            (ecu.tx_frames().to_vec(), frames)
                        };
                        self.set_ecu_frames(handle, &tx, &rx)?;
                        return Ok(());
                    }
                    _ => {}
                }
                let ecu = self.ecu_mut(handle)?;
                match id {
                    P::EcuComment => ecu.comment = desc.extract(value)?,
                    P::EcuFlexRayColdstart => ecu.flexray.coldstart = desc.extract(value)?,
                    P::EcuFlexRayWakeupChannels => {
                        let code: u32 = desc.extract(value)?;
                        ecu.flexray.wakeup_channel = match code {
                            0 => None,
                            code => Some(FlexRayChannel::from_code(code).ok_or(desc.invalid())?),
                        };
                    }
                    P::EcuLinMaster => ecu.lin.master = desc.extract(value)?,
                    P::EcuLinProtocolVersion => {
                        ecu.lin.protocol_version = narrow(desc, desc.extract(value)?)?
                    }
                    P::EcuLinInitialNad => ecu.lin.initial_nad = narrow(desc, desc.extract(value)?)?,
                    P::EcuLinConfigNad => ecu.lin.configured_nad = narrow(desc, desc.extract(value)?)?,
                    P::EcuLinSupplierId => ecu.lin.supplier_id = narrow(desc, desc.extract(value)?)?,
                    P::EcuLinFunctionId => ecu.lin.function_id = narrow(desc, desc.extract(value)?)?,
                    P::EcuLinP2Min => ecu.lin.p2_min_us = secs_as_micros(desc, desc.extract(value)?)?,
                    P::EcuLinStMin => ecu.lin.st_min_us = secs_as_micros(desc, desc.extract(value)?)?,
                    P::EcuJ1939PreferredAddress => {
                        ecu.j1939.preferred_address = narrow(desc, desc.extract(value)?)?
                    }
                    _ => ecu.j1939.name = desc.extract(value)?,
                }
            }
            ObjectRef::LinSchedule(handle) => {
                if id == P::LinSchedName {
                    let name: String = desc.extract(value)?;
                    let cluster = self.schedule(handle)?.cluster();
                    if self.find_schedule(cluster, &name).is_some_and(|s| s != handle) {
                        return Err(DatabaseError::DuplicateName { name }.into());
                    }
                    self.schedule_mut(handle)?.name = name;
                    return Ok(());
                }
                let schedule = self.schedule_mut(handle)?;
                match id {
                    P::LinSchedPriority => schedule.priority = narrow(desc, desc.extract(value)?)?,
                    _ => {
                        schedule.run_mode =
                            RunMode::from_code(desc.extract(value)?).ok_or(desc.invalid())?
                    }
                }
            }
            ObjectRef::LinScheduleEntry { schedule, entry } => {
                if id == P::LinSchedEntryFrames {
                    let frames = frame_refs(desc, desc.extract(value)?)?;
                    for frame in &frames {
                        self.frame(*frame)?;
                    }
                    schedule_entry_mut(self, schedule, entry)?.frames = frames;
                    return Ok(());
                }
                let row = schedule_entry_mut(self, schedule, entry)?;
                match id {
                    P::LinSchedEntryName => row.name = desc.extract(value)?,
                    P::LinSchedEntryType => {
                        row.kind = EntryType::from_code(desc.extract(value)?).ok_or(desc.invalid())?
                    }
                    P::LinSchedEntryDelay => row.delay_us = secs_as_micros(desc, desc.extract(value)?)?,
                    _ => row.event_id = narrow(desc, desc.extract(value)?)?,
                }
            }
            ObjectRef::Database | ObjectRef::Session | ObjectRef::SessionFrame(_) => {
                return Err(PropertyError::ReadOnly { property: desc.name })
            }
        }
        Ok(())
    }

    //------------------------------------------------------------------------------CONFIG_STATUS
    /// Every frame, PDU and schedule of `cluster`.
    pub fn check_cluster(&self, handle: ClusterRef) -> Result<(), DatabaseError> {
        let cluster = self.cluster(handle)?;
        cluster.check()?;
        for frame in cluster.frames() {
            self.check_frame(*frame)?;
        }
        for pdu in cluster.pdus() {
            self.check_pdu(*pdu)?;
        }
        for schedule in cluster.schedules() {
            self.check_schedule(*schedule)?;
        }
        Ok(())
    }

    /// Tx/Rx frames exist and belong to the ECU's cluster.
    pub fn check_ecu(&self, handle: EcuRef) -> Result<(), DatabaseError> {
        let ecu = self.ecu(handle)?;
        for frame in ecu.tx_frames().iter().chain(ecu.rx_frames()) {
            if self.frame(*frame)?.cluster() != ecu.cluster() {
                return Err(DatabaseError::InvalidReference {
                    kind: FrameRef::KIND,
                    index: frame.index() as u32,
                });
            }
        }
        Ok(())
    }
}

fn missing_entry(entry: u32) -> PropertyError {
    PropertyError::Database {
        source: DatabaseError::InvalidReference {
            kind: "schedule entry",
            index: entry,
        },
    }
}

fn schedule_entry(entries: &[LinScheduleEntry], entry: u32) -> Result<&LinScheduleEntry, PropertyError> {
    entries.get(entry as usize).ok_or(missing_entry(entry))
}

fn schedule_entry_mut(
    db: &mut Database,
    schedule: ScheduleRef,
    entry: u32,
) -> Result<&mut LinScheduleEntry, PropertyError> {
    db.schedule_mut(schedule)?
        .entries
        .get_mut(entry as usize)
        .ok_or(missing_entry(entry))
}
