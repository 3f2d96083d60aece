//! Property access on a session and its frames.
use embassy_time::Duration;

use super::{Session, SessionState, Shared};
use crate::core::{duration_as_secs_f64, duration_from_secs_f64};
use crate::error::{DatabaseError, PropertyError};
use crate::property::{ObjectRef, PropertyDescriptor, PropertyId, PropertyValue};
use crate::protocol::transport::traits::xnet_timer::XnetTimer;

fn count(n: usize) -> PropertyValue {
    PropertyValue::U32(u32::try_from(n).unwrap_or(u32::MAX))
}

fn secs(desc: &PropertyDescriptor, value: PropertyValue) -> Result<Duration, PropertyError> {
    let seconds: f64 = desc.extract(value)?;
    if seconds.is_nan() || seconds < 0.0 {
        return Err(desc.invalid());
    }
    Ok(duration_from_secs_f64(seconds))
}

fn byte(desc: &PropertyDescriptor, value: PropertyValue) -> Result<u8, PropertyError> {
    let raw: u32 = desc.extract(value)?;
    u8::try_from(raw).map_err(|_| desc.invalid())
}

/// Termination travels as 0 (off) or 1 (on).
fn switch(desc: &PropertyDescriptor, value: PropertyValue) -> Result<bool, PropertyError> {
    match desc.extract::<u32>(value)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(desc.invalid()),
    }
}

fn missing_frame(index: u32) -> PropertyError {
    DatabaseError::InvalidReference {
        kind: "session frame",
        index,
    }
    .into()
}

impl<T: XnetTimer + Clone> Session<T> {
    //------------------------------------------------------------------------------GET
    /// Read property `id` of the session (`ObjectRef::Session`) or of one
    /// of its frames (`ObjectRef::SessionFrame(index)`).
    pub fn get_property(&self, object: ObjectRef, id: PropertyId) -> Result<PropertyValue, PropertyError> {
        let desc = id.descriptor();
        desc.check(&object, false)?;
        use PropertyId as P;
        if let ObjectRef::SessionFrame(index) = object {
            return self.core.with(|s| {
                let frame = s.frames.get(index as usize).ok_or(missing_frame(index))?;
                Ok(match id {
                    P::SessionCanTxTime => duration_as_secs_f64(frame.tx_time).into(),
                    P::SessionCanStartTimeOff => duration_as_secs_f64(frame.start_offset).into(),
                    _ => frame.latest_value.into(),
                })
            });
        }

        let value: PropertyValue = match id {
            P::SessionMode => self.mode().code().into(),
            P::SessionState => self.state().code().into(),
            P::SessionDatabaseName => self
                .database
                .as_ref()
                .map(|db| db.name.clone())
                .unwrap_or_default()
                .into(),
            P::SessionClusterName => self
                .database
                .as_deref()
                .zip(self.cluster)
                .and_then(|(db, cluster)| db.cluster(cluster).ok())
                .map(|c| c.name.clone())
                .unwrap_or_default()
                .into(),
            P::SessionList => PropertyValue::StringArray(self.list()),
            P::SessionNumFrames => count(self.num_frames()),
            P::SessionNumInList => count(self.list().len()),
            P::SessionNumPend => count(self.num_pend()),
            P::SessionNumUnused => count(self.num_unused()),
            P::SessionNumOverflow => self.num_overflow().into(),
            P::SessionPayldLenMax => count(self.payload_len_max()),
            P::SessionIntfLinSchedNames => PropertyValue::StringArray(self.lin_schedule_names()),
            _ => return self.core.with(|s| shared_property(s, desc)),
        };
        Ok(value)
    }

    //------------------------------------------------------------------------------SET
    /// Write property `id`. Interface and queue settings are refused with
    /// `ObjectStarted` while the session runs and keep their value.
    pub fn set_property(&self, object: ObjectRef, id: PropertyId, value: PropertyValue) -> Result<(), PropertyError> {
        let desc = id.descriptor();
        desc.check(&object, true)?;
        self.core.with(|s| {
            if desc.stopped_only && s.state == SessionState::Running {
                return Err(PropertyError::ObjectStarted { property: desc.name });
            }
            match object {
                ObjectRef::SessionFrame(index) => set_frame_property(s, desc, index, value),
                _ => set_shared_property(s, desc, value),
            }
        })
    }
}

/// Properties stored in the locked session state.
fn shared_property(s: &Shared, desc: &PropertyDescriptor) -> Result<PropertyValue, PropertyError> {
    use PropertyId as P;
    let interface = &s.interface;
    let transport = &s.j1939.transport;
    Ok(match desc.id {
        P::SessionProtocol => interface.protocol.code().into(),
        P::SessionQueueSize => count(s.config.queue_size),
        P::SessionAutoStart => s.config.auto_start.into(),
        P::SessionIntfName => interface.name.clone().into(),
        P::SessionIntfBaudRate => interface.baud_rate.into(),
        P::SessionIntfCanFdBaudRate => interface.can_fd_baud_rate.into(),
        P::SessionIntfCanTerm => u32::from(interface.can_termination).into(),
        P::SessionIntfCanTransmitPause => interface.transmit_pause.into(),
        P::SessionIntfCanListenOnly => interface.listen_only.into(),
        P::SessionIntfEchoTx => interface.echo_tx.into(),
        P::SessionIntfLinMaster => interface.lin_master.into(),
        P::SessionIntfLinTerm => u32::from(interface.lin_termination).into(),
        P::SessionJ1939Address => u32::from(s.j1939.address).into(),
        P::SessionJ1939Name => s.j1939.name.into(),
        P::SessionJ1939EcuBusy => s.j1939.ecu_busy.into(),
        P::SessionJ1939TimeoutT1 => duration_as_secs_f64(transport.t1).into(),
        P::SessionJ1939TimeoutT2 => duration_as_secs_f64(transport.t2).into(),
        P::SessionJ1939TimeoutT3 => duration_as_secs_f64(transport.t3).into(),
        P::SessionJ1939TimeoutT4 => duration_as_secs_f64(transport.t4).into(),
        P::SessionJ1939ResponseTimeTr => duration_as_secs_f64(transport.tr).into(),
        P::SessionJ1939HoldTimeTh => duration_as_secs_f64(transport.th).into(),
        P::SessionJ1939MaxRepeatCts => u32::from(transport.max_repeat_cts).into(),
        P::SessionJ1939NumPacketsRecv => u32::from(transport.num_packets_recv).into(),
        P::SessionJ1939NumPacketsResp => u32::from(transport.num_packets_resp).into(),
        P::SessionJ1939FillByte => u32::from(transport.fill_byte).into(),
        P::SessionJ1939WriteQueueSize => count(transport.write_queue_size),
        _ => return Err(PropertyError::WriteOnly { property: desc.name }),
    })
}

fn set_shared_property(s: &mut Shared, desc: &PropertyDescriptor, value: PropertyValue) -> Result<(), PropertyError> {
    use PropertyId as P;
    match desc.id {
        P::SessionQueueSize => {
            let size: u32 = desc.extract(value)?;
            if size == 0 {
                return Err(desc.invalid());
            }
            s.resize_queues(size as usize);
        }
        P::SessionAutoStart => s.config.auto_start = desc.extract(value)?,
        P::SessionSkipNCyclicFrames => s.set_skip_n(desc.extract(value)?),
        P::SessionIntfBaudRate => s.interface.baud_rate = desc.extract(value)?,
        P::SessionIntfCanFdBaudRate => s.interface.can_fd_baud_rate = desc.extract(value)?,
        P::SessionIntfCanTerm => s.interface.can_termination = switch(desc, value)?,
        P::SessionIntfCanTransmitPause => s.interface.transmit_pause = desc.extract(value)?,
        P::SessionIntfCanListenOnly => s.interface.listen_only = desc.extract(value)?,
        P::SessionIntfEchoTx => s.interface.echo_tx = desc.extract(value)?,
        P::SessionIntfLinMaster => s.interface.lin_master = desc.extract(value)?,
        P::SessionIntfLinTerm => s.interface.lin_termination = switch(desc, value)?,
        P::SessionJ1939Address => s.j1939.address = byte(desc, value)?,
        P::SessionJ1939Name => s.j1939.name = desc.extract(value)?,
        P::SessionJ1939EcuBusy => s.j1939.ecu_busy = desc.extract(value)?,
        P::SessionJ1939TimeoutT1 => s.j1939.transport.t1 = secs(desc, value)?,
        P::SessionJ1939TimeoutT2 => s.j1939.transport.t2 = secs(desc, value)?,
        P::SessionJ1939TimeoutT3 => s.j1939.transport.t3 = secs(desc, value)?,
        P::SessionJ1939TimeoutT4 => s.j1939.transport.t4 = secs(desc, value)?,
        P::SessionJ1939ResponseTimeTr => s.j1939.transport.tr = secs(desc, value)?,
        P::SessionJ1939HoldTimeTh => s.j1939.transport.th = secs(desc, value)?,
        P::SessionJ1939MaxRepeatCts => s.j1939.transport.max_repeat_cts = byte(desc, value)?,
        P::SessionJ1939NumPacketsRecv => {
            let packets = byte(desc, value)?;
            if packets == 0 {
                return Err(desc.invalid());
            }
            s.j1939.transport.num_packets_recv = packets;
        }
        P::SessionJ1939NumPacketsResp => s.j1939.transport.num_packets_resp = byte(desc, value)?,
        P::SessionJ1939FillByte => s.j1939.transport.fill_byte = byte(desc, value)?,
        P::SessionJ1939WriteQueueSize => {
            let size: u32 = desc.extract(value)?;
            s.j1939.transport.write_queue_size = size as usize;
        }
        _ => return Err(PropertyError::ReadOnly { property: desc.name }),
    }
    if is_j1939(desc.id) {
        s.j1939_revision = s.j1939_revision.wrapping_add(1);
    }
    Ok(())
}

/// Properties a linked J1939 endpoint follows.
fn is_j1939(id: PropertyId) -> bool {
    use PropertyId as P;
    matches!(
        id,
        P::SessionJ1939Address
            | P::SessionJ1939Name
            | P::SessionJ1939EcuBusy
            | P::SessionJ1939TimeoutT1
            | P::SessionJ1939TimeoutT2
            | P::SessionJ1939TimeoutT3
            | P::SessionJ1939TimeoutT4
            | P::SessionJ1939ResponseTimeTr
            | P::SessionJ1939HoldTimeTh
            | P::SessionJ1939MaxRepeatCts
            | P::SessionJ1939NumPacketsRecv
            | P::SessionJ1939NumPacketsResp
            | P::SessionJ1939FillByte
            | P::SessionJ1939WriteQueueSize
    )
}

fn set_frame_property(
    s: &mut Shared,
    desc: &PropertyDescriptor,
    index: u32,
    value: PropertyValue,
) -> Result<(), PropertyError> {
    let frame = s.frames.get_mut(index as usize).ok_or(missing_frame(index))?;
    match desc.id {
        PropertyId::SessionCanTxTime => frame.tx_time = secs(desc, value)?,
        PropertyId::SessionCanStartTimeOff => frame.start_offset = secs(desc, value)?,
        _ => frame.latest_value = desc.extract(value)?,
    }
    Ok(())
}
