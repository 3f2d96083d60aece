//! Session queue engine.
//!
//! A [`Session`] binds an interface to either a list of database frames
//! (queued, single-point and signal modes) or to raw traffic of one
//! protocol (stream modes). It owns the bounded queues between the two
//! execution contexts of a bus:
//!
//! * the application context calls [`Session::write`] / [`Session::read`]
//!   and the signal variants;
//! * the delivery context runs a [`SessionRunner`] that releases outbound
//!   frames to a [`BusDriver`] when the scheduler says so, while the driver
//!   feeds received frames through an [`RxPort`].
//!
//! All session state sits behind one critical-section mutex, so interface
//! property writes and [`Session::start`] are serialized: a write either
//! lands before the start or fails with `ObjectStarted`.
//!
//! ```text
//!            write ──► outbound ──► SessionRunner ──► BusDriver::transmit
//! application                                            │ (echo)
//!             read ◄── inbound  ◄── RxPort::push ◄───────┘◄── driver rx
//! ```
//!
//! [`BusDriver`]: crate::protocol::transport::traits::bus_driver::BusDriver
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::future::poll_fn;
use core::sync::atomic::{AtomicU32, Ordering};
use core::task::Poll;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embassy_sync::waitqueue::WakerRegistration;
use embassy_time::{Duration, Instant};
use futures_util::{future::select, future::Either, pin_mut};

use crate::core::{coded_enum, Protocol, SignalValues, Timeout, CAN_FD_MAX_PAYLOAD, CAN_MAX_PAYLOAD};
use crate::database::{ClusterRef, Database, FlexRaySlot, Frame, FrameRef, TimingType};
use crate::error::{CodecError, DatabaseError, SessionError};
use crate::infra::codec::engine::FrameCodec;
use crate::protocol::j1939::transport::TransportConfig;
use crate::protocol::j1939::NULL_ADDRESS;
use crate::protocol::transport::bus_frame::{BusFrame, FrameKey};
use crate::protocol::transport::traits::xnet_timer::{wait_for, XnetTimer};
use crate::scheduler::flexray::FlexRayPlan;
use crate::scheduler::lin::{LinScheduleRunner, LinTable};
use crate::scheduler::{transmit_pause_for, Scheduler};

pub mod link;
mod port;
mod properties;
pub mod queue;
pub mod runner;

pub use link::SessionLink;
pub use port::RxPort;
pub use runner::SessionRunner;

use queue::{InboundQueue, OutboundQueue};

/// Default depth of the inbound and outbound queues.
pub const DEFAULT_QUEUE_SIZE: usize = 64;

//==================================================================================MODES
/// Direction and access pattern of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionMode {
    /// Latest physical value of every signal of the session frames.
    SignalInSinglePoint,
    SignalOutSinglePoint,
    /// Every received frame of any identifier.
    FrameInStream,
    /// Every received frame of the session frames, in order.
    FrameInQueued,
    /// Latest received payload of every session frame.
    FrameInSinglePoint,
    /// Raw frames of any identifier, sent as soon as paced.
    FrameOutStream,
    /// Written frames released in order on their schedule.
    FrameOutQueued,
    /// Latest written payload of every session frame.
    FrameOutSinglePoint,
}

coded_enum!(SessionMode {
    SignalInSinglePoint = 0,
    SignalOutSinglePoint = 3,
    FrameInStream = 6,
    FrameInQueued = 7,
    FrameInSinglePoint = 8,
    FrameOutStream = 9,
    FrameOutQueued = 10,
    FrameOutSinglePoint = 11,
});

impl SessionMode {
    pub const fn is_input(self) -> bool {
        matches!(
            self,
            SessionMode::SignalInSinglePoint
                | SessionMode::FrameInStream
                | SessionMode::FrameInQueued
                | SessionMode::FrameInSinglePoint
        )
    }

    pub const fn is_stream(self) -> bool {
        matches!(self, SessionMode::FrameInStream | SessionMode::FrameOutStream)
    }

    pub const fn is_queued(self) -> bool {
        matches!(self, SessionMode::FrameInQueued | SessionMode::FrameOutQueued)
    }

    /// Signal sessions are single-point too.
    pub const fn is_single_point(self) -> bool {
        !self.is_stream() && !self.is_queued()
    }

    pub const fn is_signal(self) -> bool {
        matches!(
            self,
            SessionMode::SignalInSinglePoint | SessionMode::SignalOutSinglePoint
        )
    }
}

/// Run state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Stopped,
    Running,
}

coded_enum!(SessionState {
    Stopped = 0,
    Running = 1,
});

//==================================================================================CONFIG
/// Interface settings, frozen while the session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InterfaceConfig {
    pub name: String,
    pub protocol: Protocol,
    /// Bits per second, 0 when not configured.
    pub baud_rate: u64,
    /// CAN FD data phase; 0 keeps the interface on classic CAN.
    pub can_fd_baud_rate: u64,
    pub can_termination: bool,
    /// Space event frames by one worst-case frame time.
    pub transmit_pause: bool,
    pub listen_only: bool,
    /// Loop transmitted frames back into the input session.
    pub echo_tx: bool,
    /// Run the LIN schedule tables instead of answering headers.
    pub lin_master: bool,
    pub lin_termination: bool,
}

impl InterfaceConfig {
    pub fn new(name: &str, protocol: Protocol) -> Self {
        Self {
            name: String::from(name),
            protocol,
            baud_rate: 0,
            can_fd_baud_rate: 0,
            can_termination: false,
            transmit_pause: false,
            listen_only: false,
            echo_tx: false,
            lin_master: false,
            lin_termination: false,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u64) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_can_fd_baud_rate(mut self, baud_rate: u64) -> Self {
        self.can_fd_baud_rate = baud_rate;
        self
    }

    pub fn with_transmit_pause(mut self, enabled: bool) -> Self {
        self.transmit_pause = enabled;
        self
    }

    pub fn with_listen_only(mut self, enabled: bool) -> Self {
        self.listen_only = enabled;
        self
    }

    pub fn with_echo_tx(mut self, enabled: bool) -> Self {
        self.echo_tx = enabled;
        self
    }

    pub fn with_lin_master(mut self, enabled: bool) -> Self {
        self.lin_master = enabled;
        self
    }

    /// Largest payload a raw frame may carry on this interface.
    pub fn max_payload(&self) -> usize {
        match self.protocol {
            Protocol::Can | Protocol::J1939 if self.can_fd_baud_rate > 0 => CAN_FD_MAX_PAYLOAD,
            Protocol::Can | Protocol::J1939 => CAN_MAX_PAYLOAD,
            protocol => protocol.max_payload(),
        }
    }

    /// Whether `key` is an address of this interface's protocol.
    pub fn accepts(&self, key: &FrameKey) -> bool {
        matches!(
            (self.protocol, key),
            (Protocol::Can | Protocol::J1939, FrameKey::Can(_))
                | (Protocol::Lin, FrameKey::Lin(_))
                | (Protocol::FlexRay, FrameKey::FlexRay { .. })
        )
    }
}

/// Queue settings of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// Depth of the session queue. Can only change while stopped.
    pub queue_size: usize,
    /// Start the session on the first read or write.
    pub auto_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            auto_start: true,
        }
    }
}

impl SessionConfig {
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }
}

/// J1939 node settings carried by a session, used by
/// [`SessionLink::endpoint`] and [`SessionLink::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct J1939Settings {
    /// Address to use, or to claim first.
    pub address: u8,
    /// Raw 64-bit NAME.
    pub name: u64,
    /// Initial ECU busy state of the endpoint.
    pub ecu_busy: bool,
    pub transport: TransportConfig,
}

impl Default for J1939Settings {
    fn default() -> Self {
        Self {
            address: NULL_ADDRESS,
            name: 0,
            ecu_busy: false,
            transport: TransportConfig::default(),
        }
    }
}

//==================================================================================SESSION_FRAME
/// Per-frame state of a database session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFrame {
    pub(crate) frame: Option<FrameRef>,
    pub(crate) name: String,
    pub(crate) key: FrameKey,
    pub(crate) timing: TimingType,
    /// Period of cyclic frames, initialised from the database.
    pub(crate) tx_time: Duration,
    pub(crate) start_offset: Duration,
    /// Writes replace the pending value instead of queueing.
    pub(crate) latest_value: bool,
    pub(crate) payload_len: usize,
    pub(crate) variable: bool,
    pub(crate) flexray: FlexRaySlot,
    pub(crate) default_payload: Vec<u8>,
    /// Payload repeated by cyclic releases.
    pub(crate) last_payload: Vec<u8>,
    /// Written and not yet released as an event.
    pub(crate) fresh: bool,
    /// Latest received frame (single-point input).
    pub(crate) last_rx: Option<BusFrame>,
}

impl SessionFrame {
    fn new(handle: FrameRef, frame: &Frame, key: FrameKey) -> Self {
        let default_payload = frame.default_bytes();
        Self {
            frame: Some(handle),
            name: frame.name.clone(),
            key,
            timing: frame.timing,
            tx_time: Duration::from_micros(frame.tx_time_us as u64),
            start_offset: Duration::from_ticks(0),
            latest_value: false,
            payload_len: frame.payload_len,
            variable: frame.variable_payload,
            flexray: frame.flexray,
            last_payload: default_payload.clone(),
            default_payload,
            fresh: false,
            last_rx: None,
        }
    }

    pub fn frame(&self) -> Option<FrameRef> {
        self.frame
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> FrameKey {
        self.key
    }

    pub fn tx_time(&self) -> Duration {
        self.tx_time
    }

    pub fn start_offset(&self) -> Duration {
        self.start_offset
    }

    pub fn latest_value(&self) -> bool {
        self.latest_value
    }

    /// Latest received frame, or the default payload when none arrived.
    fn latest_rx(&self) -> BusFrame {
        self.last_rx
            .clone()
            .unwrap_or_else(|| BusFrame::new(self.key, &self.default_payload))
    }

    /// Whether a write releases the frame outside any periodic slot.
    pub(crate) fn is_event(&self, interface: &InterfaceConfig) -> bool {
        match interface.protocol {
            Protocol::Can | Protocol::J1939 => {
                self.timing == TimingType::CyclicAndEvent
                    || !self.timing.is_cyclic()
                    || self.tx_time.as_ticks() == 0
            }
            Protocol::Lin => !interface.lin_master,
            Protocol::FlexRay => false,
        }
    }
}

//==================================================================================SHARED
/// State shared by the application, the runner and the receive port.
pub(crate) struct Shared {
    pub(crate) state: SessionState,
    pub(crate) closed: bool,
    /// Bumped by every stop so waiters notice a stop/start pair.
    pub(crate) epoch: u32,
    pub(crate) interface: InterfaceConfig,
    pub(crate) config: SessionConfig,
    pub(crate) j1939: J1939Settings,
    /// Bumped by every application change of `j1939`.
    pub(crate) j1939_revision: u32,
    pub(crate) frames: Vec<SessionFrame>,
    pub(crate) inbound: InboundQueue,
    pub(crate) outbound: OutboundQueue,
    pub(crate) scheduler: Option<Scheduler>,
    /// LIN table requested last, kept across restarts.
    pub(crate) lin_request: Option<usize>,
    /// Skip-N count waiting for the next start.
    pub(crate) skip_n: u32,
    pub(crate) rx_waker: WakerRegistration,
    pub(crate) tx_waker: WakerRegistration,
    /// Something the runner must look at changed.
    pub(crate) tx_dirty: bool,
}

impl Shared {
    fn new(interface: InterfaceConfig, frames: Vec<SessionFrame>) -> Self {
        let config = SessionConfig::default();
        Self {
            state: SessionState::Stopped,
            closed: false,
            epoch: 0,
            interface,
            config,
            j1939: J1939Settings::default(),
            j1939_revision: 0,
            frames,
            inbound: InboundQueue::new(config.queue_size),
            outbound: OutboundQueue::new(config.queue_size),
            scheduler: None,
            lin_request: None,
            skip_n: 0,
            rx_waker: WakerRegistration::new(),
            tx_waker: WakerRegistration::new(),
            tx_dirty: false,
        }
    }

    pub(crate) fn notify_tx(&mut self) {
        self.tx_dirty = true;
        self.tx_waker.wake();
    }

    pub(crate) fn slot_for(&self, key: &FrameKey) -> Option<usize> {
        self.frames.iter().position(|f| f.key.same_frame(key))
    }

    pub(crate) fn slot_of(&self, frame: FrameRef) -> Option<usize> {
        self.frames.iter().position(|f| f.frame == Some(frame))
    }

    fn frame_name(&self, slot: usize) -> String {
        self.frames
            .get(slot)
            .map(|f| f.name.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_skip_n(&mut self, count: u32) {
        match self.scheduler.as_mut() {
            Some(scheduler) => {
                scheduler.cyclic_mut().skip_next(count);
                self.notify_tx();
            }
            None => self.skip_n = count,
        }
    }

    pub(crate) fn resize_queues(&mut self, queue_size: usize) {
        self.config.queue_size = queue_size;
        self.inbound.set_capacity(queue_size);
        self.outbound.set_capacity(queue_size);
    }

    //------------------------------------------------------------------------------LIFECYCLE
    fn start(
        &mut self,
        output: bool,
        database: Option<&Database>,
        cluster: Option<ClusterRef>,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.state == SessionState::Running {
            return Ok(());
        }
        if self.interface.protocol.requires_baud_rate() && self.interface.baud_rate == 0 {
            return Err(SessionError::BaudRateNotConfigured);
        }
        self.scheduler = if output && !self.interface.listen_only {
            Some(self.build_scheduler(database, cluster, now)?)
        } else {
            None
        };
        self.state = SessionState::Running;
        self.notify_tx();
        Ok(())
    }

    fn stop(&mut self) -> bool {
        if self.state == SessionState::Stopped {
            return false;
        }
        self.state = SessionState::Stopped;
        self.scheduler = None;
        self.epoch = self.epoch.wrapping_add(1);
        self.notify_tx();
        self.rx_waker.wake();
        true
    }

    fn build_scheduler(
        &mut self,
        database: Option<&Database>,
        cluster: Option<ClusterRef>,
        now: Instant,
    ) -> Result<Scheduler, SessionError> {
        let pause = if self.interface.transmit_pause {
            transmit_pause_for(self.interface.baud_rate)
        } else {
            Duration::from_ticks(0)
        };
        let mut scheduler = Scheduler::new(pause);
        match (self.interface.protocol, database.zip(cluster)) {
            (Protocol::Can | Protocol::J1939, _) => {
                for (slot, frame) in self.frames.iter().enumerate() {
                    if frame.timing.is_cyclic() {
                        scheduler
                            .cyclic_mut()
                            .add(slot, frame.key, frame.tx_time, frame.start_offset);
                    }
                }
            }
            (Protocol::FlexRay, Some((db, cluster))) => {
                let cluster = db.cluster(cluster)?;
                cluster.check()?;
                let mut plan = FlexRayPlan::new(cluster.flexray);
                for (slot, frame) in self.frames.iter().enumerate() {
                    if let FrameKey::FlexRay { slot: id, .. } = frame.key {
                        plan.add(slot, id, frame.flexray);
                    }
                }
                scheduler = scheduler.with_flexray(plan);
            }
            (Protocol::Lin, Some((db, cluster))) if self.interface.lin_master => {
                let mut runner = LinScheduleRunner::new(lin_tables(db, cluster)?);
                if let Some(index) = self.lin_request {
                    runner.request(index, now)?;
                }
                scheduler = scheduler.with_lin(runner);
            }
            _ => {}
        }
        scheduler
            .check_conflicts()
            .map_err(|conflict| SessionError::SchedulingConflict {
                first: self.frame_name(conflict.first),
                second: self.frame_name(conflict.second),
            })?;
        scheduler.start(now);
        if self.skip_n > 0 {
            scheduler.cyclic_mut().skip_next(self.skip_n);
            self.skip_n = 0;
        }
        Ok(scheduler)
    }

    //------------------------------------------------------------------------------WRITE
    /// Check one written frame and complete its payload.
    fn stage(&self, mode: SessionMode, frame: &BusFrame) -> Result<(Option<usize>, BusFrame), SessionError> {
        if mode.is_stream() {
            if !self.interface.accepts(&frame.key) {
                return Err(unknown_frame(&frame.key));
            }
            let max = self.interface.max_payload();
            if frame.payload.len() > max {
                return Err(SessionError::PayloadTooLong {
                    len: frame.payload.len(),
                    max,
                });
            }
            return Ok((None, frame.clone()));
        }
        let slot = self
            .slot_for(&frame.key)
            .ok_or_else(|| unknown_frame(&frame.key))?;
        let target = &self.frames[slot];
        let len = frame.payload.len();
        if len > target.payload_len {
            return Err(SessionError::PayloadTooLong {
                len,
                max: target.payload_len,
            });
        }
        let mut staged = frame.clone();
        staged.key = target.key;
        if !target.variable && len < target.payload_len {
            staged
                .payload
                .extend_from_slice(target.default_payload.get(len..).unwrap_or_default());
            staged.payload.resize(target.payload_len, 0);
        }
        Ok((Some(slot), staged))
    }

    /// Write `frames` as a unit: either all are accepted or none.
    fn write_frames(&mut self, mode: SessionMode, frames: &[BusFrame]) -> Result<(), SessionError> {
        if self.interface.listen_only {
            return Err(SessionError::ListenOnly);
        }
        let mut staged = Vec::with_capacity(frames.len());
        for frame in frames {
            staged.push(self.stage(mode, frame)?);
        }
        let replaces = |frames: &[SessionFrame], slot: Option<usize>| {
            mode.is_single_point() || slot.and_then(|i| frames.get(i)).map_or(false, |f| f.latest_value)
        };
        let queued = staged
            .iter()
            .filter(|(slot, _)| !replaces(&self.frames, *slot))
            .count();
        if queued > self.outbound.room() {
            return Err(SessionError::QueueFull);
        }
        for (slot, frame) in staged {
            if replaces(&self.frames, slot) {
                if let Some(target) = slot.and_then(|i| self.frames.get_mut(i)) {
                    target.last_payload = frame.payload;
                    target.fresh = true;
                }
            } else {
                self.outbound.push(slot, frame)?;
            }
        }
        self.notify_tx();
        Ok(())
    }

    //------------------------------------------------------------------------------RECEIVE
    /// Store a received frame. `None` when the session does not take it,
    /// otherwise whether an older frame was evicted.
    pub(crate) fn receive(&mut self, mode: SessionMode, frame: BusFrame) -> Option<bool> {
        if self.closed || self.state != SessionState::Running || !mode.is_input() {
            return None;
        }
        let evicted = if mode.is_stream() {
            if !self.interface.accepts(&frame.key) {
                return None;
            }
            self.inbound.push(frame)
        } else {
            let slot = self.slot_for(&frame.key)?;
            if mode.is_single_point() {
                self.frames[slot].last_rx = Some(frame);
                false
            } else {
                self.inbound.push(frame)
            }
        };
        self.rx_waker.wake();
        Some(evicted)
    }

    //------------------------------------------------------------------------------COUNTERS
    fn num_pend(&self, mode: SessionMode) -> usize {
        match (mode.is_single_point(), mode.is_input()) {
            (true, true) => 0,
            (true, false) => self.frames.iter().filter(|f| f.fresh).count(),
            (false, true) => self.inbound.len(),
            (false, false) => self.outbound.len(),
        }
    }

    fn num_unused(&self, mode: SessionMode) -> usize {
        if mode.is_single_point() {
            0
        } else {
            self.config.queue_size.saturating_sub(self.num_pend(mode))
        }
    }
}

/// Timing copies of the cluster's LIN schedules, in cluster order.
pub(crate) fn lin_tables(db: &Database, cluster: ClusterRef) -> Result<Vec<LinTable>, DatabaseError> {
    db.cluster(cluster)?
        .schedules()
        .iter()
        .map(|s| db.schedule(*s).map(LinTable::from))
        .collect()
}

fn unknown_frame(key: &FrameKey) -> SessionError {
    SessionError::UnknownFrame {
        name: format!("{:#X}", key.raw_id().0),
    }
}

//==================================================================================CORE
/// Reference-counted session state.
pub(crate) struct SessionCore {
    pub(crate) mode: SessionMode,
    pub(crate) shared: Mutex<CriticalSectionRawMutex, RefCell<Shared>>,
    /// Frames evicted from the inbound queue.
    pub(crate) num_overflow: AtomicU32,
}

impl SessionCore {
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        self.shared.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

//==================================================================================SESSION
/// Application handle of one session.
///
/// Dropping the handle closes the session: its runner returns and
/// undelivered frames are discarded.
pub struct Session<T: XnetTimer + Clone> {
    core: Arc<SessionCore>,
    database: Option<Arc<Database>>,
    cluster: Option<ClusterRef>,
    timer: T,
}

impl<T: XnetTimer + Clone> Session<T> {
    /// Open a database session on `frames` of `cluster`; an empty list
    /// selects every frame of the cluster.
    ///
    /// The interface baud rate starts at the cluster baud rate.
    pub fn open(
        interface: &str,
        database: Arc<Database>,
        cluster: ClusterRef,
        frames: &[FrameRef],
        mode: SessionMode,
        timer: T,
    ) -> Result<Self, SessionError> {
        if mode.is_stream() {
            return Err(SessionError::InvalidMode { operation: "open" });
        }
        let owner = database.cluster(cluster)?;
        let protocol = owner.protocol;
        let list = if frames.is_empty() {
            owner.frames()
        } else {
            frames
        };

        let mut slots = Vec::with_capacity(list.len());
        for handle in list {
            let frame = database.frame(*handle)?;
            if frame.cluster() != cluster {
                return Err(SessionError::UnknownFrame {
                    name: frame.name.clone(),
                });
            }
            let key = FrameKey::for_frame(frame, protocol).ok_or_else(|| DatabaseError::InvalidFrameId {
                frame: frame.name.clone(),
                id: frame.id,
            })?;
            if slots.iter().any(|s: &SessionFrame| s.frame == Some(*handle)) {
                continue;
            }
            slots.push(SessionFrame::new(*handle, frame, key));
        }
        if mode.is_signal() {
            let mut names = BTreeSet::new();
            for slot in &slots {
                let Some(frame) = slot.frame else { continue };
                for signal in database.frame_signals(frame) {
                    let name = &database.signal(signal)?.name;
                    if !names.insert(name.clone()) {
                        return Err(DatabaseError::DuplicateName { name: name.clone() }.into());
                    }
                }
            }
        }

        let interface = InterfaceConfig {
            baud_rate: owner.baud_rate,
            can_fd_baud_rate: owner.can_fd_baud_rate,
            ..InterfaceConfig::new(interface, protocol)
        };
        #[cfg(feature = "defmt")]
        defmt::debug!("Session opened with {} frames (mode {})", slots.len(), mode.code());
        Ok(Self::build(mode, interface, slots, Some(database), Some(cluster), timer))
    }

    /// Open a stream session carrying raw frames of `protocol`. The baud
    /// rate must be configured before the session can start.
    pub fn open_stream(
        interface: &str,
        protocol: Protocol,
        mode: SessionMode,
        timer: T,
    ) -> Result<Self, SessionError> {
        if !mode.is_stream() {
            return Err(SessionError::InvalidMode {
                operation: "open_stream",
            });
        }
        let interface = InterfaceConfig::new(interface, protocol);
        Ok(Self::build(mode, interface, Vec::new(), None, None, timer))
    }

    fn build(
        mode: SessionMode,
        interface: InterfaceConfig,
        frames: Vec<SessionFrame>,
        database: Option<Arc<Database>>,
        cluster: Option<ClusterRef>,
        timer: T,
    ) -> Self {
        Self {
            core: Arc::new(SessionCore {
                mode,
                shared: Mutex::new(RefCell::new(Shared::new(interface, frames))),
                num_overflow: AtomicU32::new(0),
            }),
            database,
            cluster,
            timer,
        }
    }

    //------------------------------------------------------------------------------ACCESSORS
    pub fn mode(&self) -> SessionMode {
        self.core.mode
    }

    pub fn state(&self) -> SessionState {
        self.core.with(|s| s.state)
    }

    pub fn database(&self) -> Option<&Arc<Database>> {
        self.database.as_ref()
    }

    pub fn cluster(&self) -> Option<ClusterRef> {
        self.cluster
    }

    pub fn interface(&self) -> InterfaceConfig {
        self.core.with(|s| s.interface.clone())
    }

    pub fn config(&self) -> SessionConfig {
        self.core.with(|s| s.config)
    }

    pub fn j1939_settings(&self) -> J1939Settings {
        self.core.with(|s| s.j1939.clone())
    }

    /// Snapshot of the per-frame state.
    pub fn frames(&self) -> Vec<SessionFrame> {
        self.core.with(|s| s.frames.clone())
    }

    pub(crate) fn timer(&self) -> &T {
        &self.timer
    }

    /// Port through which the driver delivers received frames.
    pub fn rx_port(&self) -> RxPort {
        RxPort::new(Arc::clone(&self.core))
    }

    /// Delivery-side task releasing this session's frames to `driver`.
    pub fn runner<D>(&self, driver: D) -> SessionRunner<D, T>
    where
        D: crate::protocol::transport::traits::bus_driver::BusDriver,
    {
        SessionRunner::new(
            Arc::clone(&self.core),
            self.database.clone(),
            driver,
            self.timer.clone(),
        )
    }

    //------------------------------------------------------------------------------SETTINGS
    /// Replace the interface settings. The name and protocol are kept.
    pub fn set_interface(&self, interface: InterfaceConfig) -> Result<(), SessionError> {
        self.core.with(|s| {
            if s.state == SessionState::Running {
                return Err(SessionError::ObjectStarted);
            }
            s.interface = InterfaceConfig {
                name: core::mem::take(&mut s.interface.name),
                protocol: s.interface.protocol,
                ..interface
            };
            Ok(())
        })
    }

    /// Replace the queue settings. The queue size only changes while
    /// stopped.
    pub fn set_config(&self, config: SessionConfig) -> Result<(), SessionError> {
        if config.queue_size == 0 {
            return Err(SessionError::InvalidQueueSize);
        }
        self.core.with(|s| {
            if config.queue_size != s.config.queue_size {
                if s.state == SessionState::Running {
                    return Err(SessionError::ObjectStarted);
                }
                s.resize_queues(config.queue_size);
            }
            s.config = config;
            Ok(())
        })
    }

    /// Replace the J1939 settings. A linked endpoint picks them up at its
    /// next step.
    pub fn set_j1939_settings(&self, settings: J1939Settings) {
        self.core.with(|s| {
            s.j1939 = settings;
            s.j1939_revision = s.j1939_revision.wrapping_add(1);
        });
    }

    /// Suppress the next `count` cycles of every cyclic frame. Takes
    /// effect immediately when running, otherwise at the next start.
    pub fn set_skip_n(&self, count: u32) {
        self.core.with(|s| s.set_skip_n(count));
    }

    /// Switch the LIN master to schedule table `index` of the cluster.
    ///
    /// When running, the switch happens at the end of the current slot;
    /// otherwise the table starts with the session.
    pub fn change_lin_schedule(&self, index: u32) -> Result<(), SessionError> {
        let tables = self.lin_schedule_names().len();
        let now = self.timer.now();
        self.core.with(|s| {
            let master = s.interface.protocol == Protocol::Lin && s.interface.lin_master;
            if !master || index as usize >= tables {
                return Err(SessionError::InvalidSchedule { index });
            }
            s.lin_request = Some(index as usize);
            if let Some(runner) = s.scheduler.as_mut().and_then(|sc| sc.lin_mut()) {
                runner.request(index as usize, now)?;
                s.notify_tx();
            }
            Ok(())
        })
    }

    /// Names of the cluster's LIN schedules, in table index order.
    pub fn lin_schedule_names(&self) -> Vec<String> {
        let (Some(db), Some(cluster)) = (self.database.as_deref(), self.cluster) else {
            return Vec::new();
        };
        db.cluster(cluster)
            .map(|c| {
                c.schedules()
                    .iter()
                    .filter_map(|s| db.schedule(*s).ok())
                    .map(|s| s.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    //------------------------------------------------------------------------------LIFECYCLE
    /// Start the session. Starting a running session does nothing.
    ///
    /// Fails when the interface needs a baud rate and has none, or when
    /// two frames would be released in the same slot.
    pub fn start(&self) -> Result<(), SessionError> {
        let now = self.timer.now();
        let output = !self.core.mode.is_input();
        let database = self.database.as_deref();
        self.core
            .with(|s| s.start(output, database, self.cluster, now))?;
        #[cfg(feature = "defmt")]
        defmt::info!("Session started (mode {})", self.core.mode.code());
        Ok(())
    }

    /// Stop the session and release blocked readers. Stopping a stopped
    /// session does nothing.
    pub fn stop(&self) {
        if self.core.with(|s| s.stop()) {
            #[cfg(feature = "defmt")]
            defmt::info!("Session stopped (mode {})", self.core.mode.code());
        }
    }

    fn auto_start(&self) -> Result<(), SessionError> {
        let start = self
            .core
            .with(|s| s.config.auto_start && s.state == SessionState::Stopped);
        if start {
            self.start()?;
        }
        Ok(())
    }

    //------------------------------------------------------------------------------FRAME_IO
    /// Write frames of an output frame session.
    ///
    /// Queued sessions accept all frames or none (`QueueFull`); frames in
    /// latest-value mode and single-point sessions replace the pending
    /// payload instead. Short payloads of fixed-length frames are
    /// completed from the default payload.
    pub fn write(&self, frames: &[BusFrame]) -> Result<(), SessionError> {
        let mode = self.core.mode;
        if mode.is_input() || mode.is_signal() {
            return Err(SessionError::InvalidMode { operation: "write" });
        }
        self.auto_start()?;
        self.core.with(|s| s.write_frames(mode, frames))
    }

    /// Read up to `max` frames of an input frame session.
    ///
    /// Queued and stream sessions wait according to `timeout` and return
    /// an empty list when it expires or when the session stops.
    /// Single-point sessions return the latest frame of every session
    /// frame without waiting.
    pub async fn read(&self, max: usize, timeout: Timeout) -> Result<Vec<BusFrame>, SessionError> {
        let mode = self.core.mode;
        if !mode.is_input() || mode.is_signal() {
            return Err(SessionError::InvalidMode { operation: "read" });
        }
        self.auto_start()?;
        if mode.is_single_point() {
            return Ok(self
                .core
                .with(|s| s.frames.iter().take(max).map(SessionFrame::latest_rx).collect()));
        }
        let deadline = match timeout {
            Timeout::After(duration) => Some(self.timer.now() + duration),
            _ => None,
        };
        let epoch = self.core.with(|s| s.epoch);
        loop {
            let frames = self.core.with(|s| s.inbound.drain(max));
            if !frames.is_empty() || max == 0 || timeout == Timeout::Poll {
                return Ok(frames);
            }
            if !self.wait_inbound(epoch, deadline).await {
                return Ok(Vec::new());
            }
        }
    }

    /// Wait until inbound data is available. `false` on timeout or stop.
    async fn wait_inbound(&self, epoch: u32, deadline: Option<Instant>) -> bool {
        let ready = poll_fn(|cx| {
            self.core.with(|s| {
                if s.closed || s.state != SessionState::Running || s.epoch != epoch {
                    Poll::Ready(false)
                } else if !s.inbound.is_empty() {
                    Poll::Ready(true)
                } else {
                    s.rx_waker.register(cx.waker());
                    Poll::Pending
                }
            })
        });
        let expiry = wait_for(&self.timer, deadline);
        pin_mut!(ready);
        pin_mut!(expiry);
        match select(ready, expiry).await {
            Either::Left((ready, _)) => ready,
            Either::Right(_) => false,
        }
    }

    //------------------------------------------------------------------------------SIGNAL_IO
    /// Latest physical value of every signal of a signal input session.
    /// Frames not received yet decode from their default payload.
    pub fn read_signals(&self) -> Result<SignalValues, SessionError> {
        let db = self.signal_database(SessionMode::SignalInSinglePoint, "read_signals")?;
        self.auto_start()?;
        let payloads: Vec<(FrameRef, BusFrame)> = self.core.with(|s| {
            s.frames
                .iter()
                .filter_map(|f| Some((f.frame?, f.latest_rx())))
                .collect()
        });
        let codec = FrameCodec::new(db);
        let mut values = SignalValues::new();
        for (frame, latest) in payloads {
            values.extend(codec.decode(frame, &latest.payload)?);
        }
        Ok(values)
    }

    /// Encode `values` into the pending payloads of a signal output
    /// session. Unknown names fail the whole write.
    pub fn write_signals(&self, values: &SignalValues) -> Result<(), SessionError> {
        let db = self.signal_database(SessionMode::SignalOutSinglePoint, "write_signals")?;
        self.auto_start()?;
        let codec = FrameCodec::new(db);
        self.core.with(|s| {
            if s.interface.listen_only {
                return Err(SessionError::ListenOnly);
            }
            let mut grouped: BTreeMap<usize, SignalValues> = BTreeMap::new();
            for (name, value) in values {
                let slot = s
                    .frames
                    .iter()
                    .position(|f| f.frame.map_or(false, |frame| db.find_frame_signal(frame, name).is_some()))
                    .ok_or_else(|| CodecError::UnknownSignal { name: name.clone() })?;
                grouped.entry(slot).or_default().insert(name.clone(), *value);
            }
            let mut encoded = Vec::with_capacity(grouped.len());
            for (slot, subset) in &grouped {
                let target = &s.frames[*slot];
                let Some(frame) = target.frame else { continue };
                encoded.push((*slot, codec.encode(frame, subset, Some(&target.last_payload))?));
            }
            for (slot, payload) in encoded {
                let target = &mut s.frames[slot];
                target.last_payload = payload;
                target.fresh = true;
            }
            s.notify_tx();
            Ok(())
        })
    }

    fn signal_database(&self, mode: SessionMode, operation: &'static str) -> Result<&Database, SessionError> {
        match self.database.as_deref() {
            Some(db) if self.core.mode == mode => Ok(db),
            _ => Err(SessionError::InvalidMode { operation }),
        }
    }

    //------------------------------------------------------------------------------COUNTERS
    /// Frames waiting in the session queue, or fresh single-point values
    /// not yet released.
    pub fn num_pend(&self) -> usize {
        self.core.with(|s| s.num_pend(self.core.mode))
    }

    pub fn num_unused(&self) -> usize {
        self.core.with(|s| s.num_unused(self.core.mode))
    }

    /// Received frames dropped because the inbound queue was full.
    pub fn num_overflow(&self) -> u32 {
        self.core.num_overflow.load(Ordering::Relaxed)
    }

    pub fn num_frames(&self) -> usize {
        self.core.with(|s| s.frames.len())
    }

    /// Entries of the session list: signals for signal sessions, frames
    /// otherwise.
    pub fn list(&self) -> Vec<String> {
        let frames = self.core.with(|s| {
            s.frames
                .iter()
                .map(|f| (f.frame, f.name.clone()))
                .collect::<Vec<_>>()
        });
        match (self.core.mode.is_signal(), self.database.as_deref()) {
            (true, Some(db)) => frames
                .iter()
                .filter_map(|(frame, _)| *frame)
                .flat_map(|frame| db.frame_signals(frame))
                .filter_map(|signal| db.signal(signal).ok().map(|s| s.name.clone()))
                .collect(),
            _ => frames.into_iter().map(|(_, name)| name).collect(),
        }
    }

    /// Largest payload a frame of the session may carry.
    pub fn payload_len_max(&self) -> usize {
        self.core.with(|s| {
            if self.core.mode.is_stream() {
                s.interface.max_payload()
            } else {
                s.frames.iter().map(|f| f.payload_len).max().unwrap_or(0)
            }
        })
    }
}

impl<T: XnetTimer + Clone> Drop for Session<T> {
    fn drop(&mut self) {
        self.core.with(|s| {
            s.stop();
            s.closed = true;
            s.inbound.clear();
            s.outbound.clear();
            s.notify_tx();
            s.rx_waker.wake();
        });
    }
}
