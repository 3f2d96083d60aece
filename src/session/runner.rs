//! Delivery context of an output session.
//!
//! [`SessionRunner::drive`] asks the session for the frames due now,
//! hands them to the [`BusDriver`], then sleeps until the next scheduler
//! deadline or until the application writes, starts or stops. It returns
//! once the [`super::Session`] handle is dropped.
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use embassy_time::Instant;
use futures_util::{future::select, pin_mut};

use super::{RxPort, SessionCore, SessionMode, SessionState, Shared};
use crate::database::{Database, EntryType, FrameRef};
use crate::protocol::transport::bus_frame::{BusFrame, FrameKey};
use crate::protocol::transport::traits::bus_driver::BusDriver;
use crate::protocol::transport::traits::xnet_timer::{wait_for, XnetTimer};
use crate::scheduler::flexray::FlexRayRelease;
use crate::scheduler::lin::LinSlot;
use crate::scheduler::{Release, Scheduler};

/// What the runner does next.
#[derive(Debug, PartialEq)]
pub(crate) enum Step {
    Closed,
    Transmit { frames: Vec<BusFrame>, echo: bool },
    Wait(Option<Instant>),
}

//==================================================================================RUNNER
/// Releases the frames of one output session to a bus driver.
pub struct SessionRunner<D: BusDriver, T: XnetTimer> {
    core: Arc<SessionCore>,
    database: Option<Arc<Database>>,
    driver: D,
    timer: T,
    echo: Option<RxPort>,
}

impl<D, T> SessionRunner<D, T>
where
    D: BusDriver,
    T: XnetTimer,
{
    pub(crate) fn new(core: Arc<SessionCore>, database: Option<Arc<Database>>, driver: D, timer: T) -> Self {
        Self {
            core,
            database,
            driver,
            timer,
            echo: None,
        }
    }

    /// Loop transmitted frames back into `port` when the interface has
    /// echo enabled.
    pub fn with_echo(mut self, port: RxPort) -> Self {
        self.echo = Some(port);
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Run until the session is closed. Transmit failures are logged and
    /// do not stop the runner.
    pub async fn drive(&mut self) {
        loop {
            let now = self.timer.now();
            let mode = self.core.mode;
            let database = self.database.as_deref();
            let step = self.core.with(|s| s.next_step(mode, database, now));
            match step {
                Step::Closed => return,
                Step::Transmit { frames, echo } => {
                    for frame in frames {
                        self.transmit(frame, echo).await;
                    }
                }
                Step::Wait(deadline) => self.wait(deadline).await,
            }
        }
    }

    async fn transmit(&mut self, frame: BusFrame, echo: bool) {
        match self.driver.transmit(&frame).await {
            Ok(()) => {
                if let (true, Some(port)) = (echo, &self.echo) {
                    let mut echoed = frame;
                    echoed.echo = true;
                    echoed.timestamp = Some(self.timer.now());
                    port.push(echoed);
                }
            }
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Transmit failed: {}", defmt::Debug2Format(&_err));
            }
        }
    }

    /// Sleep until `deadline` or until the session changes.
    async fn wait(&self, deadline: Option<Instant>) {
        let changed = core::future::poll_fn(|cx| {
            self.core.with(|s| {
                if s.tx_dirty || s.closed {
                    s.tx_dirty = false;
                    core::task::Poll::Ready(())
                } else {
                    s.tx_waker.register(cx.waker());
                    core::task::Poll::Pending
                }
            })
        });
        let expiry = wait_for(&self.timer, deadline);
        pin_mut!(changed);
        pin_mut!(expiry);
        select(changed, expiry).await;
    }
}

//==================================================================================RELEASES
impl Shared {
    /// Frames due at `now`, or how long to sleep.
    pub(crate) fn next_step(&mut self, mode: SessionMode, database: Option<&Database>, now: Instant) -> Step {
        if self.closed {
            return Step::Closed;
        }
        if self.state != SessionState::Running || mode.is_input() || self.interface.listen_only {
            return Step::Wait(None);
        }
        let Some(mut scheduler) = self.scheduler.take() else {
            return Step::Wait(None);
        };

        let mut frames = Vec::new();
        for release in scheduler.poll(now) {
            match release {
                Release::Cyclic(release) if release.transmit => {
                    frames.extend(self.periodic_frame(mode, release.slot, release.at))
                }
                Release::Cyclic(_) => {}
                Release::FlexRay(release) => frames.extend(self.flexray_frame(mode, &release)),
                Release::Lin(slot) => frames.extend(self.lin_frame(mode, database, &slot)),
            }
        }
        while scheduler.pacer().is_ready(now) {
            let Some(frame) = self.next_event(mode, now) else {
                break;
            };
            scheduler.pacer_mut().mark(now);
            frames.push(frame.with_timestamp(now));
        }

        let step = if frames.is_empty() {
            Step::Wait(self.deadline(mode, &scheduler))
        } else {
            Step::Transmit {
                frames,
                echo: self.interface.echo_tx,
            }
        };
        self.scheduler = Some(scheduler);
        step
    }

    fn deadline(&self, mode: SessionMode, scheduler: &Scheduler) -> Option<Instant> {
        let periodic = scheduler.next_deadline();
        if !self.has_event(mode) {
            return periodic;
        }
        let held = match mode.is_stream() {
            true => self.outbound.front().and_then(|p| p.frame.timestamp),
            false => None,
        };
        let event = [scheduler.pacer().ready_at(), held].into_iter().flatten().max();
        [periodic, event].into_iter().flatten().min()
    }

    //------------------------------------------------------------------------------EVENTS
    fn event_slots(&self) -> Vec<bool> {
        self.frames.iter().map(|f| f.is_event(&self.interface)).collect()
    }

    fn has_event(&self, mode: SessionMode) -> bool {
        if mode.is_stream() {
            return !self.outbound.is_empty();
        }
        let events = self.event_slots();
        let fresh = self
            .frames
            .iter()
            .zip(&events)
            .any(|(f, event)| *event && f.fresh);
        fresh || self.outbound.any(|p| p.slot.map_or(false, |s| events[s]))
    }

    /// Next frame released outside the periodic schedule.
    fn next_event(&mut self, mode: SessionMode, now: Instant) -> Option<BusFrame> {
        if mode.is_stream() {
            let held = self
                .outbound
                .front()
                .and_then(|p| p.frame.timestamp)
                .map_or(false, |at| at > now);
            return match held {
                true => None,
                false => self.outbound.pop_front().map(|p| p.frame),
            };
        }
        let events = self.event_slots();
        if let Some(pending) = self
            .outbound
            .take_first(|p| p.slot.map_or(false, |s| events[s]))
        {
            let slot = pending.slot?;
            self.frames[slot].last_payload = pending.frame.payload.clone();
            return Some(pending.frame);
        }
        let slot = self
            .frames
            .iter()
            .zip(&events)
            .position(|(f, event)| *event && f.fresh)?;
        let target = &mut self.frames[slot];
        target.fresh = false;
        Some(BusFrame::new(target.key, &target.last_payload))
    }

    //------------------------------------------------------------------------------PERIODIC
    /// Payload for a periodic release of `slot`: the oldest queued frame in
    /// queued mode, else the last written one. `None` when `require_new`
    /// and nothing new was written.
    fn take_payload(&mut self, mode: SessionMode, slot: usize, require_new: bool) -> Option<Vec<u8>> {
        let pending = match mode.is_queued() {
            true => self.outbound.take_slot(slot),
            false => None,
        };
        let target = self.frames.get_mut(slot)?;
        match pending {
            Some(pending) => target.last_payload = pending.frame.payload,
            None if require_new && !target.fresh => return None,
            None => {}
        }
        target.fresh = false;
        Some(target.last_payload.clone())
    }

    fn periodic_frame(&mut self, mode: SessionMode, slot: usize, at: Instant) -> Option<BusFrame> {
        let payload = self.take_payload(mode, slot, false)?;
        let key = self.frames.get(slot)?.key;
        Some(BusFrame::new(key, &payload).with_timestamp(at))
    }

    /// Static slots always transmit; dynamic slots only carry new data.
    fn flexray_frame(&mut self, mode: SessionMode, release: &FlexRayRelease) -> Option<BusFrame> {
        let payload = self.take_payload(mode, release.slot_index, !release.is_static)?;
        Some(
            BusFrame::flexray(release.slot, release.cycle, release.channels, &payload)
                .with_timestamp(release.at),
        )
    }

    /// Frame the master puts on the bus for a schedule slot. Frames the
    /// session does not publish go out as a bare header for their
    /// publisher to answer.
    fn lin_frame(&mut self, mode: SessionMode, database: Option<&Database>, slot: &LinSlot) -> Vec<BusFrame> {
        let header = |frame: FrameRef| {
            database
                .and_then(|db| db.frame(frame).ok())
                .and_then(|f| u8::try_from(f.id).ok())
                .map(|id| BusFrame::lin(id, &[]))
        };
        let published = |shared: &mut Self, require_new: bool| {
            slot.frames.iter().find_map(|frame| {
                let index = shared.slot_of(*frame)?;
                let payload = shared.take_payload(mode, index, require_new)?;
                match shared.frames[index].key {
                    FrameKey::Lin(id) => Some(BusFrame::lin(id, &payload)),
                    _ => None,
                }
            })
        };
        let frame = match slot.kind {
            EntryType::Unconditional => match slot.frames.first() {
                Some(first) if self.slot_of(*first).is_some() => published(self, false),
                Some(first) => header(*first),
                None => None,
            },
            EntryType::Sporadic => published(self, true),
            EntryType::EventTriggered => Some(BusFrame::lin(slot.event_id, &[])),
            EntryType::Diagnostic => {
                published(self, true).or_else(|| slot.frames.first().and_then(|f| header(*f)))
            }
        };
        match frame {
            Some(frame) => vec![frame.with_timestamp(slot.at)],
            None => Vec::new(),
        }
    }
}
