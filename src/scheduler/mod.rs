//! Transmit timing of a running session.
//!
//! The scheduler is a pure planner: the session runner feeds it the current
//! time, gets back the releases that are due and sleeps until
//! [`Scheduler::next_deadline`]. It decides *when* frames go out, never
//! *what* they carry.
//!
//! - cyclic frames: period, start offset and skip-N ([`cyclic`])
//! - event frames: immediate, optionally paced by a transmit pause
//!   ([`EventPacer`])
//! - LIN master schedule tables ([`lin`])
//! - FlexRay slot/cycle placement ([`flexray`])
//!
//! Conflicting placements are reported by [`Scheduler::check_conflicts`]
//! before the first release.
use alloc::vec::Vec;
use embassy_time::{Duration, Instant};

pub mod cyclic;
pub mod flexray;
pub mod lin;

use cyclic::{phases_overlap, CyclicRelease, CyclicSchedule};
use flexray::{FlexRayPlan, FlexRayRelease};
use lin::{LinScheduleRunner, LinSlot};

/// Bits of a worst-case classic CAN frame, used to size the transmit
/// pause from the baud rate.
pub const TRANSMIT_PAUSE_BITS: u64 = 160;

/// Transmit pause matching one worst-case frame at `baud_rate`.
pub fn transmit_pause_for(baud_rate: u64) -> Duration {
    if baud_rate == 0 {
        return Duration::from_ticks(0);
    }
    Duration::from_micros((TRANSMIT_PAUSE_BITS * 1_000_000).div_ceil(baud_rate))
}

//==================================================================================EVENT_PACER
/// Minimum spacing between event releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventPacer {
    pause: Duration,
    last: Option<Instant>,
}

impl EventPacer {
    pub fn new(pause: Duration) -> Self {
        Self { pause, last: None }
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Earliest time the next event frame may go out.
    pub fn ready_at(&self) -> Option<Instant> {
        match self.last {
            Some(last) if self.pause.as_ticks() > 0 => Some(last + self.pause),
            _ => None,
        }
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.ready_at().map_or(true, |at| at <= now)
    }

    /// Record an event release at `now`.
    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

//==================================================================================SCHEDULER
/// Release decided by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    Cyclic(CyclicRelease),
    FlexRay(FlexRayRelease),
    Lin(LinSlot),
}

/// Two session frames that would occupy the same slot at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    pub first: usize,
    pub second: usize,
}

/// Timing state of one session.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    cyclic: CyclicSchedule,
    flexray: Option<FlexRayPlan>,
    lin: Option<LinScheduleRunner>,
    pacer: EventPacer,
}

impl Scheduler {
    pub fn new(transmit_pause: Duration) -> Self {
        Self {
            pacer: EventPacer::new(transmit_pause),
            ..Self::default()
        }
    }

    pub fn with_flexray(mut self, plan: FlexRayPlan) -> Self {
        self.flexray = Some(plan);
        self
    }

    pub fn with_lin(mut self, runner: LinScheduleRunner) -> Self {
        self.lin = Some(runner);
        self
    }

    pub fn cyclic(&self) -> &CyclicSchedule {
        &self.cyclic
    }

    pub fn cyclic_mut(&mut self) -> &mut CyclicSchedule {
        &mut self.cyclic
    }

    pub fn flexray(&self) -> Option<&FlexRayPlan> {
        self.flexray.as_ref()
    }

    pub fn lin(&self) -> Option<&LinScheduleRunner> {
        self.lin.as_ref()
    }

    pub fn lin_mut(&mut self) -> Option<&mut LinScheduleRunner> {
        self.lin.as_mut()
    }

    pub fn pacer(&self) -> &EventPacer {
        &self.pacer
    }

    pub fn pacer_mut(&mut self) -> &mut EventPacer {
        &mut self.pacer
    }

    /// Cyclic frames on the same identifier whose releases coincide, or
    /// FlexRay frames sharing a slot occurrence.
    pub fn check_conflicts(&self) -> Result<(), Conflict> {
        let entries = self.cyclic.entries();
        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                if a.key.same_frame(&b.key) && phases_overlap(a.period, a.offset, b.period, b.offset) {
                    return Err(Conflict {
                        first: a.slot,
                        second: b.slot,
                    });
                }
            }
        }
        if let Some((first, second)) = self.flexray.as_ref().and_then(|p| p.conflict()) {
            return Err(Conflict { first, second });
        }
        Ok(())
    }

    /// Anchor every timeline at `now`.
    pub fn start(&mut self, now: Instant) {
        self.cyclic.start(now);
        if let Some(plan) = &mut self.flexray {
            plan.start(now);
        }
        self.pacer.reset();
    }

    /// Earliest time a periodic release becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        let lin = self.lin.as_ref().and_then(|l| l.next_deadline());
        let flexray = self.flexray.as_ref().and_then(|p| p.next_deadline());
        [self.cyclic.next_deadline(), lin, flexray]
            .into_iter()
            .flatten()
            .min()
    }

    /// Periodic releases due at `now`, in time order.
    pub fn poll(&mut self, now: Instant) -> Vec<Release> {
        let mut releases: Vec<Release> = self
            .cyclic
            .poll(now)
            .into_iter()
            .map(Release::Cyclic)
            .collect();
        if let Some(plan) = &mut self.flexray {
            releases.extend(plan.poll(now).into_iter().map(Release::FlexRay));
        }
        if let Some(runner) = &mut self.lin {
            releases.extend(runner.poll(now).map(Release::Lin));
        }
        releases.sort_by_key(Release::at);
        releases
    }
}

impl Release {
    /// Nominal release time.
    pub fn at(&self) -> Instant {
        match self {
            Release::Cyclic(r) => r.at,
            Release::FlexRay(r) => r.at,
            Release::Lin(r) => r.at,
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
