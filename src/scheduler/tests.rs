//! Unit tests for the cyclic, LIN and FlexRay planners.
use alloc::vec;
use alloc::vec::Vec;

use super::cyclic::{phases_overlap, CyclicSchedule};
use super::flexray::FlexRayPlan;
use super::lin::{LinScheduleRunner, LinTable, LinTableEntry};
use super::*;
use crate::core::FlexRayChannel;
use crate::database::{EntryType, FlexRaySlot, FlexRayTiming, FrameRef, RunMode};
use crate::protocol::transport::bus_frame::{can_id, FrameKey};

fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

fn ms(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn key(id: u32) -> FrameKey {
    FrameKey::Can(can_id(id, false).unwrap())
}

//==================================================================================CYCLIC
#[test]
/// Releases follow period and offset; a late poll drops missed cycles.
fn test_cyclic_period_and_offset() {
    let mut schedule = CyclicSchedule::new();
    schedule.add(0, key(0x100), ms(10), ms(0));
    schedule.add(1, key(0x200), ms(10), ms(5));
    schedule.start(at(0));

    let slots = |r: Vec<cyclic::CyclicRelease>| r.iter().map(|r| r.slot).collect::<Vec<_>>();
    assert_eq!(slots(schedule.poll(at(0))), vec![0]);
    assert_eq!(schedule.next_deadline(), Some(at(5)));
    assert_eq!(slots(schedule.poll(at(5))), vec![1]);
    assert_eq!(slots(schedule.poll(at(9))), Vec::<usize>::new());
    assert_eq!(slots(schedule.poll(at(10))), vec![0]);

    // 40 ms late: one release each, then back on phase.
    let late = schedule.poll(at(50));
    assert_eq!(late.len(), 2);
    assert_eq!(late[0].at, at(20));
    assert_eq!(schedule.next_deadline(), Some(at(55)));
}

#[test]
/// Skipped cycles keep their slot in time but do not transmit.
fn test_cyclic_skip_n() {
    let mut schedule = CyclicSchedule::new();
    schedule.add(0, key(0x100), ms(10), ms(0));
    schedule.start(at(0));
    schedule.skip_next(2);

    let flags: Vec<bool> = (0..4)
        .map(|i| schedule.poll(at(i * 10))[0].transmit)
        .collect();
    assert_eq!(flags, vec![false, false, true, true]);
    assert_eq!(schedule.skip_remaining(0), Some(0));
}

#[test]
/// Zero periods are not scheduled.
fn test_cyclic_zero_period_ignored() {
    let mut schedule = CyclicSchedule::new();
    schedule.add(0, key(0x100), ms(0), ms(0));
    assert!(schedule.is_empty());
}

#[test]
/// Phase overlap follows the gcd of the periods.
fn test_phase_overlap() {
    assert!(phases_overlap(ms(10), ms(0), ms(10), ms(0)));
    assert!(!phases_overlap(ms(10), ms(0), ms(10), ms(5)));
    // gcd(10, 15) = 5: offsets 0 and 5 collide at t = 30.
    assert!(phases_overlap(ms(10), ms(0), ms(15), ms(5)));
    assert!(!phases_overlap(ms(10), ms(0), ms(15), ms(2)));
}

//==================================================================================CONFLICTS
#[test]
/// Same identifier with coinciding releases is a conflict; shifting the
/// offset resolves it.
fn test_conflict_detection() {
    let mut scheduler = Scheduler::new(Duration::from_ticks(0));
    scheduler.cyclic_mut().add(0, key(0x100), ms(10), ms(0));
    scheduler.cyclic_mut().add(1, key(0x200), ms(10), ms(0));
    assert!(scheduler.check_conflicts().is_ok());

    scheduler.cyclic_mut().add(2, key(0x100), ms(20), ms(10));
    assert_eq!(
        scheduler.check_conflicts(),
        Err(Conflict {
            first: 0,
            second: 2
        })
    );

    let mut shifted = Scheduler::new(Duration::from_ticks(0));
    shifted.cyclic_mut().add(0, key(0x100), ms(10), ms(0));
    shifted.cyclic_mut().add(2, key(0x100), ms(20), ms(5));
    assert!(shifted.check_conflicts().is_ok());
}

//==================================================================================EVENT_PACER
#[test]
/// The pause spaces event releases; no pause means always ready.
fn test_event_pacer() {
    let mut pacer = EventPacer::new(ms(2));
    assert!(pacer.is_ready(at(0)));
    pacer.mark(at(0));
    assert!(!pacer.is_ready(at(1)));
    assert_eq!(pacer.ready_at(), Some(at(2)));
    assert!(pacer.is_ready(at(2)));

    let mut unpaced = EventPacer::default();
    unpaced.mark(at(0));
    assert!(unpaced.is_ready(at(0)));
    assert_eq!(transmit_pause_for(500_000), Duration::from_micros(320));
}

//==================================================================================LIN
fn table(run_mode: RunMode, delays: &[u64]) -> LinTable {
    LinTable {
        run_mode,
        entries: delays
            .iter()
            .enumerate()
            .map(|(i, d)| LinTableEntry {
                kind: EntryType::Unconditional,
                frames: vec![FrameRef::from_index(i as u32)],
                delay: ms(*d),
                event_id: 0,
            })
            .collect(),
    }
}

fn run(runner: &mut LinScheduleRunner, until: u64) -> Vec<(usize, usize, u64)> {
    (0..=until)
        .filter_map(|t| runner.poll(at(t)))
        .map(|s| (s.table, s.entry, s.at.as_millis()))
        .collect()
}

#[test]
/// A continuous table wraps around.
fn test_lin_continuous() {
    let mut runner = LinScheduleRunner::new(vec![table(RunMode::Continuous, &[10, 20])]);
    runner.request(0, at(0)).unwrap();
    assert_eq!(
        run(&mut runner, 59),
        vec![(0, 0, 0), (0, 1, 10), (0, 0, 30), (0, 1, 40)]
    );
}

#[test]
/// A switch requested mid-slot waits for the slot to end.
fn test_lin_switch_at_slot_boundary() {
    let mut runner = LinScheduleRunner::new(vec![
        table(RunMode::Continuous, &[10, 10]),
        table(RunMode::Continuous, &[5]),
    ]);
    runner.request(0, at(0)).unwrap();
    assert_eq!(run(&mut runner, 3), vec![(0, 0, 0)]);

    runner.request(1, at(4)).unwrap();
    assert_eq!(runner.active(), Some(0));
    assert_eq!(runner.poll(at(9)), None);
    let slot = runner.poll(at(10)).unwrap();
    assert_eq!((slot.table, slot.entry), (1, 0));
    assert_eq!(runner.active(), Some(1));
}

#[test]
/// A run-once table returns to the continuous table it interrupted.
fn test_lin_run_once_resumes() {
    let mut runner = LinScheduleRunner::new(vec![
        table(RunMode::Continuous, &[10]),
        table(RunMode::Once, &[5, 5]),
    ]);
    runner.request(0, at(0)).unwrap();
    runner.poll(at(0));
    runner.request(1, at(1)).unwrap();
    assert_eq!(
        run(&mut runner, 30),
        vec![(1, 0, 10), (1, 1, 15), (0, 0, 20), (0, 0, 30)]
    );
}

#[test]
/// The null table stops the master; unknown indices are refused.
fn test_lin_null_and_invalid() {
    let mut runner = LinScheduleRunner::new(vec![
        table(RunMode::Continuous, &[10]),
        table(RunMode::Null, &[]),
    ]);
    runner.request(0, at(0)).unwrap();
    runner.poll(at(0));
    runner.request(1, at(2)).unwrap();
    assert_eq!(runner.poll(at(10)), None);
    assert_eq!(runner.active(), None);
    assert_eq!(runner.next_deadline(), None);
    assert!(runner.request(7, at(11)).is_err());
}

//==================================================================================FLEXRAY
fn timing() -> FlexRayTiming {
    FlexRayTiming {
        cycle_us: 1_000,
        static_slot_count: 10,
        static_slot_us: 50,
        minislot_count: 20,
        minislot_us: 10,
        network_idle_us: 100,
    }
}

fn placement(base_cycle: u8, cycle_repetition: u8, channels: FlexRayChannel) -> FlexRaySlot {
    FlexRaySlot {
        base_cycle,
        cycle_repetition,
        channels,
    }
}

#[test]
/// Base cycle and repetition select the cycles; the slot sets the offset.
fn test_flexray_placement() {
    let mut plan = FlexRayPlan::new(timing());
    plan.add(0, 3, placement(1, 4, FlexRayChannel::A));
    plan.start(at(0));

    // cycle 1, slot 3 -> 1000 + 2 * 50 µs
    assert_eq!(plan.next_deadline(), Some(Instant::from_micros(1_100)));
    let cycles: Vec<u8> = (0..20u64)
        .flat_map(|t| plan.poll(Instant::from_micros(t * 1_000 + 100)))
        .map(|r| r.cycle)
        .collect();
    assert_eq!(cycles, vec![1, 5, 9, 13, 17]);
}

#[test]
/// Slot sharing collides only on a common channel and cycle.
fn test_flexray_conflicts() {
    let mut plan = FlexRayPlan::new(timing());
    plan.add(0, 5, placement(0, 2, FlexRayChannel::A));
    plan.add(1, 5, placement(1, 2, FlexRayChannel::A));
    plan.add(2, 5, placement(0, 4, FlexRayChannel::B));
    assert_eq!(plan.conflict(), None);

    plan.add(3, 5, placement(2, 4, FlexRayChannel::AB));
    assert_eq!(plan.conflict(), Some((0, 3)));
}

#[test]
/// Dynamic slots are flagged as such.
fn test_flexray_dynamic_slot() {
    let mut plan = FlexRayPlan::new(timing());
    plan.add(0, 12, FlexRaySlot::default());
    plan.start(at(0));
    let release = plan.poll(Instant::from_micros(600)).pop().unwrap();
    assert!(!release.is_static);
    assert_eq!(release.at, Instant::from_micros(510));
}
