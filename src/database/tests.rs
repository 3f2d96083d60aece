//! Database construction and validation tests.
use alloc::vec;

use super::*;
use crate::core::{FlexRayChannel, Protocol};

fn can_db() -> (Database, ClusterRef) {
    let mut db = Database::new("vehicle");
    let can = db.add_cluster(Cluster::new("Body", Protocol::Can)).unwrap();
    (db, can)
}

#[test]
/// Objects are reachable both by handle and by name.
fn test_build_and_lookup() {
    let (mut db, can) = can_db();
    let (frame, pdu) = db
        .add_frame_with_pdu(can, Frame::can("Lights", 0x321, 4))
        .unwrap();
    let signal = db.add_signal(pdu, Signal::new("HeadLamp", 0, 2)).unwrap();

    assert_eq!(db.find_cluster("Body"), Some(can));
    assert_eq!(db.find_frame(can, "Lights"), Some(frame));
    assert_eq!(db.find_frame_by_id(can, 0x321, false), Some(frame));
    assert_eq!(db.find_frame_by_id(can, 0x321, true), None);
    assert_eq!(db.find_signal(pdu, "HeadLamp"), Some(signal));
    assert_eq!(db.signal(signal).unwrap().pdu(), pdu);
    assert_eq!(db.pdu(pdu).unwrap().frames(), &[frame]);
    assert_eq!(db.cluster(can).unwrap().frames(), &[frame]);
    assert_eq!(db.frame_signals(frame), vec![signal]);
    assert!(db.validate().is_ok());
}

#[test]
/// Names are unique per scope.
fn test_duplicate_names_rejected() {
    let (mut db, can) = can_db();
    assert!(matches!(
        db.add_cluster(Cluster::new("Body", Protocol::Lin)),
        Err(DatabaseError::DuplicateName { .. })
    ));
    let (_, pdu) = db.add_frame_with_pdu(can, Frame::can("A", 1, 8)).unwrap();
    assert!(db.add_frame(can, Frame::can("A", 2, 8)).is_err());
    db.add_signal(pdu, Signal::new("S", 0, 8)).unwrap();
    assert!(db.add_signal(pdu, Signal::new("S", 8, 8)).is_err());
}

#[test]
/// Identifier ranges follow the cluster protocol.
fn test_frame_identifier_rules() {
    let (mut db, can) = can_db();
    assert!(matches!(
        db.add_frame(can, Frame::can("TooBig", 0x800, 8)),
        Err(DatabaseError::InvalidFrameId { id: 0x800, .. })
    ));
    assert!(db.add_frame(can, Frame::can_extended("Ext", 0x800, 8)).is_ok());

    let j1939 = db.add_cluster(Cluster::new("Truck", Protocol::J1939)).unwrap();
    assert!(db.add_frame(j1939, Frame::can("Std", 0x100, 8)).is_err());

    let lin = db.add_cluster(Cluster::new("Seat", Protocol::Lin)).unwrap();
    assert!(db.add_frame(lin, Frame::lin("Bad", 64, 8)).is_err());
    assert!(matches!(
        db.add_frame(lin, Frame::lin("Long", 1, 9)),
        Err(DatabaseError::PayloadTooLarge { max: 8, .. })
    ));

    let fr = db.add_cluster(Cluster::new("Chassis", Protocol::FlexRay)).unwrap();
    let bad_repetition = FlexRaySlot {
        base_cycle: 0,
        cycle_repetition: 3,
        channels: FlexRayChannel::A,
    };
    assert!(db.add_frame(fr, Frame::flexray("Odd", 10, 8, bad_repetition)).is_err());
    assert!(db.add_frame(fr, Frame::flexray("Zero", 0, 8, FlexRaySlot::default())).is_err());
}

#[test]
/// A FlexRay cycle must be non-empty and hold both segments.
fn test_flexray_timing_rules() {
    let mut db = Database::new("vehicle");
    let zero = FlexRayTiming {
        cycle_us: 0,
        ..FlexRayTiming::default()
    };
    assert!(matches!(
        db.add_cluster(Cluster::new("Empty", Protocol::FlexRay).with_flexray_timing(zero)),
        Err(DatabaseError::InvalidTiming { .. })
    ));
    let overfull = FlexRayTiming {
        cycle_us: 1_000,
        static_slot_count: 20,
        static_slot_us: 50,
        minislot_count: 10,
        minislot_us: 10,
        network_idle_us: 0,
    };
    assert!(matches!(
        db.add_cluster(Cluster::new("Full", Protocol::FlexRay).with_flexray_timing(overfull)),
        Err(DatabaseError::InvalidTiming { .. })
    ));
    // Only FlexRay clusters carry a cycle.
    assert!(db
        .add_cluster(Cluster::new("Body", Protocol::Can).with_flexray_timing(zero))
        .is_ok());

    let fr = db.add_cluster(Cluster::new("Chassis", Protocol::FlexRay)).unwrap();
    db.cluster_mut(fr).unwrap().flexray.cycle_us = 0;
    assert!(matches!(db.validate(), Err(DatabaseError::InvalidTiming { .. })));
}

#[test]
/// Signals and PDUs must fit in their containers.
fn test_placement_checks() {
    let (mut db, can) = can_db();
    let (frame, pdu) = db.add_frame_with_pdu(can, Frame::can("F", 1, 2)).unwrap();
    assert!(matches!(
        db.add_signal(pdu, Signal::new("Wide", 8, 16)),
        Err(DatabaseError::SignalExceedsPayload {
            required: 3,
            available: 2,
            ..
        })
    ));
    assert!(matches!(
        db.add_signal(pdu, Signal::new("F16", 0, 16).float()),
        Err(DatabaseError::InvalidSignalWidth { bits: 16, .. })
    ));
    let extra = db.add_pdu(can, Pdu::new("Extra", 2)).unwrap();
    assert!(matches!(
        db.map_pdu(frame, extra, 4, None),
        Err(DatabaseError::UnalignedPdu { start_bit: 4, .. })
    ));
    assert!(matches!(
        db.map_pdu(frame, extra, 8, None),
        Err(DatabaseError::PduExceedsFrame { .. })
    ));
}

#[test]
/// Editing in place is caught by the validator.
fn test_validate_after_edit() {
    let (mut db, can) = can_db();
    let (frame, pdu) = db.add_frame_with_pdu(can, Frame::can("F", 1, 8)).unwrap();
    let signal = db.add_signal(pdu, Signal::new("S", 56, 8)).unwrap();
    assert!(db.validate().is_ok());

    db.pdu_mut(pdu).unwrap().payload_len = 4;
    assert_eq!(db.check_signal(signal).unwrap_err().code(), 6);
    db.pdu_mut(pdu).unwrap().payload_len = 8;

    db.frame_mut(frame).unwrap().id = 0xFFFF;
    assert!(matches!(
        db.check_frame(frame),
        Err(DatabaseError::InvalidFrameId { .. })
    ));
}

#[test]
/// Multiplexing structure rules.
fn test_mux_rules() {
    let (mut db, can) = can_db();
    let (_, pdu) = db.add_frame_with_pdu(can, Frame::can("M", 1, 8)).unwrap();
    assert!(matches!(
        db.add_subframe(pdu, "Early", 0),
        Err(DatabaseError::InvalidMux { .. })
    ));
    assert!(db.set_mux_selector(pdu, Signal::new("Sel", 0, 32).float()).is_err());
    let selector = db.set_mux_selector(pdu, Signal::new("Sel", 0, 8)).unwrap();
    assert_eq!(db.signal(selector).unwrap().mux_role(), MuxRole::Selector);
    let page = db.add_subframe(pdu, "Page1", 1).unwrap();
    assert!(db.add_subframe(pdu, "Again", 1).is_err());
    let dynamic = db.add_dynamic_signal(page, Signal::new("D", 8, 8)).unwrap();
    assert_eq!(db.signal(dynamic).unwrap().mux_role(), MuxRole::Dynamic(page));
    assert_eq!(db.subframe_for(pdu, 1), Some(page));
    assert_eq!(db.subframe_for(pdu, 2), None);
    assert_eq!(db.pdu_signals(pdu).count(), 2);
    assert_eq!(db.find_signal(pdu, "D"), Some(dynamic));
}

#[test]
/// Schedules are LIN-only and reference frames of their own cluster.
fn test_schedule_rules() {
    let (mut db, can) = can_db();
    let (can_frame, _) = db.add_frame_with_pdu(can, Frame::can("C", 1, 8)).unwrap();
    assert!(matches!(
        db.add_schedule(can, LinSchedule::new("S", RunMode::Continuous)),
        Err(DatabaseError::ProtocolMismatch { .. })
    ));

    let lin = db.add_cluster(Cluster::new("Lin", Protocol::Lin)).unwrap();
    let (frame, _) = db.add_frame_with_pdu(lin, Frame::lin("Status", 0x10, 2)).unwrap();
    assert!(db
        .add_schedule(lin, LinSchedule::new("Empty", RunMode::Continuous))
        .is_err());
    assert!(db
        .add_schedule(
            lin,
            LinSchedule::new("Foreign", RunMode::Continuous)
                .entry(LinScheduleEntry::unconditional("e", can_frame, 10_000)),
        )
        .is_err());
    let schedule = db
        .add_schedule(
            lin,
            LinSchedule::new("Normal", RunMode::Continuous)
                .entry(LinScheduleEntry::unconditional("e", frame, 10_000)),
        )
        .unwrap();
    assert_eq!(db.schedule(schedule).unwrap().period_us(), 10_000);
    assert!(db.add_schedule(lin, LinSchedule::new("Stop", RunMode::Null)).is_ok());
}

#[test]
/// Dangling handles surface as reference errors.
fn test_invalid_reference() {
    let (db, _) = can_db();
    assert!(matches!(
        db.frame(FrameRef::from_index(9)),
        Err(DatabaseError::InvalidReference {
            kind: "frame",
            index: 9
        })
    ));
}

#[test]
/// ECU frame sets stay within the ECU cluster.
fn test_ecu_frames() {
    let (mut db, can) = can_db();
    let (frame, _) = db.add_frame_with_pdu(can, Frame::can("F", 1, 8)).unwrap();
    let ecu = db.add_ecu(can, Ecu::new("Gateway")).unwrap();
    db.set_ecu_frames(ecu, &[frame], &[]).unwrap();
    assert_eq!(db.ecu(ecu).unwrap().tx_frames(), &[frame]);

    let other = db.add_cluster(Cluster::new("Other", Protocol::Can)).unwrap();
    let (foreign, _) = db.add_frame_with_pdu(other, Frame::can("G", 2, 8)).unwrap();
    assert!(db.set_ecu_frames(ecu, &[], &[foreign]).is_err());
}

#[cfg(feature = "serde")]
#[test]
/// A loader can hand the engine a serialised model.
fn test_serde_model_reload() {
    let (mut db, can) = can_db();
    let (_, pdu) = db
        .add_frame_with_pdu(can, Frame::can("Lights", 0x321, 4))
        .unwrap();
    db.add_signal(pdu, Signal::new("HeadLamp", 0, 2).scaled(0.5, 0.0))
        .unwrap();

    let json = serde_json::to_string(&db).unwrap();
    let reloaded: Database = serde_json::from_str(&json).unwrap();
    assert_eq!(reloaded, db);
    assert!(reloaded.validate().is_ok());
}
