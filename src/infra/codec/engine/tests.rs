//! End-to-end tests for the database-driven codec.
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec;

use super::*;
use crate::core::Protocol;
use crate::database::{Cluster, Frame, Pdu, Signal};
use crate::error::CodecError;

fn close(a: f64, b: f64, tolerance: f64) -> bool {
    a - b < tolerance && b - a < tolerance
}

fn values(pairs: &[(&str, f64)]) -> SignalValues {
    pairs
        .iter()
        .map(|(name, value)| (String::from(*name), *value))
        .collect::<BTreeMap<_, _>>()
}

/// Engine frame with an Intel speed, a Motorola temperature and a flag.
fn engine_db() -> (Database, FrameRef, PduRef) {
    let mut db = Database::new("powertrain");
    let can = db.add_cluster(Cluster::new("CAN1", Protocol::Can)).unwrap();
    let (frame, pdu) = db
        .add_frame_with_pdu(can, Frame::can("EngineData", 0x100, 8).cyclic(10_000))
        .unwrap();
    db.add_signal(pdu, Signal::new("EngineSpeed", 0, 16).scaled(0.25, 0.0).unit("rpm"))
        .unwrap();
    db.add_signal(
        pdu,
        Signal::new("CoolantTemp", 23, 8)
            .big_endian()
            .signed()
            .scaled(1.0, -40.0)
            .default_value(20.0),
    )
    .unwrap();
    db.add_signal(pdu, Signal::new("Running", 63, 1)).unwrap();
    (db, frame, pdu)
}

#[test]
/// Hand-computed payload decodes to the documented physical values.
fn test_decode_known_pattern() {
    let (db, frame, _) = engine_db();
    let codec = FrameCodec::new(&db);
    // speed raw 0x0FA0 = 4000 -> 1000 rpm, temp raw 0x5A = 90 -> 90 - 40 = 50
    let raw = [0xA0, 0x0F, 0x5A, 0x00, 0x00, 0x00, 0x00, 0x80];
    let decoded = codec.decode(frame, &raw).unwrap();
    assert_eq!(decoded["EngineSpeed"], 1000.0);
    assert_eq!(decoded["CoolantTemp"], 50.0);
    assert_eq!(decoded["Running"], 1.0);
}

#[test]
/// Encoding then decoding returns the written values for both orders.
fn test_round_trip_within_tolerance() {
    let (db, frame, _) = engine_db();
    let codec = FrameCodec::new(&db);
    let written = values(&[("EngineSpeed", 2345.75), ("CoolantTemp", -12.0), ("Running", 1.0)]);
    let raw = codec.encode(frame, &written, None).unwrap();
    let decoded = codec.decode(frame, &raw).unwrap();
    for (name, value) in &written {
        assert!(close(decoded[name], *value, 0.25), "{name}");
    }
}

#[test]
/// Signals not written keep the bits of the base payload.
fn test_encode_preserves_base_bits() {
    let (db, frame, _) = engine_db();
    let codec = FrameCodec::new(&db);
    let base = [0x00, 0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0x00];
    let raw = codec
        .encode(frame, &values(&[("EngineSpeed", 1.0)]), Some(&base))
        .unwrap();
    assert_eq!(raw, vec![0x04, 0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0x00]);
}

#[test]
/// Out-of-range values pass through encode and are surfaced by decode.
fn test_no_clamping() {
    let mut db = Database::new("db");
    let can = db.add_cluster(Cluster::new("CAN1", Protocol::Can)).unwrap();
    let (frame, pdu) = db.add_frame_with_pdu(can, Frame::can("F", 1, 2)).unwrap();
    db.add_signal(pdu, Signal::new("Level", 0, 8).range(0.0, 100.0))
        .unwrap();
    let codec = FrameCodec::new(&db);
    let raw = codec.encode(frame, &values(&[("Level", 200.0)]), None).unwrap();
    assert_eq!(codec.decode(frame, &raw).unwrap()["Level"], 200.0);
    assert!(!db.signal(db.find_signal(pdu, "Level").unwrap()).unwrap().in_range(200.0));
    // Beyond the bit width the raw value wraps to the field.
    let raw = codec.encode(frame, &values(&[("Level", 257.0)]), None).unwrap();
    assert_eq!(raw[0], 1);
}

#[test]
/// 32-bit float signals keep their IEEE representation.
fn test_float_signal() {
    let mut db = Database::new("db");
    let can = db.add_cluster(Cluster::new("CAN1", Protocol::Can)).unwrap();
    let (frame, pdu) = db.add_frame_with_pdu(can, Frame::can("F", 1, 8)).unwrap();
    db.add_signal(pdu, Signal::new("Ratio", 32, 32).float()).unwrap();
    let codec = FrameCodec::new(&db);
    let raw = codec.encode(frame, &values(&[("Ratio", 1.5)]), None).unwrap();
    assert_eq!(&raw[4..], &1.5f32.to_bits().to_le_bytes());
    assert_eq!(codec.decode(frame, &raw).unwrap()["Ratio"], 1.5);
}

#[test]
/// Error paths: unknown names and short payloads.
fn test_codec_errors() {
    let (db, frame, _) = engine_db();
    let codec = FrameCodec::new(&db);
    assert!(matches!(
        codec.encode(frame, &values(&[("Nope", 1.0)]), None),
        Err(CodecError::UnknownSignal { .. })
    ));
    assert!(matches!(
        codec.decode(frame, &[0x00, 0x00, 0x00]),
        Err(CodecError::PayloadTooShort { .. })
    ));
    assert!(matches!(
        codec.encode(frame, &values(&[("Running", 1.0)]), Some(&[0u8; 4])),
        Err(CodecError::PayloadTooShort {
            required: 8,
            available: 4
        })
    ));
    assert_eq!(codec.required_len(frame).unwrap(), 8);
}

/// PDU with a 4-bit selector, two subframes and a static counter.
fn muxed_db() -> (Database, FrameRef, PduRef) {
    let mut db = Database::new("db");
    let can = db.add_cluster(Cluster::new("CAN1", Protocol::Can)).unwrap();
    let (frame, pdu) = db.add_frame_with_pdu(can, Frame::can("Diag", 0x200, 8)).unwrap();
    db.set_mux_selector(pdu, Signal::new("Mode", 0, 4)).unwrap();
    db.add_signal(pdu, Signal::new("Counter", 4, 4)).unwrap();
    let voltage = db.add_subframe(pdu, "VoltagePage", 1).unwrap();
    let current = db.add_subframe(pdu, "CurrentPage", 2).unwrap();
    db.add_dynamic_signal(voltage, Signal::new("Voltage", 8, 16).scaled(0.01, 0.0))
        .unwrap();
    db.add_dynamic_signal(current, Signal::new("Current", 8, 16).signed().scaled(0.1, 0.0))
        .unwrap();
    (db, frame, pdu)
}

#[test]
/// Decode reads the selector first and only reports the active subframe.
fn test_mux_decode_selects_subframe() {
    let (db, frame, _) = muxed_db();
    let codec = FrameCodec::new(&db);
    let raw = [0x32, 0xE8, 0x03, 0, 0, 0, 0, 0];
    let decoded = codec.decode(frame, &raw).unwrap();
    assert_eq!(decoded["Mode"], 2.0);
    assert_eq!(decoded["Counter"], 3.0);
    assert!(close(decoded["Current"], 100.0, 1e-9));
    assert!(!decoded.contains_key("Voltage"));

    // Unknown selector value: only static signals and the selector.
    let decoded = codec.decode(frame, &[0x0F, 0, 0, 0, 0, 0, 0, 0]).unwrap();
    assert_eq!(decoded.len(), 2);
}

#[test]
/// Encode accepts a consistent selector and rejects a mismatched one.
fn test_mux_encode_consistency() {
    let (db, frame, _) = muxed_db();
    let codec = FrameCodec::new(&db);
    let raw = codec
        .encode(frame, &values(&[("Mode", 1.0), ("Voltage", 12.5)]), None)
        .unwrap();
    assert_eq!(&raw[..3], &[0x01, 0xE2, 0x04]);

    let result = codec.encode(frame, &values(&[("Mode", 2.0), ("Voltage", 12.5)]), None);
    assert!(matches!(
        result,
        Err(CodecError::ConfigurationMismatch { ref signal, .. }) if signal == "Voltage"
    ));

    // Selector taken from the base payload when not written.
    let base = [0x02, 0, 0, 0, 0, 0, 0, 0];
    assert!(codec
        .encode(frame, &values(&[("Current", -1.0)]), Some(&base))
        .is_ok());
    assert!(codec
        .encode(frame, &values(&[("Voltage", 1.0)]), Some(&base))
        .is_err());
}

#[test]
/// Frames carrying two PDUs with update bits.
fn test_multi_pdu_frame_update_bits() {
    let mut db = Database::new("db");
    let fr = db.add_cluster(Cluster::new("FR", Protocol::FlexRay)).unwrap();
    let frame = db
        .add_frame(fr, Frame::flexray("Body", 5, 16, Default::default()))
        .unwrap();
    let left = db.add_pdu(fr, Pdu::new("Left", 4)).unwrap();
    let right = db.add_pdu(fr, Pdu::new("Right", 4)).unwrap();
    db.add_signal(left, Signal::new("DoorLeft", 0, 8)).unwrap();
    db.add_signal(right, Signal::new("DoorRight", 0, 8)).unwrap();
    db.map_pdu(frame, left, 0, Some(127)).unwrap();
    db.map_pdu(frame, right, 64, Some(126)).unwrap();

    let codec = FrameCodec::new(&db);
    let raw = codec.encode(frame, &values(&[("DoorRight", 7.0)]), None).unwrap();
    assert_eq!(raw[8], 7);
    assert_eq!(raw[15], 0x40);

    let decoded = codec.decode(frame, &raw).unwrap();
    assert_eq!(decoded.get("DoorRight"), Some(&7.0));
    assert!(!decoded.contains_key("DoorLeft"));
    assert_eq!(codec.decode_signal(frame, "DoorRight", &raw).unwrap(), 7.0);
}

#[test]
/// Defaults cover every signal, dynamic ones included.
fn test_default_values() {
    let (db, frame, pdu) = engine_db();
    let codec = FrameCodec::new(&db);
    let defaults = codec.default_values(frame).unwrap();
    assert_eq!(defaults.len(), 3);
    assert_eq!(defaults["CoolantTemp"], 20.0);
    assert_eq!(codec.default_values(pdu).unwrap(), defaults);

    let (db, frame, _) = muxed_db();
    assert_eq!(FrameCodec::new(&db).default_values(frame).unwrap().len(), 4);
}
