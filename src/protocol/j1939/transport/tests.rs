//! Transport protocol state machine tests: segmentation, reassembly,
//! flow control, busy handling and timers.
use alloc::vec::Vec;

use super::packet::*;
use super::*;

const PGN_PROPRIETARY_A: u32 = 0xEF00;
const PGN_BROADCAST: u32 = 0xFECA;

fn at(millis: u64) -> Instant {
    Instant::from_millis(millis)
}

fn manager(address: u8) -> TransportManager {
    TransportManager::new(address, TransportConfig::default())
}

fn drain_frames(manager: &mut TransportManager) -> Vec<CanFrame> {
    core::iter::from_fn(|| manager.poll_transmit()).collect()
}

fn drain_events(manager: &mut TransportManager) -> Vec<TransportEvent> {
    core::iter::from_fn(|| manager.poll_event()).collect()
}

/// Shuttle frames between two managers until both are quiet. Returns every
/// frame put on the bus.
fn exchange(a: &mut TransportManager, b: &mut TransportManager, now: Instant) -> Vec<CanFrame> {
    let mut wire = Vec::new();
    loop {
        let from_a = drain_frames(a);
        let from_b = drain_frames(b);
        if from_a.is_empty() && from_b.is_empty() {
            return wire;
        }
        for frame in &from_a {
            b.handle_frame(frame, now);
        }
        for frame in &from_b {
            a.handle_frame(frame, now);
        }
        wire.extend(from_a);
        wire.extend(from_b);
    }
}

fn rts_frame(sa: u8, da: u8, pgn: u32, size: u16) -> CanFrame {
    let message = ConnectionMessage::RequestToSend {
        size,
        packets: packet_count(size as usize) as u8,
        max_per_cts: NO_PACKET_LIMIT,
        pgn,
    };
    cm_frame(sa, da, &message)
}

fn connection(frame: &CanFrame) -> Option<ConnectionMessage> {
    (frame.id.pgn() == PGN_TP_CM)
        .then(|| ConnectionMessage::parse(frame.payload()))
        .flatten()
}

#[test]
/// Connection management bytes follow the J1939-21 layout.
fn test_connection_message_layout() {
    let rts = ConnectionMessage::RequestToSend {
        size: 10,
        packets: 2,
        max_per_cts: 0xFF,
        pgn: 0x01_EF00,
    };
    assert_eq!(rts.encode(), [16, 10, 0, 2, 0xFF, 0x00, 0xEF, 0x01]);
    assert_eq!(ConnectionMessage::parse(&rts.encode()), Some(rts));

    let abort = [255, 3, 0xFF, 0xFF, 0xFF, 0xCA, 0xFE, 0x00];
    assert_eq!(
        ConnectionMessage::parse(&abort),
        Some(ConnectionMessage::Abort {
            reason: AbortReason::Timeout,
            pgn: PGN_BROADCAST
        })
    );
    assert_eq!(ConnectionMessage::parse(&[42, 0, 0, 0, 0, 0, 0, 0]), None);
    assert_eq!(AbortReason::from_code(8), AbortReason::DuplicateSequenceNumber);
    assert_eq!(AbortReason::from_code(200).code(), 200);
}

#[test]
/// A 10-byte message travels as two packets (7 + 3 padded) and is rebuilt
/// to exactly 10 bytes.
fn test_ten_bytes_two_packets() {
    let mut sender = manager(0x20);
    let mut receiver = manager(0x30);
    let payload: Vec<u8> = (1..=10).collect();

    let key = sender
        .send(Some(0x30), PGN_PROPRIETARY_A, &payload, at(0))
        .unwrap();
    assert_eq!(sender.state(&key), Some(TransferState::RtsSent));

    let wire = exchange(&mut sender, &mut receiver, at(0));
    let data: Vec<&CanFrame> = wire.iter().filter(|f| f.id.pgn() == PGN_TP_DT).collect();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0].data, [1, 1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(data[1].data, [2, 8, 9, 10, 0xFF, 0xFF, 0xFF, 0xFF]);
    assert_eq!(data[1].id.destination(), Some(0x30));
    assert_eq!(data[1].id.priority(), TP_PRIORITY);

    assert_eq!(
        drain_events(&mut receiver),
        [TransportEvent::Received {
            sa: 0x20,
            da: 0x30,
            pgn: PGN_PROPRIETARY_A,
            payload
        }]
    );
    assert_eq!(drain_events(&mut sender), [TransportEvent::Sent { key }]);
    assert_eq!(sender.active_transfers() + receiver.active_transfers(), 0);
}

#[test]
/// Fill bytes are configurable and never delivered.
fn test_custom_fill_byte() {
    let mut sender = TransportManager::new(
        0x20,
        TransportConfig::default().with_fill_byte(0xAA),
    );
    let mut receiver = manager(0x30);
    let payload = [0x55u8; 9];
    sender
        .send(Some(0x30), PGN_PROPRIETARY_A, &payload, at(0))
        .unwrap();
    let wire = exchange(&mut sender, &mut receiver, at(0));
    let last = wire.iter().rfind(|f| f.id.pgn() == PGN_TP_DT).unwrap();
    assert_eq!(last.data, [2, 0x55, 0x55, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA]);
    match &drain_events(&mut receiver)[..] {
        [TransportEvent::Received { payload: got, .. }] => assert_eq!(got, &payload),
        other => panic!("unexpected events {other:?}"),
    }
}

#[test]
/// The receiver grants windows of `num_packets_recv` packets.
fn test_windowed_transfer() {
    let mut sender = manager(0x20);
    let mut receiver =
        TransportManager::new(0x30, TransportConfig::default().with_num_packets_recv(3));
    let payload: Vec<u8> = (0..100).collect();
    sender
        .send(Some(0x30), PGN_PROPRIETARY_A, &payload, at(0))
        .unwrap();

    let wire = exchange(&mut sender, &mut receiver, at(0));
    let grants: Vec<(u8, u8)> = wire
        .iter()
        .filter_map(connection)
        .filter_map(|m| match m {
            ConnectionMessage::ClearToSend { count, next, .. } => Some((count, next)),
            _ => None,
        })
        .collect();
    assert_eq!(grants, [(3, 1), (3, 4), (3, 7), (3, 10), (3, 13)]);
    assert!(matches!(
        &drain_events(&mut receiver)[..],
        [TransportEvent::Received { payload: got, .. }] if *got == payload
    ));
}

#[test]
/// BAM packets are paced and reassembled by every listener.
fn test_broadcast_announce() {
    let mut sender = manager(0x20);
    let mut listener = manager(0x30);
    let payload: Vec<u8> = (0..20).collect();

    let key = sender
        .send(None, PGN_BROADCAST, &payload, at(0))
        .unwrap();
    assert!(key.is_broadcast());
    let bam = drain_frames(&mut sender);
    assert_eq!(bam.len(), 1);
    assert!(matches!(
        connection(&bam[0]),
        Some(ConnectionMessage::Broadcast { size: 20, packets: 3, .. })
    ));
    listener.handle_frame(&bam[0], at(0));

    // Nothing before the interval elapses.
    sender.poll(at(49));
    assert!(drain_frames(&mut sender).is_empty());

    for (step, time) in [50u64, 100, 150].into_iter().enumerate() {
        assert_eq!(sender.next_deadline(), Some(at(time)));
        sender.poll(at(time));
        let packets = drain_frames(&mut sender);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data[0], step as u8 + 1);
        assert_eq!(packets[0].id.destination(), Some(GLOBAL_ADDRESS));
        listener.handle_frame(&packets[0], at(time));
    }

    assert_eq!(drain_events(&mut sender), [TransportEvent::Sent { key }]);
    assert_eq!(
        drain_events(&mut listener),
        [TransportEvent::Received {
            sa: 0x20,
            da: GLOBAL_ADDRESS,
            pgn: PGN_BROADCAST,
            payload
        }]
    );
}

#[test]
/// Transfers of disjoint pairs run side by side.
fn test_concurrent_disjoint_transfers() {
    let mut first = manager(0x20);
    let mut second = manager(0x40);
    let mut receiver = manager(0x30);
    let a: Vec<u8> = (0..30).collect();
    let b: Vec<u8> = (100..150).collect();

    first.send(Some(0x30), PGN_PROPRIETARY_A, &a, at(0)).unwrap();
    second.send(Some(0x30), 0xE700, &b, at(0)).unwrap();

    // Both RTS reach the receiver before any data moves.
    for frame in drain_frames(&mut first)
        .iter()
        .chain(drain_frames(&mut second).iter())
    {
        receiver.handle_frame(frame, at(1));
    }
    assert!(receiver.is_pair_busy(0x20, 0x30));
    assert!(receiver.is_pair_busy(0x40, 0x30));

    // Interleave the rest packet by packet.
    loop {
        let replies = drain_frames(&mut receiver);
        let mut outgoing = Vec::new();
        for frame in &replies {
            match frame.id.destination() {
                Some(0x20) => first.handle_frame(frame, at(2)),
                Some(0x40) => second.handle_frame(frame, at(2)),
                _ => {}
            }
        }
        outgoing.extend(drain_frames(&mut first));
        outgoing.extend(drain_frames(&mut second));
        if replies.is_empty() && outgoing.is_empty() {
            break;
        }
        for frame in &outgoing {
            receiver.handle_frame(frame, at(2));
        }
    }

    let mut received: Vec<(u8, usize)> = drain_events(&mut receiver)
        .into_iter()
        .filter_map(|event| match event {
            TransportEvent::Received { sa, payload, .. } => Some((sa, payload.len())),
            _ => None,
        })
        .collect();
    received.sort();
    assert_eq!(received, [(0x20, 30), (0x40, 50)]);
    assert!(matches!(&drain_events(&mut first)[..], [TransportEvent::Sent { .. }]));
    assert!(matches!(&drain_events(&mut second)[..], [TransportEvent::Sent { .. }]));
}

#[test]
/// A second RTS on an active pair is refused until the first completes.
fn test_busy_pair() {
    let mut sender = manager(0x20);
    let mut receiver = manager(0x30);

    sender
        .send(Some(0x30), PGN_PROPRIETARY_A, &[7; 20], at(0))
        .unwrap();
    assert_eq!(
        sender.send(Some(0x30), 0xE800, &[8; 20], at(0)),
        Err(TransportError::Busy { sa: 0x20, da: 0x30 })
    );
    // Another destination is independent.
    assert!(sender.send(Some(0x31), PGN_PROPRIETARY_A, &[9; 20], at(0)).is_ok());

    // Receiver side: first RTS accepted, second refused.
    receiver.handle_frame(&rts_frame(0x20, 0x30, PGN_PROPRIETARY_A, 20), at(0));
    drain_frames(&mut receiver);
    receiver.handle_frame(&rts_frame(0x20, 0x30, 0xE900, 20), at(1));
    let replies = drain_frames(&mut receiver);
    assert_eq!(
        connection(&replies[0]),
        Some(ConnectionMessage::Abort {
            reason: AbortReason::ExistingTransportSession,
            pgn: 0xE900
        })
    );
    assert!(matches!(
        &drain_events(&mut receiver)[..],
        [TransportEvent::Failed {
            error: TransportError::Busy { sa: 0x20, da: 0x30 },
            ..
        }]
    ));

    // Finish the first transfer; the pair frees up.
    for sequence in 1..=3u8 {
        let packet = data_packet(&[7; 20], sequence, 0xFF).unwrap();
        receiver.handle_frame(&dt_frame(0x20, 0x30, &packet), at(2));
    }
    assert!(!receiver.is_pair_busy(0x20, 0x30));
    drain_frames(&mut receiver);
    receiver.handle_frame(&rts_frame(0x20, 0x30, 0xE900, 20), at(3));
    assert!(matches!(
        connection(&drain_frames(&mut receiver)[0]),
        Some(ConnectionMessage::ClearToSend { count: 3, next: 1, .. })
    ));
}

#[test]
/// Out-of-order and duplicated packets abort the message without delivery.
fn test_sequence_errors() {
    for (bad, reason) in [
        (3u8, AbortReason::BadSequenceNumber),
        (1u8, AbortReason::DuplicateSequenceNumber),
    ] {
        let mut receiver = manager(0x30);
        let payload = [1u8; 20];
        receiver.handle_frame(&rts_frame(0x20, 0x30, PGN_PROPRIETARY_A, 20), at(0));
        drain_frames(&mut receiver);
        let first = data_packet(&payload, 1, 0xFF).unwrap();
        receiver.handle_frame(&dt_frame(0x20, 0x30, &first), at(1));
        let wrong = data_packet(&payload, bad, 0xFF).unwrap();
        receiver.handle_frame(&dt_frame(0x20, 0x30, &wrong), at(2));

        let frames = drain_frames(&mut receiver);
        assert_eq!(
            connection(&frames[0]),
            Some(ConnectionMessage::Abort {
                reason,
                pgn: PGN_PROPRIETARY_A
            })
        );
        assert_eq!(
            drain_events(&mut receiver),
            [TransportEvent::Failed {
                key: TransferKey {
                    sa: 0x20,
                    da: 0x30,
                    pgn: PGN_PROPRIETARY_A
                },
                error: TransportError::Sequence {
                    expected: 2,
                    found: bad
                }
            }]
        );
        assert_eq!(receiver.active_transfers(), 0);
    }
}

#[test]
/// Without CTS the sender gives up after T3 and aborts.
fn test_sender_t3_timeout() {
    let mut sender = manager(0x20);
    let key = sender
        .send(Some(0x30), PGN_PROPRIETARY_A, &[0; 12], at(0))
        .unwrap();
    drain_frames(&mut sender);

    sender.poll(at(T3_MS - 1));
    assert!(drain_events(&mut sender).is_empty());
    sender.poll(at(T3_MS));
    assert_eq!(
        drain_events(&mut sender),
        [TransportEvent::Failed {
            key,
            error: TransportError::Timeout {
                timer: TransportTimer::T3
            }
        }]
    );
    assert!(matches!(
        connection(&drain_frames(&mut sender)[0]),
        Some(ConnectionMessage::Abort {
            reason: AbortReason::Timeout,
            ..
        })
    ));
}

#[test]
/// A hold CTS switches the sender to T4.
fn test_sender_held_t4_timeout() {
    let mut sender = manager(0x20);
    let key = sender
        .send(Some(0x30), PGN_PROPRIETARY_A, &[0; 12], at(0))
        .unwrap();
    let hold = ConnectionMessage::ClearToSend {
        count: 0,
        next: 0xFF,
        pgn: PGN_PROPRIETARY_A,
    };
    sender.handle_frame(&cm_frame(0x30, 0x20, &hold), at(100));
    assert_eq!(sender.state(&key), Some(TransferState::Held));
    sender.poll(at(100 + T4_MS));
    assert!(matches!(
        &drain_events(&mut sender)[..],
        [TransportEvent::Failed {
            error: TransportError::Timeout {
                timer: TransportTimer::T4
            },
            ..
        }]
    ));
}

#[test]
/// A silent sender gets `max_repeat_cts` repeated CTS, then T2 aborts.
fn test_cts_repeat_then_t2() {
    let mut receiver = manager(0x30);
    receiver.handle_frame(&rts_frame(0x20, 0x30, PGN_PROPRIETARY_A, 20), at(0));
    assert_eq!(drain_frames(&mut receiver).len(), 1);

    receiver.poll(at(TR_MS));
    receiver.poll(at(2 * TR_MS));
    let repeats = drain_frames(&mut receiver);
    assert_eq!(repeats.len(), DEFAULT_MAX_REPEAT_CTS as usize);
    assert!(repeats.iter().all(|f| matches!(
        connection(f),
        Some(ConnectionMessage::ClearToSend { count: 3, next: 1, .. })
    )));

    receiver.poll(at(2 * TR_MS + T2_MS - 1));
    assert!(drain_events(&mut receiver).is_empty());
    receiver.poll(at(2 * TR_MS + T2_MS));
    assert!(matches!(
        &drain_events(&mut receiver)[..],
        [TransportEvent::Failed {
            error: TransportError::Timeout {
                timer: TransportTimer::T2
            },
            ..
        }]
    ));
}

#[test]
/// A stalled data stream fails on T1.
fn test_receiver_t1_timeout() {
    let mut receiver = manager(0x30);
    receiver.handle_frame(&rts_frame(0x20, 0x30, PGN_PROPRIETARY_A, 20), at(0));
    let packet = data_packet(&[0; 20], 1, 0xFF).unwrap();
    receiver.handle_frame(&dt_frame(0x20, 0x30, &packet), at(10));
    receiver.poll(at(10 + T1_MS));
    assert!(matches!(
        &drain_events(&mut receiver)[..],
        [TransportEvent::Failed {
            error: TransportError::Timeout {
                timer: TransportTimer::T1
            },
            ..
        }]
    ));
}

#[test]
/// A busy ECU refuses new RTS and holds running transfers.
fn test_ecu_busy() {
    let mut receiver = TransportManager::new(0x30, TransportConfig::default().with_num_packets_recv(1));
    receiver.handle_frame(&rts_frame(0x20, 0x30, PGN_PROPRIETARY_A, 14), at(0));
    drain_frames(&mut receiver);

    receiver.set_busy(true, at(1));
    assert!(receiver.is_busy());
    receiver.handle_frame(&rts_frame(0x21, 0x30, PGN_PROPRIETARY_A, 14), at(1));
    assert!(matches!(
        connection(&drain_frames(&mut receiver)[0]),
        Some(ConnectionMessage::Abort {
            reason: AbortReason::SystemResources,
            ..
        })
    ));
    assert!(matches!(
        &drain_events(&mut receiver)[..],
        [TransportEvent::Failed {
            error: TransportError::Busy { sa: 0x21, da: 0x30 },
            ..
        }]
    ));

    // End of the first window: the sender is held.
    let packet = data_packet(&[0; 14], 1, 0xFF).unwrap();
    receiver.handle_frame(&dt_frame(0x20, 0x30, &packet), at(2));
    let key = TransferKey {
        sa: 0x20,
        da: 0x30,
        pgn: PGN_PROPRIETARY_A,
    };
    assert_eq!(receiver.state(&key), Some(TransferState::Holding));
    assert!(matches!(
        connection(&drain_frames(&mut receiver)[0]),
        Some(ConnectionMessage::ClearToSend { count: 0, .. })
    ));
    receiver.poll(at(2 + TH_MS));
    assert!(matches!(
        connection(&drain_frames(&mut receiver)[0]),
        Some(ConnectionMessage::ClearToSend { count: 0, .. })
    ));

    receiver.set_busy(false, at(600));
    assert_eq!(receiver.state(&key), Some(TransferState::Receiving));
    assert!(matches!(
        connection(&drain_frames(&mut receiver)[0]),
        Some(ConnectionMessage::ClearToSend { count: 1, next: 2, .. })
    ));
}

#[test]
/// Size limits, write queue and single-frame messages.
fn test_send_limits() {
    let mut sender = TransportManager::new(0x20, TransportConfig::default().with_write_queue_size(1));
    assert_eq!(
        sender.send(Some(0x30), PGN_PROPRIETARY_A, &[0; MAX_MESSAGE_LEN + 1], at(0)),
        Err(TransportError::MessageTooLarge {
            len: MAX_MESSAGE_LEN + 1
        })
    );
    sender
        .send(Some(0x30), PGN_PROPRIETARY_A, &[0; MAX_MESSAGE_LEN], at(0))
        .unwrap();
    assert_eq!(
        sender.send(Some(0x31), PGN_PROPRIETARY_A, &[0; 9], at(0)),
        Err(TransportError::WriteQueueFull)
    );
    drain_frames(&mut sender);
    drain_events(&mut sender);

    let key = sender.send(None, PGN_BROADCAST, &[1, 2, 3], at(0)).unwrap();
    let frames = drain_frames(&mut sender);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].id.pgn(), PGN_BROADCAST);
    assert_eq!(frames[0].payload(), &[1, 2, 3]);
    assert_eq!(drain_events(&mut sender), [TransportEvent::Sent { key }]);

    assert!(matches!(
        sender.send(Some(0x30), PGN_BROADCAST, &[1], at(0)),
        Err(TransportError::Build { .. })
    ));
}

#[test]
/// Peer aborts end only the matching transfer.
fn test_peer_abort() {
    let mut sender = manager(0x20);
    let key = sender
        .send(Some(0x30), PGN_PROPRIETARY_A, &[0; 12], at(0))
        .unwrap();
    let other = sender
        .send(Some(0x31), PGN_PROPRIETARY_A, &[0; 12], at(0))
        .unwrap();
    let abort = ConnectionMessage::Abort {
        reason: AbortReason::SystemResources,
        pgn: PGN_PROPRIETARY_A,
    };
    sender.handle_frame(&cm_frame(0x30, 0x20, &abort), at(5));
    assert_eq!(
        drain_events(&mut sender),
        [TransportEvent::Failed {
            key,
            error: TransportError::Aborted {
                reason: AbortReason::SystemResources
            }
        }]
    );
    assert_eq!(sender.state(&other), Some(TransferState::RtsSent));
}

#[test]
/// Plain frames addressed to us are reported as messages; others are not.
fn test_single_frame_delivery() {
    let mut receiver = manager(0x30);
    let to_us = CanFrame::new(
        CanId::builder(PGN_PROPRIETARY_A, 0x20)
            .to_destination(0x30)
            .build()
            .unwrap(),
        &[1, 2],
    );
    let to_other = CanFrame::new(
        CanId::builder(PGN_PROPRIETARY_A, 0x20)
            .to_destination(0x31)
            .build()
            .unwrap(),
        &[3],
    );
    receiver.handle_frame(&to_us, at(0));
    receiver.handle_frame(&to_other, at(0));
    assert_eq!(
        drain_events(&mut receiver),
        [TransportEvent::Received {
            sa: 0x20,
            da: 0x30,
            pgn: PGN_PROPRIETARY_A,
            payload: alloc::vec![1, 2]
        }]
    );
}
