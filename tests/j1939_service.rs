//! J1939 endpoint and service split over an in-memory CAN link.
mod helpers {
    include!("helpers/mod.rs");
}

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use helpers::{simulate_no_conflict, MockCanBus, TokioTimer};
use korri_xnet::{
    error::ClaimError,
    protocol::j1939::{
        address_claiming::claim_address,
        name::J1939Name,
        service::{EndpointCommand, J1939Endpoint, J1939Service},
        transport::{TransportConfig, TransportEvent},
        NULL_ADDRESS, PGN_ADDRESS_CLAIM, PGN_REQUEST,
    },
    protocol::transport::{can_frame::CanFrame, can_id::CanId, traits::can_bus::CanBus},
};

/// Claim of `address` by another node carrying `name`.
fn competing_claim(name: u64, address: u8) -> CanFrame {
    let id = CanId::builder(PGN_ADDRESS_CLAIM, address)
        .to_destination(0xFF)
        .with_priority(6)
        .build()
        .unwrap();
    CanFrame::new(id, &name.to_le_bytes())
}

fn node_name(identity: u32) -> J1939Name {
    J1939Name::builder()
        .identity_number(identity)
        .arbitrary_address_capable(true)
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_endpoint_claims_preferred_address() {
    let (dut_bus, host_bus) = MockCanBus::create_pair();
    tokio::spawn(simulate_no_conflict(host_bus));

    let endpoint = J1939Endpoint::claim(
        dut_bus,
        TokioTimer::new(),
        node_name(1),
        0x90,
        TransportConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(endpoint.address(), 0x90);
    assert_eq!(endpoint.transport().address(), 0x90);
}

#[tokio::test(start_paused = true)]
async fn test_endpoint_answers_claim_request() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut endpoint = J1939Endpoint::with_address(
        dut_bus,
        TokioTimer::new(),
        node_name(5),
        0x42,
        TransportConfig::default(),
    );

    let id = CanId::builder(PGN_REQUEST, NULL_ADDRESS)
        .to_destination(0xFF)
        .build()
        .unwrap();
    let request = CanFrame::new(id, &PGN_ADDRESS_CLAIM.to_le_bytes()[..3]);
    endpoint.handle_frame(&request).await.unwrap();

    let answer = host_bus.recv().await.unwrap();
    assert_eq!(answer.id.pgn(), PGN_ADDRESS_CLAIM);
    assert_eq!(answer.id.source_address(), 0x42);
    assert_eq!(answer.payload(), &node_name(5).raw().to_le_bytes());
}

#[tokio::test(start_paused = true)]
async fn test_service_parts_exchange_message() {
    let (dut_bus, host_bus) = MockCanBus::create_pair();
    let timer = TokioTimer::new();
    let commands: Channel<CriticalSectionRawMutex, EndpointCommand, 4> = Channel::new();
    let events: Channel<CriticalSectionRawMutex, TransportEvent, 4> = Channel::new();

    let endpoint = J1939Endpoint::with_address(
        dut_bus,
        timer.clone(),
        node_name(1),
        0x10,
        TransportConfig::default(),
    );
    let parts = J1939Service::new(endpoint, Some(&commands), Some(&events)).into_parts();
    let handle = parts.handle.unwrap();
    let events = parts.events.unwrap();
    let mut peer = J1939Endpoint::with_address(
        host_bus,
        timer,
        node_name(2),
        0x20,
        TransportConfig::default(),
    );

    let payload: Vec<u8> = (0..40u8).collect();
    let exchange = async {
        handle.send(Some(0x20), 0xEF00, &payload).await;
        tokio::join!(events.receive(), async { peer.next_event().await.unwrap() })
    };
    let (sent, received) = tokio::select! {
        result = parts.runner.drive() => panic!("runner stopped: {result:?}"),
        result = exchange => result,
    };
    assert!(matches!(sent, TransportEvent::Sent { key } if key.da == 0x20));
    assert_eq!(
        received,
        TransportEvent::Received {
            sa: 0x10,
            da: 0x20,
            pgn: 0xEF00,
            payload,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_busy_endpoint_refuses_connection() {
    let (dut_bus, host_bus) = MockCanBus::create_pair();
    let timer = TokioTimer::new();
    let commands: Channel<CriticalSectionRawMutex, EndpointCommand, 4> = Channel::new();
    let events: Channel<CriticalSectionRawMutex, TransportEvent, 4> = Channel::new();

    let endpoint = J1939Endpoint::with_address(
        dut_bus,
        timer.clone(),
        node_name(1),
        0x10,
        TransportConfig::default(),
    );
    let parts = J1939Service::new(endpoint, Some(&commands), Some(&events)).into_parts();
    let handle = parts.handle.unwrap();
    let mut peer = J1939Endpoint::with_address(
        host_bus,
        timer,
        node_name(2),
        0x20,
        TransportConfig::default(),
    );

    let exchange = async {
        handle.set_busy(true).await;
        tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;
        peer.send(Some(0x10), 0xEF00, &[0u8; 30]).await.unwrap();
        peer.next_event().await.unwrap()
    };
    let outcome = tokio::select! {
        result = parts.runner.drive() => panic!("runner stopped: {result:?}"),
        result = exchange => result,
    };
    assert!(matches!(outcome, TransportEvent::Failed { key, .. } if key.da == 0x10));
}

#[tokio::test(start_paused = true)]
async fn test_claim_conflict_won_defends_address() {
    let (mut dut_bus, mut host_bus) = MockCanBus::create_pair();
    let my_name = J1939Name::from_raw(0x1234_5678_90AB_CDEE);
    let their_name: u64 = 0x1234_5678_90AB_CDEF;
    let timer = TokioTimer::new();

    let (claimed, defence) = tokio::join!(
        claim_address(&mut dut_bus, &timer, my_name, 42),
        async {
            let first = host_bus.recv().await.unwrap();
            assert_eq!(first.id.source_address(), 42);
            host_bus.send(&competing_claim(their_name, 42)).await.unwrap();
            host_bus.recv().await.unwrap()
        }
    );
    assert_eq!(claimed.unwrap(), 42);
    assert_eq!(defence.id.pgn(), PGN_ADDRESS_CLAIM);
    assert_eq!(defence.id.source_address(), 42);
    assert_eq!(defence.payload(), &my_name.raw().to_le_bytes());
}

#[tokio::test(start_paused = true)]
async fn test_claim_conflict_lost_moves_to_arbitrary_range() {
    let (mut dut_bus, mut host_bus) = MockCanBus::create_pair();
    let my_name = J1939Name::from_raw(0x9234_5678_90AB_CDEF);
    let their_name: u64 = 0x1234_5678_90AB_CDEE;
    assert!(my_name.is_arbitrary_address_capable());
    let timer = TokioTimer::new();

    let (claimed, _) = tokio::join!(
        claim_address(&mut dut_bus, &timer, my_name, 247),
        async {
            let first = host_bus.recv().await.unwrap();
            assert_eq!(first.id.source_address(), 247);
            for address in [247, 128, 129] {
                host_bus
                    .send(&competing_claim(their_name, address))
                    .await
                    .unwrap();
            }
        }
    );
    assert_eq!(claimed.unwrap(), 130);
}

#[tokio::test(start_paused = true)]
async fn test_claim_conflict_lost_everywhere() {
    let (mut dut_bus, mut host_bus) = MockCanBus::create_pair();
    let my_name = J1939Name::from_raw(0x9234_5678_90AB_CDEF);
    let their_name: u64 = 0x1234_5678_90AB_CDEE;
    let timer = TokioTimer::new();

    let (claimed, _) = tokio::join!(
        claim_address(&mut dut_bus, &timer, my_name, 128),
        async {
            host_bus.recv().await.unwrap();
            for address in 128..=247 {
                host_bus
                    .send(&competing_claim(their_name, address))
                    .await
                    .unwrap();
            }
        }
    );
    assert!(matches!(claimed, Err(ClaimError::NoAddressAvailable)));

    let mut last = None;
    while let Ok(Ok(frame)) =
        tokio::time::timeout(tokio::time::Duration::from_millis(1), host_bus.recv()).await
    {
        last = Some(frame);
    }
    let cannot_claim = last.unwrap();
    assert_eq!(cannot_claim.id.source_address(), NULL_ADDRESS);
    assert_eq!(cannot_claim.payload(), &my_name.raw().to_le_bytes());
}

#[tokio::test(start_paused = true)]
async fn test_claim_conflict_lost_without_arbitrary_capability() {
    let (mut dut_bus, mut host_bus) = MockCanBus::create_pair();
    let my_name = J1939Name::from_raw(0x1234_5678_90AB_CDEF);
    let their_name: u64 = 0x1234_5678_90AB_CDEE;
    assert!(!my_name.is_arbitrary_address_capable());
    let timer = TokioTimer::new();

    let (claimed, cannot_claim) = tokio::join!(
        claim_address(&mut dut_bus, &timer, my_name, 42),
        async {
            host_bus.recv().await.unwrap();
            host_bus.send(&competing_claim(their_name, 42)).await.unwrap();
            host_bus.recv().await.unwrap()
        }
    );
    assert_eq!(claimed.unwrap(), NULL_ADDRESS);
    assert_eq!(cannot_claim.id.source_address(), NULL_ADDRESS);
    assert_eq!(cannot_claim.id.pgn(), PGN_ADDRESS_CLAIM);
}
