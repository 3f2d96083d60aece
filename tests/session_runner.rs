//! Session lifecycle, reads and delivery through `SessionRunner`, on a
//! paused tokio clock.
mod helpers {
    include!("helpers/mod.rs");
}

use embassy_time::Duration as XnetDuration;
use helpers::{body_database, RecordingDriver, TokioTimer};
use korri_xnet::{
    core::{Protocol, Timeout},
    error::SessionError,
    protocol::transport::{bus_frame::BusFrame, traits::xnet_timer::XnetTimer},
    session::{Session, SessionMode, SessionState},
};
use tokio::time::{sleep, timeout, Duration};

fn can(id: u32, payload: &[u8]) -> BusFrame {
    BusFrame::can(id, false, payload).unwrap()
}

fn stream(mode: SessionMode, timer: &TokioTimer) -> Session<TokioTimer> {
    let session = Session::open_stream("CAN1", Protocol::Can, mode, timer.clone()).unwrap();
    session
        .set_interface(session.interface().with_baud_rate(500_000))
        .unwrap();
    session
}

#[tokio::test(start_paused = true)]
async fn test_cyclic_frames_reach_driver() {
    let (db, cluster) = body_database();
    let timer = TokioTimer::new();
    let session = Session::open(
        "CAN1",
        db,
        cluster,
        &[],
        SessionMode::FrameOutSinglePoint,
        timer.clone(),
    )
    .unwrap();
    session.write(&[can(0x100, &[1, 2, 3, 4, 5, 6, 7, 8])]).unwrap();

    let driver = RecordingDriver::default();
    let mut runner = session.runner(driver.clone());
    let _ = timeout(Duration::from_millis(35), runner.drive()).await;

    let sent = driver.frames();
    assert_eq!(sent.len(), 4, "releases at 0, 10, 20 and 30 ms");
    for frame in &sent {
        assert_eq!(frame.key.raw_id(), (0x100, false));
        assert_eq!(frame.payload, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
    let stamps: Vec<u64> = sent
        .iter()
        .map(|f| f.timestamp.unwrap().as_millis())
        .collect();
    assert_eq!(stamps, vec![0, 10, 20, 30]);
}

#[tokio::test(start_paused = true)]
async fn test_event_frame_sent_once() {
    let (db, cluster) = body_database();
    let timer = TokioTimer::new();
    let session = Session::open(
        "CAN1",
        db,
        cluster,
        &[],
        SessionMode::FrameOutQueued,
        timer.clone(),
    )
    .unwrap();
    let driver = RecordingDriver::default();
    let mut runner = session.runner(driver.clone());

    tokio::select! {
        _ = runner.drive() => unreachable!("session still open"),
        _ = async {
            sleep(Duration::from_millis(5)).await;
            session.write(&[can(0x200, &[7])]).unwrap();
            sleep(Duration::from_millis(20)).await;
        } => {}
    }

    let events: Vec<BusFrame> = driver
        .frames()
        .into_iter()
        .filter(|f| f.key.raw_id().0 == 0x200)
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload, vec![7, 0, 0, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_transmit_failure_keeps_runner_alive() {
    let (db, cluster) = body_database();
    let session = Session::open(
        "CAN1",
        db,
        cluster,
        &[],
        SessionMode::FrameOutSinglePoint,
        TokioTimer::new(),
    )
    .unwrap();
    session.start().unwrap();
    let driver = RecordingDriver::failing();
    let mut runner = session.runner(driver.clone());
    let _ = timeout(Duration::from_millis(25), runner.drive()).await;
    assert_eq!(driver.frames().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_runner_returns_when_session_dropped() {
    let (db, cluster) = body_database();
    let session = Session::open(
        "CAN1",
        db,
        cluster,
        &[],
        SessionMode::FrameOutQueued,
        TokioTimer::new(),
    )
    .unwrap();
    session.start().unwrap();
    let mut runner = session.runner(RecordingDriver::default());
    drop(session);
    assert!(timeout(Duration::from_secs(1), runner.drive()).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_echo_loops_back_to_input() {
    let timer = TokioTimer::new();
    let output = stream(SessionMode::FrameOutStream, &timer);
    output
        .set_interface(output.interface().with_echo_tx(true))
        .unwrap();
    let input = stream(SessionMode::FrameInStream, &timer);
    input.start().unwrap();

    let mut runner = output
        .runner(RecordingDriver::default())
        .with_echo(input.rx_port());
    output.write(&[can(0x123, &[0xAB])]).unwrap();

    let frames = tokio::select! {
        _ = runner.drive() => unreachable!("session still open"),
        frames = input.read(10, Timeout::After(XnetDuration::from_millis(50))) => frames.unwrap(),
    };
    assert_eq!(frames.len(), 1);
    assert!(frames[0].echo);
    assert_eq!(frames[0].key.raw_id(), (0x123, false));
    assert_eq!(frames[0].payload, vec![0xAB]);
}

#[tokio::test(start_paused = true)]
async fn test_stream_baud_rate_flow() {
    let timer = TokioTimer::new();
    let session =
        Session::open_stream("CAN1", Protocol::Can, SessionMode::FrameInStream, timer).unwrap();
    assert_eq!(session.start(), Err(SessionError::BaudRateNotConfigured));
    assert_eq!(
        session.read(1, Timeout::Poll).await,
        Err(SessionError::BaudRateNotConfigured)
    );

    session
        .set_interface(session.interface().with_baud_rate(250_000))
        .unwrap();
    session.start().unwrap();
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(
        session.set_interface(session.interface().with_baud_rate(125_000)),
        Err(SessionError::ObjectStarted)
    );
    assert_eq!(session.interface().baud_rate, 250_000);
    assert!(session.read(1, Timeout::Poll).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_read_waits_for_frames() {
    let (db, cluster) = body_database();
    let timer = TokioTimer::new();
    let session = Session::open(
        "CAN1",
        db,
        cluster,
        &[],
        SessionMode::FrameInQueued,
        timer.clone(),
    )
    .unwrap();
    session.start().unwrap();
    let port = session.rx_port();

    let (frames, _) = tokio::join!(
        session.read(5, Timeout::After(XnetDuration::from_millis(100))),
        async {
            sleep(Duration::from_millis(10)).await;
            port.push(can(0x100, &[0; 8]).with_timestamp(timer.now()));
        }
    );
    let frames = frames.unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].timestamp.unwrap().as_millis(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_read_timeout_returns_empty() {
    let (db, cluster) = body_database();
    let session = Session::open(
        "CAN1",
        db,
        cluster,
        &[],
        SessionMode::FrameInQueued,
        TokioTimer::new(),
    )
    .unwrap();
    let started = tokio::time::Instant::now();
    let frames = session
        .read(5, Timeout::After(XnetDuration::from_millis(20)))
        .await
        .unwrap();
    assert!(frames.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(20));
}

#[tokio::test(start_paused = true)]
async fn test_stop_releases_blocked_reader() {
    let timer = TokioTimer::new();
    let session = stream(SessionMode::FrameInStream, &timer);
    session.start().unwrap();

    let (frames, _) = tokio::join!(session.read(5, Timeout::Infinite), async {
        sleep(Duration::from_millis(5)).await;
        session.stop();
    });
    assert!(frames.unwrap().is_empty());
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_overflow_keeps_newest_frames() {
    let timer = TokioTimer::new();
    let session = stream(SessionMode::FrameInStream, &timer);
    session
        .set_config(session.config().with_queue_size(3))
        .unwrap();
    session.start().unwrap();
    let port = session.rx_port();
    for id in 1..=5 {
        port.push(can(id, &[]));
    }
    assert_eq!(session.num_overflow(), 2);
    let ids: Vec<u32> = session
        .read(10, Timeout::Poll)
        .await
        .unwrap()
        .iter()
        .map(|f| f.key.raw_id().0)
        .collect();
    assert_eq!(ids, vec![3, 4, 5]);
}
