// Test doubles for the bus boundary and the clock used by integration tests.
use embassy_time::Instant;
use korri_xnet::core::Protocol;
use korri_xnet::database::{Cluster, ClusterRef, Database, Frame, Signal, TimingType};
use korri_xnet::protocol::transport::{
    bus_frame::BusFrame,
    can_frame::CanFrame,
    traits::{bus_driver::BusDriver, can_bus::CanBus, xnet_timer::XnetTimer},
};
use korri_xnet::session::RxPort;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Clone)]
#[allow(dead_code)]
/// Clock on top of `tokio::time`, so `start_paused` tests run instantly.
pub struct TokioTimer {
    origin: tokio::time::Instant,
}

#[allow(dead_code)]
impl TokioTimer {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl XnetTimer for TokioTimer {
    fn now(&self) -> Instant {
        Instant::from_micros(self.origin.elapsed().as_micros() as u64)
    }

    fn delay_until<'a>(&'a self, deadline: Instant) -> impl Future<Output = ()> + 'a {
        let target = self.origin + std::time::Duration::from_micros(deadline.as_micros());
        tokio::time::sleep_until(target)
    }
}

#[derive(Clone, Default)]
#[allow(dead_code)]
/// Driver that records every frame handed to it. A failing driver
/// records the attempt and returns an error.
pub struct RecordingDriver {
    frames: Arc<std::sync::Mutex<Vec<BusFrame>>>,
    failing: bool,
}

#[allow(dead_code)]
impl RecordingDriver {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn frames(&self) -> Vec<BusFrame> {
        self.frames.lock().unwrap().clone()
    }
}

impl BusDriver for RecordingDriver {
    type Error = ();

    async fn transmit<'a>(&'a mut self, frame: &'a BusFrame) -> Result<(), Self::Error> {
        self.frames.lock().unwrap().push(frame.clone());
        if self.failing {
            return Err(());
        }
        Ok(())
    }
}

#[allow(dead_code)]
/// Driver wired straight into the receive port of another session, as if
/// both sat on the same bus.
pub struct WireDriver {
    peer: RxPort,
    timer: TokioTimer,
}

#[allow(dead_code)]
impl WireDriver {
    pub fn new(peer: RxPort, timer: TokioTimer) -> Self {
        Self { peer, timer }
    }
}

impl BusDriver for WireDriver {
    type Error = ();

    async fn transmit<'a>(&'a mut self, frame: &'a BusFrame) -> Result<(), Self::Error> {
        self.peer
            .on_frame_received(frame.key, &frame.payload, self.timer.now());
        Ok(())
    }
}

#[derive(Clone)]
#[allow(dead_code)]
/// In-memory J1939 link reproducing the `CanBus` trait behavior.
pub struct MockCanBus {
    tx: mpsc::UnboundedSender<CanFrame>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<CanFrame>>>,
}

#[allow(dead_code)]
impl MockCanBus {
    /// Construct a pair of interconnected buses (DUT ↔ host).
    pub fn create_pair() -> (Self, Self) {
        let (dut_tx, host_rx) = mpsc::unbounded_channel();
        let (host_tx, dut_rx) = mpsc::unbounded_channel();

        let dut_bus = Self {
            tx: dut_tx,
            rx: Arc::new(Mutex::new(dut_rx)),
        };

        let host_bus = Self {
            tx: host_tx,
            rx: Arc::new(Mutex::new(host_rx)),
        };

        (dut_bus, host_bus)
    }
}

impl CanBus for MockCanBus {
    type Error = ();

    async fn send<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), Self::Error> {
        self.tx.send(frame.clone()).map_err(|_| ())?;
        Ok(())
    }

    async fn recv<'a>(&'a mut self) -> Result<CanFrame, Self::Error> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(())
    }
}

#[allow(dead_code)]
/// Utility loop: drain incoming claims without responding (no conflict).
pub async fn simulate_no_conflict(mut host_bus: MockCanBus) {
    while let Ok(_frame) = host_bus.recv().await {}
}

#[allow(dead_code)]
/// CAN cluster "Body": `EngineData` (0x100, 8 bytes, every 10 ms) with
/// `EngineSpeed` and `CoolantTemp`, and the event frame `Command` (0x200,
/// 4 bytes) with `Mode`.
pub fn body_database() -> (Arc<Database>, ClusterRef) {
    let mut db = Database::new("vehicle");
    let cluster = db.add_cluster(Cluster::new("Body", Protocol::Can)).unwrap();
    let (_, engine) = db
        .add_frame_with_pdu(cluster, Frame::can("EngineData", 0x100, 8).cyclic(10_000))
        .unwrap();
    db.add_signal(engine, Signal::new("EngineSpeed", 0, 16).scaled(0.25, 0.0).unit("rpm"))
        .unwrap();
    db.add_signal(engine, Signal::new("CoolantTemp", 16, 8).scaled(1.0, -40.0).unit("degC"))
        .unwrap();
    let (_, command) = db
        .add_frame_with_pdu(
            cluster,
            Frame::can("Command", 0x200, 4).with_timing(TimingType::Event, 0),
        )
        .unwrap();
    db.add_signal(command, Signal::new("Mode", 0, 8)).unwrap();
    (Arc::new(db), cluster)
}
