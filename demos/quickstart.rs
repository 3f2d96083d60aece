//! # Quickstart Example
//!
//! Minimal tour of korri-xnet on a desktop host:
//! - Build a small CAN database
//! - Write physical values through a signal output session
//! - Let the session runner release the frames to a driver
//! - Read the values back from a signal input session
//!
//! ```bash
//! cargo run --example quickstart --features std
//! ```

use std::future::Future;
use std::sync::Arc;

use embassy_time::{Duration, Instant};
use korri_xnet::core::{Protocol, SignalValues};
use korri_xnet::database::{Cluster, Database, Frame, Signal, TimingType};
use korri_xnet::property::{ObjectRef, PropertyId};
use korri_xnet::protocol::transport::bus_frame::BusFrame;
use korri_xnet::protocol::transport::traits::{bus_driver::BusDriver, xnet_timer::XnetTimer};
use korri_xnet::session::{RxPort, Session, SessionMode};

/// Clock backed by `tokio::time`.
#[derive(Clone)]
struct HostTimer {
    origin: tokio::time::Instant,
}

impl XnetTimer for HostTimer {
    fn now(&self) -> Instant {
        Instant::from_micros(self.origin.elapsed().as_micros() as u64)
    }

    fn delay_until<'a>(&'a self, deadline: Instant) -> impl Future<Output = ()> + 'a {
        let target = self.origin + std::time::Duration::from_micros(deadline.as_micros());
        tokio::time::sleep_until(target)
    }
}

/// Prints every frame and loops it back into a receiving session.
struct LoopbackDriver {
    peer: RxPort,
    timer: HostTimer,
}

impl BusDriver for LoopbackDriver {
    type Error = ();

    async fn transmit<'a>(&'a mut self, frame: &'a BusFrame) -> Result<(), Self::Error> {
        let (id, _) = frame.key.raw_id();
        print!("   tx {:#05X} [{}] ", id, frame.payload.len());
        for byte in &frame.payload {
            print!("{:02X} ", byte);
        }
        println!();
        self.peer
            .on_frame_received(frame.key, &frame.payload, self.timer.now());
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    println!("=== korri-xnet Quickstart ===\n");

    // ======================================================================
    // 1. Describe the network
    // ======================================================================
    println!("1. Building the database");

    let mut db = Database::new("demo");
    let cluster = db
        .add_cluster(Cluster::new("Powertrain", Protocol::Can).with_baud_rate(500_000))
        .expect("cluster");
    let (_, engine) = db
        .add_frame_with_pdu(cluster, Frame::can("EngineData", 0x100, 8).cyclic(20_000))
        .expect("frame");
    db.add_signal(engine, Signal::new("EngineSpeed", 0, 16).scaled(0.25, 0.0).unit("rpm"))
        .expect("signal");
    db.add_signal(engine, Signal::new("CoolantTemp", 16, 8).scaled(1.0, -40.0).unit("degC"))
        .expect("signal");
    let (_, gear) = db
        .add_frame_with_pdu(
            cluster,
            Frame::can("GearRequest", 0x210, 2).with_timing(TimingType::Event, 0),
        )
        .expect("frame");
    db.add_signal(gear, Signal::new("Gear", 0, 4)).expect("signal");
    let db = Arc::new(db);
    println!("   {} frames on cluster Powertrain\n", db.cluster(cluster).expect("cluster").frames().len());

    // ======================================================================
    // 2. Open one session per direction
    // ======================================================================
    println!("2. Opening sessions");

    let timer = HostTimer {
        origin: tokio::time::Instant::now(),
    };
    let output = Session::open(
        "CAN1",
        db.clone(),
        cluster,
        &[],
        SessionMode::SignalOutSinglePoint,
        timer.clone(),
    )
    .expect("output session");
    let input = Session::open(
        "CAN2",
        db,
        cluster,
        &[],
        SessionMode::SignalInSinglePoint,
        timer.clone(),
    )
    .expect("input session");
    input.start().expect("start input");
    println!(
        "   output lists {:?}\n",
        output.get_property(ObjectRef::Session, PropertyId::SessionList)
    );

    // ======================================================================
    // 3. Write values and let the runner release them
    // ======================================================================
    println!("3. Transmitting for 50 ms");

    let mut values = SignalValues::new();
    values.insert("EngineSpeed".into(), 2250.0);
    values.insert("CoolantTemp".into(), 88.0);
    values.insert("Gear".into(), 4.0);
    output.write_signals(&values).expect("write signals");

    let driver = LoopbackDriver {
        peer: input.rx_port(),
        timer: timer.clone(),
    };
    let mut runner = output.runner(driver);
    let window = Duration::from_millis(50);
    let _ = tokio::time::timeout(
        std::time::Duration::from_micros(window.as_micros()),
        runner.drive(),
    )
    .await;

    // ======================================================================
    // 4. Read the values back
    // ======================================================================
    println!("\n4. Decoded on the receiving side");
    for (name, value) in input.read_signals().expect("read signals") {
        println!("   {name} = {value}");
    }
    println!("\n   overflow count: {}", input.num_overflow());
}
