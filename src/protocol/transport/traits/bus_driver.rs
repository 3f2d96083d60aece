//! Outbound half of the bus boundary. The inbound half is
//! [`crate::session::RxPort`], which the driver feeds from its receive
//! path.
use crate::protocol::transport::bus_frame::BusFrame;
use futures_util::Future;

/// Driver that puts frames on the wire.
///
/// The frame timestamp, when present, is the time the scheduler released
/// the frame; drivers may use it for hardware-timed transmission.
pub trait BusDriver {
    type Error: core::fmt::Debug;
    /// Transmit one frame.
    fn transmit<'a>(
        &'a mut self,
        frame: &'a BusFrame,
    ) -> impl Future<Output = Result<(), Self::Error>> + 'a;
}
