//! Minimal abstraction for an asynchronous 29-bit CAN link, as used by the
//! J1939 address claim and transport endpoint.
use crate::protocol::j1939::transport::TransportManager;
use crate::protocol::transport::can_frame::CanFrame;
use futures_util::Future;

/// Contract to send and receive J1939 frames asynchronously.
pub trait CanBus {
    type Error: core::fmt::Debug;
    /// Emit a frame on the bus.
    fn send<'a>(
        &'a mut self,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<(), Self::Error>> + 'a;
    /// Retrieve the next available frame, waiting until one arrives.
    fn recv<'a>(&'a mut self) -> impl Future<Output = Result<CanFrame, Self::Error>> + 'a;
    /// Exchange node settings with links that keep their own (address,
    /// ECU busy, transport timers). Called before every endpoint step.
    fn sync_transport(&mut self, _transport: &mut TransportManager) {}
}
