//! Bus boundary: the frame representation exchanged with drivers, the
//! 29-bit J1939 identifier and frame types, and the runtime traits the
//! engine is generic over.
pub mod bus_frame;
pub mod can_frame;
pub mod can_id;
pub mod traits;

/// Recommended timeout for handing a single frame to a driver (ms).
///
/// Drivers backing [`traits::bus_driver::BusDriver`] or
/// [`traits::can_bus::CanBus`] should bound their own transmit path by this
/// value so a disconnected bus cannot stall the delivery context.
pub const BUS_SEND_TIMEOUT_MS: u32 = 100;
