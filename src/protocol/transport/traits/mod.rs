//! Abstraction traits for the bus boundary (frame driver, J1939 CAN link)
//! and for time.
pub mod bus_driver;
pub mod can_bus;
pub mod xnet_timer;
