//! Protocol layers: the bus boundary shared by every session and the
//! J1939 network management and transport stack.
pub mod j1939;
pub mod transport;
