//! `korri-xnet` library: a bus session engine for automotive networks
//! (CAN, CAN FD, J1939, LIN and FlexRay) in a `no_std` + `alloc`
//! environment. The crate exposes the network database model, the signal
//! codec, the session queues with their transmit scheduler, the J1939
//! transport stack and a typed property surface over all of them.
#![no_std]
extern crate alloc;
//==================================================================================
/// Core data types shared by the database, codec and sessions.
pub mod core;
/// Error taxonomy of every layer, with the uniform `XnetError` wrapper.
pub mod error;
/// Network database: clusters, frames, PDUs, signals, ECUs and LIN
/// schedules, addressed by typed handles.
pub mod database;
/// Bit-level signal codec between payload bytes and physical values.
pub mod infra;
/// Bus boundary (frame types, driver and timer traits) and J1939.
pub mod protocol;
/// Release planning for cyclic, event, LIN and FlexRay traffic.
pub mod scheduler;
/// Typed property surface over database objects and sessions.
pub mod property;
/// Session queue engine between the application and a bus driver.
pub mod session;
//==================================================================================
