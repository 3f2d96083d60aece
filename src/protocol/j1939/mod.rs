//! SAE J1939 on top of 29-bit CAN: NAME, address claim, the multi-packet
//! transport protocol (RTS/CTS and BAM) and an async endpoint tying them
//! to a [`CanBus`](crate::protocol::transport::traits::can_bus::CanBus).
pub mod address_claiming;
pub mod name;
pub mod service;
pub mod transport;

/// Address claimed / cannot claim (PGN 60928).
pub const PGN_ADDRESS_CLAIM: u32 = 0xEE00;
/// Request (PGN 59904).
pub const PGN_REQUEST: u32 = 0xEA00;
/// Transport protocol connection management (PGN 60416).
pub const PGN_TP_CM: u32 = 0xEC00;
/// Transport protocol data transfer (PGN 60160).
pub const PGN_TP_DT: u32 = 0xEB00;

/// Source address of a node that has not (or could not) claim an address.
pub const NULL_ADDRESS: u8 = 254;
/// Destination address of broadcast messages.
pub const GLOBAL_ADDRESS: u8 = 255;
/// First address of the self-configurable range.
pub const ARBITRARY_ADDRESS_FIRST: u8 = 128;
/// Last address of the self-configurable range.
pub const ARBITRARY_ADDRESS_LAST: u8 = 247;

/// Time a claimant listens for competing claims before using its address.
pub const ADDRESS_CLAIM_WINDOW_MS: u32 = 250;

/// Default priority of transport protocol frames.
pub const TP_PRIORITY: u8 = 7;
/// Default priority of single-frame application messages.
pub const DEFAULT_PRIORITY: u8 = 6;
