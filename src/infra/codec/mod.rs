//! Signal codec: bit extraction and insertion over payload bytes
//! ([`bits`]) and frame-level encode/decode of physical values
//! ([`engine`]).
pub mod bits;
pub mod engine;
