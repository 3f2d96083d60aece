//! Error definitions shared across library modules.
//! Each type models one failure domain (database validation, codec,
//! session lifecycle, property access, J1939 transport). [`XnetError`]
//! composes them and [`XnetError::kind`] folds every variant onto the
//! engine-wide [`ErrorKind`] taxonomy.
use alloc::string::String;
use thiserror_no_std::Error;

use crate::property::{ObjectClass, ValueKind};
use crate::protocol::j1939::transport::{AbortReason, TransportTimer};

//==================================================================================ERROR_KIND
/// Engine-wide error taxonomy, the shape a binding layer maps onto its own
/// status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    ConfigurationMismatch,
    UnknownSignal,
    PayloadTooShort,
    ObjectStarted,
    BaudRateNotConfigured,
    QueueFull,
    Sequence,
    TransportTimeout,
    Busy,
    SchedulingConflict,
    /// Invalid database content or a dangling object reference.
    InvalidDatabase,
    /// Wrong property id, class, kind or access mode.
    InvalidProperty,
    /// Operation not allowed by the session mode or interface settings.
    InvalidOperation,
    /// Transfer aborted by the remote node.
    Aborted,
}

//==================================================================================BIT_ACCESS
#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Errors raised while reading or writing a bit field in a payload buffer.
pub enum BitAccessError {
    /// Field extends past the end of the buffer.
    #[error("Attempted to access out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Field width outside the 1..=64 range.
    #[error("Cannot access more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
}

//==================================================================================DATABASE
#[derive(Debug, Error, Clone, PartialEq)]
/// Structural problems found in the database model.
pub enum DatabaseError {
    /// Handle does not point at an object of the database.
    #[error("Invalid {kind} reference {index}")]
    InvalidReference { kind: &'static str, index: u32 },
    /// Two objects of the same scope share a name.
    #[error("Duplicate name {name}")]
    DuplicateName { name: String },
    /// Object added to a cluster of another protocol.
    #[error("Object {object} is not valid on a {protocol:?} cluster")]
    ProtocolMismatch {
        object: String,
        protocol: crate::core::Protocol,
    },
    /// Frame identifier out of range for the protocol.
    #[error("Frame {frame} has invalid identifier {id:#X}")]
    InvalidFrameId { frame: String, id: u32 },
    /// Declared payload above the protocol maximum.
    #[error("Payload of {object} is {len} bytes, protocol maximum is {max}")]
    PayloadTooLarge {
        object: String,
        len: usize,
        max: usize,
    },
    /// A signal does not fit inside its PDU payload.
    #[error("Signal {signal} needs {required} bytes, payload holds {available}")]
    SignalExceedsPayload {
        signal: String,
        required: usize,
        available: usize,
    },
    /// A PDU mapping does not fit inside the frame payload.
    #[error("PDU {pdu} does not fit in frame {frame}")]
    PduExceedsFrame { pdu: String, frame: String },
    /// PDU start bits must be byte aligned.
    #[error("PDU {pdu} mapped at unaligned start bit {start_bit}")]
    UnalignedPdu { pdu: String, start_bit: u16 },
    /// Signal width not valid for its data type.
    #[error("Signal {signal} has invalid width {bits} for its data type")]
    InvalidSignalWidth { signal: String, bits: u8 },
    /// Multiplexing inconsistency in a PDU.
    #[error("Multiplexing error in {pdu}: {detail}")]
    InvalidMux { pdu: String, detail: &'static str },
    /// FlexRay cycle layout that cannot be scheduled.
    #[error("Timing error in {cluster}: {detail}")]
    InvalidTiming {
        cluster: String,
        detail: &'static str,
    },
    /// Malformed LIN schedule.
    #[error("Schedule error in {schedule}: {detail}")]
    InvalidSchedule {
        schedule: String,
        detail: &'static str,
    },
}

impl DatabaseError {
    /// Stable non-zero status code reported through `ConfigStatus`.
    pub const fn code(&self) -> u32 {
        match self {
            DatabaseError::InvalidReference { .. } => 1,
            DatabaseError::DuplicateName { .. } => 2,
            DatabaseError::ProtocolMismatch { .. } => 3,
            DatabaseError::InvalidFrameId { .. } => 4,
            DatabaseError::PayloadTooLarge { .. } => 5,
            DatabaseError::SignalExceedsPayload { .. } => 6,
            DatabaseError::PduExceedsFrame { .. } => 7,
            DatabaseError::UnalignedPdu { .. } => 8,
            DatabaseError::InvalidSignalWidth { .. } => 9,
            DatabaseError::InvalidMux { .. } => 10,
            DatabaseError::InvalidSchedule { .. } => 11,
            DatabaseError::InvalidTiming { .. } => 12,
        }
    }
}

//================================================================================CODEC_ERROR
#[derive(Debug, Error, Clone, PartialEq)]
/// Failures of the frame codec.
pub enum CodecError {
    /// Name not present in the frame or PDU.
    #[error("Unknown signal {name}")]
    UnknownSignal { name: String },
    /// Raw payload shorter than required by the placed signals.
    #[error("Payload too short -> required: {required}, available: {available}")]
    PayloadTooShort { required: usize, available: usize },
    /// Mux selector inconsistent with the written dynamic signals.
    #[error("Configuration mismatch on {signal}: {detail}")]
    ConfigurationMismatch {
        signal: String,
        detail: &'static str,
    },
    /// Database lookup failed.
    #[error("Database error: {source}")]
    Database { source: DatabaseError },
    /// Bit-level access failed.
    #[error("Bit access error: {source}")]
    BitAccess { source: BitAccessError },
}

impl From<DatabaseError> for CodecError {
    fn from(source: DatabaseError) -> Self {
        CodecError::Database { source }
    }
}

impl From<BitAccessError> for CodecError {
    fn from(source: BitAccessError) -> Self {
        CodecError::BitAccess { source }
    }
}

//================================================================================PROPERTY_ERROR
#[derive(Debug, Error, Clone, PartialEq)]
/// Failures of the generic property accessor.
pub enum PropertyError {
    /// Property not defined on this object class.
    #[error("Property {property} does not apply to {class:?}")]
    WrongClass {
        property: &'static str,
        class: ObjectClass,
    },
    /// Value kind differs from the declared kind.
    #[error("Property {property} expects {expected:?}, got {found:?}")]
    TypeMismatch {
        property: &'static str,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("Property {property} is read-only")]
    ReadOnly { property: &'static str },
    #[error("Property {property} is write-only")]
    WriteOnly { property: &'static str },
    /// Interface property written while the session runs.
    #[error("Property {property} can only be set while the session is stopped")]
    ObjectStarted { property: &'static str },
    /// Value of the right kind but outside the accepted domain.
    #[error("Invalid value for property {property}")]
    InvalidValue { property: &'static str },
    /// Referenced object does not exist.
    #[error("Database error: {source}")]
    Database { source: DatabaseError },
}

impl From<DatabaseError> for PropertyError {
    fn from(source: DatabaseError) -> Self {
        PropertyError::Database { source }
    }
}

//================================================================================SESSION_ERROR
#[derive(Debug, Error, Clone, PartialEq)]
/// Failures of the session lifecycle and queue operations.
pub enum SessionError {
    /// Mutation attempted while the session is running.
    #[error("Object started")]
    ObjectStarted,
    /// Interface started without a baud rate.
    #[error("Baud rate not configured")]
    BaudRateNotConfigured,
    /// Outbound queue has no room for the frame.
    #[error("Queue full")]
    QueueFull,
    /// Two cyclic frames occupy the same slot with overlapping phase.
    #[error("Scheduling conflict between {first} and {second}")]
    SchedulingConflict { first: String, second: String },
    /// Frame name or identifier not part of the session.
    #[error("Unknown frame {name}")]
    UnknownFrame { name: String },
    /// Operation not supported by the session mode.
    #[error("Operation {operation} not supported in this session mode")]
    InvalidMode { operation: &'static str },
    /// Listen-only interfaces never transmit.
    #[error("Interface is listen-only")]
    ListenOnly,
    /// Blocking read ended because the session stopped or closed.
    #[error("Session not running")]
    NotRunning,
    /// LIN schedule index out of range or interface not master.
    #[error("Invalid LIN schedule request {index}")]
    InvalidSchedule { index: u32 },
    /// Payload longer than the frame or protocol allows.
    #[error("Payload of {len} bytes exceeds maximum {max}")]
    PayloadTooLong { len: usize, max: usize },
    /// Queues hold at least one frame.
    #[error("Queue size must be at least 1")]
    InvalidQueueSize,
    #[error("Database error: {source}")]
    Database { source: DatabaseError },
    #[error("Codec error: {source}")]
    Codec { source: CodecError },
}

impl From<DatabaseError> for SessionError {
    fn from(source: DatabaseError) -> Self {
        SessionError::Database { source }
    }
}

impl From<CodecError> for SessionError {
    fn from(source: CodecError) -> Self {
        SessionError::Codec { source }
    }
}

//==================================================================================TRANSPORT
#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Failures of one J1939 multi-packet transfer. They only ever abort the
/// affected message.
pub enum TransportError {
    /// Data packet out of order or duplicated.
    #[error("Sequence error -> expected: {expected}, found: {found}")]
    Sequence { expected: u8, found: u8 },
    /// A transport timer expired.
    #[error("Transport timeout ({timer:?})")]
    Timeout { timer: TransportTimer },
    /// A transfer between these two addresses is already active.
    #[error("Transfer {sa} -> {da} busy")]
    Busy { sa: u8, da: u8 },
    /// Remote node sent a connection abort.
    #[error("Aborted by peer: {reason:?}")]
    Aborted { reason: AbortReason },
    /// Payload above the 1785 byte transport limit.
    #[error("Message of {len} bytes is too large")]
    MessageTooLarge { len: usize },
    /// Pending write queue exhausted.
    #[error("Write queue full")]
    WriteQueueFull,
    /// Identifier rules violated for this PGN/destination.
    #[error("Frame build failed: {source}")]
    Build { source: CanIdBuildError },
}

impl From<CanIdBuildError> for TransportError {
    fn from(source: CanIdBuildError) -> Self {
        TransportError::Build { source }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors that can occur while building a 29-bit CAN identifier.
pub enum CanIdBuildError {
    /// Provided parameters do not produce a valid identifier.
    #[error("Invalid data")]
    InvalidData,
    /// Attempt to build a broadcast message (PDU2) with PF < 240.
    #[error("Invalid for broadcast message: PF is too low")]
    InvalidForBroadcast,
    /// Attempt to send an addressed message (PDU1) with PF ≥ 240.
    #[error("Invalid for addressed message: PF is too high: {pf}")]
    InvalidForFocusedMessage { pf: u8 },
    /// In PDU1 the lower 8 bits of the PGN must remain zero.
    #[error("PDU1 PGNs require PS = 0")]
    PsFocusMessageMustBeNull,
}

#[derive(Debug, Error)]
/// Failures while extracting information from a raw CAN frame.
pub enum ExtractionError {
    /// The frame is not the expected PGN.
    #[error("Invalid incoming J1939 frame")]
    InvalidIncomingFrame,
    /// Payload length does not match the PGN definition.
    #[error("Invalid data length for PGN")]
    InvalidDataLen,
}

#[derive(Error, Debug)]
/// Errors encountered while claiming or defending an address.
pub enum ClaimError<E: core::fmt::Debug> {
    /// CAN link rejected the frame during transmission.
    #[error("CAN bus send error: {0:?}")]
    SendError(E),
    /// Unable to receive frames from the link.
    #[error("CAN bus receive error: {0:?}")]
    ReceiveError(E),
    /// No free address was available on the segment.
    #[error("No address available")]
    NoAddressAvailable,
    /// Failed to extract the NAME from a claim.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Unable to build the CAN identifier.
    #[error(transparent)]
    BuildErr(#[from] CanIdBuildError),
}

#[derive(Error, Debug)]
/// Errors of the async J1939 endpoint.
pub enum EndpointError<E: core::fmt::Debug> {
    #[error("CAN bus send error: {0:?}")]
    Send(E),
    #[error("CAN bus receive error: {0:?}")]
    Receive(E),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Address claim failed: {0:?}")]
    Claim(ClaimError<E>),
}

impl<E: core::fmt::Debug> From<ClaimError<E>> for EndpointError<E> {
    fn from(err: ClaimError<E>) -> Self {
        EndpointError::Claim(err)
    }
}

//==================================================================================XNET_ERROR
#[derive(Debug, Error, Clone, PartialEq)]
/// Any engine error, as surfaced to a binding layer.
pub enum XnetError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl XnetError {
    /// Fold the error onto the engine taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            XnetError::Database(_) => ErrorKind::InvalidDatabase,
            XnetError::Codec(err) => codec_kind(err),
            XnetError::Property(err) => match err {
                PropertyError::ObjectStarted { .. } => ErrorKind::ObjectStarted,
                PropertyError::Database { .. } => ErrorKind::InvalidDatabase,
                _ => ErrorKind::InvalidProperty,
            },
            XnetError::Session(err) => match err {
                SessionError::ObjectStarted => ErrorKind::ObjectStarted,
                SessionError::BaudRateNotConfigured => ErrorKind::BaudRateNotConfigured,
                SessionError::QueueFull => ErrorKind::QueueFull,
                SessionError::SchedulingConflict { .. } => ErrorKind::SchedulingConflict,
                SessionError::Database { .. } => ErrorKind::InvalidDatabase,
                SessionError::Codec { source } => codec_kind(source),
                SessionError::UnknownFrame { .. }
                | SessionError::InvalidMode { .. }
                | SessionError::ListenOnly
                | SessionError::NotRunning
                | SessionError::InvalidSchedule { .. }
                | SessionError::PayloadTooLong { .. } => ErrorKind::InvalidOperation,
                SessionError::InvalidQueueSize => ErrorKind::InvalidProperty,
            },
            XnetError::Transport(err) => match err {
                TransportError::Sequence { .. } => ErrorKind::Sequence,
                TransportError::Timeout { .. } => ErrorKind::TransportTimeout,
                TransportError::Busy { .. } => ErrorKind::Busy,
                TransportError::Aborted { .. } => ErrorKind::Aborted,
                TransportError::WriteQueueFull => ErrorKind::QueueFull,
                TransportError::MessageTooLarge { .. } | TransportError::Build { .. } => {
                    ErrorKind::InvalidOperation
                }
            },
        }
    }
}

fn codec_kind(err: &CodecError) -> ErrorKind {
    match err {
        CodecError::UnknownSignal { .. } => ErrorKind::UnknownSignal,
        CodecError::PayloadTooShort { .. } => ErrorKind::PayloadTooShort,
        CodecError::ConfigurationMismatch { .. } => ErrorKind::ConfigurationMismatch,
        CodecError::Database { .. } => ErrorKind::InvalidDatabase,
        CodecError::BitAccess { .. } => ErrorKind::PayloadTooShort,
    }
}
