//! Defines the vocabulary shared by the database model, the codec engine
//! and the session layer.
//!
//! Every enumeration here has a stable numeric code so it can travel through
//! the `u32` slots of the property surface unchanged.
use alloc::collections::BTreeMap;
use alloc::string::String;
use embassy_time::Duration;

/// Largest payload any supported bus carries (FlexRay static/dynamic slot).
pub const MAX_PAYLOAD_LEN: usize = 254;
/// Classic CAN payload limit.
pub const CAN_MAX_PAYLOAD: usize = 8;
/// CAN FD payload limit.
pub const CAN_FD_MAX_PAYLOAD: usize = 64;
/// LIN response payload limit.
pub const LIN_MAX_PAYLOAD: usize = 8;

/// Physical signal values keyed by signal name.
pub type SignalValues = BTreeMap<String, f64>;

/// Generates the `code()` / `from_code()` pair for a fieldless enum.
macro_rules! coded_enum {
    ($name:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        impl $name {
            /// Numeric code used on the property surface.
            pub const fn code(self) -> u32 {
                match self {
                    $($name::$variant => $code,)+
                }
            }

            /// Inverse of [`Self::code`].
            pub const fn from_code(code: u32) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}
pub(crate) use coded_enum;

//==================================================================================PROTOCOL
/// Bus protocol carried by a cluster. A cluster has exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Protocol {
    Can,
    FlexRay,
    Lin,
    /// SAE J1939 transported over 29-bit CAN.
    J1939,
}

coded_enum!(Protocol {
    Can = 0,
    FlexRay = 1,
    Lin = 2,
    J1939 = 3,
});

impl Protocol {
    /// Largest payload a frame of this protocol may declare.
    pub const fn max_payload(self) -> usize {
        match self {
            Protocol::Can | Protocol::J1939 => CAN_FD_MAX_PAYLOAD,
            Protocol::FlexRay => MAX_PAYLOAD_LEN,
            Protocol::Lin => LIN_MAX_PAYLOAD,
        }
    }

    /// Whether starting an interface of this protocol needs a baud rate.
    ///
    /// FlexRay derives its timing from the cluster cycle parameters instead.
    pub const fn requires_baud_rate(self) -> bool {
        !matches!(self, Protocol::FlexRay)
    }
}

//==================================================================================BYTE_ORDER
/// Bit numbering of a signal inside its PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteOrder {
    /// Intel order: the start bit is the least significant bit.
    LittleEndian,
    /// Motorola/network order: the start bit is the most significant bit,
    /// numbered with the DBC sawtooth convention.
    BigEndian,
}

coded_enum!(ByteOrder {
    LittleEndian = 0,
    BigEndian = 1,
});

//==================================================================================DATA_TYPE
/// Numeric encoding of the raw bits of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    /// Two's complement integer.
    Signed,
    Unsigned,
    /// IEEE 754 float; only 32 and 64 bit widths are valid.
    Float,
}

coded_enum!(DataType {
    Signed = 0,
    Unsigned = 1,
    Float = 2,
});

//==================================================================================FLEXRAY_CHANNEL
/// FlexRay channel assignment of a frame or wakeup pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlexRayChannel {
    A,
    B,
    AB,
}

coded_enum!(FlexRayChannel {
    A = 1,
    B = 2,
    AB = 3,
});

impl FlexRayChannel {
    /// Two assignments collide when they share at least one physical channel.
    pub const fn overlaps(self, other: FlexRayChannel) -> bool {
        self.code() & other.code() != 0
    }
}

//==================================================================================TIMEOUT
/// How long a blocking queue operation may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// Return immediately with whatever is available.
    Poll,
    /// Wait at most this long.
    After(Duration),
    /// Wait until data arrives or the session stops.
    Infinite,
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        if duration.as_ticks() == 0 {
            Timeout::Poll
        } else {
            Timeout::After(duration)
        }
    }
}

/// Convert a property value in seconds to a tick duration.
///
/// Negative and NaN inputs collapse to zero.
pub fn duration_from_secs_f64(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::from_ticks(0);
    }
    Duration::from_micros((seconds * 1_000_000.0 + 0.5) as u64)
}

/// Inverse of [`duration_from_secs_f64`].
pub fn duration_as_secs_f64(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1_000_000.0
}
