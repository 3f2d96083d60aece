//! J1939 NAME field (64 bits). It uniquely identifies a controller
//! application on the network and arbitrates address claims: the lower
//! NAME wins.
//!
//! # Bit layout
//!
//! ```text
//! Bits  0-20  (21 bits) : Identity number
//! Bits 21-31  (11 bits) : Manufacturer code
//! Bits 32-34  ( 3 bits) : ECU instance
//! Bits 35-39  ( 5 bits) : Function instance
//! Bits 40-47  ( 8 bits) : Function
//! Bit  48     ( 1 bit ) : Reserved
//! Bits 49-55  ( 7 bits) : Vehicle system
//! Bits 56-59  ( 4 bits) : Vehicle system instance
//! Bits 60-62  ( 3 bits) : Industry group
//! Bit  63     ( 1 bit ) : Arbitrary address capable
//! ```
use core::fmt;

/// Typed wrapper around the raw NAME.
///
/// ```
/// use korri_xnet::protocol::j1939::name::J1939Name;
///
/// let name = J1939Name::builder()
///     .identity_number(0x1234)
///     .manufacturer_code(0x2A)
///     .function(0x81)
///     .industry_group(1)
///     .arbitrary_address_capable(true)
///     .build();
///
/// assert_eq!(name.identity_number(), 0x1234);
/// assert!(name.is_arbitrary_address_capable());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct J1939Name(u64);

/// Extract `width` bits starting at `shift`.
const fn field(raw: u64, shift: u32, width: u32) -> u64 {
    (raw >> shift) & ((1 << width) - 1)
}

impl J1939Name {
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn builder() -> J1939NameBuilder {
        J1939NameBuilder { raw: 0 }
    }

    #[inline]
    pub const fn identity_number(&self) -> u32 {
        field(self.0, 0, 21) as u32
    }

    #[inline]
    pub const fn manufacturer_code(&self) -> u16 {
        field(self.0, 21, 11) as u16
    }

    #[inline]
    pub const fn ecu_instance(&self) -> u8 {
        field(self.0, 32, 3) as u8
    }

    #[inline]
    pub const fn function_instance(&self) -> u8 {
        field(self.0, 35, 5) as u8
    }

    #[inline]
    pub const fn function(&self) -> u8 {
        field(self.0, 40, 8) as u8
    }

    #[inline]
    pub const fn vehicle_system(&self) -> u8 {
        field(self.0, 49, 7) as u8
    }

    #[inline]
    pub const fn vehicle_system_instance(&self) -> u8 {
        field(self.0, 56, 4) as u8
    }

    #[inline]
    pub const fn industry_group(&self) -> u8 {
        field(self.0, 60, 3) as u8
    }

    /// Whether the node may fall back to the 128..=247 address range.
    #[inline]
    pub const fn is_arbitrary_address_capable(&self) -> bool {
        field(self.0, 63, 1) == 1
    }

    /// Address-claim arbitration: the numerically lower NAME keeps the
    /// address.
    #[inline]
    pub const fn wins_against(&self, other: J1939Name) -> bool {
        self.0 < other.0
    }
}

impl From<u64> for J1939Name {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<J1939Name> for u64 {
    fn from(name: J1939Name) -> Self {
        name.0
    }
}

impl fmt::Display for J1939Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "J1939Name {{ identity: {}, mfg: {}, function: {}, system: {}, aac: {} }}",
            self.identity_number(),
            self.manufacturer_code(),
            self.function(),
            self.vehicle_system(),
            self.is_arbitrary_address_capable()
        )
    }
}

/// Fluent builder for [`J1939Name`]. Values wider than their field are
/// truncated to the field width.
#[derive(Debug, Clone, Copy, Default)]
pub struct J1939NameBuilder {
    raw: u64,
}

impl J1939NameBuilder {
    const fn set(mut self, shift: u32, width: u32, value: u64) -> Self {
        let mask = ((1u64 << width) - 1) << shift;
        self.raw = (self.raw & !mask) | ((value << shift) & mask);
        self
    }

    pub const fn identity_number(self, value: u32) -> Self {
        self.set(0, 21, value as u64)
    }

    pub const fn manufacturer_code(self, value: u16) -> Self {
        self.set(21, 11, value as u64)
    }

    pub const fn ecu_instance(self, value: u8) -> Self {
        self.set(32, 3, value as u64)
    }

    pub const fn function_instance(self, value: u8) -> Self {
        self.set(35, 5, value as u64)
    }

    pub const fn function(self, value: u8) -> Self {
        self.set(40, 8, value as u64)
    }

    pub const fn vehicle_system(self, value: u8) -> Self {
        self.set(49, 7, value as u64)
    }

    pub const fn vehicle_system_instance(self, value: u8) -> Self {
        self.set(56, 4, value as u64)
    }

    pub const fn industry_group(self, value: u8) -> Self {
        self.set(60, 3, value as u64)
    }

    pub const fn arbitrary_address_capable(self, value: bool) -> Self {
        self.set(63, 1, value as u64)
    }

    pub const fn build(self) -> J1939Name {
        J1939Name(self.raw)
    }
}
