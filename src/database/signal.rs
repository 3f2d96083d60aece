//! Signal and subframe definitions: bit placement, numeric encoding and
//! multiplexing role.
use alloc::string::String;
use alloc::vec::Vec;

use super::{PduRef, SignalRef, SubframeRef};
use crate::core::{ByteOrder, DataType};
use crate::error::DatabaseError;
use crate::infra::codec::bits::BitLayout;

/// Role of a signal inside a multiplexed PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MuxRole {
    /// Always present.
    Static,
    /// Mux selector; its raw value picks the subframe.
    Selector,
    /// Present only when the selector matches this subframe.
    Dynamic(SubframeRef),
}

/// Bit placement and encoding of one signal.
///
/// `physical = raw * scale_fac + scale_off`, where `raw` is the bit field
/// read in `byte_order` and interpreted per `data_type`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Signal {
    pub name: String,
    /// Start bit relative to the owning PDU (LSB for Intel, MSB for Motorola).
    pub start_bit: u16,
    pub num_bits: u8,
    pub byte_order: ByteOrder,
    pub data_type: DataType,
    pub scale_fac: f64,
    pub scale_off: f64,
    pub min: f64,
    pub max: f64,
    pub unit: String,
    /// Default physical value.
    pub default: f64,
    pub comment: String,
    pub(crate) pdu: PduRef,
    pub(crate) mux_role: MuxRole,
}

impl Signal {
    /// Unsigned Intel signal with unit scaling and full-width range.
    pub fn new(name: &str, start_bit: u16, num_bits: u8) -> Self {
        let max = if num_bits >= 64 {
            u64::MAX as f64
        } else {
            ((1u128 << num_bits) - 1) as f64
        };
        Self {
            name: String::from(name),
            start_bit,
            num_bits,
            byte_order: ByteOrder::LittleEndian,
            data_type: DataType::Unsigned,
            scale_fac: 1.0,
            scale_off: 0.0,
            min: 0.0,
            max,
            unit: String::new(),
            default: 0.0,
            comment: String::new(),
            pdu: PduRef(u32::MAX),
            mux_role: MuxRole::Static,
        }
    }

    /// Motorola bit numbering.
    pub fn big_endian(mut self) -> Self {
        self.byte_order = ByteOrder::BigEndian;
        self
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// Two's complement encoding; the range is reset to the signed span.
    pub fn signed(mut self) -> Self {
        self.data_type = DataType::Signed;
        let half = if self.num_bits >= 64 {
            i64::MAX as f64
        } else {
            ((1u128 << self.num_bits.saturating_sub(1)) - 1) as f64
        };
        self.min = -half - 1.0;
        self.max = half;
        self
    }

    /// IEEE float encoding (32 or 64 bits).
    pub fn float(mut self) -> Self {
        self.data_type = DataType::Float;
        self.min = f64::MIN;
        self.max = f64::MAX;
        self
    }

    /// Linear conversion; the range follows the scaling.
    pub fn scaled(mut self, scale_fac: f64, scale_off: f64) -> Self {
        let (lo, hi) = (
            self.min * scale_fac + scale_off,
            self.max * scale_fac + scale_off,
        );
        self.scale_fac = scale_fac;
        self.scale_off = scale_off;
        self.min = lo.min(hi);
        self.max = lo.max(hi);
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = String::from(unit);
        self
    }

    pub fn default_value(mut self, default: f64) -> Self {
        self.default = default;
        self
    }

    /// Owning PDU.
    pub fn pdu(&self) -> PduRef {
        self.pdu
    }

    pub fn mux_role(&self) -> MuxRole {
        self.mux_role
    }

    /// Bit layout of the signal inside its PDU payload.
    pub fn layout(&self) -> Result<BitLayout, DatabaseError> {
        BitLayout::new(self.start_bit, self.num_bits, self.byte_order).map_err(|_| {
            DatabaseError::InvalidSignalWidth {
                signal: self.name.clone(),
                bits: self.num_bits,
            }
        })
    }

    /// Whether `physical` lies inside the declared range.
    pub fn in_range(&self, physical: f64) -> bool {
        physical >= self.min && physical <= self.max
    }

    pub(crate) fn check(&self, pdu_len: usize) -> Result<(), DatabaseError> {
        let width_ok = match self.data_type {
            DataType::Float => self.num_bits == 32 || self.num_bits == 64,
            DataType::Signed | DataType::Unsigned => (1..=64).contains(&self.num_bits),
        };
        if !width_ok {
            return Err(DatabaseError::InvalidSignalWidth {
                signal: self.name.clone(),
                bits: self.num_bits,
            });
        }
        let required = self.layout()?.required_len();
        if required > pdu_len {
            return Err(DatabaseError::SignalExceedsPayload {
                signal: self.name.clone(),
                required,
                available: pdu_len,
            });
        }
        Ok(())
    }
}

//==================================================================================SUBFRAME
/// One multiplexed variant of a PDU.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Subframe {
    pub name: String,
    /// Raw selector value choosing this variant.
    pub mux_value: u64,
    pub(crate) pdu: PduRef,
    pub(crate) signals: Vec<SignalRef>,
}

impl Subframe {
    pub fn pdu(&self) -> PduRef {
        self.pdu
    }

    /// Dynamic signals of the variant.
    pub fn signals(&self) -> &[SignalRef] {
        &self.signals
    }
}
