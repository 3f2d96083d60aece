//! Low-level bit placement for signal payloads.
//! A signal occupies a run of bits whose walk through the payload depends on
//! its byte order; [`BitLayout`] precomputes that walk once as a list of
//! per-byte spans so extraction and insertion share one routine and are
//! inverses by construction.
use crate::core::ByteOrder;
use crate::error::BitAccessError;

/// A 64-bit field touches at most nine bytes (one partial head, seven full,
/// one partial tail).
const MAX_SPANS: usize = 9;

/// One contiguous run of bits within a single payload byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitSpan {
    /// Byte holding the run.
    pub byte_index: usize,
    /// Lowest bit of the run inside the byte (0..=7).
    pub bit_offset: u8,
    /// Number of consecutive bits (1..=8).
    pub num_bits: u8,
    /// Position of the run's lowest bit inside the raw value.
    pub value_shift: u8,
}

/// Precomputed placement of one signal inside a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitLayout {
    spans: [BitSpan; MAX_SPANS],
    span_count: usize,
    num_bits: u8,
}

impl BitLayout {
    /// Build the layout of a `num_bits` wide field.
    ///
    /// * Little endian: `start_bit` is the LSB; the walk goes upward and
    ///   continues at bit 0 of the next byte.
    /// * Big endian: `start_bit` is the MSB (sawtooth numbering); the walk
    ///   goes downward and continues at bit 7 of the next byte.
    pub fn new(start_bit: u16, num_bits: u8, order: ByteOrder) -> Result<Self, BitAccessError> {
        if !(1..=64).contains(&num_bits) {
            return Err(BitAccessError::TooLongForType {
                max: 64,
                asked: num_bits,
            });
        }

        let mut spans = [BitSpan::default(); MAX_SPANS];
        let mut span_count = 0;
        let mut byte_index = (start_bit / 8) as usize;
        let mut bit_index = (start_bit % 8) as u8;
        let mut remaining = num_bits;

        match order {
            ByteOrder::LittleEndian => {
                let mut value_shift = 0u8;
                while remaining > 0 {
                    let run = (8 - bit_index).min(remaining);
                    spans[span_count] = BitSpan {
                        byte_index,
                        bit_offset: bit_index,
                        num_bits: run,
                        value_shift,
                    };
                    span_count += 1;
                    value_shift += run;
                    remaining -= run;
                    byte_index += 1;
                    bit_index = 0;
                }
            }
            ByteOrder::BigEndian => {
                // First bits walked are the most significant ones.
                while remaining > 0 {
                    let run = (bit_index + 1).min(remaining);
                    remaining -= run;
                    spans[span_count] = BitSpan {
                        byte_index,
                        bit_offset: bit_index + 1 - run,
                        num_bits: run,
                        value_shift: remaining,
                    };
                    span_count += 1;
                    byte_index += 1;
                    bit_index = 7;
                }
            }
        }

        Ok(Self {
            spans,
            span_count,
            num_bits,
        })
    }

    /// Field width in bits.
    pub fn num_bits(&self) -> u8 {
        self.num_bits
    }

    /// Spans in walk order.
    pub fn spans(&self) -> &[BitSpan] {
        &self.spans[..self.span_count]
    }

    /// Minimum payload length (bytes) that contains the whole field.
    pub fn required_len(&self) -> usize {
        self.spans()
            .iter()
            .map(|span| span.byte_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Lowest byte touched by the field.
    pub fn first_byte(&self) -> usize {
        self.spans()
            .iter()
            .map(|span| span.byte_index)
            .min()
            .unwrap_or(0)
    }

    fn check_bounds(&self, available: usize) -> Result<(), BitAccessError> {
        let required = self.required_len();
        if required > available {
            return Err(BitAccessError::OutOfBounds {
                asked: required,
                available,
            });
        }
        Ok(())
    }

    /// Extract the raw (unsigned, unscaled) value of the field.
    pub fn extract(&self, buffer: &[u8]) -> Result<u64, BitAccessError> {
        self.check_bounds(buffer.len())?;

        let mut result: u64 = 0;
        for span in self.spans() {
            let mask = ((1u16 << span.num_bits) - 1) as u8;
            let bits = (buffer[span.byte_index] >> span.bit_offset) & mask;
            result |= (bits as u64) << span.value_shift;
        }
        Ok(result)
    }

    /// Write `raw` into the field, leaving neighbouring bits untouched.
    /// Bits of `raw` above the field width are dropped.
    pub fn insert(&self, buffer: &mut [u8], raw: u64) -> Result<(), BitAccessError> {
        self.check_bounds(buffer.len())?;

        for span in self.spans() {
            let mask = ((1u16 << span.num_bits) - 1) as u8;
            let bits = ((raw >> span.value_shift) as u8) & mask;
            buffer[span.byte_index] &= !(mask << span.bit_offset);
            buffer[span.byte_index] |= bits << span.bit_offset;
        }
        Ok(())
    }
}

//==================================================================================HELPERS
/// Shared extraction routine for one-off reads.
pub fn extract_bits(
    buffer: &[u8],
    start_bit: u16,
    num_bits: u8,
    order: ByteOrder,
) -> Result<u64, BitAccessError> {
    BitLayout::new(start_bit, num_bits, order)?.extract(buffer)
}

/// Shared insertion routine for one-off writes.
pub fn insert_bits(
    buffer: &mut [u8],
    start_bit: u16,
    num_bits: u8,
    order: ByteOrder,
    raw: u64,
) -> Result<(), BitAccessError> {
    BitLayout::new(start_bit, num_bits, order)?.insert(buffer, raw)
}

/// Mask keeping the `num_bits` lowest bits.
#[inline]
pub const fn width_mask(num_bits: u8) -> u64 {
    if num_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << num_bits) - 1
    }
}

/// Interpret the `num_bits` lowest bits of `raw` as two's complement.
#[inline]
pub const fn sign_extend(raw: u64, num_bits: u8) -> i64 {
    if num_bits == 0 || num_bits >= 64 {
        return raw as i64;
    }
    let shift = 64 - num_bits as u32;
    ((raw << shift) as i64) >> shift
}
