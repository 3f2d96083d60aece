//! Database-driven frame codec.
//! Translates raw frame or PDU payloads into named physical signal values and
//! back, using the bit placement and scaling stored in the [`Database`].
//! Multiplexed PDUs are decoded selector first; encoding rejects dynamic
//! signals that do not belong to the subframe the selector picks.
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use super::bits::{extract_bits, insert_bits, sign_extend, width_mask};
use crate::core::{ByteOrder, DataType, SignalValues};
use crate::database::{
    Database, FrameRef, MuxRole, PduMapping, PduRef, Signal, SignalRef, SubframeRef,
};
use crate::error::CodecError;

/// Object whose payload layout drives a codec call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecTarget {
    /// Whole frame: every mapped PDU at its start bit.
    Frame(FrameRef),
    /// A single PDU payload.
    Pdu(PduRef),
}

impl From<FrameRef> for CodecTarget {
    fn from(frame: FrameRef) -> Self {
        CodecTarget::Frame(frame)
    }
}

impl From<PduRef> for CodecTarget {
    fn from(pdu: PduRef) -> Self {
        CodecTarget::Pdu(pdu)
    }
}

/// Encoder/decoder bound to a database.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec<'db> {
    db: &'db Database,
}

impl<'db> FrameCodec<'db> {
    pub fn new(db: &'db Database) -> Self {
        Self { db }
    }

    //==============================================================================DECODE
    /// Decode `raw` into physical values.
    ///
    /// Out-of-range values are reported as read. PDUs whose update bit is
    /// clear are skipped.
    pub fn decode(
        &self,
        target: impl Into<CodecTarget>,
        raw: &[u8],
    ) -> Result<SignalValues, CodecError> {
        let mut values = BTreeMap::new();
        match target.into() {
            CodecTarget::Pdu(pdu) => self.decode_pdu(pdu, raw, &mut values)?,
            CodecTarget::Frame(frame) => {
                let frame = self.db.frame(frame)?;
                for mapping in frame.pdu_mappings() {
                    if let Some(update_bit) = mapping.update_bit {
                        if !read_flag(raw, update_bit)? {
                            continue;
                        }
                    }
                    let payload = pdu_slice(raw, mapping, self.db.pdu(mapping.pdu)?.payload_len)?;
                    self.decode_pdu(mapping.pdu, payload, &mut values)?;
                }
            }
        }
        Ok(values)
    }

    /// Decode one named signal of `target`.
    pub fn decode_signal(
        &self,
        target: impl Into<CodecTarget>,
        name: &str,
        raw: &[u8],
    ) -> Result<f64, CodecError> {
        let (signal, payload) = match target.into() {
            CodecTarget::Pdu(pdu) => (self.signal_in_pdu(pdu, name)?, raw),
            CodecTarget::Frame(frame) => {
                let (mapping, signal) = self
                    .db
                    .find_frame_signal(frame, name)
                    .ok_or_else(|| unknown(name))?;
                let len = self.db.pdu(mapping.pdu)?.payload_len;
                (signal, pdu_slice(raw, &mapping, len)?)
            }
        };
        let signal = self.db.signal(signal)?;
        read_physical(signal, payload)
    }

    fn decode_pdu(
        &self,
        pdu: PduRef,
        payload: &[u8],
        values: &mut SignalValues,
    ) -> Result<(), CodecError> {
        let owner = self.db.pdu(pdu)?;
        for handle in owner.signals() {
            let signal = self.db.signal(*handle)?;
            values.insert(signal.name.clone(), read_physical(signal, payload)?);
        }
        let Some(subframe) = self.active_subframe(pdu, payload)? else {
            return Ok(());
        };
        for handle in self.db.subframe(subframe)?.signals() {
            let signal = self.db.signal(*handle)?;
            values.insert(signal.name.clone(), read_physical(signal, payload)?);
        }
        Ok(())
    }

    /// Subframe picked by the selector currently stored in `payload`.
    fn active_subframe(
        &self,
        pdu: PduRef,
        payload: &[u8],
    ) -> Result<Option<SubframeRef>, CodecError> {
        let Some(mux) = self.db.pdu(pdu)?.mux() else {
            return Ok(None);
        };
        let selector = self.db.signal(mux.selector)?;
        let raw = selector.layout()?.extract(payload)?;
        Ok(self.db.subframe_for(pdu, raw))
    }

    //==============================================================================ENCODE
    /// Encode `values` on top of `base`, or on top of the default payload
    /// when no base is given. Bits of signals not listed keep their base
    /// value.
    pub fn encode(
        &self,
        target: impl Into<CodecTarget>,
        values: &SignalValues,
        base: Option<&[u8]>,
    ) -> Result<Vec<u8>, CodecError> {
        match target.into() {
            CodecTarget::Pdu(pdu) => {
                let owner = self.db.pdu(pdu)?;
                let mut buffer = base_payload(base, owner.default_bytes(), owner.payload_len)?;
                let mut written = Vec::with_capacity(values.len());
                for (name, value) in values {
                    written.push((self.signal_in_pdu(pdu, name)?, *value));
                }
                self.encode_pdu(pdu, &mut buffer, &written)?;
                Ok(buffer)
            }
            CodecTarget::Frame(frame) => {
                let owner = self.db.frame(frame)?;
                let mut buffer = base_payload(base, owner.default_bytes(), owner.payload_len)?;
                let mappings = owner.pdu_mappings();
                let mut per_mapping: Vec<Vec<(SignalRef, f64)>> =
                    (0..mappings.len()).map(|_| Vec::new()).collect();
                for (name, value) in values {
                    let (mapping, signal) = self
                        .db
                        .find_frame_signal(frame, name)
                        .ok_or_else(|| unknown(name))?;
                    let slot = mappings
                        .iter()
                        .position(|m| *m == mapping)
                        .ok_or_else(|| unknown(name))?;
                    per_mapping[slot].push((signal, *value));
                }
                for (mapping, written) in mappings.iter().zip(per_mapping.iter()) {
                    if written.is_empty() {
                        continue;
                    }
                    let len = self.db.pdu(mapping.pdu)?.payload_len;
                    let start = mapping.byte_offset();
                    let end = start + len;
                    let available = buffer.len();
                    let payload = buffer.get_mut(start..end).ok_or(CodecError::PayloadTooShort {
                        required: end,
                        available,
                    })?;
                    self.encode_pdu(mapping.pdu, payload, written)?;
                    if let Some(update_bit) = mapping.update_bit {
                        insert_bits(&mut buffer, update_bit, 1, ByteOrder::LittleEndian, 1)?;
                    }
                }
                Ok(buffer)
            }
        }
    }

    fn encode_pdu(
        &self,
        pdu: PduRef,
        payload: &mut [u8],
        written: &[(SignalRef, f64)],
    ) -> Result<(), CodecError> {
        // Selector first, so the subframe check sees the final selector value.
        for (handle, value) in written {
            let signal = self.db.signal(*handle)?;
            if signal.mux_role() == MuxRole::Selector {
                write_physical(signal, payload, *value)?;
            }
        }

        let mut active: Option<Option<SubframeRef>> = None;
        for (handle, value) in written {
            let signal = self.db.signal(*handle)?;
            match signal.mux_role() {
                MuxRole::Selector => {}
                MuxRole::Static => write_physical(signal, payload, *value)?,
                MuxRole::Dynamic(subframe) => {
                    let selected = match active {
                        Some(selected) => selected,
                        None => {
                            let selected = self.active_subframe(pdu, payload)?;
                            active = Some(selected);
                            selected
                        }
                    };
                    if selected != Some(subframe) {
                        #[cfg(feature = "defmt")]
                        defmt::warn!("Mux selector does not match dynamic signal subframe");
                        return Err(CodecError::ConfigurationMismatch {
                            signal: signal.name.clone(),
                            detail: "signal is not part of the subframe chosen by the selector",
                        });
                    }
                    write_physical(signal, payload, *value)?;
                }
            }
        }
        Ok(())
    }

    //==============================================================================DEFAULTS
    /// Default physical value of every signal of `target`, dynamic signals
    /// included.
    pub fn default_values(&self, target: impl Into<CodecTarget>) -> Result<SignalValues, CodecError> {
        let signals: Vec<SignalRef> = match target.into() {
            CodecTarget::Pdu(pdu) => {
                self.db.pdu(pdu)?;
                self.db.pdu_signals(pdu).collect()
            }
            CodecTarget::Frame(frame) => {
                self.db.frame(frame)?;
                self.db.frame_signals(frame)
            }
        };
        let mut values = BTreeMap::new();
        for handle in signals {
            let signal = self.db.signal(handle)?;
            values.insert(signal.name.clone(), signal.default);
        }
        Ok(values)
    }

    /// Smallest payload holding every static signal and the selector of
    /// `target`.
    pub fn required_len(&self, target: impl Into<CodecTarget>) -> Result<usize, CodecError> {
        match target.into() {
            CodecTarget::Pdu(pdu) => self.pdu_required_len(pdu),
            CodecTarget::Frame(frame) => {
                let mut required = 0;
                for mapping in self.db.frame(frame)?.pdu_mappings() {
                    let len = self.pdu_required_len(mapping.pdu)?;
                    if len > 0 {
                        required = required.max(mapping.byte_offset() + len);
                    }
                }
                Ok(required)
            }
        }
    }

    fn pdu_required_len(&self, pdu: PduRef) -> Result<usize, CodecError> {
        let mut required = 0;
        for handle in self.db.pdu(pdu)?.signals() {
            required = required.max(self.db.signal(*handle)?.layout()?.required_len());
        }
        Ok(required)
    }

    fn signal_in_pdu(&self, pdu: PduRef, name: &str) -> Result<SignalRef, CodecError> {
        self.db.pdu(pdu)?;
        self.db.find_signal(pdu, name).ok_or_else(|| unknown(name))
    }
}

//==================================================================================HELPERS
fn unknown(name: &str) -> CodecError {
    CodecError::UnknownSignal {
        name: String::from(name),
    }
}

/// Bytes of `raw` belonging to the PDU placed by `mapping`; may be shorter
/// than the PDU when the frame is truncated.
fn pdu_slice<'a>(raw: &'a [u8], mapping: &PduMapping, len: usize) -> Result<&'a [u8], CodecError> {
    let start = mapping.byte_offset();
    if start > raw.len() {
        return Err(CodecError::PayloadTooShort {
            required: start + 1,
            available: raw.len(),
        });
    }
    let end = (start + len).min(raw.len());
    Ok(&raw[start..end])
}

fn read_flag(raw: &[u8], bit: u16) -> Result<bool, CodecError> {
    let required = bit as usize / 8 + 1;
    if raw.len() < required {
        return Err(CodecError::PayloadTooShort {
            required,
            available: raw.len(),
        });
    }
    Ok(extract_bits(raw, bit, 1, ByteOrder::LittleEndian)? == 1)
}

fn base_payload(base: Option<&[u8]>, default: Vec<u8>, len: usize) -> Result<Vec<u8>, CodecError> {
    match base {
        None => Ok(default),
        Some(base) if base.len() < len => Err(CodecError::PayloadTooShort {
            required: len,
            available: base.len(),
        }),
        Some(base) => Ok(base[..len].to_vec()),
    }
}

/// Read the field of `signal` and convert it to its physical value.
pub fn read_physical(signal: &Signal, payload: &[u8]) -> Result<f64, CodecError> {
    let layout = signal.layout()?;
    if layout.required_len() > payload.len() {
        return Err(CodecError::PayloadTooShort {
            required: layout.required_len(),
            available: payload.len(),
        });
    }
    Ok(raw_to_physical(signal, layout.extract(payload)?))
}

/// Convert `physical` to raw and store it in the field of `signal`.
pub fn write_physical(signal: &Signal, payload: &mut [u8], physical: f64) -> Result<(), CodecError> {
    let layout = signal.layout()?;
    if layout.required_len() > payload.len() {
        return Err(CodecError::PayloadTooShort {
            required: layout.required_len(),
            available: payload.len(),
        });
    }
    layout.insert(payload, physical_to_raw(signal, physical))?;
    Ok(())
}

/// `raw * scale_fac + scale_off`, with `raw` interpreted per data type.
pub fn raw_to_physical(signal: &Signal, raw: u64) -> f64 {
    let value = match signal.data_type {
        DataType::Unsigned => raw as f64,
        DataType::Signed => sign_extend(raw, signal.num_bits) as f64,
        DataType::Float if signal.num_bits == 32 => f32::from_bits(raw as u32) as f64,
        DataType::Float => f64::from_bits(raw),
    };
    value * signal.scale_fac + signal.scale_off
}

/// Inverse of [`raw_to_physical`]. Integers round half away from zero and
/// wrap to the field width; nothing is clamped to `[min, max]`.
pub fn physical_to_raw(signal: &Signal, physical: f64) -> u64 {
    let scaled = if signal.scale_fac == 0.0 {
        0.0
    } else {
        (physical - signal.scale_off) / signal.scale_fac
    };
    match signal.data_type {
        DataType::Float if signal.num_bits == 32 => (scaled as f32).to_bits() as u64,
        DataType::Float => scaled.to_bits(),
        DataType::Signed | DataType::Unsigned => {
            (round_half_away(scaled) as u64) & width_mask(signal.num_bits)
        }
    }
}

fn round_half_away(value: f64) -> i128 {
    if value >= 0.0 {
        (value + 0.5) as i128
    } else {
        (value - 0.5) as i128
    }
}

//==================================================================================TEST_ENGINE
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
