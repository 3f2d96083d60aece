//! Creation and extraction of 29-bit SAE J1939 identifiers.
//!
//! ```text
//! bits 26-28  priority
//! bit  25     extended data page (R)
//! bit  24     data page (DP)
//! bits 16-23  PDU format (PF)
//! bits  8-15  PDU specific (PS): destination when PF < 240, group extension otherwise
//! bits  0-7   source address
//! ```
use crate::error::CanIdBuildError;

/// PDU format values from this one upward are broadcast (PDU2) PGNs.
pub const PDU2_THRESHOLD: u8 = 240;

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Extended CAN identifier with J1939 accessors.
pub struct CanId(pub u32);

impl CanId {
    /// Builder for a PGN sent from `source_address`.
    pub fn builder(pgn: u32, source_address: u8) -> CanIdBuilder {
        CanIdBuilder::new(pgn, source_address)
    }

    /// Priority (0 highest, 7 lowest).
    pub fn priority(&self) -> u8 {
        ((self.0 >> 26) & 0x07) as u8
    }

    pub fn pdu_format(&self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    pub fn pdu_specific(&self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Peer-to-peer (PDU1) identifier.
    pub fn is_pdu1(&self) -> bool {
        self.pdu_format() < PDU2_THRESHOLD
    }

    /// 18-bit PGN; the PS byte is zeroed for PDU1 identifiers.
    pub fn pgn(&self) -> u32 {
        let page = (self.0 >> 24) & 0x03;
        let pf = self.pdu_format() as u32;
        if self.is_pdu1() {
            (page << 16) | (pf << 8)
        } else {
            (page << 16) | (pf << 8) | self.pdu_specific() as u32
        }
    }

    /// Destination address of PDU1 identifiers.
    pub fn destination(&self) -> Option<u8> {
        self.is_pdu1().then(|| self.pdu_specific())
    }

    pub fn source_address(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

//==================================================================================CAN_ID_BUILDER
#[derive(Debug, Clone, Copy)]
/// Fluent builder that enforces the PDU1/PDU2 rules.
pub struct CanIdBuilder {
    pub priority: u8,
    pub pgn: u32,
    pub source_address: u8,
    pub destination: Option<u8>,
}

impl CanIdBuilder {
    /// Builder with the default priority of 6.
    pub fn new(pgn: u32, source_address: u8) -> Self {
        Self {
            priority: 6,
            pgn,
            source_address,
            destination: None,
        }
    }

    /// Priority, masked to 3 bits.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority & 0x07;
        self
    }

    /// Address the message to one node (PDU1).
    pub fn to_destination(mut self, destination_address: u8) -> Self {
        self.destination = Some(destination_address);
        self
    }

    /// Build the identifier:
    /// - PF < 240 (PDU1): a destination is mandatory and the PGN PS byte must be 0
    /// - PF ≥ 240 (PDU2): no destination may be given
    pub fn build(self) -> Result<CanId, CanIdBuildError> {
        if self.pgn > 0x3_FFFF {
            return Err(CanIdBuildError::InvalidData);
        }
        let page = (self.pgn >> 16) & 0x03;
        let pf = ((self.pgn >> 8) & 0xFF) as u8;
        let ps = (self.pgn & 0xFF) as u8;

        let ps = match self.destination {
            None if pf < PDU2_THRESHOLD => return Err(CanIdBuildError::InvalidForBroadcast),
            None => ps,
            Some(_) if pf >= PDU2_THRESHOLD => {
                return Err(CanIdBuildError::InvalidForFocusedMessage { pf })
            }
            Some(_) if ps != 0 => return Err(CanIdBuildError::PsFocusMessageMustBeNull),
            Some(da) => da,
        };
        Ok(CanId(
            ((self.priority as u32) << 26)
                | (page << 24)
                | ((pf as u32) << 16)
                | ((ps as u32) << 8)
                | self.source_address as u32,
        ))
    }
}
