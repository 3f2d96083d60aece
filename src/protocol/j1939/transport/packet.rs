//! Wire format of the transport protocol frames: TP.CM connection
//! management (PGN 60416) and TP.DT data packets (PGN 60160).
use super::{AbortReason, MAX_MESSAGE_LEN, PACKET_DATA_LEN};

pub const CONTROL_RTS: u8 = 16;
pub const CONTROL_CTS: u8 = 17;
pub const CONTROL_END_OF_MSG_ACK: u8 = 19;
pub const CONTROL_BAM: u8 = 32;
pub const CONTROL_ABORT: u8 = 255;

/// "No limit" value of the RTS max-packets-per-CTS byte.
pub const NO_PACKET_LIMIT: u8 = 0xFF;

//==================================================================================CONNECTION_MESSAGE
/// Decoded TP.CM payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionMessage {
    RequestToSend {
        size: u16,
        packets: u8,
        max_per_cts: u8,
        pgn: u32,
    },
    ClearToSend {
        count: u8,
        next: u8,
        pgn: u32,
    },
    EndOfMsgAck {
        size: u16,
        packets: u8,
        pgn: u32,
    },
    Broadcast {
        size: u16,
        packets: u8,
        pgn: u32,
    },
    Abort {
        reason: AbortReason,
        pgn: u32,
    },
}

impl ConnectionMessage {
    /// Parse an 8-byte TP.CM payload; `None` for unknown control bytes or
    /// short frames.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }
        let size = u16::from_le_bytes([data[1], data[2]]);
        let pgn = u32::from_le_bytes([data[5], data[6], data[7], 0]);
        let message = match data[0] {
            CONTROL_RTS => ConnectionMessage::RequestToSend {
                size,
                packets: data[3],
                max_per_cts: data[4],
                pgn,
            },
            CONTROL_CTS => ConnectionMessage::ClearToSend {
                count: data[1],
                next: data[2],
                pgn,
            },
            CONTROL_END_OF_MSG_ACK => ConnectionMessage::EndOfMsgAck {
                size,
                packets: data[3],
                pgn,
            },
            CONTROL_BAM => ConnectionMessage::Broadcast {
                size,
                packets: data[3],
                pgn,
            },
            CONTROL_ABORT => ConnectionMessage::Abort {
                reason: AbortReason::from_code(data[1]),
                pgn,
            },
            _ => return None,
        };
        Some(message)
    }

    /// 8-byte TP.CM payload; reserved bytes are 0xFF.
    pub fn encode(&self) -> [u8; 8] {
        let mut data = [0xFF; 8];
        let pgn = match *self {
            ConnectionMessage::RequestToSend {
                size,
                packets,
                max_per_cts,
                pgn,
            } => {
                data[0] = CONTROL_RTS;
                data[1..3].copy_from_slice(&size.to_le_bytes());
                data[3] = packets;
                data[4] = max_per_cts;
                pgn
            }
            ConnectionMessage::ClearToSend { count, next, pgn } => {
                data[0] = CONTROL_CTS;
                data[1] = count;
                data[2] = next;
                pgn
            }
            ConnectionMessage::EndOfMsgAck { size, packets, pgn } => {
                data[0] = CONTROL_END_OF_MSG_ACK;
                data[1..3].copy_from_slice(&size.to_le_bytes());
                data[3] = packets;
                pgn
            }
            ConnectionMessage::Broadcast { size, packets, pgn } => {
                data[0] = CONTROL_BAM;
                data[1..3].copy_from_slice(&size.to_le_bytes());
                data[3] = packets;
                pgn
            }
            ConnectionMessage::Abort { reason, pgn } => {
                data[0] = CONTROL_ABORT;
                data[1] = reason.code();
                pgn
            }
        };
        data[5..8].copy_from_slice(&pgn.to_le_bytes()[..3]);
        data
    }

    /// Parameter group carried by the transfer.
    pub fn pgn(&self) -> u32 {
        match *self {
            ConnectionMessage::RequestToSend { pgn, .. }
            | ConnectionMessage::ClearToSend { pgn, .. }
            | ConnectionMessage::EndOfMsgAck { pgn, .. }
            | ConnectionMessage::Broadcast { pgn, .. }
            | ConnectionMessage::Abort { pgn, .. } => pgn,
        }
    }
}

//==================================================================================DATA_PACKETS
/// Number of TP.DT packets needed for `len` bytes.
pub const fn packet_count(len: usize) -> usize {
    len.div_ceil(PACKET_DATA_LEN)
}

/// Whether an announced (size, packets) pair is consistent.
pub fn is_valid_announcement(size: u16, packets: u8) -> bool {
    let size = size as usize;
    size > 8 && size <= MAX_MESSAGE_LEN && packet_count(size) == packets as usize
}

/// TP.DT payload for 1-based `sequence`; the unused tail of the last
/// packet is padded with `fill_byte`. `None` past the last packet.
pub fn data_packet(payload: &[u8], sequence: u8, fill_byte: u8) -> Option<[u8; 8]> {
    let start = (sequence as usize).checked_sub(1)? * PACKET_DATA_LEN;
    if start >= payload.len() {
        return None;
    }
    let end = (start + PACKET_DATA_LEN).min(payload.len());
    let mut data = [fill_byte; 8];
    data[0] = sequence;
    data[1..1 + end - start].copy_from_slice(&payload[start..end]);
    Some(data)
}

/// Lazy iterator over a range of data packets of a payload.
pub struct DataPackets<'a> {
    payload: &'a [u8],
    next: u16,
    last: u16,
    fill_byte: u8,
}

impl<'a> DataPackets<'a> {
    /// Packets `first..=last` (1-based, clamped to the payload).
    pub fn new(payload: &'a [u8], first: u8, last: u8, fill_byte: u8) -> Self {
        let total = packet_count(payload.len()).min(u8::MAX as usize) as u16;
        Self {
            payload,
            next: first.max(1) as u16,
            last: (last as u16).min(total),
            fill_byte,
        }
    }

    /// All packets of `payload`.
    pub fn all(payload: &'a [u8], fill_byte: u8) -> Self {
        Self::new(payload, 1, u8::MAX, fill_byte)
    }
}

impl Iterator for DataPackets<'_> {
    type Item = [u8; 8];

    fn next(&mut self) -> Option<[u8; 8]> {
        if self.next > self.last {
            return None;
        }
        let packet = data_packet(self.payload, self.next as u8, self.fill_byte)?;
        self.next += 1;
        Some(packet)
    }
}
