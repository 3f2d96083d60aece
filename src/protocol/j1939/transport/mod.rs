//! J1939-21 transport protocol for messages of 9 to 1785 bytes.
//!
//! [`TransportManager`] is a sans-IO state machine: inbound frames go in
//! through [`TransportManager::handle_frame`], timers advance through
//! [`TransportManager::poll`], and the frames to put on the bus and the
//! completed/failed transfers come out of
//! [`TransportManager::poll_transmit`] and
//! [`TransportManager::poll_event`]. The async side lives in
//! [`super::service`].
//!
//! Every transfer is keyed by (source, destination, PGN) and runs
//! independently; at most one transfer is active per (source,
//! destination) pair and direction.
//!
//! ```text
//! requester  Idle -> RtsSent -> AwaitingCts <-> (window sent) -> AwaitingAck -> Idle
//!                               Held (CTS with 0 packets, T4)
//! responder  Idle -> (RTS, CTS sent) -> Receiving -> ... -> (EoMA sent) -> Idle
//!                                       Holding (ECU busy, CTS 0 every Th)
//! broadcast  Idle -> Broadcasting (BAM + paced TP.DT) -> Idle
//! ```
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;
use embassy_time::{Duration, Instant};

use super::{DEFAULT_PRIORITY, GLOBAL_ADDRESS, PGN_TP_CM, PGN_TP_DT, TP_PRIORITY};
use crate::error::TransportError;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::{CanId, PDU2_THRESHOLD};

pub mod packet;

use packet::{is_valid_announcement, packet_count, ConnectionMessage, DataPackets, NO_PACKET_LIMIT};

/// Data bytes carried by one TP.DT packet.
pub const PACKET_DATA_LEN: usize = 7;
/// Largest message the transport protocol can carry (255 packets).
pub const MAX_MESSAGE_LEN: usize = 255 * PACKET_DATA_LEN;

/// Time between two data packets before the receiver gives up (ms).
pub const T1_MS: u64 = 750;
/// Time after a CTS before the receiver gives up waiting for data (ms).
pub const T2_MS: u64 = 1250;
/// Time after the last packet before the sender gives up waiting for CTS/EoMA (ms).
pub const T3_MS: u64 = 1250;
/// Time after a hold CTS before the sender gives up (ms).
pub const T4_MS: u64 = 1050;
/// Response time before a CTS is repeated (ms).
pub const TR_MS: u64 = 200;
/// Interval between two hold CTS messages (ms).
pub const TH_MS: u64 = 500;
/// Pacing of BAM data packets (ms).
pub const BAM_INTERVAL_MS: u64 = 50;

pub const DEFAULT_MAX_REPEAT_CTS: u8 = 2;
pub const DEFAULT_NUM_PACKETS_RECV: u8 = 16;
pub const DEFAULT_WRITE_QUEUE_SIZE: usize = 8;
pub const DEFAULT_FILL_BYTE: u8 = 0xFF;

//==================================================================================TIMERS_AND_REASONS
/// Transport protocol timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportTimer {
    T1,
    T2,
    T3,
    T4,
    Tr,
    Th,
}

/// Connection abort reasons (TP.CM abort byte 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AbortReason {
    ExistingTransportSession,
    SystemResources,
    Timeout,
    CtsDuringDataTransfer,
    MaxRetryLimit,
    UnexpectedDataTransfer,
    BadSequenceNumber,
    DuplicateSequenceNumber,
    MessageTooLarge,
    Other(u8),
}

impl AbortReason {
    pub const fn code(&self) -> u8 {
        match self {
            AbortReason::ExistingTransportSession => 1,
            AbortReason::SystemResources => 2,
            AbortReason::Timeout => 3,
            AbortReason::CtsDuringDataTransfer => 4,
            AbortReason::MaxRetryLimit => 5,
            AbortReason::UnexpectedDataTransfer => 6,
            AbortReason::BadSequenceNumber => 7,
            AbortReason::DuplicateSequenceNumber => 8,
            AbortReason::MessageTooLarge => 9,
            AbortReason::Other(code) => *code,
        }
    }

    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => AbortReason::ExistingTransportSession,
            2 => AbortReason::SystemResources,
            3 => AbortReason::Timeout,
            4 => AbortReason::CtsDuringDataTransfer,
            5 => AbortReason::MaxRetryLimit,
            6 => AbortReason::UnexpectedDataTransfer,
            7 => AbortReason::BadSequenceNumber,
            8 => AbortReason::DuplicateSequenceNumber,
            9 => AbortReason::MessageTooLarge,
            other => AbortReason::Other(other),
        }
    }
}

//==================================================================================CONFIG
/// Timers, flow control and padding of the transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub t1: Duration,
    pub t2: Duration,
    pub t3: Duration,
    pub t4: Duration,
    pub tr: Duration,
    pub th: Duration,
    pub bam_interval: Duration,
    /// CTS repetitions allowed when no data answers a CTS.
    pub max_repeat_cts: u8,
    /// Packets granted per CTS when receiving.
    pub num_packets_recv: u8,
    /// Packets per CTS offered in our RTS (0xFF = no limit).
    pub num_packets_resp: u8,
    /// Padding of the last data packet.
    pub fill_byte: u8,
    /// Outgoing multi-packet transfers allowed at once.
    pub write_queue_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(T1_MS),
            t2: Duration::from_millis(T2_MS),
            t3: Duration::from_millis(T3_MS),
            t4: Duration::from_millis(T4_MS),
            tr: Duration::from_millis(TR_MS),
            th: Duration::from_millis(TH_MS),
            bam_interval: Duration::from_millis(BAM_INTERVAL_MS),
            max_repeat_cts: DEFAULT_MAX_REPEAT_CTS,
            num_packets_recv: DEFAULT_NUM_PACKETS_RECV,
            num_packets_resp: NO_PACKET_LIMIT,
            fill_byte: DEFAULT_FILL_BYTE,
            write_queue_size: DEFAULT_WRITE_QUEUE_SIZE,
        }
    }
}

impl TransportConfig {
    pub fn timer(&self, timer: TransportTimer) -> Duration {
        match timer {
            TransportTimer::T1 => self.t1,
            TransportTimer::T2 => self.t2,
            TransportTimer::T3 => self.t3,
            TransportTimer::T4 => self.t4,
            TransportTimer::Tr => self.tr,
            TransportTimer::Th => self.th,
        }
    }

    pub fn with_timer(mut self, timer: TransportTimer, value: Duration) -> Self {
        let slot = match timer {
            TransportTimer::T1 => &mut self.t1,
            TransportTimer::T2 => &mut self.t2,
            TransportTimer::T3 => &mut self.t3,
            TransportTimer::T4 => &mut self.t4,
            TransportTimer::Tr => &mut self.tr,
            TransportTimer::Th => &mut self.th,
        };
        *slot = value;
        self
    }

    pub fn with_max_repeat_cts(mut self, repeats: u8) -> Self {
        self.max_repeat_cts = repeats;
        self
    }

    pub fn with_num_packets_recv(mut self, packets: u8) -> Self {
        self.num_packets_recv = packets.max(1);
        self
    }

    pub fn with_num_packets_resp(mut self, packets: u8) -> Self {
        self.num_packets_resp = packets;
        self
    }

    pub fn with_fill_byte(mut self, fill_byte: u8) -> Self {
        self.fill_byte = fill_byte;
        self
    }

    pub fn with_write_queue_size(mut self, size: usize) -> Self {
        self.write_queue_size = size;
        self
    }
}

//==================================================================================TRANSFERS
/// Identity of one logical multi-packet message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferKey {
    pub sa: u8,
    /// Destination; [`GLOBAL_ADDRESS`] for BAM.
    pub da: u8,
    pub pgn: u32,
}

impl TransferKey {
    pub fn is_broadcast(&self) -> bool {
        self.da == GLOBAL_ADDRESS
    }
}

/// Observable state of an active transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferState {
    /// RTS sent, first CTS pending.
    RtsSent,
    /// A window was sent, next CTS pending.
    AwaitingCts,
    /// Receiver asked us to hold.
    Held,
    /// Every packet sent, end-of-message acknowledgement pending.
    AwaitingAck,
    /// BAM announced, data packets being paced out.
    Broadcasting,
    /// CTS sent, data packets pending.
    Receiving,
    /// Window completed while the ECU is busy; the sender is kept on hold.
    Holding,
    /// Collecting the data packets of a BAM.
    ReceivingBroadcast,
}

/// Outcome reported by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete message addressed to us (or broadcast).
    Received {
        sa: u8,
        da: u8,
        pgn: u32,
        payload: Vec<u8>,
    },
    /// An outgoing message went through.
    Sent { key: TransferKey },
    /// A transfer was aborted; other transfers are unaffected.
    Failed {
        key: TransferKey,
        error: TransportError,
    },
}

#[derive(Debug)]
struct Outgoing {
    key: TransferKey,
    payload: Vec<u8>,
    total: u16,
    next_seq: u16,
    state: TransferState,
    deadline: Instant,
}

#[derive(Debug)]
struct Incoming {
    key: TransferKey,
    buffer: Vec<u8>,
    total: u16,
    max_per_cts: u8,
    next_seq: u16,
    window_end: u16,
    window_started: bool,
    cts_retries: u8,
    state: TransferState,
    deadline: Instant,
}

impl Incoming {
    fn new(key: TransferKey, size: u16, packets: u8, max_per_cts: u8, now: Instant) -> Self {
        let broadcast = key.is_broadcast();
        Self {
            key,
            buffer: vec![0; size as usize],
            total: packets as u16,
            max_per_cts,
            next_seq: 1,
            window_end: if broadcast { packets as u16 } else { 0 },
            window_started: false,
            cts_retries: 0,
            state: if broadcast {
                TransferState::ReceivingBroadcast
            } else {
                TransferState::Receiving
            },
            deadline: now,
        }
    }

    /// Grant the next window and return the CTS to send.
    fn grant_window(&mut self, config: &TransportConfig, now: Instant) -> ConnectionMessage {
        let remaining = self.total + 1 - self.next_seq;
        let mut count = (config.num_packets_recv.max(1) as u16).min(remaining);
        if self.max_per_cts != NO_PACKET_LIMIT && self.max_per_cts != 0 {
            count = count.min(self.max_per_cts as u16);
        }
        self.window_end = self.next_seq + count - 1;
        self.state = TransferState::Receiving;
        self.window_started = false;
        self.arm_cts_timer(config, now);
        self.cts()
    }

    fn cts(&self) -> ConnectionMessage {
        ConnectionMessage::ClearToSend {
            count: (self.window_end + 1 - self.next_seq) as u8,
            next: self.next_seq as u8,
            pgn: self.key.pgn,
        }
    }

    fn hold(&mut self, config: &TransportConfig, now: Instant) -> ConnectionMessage {
        self.state = TransferState::Holding;
        self.deadline = now + config.th;
        ConnectionMessage::ClearToSend {
            count: 0,
            next: 0xFF,
            pgn: self.key.pgn,
        }
    }

    fn arm_cts_timer(&mut self, config: &TransportConfig, now: Instant) {
        self.deadline = if self.cts_retries < config.max_repeat_cts {
            now + config.tr
        } else {
            now + config.t2
        };
    }
}

//==================================================================================MANAGER
/// Transport protocol engine of one J1939 address.
#[derive(Debug)]
pub struct TransportManager {
    address: u8,
    config: TransportConfig,
    ecu_busy: bool,
    outgoing: Vec<Outgoing>,
    incoming: Vec<Incoming>,
    outbox: VecDeque<CanFrame>,
    events: VecDeque<TransportEvent>,
}

impl TransportManager {
    pub fn new(address: u8, config: TransportConfig) -> Self {
        Self {
            address,
            config,
            ecu_busy: false,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            outbox: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Change the local address; applies to transfers started afterwards.
    pub fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut TransportConfig {
        &mut self.config
    }

    /// ECU busy flag: new RTS are refused and finished windows are held.
    pub fn is_busy(&self) -> bool {
        self.ecu_busy
    }

    /// Set the ECU busy flag. Clearing it releases held senders.
    pub fn set_busy(&mut self, busy: bool, now: Instant) {
        self.ecu_busy = busy;
        if busy {
            return;
        }
        let Self {
            incoming,
            outbox,
            config,
            address,
            ..
        } = self;
        for transfer in incoming
            .iter_mut()
            .filter(|t| t.state == TransferState::Holding)
        {
            let cts = transfer.grant_window(config, now);
            outbox.push_back(cm_frame(*address, transfer.key.sa, &cts));
        }
    }

    /// Whether a transfer from `sa` to `da` is active in either direction
    /// of the manager.
    pub fn is_pair_busy(&self, sa: u8, da: u8) -> bool {
        self.outgoing
            .iter()
            .map(|t| t.key)
            .chain(self.incoming.iter().map(|t| t.key))
            .any(|key| key.sa == sa && key.da == da)
    }

    pub fn state(&self, key: &TransferKey) -> Option<TransferState> {
        self.outgoing
            .iter()
            .find(|t| t.key == *key)
            .map(|t| t.state)
            .or_else(|| {
                self.incoming
                    .iter()
                    .find(|t| t.key == *key)
                    .map(|t| t.state)
            })
    }

    pub fn active_transfers(&self) -> usize {
        self.outgoing.len() + self.incoming.len()
    }

    /// Next frame to put on the bus.
    pub fn poll_transmit(&mut self) -> Option<CanFrame> {
        self.outbox.pop_front()
    }

    /// Next completed or failed transfer.
    pub fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }

    /// Earliest instant at which [`Self::poll`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.outgoing
            .iter()
            .map(|t| t.deadline)
            .chain(self.incoming.iter().map(|t| t.deadline))
            .min()
    }

    //==============================================================================SEND
    /// Queue a message. Up to 8 bytes go out as a single frame; larger
    /// payloads start an RTS/CTS transfer, or a BAM when `destination`
    /// is `None` or global.
    pub fn send(
        &mut self,
        destination: Option<u8>,
        pgn: u32,
        payload: &[u8],
        now: Instant,
    ) -> Result<TransferKey, TransportError> {
        let da = destination.unwrap_or(GLOBAL_ADDRESS);
        let key = TransferKey {
            sa: self.address,
            da,
            pgn,
        };

        if payload.len() > MAX_MESSAGE_LEN {
            return Err(TransportError::MessageTooLarge { len: payload.len() });
        }

        if payload.len() <= 8 {
            let mut builder = CanId::builder(pgn, self.address).with_priority(DEFAULT_PRIORITY);
            if is_pdu1(pgn) || da != GLOBAL_ADDRESS {
                builder = builder.to_destination(da);
            }
            let id = builder.build()?;
            self.outbox.push_back(CanFrame::new(id, payload));
            self.events.push_back(TransportEvent::Sent { key });
            return Ok(key);
        }

        if self.outgoing.iter().any(|t| t.key.da == da) {
            return Err(TransportError::Busy {
                sa: self.address,
                da,
            });
        }
        if self.outgoing.len() >= self.config.write_queue_size {
            return Err(TransportError::WriteQueueFull);
        }

        let size = payload.len() as u16;
        let packets = packet_count(payload.len()) as u8;
        let (message, state, deadline) = if key.is_broadcast() {
            (
                ConnectionMessage::Broadcast { size, packets, pgn },
                TransferState::Broadcasting,
                now + self.config.bam_interval,
            )
        } else {
            (
                ConnectionMessage::RequestToSend {
                    size,
                    packets,
                    max_per_cts: self.config.num_packets_resp,
                    pgn,
                },
                TransferState::RtsSent,
                now + self.config.t3,
            )
        };

        #[cfg(feature = "defmt")]
        defmt::debug!("TP send {} bytes, pgn {=u32}, to {=u8}", payload.len(), pgn, da);

        self.outbox.push_back(cm_frame(self.address, da, &message));
        self.outgoing.push(Outgoing {
            key,
            payload: payload.to_vec(),
            total: packets as u16,
            next_seq: 1,
            state,
            deadline,
        });
        Ok(key)
    }

    //==============================================================================RECEIVE
    /// Feed one frame received from the bus. Transport frames drive the
    /// state machines; other frames addressed to us (or broadcast) are
    /// reported as [`TransportEvent::Received`].
    pub fn handle_frame(&mut self, frame: &CanFrame, now: Instant) {
        let sa = frame.id.source_address();
        let da = frame.id.destination().unwrap_or(GLOBAL_ADDRESS);
        if sa == self.address || (da != self.address && da != GLOBAL_ADDRESS) {
            return;
        }

        match frame.id.pgn() {
            PGN_TP_CM => {
                if let Some(message) = ConnectionMessage::parse(frame.payload()) {
                    self.on_connection(sa, da, message, now);
                }
            }
            PGN_TP_DT => self.on_data(sa, da, frame.payload(), now),
            pgn => self.events.push_back(TransportEvent::Received {
                sa,
                da,
                pgn,
                payload: frame.payload().to_vec(),
            }),
        }
    }

    fn on_connection(&mut self, sa: u8, da: u8, message: ConnectionMessage, now: Instant) {
        match message {
            ConnectionMessage::RequestToSend {
                size,
                packets,
                max_per_cts,
                pgn,
            } if da == self.address => self.on_rts(sa, pgn, size, packets, max_per_cts, now),
            ConnectionMessage::Broadcast { size, packets, pgn } if da == GLOBAL_ADDRESS => {
                self.on_bam(sa, pgn, size, packets, now)
            }
            ConnectionMessage::ClearToSend { count, next, pgn } if da == self.address => {
                self.on_cts(sa, pgn, count, next, now)
            }
            ConnectionMessage::EndOfMsgAck { pgn, .. } if da == self.address => {
                let key = TransferKey {
                    sa: self.address,
                    da: sa,
                    pgn,
                };
                if let Some(index) = self.outgoing.iter().position(|t| t.key == key) {
                    self.outgoing.swap_remove(index);
                    #[cfg(feature = "defmt")]
                    defmt::debug!("TP transfer to {=u8} acknowledged", sa);
                    self.events.push_back(TransportEvent::Sent { key });
                }
            }
            ConnectionMessage::Abort { reason, pgn } if da == self.address => {
                self.on_abort(sa, pgn, reason)
            }
            _ => {}
        }
    }

    fn on_rts(&mut self, sa: u8, pgn: u32, size: u16, packets: u8, max_per_cts: u8, now: Instant) {
        let key = TransferKey {
            sa,
            da: self.address,
            pgn,
        };

        if !is_valid_announcement(size, packets) {
            let reason = if size as usize > MAX_MESSAGE_LEN {
                AbortReason::MessageTooLarge
            } else {
                AbortReason::SystemResources
            };
            self.send_abort(sa, pgn, reason);
            return;
        }

        // The busy decision and the transfer registration happen in this
        // single `&mut self` step.
        let pair_busy = self
            .incoming
            .iter()
            .any(|t| t.key.sa == sa && t.key.da == self.address);
        if pair_busy || self.ecu_busy {
            let reason = if pair_busy {
                AbortReason::ExistingTransportSession
            } else {
                AbortReason::SystemResources
            };
            #[cfg(feature = "defmt")]
            defmt::warn!("TP RTS from {=u8} refused, busy", sa);
            self.send_abort(sa, pgn, reason);
            self.events.push_back(TransportEvent::Failed {
                key,
                error: TransportError::Busy {
                    sa,
                    da: self.address,
                },
            });
            return;
        }

        let mut transfer = Incoming::new(key, size, packets, max_per_cts, now);
        let cts = transfer.grant_window(&self.config, now);
        self.outbox.push_back(cm_frame(self.address, sa, &cts));
        self.incoming.push(transfer);
    }

    fn on_bam(&mut self, sa: u8, pgn: u32, size: u16, packets: u8, now: Instant) {
        if !is_valid_announcement(size, packets) {
            return;
        }
        // A new BAM from the same source supersedes the unfinished one.
        if let Some(index) = self
            .incoming
            .iter()
            .position(|t| t.key.sa == sa && t.key.is_broadcast())
        {
            let previous = self.incoming.swap_remove(index);
            self.events.push_back(TransportEvent::Failed {
                key: previous.key,
                error: TransportError::Aborted {
                    reason: AbortReason::ExistingTransportSession,
                },
            });
        }
        let key = TransferKey {
            sa,
            da: GLOBAL_ADDRESS,
            pgn,
        };
        let mut transfer = Incoming::new(key, size, packets, NO_PACKET_LIMIT, now);
        transfer.deadline = now + self.config.t1;
        self.incoming.push(transfer);
    }

    fn on_cts(&mut self, sa: u8, pgn: u32, count: u8, next: u8, now: Instant) {
        let key = TransferKey {
            sa: self.address,
            da: sa,
            pgn,
        };
        let Some(index) = self.outgoing.iter().position(|t| t.key == key) else {
            return;
        };
        let transfer = &mut self.outgoing[index];
        if transfer.state == TransferState::Broadcasting {
            return;
        }

        if count == 0 {
            transfer.state = TransferState::Held;
            transfer.deadline = now + self.config.t4;
            return;
        }
        if next == 0 || next as u16 > transfer.total {
            let expected = transfer.next_seq.min(u8::MAX as u16) as u8;
            self.fail_outgoing(
                index,
                TransportError::Sequence {
                    expected,
                    found: next,
                },
                Some(AbortReason::BadSequenceNumber),
            );
            return;
        }

        let mut count = count as u16;
        if self.config.num_packets_resp != NO_PACKET_LIMIT && self.config.num_packets_resp != 0 {
            count = count.min(self.config.num_packets_resp as u16);
        }
        let last = (next as u16 + count - 1).min(transfer.total);
        for packet in DataPackets::new(&transfer.payload, next, last as u8, self.config.fill_byte) {
            self.outbox.push_back(dt_frame(self.address, sa, &packet));
        }
        transfer.next_seq = last + 1;
        transfer.state = if last == transfer.total {
            TransferState::AwaitingAck
        } else {
            TransferState::AwaitingCts
        };
        transfer.deadline = now + self.config.t3;
    }

    fn on_abort(&mut self, sa: u8, pgn: u32, reason: AbortReason) {
        #[cfg(feature = "defmt")]
        defmt::warn!("TP abort from {=u8}, reason {=u8}", sa, reason.code());

        let error = TransportError::Aborted { reason };
        let outgoing = TransferKey {
            sa: self.address,
            da: sa,
            pgn,
        };
        if let Some(index) = self.outgoing.iter().position(|t| t.key == outgoing) {
            self.fail_outgoing(index, error.clone(), None);
        }
        let incoming = TransferKey {
            sa,
            da: self.address,
            pgn,
        };
        if let Some(index) = self.incoming.iter().position(|t| t.key == incoming) {
            self.fail_incoming(index, error, None);
        }
    }

    fn on_data(&mut self, sa: u8, da: u8, data: &[u8], now: Instant) {
        let Some(index) = self
            .incoming
            .iter()
            .position(|t| t.key.sa == sa && t.key.da == da)
        else {
            return;
        };
        let Some((&sequence, bytes)) = data.split_first() else {
            return;
        };

        let transfer = &mut self.incoming[index];
        if transfer.state == TransferState::Holding {
            return;
        }
        if sequence as u16 != transfer.next_seq {
            let expected = transfer.next_seq.min(u8::MAX as u16) as u8;
            let reason = if (sequence as u16) < transfer.next_seq {
                AbortReason::DuplicateSequenceNumber
            } else {
                AbortReason::BadSequenceNumber
            };
            #[cfg(feature = "defmt")]
            defmt::warn!("TP sequence error from {=u8}: {=u8} != {=u8}", sa, sequence, expected);
            self.fail_incoming(
                index,
                TransportError::Sequence {
                    expected,
                    found: sequence,
                },
                Some(reason),
            );
            return;
        }

        let start = (sequence as usize - 1) * PACKET_DATA_LEN;
        let take = PACKET_DATA_LEN
            .min(transfer.buffer.len() - start)
            .min(bytes.len());
        transfer.buffer[start..start + take].copy_from_slice(&bytes[..take]);
        transfer.next_seq += 1;
        transfer.window_started = true;

        if transfer.next_seq > transfer.total {
            let transfer = self.incoming.swap_remove(index);
            if !transfer.key.is_broadcast() {
                let ack = ConnectionMessage::EndOfMsgAck {
                    size: transfer.buffer.len() as u16,
                    packets: transfer.total as u8,
                    pgn: transfer.key.pgn,
                };
                self.outbox.push_back(cm_frame(self.address, sa, &ack));
            }
            #[cfg(feature = "defmt")]
            defmt::debug!("TP message from {=u8} complete", sa);
            self.events.push_back(TransportEvent::Received {
                sa,
                da,
                pgn: transfer.key.pgn,
                payload: transfer.buffer,
            });
        } else if transfer.state == TransferState::Receiving
            && transfer.next_seq > transfer.window_end
        {
            transfer.cts_retries = 0;
            let cts = if self.ecu_busy {
                transfer.hold(&self.config, now)
            } else {
                transfer.grant_window(&self.config, now)
            };
            self.outbox.push_back(cm_frame(self.address, sa, &cts));
        } else {
            transfer.deadline = now + self.config.t1;
        }
    }

    //==============================================================================TIMERS
    /// Fire due timers: BAM pacing, CTS repetition, holds and timeouts.
    pub fn poll(&mut self, now: Instant) {
        let mut index = 0;
        while index < self.outgoing.len() {
            let transfer = &mut self.outgoing[index];
            if transfer.deadline > now {
                index += 1;
                continue;
            }
            match transfer.state {
                TransferState::Broadcasting => {
                    let sequence = transfer.next_seq as u8;
                    if let Some(packet) =
                        packet::data_packet(&transfer.payload, sequence, self.config.fill_byte)
                    {
                        self.outbox
                            .push_back(dt_frame(self.address, GLOBAL_ADDRESS, &packet));
                    }
                    transfer.next_seq += 1;
                    if transfer.next_seq > transfer.total {
                        let key = self.outgoing.swap_remove(index).key;
                        self.events.push_back(TransportEvent::Sent { key });
                    } else {
                        transfer.deadline = now + self.config.bam_interval;
                        index += 1;
                    }
                }
                TransferState::Held => self.fail_outgoing(
                    index,
                    TransportError::Timeout {
                        timer: TransportTimer::T4,
                    },
                    Some(AbortReason::Timeout),
                ),
                _ => self.fail_outgoing(
                    index,
                    TransportError::Timeout {
                        timer: TransportTimer::T3,
                    },
                    Some(AbortReason::Timeout),
                ),
            }
        }

        let mut index = 0;
        while index < self.incoming.len() {
            let transfer = &mut self.incoming[index];
            if transfer.deadline > now {
                index += 1;
                continue;
            }
            match transfer.state {
                TransferState::Holding => {
                    let cts = if self.ecu_busy {
                        transfer.hold(&self.config, now)
                    } else {
                        transfer.grant_window(&self.config, now)
                    };
                    self.outbox
                        .push_back(cm_frame(self.address, transfer.key.sa, &cts));
                    index += 1;
                }
                TransferState::Receiving
                    if !transfer.window_started
                        && transfer.cts_retries < self.config.max_repeat_cts =>
                {
                    transfer.cts_retries += 1;
                    transfer.arm_cts_timer(&self.config, now);
                    let cts = transfer.cts();
                    self.outbox
                        .push_back(cm_frame(self.address, transfer.key.sa, &cts));
                    index += 1;
                }
                TransferState::Receiving => {
                    let timer = if transfer.window_started {
                        TransportTimer::T1
                    } else {
                        TransportTimer::T2
                    };
                    self.fail_incoming(
                        index,
                        TransportError::Timeout { timer },
                        Some(AbortReason::Timeout),
                    );
                }
                _ => self.fail_incoming(
                    index,
                    TransportError::Timeout {
                        timer: TransportTimer::T1,
                    },
                    None,
                ),
            }
        }
    }

    //==============================================================================HELPERS
    fn fail_outgoing(&mut self, index: usize, error: TransportError, abort: Option<AbortReason>) {
        let transfer = self.outgoing.swap_remove(index);
        if let Some(reason) = abort {
            if !transfer.key.is_broadcast() {
                self.send_abort(transfer.key.da, transfer.key.pgn, reason);
            }
        }
        #[cfg(feature = "defmt")]
        defmt::warn!("TP transfer to {=u8} failed", transfer.key.da);
        self.events.push_back(TransportEvent::Failed {
            key: transfer.key,
            error,
        });
    }

    fn fail_incoming(&mut self, index: usize, error: TransportError, abort: Option<AbortReason>) {
        let transfer = self.incoming.swap_remove(index);
        if let Some(reason) = abort {
            if !transfer.key.is_broadcast() {
                self.send_abort(transfer.key.sa, transfer.key.pgn, reason);
            }
        }
        #[cfg(feature = "defmt")]
        defmt::warn!("TP transfer from {=u8} failed", transfer.key.sa);
        self.events.push_back(TransportEvent::Failed {
            key: transfer.key,
            error,
        });
    }

    fn send_abort(&mut self, destination: u8, pgn: u32, reason: AbortReason) {
        let abort = ConnectionMessage::Abort { reason, pgn };
        self.outbox
            .push_back(cm_frame(self.address, destination, &abort));
    }
}

fn is_pdu1(pgn: u32) -> bool {
    (((pgn >> 8) & 0xFF) as u8) < PDU2_THRESHOLD
}

/// TP.CM and TP.DT are PDU1 groups with PS = 0, so the identifier never
/// fails to build.
fn tp_id(pgn: u32, sa: u8, da: u8) -> CanId {
    CanId(((TP_PRIORITY as u32) << 26) | (pgn << 8) | ((da as u32) << 8) | sa as u32)
}

fn cm_frame(sa: u8, da: u8, message: &ConnectionMessage) -> CanFrame {
    CanFrame::new(tp_id(PGN_TP_CM, sa, da), &message.encode())
}

fn dt_frame(sa: u8, da: u8, packet: &[u8; 8]) -> CanFrame {
    CanFrame::new(tp_id(PGN_TP_DT, sa, da), packet)
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
