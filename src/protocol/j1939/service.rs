//! Async J1939 node: owns a [`CanBus`] link, keeps its claimed address
//! (defending it and reclaiming when it loses), and drives a
//! [`TransportManager`] from bus traffic and timer deadlines.
//!
//! [`J1939Endpoint`] can be used directly (`send` / `next_event`), or split
//! through [`J1939Service::into_parts`] into:
//!
//! * a command handle ([`J1939Handle`]) to queue messages from other tasks;
//! * an event receiver ([`J1939Events`]) for completed and failed transfers;
//! * the runner ([`J1939Runner`]) that owns the link.
//!
//! Channels are provided by the caller as `embassy_sync` [`Channel`]s.
use alloc::vec::Vec;
use core::fmt::Debug;

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, Receiver, Sender},
};
use futures_util::{future::select, future::Either, pin_mut};

use super::address_claiming::{build_address_claim_frame, claim_address, extract_name_from_claim};
use super::name::J1939Name;
use super::transport::{TransferKey, TransportConfig, TransportEvent, TransportManager};
use super::{GLOBAL_ADDRESS, NULL_ADDRESS, PGN_ADDRESS_CLAIM, PGN_REQUEST};
use crate::error::{ClaimError, EndpointError};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::traits::xnet_timer::{wait_for, XnetTimer};

//==================================================================================ENDPOINT
/// J1939 node bound to one CAN link.
pub struct J1939Endpoint<C: CanBus, T: XnetTimer> {
    can_bus: C,
    timer: T,
    name: J1939Name,
    preferred_address: u8,
    transport: TransportManager,
}

impl<C, T> J1939Endpoint<C, T>
where
    C: CanBus,
    C::Error: Debug,
    T: XnetTimer,
{
    /// Claim an address, then build the endpoint on it.
    ///
    /// A node that cannot claim any address still gets an endpoint, on
    /// [`NULL_ADDRESS`], so it can keep listening.
    pub async fn claim(
        mut can_bus: C,
        timer: T,
        name: J1939Name,
        preferred_address: u8,
        config: TransportConfig,
    ) -> Result<Self, ClaimError<C::Error>> {
        let address =
            match claim_address(&mut can_bus, &timer, name, preferred_address).await {
                Ok(address) => address,
                Err(ClaimError::NoAddressAvailable) => NULL_ADDRESS,
                Err(err) => return Err(err),
            };
        let mut endpoint = Self {
            can_bus,
            timer,
            name,
            preferred_address,
            transport: TransportManager::new(address, config),
        };
        endpoint.sync();
        Ok(endpoint)
    }

    /// Endpoint on an address obtained elsewhere (no claim is sent).
    pub fn with_address(
        can_bus: C,
        timer: T,
        name: J1939Name,
        address: u8,
        config: TransportConfig,
    ) -> Self {
        let mut endpoint = Self {
            can_bus,
            timer,
            name,
            preferred_address: address,
            transport: TransportManager::new(address, config),
        };
        endpoint.sync();
        endpoint
    }

    pub fn address(&self) -> u8 {
        self.transport.address()
    }

    pub fn name(&self) -> J1939Name {
        self.name
    }

    pub fn transport(&self) -> &TransportManager {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut TransportManager {
        &mut self.transport
    }

    /// Exchange settings with the link (see [`CanBus::sync_transport`]).
    pub fn sync(&mut self) {
        self.can_bus.sync_transport(&mut self.transport);
    }

    /// Queue a message and put its first frames on the bus.
    pub async fn send(
        &mut self,
        destination: Option<u8>,
        pgn: u32,
        payload: &[u8],
    ) -> Result<TransferKey, EndpointError<C::Error>> {
        self.sync();
        let now = self.timer.now();
        let key = self.transport.send(destination, pgn, payload, now)?;
        self.flush().await?;
        Ok(key)
    }

    /// Wait for the next completed or failed transfer, serving the bus and
    /// the transport timers meanwhile.
    pub async fn next_event(&mut self) -> Result<TransportEvent, EndpointError<C::Error>> {
        loop {
            self.sync();
            if let Some(event) = self.transport.poll_event() {
                return Ok(event);
            }
            let deadline = self.transport.next_deadline();
            let received = {
                let recv = self.can_bus.recv();
                let wait = wait_for(&self.timer, deadline);
                pin_mut!(recv);
                pin_mut!(wait);
                match select(recv, wait).await {
                    Either::Left((result, _)) => Some(result),
                    Either::Right(_) => None,
                }
            };
            match received {
                Some(frame) => {
                    let frame = frame.map_err(EndpointError::Receive)?;
                    self.handle_frame(&frame).await?;
                }
                None => self.poll_timers().await?,
            }
        }
    }

    /// Process one received frame: address management first, then the
    /// transport protocol.
    pub async fn handle_frame(&mut self, frame: &CanFrame) -> Result<(), EndpointError<C::Error>> {
        self.sync();
        match frame.id.pgn() {
            PGN_ADDRESS_CLAIM => self.on_claim(frame).await?,
            PGN_REQUEST if requests_address_claim(frame, self.address()) => {
                self.send_claim().await?
            }
            _ => {
                let now = self.timer.now();
                self.transport.handle_frame(frame, now);
            }
        }
        self.flush().await
    }

    /// Fire due transport timers and send what they produced.
    pub async fn poll_timers(&mut self) -> Result<(), EndpointError<C::Error>> {
        self.sync();
        let now = self.timer.now();
        self.transport.poll(now);
        self.flush().await
    }

    /// Hand every pending transport frame to the link.
    pub async fn flush(&mut self) -> Result<(), EndpointError<C::Error>> {
        while let Some(frame) = self.transport.poll_transmit() {
            self.can_bus
                .send(&frame)
                .await
                .map_err(EndpointError::Send)?;
        }
        Ok(())
    }

    async fn on_claim(&mut self, frame: &CanFrame) -> Result<(), EndpointError<C::Error>> {
        let address = self.address();
        if frame.id.source_address() != address || address == NULL_ADDRESS {
            return Ok(());
        }
        let Ok(their_name) = extract_name_from_claim(frame) else {
            return Ok(());
        };
        if their_name == self.name {
            return Ok(());
        }
        if self.name.wins_against(their_name) {
            #[cfg(feature = "defmt")]
            defmt::debug!("Defending address {}", address);
            self.send_claim().await
        } else {
            #[cfg(feature = "defmt")]
            defmt::warn!("Address {} lost, reclaiming", address);
            self.transport.set_address(NULL_ADDRESS);
            let claimed = match claim_address(
                &mut self.can_bus,
                &self.timer,
                self.name,
                self.preferred_address,
            )
            .await
            {
                Ok(address) => address,
                Err(ClaimError::NoAddressAvailable) => NULL_ADDRESS,
                Err(err) => return Err(err.into()),
            };
            self.transport.set_address(claimed);
            self.sync();
            Ok(())
        }
    }

    async fn send_claim(&mut self) -> Result<(), EndpointError<C::Error>> {
        let claim = build_address_claim_frame(self.name, self.address())
            .map_err(|err| EndpointError::Claim(ClaimError::BuildErr(err)))?;
        self.can_bus
            .send(&claim)
            .await
            .map_err(EndpointError::Send)
    }
}

/// Request (PGN 59904) for PGN 60928 sent to us or to everyone.
fn requests_address_claim(frame: &CanFrame, address: u8) -> bool {
    let destination = frame.id.destination().unwrap_or(GLOBAL_ADDRESS);
    let payload = frame.payload();
    (destination == address || destination == GLOBAL_ADDRESS)
        && payload.len() >= 3
        && u32::from_le_bytes([payload[0], payload[1], payload[2], 0]) == PGN_ADDRESS_CLAIM
}

//==================================================================================SERVICE
/// Commands accepted by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointCommand {
    Send {
        destination: Option<u8>,
        pgn: u32,
        payload: Vec<u8>,
    },
    SetBusy(bool),
}

type CommandChannel<const N: usize> = Channel<CriticalSectionRawMutex, EndpointCommand, N>;
type EventChannel<const N: usize> = Channel<CriticalSectionRawMutex, TransportEvent, N>;

/// Endpoint plus its optional command and event channels.
pub struct J1939Service<'a, C, T, const CMD_CAP: usize, const EVENT_CAP: usize>
where
    C: CanBus,
    T: XnetTimer,
{
    endpoint: J1939Endpoint<C, T>,
    command_channel: Option<&'a CommandChannel<CMD_CAP>>,
    event_channel: Option<&'a EventChannel<EVENT_CAP>>,
}

impl<'a, C, T, const CMD_CAP: usize, const EVENT_CAP: usize>
    J1939Service<'a, C, T, CMD_CAP, EVENT_CAP>
where
    C: CanBus,
    C::Error: Debug,
    T: XnetTimer,
{
    pub fn new(
        endpoint: J1939Endpoint<C, T>,
        command_channel: Option<&'a CommandChannel<CMD_CAP>>,
        event_channel: Option<&'a EventChannel<EVENT_CAP>>,
    ) -> Self {
        Self {
            endpoint,
            command_channel,
            event_channel,
        }
    }

    /// Split into handle, event receiver and runner.
    pub fn into_parts(self) -> J1939ServiceParts<'a, C, T, CMD_CAP, EVENT_CAP> {
        J1939ServiceParts {
            handle: self.command_channel.map(|channel| J1939Handle {
                sender: channel.sender(),
            }),
            events: self.event_channel.map(|channel| J1939Events {
                receiver: channel.receiver(),
            }),
            runner: J1939Runner {
                endpoint: self.endpoint,
                command_channel: self.command_channel,
                event_channel: self.event_channel,
            },
        }
    }
}

/// Bundle returned by [`J1939Service::into_parts`].
pub struct J1939ServiceParts<'a, C, T, const CMD_CAP: usize, const EVENT_CAP: usize>
where
    C: CanBus,
    T: XnetTimer,
{
    pub handle: Option<J1939Handle<'a, CMD_CAP>>,
    pub events: Option<J1939Events<'a, EVENT_CAP>>,
    pub runner: J1939Runner<'a, C, T, CMD_CAP, EVENT_CAP>,
}

/// Queues commands for the runner.
pub struct J1939Handle<'a, const CMD_CAP: usize> {
    sender: Sender<'a, CriticalSectionRawMutex, EndpointCommand, CMD_CAP>,
}

impl<const CMD_CAP: usize> J1939Handle<'_, CMD_CAP> {
    pub async fn send(&self, destination: Option<u8>, pgn: u32, payload: &[u8]) {
        self.sender
            .send(EndpointCommand::Send {
                destination,
                pgn,
                payload: payload.to_vec(),
            })
            .await;
    }

    pub async fn set_busy(&self, busy: bool) {
        self.sender.send(EndpointCommand::SetBusy(busy)).await;
    }
}

/// Completed and failed transfers reported by the runner.
pub struct J1939Events<'a, const EVENT_CAP: usize> {
    receiver: Receiver<'a, CriticalSectionRawMutex, TransportEvent, EVENT_CAP>,
}

impl<const EVENT_CAP: usize> J1939Events<'_, EVENT_CAP> {
    pub async fn receive(&self) -> TransportEvent {
        self.receiver.receive().await
    }

    pub fn try_receive(&self) -> Option<TransportEvent> {
        self.receiver.try_receive().ok()
    }
}

enum Wake<E> {
    Frame(Result<CanFrame, E>),
    Command(EndpointCommand),
    Timer,
}

/// Owns the endpoint and serves bus, commands and timers.
pub struct J1939Runner<'a, C, T, const CMD_CAP: usize, const EVENT_CAP: usize>
where
    C: CanBus,
    T: XnetTimer,
{
    endpoint: J1939Endpoint<C, T>,
    command_channel: Option<&'a CommandChannel<CMD_CAP>>,
    event_channel: Option<&'a EventChannel<EVENT_CAP>>,
}

impl<C, T, const CMD_CAP: usize, const EVENT_CAP: usize> J1939Runner<'_, C, T, CMD_CAP, EVENT_CAP>
where
    C: CanBus,
    C::Error: Debug,
    T: XnetTimer,
{
    /// Run until the link fails.
    pub async fn drive(mut self) -> Result<(), EndpointError<C::Error>> {
        loop {
            self.endpoint.sync();
            self.forward_events();

            let command_channel = self.command_channel;
            let deadline = self.endpoint.transport.next_deadline();
            let wake = {
                let recv = self.endpoint.can_bus.recv();
                let command = async {
                    match command_channel {
                        Some(channel) => channel.receive().await,
                        None => core::future::pending().await,
                    }
                };
                let wait = wait_for(&self.endpoint.timer, deadline);
                pin_mut!(recv);
                pin_mut!(command);
                pin_mut!(wait);

                match select(select(recv, command), wait).await {
                    Either::Left((Either::Left((frame, _)), _)) => Wake::Frame(frame),
                    Either::Left((Either::Right((command, _)), _)) => Wake::Command(command),
                    Either::Right(_) => Wake::Timer,
                }
            };

            match wake {
                Wake::Frame(frame) => {
                    let frame = frame.map_err(EndpointError::Receive)?;
                    self.endpoint.handle_frame(&frame).await?;
                }
                Wake::Command(EndpointCommand::Send {
                    destination,
                    pgn,
                    payload,
                }) => {
                    let now = self.endpoint.timer.now();
                    match self.endpoint.transport.send(destination, pgn, &payload, now) {
                        Ok(_) => self.endpoint.flush().await?,
                        Err(error) => {
                            let key = TransferKey {
                                sa: self.endpoint.address(),
                                da: destination.unwrap_or(GLOBAL_ADDRESS),
                                pgn,
                            };
                            self.publish(TransportEvent::Failed { key, error });
                        }
                    }
                }
                Wake::Command(EndpointCommand::SetBusy(busy)) => {
                    let now = self.endpoint.timer.now();
                    self.endpoint.transport.set_busy(busy, now);
                    self.endpoint.sync();
                    self.endpoint.flush().await?;
                }
                Wake::Timer => self.endpoint.poll_timers().await?,
            }
        }
    }

    fn forward_events(&mut self) {
        while let Some(event) = self.endpoint.transport.poll_event() {
            self.publish(event);
        }
    }

    /// Never blocks: the runner must keep serving the bus.
    fn publish(&self, event: TransportEvent) {
        if let Some(channel) = self.event_channel {
            if channel.try_send(event).is_err() {
                #[cfg(feature = "defmt")]
                defmt::warn!("J1939 event channel full, event dropped");
            }
        }
    }
}
