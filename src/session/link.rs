//! J1939 over sessions.
//!
//! A [`SessionLink`] pairs a CAN input stream session with an output
//! stream session on the same interface and presents them as a
//! [`CanBus`], so the J1939 endpoint and transport run on top of the
//! session queues like any other application.
//!
//! The output session's J1939 settings stay live: changes made through
//! its properties reach the endpoint at its next step, and the endpoint's
//! address and ECU busy state are written back for the properties to
//! report.
use embassy_time::Instant;
use futures_util::Future;

use super::{J1939Settings, Session, SessionMode};
use crate::core::Timeout;
use crate::error::{ClaimError, SessionError};
use crate::protocol::j1939::name::J1939Name;
use crate::protocol::j1939::service::J1939Endpoint;
use crate::protocol::j1939::transport::TransportManager;
use crate::protocol::transport::bus_frame::BusFrame;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::traits::xnet_timer::XnetTimer;

/// [`CanBus`] backed by a pair of stream sessions.
pub struct SessionLink<'a, T: XnetTimer + Clone> {
    input: &'a Session<T>,
    output: &'a Session<T>,
    /// Settings revision the endpoint last applied.
    revision: u32,
}

impl<'a, T: XnetTimer + Clone> SessionLink<'a, T> {
    /// Fails unless `input` is a frame input stream and `output` a frame
    /// output stream.
    pub fn new(input: &'a Session<T>, output: &'a Session<T>) -> Result<Self, SessionError> {
        if input.mode() != SessionMode::FrameInStream || output.mode() != SessionMode::FrameOutStream {
            return Err(SessionError::InvalidMode { operation: "link" });
        }
        Ok(Self {
            input,
            output,
            revision: 0,
        })
    }

    /// Settings of the output session, marked as applied.
    fn take_settings(&mut self) -> J1939Settings {
        let (settings, revision) = self
            .output
            .core
            .with(|s| (s.j1939.clone(), s.j1939_revision));
        self.revision = revision;
        settings
    }

    /// Endpoint on the output session's J1939 address and NAME, without
    /// sending a claim.
    pub fn endpoint(mut self, timer: T) -> J1939Endpoint<Self, T> {
        let settings = self.take_settings();
        let now: Instant = timer.now();
        let mut endpoint = J1939Endpoint::with_address(
            self,
            timer,
            J1939Name::from_raw(settings.name),
            settings.address,
            settings.transport,
        );
        endpoint.transport_mut().set_busy(settings.ecu_busy, now);
        endpoint.sync();
        endpoint
    }

    /// Endpoint that first claims the output session's J1939 address.
    pub async fn claim(mut self, timer: T) -> Result<J1939Endpoint<Self, T>, ClaimError<SessionError>> {
        let settings = self.take_settings();
        let now = timer.now();
        let mut endpoint = J1939Endpoint::claim(
            self,
            timer,
            J1939Name::from_raw(settings.name),
            settings.address,
            settings.transport,
        )
        .await?;
        endpoint.transport_mut().set_busy(settings.ecu_busy, now);
        endpoint.sync();
        Ok(endpoint)
    }
}

impl<T: XnetTimer + Clone> CanBus for SessionLink<'_, T> {
    type Error = SessionError;

    fn send<'b>(&'b mut self, frame: &'b CanFrame) -> impl Future<Output = Result<(), Self::Error>> + 'b {
        core::future::ready(self.output.write(&[BusFrame::from(frame)]))
    }

    /// Next J1939 frame of the input session. Echoes of our own frames,
    /// standard identifiers and CAN FD payloads are skipped. Fails with
    /// `NotRunning` once the input session stops.
    fn recv<'b>(&'b mut self) -> impl Future<Output = Result<CanFrame, Self::Error>> + 'b {
        async move {
            loop {
                let frames = self.input.read(1, Timeout::Infinite).await?;
                let Some(frame) = frames.first() else {
                    return Err(SessionError::NotRunning);
                };
                if frame.echo {
                    continue;
                }
                if let Ok(frame) = CanFrame::try_from(frame) {
                    return Ok(frame);
                }
            }
        }
    }

    /// Apply settings changed since the last step, then publish the
    /// endpoint's live address and busy state.
    fn sync_transport(&mut self, transport: &mut TransportManager) {
        let now = self.output.timer().now();
        let seen = self.revision;
        self.revision = self.output.core.with(|s| {
            if s.j1939_revision != seen {
                let settings = &s.j1939;
                *transport.config_mut() = settings.transport;
                if transport.address() != settings.address {
                    transport.set_address(settings.address);
                }
                if transport.is_busy() != settings.ecu_busy {
                    transport.set_busy(settings.ecu_busy, now);
                }
            }
            s.j1939.address = transport.address();
            s.j1939.ecu_busy = transport.is_busy();
            s.j1939_revision
        });
    }
}
