//! Inbound half of the bus boundary.
use alloc::sync::Arc;
use core::sync::atomic::Ordering;

use embassy_time::Instant;

use super::SessionCore;
use crate::protocol::transport::bus_frame::{BusFrame, FrameKey};

/// Handle a driver uses to deliver received frames to an input session.
///
/// Pushing never blocks: a full queue drops its oldest frame and counts
/// the loss in `num_overflow`. Frames arriving while the session is
/// stopped, or that are not part of it, are ignored.
#[derive(Clone)]
pub struct RxPort {
    core: Arc<SessionCore>,
}

impl RxPort {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    /// Driver receive callback.
    pub fn on_frame_received(&self, key: FrameKey, payload: &[u8], timestamp: Instant) -> bool {
        self.push(BusFrame::new(key, payload).with_timestamp(timestamp))
    }

    /// Deliver `frame`. Returns whether the session kept it.
    pub fn push(&self, frame: BusFrame) -> bool {
        let mode = self.core.mode;
        match self.core.with(|s| s.receive(mode, frame)) {
            None => false,
            Some(evicted) => {
                if evicted {
                    self.core.num_overflow.fetch_add(1, Ordering::Relaxed);
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Inbound queue full, oldest frame dropped");
                }
                true
            }
        }
    }
}
