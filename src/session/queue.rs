//! Bounded frame queues of a session.
//!
//! The inbound queue never refuses a frame: when full it drops the oldest
//! entry and reports the eviction so the caller can count it. The outbound
//! queue refuses instead, since an application writer can retry while the
//! bus cannot.
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::error::SessionError;
use crate::protocol::transport::bus_frame::BusFrame;

//==================================================================================INBOUND
/// Received frames waiting for the application.
#[derive(Debug, Clone, Default)]
pub struct InboundQueue {
    frames: VecDeque<BusFrame>,
    capacity: usize,
}

impl InboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resize, dropping the oldest frames that no longer fit.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.frames.len() > capacity {
            self.frames.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Append `frame`. Returns `true` when the oldest frame was evicted
    /// to make room.
    pub fn push(&mut self, frame: BusFrame) -> bool {
        let mut evicted = false;
        while self.frames.len() >= self.capacity.max(1) {
            self.frames.pop_front();
            evicted = true;
        }
        self.frames.push_back(frame);
        evicted
    }

    /// Remove up to `max` frames, oldest first.
    pub fn drain(&mut self, max: usize) -> Vec<BusFrame> {
        let count = max.min(self.frames.len());
        self.frames.drain(..count).collect()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

//==================================================================================OUTBOUND
/// Frame written by the application and not yet released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    /// Session frame index; `None` for stream sessions.
    pub slot: Option<usize>,
    pub frame: BusFrame,
}

/// Frames waiting for their release.
#[derive(Debug, Clone, Default)]
pub struct OutboundQueue {
    items: VecDeque<Pending>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resize, dropping the newest frames that no longer fit.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.items.truncate(capacity);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Free entries.
    pub fn room(&self) -> usize {
        self.capacity.saturating_sub(self.items.len())
    }

    pub fn push(&mut self, slot: Option<usize>, frame: BusFrame) -> Result<(), SessionError> {
        if self.room() == 0 {
            return Err(SessionError::QueueFull);
        }
        self.items.push_back(Pending { slot, frame });
        Ok(())
    }

    pub fn front(&self) -> Option<&Pending> {
        self.items.front()
    }

    pub fn pop_front(&mut self) -> Option<Pending> {
        self.items.pop_front()
    }

    /// Oldest frame written for `slot`.
    pub fn take_slot(&mut self, slot: usize) -> Option<Pending> {
        self.take_first(|p| p.slot == Some(slot))
    }

    /// Oldest frame matching `predicate`.
    pub fn take_first(&mut self, predicate: impl Fn(&Pending) -> bool) -> Option<Pending> {
        let position = self.items.iter().position(predicate)?;
        self.items.remove(position)
    }

    pub fn any(&self, predicate: impl Fn(&Pending) -> bool) -> bool {
        self.items.iter().any(predicate)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
