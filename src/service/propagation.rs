//! # Flood Propagation Service
//!
//! Network-wide flooding ordered by a single signed byte cursor. A flood is relayed
//! the first time its id moves the cursor forward; anything at or behind the cursor
//! is dropped, except a very negative id seen while the cursor is very positive,
//! which is the counter wrapping around.
//!
//! There is no per-source state. Ids from more than one concurrent originator are
//! not meaningfully ordered.

use crate::core::packet::FloodPacket;
use crate::error::{MeshError, Result};
use crate::protocol::listeners::{ListenerId, ListenerSet};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Cursor value before any flood has been seen or originated
pub const INITIAL_CURSOR: i8 = -1;

const WRAP_LOW: i8 = -64;
const WRAP_HIGH: i8 = 64;

/// Observer of newly accepted floods (relayed or originated here)
pub trait PropagationListener: Send + Sync {
    fn on_flood(&self, id: i8, payload: &[u8]);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloodOutcome {
    /// New id: re-broadcast these bytes unchanged
    Relay { id: i8, packet: Vec<u8> },
    /// At or behind the cursor
    Stale { id: i8 },
}

pub struct PropagationService {
    last_id: i8,
    max_payload: usize,
    listeners: ListenerSet<dyn PropagationListener>,
}

impl PropagationService {
    pub fn new(max_payload: usize) -> Self {
        Self {
            last_id: INITIAL_CURSOR,
            max_payload,
            listeners: ListenerSet::new(),
        }
    }

    pub fn listeners(&self) -> &ListenerSet<dyn PropagationListener> {
        &self.listeners
    }

    pub fn add_listener(&self, listener: Arc<dyn PropagationListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn last_id(&self) -> i8 {
        self.last_id
    }

    /// Advance the cursor and return the new id.
    pub fn get_new_id(&mut self) -> i8 {
        self.last_id = self.last_id.wrapping_add(1);
        self.last_id
    }

    /// Whether `id` moves the cursor forward.
    pub fn accepts(&self, id: i8) -> bool {
        id > self.last_id || (id < WRAP_LOW && self.last_id > WRAP_HIGH)
    }

    /// Originate a flood; returns the allocated id and the framed packet.
    pub fn flood(&mut self, payload: &[u8]) -> Result<(i8, Vec<u8>)> {
        let limit = self.max_payload.saturating_sub(1);
        if payload.len() > limit {
            return Err(MeshError::PayloadTooLarge {
                size: payload.len(),
                limit,
            });
        }

        let id = self.get_new_id();
        let packet = FloodPacket {
            id,
            payload: payload.to_vec(),
        };
        debug!(id, len = payload.len(), "Originating flood");
        self.listeners.notify(|l| l.on_flood(id, payload));
        Ok((id, packet.encode()))
    }

    /// Process one inbound flood packet.
    pub fn handle(&mut self, data: &[u8]) -> Result<FloodOutcome> {
        let flood = FloodPacket::decode(data)?;

        if !self.accepts(flood.id) {
            trace!(id = flood.id, last_id = self.last_id, "Stale flood dropped");
            return Ok(FloodOutcome::Stale { id: flood.id });
        }
        if flood.id <= self.last_id {
            info!(id = flood.id, last_id = self.last_id, "Flood id window wrapped");
        }

        debug!(id = flood.id, "Propagating flood");
        self.last_id = flood.id;
        self.listeners.notify(|l| l.on_flood(flood.id, &flood.payload));
        Ok(FloodOutcome::Relay {
            id: flood.id,
            packet: data.to_vec(),
        })
    }
}
