//! # Message Forwarding Service
//!
//! Best-effort hop-by-hop unicast. Each hop looks the destination up in the route
//! table, rewrites the next-hop byte and re-broadcasts; only the addressed hop acts
//! on a packet. No acknowledgement, no retry.
//!
//! Duplicate suppression keys on the bare message id (see [`DedupCache`]).

use crate::core::address::NodeAddress;
use crate::core::packet::MessageHeader;
use crate::error::{MeshError, Result};
use crate::protocol::listeners::{ListenerId, ListenerSet};
use crate::service::routing::RoutingService;
use crate::utils::dedup_cache::DedupCache;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Observer of unicast traffic addressed to, or relayed by, this node
pub trait MessageListener: Send + Sync {
    fn on_message_received(&self, _source: NodeAddress, _payload: &[u8]) {}
    /// `next_hop` is `None` when the relay had no route and sent the packet on with the sentinel
    fn on_message_forward(&self, _source: NodeAddress, _next_hop: Option<NodeAddress>) {}
}

/// What a locally originated message turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Framed packet for the message channel
    Enqueue(Vec<u8>),
    /// Addressed to ourselves; listeners already ran
    DeliveredLocally,
}

/// What an inbound message packet turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Addressed to another hop
    NotForUs,
    /// Id seen within the dedup window
    Duplicate,
    /// Relay the rewritten packet
    Forward {
        packet: Vec<u8>,
        next_hop: Option<NodeAddress>,
    },
    Delivered { source: NodeAddress, len: usize },
}

pub struct MessageService {
    address: NodeAddress,
    max_payload: usize,
    recent: DedupCache,
    listeners: ListenerSet<dyn MessageListener>,
}

impl MessageService {
    pub fn new(address: NodeAddress, max_payload: usize, dedup_window: Duration, dedup_capacity: usize) -> Self {
        Self {
            address,
            max_payload,
            recent: DedupCache::new(dedup_window, dedup_capacity),
            listeners: ListenerSet::new(),
        }
    }

    pub fn listeners(&self) -> &ListenerSet<dyn MessageListener> {
        &self.listeners
    }

    pub fn add_listener(&self, listener: Arc<dyn MessageListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Largest payload one message packet can carry.
    pub fn max_message_payload(&self) -> usize {
        self.max_payload.saturating_sub(MessageHeader::LEN)
    }

    /// Frame `payload` for `dest` with a random id and the current next hop.
    ///
    /// With no route the packet still goes out with the sentinel next hop.
    pub fn send(&self, dest: NodeAddress, payload: &[u8], routing: &RoutingService) -> Result<SendOutcome> {
        let limit = self.max_message_payload();
        if payload.len() > limit {
            return Err(MeshError::PayloadTooLarge {
                size: payload.len(),
                limit,
            });
        }

        if dest == self.address {
            debug!(len = payload.len(), "Message to self delivered locally");
            self.listeners
                .notify(|l| l.on_message_received(self.address, payload));
            return Ok(SendOutcome::DeliveredLocally);
        }

        let header = MessageHeader {
            next_hop: routing.next_hop(dest),
            source: self.address,
            dest,
            id: rand::random::<u8>(),
        };
        trace!(dest = %dest, id = header.id, next_hop = ?header.next_hop, "Message framed");
        Ok(SendOutcome::Enqueue(header.encode(payload)))
    }

    /// Process one inbound message packet.
    pub fn handle(&mut self, now: Instant, data: &[u8], routing: &RoutingService) -> Result<MessageOutcome> {
        let (header, payload) = MessageHeader::decode(data)?;

        if header.next_hop != Some(self.address) {
            return Ok(MessageOutcome::NotForUs);
        }

        if self.recent.is_duplicate(header.id, now) {
            return Ok(MessageOutcome::Duplicate);
        }

        if header.dest != self.address {
            let next_hop = routing.next_hop(header.dest);
            let mut packet = data.to_vec();
            MessageHeader::rewrite_next_hop(&mut packet, next_hop)?;

            debug!(source = %header.source, dest = %header.dest, next_hop = ?next_hop, "Forwarding message");
            self.listeners
                .notify(|l| l.on_message_forward(header.source, next_hop));
            return Ok(MessageOutcome::Forward { packet, next_hop });
        }

        debug!(source = %header.source, len = payload.len(), "Message received");
        self.listeners
            .notify(|l| l.on_message_received(header.source, payload));
        Ok(MessageOutcome::Delivered {
            source: header.source,
            len: payload.len(),
        })
    }
}
