//! # Routing Service
//!
//! Distance-vector route computation with neighbour liveness and timeout-driven
//! withdrawal.
//!
//! The service does no I/O and reads no clock: every entry point takes `now`, and
//! the packets to broadcast are returned to the caller. The node actor owns the
//! only instance and drives it from its tick timer and inbound routing traffic.
//!
//! ## Route states
//! ```text
//!   unknown --(update, cost < INF)--> ACTIVE --(timeout / next hop reports INF)--> WITHDRAWN
//!                                       ^                                            |
//!                                       +------(lower cost, after hold-down)---------+
//! ```
//! The self route `(self, 0, self)` is permanent and never changes state.
//!
//! Routes are never removed. A withdrawn route keeps `cost == INFINITY` and is
//! advertised until its hold-down clears so neighbours learn of the withdrawal.
//!
//! Without per-route sequence numbers count-to-infinity loops are still possible;
//! cost saturates at [`INFINITY`] and timeouts eventually clear them.

use crate::config::RoutingConfig;
use crate::core::address::{NodeAddress, INFINITY};
use crate::core::packet::{decode_routing_packet, encode_routing_table, Triplet};
use crate::error::Result;
use crate::protocol::listeners::{ListenerId, ListenerSet};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// One entry of the route table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub dest: NodeAddress,
    /// In `[0, INFINITY]`; `INFINITY` means withdrawn
    pub cost: u8,
    /// `None` while withdrawn
    pub next_hop: Option<NodeAddress>,
    /// Last refresh, or the end of the hold-down for a withdrawn route
    pub last_update: Instant,
}

impl Path {
    pub fn is_withdrawn(&self) -> bool {
        self.cost >= INFINITY
    }
}

/// A node heard directly on the medium
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborRecord {
    pub neighbor: NodeAddress,
    pub last_heard: Instant,
}

/// Route table change, delivered to [`RoutingListener`]s after processing completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteEvent {
    /// New destination, or reconnection of a withdrawn one
    Added {
        dest: NodeAddress,
        cost: u8,
        next_hop: NodeAddress,
    },
    /// Strictly cheaper path through a different neighbour
    Updated {
        dest: NodeAddress,
        cost: u8,
        next_hop: NodeAddress,
    },
    /// Route withdrawn; `next_hop` names the neighbour that withdrew it, `None` on timeout
    Deleted {
        dest: NodeAddress,
        cost: u8,
        next_hop: Option<NodeAddress>,
    },
}

/// Observer of route table changes.
///
/// Callbacks run on the node actor after the table is consistent. They may
/// register or remove listeners and send through a `NodeHandle`.
pub trait RoutingListener: Send + Sync {
    fn on_path_added(&self, _dest: NodeAddress, _cost: u8, _next_hop: NodeAddress) {}
    fn on_path_updated(&self, _dest: NodeAddress, _cost: u8, _next_hop: NodeAddress) {}
    fn on_path_deleted(&self, _dest: NodeAddress, _cost: u8, _next_hop: Option<NodeAddress>) {}
}

/// Result of one periodic tick
#[derive(Debug, Default)]
pub struct RoutingTick {
    /// Route table fragments, in order, for the routing channel
    pub packets: Vec<Vec<u8>>,
    /// Withdrawals caused by the timeout sweep
    pub events: Vec<RouteEvent>,
}

pub struct RoutingService {
    address: NodeAddress,
    routes: HashMap<NodeAddress, Path>,
    neighbors: HashMap<NodeAddress, Instant>,
    route_timeout: Duration,
    holddown: Duration,
    max_payload: usize,
    last_sweep: Option<Instant>,
    running: bool,
    listeners: ListenerSet<dyn RoutingListener>,
}

impl RoutingService {
    pub fn new(address: NodeAddress, config: &RoutingConfig, max_payload: usize, now: Instant) -> Self {
        let mut routes = HashMap::new();
        routes.insert(
            address,
            Path {
                dest: address,
                cost: 0,
                next_hop: Some(address),
                last_update: now,
            },
        );

        Self {
            address,
            routes,
            neighbors: HashMap::new(),
            route_timeout: config.route_timeout,
            holddown: config.holddown(),
            max_payload,
            last_sweep: None,
            running: false,
            listeners: ListenerSet::new(),
        }
    }

    pub fn address(&self) -> NodeAddress {
        self.address
    }

    pub fn start(&mut self) {
        if !self.running {
            info!(node = %self.address, "Routing started");
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        if self.running {
            info!(node = %self.address, "Routing stopped");
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Listener registry; clones share the same set.
    pub fn listeners(&self) -> &ListenerSet<dyn RoutingListener> {
        &self.listeners
    }

    pub fn add_listener(&self, listener: Arc<dyn RoutingListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Next hop towards `dest`; `None` if unknown or withdrawn.
    pub fn next_hop(&self, dest: NodeAddress) -> Option<NodeAddress> {
        self.routes
            .get(&dest)
            .filter(|path| !path.is_withdrawn())
            .and_then(|path| path.next_hop)
    }

    pub fn path(&self, dest: NodeAddress) -> Option<&Path> {
        self.routes.get(&dest)
    }

    /// Copy of the route table, sorted by destination.
    pub fn routes(&self) -> Vec<Path> {
        let mut routes: Vec<Path> = self.routes.values().cloned().collect();
        routes.sort_by_key(|path| path.dest);
        routes
    }

    /// Neighbours heard within the route timeout, sorted by address.
    pub fn neighbors(&self) -> Vec<NeighborRecord> {
        let mut neighbors: Vec<NeighborRecord> = self
            .neighbors
            .iter()
            .map(|(&neighbor, &last_heard)| NeighborRecord { neighbor, last_heard })
            .collect();
        neighbors.sort_by_key(|record| record.neighbor);
        neighbors
    }

    /// Periodic tick: timeout sweep, then serialization of the table.
    ///
    /// Does nothing while stopped.
    pub fn tick(&mut self, now: Instant) -> RoutingTick {
        if !self.running {
            return RoutingTick::default();
        }

        let events = self.sweep(now);
        let packets = self.serialize(now);
        trace!(node = %self.address, fragments = packets.len(), "Routing table serialized");

        self.notify(&events);
        RoutingTick { packets, events }
    }

    fn sweep(&mut self, now: Instant) -> Vec<RouteEvent> {
        if let Some(last) = self.last_sweep {
            if now <= last + self.route_timeout {
                return Vec::new();
            }
        }
        self.last_sweep = Some(now);

        let timeout = self.route_timeout;
        self.neighbors.retain(|neighbor, last_heard| {
            let alive = *last_heard + timeout > now;
            if !alive {
                warn!(neighbor = %neighbor, "Disconnected from neighbor");
            }
            alive
        });

        let mut events = Vec::new();
        for path in self.routes.values_mut() {
            if path.dest == self.address || path.is_withdrawn() || path.last_update + timeout > now {
                continue;
            }

            path.next_hop = None;
            path.cost = INFINITY;
            path.last_update = now + self.holddown;

            warn!(dest = %path.dest, "Lost the path");
            events.push(RouteEvent::Deleted {
                dest: path.dest,
                cost: INFINITY,
                next_hop: None,
            });
        }
        events.sort_by_key(event_dest);
        events
    }

    fn serialize(&self, now: Instant) -> Vec<Vec<u8>> {
        let header = Triplet::new(self.address.get(), 0, self.address.get());

        let entries: Vec<Triplet> = self
            .routes()
            .into_iter()
            .filter(|path| path.dest != self.address)
            // Withdrawn routes stay advertised until the hold-down clears
            .filter(|path| !(path.is_withdrawn() && path.last_update < now))
            .map(|path| Triplet::new(path.dest.get(), path.cost, NodeAddress::to_wire(path.next_hop)))
            .collect();

        encode_routing_table(header, &entries, self.max_payload)
    }

    /// Apply one routing broadcast heard from a neighbour.
    ///
    /// Every triplet, including the sender's own header, is an announcement.
    /// Errors only for undecodable packets; the table is untouched in that case.
    pub fn handle_packet(&mut self, now: Instant, data: &[u8]) -> Result<Vec<RouteEvent>> {
        let (header, entries) = decode_routing_packet(data)?;
        let neighbor = NodeAddress::new(header.dest)?;

        if neighbor == self.address {
            debug!("Ignoring own routing broadcast");
            return Ok(Vec::new());
        }

        if self.neighbors.insert(neighbor, now).is_none() {
            debug!(neighbor = %neighbor, "New neighbor");
        }

        let events: Vec<RouteEvent> = std::iter::once(header)
            .chain(entries)
            .filter_map(|triplet| self.apply(now, neighbor, triplet))
            .collect();

        self.notify(&events);
        Ok(events)
    }

    fn apply(&mut self, now: Instant, neighbor: NodeAddress, triplet: Triplet) -> Option<RouteEvent> {
        // Never learn a route that goes back through us
        if triplet.next_hop == self.address.get() {
            return None;
        }
        let dest = NodeAddress::from_wire(triplet.dest)?;
        if dest == self.address {
            return None;
        }

        let cost = link_cost(triplet.cost);

        let Some(path) = self.routes.get_mut(&dest) else {
            let next_hop = (cost < INFINITY).then_some(neighbor);
            self.routes.insert(
                dest,
                Path {
                    dest,
                    cost,
                    next_hop,
                    last_update: now,
                },
            );
            if cost < INFINITY {
                info!(dest = %dest, via = %neighbor, cost, "Found new destination");
                return Some(RouteEvent::Added { dest, cost, next_hop: neighbor });
            }
            return None;
        };

        // Hold-down
        if now < path.last_update {
            return None;
        }

        if path.next_hop == Some(neighbor) {
            if cost >= INFINITY {
                path.cost = INFINITY;
                path.next_hop = None;
                path.last_update = now + self.holddown;

                warn!(dest = %dest, via = %neighbor, "Lost the path");
                return Some(RouteEvent::Deleted {
                    dest,
                    cost: INFINITY,
                    next_hop: Some(neighbor),
                });
            }
            path.cost = cost;
            path.last_update = now;
            return None;
        }

        if cost < path.cost {
            let old_cost = path.cost;
            path.cost = cost;
            path.next_hop = Some(neighbor);
            path.last_update = now;

            if old_cost >= INFINITY {
                info!(dest = %dest, via = %neighbor, cost, "Reconnected");
                return Some(RouteEvent::Added { dest, cost, next_hop: neighbor });
            }
            debug!(dest = %dest, via = %neighbor, cost, "Found a shorter path");
            return Some(RouteEvent::Updated { dest, cost, next_hop: neighbor });
        }

        None
    }

    fn notify(&self, events: &[RouteEvent]) {
        if events.is_empty() {
            return;
        }
        self.listeners.notify(|listener| {
            for event in events {
                match *event {
                    RouteEvent::Added { dest, cost, next_hop } => {
                        listener.on_path_added(dest, cost, next_hop)
                    }
                    RouteEvent::Updated { dest, cost, next_hop } => {
                        listener.on_path_updated(dest, cost, next_hop)
                    }
                    RouteEvent::Deleted { dest, cost, next_hop } => {
                        listener.on_path_deleted(dest, cost, next_hop)
                    }
                }
            }
        });
    }
}

/// Advertised cost plus one hop, saturating at [`INFINITY`].
///
/// Raw values above `INFINITY` are corrupt and read as unreachable.
fn link_cost(advertised: u8) -> u8 {
    if advertised >= INFINITY {
        return INFINITY;
    }
    advertised + 1
}

fn event_dest(event: &RouteEvent) -> NodeAddress {
    match *event {
        RouteEvent::Added { dest, .. }
        | RouteEvent::Updated { dest, .. }
        | RouteEvent::Deleted { dest, .. } => dest,
    }
}
