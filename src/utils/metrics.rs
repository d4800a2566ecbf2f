//! Observability and Metrics
//!
//! Per-node counters for the mesh stack. Every node owns one [`Metrics`] behind an
//! `Arc`; the actor increments it and handles read snapshots.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters for one mesh node
#[derive(Debug)]
pub struct Metrics {
    /// Packets accepted into the outbound FIFO
    pub packets_enqueued: AtomicU64,
    /// Packets the medium accepted for advertising
    pub packets_advertised: AtomicU64,
    /// Packets lost because the medium refused to advertise them
    pub packets_rejected: AtomicU64,
    /// Physical receptions on any channel
    pub packets_received: AtomicU64,
    /// Packets dropped by a decoder
    pub malformed_packets: AtomicU64,
    /// Routing packets processed
    pub routing_updates: AtomicU64,
    pub routes_added: AtomicU64,
    pub routes_updated: AtomicU64,
    pub routes_withdrawn: AtomicU64,
    /// Unicast messages originated here
    pub messages_sent: AtomicU64,
    pub messages_forwarded: AtomicU64,
    pub messages_delivered: AtomicU64,
    /// Messages suppressed by the dedup window
    pub message_duplicates: AtomicU64,
    pub floods_originated: AtomicU64,
    pub floods_relayed: AtomicU64,
    /// Flood packets at or below the cursor
    pub floods_stale: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            packets_enqueued: AtomicU64::new(0),
            packets_advertised: AtomicU64::new(0),
            packets_rejected: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            malformed_packets: AtomicU64::new(0),
            routing_updates: AtomicU64::new(0),
            routes_added: AtomicU64::new(0),
            routes_updated: AtomicU64::new(0),
            routes_withdrawn: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_forwarded: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            message_duplicates: AtomicU64::new(0),
            floods_originated: AtomicU64::new(0),
            floods_relayed: AtomicU64::new(0),
            floods_stale: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            packets_enqueued: load(&self.packets_enqueued),
            packets_advertised: load(&self.packets_advertised),
            packets_rejected: load(&self.packets_rejected),
            packets_received: load(&self.packets_received),
            malformed_packets: load(&self.malformed_packets),
            routing_updates: load(&self.routing_updates),
            routes_added: load(&self.routes_added),
            routes_updated: load(&self.routes_updated),
            routes_withdrawn: load(&self.routes_withdrawn),
            messages_sent: load(&self.messages_sent),
            messages_forwarded: load(&self.messages_forwarded),
            messages_delivered: load(&self.messages_delivered),
            message_duplicates: load(&self.message_duplicates),
            floods_originated: load(&self.floods_originated),
            floods_relayed: load(&self.floods_relayed),
            floods_stale: load(&self.floods_stale),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            packets_enqueued = snapshot.packets_enqueued,
            packets_advertised = snapshot.packets_advertised,
            packets_rejected = snapshot.packets_rejected,
            packets_received = snapshot.packets_received,
            malformed_packets = snapshot.malformed_packets,
            routing_updates = snapshot.routing_updates,
            routes_added = snapshot.routes_added,
            routes_updated = snapshot.routes_updated,
            routes_withdrawn = snapshot.routes_withdrawn,
            messages_sent = snapshot.messages_sent,
            messages_forwarded = snapshot.messages_forwarded,
            messages_delivered = snapshot.messages_delivered,
            message_duplicates = snapshot.message_duplicates,
            floods_originated = snapshot.floods_originated,
            floods_relayed = snapshot.floods_relayed,
            floods_stale = snapshot.floods_stale,
            uptime_seconds = snapshot.uptime_seconds,
            "Mesh metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_enqueued: u64,
    pub packets_advertised: u64,
    pub packets_rejected: u64,
    pub packets_received: u64,
    pub malformed_packets: u64,
    pub routing_updates: u64,
    pub routes_added: u64,
    pub routes_updated: u64,
    pub routes_withdrawn: u64,
    pub messages_sent: u64,
    pub messages_forwarded: u64,
    pub messages_delivered: u64,
    pub message_duplicates: u64,
    pub floods_originated: u64,
    pub floods_relayed: u64,
    pub floods_stale: u64,
    pub uptime_seconds: u64,
}
