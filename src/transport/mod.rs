//! # Transport Layer
//!
//! The broadcast medium contract and the single-slot outbound scheduler.
//!
//! ## Components
//! - **BroadcastMedium**: advertise/scan primitives of the physical medium
//! - **TransportScheduler**: FIFO multiplexing every channel onto the one advertise slot
//! - **Memory**: in-process medium with a configurable link topology
//!
//! The medium supports exactly one outstanding advertisement per node. Each
//! advertise period the scheduler stops the current one and starts the next queued
//! packet. A packet the medium refuses is logged and lost; the FIFO carries on.

pub mod memory;

use crate::core::address::ChannelId;
use crate::error::{MeshError, Result};
use crate::utils::metrics::Metrics;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

/// Invoked by the medium for every physical reception.
///
/// Called from whatever thread the medium delivers on; implementations only
/// forward into the node actor.
pub type ScanCallback = Arc<dyn Fn(ChannelId, &[u8]) + Send + Sync>;

/// Identifies an active scan so it can be stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanHandle(pub u64);

/// Physical broadcast primitives of one node's radio.
///
/// All calls are fire-and-forget. A refused advertisement is reported through
/// the `Err` return and never retried by the caller.
pub trait BroadcastMedium: Send + Sync {
    fn start_advertising(&self, channel: ChannelId, data: &[u8]) -> Result<()>;

    fn stop_advertising(&self);

    /// Begin delivering receptions to `on_receive`. Fails with
    /// [`MeshError::TransportUnavailable`] when the node has no usable medium.
    fn start_scan(&self, on_receive: ScanCallback) -> Result<ScanHandle>;

    fn stop_scan(&self, handle: ScanHandle);
}

/// A packet waiting for the advertise slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPacket {
    pub channel: ChannelId,
    pub bytes: Bytes,
}

/// Single-slot outbound scheduler plus scan lifecycle.
///
/// Not thread-safe by itself; the node actor owns it and calls [`cycle`](Self::cycle)
/// when [`next_cycle`](Self::next_cycle) is due.
pub struct TransportScheduler {
    medium: Arc<dyn BroadcastMedium>,
    queue: VecDeque<QueuedPacket>,
    /// Channel of the advertisement currently on air
    advertising: Option<ChannelId>,
    next_cycle: Option<Instant>,
    advertise_period: Duration,
    max_payload: usize,
    scan: Option<ScanHandle>,
    on_receive: Option<ScanCallback>,
    metrics: Arc<Metrics>,
}

impl TransportScheduler {
    pub fn new(
        medium: Arc<dyn BroadcastMedium>,
        advertise_period: Duration,
        max_payload: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            medium,
            queue: VecDeque::new(),
            advertising: None,
            next_cycle: None,
            advertise_period,
            max_payload,
            scan: None,
            on_receive: None,
            metrics,
        }
    }

    /// Append to the FIFO; starts a cycle immediately if the slot is idle.
    pub fn enqueue(&mut self, now: Instant, channel: ChannelId, bytes: impl Into<Bytes>) -> Result<()> {
        let bytes = bytes.into();
        if bytes.len() > self.max_payload {
            return Err(MeshError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.max_payload,
            });
        }

        trace!(channel = %channel, len = bytes.len(), queued = self.queue.len(), "Packet enqueued");
        self.queue.push_back(QueuedPacket { channel, bytes });
        Metrics::incr(&self.metrics.packets_enqueued);

        if self.next_cycle.is_none() {
            self.cycle(now);
        }
        Ok(())
    }

    /// Deadline of the next broadcast cycle; `None` while idle.
    pub fn next_cycle(&self) -> Option<Instant> {
        self.next_cycle
    }

    /// Stop the current advertisement and put the next queued packet on air.
    ///
    /// Returns the channel now advertising, if any. With an empty queue the slot
    /// goes idle and no further cycle is scheduled until the next enqueue.
    pub fn cycle(&mut self, now: Instant) -> Option<ChannelId> {
        if self.advertising.take().is_some() {
            self.medium.stop_advertising();
        }

        let Some(packet) = self.queue.pop_front() else {
            self.next_cycle = None;
            return None;
        };

        self.next_cycle = Some(now + self.advertise_period);
        match self.medium.start_advertising(packet.channel, &packet.bytes) {
            Ok(()) => {
                debug!(channel = %packet.channel, len = packet.bytes.len(), "Advertising packet");
                Metrics::incr(&self.metrics.packets_advertised);
                self.advertising = Some(packet.channel);
                Some(packet.channel)
            }
            Err(e) => {
                error!(channel = %packet.channel, error = %e, "Advertising could not start");
                Metrics::incr(&self.metrics.packets_rejected);
                // Nothing on air: an idle slot is free for the next enqueue
                if self.queue.is_empty() {
                    self.next_cycle = None;
                }
                None
            }
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn advertising(&self) -> Option<ChannelId> {
        self.advertising
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_some()
    }

    /// Start the continuous scan. Failure here is fatal for the node.
    pub fn start_scan(&mut self, on_receive: ScanCallback) -> Result<()> {
        if self.scan.is_some() {
            return Ok(());
        }
        let handle = self.medium.start_scan(on_receive.clone())?;
        debug!(handle = handle.0, "Scan started");
        self.scan = Some(handle);
        self.on_receive = Some(on_receive);
        Ok(())
    }

    /// Re-arm the scan.
    ///
    /// On failure the scan stays down until the next renewal succeeds.
    pub fn renew_scan(&mut self) -> Result<()> {
        let Some(on_receive) = self.on_receive.clone() else {
            return Ok(());
        };
        if let Some(handle) = self.scan.take() {
            self.medium.stop_scan(handle);
        }
        let handle = self
            .medium
            .start_scan(on_receive)
            .map_err(|e| MeshError::ScanFailed(e.to_string()))?;
        trace!(handle = handle.0, "Scan renewed");
        self.scan = Some(handle);
        Ok(())
    }

    /// Stop scanning and advertising; queued packets are discarded.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.scan.take() {
            self.medium.stop_scan(handle);
        }
        self.on_receive = None;
        if self.advertising.take().is_some() {
            self.medium.stop_advertising();
        }
        if !self.queue.is_empty() {
            debug!(dropped = self.queue.len(), "Discarding queued packets");
        }
        self.queue.clear();
        self.next_cycle = None;
    }
}
