//! In-process broadcast medium.
//!
//! Every node gets a [`MemoryPort`] onto one shared [`MemoryMedium`]. Links are
//! symmetric and can be brought up or down at any time; an advertisement is heard
//! once by every scanning node linked to the advertiser at the moment it starts.
//!
//! Faults can be injected per node: refused advertisements and an unavailable
//! radio (scan start fails).

use crate::core::address::{ChannelId, NodeAddress};
use crate::error::{MeshError, Result};
use crate::transport::{BroadcastMedium, ScanCallback, ScanHandle};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

#[derive(Default)]
struct MediumState {
    links: HashSet<(NodeAddress, NodeAddress)>,
    scanners: HashMap<ScanHandle, (NodeAddress, ScanCallback)>,
    on_air: HashMap<NodeAddress, (ChannelId, Bytes)>,
    rejecting: HashSet<NodeAddress>,
    unavailable: HashSet<NodeAddress>,
    next_handle: u64,
    delivered: u64,
}

fn link_key(a: NodeAddress, b: NodeAddress) -> (NodeAddress, NodeAddress) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Shared medium; clones refer to the same topology.
#[derive(Clone, Default)]
pub struct MemoryMedium {
    state: Arc<Mutex<MediumState>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Medium with links between consecutive addresses: `a - b - c ...`
    pub fn line(addresses: &[NodeAddress]) -> Self {
        let medium = Self::new();
        for pair in addresses.windows(2) {
            medium.link(pair[0], pair[1]);
        }
        medium
    }

    fn lock(&self) -> MutexGuard<'_, MediumState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Radio of `node` on this medium.
    pub fn port(&self, node: NodeAddress) -> Arc<MemoryPort> {
        Arc::new(MemoryPort {
            node,
            medium: self.clone(),
        })
    }

    pub fn link(&self, a: NodeAddress, b: NodeAddress) {
        if a != b {
            self.lock().links.insert(link_key(a, b));
        }
    }

    pub fn unlink(&self, a: NodeAddress, b: NodeAddress) {
        self.lock().links.remove(&link_key(a, b));
    }

    /// Cut every link of `node`.
    pub fn isolate(&self, node: NodeAddress) {
        self.lock().links.retain(|&(a, b)| a != node && b != node);
    }

    pub fn is_linked(&self, a: NodeAddress, b: NodeAddress) -> bool {
        self.lock().links.contains(&link_key(a, b))
    }

    /// Make `node`'s advertise requests fail (or succeed again).
    pub fn set_rejecting(&self, node: NodeAddress, rejecting: bool) {
        let mut state = self.lock();
        if rejecting {
            state.rejecting.insert(node);
        } else {
            state.rejecting.remove(&node);
        }
    }

    /// Make `node` look like it has no usable radio.
    pub fn set_unavailable(&self, node: NodeAddress, unavailable: bool) {
        let mut state = self.lock();
        if unavailable {
            state.unavailable.insert(node);
        } else {
            state.unavailable.remove(&node);
        }
    }

    /// What `node` is currently advertising.
    pub fn on_air(&self, node: NodeAddress) -> Option<(ChannelId, Bytes)> {
        self.lock().on_air.get(&node).cloned()
    }

    /// Receptions delivered so far, across all nodes.
    pub fn delivered(&self) -> u64 {
        self.lock().delivered
    }

    fn advertise(&self, node: NodeAddress, channel: ChannelId, data: &[u8]) -> Result<()> {
        let receivers: Vec<ScanCallback> = {
            let mut state = self.lock();
            if state.rejecting.contains(&node) {
                return Err(MeshError::AdvertiseRejected(format!("node {node} refused to advertise")));
            }
            state.on_air.insert(node, (channel, Bytes::copy_from_slice(data)));

            let receivers: Vec<ScanCallback> = state
                .scanners
                .values()
                .filter(|(listener, _)| *listener != node && state.links.contains(&link_key(node, *listener)))
                .map(|(_, callback)| callback.clone())
                .collect();
            state.delivered += receivers.len() as u64;
            receivers
        };

        trace!(node = %node, channel = %channel, receivers = receivers.len(), "Broadcast on memory medium");
        // Lock released: callbacks may touch the medium
        for callback in receivers {
            callback(channel, data);
        }
        Ok(())
    }
}

/// One node's view of a [`MemoryMedium`]
pub struct MemoryPort {
    node: NodeAddress,
    medium: MemoryMedium,
}

impl MemoryPort {
    pub fn node(&self) -> NodeAddress {
        self.node
    }
}

impl BroadcastMedium for MemoryPort {
    fn start_advertising(&self, channel: ChannelId, data: &[u8]) -> Result<()> {
        self.medium.advertise(self.node, channel, data)
    }

    fn stop_advertising(&self) {
        self.medium.lock().on_air.remove(&self.node);
    }

    fn start_scan(&self, on_receive: ScanCallback) -> Result<ScanHandle> {
        let mut state = self.medium.lock();
        if state.unavailable.contains(&self.node) {
            return Err(MeshError::TransportUnavailable(format!(
                "no radio for node {}",
                self.node
            )));
        }
        state.next_handle += 1;
        let handle = ScanHandle(state.next_handle);
        state.scanners.insert(handle, (self.node, on_receive));
        Ok(handle)
    }

    fn stop_scan(&self, handle: ScanHandle) {
        self.medium.lock().scanners.remove(&handle);
    }
}
