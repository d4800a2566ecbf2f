use crate::core::address::ChannelId;
use crate::protocol::listeners::{ListenerId, ListenerSet};
use std::collections::HashMap;

/// Observer of raw inbound traffic on one logical channel.
pub trait ChannelTap: Send + Sync {
    fn on_packet(&self, channel: ChannelId, data: &[u8]);
}

/// Tagged-channel registry: every channel has its own listener set and dispatch is
/// a direct lookup, never broadcast-then-filter.
///
/// The services own their channels inside the node actor; this registry carries
/// the additional taps applications attach to raw traffic.
#[derive(Clone)]
pub struct Dispatcher {
    taps: HashMap<ChannelId, ListenerSet<dyn ChannelTap>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            taps: ChannelId::ALL
                .into_iter()
                .map(|channel| (channel, ListenerSet::new()))
                .collect(),
        }
    }

    fn set(&self, channel: ChannelId) -> &ListenerSet<dyn ChannelTap> {
        // Built for every ChannelId in `new`
        &self.taps[&channel]
    }

    pub fn register(&self, channel: ChannelId, tap: std::sync::Arc<dyn ChannelTap>) -> ListenerId {
        self.set(channel).add(tap)
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        self.taps.values().any(|set| set.remove(id))
    }

    /// Deliver one physical reception to every tap on `channel`; returns how many saw it.
    pub fn dispatch(&self, channel: ChannelId, data: &[u8]) -> usize {
        self.set(channel).notify(|tap| tap.on_packet(channel, data))
    }

    pub fn tap_count(&self, channel: ChannelId) -> usize {
        self.set(channel).len()
    }
}
