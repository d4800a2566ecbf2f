//! Node addresses, logical channels and the route cost ceiling.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MeshError, Result};

/// Largest meaningful route cost. A route at this cost is withdrawn.
pub const INFINITY: u8 = 127;

/// Single-byte node identifier.
///
/// `0xFF` (`-1` as a signed byte) is reserved as the "no route / unknown" sentinel
/// on the wire and can never be assigned to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAddress(u8);

impl NodeAddress {
    /// Wire value meaning "no next hop".
    pub const SENTINEL_BYTE: u8 = 0xFF;

    /// Build an address, rejecting the reserved sentinel.
    pub fn new(raw: u8) -> Result<Self> {
        if raw == Self::SENTINEL_BYTE {
            return Err(MeshError::InvalidAddress(raw));
        }
        Ok(Self(raw))
    }

    /// Interpret a wire byte; the sentinel decodes to `None`.
    #[inline]
    pub fn from_wire(raw: u8) -> Option<Self> {
        (raw != Self::SENTINEL_BYTE).then_some(Self(raw))
    }

    /// Encode an optional address; `None` becomes the sentinel.
    #[inline]
    pub fn to_wire(addr: Option<Self>) -> u8 {
        addr.map_or(Self::SENTINEL_BYTE, |a| a.0)
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for NodeAddress {
    type Error = MeshError;

    fn try_from(raw: u8) -> Result<Self> {
        Self::new(raw)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical channel a packet travels on. Each service owns exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    /// Distance-vector table broadcasts
    Routing,
    /// Hop-by-hop unicast messages
    Message,
    /// Network-wide floods
    Propagation,
}

impl ChannelId {
    pub const ALL: [ChannelId; 3] = [ChannelId::Routing, ChannelId::Message, ChannelId::Propagation];

    pub fn name(self) -> &'static str {
        match self {
            ChannelId::Routing => "routing",
            ChannelId::Message => "message",
            ChannelId::Propagation => "propagation",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
