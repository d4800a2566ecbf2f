//! # Core Protocol Components
//!
//! Addresses, bit-level codec helpers and the fixed wire layouts shared by every service.
//!
//! ## Components
//! - **Address**: single-byte node addresses, logical channel ids, the cost ceiling
//! - **Bits**: unequal-width bit packing into 32-bit words, word/byte conversion
//! - **Packet**: routing triplets (with fragmentation), message header, flood packet
//!
//! ## Wire Format
//! ```text
//! routing:     [dest:1][cost:1][nextHop:1] x N
//! message:     [nextHop:1][source:1][dest:1][id:1][payload:N]
//! propagation: [id:1][payload:N]
//! ```
//!
//! Payloads are bounded by the broadcast medium (tens of bytes), so nothing here
//! ever assumes more than the configured payload limit.

pub mod address;
pub mod bits;
pub mod packet;

pub use address::{ChannelId, NodeAddress, INFINITY};
