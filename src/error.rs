//! # Error Types
//!
//! Error handling for the mesh stack.
//!
//! ## Error Categories
//! - **Transport faults**: the broadcast medium refused to advertise or scan
//! - **Malformed packets**: truncated headers, empty flood packets, ragged triplets
//! - **Caller errors**: oversized payloads, reserved addresses
//! - **Configuration errors**: invalid settings or an unavailable transport (fatal at startup)
//!
//! Only configuration errors ever stop a node from starting. Everything that happens
//! per packet is logged and dropped inside the node actor; the variants below surface
//! from the codec functions and the public [`NodeHandle`](crate::node::NodeHandle) API.
//!
//! ## Example Usage
//! ```rust
//! use adhoc_mesh::core::packet::MessageHeader;
//! use adhoc_mesh::error::MeshError;
//!
//! match MessageHeader::decode(&[1, 2]) {
//!     Err(MeshError::MalformedPacket(reason)) => tracing::warn!(reason, "dropping packet"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Packet validation errors
    pub const ERR_EMPTY_PACKET: &str = "Packet is empty";
    pub const ERR_TRUNCATED_HEADER: &str = "Packet shorter than its fixed header";
    pub const ERR_RAGGED_TRIPLETS: &str = "Routing packet length is not a multiple of 3";
    pub const ERR_MISSING_ROUTING_HEADER: &str = "Routing packet carries no sender triplet";
}

/// Primary error type for all mesh operations
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Advertise rejected: {0}")]
    AdvertiseRejected(String),

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("Payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Invalid node address: {0}")]
    InvalidAddress(u8),

    #[error("Mesh node stopped")]
    NodeStopped,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Type alias for Results using MeshError
pub type Result<T> = std::result::Result<T, MeshError>;
