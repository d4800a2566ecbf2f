//! # Adhoc Mesh
//!
//! Distance-vector mesh routing over a single-slot broadcast medium.
//!
//! Nodes are identified by one byte. Each node periodically broadcasts its route
//! table, tracks which neighbours it hears, and relays unicast messages and flooded
//! events across hops no single radio link reaches. Every outbound packet goes
//! through one advertise slot, one packet per advertise period.
//!
//! ## Layers
//! - [`core`]: addresses, bit packing, the three wire layouts
//! - [`transport`]: broadcast medium contract, advertise-slot scheduler, in-memory medium
//! - [`service`]: routing, message forwarding and flood propagation state machines
//! - [`protocol`]: listener registries and raw channel taps
//! - [`node`]: the per-node actor and its [`NodeHandle`](node::NodeHandle)
//!
//! ## Quick start
//! ```rust,no_run
//! use adhoc_mesh::{MemoryMedium, MeshConfig, MeshNode, NodeAddress};
//!
//! #[tokio::main]
//! async fn main() -> adhoc_mesh::Result<()> {
//!     let (a, b) = (NodeAddress::new(1)?, NodeAddress::new(2)?);
//!     let medium = MemoryMedium::line(&[a, b]);
//!
//!     let node_a = MeshNode::spawn(MeshConfig::for_address(1), medium.port(a))?;
//!     let _node_b = MeshNode::spawn(MeshConfig::for_address(2), medium.port(b))?;
//!
//!     node_a.send(b, b"hi".to_vec())?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod node;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::MeshConfig;
pub use crate::core::address::{ChannelId, NodeAddress, INFINITY};
pub use crate::error::{MeshError, Result};
pub use crate::node::{MeshNode, NodeHandle};
pub use crate::service::{MessageListener, PropagationListener, RouteEvent, RoutingListener};
pub use crate::transport::memory::MemoryMedium;
pub use crate::transport::BroadcastMedium;
