//! # Mesh Services
//!
//! The three protocol services a node runs, one per logical channel.
//!
//! ## Components
//! - **Routing**: distance-vector table, neighbour liveness, withdrawal and hold-down
//! - **Message**: hop-by-hop unicast with duplicate suppression
//! - **Propagation**: network-wide flooding ordered by a wrapping sequence id
//!
//! All three are plain state machines. They take the current time as an argument
//! and return the packets to broadcast; the node actor owns them and performs the
//! I/O. Listener callbacks run after the state change is complete.

pub mod message;
pub mod propagation;
pub mod routing;

pub use message::{MessageListener, MessageOutcome, MessageService, SendOutcome};
pub use propagation::{FloodOutcome, PropagationListener, PropagationService};
pub use routing::{NeighborRecord, Path, RouteEvent, RoutingListener, RoutingService, RoutingTick};
