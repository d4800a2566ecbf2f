//! # Protocol Plumbing
//!
//! Listener bookkeeping shared by the services, and the per-channel dispatcher for
//! raw inbound taps.

pub mod dispatcher;
pub mod listeners;

pub use dispatcher::{ChannelTap, Dispatcher};
pub use listeners::{ListenerId, ListenerSet};
