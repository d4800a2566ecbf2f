//! # Mesh Node
//!
//! One tokio task per node owns every service and the transport scheduler. Inbound
//! receptions, handle commands and the three timers (routing tick, advertise cycle,
//! scan renewal) are serialized through a single `select!` loop, so no two of them
//! ever touch the route table or the FIFO at the same time.
//!
//! ```text
//!   medium scan ──┐
//!                 ├──> mpsc ──> NodeActor ──> TransportScheduler ──> medium advertise
//!   NodeHandle ───┘                │
//!                                  └──> listeners (routing / message / propagation / taps)
//! ```
//!
//! Listener sets are shared with every [`NodeHandle`], so registration is immediate
//! and safe from inside a callback. Callbacks run on the actor task once the state
//! change is complete; a send issued from a callback is just another queued command.
//!
//! ## Example
//! ```rust,no_run
//! use adhoc_mesh::config::MeshConfig;
//! use adhoc_mesh::core::NodeAddress;
//! use adhoc_mesh::node::MeshNode;
//! use adhoc_mesh::transport::memory::MemoryMedium;
//!
//! # async fn run() -> adhoc_mesh::error::Result<()> {
//! let medium = MemoryMedium::line(&[NodeAddress::new(1)?, NodeAddress::new(2)?]);
//! let a = MeshNode::spawn(MeshConfig::for_address(1), medium.port(NodeAddress::new(1)?))?;
//! let _b = MeshNode::spawn(MeshConfig::for_address(2), medium.port(NodeAddress::new(2)?))?;
//!
//! a.send(NodeAddress::new(2)?, b"hello".to_vec())?;
//! # Ok(())
//! # }
//! ```

use crate::config::MeshConfig;
use crate::core::address::{ChannelId, NodeAddress};
use crate::error::{MeshError, Result};
use crate::protocol::dispatcher::{ChannelTap, Dispatcher};
use crate::protocol::listeners::{ListenerId, ListenerSet};
use crate::service::message::{MessageListener, MessageOutcome, MessageService, SendOutcome};
use crate::service::propagation::{FloodOutcome, PropagationListener, PropagationService};
use crate::service::routing::{NeighborRecord, Path, RouteEvent, RoutingListener, RoutingService};
use crate::transport::{BroadcastMedium, ScanCallback, TransportScheduler};
use crate::utils::metrics::{Metrics, MetricsSnapshot};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Current time on the tokio clock, so paused-time tests drive every timeout.
fn now() -> std::time::Instant {
    time::Instant::now().into_std()
}

enum Command {
    Send { dest: NodeAddress, payload: Bytes },
    Flood { payload: Bytes, reply: oneshot::Sender<Result<i8>> },
    NextHop { dest: NodeAddress, reply: oneshot::Sender<Option<NodeAddress>> },
    Routes { reply: oneshot::Sender<Vec<Path>> },
    Neighbors { reply: oneshot::Sender<Vec<NeighborRecord>> },
    StartRouting { reply: oneshot::Sender<()> },
    StopRouting { reply: oneshot::Sender<()> },
    StartScan { reply: oneshot::Sender<Result<()>> },
}

enum NodeEvent {
    Received { channel: ChannelId, data: Bytes },
    Command(Command),
}

/// Entry point for running a node
pub struct MeshNode;

impl MeshNode {
    /// Validate `config`, start scanning and spawn the node actor.
    ///
    /// Must be called from within a tokio runtime. A medium that cannot scan is a
    /// fatal configuration error.
    pub fn spawn(config: MeshConfig, medium: Arc<dyn BroadcastMedium>) -> Result<NodeHandle> {
        config.validate_strict()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MeshError::ConfigError(format!("no tokio runtime: {e}")))?;

        let address = config.node.node_address()?;
        let started = now();
        let max_payload = config.transport.max_payload_size;
        let metrics = Arc::new(Metrics::new());

        let mut routing = RoutingService::new(address, &config.routing, max_payload, started);
        if config.routing.start_on_spawn {
            routing.start();
        }
        let messages = MessageService::new(
            address,
            max_payload,
            config.transport.dedup_window(),
            config.transport.dedup_capacity,
        );
        let propagation = PropagationService::new(max_payload);
        let dispatcher = Dispatcher::new();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut scheduler = TransportScheduler::new(
            medium,
            config.transport.advertise_period,
            max_payload,
            metrics.clone(),
        );
        let on_receive = scan_callback(&events_tx);
        if config.node.scan_on_start {
            scheduler.start_scan(on_receive.clone()).map_err(|e| match e {
                MeshError::TransportUnavailable(_) => e,
                other => MeshError::TransportUnavailable(other.to_string()),
            })?;
        }

        let shutdown = CancellationToken::new();
        let stopped = CancellationToken::new();

        let handle = NodeHandle {
            address,
            events: events_tx,
            routing_listeners: routing.listeners().clone(),
            message_listeners: messages.listeners().clone(),
            propagation_listeners: propagation.listeners().clone(),
            dispatcher: dispatcher.clone(),
            metrics: metrics.clone(),
            max_message_payload: messages.max_message_payload(),
            shutdown: shutdown.clone(),
            stopped: stopped.clone(),
        };

        let actor = NodeActor {
            address,
            routing,
            messages,
            propagation,
            scheduler,
            dispatcher,
            metrics,
            events: events_rx,
            on_receive,
            broadcast_interval: config.routing.broadcast_interval,
            scan_renewal_period: config.transport.scan_renewal_period,
        };
        runtime.spawn(actor.run(shutdown, stopped));

        info!(node = %address, "Mesh node started");
        Ok(handle)
    }
}

/// Forwards receptions into the actor without keeping it alive.
fn scan_callback(events: &mpsc::UnboundedSender<NodeEvent>) -> ScanCallback {
    let events = events.downgrade();
    Arc::new(move |channel: ChannelId, data: &[u8]| {
        if let Some(events) = events.upgrade() {
            let _ = events.send(NodeEvent::Received {
                channel,
                data: Bytes::copy_from_slice(data),
            });
        }
    })
}

struct NodeActor {
    address: NodeAddress,
    routing: RoutingService,
    messages: MessageService,
    propagation: PropagationService,
    scheduler: TransportScheduler,
    dispatcher: Dispatcher,
    metrics: Arc<Metrics>,
    events: mpsc::UnboundedReceiver<NodeEvent>,
    on_receive: ScanCallback,
    broadcast_interval: Duration,
    scan_renewal_period: Duration,
}

async fn advertise_deadline(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

impl NodeActor {
    #[instrument(name = "mesh_node", skip_all, fields(node = %self.address))]
    async fn run(mut self, shutdown: CancellationToken, stopped: CancellationToken) {
        // Cancelled however the task ends, including a panicking listener
        let _stopped = stopped.drop_guard();
        let start = time::Instant::now();
        let mut routing_tick = time::interval_at(start + self.broadcast_interval, self.broadcast_interval);
        routing_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut scan_renewal = time::interval_at(start + self.scan_renewal_period, self.scan_renewal_period);
        scan_renewal.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.scheduler.next_cycle();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.events.recv() => {
                    let Some(event) = event else {
                        debug!("All handles dropped");
                        break;
                    };
                    match event {
                        NodeEvent::Received { channel, data } => self.on_reception(channel, &data),
                        NodeEvent::Command(command) => self.on_command(command),
                    }
                }
                _ = routing_tick.tick() => self.on_routing_tick(),
                _ = advertise_deadline(deadline) => {
                    self.scheduler.cycle(now());
                }
                _ = scan_renewal.tick() => {
                    if let Err(e) = self.scheduler.renew_scan() {
                        warn!(error = %e, "Scan renewal failed, retrying next period");
                    }
                }
            }
        }

        self.events.close();
        self.scheduler.shutdown();
        self.metrics.log_metrics();
        info!("Mesh node stopped");
    }

    fn enqueue(&mut self, channel: ChannelId, packet: Vec<u8>) {
        if let Err(e) = self.scheduler.enqueue(now(), channel, packet) {
            warn!(channel = %channel, error = %e, "Dropping outbound packet");
        }
    }

    fn on_routing_tick(&mut self) {
        let tick = self.routing.tick(now());
        self.count_route_events(&tick.events);
        for packet in tick.packets {
            self.enqueue(ChannelId::Routing, packet);
        }
    }

    fn count_route_events(&self, events: &[RouteEvent]) {
        for event in events {
            let counter = match event {
                RouteEvent::Added { .. } => &self.metrics.routes_added,
                RouteEvent::Updated { .. } => &self.metrics.routes_updated,
                RouteEvent::Deleted { .. } => &self.metrics.routes_withdrawn,
            };
            Metrics::incr(counter);
        }
    }

    fn malformed(&self, channel: ChannelId, error: MeshError) {
        Metrics::incr(&self.metrics.malformed_packets);
        debug!(channel = %channel, error = %error, "Dropping malformed packet");
    }

    fn on_reception(&mut self, channel: ChannelId, data: &[u8]) {
        Metrics::incr(&self.metrics.packets_received);
        self.dispatcher.dispatch(channel, data);

        let now = now();
        match channel {
            ChannelId::Routing => match self.routing.handle_packet(now, data) {
                Ok(events) => {
                    Metrics::incr(&self.metrics.routing_updates);
                    self.count_route_events(&events);
                }
                Err(e) => self.malformed(channel, e),
            },
            ChannelId::Message => match self.messages.handle(now, data, &self.routing) {
                Ok(MessageOutcome::Forward { packet, .. }) => {
                    Metrics::incr(&self.metrics.messages_forwarded);
                    self.enqueue(ChannelId::Message, packet);
                }
                Ok(MessageOutcome::Delivered { .. }) => Metrics::incr(&self.metrics.messages_delivered),
                Ok(MessageOutcome::Duplicate) => Metrics::incr(&self.metrics.message_duplicates),
                Ok(MessageOutcome::NotForUs) => {}
                Err(e) => self.malformed(channel, e),
            },
            ChannelId::Propagation => match self.propagation.handle(data) {
                Ok(FloodOutcome::Relay { packet, .. }) => {
                    Metrics::incr(&self.metrics.floods_relayed);
                    self.enqueue(ChannelId::Propagation, packet);
                }
                Ok(FloodOutcome::Stale { .. }) => Metrics::incr(&self.metrics.floods_stale),
                Err(e) => self.malformed(channel, e),
            },
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Send { dest, payload } => match self.messages.send(dest, &payload, &self.routing) {
                Ok(SendOutcome::Enqueue(packet)) => {
                    Metrics::incr(&self.metrics.messages_sent);
                    self.enqueue(ChannelId::Message, packet);
                }
                Ok(SendOutcome::DeliveredLocally) => {
                    Metrics::incr(&self.metrics.messages_sent);
                    Metrics::incr(&self.metrics.messages_delivered);
                }
                Err(e) => warn!(dest = %dest, error = %e, "Send failed"),
            },
            Command::Flood { payload, reply } => {
                let result = match self.propagation.flood(&payload) {
                    Ok((id, packet)) => {
                        Metrics::incr(&self.metrics.floods_originated);
                        self.enqueue(ChannelId::Propagation, packet);
                        Ok(id)
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::NextHop { dest, reply } => {
                let _ = reply.send(self.routing.next_hop(dest));
            }
            Command::Routes { reply } => {
                let _ = reply.send(self.routing.routes());
            }
            Command::Neighbors { reply } => {
                let _ = reply.send(self.routing.neighbors());
            }
            Command::StartRouting { reply } => {
                self.routing.start();
                let _ = reply.send(());
            }
            Command::StopRouting { reply } => {
                self.routing.stop();
                let _ = reply.send(());
            }
            Command::StartScan { reply } => {
                let result = self.scheduler.start_scan(self.on_receive.clone());
                if let Err(e) = &result {
                    error!(error = %e, "Scan could not start");
                }
                let _ = reply.send(result);
            }
        }
    }
}

/// Cloneable handle to a running node.
///
/// Every method fails with [`MeshError::NodeStopped`] once the actor has exited.
#[derive(Clone)]
pub struct NodeHandle {
    address: NodeAddress,
    events: mpsc::UnboundedSender<NodeEvent>,
    routing_listeners: ListenerSet<dyn RoutingListener>,
    message_listeners: ListenerSet<dyn MessageListener>,
    propagation_listeners: ListenerSet<dyn PropagationListener>,
    dispatcher: Dispatcher,
    metrics: Arc<Metrics>,
    max_message_payload: usize,
    shutdown: CancellationToken,
    stopped: CancellationToken,
}

impl NodeHandle {
    pub fn address(&self) -> NodeAddress {
        self.address
    }

    fn command(&self, command: Command) -> Result<()> {
        self.events
            .send(NodeEvent::Command(command))
            .map_err(|_| MeshError::NodeStopped)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.command(build(reply))?;
        response.await.map_err(|_| MeshError::NodeStopped)
    }

    /// Queue a unicast message. Best effort: no acknowledgement, no retry.
    ///
    /// Does not wait for the actor, so it is safe to call from a listener callback.
    pub fn send(&self, dest: NodeAddress, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        if payload.len() > self.max_message_payload {
            return Err(MeshError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_message_payload,
            });
        }
        self.command(Command::Send { dest, payload })
    }

    /// Originate a network-wide flood; returns its sequence id.
    pub async fn flood(&self, payload: impl Into<Bytes>) -> Result<i8> {
        let payload = payload.into();
        self.request(|reply| Command::Flood { payload, reply }).await?
    }

    /// Next hop towards `dest`; `None` if unknown or withdrawn.
    pub async fn next_hop(&self, dest: NodeAddress) -> Result<Option<NodeAddress>> {
        self.request(|reply| Command::NextHop { dest, reply }).await
    }

    /// Snapshot of the route table, sorted by destination.
    pub async fn routes(&self) -> Result<Vec<Path>> {
        self.request(|reply| Command::Routes { reply }).await
    }

    pub async fn neighbors(&self) -> Result<Vec<NeighborRecord>> {
        self.request(|reply| Command::Neighbors { reply }).await
    }

    pub async fn start_routing(&self) -> Result<()> {
        self.request(|reply| Command::StartRouting { reply }).await
    }

    /// Stop periodic routing broadcasts; they resume only after [`start_routing`](Self::start_routing).
    pub async fn stop_routing(&self) -> Result<()> {
        self.request(|reply| Command::StopRouting { reply }).await
    }

    /// Start scanning when the node was spawned with `scan_on_start = false`.
    pub async fn start_scan(&self) -> Result<()> {
        self.request(|reply| Command::StartScan { reply }).await?
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop the actor and wait until it has released the medium.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.stopped.cancelled().await;
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.is_cancelled()
    }

    pub fn add_routing_listener(&self, listener: Arc<dyn RoutingListener>) -> ListenerId {
        self.routing_listeners.add(listener)
    }

    pub fn remove_routing_listener(&self, id: ListenerId) -> bool {
        self.routing_listeners.remove(id)
    }

    pub fn add_message_listener(&self, listener: Arc<dyn MessageListener>) -> ListenerId {
        self.message_listeners.add(listener)
    }

    pub fn remove_message_listener(&self, id: ListenerId) -> bool {
        self.message_listeners.remove(id)
    }

    pub fn add_propagation_listener(&self, listener: Arc<dyn PropagationListener>) -> ListenerId {
        self.propagation_listeners.add(listener)
    }

    pub fn remove_propagation_listener(&self, id: ListenerId) -> bool {
        self.propagation_listeners.remove(id)
    }

    /// Observe raw receptions on `channel` before the owning service processes them.
    pub fn add_tap(&self, channel: ChannelId, tap: Arc<dyn ChannelTap>) -> ListenerId {
        self.dispatcher.register(channel, tap)
    }

    pub fn remove_tap(&self, id: ListenerId) -> bool {
        self.dispatcher.unregister(id)
    }

    /// Largest payload [`send`](Self::send) accepts.
    pub fn max_message_payload(&self) -> usize {
        self.max_message_payload
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("address", &self.address)
            .field("running", &self.is_running())
            .finish()
    }
}
