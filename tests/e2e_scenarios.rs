//! End-to-end scenarios over the in-memory medium.
//!
//! Every test runs on paused tokio time, so the protocol timers (3 s routing
//! broadcasts, 7 s route timeout, 1 s advertise slot) elapse instantly and
//! deterministically.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use adhoc_mesh::protocol::dispatcher::ChannelTap;
use adhoc_mesh::protocol::listeners::ListenerId;
use adhoc_mesh::{
    ChannelId, MemoryMedium, MeshConfig, MeshNode, MessageListener, NodeAddress, NodeHandle,
    PropagationListener, RoutingListener, INFINITY,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

fn addr(raw: u8) -> NodeAddress {
    NodeAddress::new(raw).unwrap()
}

fn spawn(medium: &MemoryMedium, raw: u8) -> NodeHandle {
    MeshNode::spawn(MeshConfig::for_address(raw), medium.port(addr(raw))).unwrap()
}

/// A - B - C
fn line() -> (MemoryMedium, NodeHandle, NodeHandle, NodeHandle) {
    let medium = MemoryMedium::line(&[addr(1), addr(2), addr(3)]);
    let a = spawn(&medium, 1);
    let b = spawn(&medium, 2);
    let c = spawn(&medium, 3);
    (medium, a, b, c)
}

async fn wait_for_next_hop(node: &NodeHandle, dest: u8, expected: Option<u8>, limit: Duration) -> bool {
    let step = Duration::from_millis(250);
    let mut waited = Duration::ZERO;
    while waited <= limit {
        if node.next_hop(addr(dest)).await.unwrap().map(NodeAddress::get) == expected {
            return true;
        }
        sleep(step).await;
        waited += step;
    }
    false
}

struct Inbox(mpsc::UnboundedSender<(u8, Vec<u8>)>);

impl MessageListener for Inbox {
    fn on_message_received(&self, source: NodeAddress, payload: &[u8]) {
        let _ = self.0.send((source.get(), payload.to_vec()));
    }
}

fn inbox(node: &NodeHandle) -> mpsc::UnboundedReceiver<(u8, Vec<u8>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    node.add_message_listener(Arc::new(Inbox(tx)));
    rx
}

#[derive(Default)]
struct Forwards(Mutex<Vec<(u8, Option<u8>)>>);

impl MessageListener for Forwards {
    fn on_message_forward(&self, source: NodeAddress, next_hop: Option<NodeAddress>) {
        self.0
            .lock()
            .unwrap()
            .push((source.get(), next_hop.map(NodeAddress::get)));
    }
}

#[derive(Default)]
struct RouteLog {
    added: Mutex<Vec<(u8, u8, u8)>>,
    deleted: Mutex<Vec<u8>>,
}

impl RoutingListener for RouteLog {
    fn on_path_added(&self, dest: NodeAddress, cost: u8, next_hop: NodeAddress) {
        self.added
            .lock()
            .unwrap()
            .push((dest.get(), cost, next_hop.get()));
    }

    fn on_path_deleted(&self, dest: NodeAddress, _cost: u8, _next_hop: Option<NodeAddress>) {
        self.deleted.lock().unwrap().push(dest.get());
    }
}

impl RouteLog {
    fn deletions_of(&self, dest: u8) -> usize {
        self.deleted.lock().unwrap().iter().filter(|&&d| d == dest).count()
    }

    fn additions_of(&self, dest: u8) -> usize {
        self.added.lock().unwrap().iter().filter(|e| e.0 == dest).count()
    }
}

#[tokio::test(start_paused = true)]
async fn line_topology_learns_two_hop_route() {
    let (_medium, a, b, c) = line();

    // Three routing ticks
    sleep(Duration::from_millis(9_500)).await;

    let routes = a.routes().await.unwrap();
    let to_c = routes.iter().find(|p| p.dest == addr(3)).expect("route to C");
    assert_eq!(to_c.cost, 2);
    assert_eq!(to_c.next_hop, Some(addr(2)));
    assert_eq!(a.next_hop(addr(2)).await.unwrap(), Some(addr(2)));

    let to_self = routes.iter().find(|p| p.dest == addr(1)).unwrap();
    assert_eq!((to_self.cost, to_self.next_hop), (0, Some(addr(1))));

    let b_neighbors: Vec<u8> = b
        .neighbors()
        .await
        .unwrap()
        .iter()
        .map(|n| n.neighbor.get())
        .collect();
    assert_eq!(b_neighbors, vec![1, 3]);

    assert_eq!(c.next_hop(addr(1)).await.unwrap(), Some(addr(2)));
}

#[tokio::test(start_paused = true)]
async fn message_is_relayed_across_two_hops() {
    let (_medium, a, b, c) = line();
    let forwards = Arc::new(Forwards::default());
    b.add_message_listener(forwards.clone());
    let mut at_c = inbox(&c);
    let mut at_b = inbox(&b);

    assert!(wait_for_next_hop(&a, 3, Some(2), Duration::from_secs(15)).await);
    a.send(addr(3), b"hi".to_vec()).unwrap();

    let (source, payload) = timeout(Duration::from_secs(10), at_c.recv())
        .await
        .expect("C should receive the message")
        .unwrap();
    assert_eq!(source, 1);
    assert_eq!(payload, b"hi");

    assert_eq!(*forwards.0.lock().unwrap(), vec![(1, Some(3))]);
    assert!(at_b.try_recv().is_err(), "relay must not deliver locally");

    // Give any stray re-advertisement time to arrive; still exactly one delivery
    sleep(Duration::from_secs(5)).await;
    assert!(at_c.try_recv().is_err());

    assert_eq!(a.metrics().messages_sent, 1);
    assert_eq!(b.metrics().messages_forwarded, 1);
    assert_eq!(c.metrics().messages_delivered, 1);
}

#[tokio::test(start_paused = true)]
async fn silent_relay_withdraws_route_then_recovers_after_hold_down() {
    let (medium, a, _b, _c) = line();
    let log = Arc::new(RouteLog::default());
    a.add_routing_listener(log.clone());

    assert!(wait_for_next_hop(&a, 3, Some(2), Duration::from_secs(15)).await);

    // B goes silent
    medium.isolate(addr(2));
    assert!(
        wait_for_next_hop(&a, 3, None, Duration::from_secs(30)).await,
        "route to C should be withdrawn"
    );

    let to_c = a
        .routes()
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.dest == addr(3))
        .expect("withdrawn routes are kept");
    assert_eq!(to_c.cost, INFINITY);
    assert_eq!(to_c.next_hop, None);
    assert_eq!(log.deletions_of(3), 1);

    // B is back, but the hold-down keeps the route down for a while
    medium.link(addr(1), addr(2));
    medium.link(addr(2), addr(3));
    for _ in 0..16 {
        assert_eq!(a.next_hop(addr(3)).await.unwrap(), None);
        sleep(Duration::from_millis(500)).await;
    }

    assert!(
        wait_for_next_hop(&a, 3, Some(2), Duration::from_secs(40)).await,
        "route to C should recover"
    );
    assert_eq!(log.deletions_of(3), 1, "path-deleted fires exactly once");
    assert_eq!(log.additions_of(3), 2, "initial discovery plus reconnection");
    assert_eq!(a.routes().await.unwrap().iter().find(|p| p.dest == addr(3)).unwrap().cost, 2);
}

struct FloodSink(mpsc::UnboundedSender<(i8, Vec<u8>)>);

impl PropagationListener for FloodSink {
    fn on_flood(&self, id: i8, payload: &[u8]) {
        let _ = self.0.send((id, payload.to_vec()));
    }
}

#[tokio::test(start_paused = true)]
async fn flood_reaches_every_node_once() {
    let (_medium, a, b, c) = line();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let (tx_c, mut rx_c) = mpsc::unbounded_channel();
    b.add_propagation_listener(Arc::new(FloodSink(tx_b)));
    c.add_propagation_listener(Arc::new(FloodSink(tx_c)));

    let id = a.flood(b"ev".to_vec()).await.unwrap();
    assert_eq!(id, 0);

    for rx in [&mut rx_b, &mut rx_c] {
        let (seen, payload) = timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("flood should arrive")
            .unwrap();
        assert_eq!((seen, payload.as_slice()), (0, &b"ev"[..]));
    }

    sleep(Duration::from_secs(5)).await;
    assert!(rx_b.try_recv().is_err());
    assert!(rx_c.try_recv().is_err());

    assert_eq!(a.metrics().floods_originated, 1);
    assert_eq!(b.metrics().floods_relayed, 1);
    assert_eq!(c.metrics().floods_relayed, 1);
    // A hears B's relay, B hears C's relay
    assert!(a.metrics().floods_stale >= 1);
    assert!(b.metrics().floods_stale >= 1);

    assert_eq!(a.flood(b"ev2".to_vec()).await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn send_to_self_is_delivered_without_the_medium() {
    let medium = MemoryMedium::new();
    let a = spawn(&medium, 1);
    let mut rx = inbox(&a);

    a.send(addr(1), b"loop".to_vec()).unwrap();
    let (source, payload) = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!((source, payload), (1, b"loop".to_vec()));
    assert_eq!(medium.delivered(), 0);
    assert_eq!(a.metrics().messages_delivered, 1);
}

#[tokio::test(start_paused = true)]
async fn stopped_routing_stays_silent_until_restarted() {
    let medium = MemoryMedium::line(&[addr(1), addr(2)]);
    let a = spawn(&medium, 1);
    let _b = spawn(&medium, 2);

    sleep(Duration::from_millis(3_500)).await;
    a.stop_routing().await.unwrap();
    let before = a.metrics().packets_enqueued;

    sleep(Duration::from_secs(15)).await;
    assert_eq!(a.metrics().packets_enqueued, before);

    a.start_routing().await.unwrap();
    sleep(Duration::from_secs(4)).await;
    assert!(a.metrics().packets_enqueued > before);
}

struct CountingTap(AtomicUsize);

impl ChannelTap for CountingTap {
    fn on_packet(&self, channel: ChannelId, _data: &[u8]) {
        assert_eq!(channel, ChannelId::Routing);
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn raw_tap_sees_routing_traffic() {
    let medium = MemoryMedium::line(&[addr(1), addr(2)]);
    let a = spawn(&medium, 1);
    let b = spawn(&medium, 2);
    let tap = Arc::new(CountingTap(AtomicUsize::new(0)));
    let id = b.add_tap(ChannelId::Routing, tap.clone());

    sleep(Duration::from_millis(6_500)).await;
    let seen = tap.0.load(Ordering::SeqCst);
    assert!(seen >= 2, "two routing broadcasts from A, saw {seen}");

    assert!(b.remove_tap(id));
    sleep(Duration::from_secs(6)).await;
    assert_eq!(tap.0.load(Ordering::SeqCst), seen);
    drop(a);
}

/// Replies once to the first message, then unregisters itself.
struct Responder {
    node: NodeHandle,
    id: Mutex<Option<ListenerId>>,
}

impl MessageListener for Responder {
    fn on_message_received(&self, source: NodeAddress, payload: &[u8]) {
        let mut reply = b"re:".to_vec();
        reply.extend_from_slice(payload);
        self.node.send(source, reply).unwrap();

        if let Some(id) = self.id.lock().unwrap().take() {
            assert!(self.node.remove_message_listener(id));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn listener_can_reply_and_unregister_from_callback() {
    let (_medium, a, _b, c) = line();
    let responder = Arc::new(Responder {
        node: c.clone(),
        id: Mutex::new(None),
    });
    let id = c.add_message_listener(responder.clone());
    *responder.id.lock().unwrap() = Some(id);
    let mut at_a = inbox(&a);

    assert!(wait_for_next_hop(&a, 3, Some(2), Duration::from_secs(15)).await);
    assert!(wait_for_next_hop(&c, 1, Some(2), Duration::from_secs(15)).await);

    a.send(addr(3), b"ping".to_vec()).unwrap();
    let (source, payload) = timeout(Duration::from_secs(15), at_a.recv())
        .await
        .expect("reply should come back")
        .unwrap();
    assert_eq!(source, 3);
    assert_eq!(payload, b"re:ping");

    // Listener is gone: a second message gets no reply
    sleep(Duration::from_secs(3)).await;
    a.send(addr(3), b"again".to_vec()).unwrap();
    sleep(Duration::from_secs(10)).await;
    assert!(at_a.try_recv().is_err());
    assert_eq!(c.metrics().messages_delivered, 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_the_medium() {
    let medium = MemoryMedium::line(&[addr(1), addr(2)]);
    let a = spawn(&medium, 1);
    let b = spawn(&medium, 2);

    sleep(Duration::from_millis(3_500)).await;
    b.shutdown().await;
    assert!(!b.is_running());
    assert!(b.send(addr(1), b"x".to_vec()).is_err());

    let delivered = medium.delivered();
    sleep(Duration::from_secs(10)).await;
    // A keeps broadcasting but nobody is scanning any more
    assert_eq!(medium.delivered(), delivered);
    assert!(a.is_running());
}
