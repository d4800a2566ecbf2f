//! Example: Three nodes in a line
//!
//! `A - B - C` on the in-memory medium. A and C are out of range of each other,
//! so A's message to C is relayed by B once the routing tables converge. A flood
//! from C reaches every node.
//!
//! Run with: `cargo run --example line_topology`
//! Set `RUST_LOG=adhoc_mesh=debug` for per-packet detail.

#![allow(clippy::uninlined_format_args)]

use adhoc_mesh::config::LoggingConfig;
use adhoc_mesh::utils::logging::init_logging;
use adhoc_mesh::{
    MemoryMedium, MeshConfig, MeshNode, MessageListener, NodeAddress, PropagationListener,
    RoutingListener,
};
use std::sync::Arc;
use std::time::Duration;

struct Printer(&'static str);

impl RoutingListener for Printer {
    fn on_path_added(&self, dest: NodeAddress, cost: u8, next_hop: NodeAddress) {
        println!("[{}] route to {} via {} (cost {})", self.0, dest, next_hop, cost);
    }

    fn on_path_deleted(&self, dest: NodeAddress, _cost: u8, _next_hop: Option<NodeAddress>) {
        println!("[{}] lost route to {}", self.0, dest);
    }
}

impl MessageListener for Printer {
    fn on_message_received(&self, source: NodeAddress, payload: &[u8]) {
        println!("[{}] message from {}: {}", self.0, source, String::from_utf8_lossy(payload));
    }

    fn on_message_forward(&self, source: NodeAddress, next_hop: Option<NodeAddress>) {
        println!("[{}] relaying message from {} to {:?}", self.0, source, next_hop);
    }
}

impl PropagationListener for Printer {
    fn on_flood(&self, id: i8, payload: &[u8]) {
        println!("[{}] flood #{}: {}", self.0, id, String::from_utf8_lossy(payload));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&LoggingConfig::default());

    println!("=== Line Topology Demo ===\n");

    let (a, b, c) = (NodeAddress::new(1)?, NodeAddress::new(2)?, NodeAddress::new(3)?);
    let medium = MemoryMedium::line(&[a, b, c]);

    let mut nodes = Vec::new();
    for (name, address) in [("A", a), ("B", b), ("C", c)] {
        let node = MeshNode::spawn(MeshConfig::for_address(address.get()), medium.port(address))?;
        let printer = Arc::new(Printer(name));
        node.add_routing_listener(printer.clone());
        node.add_message_listener(printer.clone());
        node.add_propagation_listener(printer);
        nodes.push(node);
    }
    let (node_a, node_c) = (&nodes[0], &nodes[2]);

    println!("Waiting for routes to converge...");
    while node_a.next_hop(c).await?.is_none() {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    println!("\nA's route table:");
    for path in node_a.routes().await? {
        println!("   {} cost {} via {:?}", path.dest, path.cost, path.next_hop);
    }

    println!("\nSending \"hi\" from A to C");
    node_a.send(c, b"hi".to_vec())?;
    tokio::time::sleep(Duration::from_secs(3)).await;

    println!("\nFlooding \"alarm\" from C");
    node_c.flood(b"alarm".to_vec()).await?;
    tokio::time::sleep(Duration::from_secs(3)).await;

    for (name, node) in ["A", "B", "C"].iter().zip(&nodes) {
        let metrics = node.metrics();
        println!(
            "{}: {} advertised, {} received, {} relayed",
            name,
            metrics.packets_advertised,
            metrics.packets_received,
            metrics.messages_forwarded + metrics.floods_relayed
        );
        node.shutdown().await;
    }

    Ok(())
}
