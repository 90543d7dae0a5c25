//! The plain bus scenario.
//!
//! A point-to-point pair feeds a shared segment through a forwarding node.
//! An echo client on the far point-to-point end exercises the path to an
//! echo server on the last segment node. The optional trace and layout
//! outputs are the counterpart of packet capture and animation metadata.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::apps::{EchoClient, EchoServer};
use crate::config::BusScenarioConfig;
use crate::error::Result;
use crate::net::routing::populate_routing_tables;
use crate::sim::time::SimTime;
use crate::sim::Simulation;
use crate::trace::Layout;

#[derive(Debug)]
pub struct BusReport {
    pub echo_sent: u32,
    pub echo_received: u32,
    pub server_replied: u32,
}

pub fn run(
    config: &BusScenarioConfig,
    trace_out: Option<&Path>,
    layout_out: Option<&Path>,
) -> Result<BusReport> {
    config.validate()?;

    let mut sim = Simulation::with_trace(trace_out.is_some());

    let n0 = sim.net.add_node("n0");
    let n1 = sim.net.add_node("n1");
    let segment_nodes: Vec<_> = (0..config.csma_nodes)
        .map(|i| sim.net.add_node(&format!("csma{i}")))
        .collect();

    let p2p = sim
        .net
        .add_p2p_link(n0, n1, Duration::from_millis(config.p2p_delay_ms));
    let mut bus_members = vec![n1];
    bus_members.extend(&segment_nodes);
    let bus = sim
        .net
        .add_shared_segment(Duration::from_nanos(config.csma_delay_ns), &bus_members);

    let p2p_first = Ipv4Addr::from(u32::from(config.p2p_network) + 1);
    sim.net.assign_sequential(p2p, p2p_first, config.mask)?;
    let csma_first = Ipv4Addr::from(u32::from(config.csma_network) + 1);
    let csma_addrs = sim.net.assign_sequential(bus, csma_first, config.mask)?;

    sim.net.set_forwarding(n1, true);
    populate_routing_tables(&mut sim.net);

    // Echo server on the far end of the segment, client across the link.
    let last = *segment_nodes
        .last()
        .ok_or_else(|| crate::error::Error::Topology("empty segment".to_string()))?;
    let last_addr = *csma_addrs
        .last()
        .ok_or_else(|| crate::error::Error::Topology("unaddressed segment".to_string()))?;
    let server_app = sim.install_app(last, Box::new(EchoServer::new(0)));
    sim.schedule_start(server_app, SimTime::from_secs(1));

    let client_app = sim.install_app(
        n0,
        Box::new(EchoClient::new(
            0,
            last_addr,
            config.echo_packets,
            Duration::from_secs_f64(config.echo_interval_seconds),
            config.echo_packet_size,
        )),
    );
    sim.schedule_start(client_app, SimTime::from_secs(2));

    sim.run_until(SimTime::from_secs_f64(config.stop_seconds));

    if let Some(path) = trace_out {
        sim.trace.write_json(path)?;
    }
    if let Some(path) = layout_out {
        let mut layout = Layout::new();
        layout.set_position(n0, 0.0, 10.0);
        layout.set_position(n1, 10.0, 10.0);
        for (i, &node) in segment_nodes.iter().enumerate() {
            layout.set_position(node, 20.0 + 10.0 * i as f64, 10.0);
        }
        layout.write_json(path)?;
    }

    let client = sim
        .app(client_app)
        .as_any()
        .downcast_ref::<EchoClient>()
        .ok_or_else(|| crate::error::Error::Topology("echo client app type".to_string()))?;
    let server = sim
        .app(server_app)
        .as_any()
        .downcast_ref::<EchoServer>()
        .ok_or_else(|| crate::error::Error::Topology("echo server app type".to_string()))?;

    info!(
        "bus run complete: {} sent, {} replies",
        client.sent(),
        client.received()
    );

    Ok(BusReport {
        echo_sent: client.sent(),
        echo_received: client.received(),
        server_replied: server.replied(),
    })
}
