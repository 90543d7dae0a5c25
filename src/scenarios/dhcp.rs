//! The address-allocation scenario.
//!
//! A shared bus carries the DHCP server, two routers, and a handful of
//! clients that boot with no address at all. One router holds the gateway
//! address, forwards toward a point-to-point tail with a remote host, and
//! carries the echo traffic the clients generate once bound. The second
//! router demonstrates a static reservation: its fixed address must never
//! appear in any dynamic grant.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::apps::{EchoClient, EchoServer};
use crate::config::DhcpScenarioConfig;
use crate::dhcp::{
    ClientId, DhcpClient, DhcpServer, DhcpState, LeaseRecord, ServerConfig, StaticReservation,
};
use crate::error::Result;
use crate::net::node::InterfaceConfig;
use crate::net::routing::populate_routing_tables;
use crate::sim::time::SimTime;
use crate::sim::Simulation;

/// One client's end state.
#[derive(Debug, Clone)]
pub struct ClientSummary {
    pub client: ClientId,
    pub state: DhcpState,
    pub addr: Option<Ipv4Addr>,
}

/// What the run produced, for inspection and assertions.
#[derive(Debug)]
pub struct DhcpReport {
    pub clients: Vec<ClientSummary>,
    /// Every lease the server ever committed, expired, or saw released.
    pub grants: Vec<LeaseRecord>,
    pub free_addresses: usize,
    pub echo_sent: u32,
    pub echo_received: u32,
}

pub fn run(config: &DhcpScenarioConfig, trace_out: Option<&Path>) -> Result<DhcpReport> {
    config.validate()?;

    let mut sim = Simulation::with_trace(trace_out.is_some());
    let bus_delay = Duration::from_nanos(config.bus_delay_ns);
    let p2p_delay = Duration::from_millis(config.p2p_delay_ms);

    let clients: Vec<_> = (0..config.clients)
        .map(|i| sim.net.add_node(&format!("c{i}")))
        .collect();
    let gateway_router = sim.net.add_node("r0");
    let fixed_router = sim.net.add_node("r1");
    let server_node = sim.net.add_node("dhcp-server");
    let remote = sim.net.add_node("remote");

    let mut bus_members = clients.clone();
    bus_members.extend([gateway_router, fixed_router, server_node]);
    sim.net.add_shared_segment(bus_delay, &bus_members);
    let p2p_link = sim.net.add_p2p_link(gateway_router, remote, p2p_delay);

    // Static addressing: the server, the gateway router (also the p2p
    // head), and the fixed-address router. The reservation must not fall
    // inside the dynamic range.
    let pool = config.build_pool()?;
    let reservation = StaticReservation::new(config.reserved_ip, config.mask);
    reservation.validate_against(&pool)?;
    reservation.apply(&mut sim.net, fixed_router, 0, true)?;

    StaticReservation::new(config.gateway, config.mask).apply(
        &mut sim.net,
        gateway_router,
        0,
        true,
    )?;
    sim.net.assign(
        server_node,
        0,
        InterfaceConfig::new(config.server_ip, config.mask),
    )?;

    let p2p_head = Ipv4Addr::from(u32::from(config.p2p_network) + 1);
    let p2p_tail = Ipv4Addr::from(u32::from(config.p2p_network) + 2);
    let head_iface = sim
        .net
        .iface_on(gateway_router, p2p_link)
        .ok_or_else(|| crate::error::Error::Topology("router missing its p2p interface".to_string()))?;
    sim.net.assign(
        gateway_router,
        head_iface,
        InterfaceConfig::new(p2p_head, config.p2p_mask),
    )?;
    sim.net
        .assign(remote, 0, InterfaceConfig::new(p2p_tail, config.p2p_mask))?;

    populate_routing_tables(&mut sim.net);

    let server_app = sim.install_app(
        server_node,
        Box::new(DhcpServer::new(
            ServerConfig {
                server_id: config.server_ip,
                mask: config.mask,
                gateway: config.gateway,
                lease_duration: config.lease_duration(),
            },
            0,
            pool,
        )),
    );
    sim.schedule_start(server_app, SimTime::ZERO);

    let client_start = SimTime::from_secs_f64(config.client_start_seconds);
    let client_apps: Vec<_> = clients
        .iter()
        .enumerate()
        .map(|(i, &node)| {
            let app = sim.install_app(node, Box::new(DhcpClient::new(ClientId(i as u64 + 1), 0)));
            sim.schedule_start(app, client_start);
            app
        })
        .collect();

    // Echo across the gateway once the first client has an address.
    let echo_server = sim.install_app(remote, Box::new(EchoServer::new(0)));
    sim.schedule_start(echo_server, SimTime::ZERO);
    let echo_client = sim.install_app(
        clients[0],
        Box::new(EchoClient::new(
            0,
            p2p_tail,
            config.echo_packets,
            Duration::from_secs_f64(config.echo_interval_seconds),
            config.echo_packet_size,
        )),
    );
    sim.schedule_start(echo_client, SimTime::from_secs_f64(config.echo_start_seconds));

    let stop = SimTime::from_secs_f64(config.stop_seconds);
    sim.run_until(stop);

    if let Some(path) = trace_out {
        sim.trace.write_json(path)?;
    }

    let summaries: Vec<ClientSummary> = client_apps
        .iter()
        .map(|&app| {
            let client = sim
                .app(app)
                .as_any()
                .downcast_ref::<DhcpClient>()
                .ok_or_else(|| crate::error::Error::Topology("client app type".to_string()))?;
            Ok(ClientSummary {
                client: client.id(),
                state: client.state(),
                addr: client.address(),
            })
        })
        .collect::<Result<_>>()?;

    let server = sim
        .app(server_app)
        .as_any()
        .downcast_ref::<DhcpServer>()
        .ok_or_else(|| crate::error::Error::Topology("server app type".to_string()))?;
    let echo = sim
        .app(echo_client)
        .as_any()
        .downcast_ref::<EchoClient>()
        .ok_or_else(|| crate::error::Error::Topology("echo app type".to_string()))?;

    for summary in &summaries {
        info!(
            "{} ended {} {}",
            summary.client,
            summary.state,
            summary
                .addr
                .map_or_else(|| "without an address".to_string(), |a| a.to_string())
        );
    }

    Ok(DhcpReport {
        clients: summaries,
        grants: server.leases().archive().to_vec(),
        free_addresses: server.pool().free_count(),
        echo_sent: echo.sent(),
        echo_received: echo.received(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DhcpScenarioConfig;

    #[test]
    fn test_all_clients_bind_distinct_addresses() {
        let config = DhcpScenarioConfig::default();
        let report = run(&config, None).unwrap();

        assert_eq!(report.clients.len(), 3);
        let mut addrs = Vec::new();
        for summary in &report.clients {
            assert_eq!(summary.state, DhcpState::Bound);
            let addr = summary.addr.unwrap();
            assert!(config.build_pool().unwrap().contains(addr));
            addrs.push(addr);
        }
        addrs.sort();
        addrs.dedup();
        assert_eq!(addrs.len(), 3);
    }

    #[test]
    fn test_reserved_address_never_granted() {
        let config = DhcpScenarioConfig::default();
        let report = run(&config, None).unwrap();

        assert!(!report.grants.is_empty());
        assert!(report
            .grants
            .iter()
            .all(|grant| grant.addr != config.reserved_ip));
    }

    #[test]
    fn test_echo_crosses_the_gateway() {
        let config = DhcpScenarioConfig::default();
        let report = run(&config, None).unwrap();

        assert_eq!(report.echo_sent, config.echo_packets);
        assert_eq!(report.echo_received, config.echo_packets);
    }

    #[test]
    fn test_reservation_collision_refuses_to_run() {
        let config = DhcpScenarioConfig {
            reserved_ip: Ipv4Addr::new(10, 0, 0, 5),
            ..Default::default()
        };
        assert!(run(&config, None).is_err());
    }
}
