use std::net::Ipv4Addr;
use std::time::Duration;

use simlan::config::DhcpScenarioConfig;
use simlan::dhcp::{
    AddressPool, ClientId, DhcpClient, DhcpMessage, DhcpServer, DhcpState, LeaseState,
    ServerConfig, DHCP_WIRE_SIZE,
};
use simlan::net::node::InterfaceConfig;
use simlan::net::packet::{Packet, Payload};
use simlan::scenarios;
use simlan::sim::time::SimTime;
use simlan::sim::{AppId, Application, Context, Simulation};

const MASK_8: Ipv4Addr = Ipv4Addr::new(255, 0, 0, 0);

fn addr(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

/// Server plus `clients` dynamic clients on one shared segment, with an
/// allocation range of `[range_start, range_end]` minus the server address.
fn lan(
    range_start: u8,
    range_end: u8,
    clients: usize,
    lease: Duration,
) -> (Simulation, AppId, Vec<AppId>) {
    let mut sim = Simulation::with_trace(true);
    let server_node = sim.net.add_node("dhcp-server");
    let mut members = vec![server_node];
    for i in 0..clients {
        members.push(sim.net.add_node(&format!("c{i}")));
    }
    sim.net
        .add_shared_segment(Duration::from_millis(2), &members);
    sim.net
        .assign(server_node, 0, InterfaceConfig::new(addr(12), MASK_8))
        .unwrap();

    let pool = AddressPool::new(
        addr(0),
        MASK_8,
        addr(range_start),
        addr(range_end),
        [addr(12)],
    )
    .unwrap();
    let server_app = sim.install_app(
        server_node,
        Box::new(DhcpServer::new(
            ServerConfig {
                server_id: addr(12),
                mask: MASK_8,
                gateway: addr(1),
                lease_duration: lease,
            },
            0,
            pool,
        )),
    );
    sim.schedule_start(server_app, SimTime::ZERO);

    let client_apps: Vec<AppId> = members[1..]
        .iter()
        .enumerate()
        .map(|(i, &node)| {
            let app = sim.install_app(node, Box::new(DhcpClient::new(ClientId(i as u64 + 1), 0)));
            sim.schedule_start(app, SimTime::from_secs(1));
            app
        })
        .collect();
    (sim, server_app, client_apps)
}

fn client(sim: &Simulation, app: AppId) -> &DhcpClient {
    sim.app(app).as_any().downcast_ref::<DhcpClient>().unwrap()
}

fn server(sim: &Simulation, app: AppId) -> &DhcpServer {
    sim.app(app).as_any().downcast_ref::<DhcpServer>().unwrap()
}

#[test]
fn three_clients_bind_distinct_in_range_addresses() {
    let (mut sim, server_app, clients) = lan(2, 15, 3, Duration::from_secs(60));
    sim.run_until(SimTime::from_secs(10));

    let mut addrs = Vec::new();
    for &app in &clients {
        let c = client(&sim, app);
        assert_eq!(c.state(), DhcpState::Bound);
        let a = c.address().unwrap();
        assert!(server(&sim, server_app).pool().contains(a));
        addrs.push(a);
    }
    addrs.sort();
    addrs.dedup();
    assert_eq!(addrs.len(), 3);
}

#[test]
fn saturated_range_leaves_extra_client_in_discovery() {
    // Two allocatable addresses, three clients.
    let (mut sim, _, clients) = lan(2, 3, 3, Duration::from_secs(60));
    sim.run_until(SimTime::from_secs(20));

    let mut bound = 0;
    let mut starved = 0;
    for &app in &clients {
        let c = client(&sim, app);
        if c.state() == DhcpState::Bound {
            bound += 1;
        } else {
            assert!(matches!(c.state(), DhcpState::Init | DhcpState::Selecting));
            assert_eq!(c.address(), None);
            starved += 1;
        }
    }
    assert_eq!(bound, 2);
    assert_eq!(starved, 1);

    // The starved client keeps retrying rather than giving up. Bound
    // clients sent one discover each; the remainder is the retry stream.
    let discovers = sim
        .trace
        .events()
        .iter()
        .filter(|e| e.event == "tx" && e.kind == "dhcp-discover")
        .count();
    assert!(discovers > 3);
}

#[test]
fn renewal_before_t2_keeps_address_and_refreshes_expiry() {
    let (mut sim, server_app, clients) = lan(2, 15, 1, Duration::from_secs(8));
    sim.run_until(SimTime::from_secs(20));

    let c = client(&sim, clients[0]);
    assert_eq!(c.state(), DhcpState::Bound);
    let held = c.address().unwrap();

    // Every committed grant for this client names the same address, and
    // expiry moved forward with each renewal.
    let grants: Vec<_> = server(&sim, server_app)
        .leases()
        .archive()
        .iter()
        .filter(|grant| grant.client == ClientId(1) && grant.state == LeaseState::Bound)
        .collect();
    assert!(grants.len() >= 2);
    assert!(grants.iter().all(|grant| grant.addr == held));
    for pair in grants.windows(2) {
        assert!(pair[1].expires_at > pair[0].expires_at);
    }
}

/// Confirms its first offer and then goes silent, so its lease expires.
struct OneShot {
    id: ClientId,
    acks: u32,
}

impl OneShot {
    fn new(id: ClientId) -> Self {
        Self { id, acks: 0 }
    }
}

impl Application for OneShot {
    fn start(&mut self, ctx: &mut Context<'_>) {
        ctx.send_on(
            0,
            Packet::broadcast(
                Payload::Dhcp(DhcpMessage::Discover { client: self.id }),
                DHCP_WIRE_SIZE,
            ),
        );
    }

    fn on_packet(&mut self, ctx: &mut Context<'_>, packet: &Packet) {
        match &packet.payload {
            Payload::Dhcp(DhcpMessage::Offer { server, addr, .. }) => {
                ctx.send_on(
                    0,
                    Packet::broadcast(
                        Payload::Dhcp(DhcpMessage::Request {
                            client: self.id,
                            requested: *addr,
                            server: Some(*server),
                        }),
                        DHCP_WIRE_SIZE,
                    ),
                );
            }
            Payload::Dhcp(DhcpMessage::Ack { .. }) => self.acks += 1,
            _ => {}
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[test]
fn expired_lease_is_reallocated_without_overlap() {
    // A single allocatable address forces reuse.
    let mut sim = Simulation::new();
    let server_node = sim.net.add_node("dhcp-server");
    let first = sim.net.add_node("one-shot");
    let second = sim.net.add_node("late-client");
    sim.net
        .add_shared_segment(Duration::from_millis(2), &[server_node, first, second]);
    sim.net
        .assign(server_node, 0, InterfaceConfig::new(addr(12), MASK_8))
        .unwrap();

    let pool = AddressPool::new(addr(0), MASK_8, addr(2), addr(2), []).unwrap();
    let server_app = sim.install_app(
        server_node,
        Box::new(DhcpServer::new(
            ServerConfig {
                server_id: addr(12),
                mask: MASK_8,
                gateway: addr(1),
                lease_duration: Duration::from_secs(4),
            },
            0,
            pool,
        )),
    );
    sim.schedule_start(server_app, SimTime::ZERO);

    let one_shot = sim.install_app(first, Box::new(OneShot::new(ClientId(1))));
    sim.schedule_start(one_shot, SimTime::from_secs(1));
    let late = sim.install_app(second, Box::new(DhcpClient::new(ClientId(2), 0)));
    sim.schedule_start(late, SimTime::from_secs(10));

    sim.run_until(SimTime::from_secs(14));

    // The silent client's lease expired and the address moved on.
    let srv = server(&sim, server_app);
    assert!(srv
        .leases()
        .archive()
        .iter()
        .any(|grant| grant.client == ClientId(1) && grant.state == LeaseState::Expired));
    assert_eq!(srv.pool().holder(addr(2)), Some(ClientId(2)));

    let late_client = client(&sim, late);
    assert_eq!(late_client.state(), DhcpState::Bound);
    assert_eq!(late_client.address(), Some(addr(2)));

    let one = sim.app(one_shot).as_any().downcast_ref::<OneShot>().unwrap();
    assert_eq!(one.acks, 1);
}

#[test]
fn oversubscribed_scenario_never_grants_infrastructure_addresses() {
    let config = DhcpScenarioConfig {
        clients: 14,
        ..Default::default()
    };
    let report = scenarios::dhcp::run(&config, None).unwrap();

    let forbidden = [
        config.reserved_ip,
        config.server_ip,
        config.gateway,
        config.network,
    ];
    for grant in &report.grants {
        assert!(!forbidden.contains(&grant.addr));
        assert!(grant.addr >= config.pool_start && grant.addr <= config.pool_end);
    }

    // Thirteen allocatable addresses for fourteen clients.
    let bound = report
        .clients
        .iter()
        .filter(|c| c.state == DhcpState::Bound)
        .count();
    assert_eq!(bound, 13);
    assert_eq!(report.free_addresses, 0);
}
