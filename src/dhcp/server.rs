//! The DHCP server application.
//!
//! The server owns an [`AddressPool`] and a [`LeaseTable`] and drives the
//! OFFER/ACK side of the protocol. Reclamation of lapsed offers and expired
//! leases happens two ways: lazily before every allocation, and on a
//! periodic sweep timer, so addresses come back even while no client is
//! talking.

use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dhcp::lease::{LeaseRecord, LeaseState, LeaseTable};
use crate::dhcp::message::{ClientId, DhcpMessage, DHCP_WIRE_SIZE};
use crate::dhcp::pool::AddressPool;
use crate::net::channel::Tap;
use crate::net::packet::{Packet, Payload};
use crate::sim::event::TimerHandle;
use crate::sim::{Application, Context};

/// How often the server sweeps for lapsed offers and expired leases.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// How long an OFFER holds before an unconfirmed address is reclaimed.
pub const OFFER_TIMEOUT: Duration = Duration::from_secs(60);

const TIMER_SWEEP: u64 = 1;

/// Per-server protocol parameters handed out with every lease.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// The server's own address, used as the server identifier.
    pub server_id: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub lease_duration: Duration,
}

pub struct DhcpServer {
    config: ServerConfig,
    iface: usize,
    pool: AddressPool,
    leases: LeaseTable,
    sweep_timer: Option<TimerHandle>,
    running: bool,
}

impl DhcpServer {
    pub fn new(config: ServerConfig, iface: usize, pool: AddressPool) -> Self {
        Self {
            config,
            iface,
            pool,
            leases: LeaseTable::new(),
            sweep_timer: None,
            running: false,
        }
    }

    pub fn pool(&self) -> &AddressPool {
        &self.pool
    }

    pub fn leases(&self) -> &LeaseTable {
        &self.leases
    }

    /// Returns lapsed offers and expired leases to the pool.
    fn reclaim(&mut self, ctx: &mut Context<'_>) {
        for record in self.leases.expire_due(ctx.now()) {
            self.pool.release(record.addr);
            info!(
                "lease on {} for {} expired, address reclaimed",
                record.addr, record.client
            );
        }
    }

    fn reply(&self, ctx: &mut Context<'_>, to: Tap, dst: Ipv4Addr, message: DhcpMessage) {
        let packet = Packet::new(
            self.config.server_id,
            dst,
            Payload::Dhcp(message),
            DHCP_WIRE_SIZE,
        );
        ctx.reply_to(self.iface, to, packet);
    }

    fn handle_discover(&mut self, ctx: &mut Context<'_>, from: Tap, client: ClientId) {
        self.reclaim(ctx);

        let Some(addr) = self.pool.allocate(client) else {
            debug!("pool exhausted, ignoring DISCOVER from {client}");
            return;
        };
        if let Err(error) = self.pool.reserve_tentative(addr, client) {
            warn!("cannot reserve {addr} for {client}: {error}");
            return;
        }
        self.leases.insert_offer(LeaseRecord::offered(
            client,
            addr,
            ctx.now(),
            self.config.lease_duration,
            OFFER_TIMEOUT,
        ));

        info!("OFFER {addr} to {client}");
        self.reply(
            ctx,
            from,
            Ipv4Addr::BROADCAST,
            DhcpMessage::Offer {
                server: self.config.server_id,
                addr,
                mask: self.config.mask,
                gateway: self.config.gateway,
                lease: self.config.lease_duration,
            },
        );
    }

    /// Drops the client's outstanding offer, if any. Used when the client
    /// walks away (chose another server, or its request was refused).
    fn forget_offer(&mut self, client: ClientId) {
        if let Some(record) = self.leases.get(client)
            && record.state == LeaseState::Offered
        {
            let addr = record.addr;
            self.leases.mark_released(client);
            self.pool.release(addr);
        }
    }

    fn handle_request(
        &mut self,
        ctx: &mut Context<'_>,
        from: Tap,
        client: ClientId,
        requested: Ipv4Addr,
        server: Option<Ipv4Addr>,
    ) {
        // A request addressed to some other server frees our offer.
        if let Some(id) = server
            && id != self.config.server_id
        {
            self.forget_offer(client);
            return;
        }

        self.reclaim(ctx);

        let now = ctx.now();
        let grant = match self.leases.get_mut(client) {
            Some(record) if record.addr == requested => {
                match record.state {
                    LeaseState::Offered => {
                        if let Err(error) = self.pool.commit(requested, client) {
                            warn!("cannot commit {requested} for {client}: {error}");
                            None
                        } else {
                            record.bind(now, self.config.lease_duration);
                            Some(record.clone())
                        }
                    }
                    // Renewal or rebind of a live lease.
                    LeaseState::Bound => {
                        record.bind(now, self.config.lease_duration);
                        Some(record.clone())
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        match grant {
            Some(record) => {
                info!("ACK {} to {} (lease {:?})", record.addr, client, record.duration);
                self.leases.archive_grant(record.clone());
                self.reply(
                    ctx,
                    from,
                    Ipv4Addr::BROADCAST,
                    DhcpMessage::Ack {
                        server: self.config.server_id,
                        addr: record.addr,
                        mask: self.config.mask,
                        gateway: self.config.gateway,
                        lease: self.config.lease_duration,
                    },
                );
            }
            None => {
                info!("NAK to {client} for {requested}");
                self.forget_offer(client);
                self.reply(
                    ctx,
                    from,
                    Ipv4Addr::BROADCAST,
                    DhcpMessage::Nak {
                        reason: format!("{requested} is not reserved for this client"),
                    },
                );
            }
        }
    }

    fn handle_release(&mut self, client: ClientId, addr: Ipv4Addr) {
        match self.leases.mark_released(client) {
            Some(released) if released == addr => {
                self.pool.release(addr);
                info!("RELEASE of {addr} by {client}");
            }
            Some(released) => {
                // Stale release for an address the client no longer holds.
                self.pool.release(released);
                debug!("{client} released {addr} but held {released}");
            }
            None => debug!("RELEASE from {client} with no lease on record"),
        }
    }
}

impl Application for DhcpServer {
    fn start(&mut self, ctx: &mut Context<'_>) {
        self.running = true;
        info!(
            "DHCP server {} up, {} addresses free",
            self.config.server_id,
            self.pool.free_count()
        );
        self.sweep_timer = Some(ctx.arm_timer_in(SWEEP_INTERVAL, TIMER_SWEEP));
    }

    fn stop(&mut self, ctx: &mut Context<'_>) {
        self.running = false;
        if let Some(timer) = self.sweep_timer.take() {
            ctx.cancel_timer(timer);
        }
    }

    fn on_timer(&mut self, ctx: &mut Context<'_>, token: u64) {
        if token != TIMER_SWEEP || !self.running {
            return;
        }
        self.reclaim(ctx);
        self.sweep_timer = Some(ctx.arm_timer_in(SWEEP_INTERVAL, TIMER_SWEEP));
    }

    fn on_packet(&mut self, ctx: &mut Context<'_>, packet: &Packet) {
        if !self.running {
            return;
        }
        let Payload::Dhcp(message) = &packet.payload else {
            return;
        };
        let Some(from) = packet.link_src else {
            return;
        };
        match message.clone() {
            DhcpMessage::Discover { client } => self.handle_discover(ctx, from, client),
            DhcpMessage::Request {
                client,
                requested,
                server,
            } => self.handle_request(ctx, from, client, requested, server),
            DhcpMessage::Release { client, addr } => self.handle_release(client, addr),
            // Server-originated messages on the segment are not for us.
            DhcpMessage::Offer { .. } | DhcpMessage::Ack { .. } | DhcpMessage::Nak { .. } => {}
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::node::InterfaceConfig;
    use crate::sim::time::SimTime;
    use crate::sim::Simulation;
    use std::any::Any;

    const MASK_8: Ipv4Addr = Ipv4Addr::new(255, 0, 0, 0);

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    /// Scripted peer that speaks just enough of the protocol to probe the
    /// server: broadcasts DISCOVER on start and optionally confirms the
    /// first OFFER.
    struct Driver {
        client: ClientId,
        confirm: bool,
        log: Vec<DhcpMessage>,
    }

    impl Driver {
        fn new(client: ClientId, confirm: bool) -> Self {
            Self {
                client,
                confirm,
                log: Vec::new(),
            }
        }
    }

    impl Application for Driver {
        fn start(&mut self, ctx: &mut Context<'_>) {
            let packet = Packet::broadcast(
                Payload::Dhcp(DhcpMessage::Discover { client: self.client }),
                DHCP_WIRE_SIZE,
            );
            ctx.send_on(0, packet);
        }

        fn on_packet(&mut self, ctx: &mut Context<'_>, packet: &Packet) {
            let Payload::Dhcp(message) = &packet.payload else {
                return;
            };
            // Other clients' broadcasts cross the bus too; only server
            // replies are interesting.
            if !matches!(
                message,
                DhcpMessage::Offer { .. } | DhcpMessage::Ack { .. } | DhcpMessage::Nak { .. }
            ) {
                return;
            }
            self.log.push(message.clone());
            if let DhcpMessage::Offer { server, addr, .. } = message
                && self.confirm
            {
                let request = Packet::broadcast(
                    Payload::Dhcp(DhcpMessage::Request {
                        client: self.client,
                        requested: *addr,
                        server: Some(*server),
                    }),
                    DHCP_WIRE_SIZE,
                );
                ctx.send_on(0, request);
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn server_sim(range_end: u8, drivers: &[(ClientId, bool)]) -> (Simulation, AppId, Vec<AppId>) {
        let mut sim = Simulation::new();
        let server_node = sim.net.add_node("dhcp-server");
        let mut members = vec![server_node];
        for i in 0..drivers.len() {
            members.push(sim.net.add_node(&format!("c{i}")));
        }
        sim.net.add_shared_segment(Duration::from_millis(2), &members);
        sim.net
            .assign(server_node, 0, InterfaceConfig::new(addr(12), MASK_8))
            .unwrap();

        let pool =
            AddressPool::new(addr(0), MASK_8, addr(1), addr(range_end), [addr(1), addr(12)])
                .unwrap();
        let server = DhcpServer::new(
            ServerConfig {
                server_id: addr(12),
                mask: MASK_8,
                gateway: addr(1),
                lease_duration: Duration::from_secs(8),
            },
            0,
            pool,
        );
        let server_app = sim.install_app(server_node, Box::new(server));
        sim.schedule_start(server_app, SimTime::ZERO);

        let mut driver_apps = Vec::new();
        for (i, &(client, confirm)) in drivers.iter().enumerate() {
            let app = sim.install_app(members[i + 1], Box::new(Driver::new(client, confirm)));
            sim.schedule_start(app, SimTime::from_secs(1));
            driver_apps.push(app);
        }
        (sim, server_app, driver_apps)
    }

    use crate::sim::AppId;

    fn driver(sim: &Simulation, app: AppId) -> &Driver {
        sim.app(app).as_any().downcast_ref::<Driver>().unwrap()
    }

    fn server(sim: &Simulation, app: AppId) -> &DhcpServer {
        sim.app(app).as_any().downcast_ref::<DhcpServer>().unwrap()
    }

    #[test]
    fn test_discover_offer_request_ack() {
        let (mut sim, server_app, drivers) = server_sim(15, &[(ClientId(1), true)]);
        sim.run_until(SimTime::from_secs(3));

        let log = &driver(&sim, drivers[0]).log;
        assert!(matches!(log[0], DhcpMessage::Offer { addr, .. } if addr == Ipv4Addr::new(10, 0, 0, 2)));
        assert!(matches!(log[1], DhcpMessage::Ack { addr, .. } if addr == Ipv4Addr::new(10, 0, 0, 2)));

        let srv = server(&sim, server_app);
        assert_eq!(srv.leases().bound_count(), 1);
        assert_eq!(srv.pool().holder(addr(2)), Some(ClientId(1)));
    }

    #[test]
    fn test_distinct_offers_for_concurrent_clients() {
        let (mut sim, _, drivers) =
            server_sim(15, &[(ClientId(1), true), (ClientId(2), true), (ClientId(3), true)]);
        sim.run_until(SimTime::from_secs(3));

        let mut granted = Vec::new();
        for &app in &drivers {
            for message in &driver(&sim, app).log {
                if let DhcpMessage::Ack { addr, .. } = message {
                    granted.push(*addr);
                }
            }
        }
        granted.sort();
        granted.dedup();
        assert_eq!(granted.len(), 3);
    }

    #[test]
    fn test_exhausted_pool_stays_silent() {
        // Only 10.0.0.2 and 10.0.0.3 are allocatable; the third client gets
        // nothing.
        let (mut sim, _, drivers) = server_sim(
            3,
            &[(ClientId(1), true), (ClientId(2), true), (ClientId(3), true)],
        );
        sim.run_until(SimTime::from_secs(3));

        let starved: Vec<_> = drivers
            .iter()
            .filter(|&&app| {
                !driver(&sim, app)
                    .log
                    .iter()
                    .any(|m| matches!(m, DhcpMessage::Ack { .. }))
            })
            .collect();
        assert_eq!(starved.len(), 1);
        assert!(driver(&sim, *starved[0]).log.is_empty());
    }

    #[test]
    fn test_request_for_foreign_address_is_nakked() {
        let (mut sim, _, drivers) = server_sim(15, &[(ClientId(1), true)]);
        let rogue_node = sim.net.add_node("rogue");
        sim.net
            .add_shared_segment(Duration::from_millis(2), &[rogue_node]);
        // Splice the rogue onto the existing bus instead.
        let iface = 0;
        sim.net.nodes[rogue_node].interfaces[iface].channel = 0;
        match &mut sim.net.channels[0] {
            crate::net::channel::Channel::Shared { taps, .. } => taps.push(Tap {
                node: rogue_node,
                iface,
            }),
            _ => unreachable!(),
        }

        /// Requests an address that was bound to someone else.
        struct Rogue {
            log: Vec<DhcpMessage>,
        }
        impl Application for Rogue {
            fn start(&mut self, ctx: &mut Context<'_>) {
                let request = Packet::broadcast(
                    Payload::Dhcp(DhcpMessage::Request {
                        client: ClientId(99),
                        requested: Ipv4Addr::new(10, 0, 0, 2),
                        server: Some(Ipv4Addr::new(10, 0, 0, 12)),
                    }),
                    DHCP_WIRE_SIZE,
                );
                ctx.send_on(0, request);
            }
            fn on_packet(&mut self, _ctx: &mut Context<'_>, packet: &Packet) {
                if let Payload::Dhcp(message) = &packet.payload {
                    self.log.push(message.clone());
                }
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        let rogue = sim.install_app(rogue_node, Box::new(Rogue { log: Vec::new() }));
        sim.schedule_start(rogue, SimTime::from_secs(2));
        sim.run_until(SimTime::from_secs(4));

        // The honest client got its lease first.
        assert!(driver(&sim, drivers[0])
            .log
            .iter()
            .any(|m| matches!(m, DhcpMessage::Ack { .. })));
        let rogue_app = sim.app(rogue).as_any().downcast_ref::<Rogue>().unwrap();
        assert!(rogue_app
            .log
            .iter()
            .any(|m| matches!(m, DhcpMessage::Nak { .. })));
    }

    #[test]
    fn test_sweep_reclaims_unconfirmed_offer() {
        let (mut sim, server_app, _) = server_sim(15, &[(ClientId(1), false)]);
        sim.run_until(SimTime::from_secs(2));
        assert_eq!(server(&sim, server_app).pool().free_count(), 12);

        // The offer lapses after OFFER_TIMEOUT and the sweep frees it.
        sim.run_until(SimTime::from_secs(70));
        assert_eq!(server(&sim, server_app).pool().free_count(), 13);
        assert!(server(&sim, server_app).leases().is_empty());
    }

    #[test]
    fn test_release_returns_address() {
        let (mut sim, server_app, drivers) = server_sim(15, &[(ClientId(1), true)]);
        sim.run_until(SimTime::from_secs(3));

        /// One-shot release sender.
        struct Releaser;
        impl Application for Releaser {
            fn start(&mut self, ctx: &mut Context<'_>) {
                let packet = Packet::broadcast(
                    Payload::Dhcp(DhcpMessage::Release {
                        client: ClientId(1),
                        addr: Ipv4Addr::new(10, 0, 0, 2),
                    }),
                    DHCP_WIRE_SIZE,
                );
                ctx.send_on(0, packet);
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }
        // Reuse the driver's node for the release.
        let node = 1;
        let _ = drivers;
        let releaser = sim.install_app(node, Box::new(Releaser));
        sim.schedule_start(releaser, SimTime::from_secs(4));
        sim.run_until(SimTime::from_secs(5));

        let srv = server(&sim, server_app);
        assert_eq!(srv.pool().holder(addr(2)), None);
        assert_eq!(srv.pool().free_count(), 13);
    }
}
