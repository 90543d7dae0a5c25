//! The DHCP client application.
//!
//! A tagged-state machine driven entirely by packets and timers. The client
//! keeps at most one timer armed at any moment; every transition cancels the
//! old timer before arming the next, so a state can never be woken by a
//! deadline that belonged to a previous life.

use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dhcp::lease::{T1_FRACTION, T2_FRACTION};
use crate::dhcp::message::{ClientId, DhcpMessage, DHCP_WIRE_SIZE};
use crate::net::node::InterfaceConfig;
use crate::net::packet::{Packet, Payload};
use crate::sim::event::TimerHandle;
use crate::sim::time::SimTime;
use crate::sim::{Application, Context};

/// First discovery retry interval; doubles on every unanswered round.
pub const RETRY_BASE: Duration = Duration::from_secs(4);

/// Ceiling on the discovery retry interval.
pub const RETRY_CAP: Duration = Duration::from_secs(64);

/// After this many unanswered rounds the backoff resets to the base, so a
/// client never gives up but also never waits longer than the cap.
pub const RETRY_ROUNDS: u32 = 5;

/// How long a REQUEST may go unanswered before discovery restarts.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const TIMER_RETRY: u64 = 1;
const TIMER_REQUEST: u64 = 2;
const TIMER_RENEW: u64 = 3;
const TIMER_REBIND: u64 = 4;
const TIMER_EXPIRE: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpState {
    Init,
    Selecting,
    Requesting,
    Bound,
    Renewing,
    Rebinding,
}

impl std::fmt::Display for DhcpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DhcpState::Init => "INIT",
            DhcpState::Selecting => "SELECTING",
            DhcpState::Requesting => "REQUESTING",
            DhcpState::Bound => "BOUND",
            DhcpState::Renewing => "RENEWING",
            DhcpState::Rebinding => "REBINDING",
        };
        f.write_str(label)
    }
}

/// The offer the client is currently trying to confirm.
#[derive(Debug, Clone, Copy)]
struct OfferInfo {
    server: Ipv4Addr,
    addr: Ipv4Addr,
}

/// The lease the client currently holds.
#[derive(Debug, Clone, Copy)]
pub struct BoundLease {
    pub server: Ipv4Addr,
    pub addr: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub duration: Duration,
    pub acquired: SimTime,
}

impl BoundLease {
    fn renew_at(&self) -> SimTime {
        self.acquired + self.duration.mul_f64(T1_FRACTION)
    }

    fn rebind_at(&self) -> SimTime {
        self.acquired + self.duration.mul_f64(T2_FRACTION)
    }

    fn expires_at(&self) -> SimTime {
        self.acquired + self.duration
    }
}

pub struct DhcpClient {
    id: ClientId,
    iface: usize,
    state: DhcpState,
    offer: Option<OfferInfo>,
    lease: Option<BoundLease>,
    retries: u32,
    timer: Option<TimerHandle>,
    running: bool,
}

impl DhcpClient {
    pub fn new(id: ClientId, iface: usize) -> Self {
        Self {
            id,
            iface,
            state: DhcpState::Init,
            offer: None,
            lease: None,
            retries: 0,
            timer: None,
            running: false,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn state(&self) -> DhcpState {
        self.state
    }

    /// The address currently held, if bound (or renewing/rebinding).
    pub fn address(&self) -> Option<Ipv4Addr> {
        self.lease.map(|lease| lease.addr)
    }

    pub fn lease(&self) -> Option<&BoundLease> {
        self.lease.as_ref()
    }

    /// True while the client has not yet confirmed a lease.
    pub fn in_discovery(&self) -> bool {
        matches!(
            self.state,
            DhcpState::Init | DhcpState::Selecting | DhcpState::Requesting
        )
    }

    fn arm_in(&mut self, ctx: &mut Context<'_>, delay: Duration, token: u64) {
        if let Some(old) = self.timer.take() {
            ctx.cancel_timer(old);
        }
        self.timer = Some(ctx.arm_timer_in(delay, token));
    }

    fn arm_at(&mut self, ctx: &mut Context<'_>, at: SimTime, token: u64) {
        if let Some(old) = self.timer.take() {
            ctx.cancel_timer(old);
        }
        self.timer = Some(ctx.arm_timer_at(at, token));
    }

    fn disarm(&mut self, ctx: &mut Context<'_>) {
        if let Some(old) = self.timer.take() {
            ctx.cancel_timer(old);
        }
    }

    /// Drops any address and lease state and returns to INIT.
    fn enter_init(&mut self, ctx: &mut Context<'_>) {
        self.disarm(ctx);
        if self.lease.is_some() {
            ctx.clear_address(self.iface);
        }
        self.offer = None;
        self.lease = None;
        self.state = DhcpState::Init;
    }

    /// Current backoff interval, advancing the round counter.
    fn next_retry(&mut self) -> Duration {
        let delay = RETRY_BASE
            .checked_mul(1 << self.retries)
            .unwrap_or(RETRY_CAP)
            .min(RETRY_CAP);
        self.retries += 1;
        if self.retries >= RETRY_ROUNDS {
            self.retries = 0;
        }
        delay
    }

    fn send_discover(&mut self, ctx: &mut Context<'_>) {
        self.state = DhcpState::Selecting;
        debug!("{} broadcasting DISCOVER", self.id);
        ctx.send_on(
            self.iface,
            Packet::broadcast(
                Payload::Dhcp(DhcpMessage::Discover { client: self.id }),
                DHCP_WIRE_SIZE,
            ),
        );
        let delay = self.next_retry();
        self.arm_in(ctx, delay, TIMER_RETRY);
    }

    fn handle_offer(
        &mut self,
        ctx: &mut Context<'_>,
        server: Ipv4Addr,
        addr: Ipv4Addr,
    ) {
        if self.state != DhcpState::Selecting {
            return;
        }
        let offer = OfferInfo { server, addr };
        self.offer = Some(offer);
        self.state = DhcpState::Requesting;
        debug!("{} requesting {} from {}", self.id, offer.addr, offer.server);
        ctx.send_on(
            self.iface,
            Packet::broadcast(
                Payload::Dhcp(DhcpMessage::Request {
                    client: self.id,
                    requested: offer.addr,
                    server: Some(offer.server),
                }),
                DHCP_WIRE_SIZE,
            ),
        );
        self.arm_in(ctx, REQUEST_TIMEOUT, TIMER_REQUEST);
    }

    fn handle_ack(
        &mut self,
        ctx: &mut Context<'_>,
        server: Ipv4Addr,
        addr: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        duration: Duration,
    ) {
        match self.state {
            DhcpState::Requesting => {
                let Some(offer) = self.offer.take() else {
                    return;
                };
                if offer.addr != addr {
                    debug!("{} acked {} but requested {}", self.id, addr, offer.addr);
                }
                if let Err(error) = ctx.assign_address(
                    self.iface,
                    InterfaceConfig::with_gateway(addr, mask, gateway),
                ) {
                    warn!("{} cannot use {addr}: {error}", self.id);
                    self.enter_init(ctx);
                    self.send_discover(ctx);
                    return;
                }
                let lease = BoundLease {
                    server,
                    addr,
                    mask,
                    gateway,
                    duration,
                    acquired: ctx.now(),
                };
                info!("{} bound to {} for {:?}", self.id, addr, duration);
                self.lease = Some(lease);
                self.state = DhcpState::Bound;
                self.retries = 0;
                self.arm_at(ctx, lease.renew_at(), TIMER_RENEW);
            }
            DhcpState::Renewing | DhcpState::Rebinding => {
                let Some(mut lease) = self.lease else {
                    return;
                };
                if lease.addr != addr {
                    // Treat an address change on renewal as a refused lease.
                    self.enter_init(ctx);
                    self.send_discover(ctx);
                    return;
                }
                lease.server = server;
                lease.duration = duration;
                lease.acquired = ctx.now();
                debug!("{} renewed {} for {:?}", self.id, addr, duration);
                self.lease = Some(lease);
                self.state = DhcpState::Bound;
                self.arm_at(ctx, lease.renew_at(), TIMER_RENEW);
            }
            _ => {}
        }
    }

    fn handle_nak(&mut self, ctx: &mut Context<'_>, reason: &str) {
        if matches!(
            self.state,
            DhcpState::Requesting | DhcpState::Renewing | DhcpState::Rebinding
        ) {
            info!("{} refused: {reason}", self.id);
            self.enter_init(ctx);
            self.send_discover(ctx);
        }
    }
}

impl Application for DhcpClient {
    fn start(&mut self, ctx: &mut Context<'_>) {
        self.running = true;
        self.retries = 0;
        self.enter_init(ctx);
        self.send_discover(ctx);
    }

    fn stop(&mut self, ctx: &mut Context<'_>) {
        self.running = false;
        if let Some(lease) = self.lease {
            info!("{} releasing {}", self.id, lease.addr);
            ctx.send_on(
                self.iface,
                Packet::broadcast(
                    Payload::Dhcp(DhcpMessage::Release {
                        client: self.id,
                        addr: lease.addr,
                    }),
                    DHCP_WIRE_SIZE,
                ),
            );
        }
        self.enter_init(ctx);
    }

    fn on_timer(&mut self, ctx: &mut Context<'_>, token: u64) {
        if !self.running {
            return;
        }
        self.timer = None;
        match (token, self.state) {
            (TIMER_RETRY, DhcpState::Selecting) => {
                debug!("{} discovery timed out, retrying", self.id);
                self.send_discover(ctx);
            }
            (TIMER_REQUEST, DhcpState::Requesting) => {
                debug!("{} request timed out, restarting discovery", self.id);
                self.enter_init(ctx);
                self.send_discover(ctx);
            }
            (TIMER_RENEW, DhcpState::Bound) => {
                let Some(lease) = self.lease else {
                    return;
                };
                self.state = DhcpState::Renewing;
                debug!("{} renewing {} with {}", self.id, lease.addr, lease.server);
                ctx.send_on(
                    self.iface,
                    Packet::new(
                        lease.addr,
                        lease.server,
                        Payload::Dhcp(DhcpMessage::Request {
                            client: self.id,
                            requested: lease.addr,
                            server: Some(lease.server),
                        }),
                        DHCP_WIRE_SIZE,
                    ),
                );
                self.arm_at(ctx, lease.rebind_at(), TIMER_REBIND);
            }
            (TIMER_REBIND, DhcpState::Renewing) => {
                let Some(lease) = self.lease else {
                    return;
                };
                self.state = DhcpState::Rebinding;
                debug!("{} rebinding {}", self.id, lease.addr);
                ctx.send_on(
                    self.iface,
                    Packet::broadcast(
                        Payload::Dhcp(DhcpMessage::Request {
                            client: self.id,
                            requested: lease.addr,
                            server: None,
                        }),
                        DHCP_WIRE_SIZE,
                    ),
                );
                self.arm_at(ctx, lease.expires_at(), TIMER_EXPIRE);
            }
            (TIMER_EXPIRE, DhcpState::Rebinding) => {
                info!("{} lease expired", self.id);
                self.enter_init(ctx);
                self.send_discover(ctx);
            }
            // A timer from a state we already left.
            _ => {}
        }
    }

    fn on_packet(&mut self, ctx: &mut Context<'_>, packet: &Packet) {
        if !self.running {
            return;
        }
        let Payload::Dhcp(message) = &packet.payload else {
            return;
        };
        match *message {
            DhcpMessage::Offer { server, addr, .. } => self.handle_offer(ctx, server, addr),
            DhcpMessage::Ack {
                server,
                addr,
                mask,
                gateway,
                lease,
            } => self.handle_ack(ctx, server, addr, mask, gateway, lease),
            DhcpMessage::Nak { ref reason } => self.handle_nak(ctx, reason),
            // Other clients' broadcasts.
            DhcpMessage::Discover { .. }
            | DhcpMessage::Request { .. }
            | DhcpMessage::Release { .. } => {}
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
