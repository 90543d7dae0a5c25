//! Request/reply echo traffic.
//!
//! The client sends a fixed number of requests at a fixed interval and
//! counts the replies; the server mirrors every request back to its source.
//! A client whose interface has no address yet (still waiting on DHCP)
//! retries shortly instead of sending from nothing.

use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{debug, info};

use crate::net::packet::{Packet, Payload};
use crate::sim::{Application, Context};

const TIMER_SEND: u64 = 1;

/// How soon an unconfigured client checks its interface again.
const UNCONFIGURED_RETRY: Duration = Duration::from_millis(500);

/// Mirrors every echo request back to its source.
pub struct EchoServer {
    iface: usize,
    replied: u32,
}

impl EchoServer {
    pub fn new(iface: usize) -> Self {
        Self { iface, replied: 0 }
    }

    pub fn replied(&self) -> u32 {
        self.replied
    }
}

impl Application for EchoServer {
    fn start(&mut self, _ctx: &mut Context<'_>) {}

    fn on_packet(&mut self, ctx: &mut Context<'_>, packet: &Packet) {
        let Payload::EchoRequest { seq } = packet.payload else {
            return;
        };
        let Some(own) = ctx.iface_addr(self.iface) else {
            return;
        };
        debug!("echo server answering seq {seq} from {}", packet.src);
        self.replied += 1;
        let reply = Packet::new(own, packet.src, Payload::EchoReply { seq }, packet.size);
        ctx.send_routed(reply);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Sends `max_packets` echo requests and counts the replies.
pub struct EchoClient {
    iface: usize,
    remote: Ipv4Addr,
    max_packets: u32,
    interval: Duration,
    packet_size: usize,
    running: bool,
    sent: u32,
    received: u32,
}

impl EchoClient {
    pub fn new(
        iface: usize,
        remote: Ipv4Addr,
        max_packets: u32,
        interval: Duration,
        packet_size: usize,
    ) -> Self {
        Self {
            iface,
            remote,
            max_packets,
            interval,
            packet_size,
            running: false,
            sent: 0,
            received: 0,
        }
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    fn send_next(&mut self, ctx: &mut Context<'_>) {
        let Some(own) = ctx.iface_addr(self.iface) else {
            debug!("echo client has no address yet, waiting");
            ctx.arm_timer_in(UNCONFIGURED_RETRY, TIMER_SEND);
            return;
        };
        let seq = self.sent;
        self.sent += 1;
        let request = Packet::new(
            own,
            self.remote,
            Payload::EchoRequest { seq },
            self.packet_size,
        );
        ctx.send_routed(request);
        if self.sent < self.max_packets {
            ctx.arm_timer_in(self.interval, TIMER_SEND);
        }
    }
}

impl Application for EchoClient {
    fn start(&mut self, ctx: &mut Context<'_>) {
        self.running = true;
        self.sent = 0;
        self.received = 0;
        self.send_next(ctx);
    }

    fn stop(&mut self, _ctx: &mut Context<'_>) {
        self.running = false;
        info!(
            "echo client to {}: {} sent, {} replies",
            self.remote, self.sent, self.received
        );
    }

    fn on_timer(&mut self, ctx: &mut Context<'_>, token: u64) {
        if self.running && token == TIMER_SEND {
            self.send_next(ctx);
        }
    }

    fn on_packet(&mut self, _ctx: &mut Context<'_>, packet: &Packet) {
        if matches!(packet.payload, Payload::EchoReply { .. }) {
            self.received += 1;
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
