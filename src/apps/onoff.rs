//! Constant-rate on/off traffic and its receiving sink.
//!
//! The sender alternates ON and OFF periods; during an ON period it emits
//! fixed-size packets at the interval implied by the configured data rate.
//! An OFF period of zero keeps the sender on permanently.

use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::info;

use crate::net::packet::{Packet, Payload};
use crate::sim::event::TimerHandle;
use crate::sim::{Application, Context};

const TIMER_PACKET: u64 = 1;
const TIMER_TOGGLE: u64 = 2;

/// Counts stream packets and bytes delivered to its node.
#[derive(Default)]
pub struct PacketSink {
    packets: u64,
    bytes: u64,
}

impl PacketSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Application for PacketSink {
    fn start(&mut self, _ctx: &mut Context<'_>) {}

    fn stop(&mut self, _ctx: &mut Context<'_>) {
        info!("sink received {} packets, {} bytes", self.packets, self.bytes);
    }

    fn on_packet(&mut self, _ctx: &mut Context<'_>, packet: &Packet) {
        if matches!(packet.payload, Payload::Stream { .. }) {
            self.packets += 1;
            self.bytes += packet.size as u64;
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Emits `packet_size`-byte packets at `data_rate_bps` toward `remote`
/// while ON.
pub struct OnOffSender {
    iface: usize,
    remote: Ipv4Addr,
    packet_size: usize,
    data_rate_bps: u64,
    on_time: Duration,
    off_time: Duration,
    on: bool,
    running: bool,
    seq: u64,
    sent_bytes: u64,
    packet_timer: Option<TimerHandle>,
}

impl OnOffSender {
    pub fn new(
        iface: usize,
        remote: Ipv4Addr,
        packet_size: usize,
        data_rate_bps: u64,
        on_time: Duration,
        off_time: Duration,
    ) -> Self {
        Self {
            iface,
            remote,
            packet_size,
            data_rate_bps,
            on_time,
            off_time,
            on: false,
            running: false,
            seq: 0,
            sent_bytes: 0,
            packet_timer: None,
        }
    }

    pub fn sent_packets(&self) -> u64 {
        self.seq
    }

    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes
    }

    /// Gap between packet starts at the configured rate.
    fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.packet_size as f64 * 8.0 / self.data_rate_bps as f64)
    }

    fn send_packet(&mut self, ctx: &mut Context<'_>) {
        let src = ctx.iface_addr(self.iface).unwrap_or(Ipv4Addr::UNSPECIFIED);
        let packet = Packet::new(
            src,
            self.remote,
            Payload::Stream { seq: self.seq },
            self.packet_size,
        );
        self.seq += 1;
        self.sent_bytes += self.packet_size as u64;
        ctx.send_routed(packet);
        self.packet_timer = Some(ctx.arm_timer_in(self.interval(), TIMER_PACKET));
    }

    fn begin_on(&mut self, ctx: &mut Context<'_>) {
        self.on = true;
        if !self.off_time.is_zero() {
            ctx.arm_timer_in(self.on_time, TIMER_TOGGLE);
        }
        self.send_packet(ctx);
    }

    fn begin_off(&mut self, ctx: &mut Context<'_>) {
        self.on = false;
        if let Some(timer) = self.packet_timer.take() {
            ctx.cancel_timer(timer);
        }
        ctx.arm_timer_in(self.off_time, TIMER_TOGGLE);
    }
}

impl Application for OnOffSender {
    fn start(&mut self, ctx: &mut Context<'_>) {
        self.running = true;
        self.seq = 0;
        self.sent_bytes = 0;
        self.begin_on(ctx);
    }

    fn stop(&mut self, ctx: &mut Context<'_>) {
        self.running = false;
        self.on = false;
        if let Some(timer) = self.packet_timer.take() {
            ctx.cancel_timer(timer);
        }
        info!(
            "on-off sender to {}: {} packets, {} bytes",
            self.remote, self.seq, self.sent_bytes
        );
    }

    fn on_timer(&mut self, ctx: &mut Context<'_>, token: u64) {
        if !self.running {
            return;
        }
        match token {
            TIMER_PACKET if self.on => self.send_packet(ctx),
            TIMER_TOGGLE => {
                if self.on {
                    self.begin_off(ctx);
                } else {
                    self.begin_on(ctx);
                }
            }
            _ => {}
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
