//! Simulated packets.
//!
//! Packets are transport-agnostic: a source and destination address, a typed
//! payload, and a nominal wire size used by sinks and traces. Link-level
//! metadata (the transmitting tap) is filled in by the channel on delivery so
//! receivers can reply without an address of their own, which is how DHCP
//! replies reach a client that is still unconfigured.

use std::net::Ipv4Addr;

use crate::dhcp::DhcpMessage;
use crate::net::channel::Tap;

/// The payload carried by a simulated packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A DHCP protocol message.
    Dhcp(DhcpMessage),
    /// Echo request (UDP-echo-style traffic).
    EchoRequest { seq: u32 },
    /// Echo reply.
    EchoReply { seq: u32 },
    /// Opaque stream data from an on-off generator.
    Stream { seq: u64 },
}

impl Payload {
    /// Short label for traces and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Dhcp(message) => message.kind(),
            Payload::EchoRequest { .. } => "echo-request",
            Payload::EchoReply { .. } => "echo-reply",
            Payload::Stream { .. } => "stream",
        }
    }
}

/// A packet in flight on a simulated channel.
#[derive(Debug, Clone)]
pub struct Packet {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub payload: Payload,
    /// Nominal size in bytes, for sinks and traces.
    pub size: usize,
    /// The tap this packet was last transmitted from. Set by the channel,
    /// not by senders.
    pub link_src: Option<Tap>,
}

impl Packet {
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, payload: Payload, size: usize) -> Self {
        Self {
            src,
            dst,
            payload,
            size,
            link_src: None,
        }
    }

    /// Builds a broadcast packet from an unconfigured source.
    pub fn broadcast(payload: Payload, size: usize) -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST, payload, size)
    }

    pub fn is_broadcast(&self) -> bool {
        self.dst == Ipv4Addr::BROADCAST
    }
}
