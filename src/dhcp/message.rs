//! DHCP protocol messages.
//!
//! Messages are transport-agnostic: just the conceptual fields, carried as a
//! packet payload over the simulated channels. Only the options the protocol
//! core needs exist here (address, mask, gateway, lease time, server
//! identifier).

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Stable client identity, independent of any transport address.
///
/// Plays the role of the hardware address in the real protocol: it survives
/// the client having no IP address at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{:02x}", self.0)
    }
}

/// Nominal on-the-wire size of a DHCP message, for traces and sinks.
pub const DHCP_WIRE_SIZE: usize = 300;

/// The six message types of the allocation protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum DhcpMessage {
    /// Client broadcast looking for servers.
    Discover { client: ClientId },
    /// Server's tentative assignment.
    Offer {
        server: Ipv4Addr,
        addr: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        lease: Duration,
    },
    /// Client confirming an offer, renewing, or rebinding. `server` is set
    /// when the request targets one specific server.
    Request {
        client: ClientId,
        requested: Ipv4Addr,
        server: Option<Ipv4Addr>,
    },
    /// Server committing the lease.
    Ack {
        server: Ipv4Addr,
        addr: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        lease: Duration,
    },
    /// Server refusing a request.
    Nak { reason: String },
    /// Client returning its address.
    Release { client: ClientId, addr: Ipv4Addr },
}

impl DhcpMessage {
    /// Short label for traces and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DhcpMessage::Discover { .. } => "dhcp-discover",
            DhcpMessage::Offer { .. } => "dhcp-offer",
            DhcpMessage::Request { .. } => "dhcp-request",
            DhcpMessage::Ack { .. } => "dhcp-ack",
            DhcpMessage::Nak { .. } => "dhcp-nak",
            DhcpMessage::Release { .. } => "dhcp-release",
        }
    }
}
