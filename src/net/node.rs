//! Nodes and interfaces.

use std::net::Ipv4Addr;

use crate::net::routing::Route;
use crate::net::ChannelId;
use crate::sim::AppId;

/// The address configuration applied to an interface.
///
/// Address, mask, and gateway are always applied together so dependent
/// traffic generators never observe a half-configured interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub addr: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
}

impl InterfaceConfig {
    pub fn new(addr: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self {
            addr,
            mask,
            gateway: None,
        }
    }

    pub fn with_gateway(addr: Ipv4Addr, mask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self {
            addr,
            mask,
            gateway: Some(gateway),
        }
    }

    /// The network this interface sits on (address masked).
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & u32::from(self.mask))
    }
}

/// One attachment of a node to a channel, optionally configured.
#[derive(Debug)]
pub struct Interface {
    pub channel: ChannelId,
    pub config: Option<InterfaceConfig>,
}

/// A simulated host or router.
#[derive(Debug, Default)]
pub struct Node {
    pub name: String,
    pub interfaces: Vec<Interface>,
    /// Whether this node relays packets not addressed to it.
    pub forwarding: bool,
    pub routes: Vec<Route>,
    pub apps: Vec<AppId>,
}

impl Node {
    pub fn addr(&self, iface: usize) -> Option<Ipv4Addr> {
        self.interfaces
            .get(iface)
            .and_then(|interface| interface.config)
            .map(|config| config.addr)
    }

    /// True if `addr` is assigned to any interface of this node.
    pub fn has_addr(&self, addr: Ipv4Addr) -> bool {
        self.interfaces
            .iter()
            .any(|interface| interface.config.is_some_and(|config| config.addr == addr))
    }
}
