//! Global routing-table population.
//!
//! After every statically known address has been assigned, [`populate_routing_tables`]
//! walks the topology once and installs, on each node, a route to every remote
//! network via the nearest forwarding neighbor. Dynamically configured
//! interfaces (DHCP clients) are covered at lookup time instead: a connected
//! network always matches directly, and the interface gateway serves as the
//! default route.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::net::Ipv4Addr;

use crate::net::{Network, NodeId};

/// A single routing-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Destination network (already masked).
    pub dest: Ipv4Addr,
    pub mask: Ipv4Addr,
    /// Egress interface index on the owning node.
    pub iface: usize,
    /// Next hop on the egress channel, or `None` when directly connected.
    pub next_hop: Option<Ipv4Addr>,
}

impl Route {
    pub fn matches(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & u32::from(self.mask) == u32::from(self.dest)
    }
}

/// True if any configured interface of `node` sits on `(dest, mask)`.
fn attaches(net: &Network, node: NodeId, dest: Ipv4Addr, mask: Ipv4Addr) -> bool {
    net.nodes[node].interfaces.iter().any(|interface| {
        interface
            .config
            .is_some_and(|config| u32::from(config.addr) & u32::from(mask) == u32::from(dest))
    })
}

/// Breadth-first search for a route from `from` to the network `(dest, mask)`.
///
/// Only forwarding nodes may appear past the first hop, and the first hop
/// must have an address on the shared channel so it can be targeted at the
/// link level.
fn find_route(net: &Network, from: NodeId, dest: Ipv4Addr, mask: Ipv4Addr) -> Option<Route> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    visited.insert(from);
    let mut queue: VecDeque<(NodeId, Option<(usize, Ipv4Addr)>)> = VecDeque::new();
    queue.push_back((from, None));

    while let Some((node, first_hop)) = queue.pop_front() {
        if node != from {
            if !net.nodes[node].forwarding {
                continue;
            }
            if attaches(net, node, dest, mask) {
                let (iface, next_hop) = first_hop?;
                return Some(Route {
                    dest,
                    mask,
                    iface,
                    next_hop: Some(next_hop),
                });
            }
        }
        for (iface_index, interface) in net.nodes[node].interfaces.iter().enumerate() {
            for &tap in net.channels[interface.channel].taps() {
                if tap.node == node || visited.contains(&tap.node) {
                    continue;
                }
                let hop = match first_hop {
                    Some(hop) => Some(hop),
                    None => net.nodes[tap.node]
                        .addr(tap.iface)
                        .map(|addr| (iface_index, addr)),
                };
                // An unaddressed neighbor cannot serve as a next hop.
                let Some(hop) = hop else { continue };
                visited.insert(tap.node);
                queue.push_back((tap.node, Some(hop)));
            }
        }
    }
    None
}

/// Installs routes on every node for every network known at call time.
///
/// Call it once after all static addresses are assigned and forwarding
/// flags are set; dynamically assigned hosts reach off-segment networks
/// through their interface gateway instead.
pub fn populate_routing_tables(net: &mut Network) {
    let mut networks: BTreeSet<(u32, u32)> = BTreeSet::new();
    for node in &net.nodes {
        for interface in &node.interfaces {
            if let Some(config) = interface.config {
                networks.insert((u32::from(config.network()), u32::from(config.mask)));
            }
        }
    }

    for node_id in 0..net.nodes.len() {
        let mut routes = Vec::new();
        for &(dest, mask) in &networks {
            let dest = Ipv4Addr::from(dest);
            let mask = Ipv4Addr::from(mask);
            if attaches(net, node_id, dest, mask) {
                continue;
            }
            if let Some(route) = find_route(net, node_id, dest, mask) {
                routes.push(route);
            }
        }
        net.nodes[node_id].routes = routes;
    }
}
