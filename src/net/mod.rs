//! The simulated network: nodes, channels, addresses, and link delivery.
//!
//! The network is pure topology and state; it never advances time itself.
//! Transmissions are scheduled onto the event queue and arrive as `Deliver`
//! events after the channel delay.

pub mod channel;
pub mod node;
pub mod packet;
pub mod routing;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::net::channel::{Channel, Tap};
use crate::net::node::{Interface, InterfaceConfig, Node};
use crate::net::packet::Packet;
use crate::sim::event::{EventKind, EventQueue};
use crate::trace::Tracer;

pub type NodeId = usize;
pub type ChannelId = usize;

/// Topology plus address state.
#[derive(Debug, Default)]
pub struct Network {
    pub nodes: Vec<Node>,
    pub channels: Vec<Channel>,
    addr_map: HashMap<Ipv4Addr, Tap>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str) -> NodeId {
        self.nodes.push(Node {
            name: name.to_string(),
            ..Default::default()
        });
        self.nodes.len() - 1
    }

    /// Creates a shared-medium segment and attaches a fresh interface on
    /// every member node. Returns the channel id.
    pub fn add_shared_segment(&mut self, delay: Duration, members: &[NodeId]) -> ChannelId {
        let channel = self.channels.len();
        let mut taps = Vec::with_capacity(members.len());
        for &node in members {
            let iface = self.nodes[node].interfaces.len();
            self.nodes[node].interfaces.push(Interface {
                channel,
                config: None,
            });
            taps.push(Tap { node, iface });
        }
        self.channels.push(Channel::Shared { delay, taps });
        channel
    }

    /// Creates a point-to-point link between two nodes, attaching a fresh
    /// interface on each end.
    pub fn add_p2p_link(&mut self, a: NodeId, b: NodeId, delay: Duration) -> ChannelId {
        let channel = self.channels.len();
        let iface_a = self.nodes[a].interfaces.len();
        self.nodes[a].interfaces.push(Interface {
            channel,
            config: None,
        });
        let iface_b = self.nodes[b].interfaces.len();
        self.nodes[b].interfaces.push(Interface {
            channel,
            config: None,
        });
        self.channels.push(Channel::PointToPoint {
            delay,
            ends: [Tap { node: a, iface: iface_a }, Tap { node: b, iface: iface_b }],
        });
        channel
    }

    /// Index of the interface `node` has on `channel`, if attached.
    pub fn iface_on(&self, node: NodeId, channel: ChannelId) -> Option<usize> {
        self.nodes[node]
            .interfaces
            .iter()
            .position(|interface| interface.channel == channel)
    }

    /// Applies an address configuration to an interface. Address, mask, and
    /// gateway land in a single assignment.
    pub fn assign(&mut self, node: NodeId, iface: usize, config: InterfaceConfig) -> Result<()> {
        if let Some(&tap) = self.addr_map.get(&config.addr)
            && !(tap.node == node && tap.iface == iface)
        {
            return Err(Error::AddressInUse(config.addr));
        }
        let interface = self
            .nodes
            .get_mut(node)
            .and_then(|n| n.interfaces.get_mut(iface))
            .ok_or_else(|| Error::Topology(format!("no interface {iface} on node {node}")))?;
        if let Some(previous) = interface.config.take() {
            self.addr_map.remove(&previous.addr);
        }
        interface.config = Some(config);
        self.addr_map.insert(config.addr, Tap { node, iface });
        Ok(())
    }

    /// Removes any address configuration from an interface.
    pub fn clear(&mut self, node: NodeId, iface: usize) {
        if let Some(interface) = self
            .nodes
            .get_mut(node)
            .and_then(|n| n.interfaces.get_mut(iface))
            && let Some(previous) = interface.config.take()
        {
            self.addr_map.remove(&previous.addr);
        }
    }

    pub fn set_forwarding(&mut self, node: NodeId, enabled: bool) {
        self.nodes[node].forwarding = enabled;
    }

    /// Resolves an address to its owning tap.
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<Tap> {
        self.addr_map.get(&addr).copied()
    }

    /// Assigns consecutive addresses starting at `first` to every tap of a
    /// channel, in attach order. Returns the addresses in the same order.
    pub fn assign_sequential(
        &mut self,
        channel: ChannelId,
        first: Ipv4Addr,
        mask: Ipv4Addr,
    ) -> Result<Vec<Ipv4Addr>> {
        let taps: Vec<Tap> = self.channels[channel].taps().to_vec();
        let mut next = u32::from(first);
        let mut assigned = Vec::with_capacity(taps.len());
        for tap in taps {
            let addr = Ipv4Addr::from(next);
            self.assign(tap.node, tap.iface, InterfaceConfig::new(addr, mask))?;
            assigned.push(addr);
            next += 1;
        }
        Ok(assigned)
    }

    /// True if the packet should be handed to this node's applications.
    pub fn local_delivery(&self, node: NodeId, packet: &Packet) -> bool {
        packet.is_broadcast() || self.nodes[node].has_addr(packet.dst)
    }

    fn tap_for(&self, channel: ChannelId, addr: Ipv4Addr) -> Option<Tap> {
        self.channels[channel]
            .taps()
            .iter()
            .copied()
            .find(|tap| self.nodes[tap.node].addr(tap.iface) == Some(addr))
    }

    /// Puts a packet on the channel behind `from`. The link-level target is
    /// `link_dst` when set (a next hop), otherwise the packet destination;
    /// broadcast reaches every other tap on the channel.
    pub(crate) fn transmit(
        &self,
        queue: &mut EventQueue,
        trace: &mut Tracer,
        from: Tap,
        mut packet: Packet,
        link_dst: Option<Ipv4Addr>,
    ) {
        let channel_id = self.nodes[from.node].interfaces[from.iface].channel;
        let channel = &self.channels[channel_id];
        packet.link_src = Some(from);
        trace.record(queue.now(), from.node, "tx", &packet);

        let target = link_dst.unwrap_or(packet.dst);
        if target == Ipv4Addr::BROADCAST {
            for &tap in channel.taps() {
                if tap != from {
                    queue.schedule_in(
                        channel.delay(),
                        EventKind::Deliver {
                            node: tap.node,
                            packet: packet.clone(),
                        },
                    );
                }
            }
        } else {
            match self.tap_for(channel_id, target) {
                Some(tap) => {
                    queue.schedule_in(
                        channel.delay(),
                        EventKind::Deliver {
                            node: tap.node,
                            packet,
                        },
                    );
                }
                None => {
                    debug!(
                        "{} cannot resolve {} on channel {}, dropping {}",
                        self.nodes[from.node].name,
                        target,
                        channel_id,
                        packet.payload.kind()
                    );
                    trace.record(queue.now(), from.node, "drop", &packet);
                }
            }
        }
    }

    /// Delivers a packet straight to a known tap on the same channel as
    /// `from`. Used for link-level replies to unconfigured peers.
    pub(crate) fn transmit_to(
        &self,
        queue: &mut EventQueue,
        trace: &mut Tracer,
        from: Tap,
        to: Tap,
        mut packet: Packet,
    ) {
        let channel_id = self.nodes[from.node].interfaces[from.iface].channel;
        let delay = self.channels[channel_id].delay();
        packet.link_src = Some(from);
        trace.record(queue.now(), from.node, "tx", &packet);
        queue.schedule_in(
            delay,
            EventKind::Deliver {
                node: to.node,
                packet,
            },
        );
    }

    /// Picks an egress for `packet.dst` on `node` and transmits.
    ///
    /// Resolution order: a connected network where the destination is
    /// actually present on the channel, then the longest-prefix static
    /// route, then the default route through an interface gateway.
    pub(crate) fn route_and_send(
        &self,
        queue: &mut EventQueue,
        trace: &mut Tracer,
        node: NodeId,
        packet: Packet,
    ) -> bool {
        for (index, interface) in self.nodes[node].interfaces.iter().enumerate() {
            if let Some(config) = interface.config
                && u32::from(packet.dst) & u32::from(config.mask) == u32::from(config.network())
                && self.tap_for(interface.channel, packet.dst).is_some()
            {
                self.transmit(queue, trace, Tap { node, iface: index }, packet, None);
                return true;
            }
        }

        let best = self.nodes[node]
            .routes
            .iter()
            .filter(|route| route.matches(packet.dst))
            .max_by_key(|route| u32::from(route.mask));
        if let Some(route) = best {
            self.transmit(
                queue,
                trace,
                Tap { node, iface: route.iface },
                packet,
                route.next_hop,
            );
            return true;
        }

        for (index, interface) in self.nodes[node].interfaces.iter().enumerate() {
            if let Some(config) = interface.config
                && let Some(gateway) = config.gateway
            {
                self.transmit(
                    queue,
                    trace,
                    Tap { node, iface: index },
                    packet,
                    Some(gateway),
                );
                return true;
            }
        }

        debug!(
            "{} has no route to {}, dropping {}",
            self.nodes[node].name,
            packet.dst,
            packet.payload.kind()
        );
        trace.record(queue.now(), node, "drop", &packet);
        false
    }
}
