//! Static address reservations alongside a dynamic pool.
//!
//! A reservation pins an address to a specific interface outside the DHCP
//! protocol entirely: the node never discovers or renews, it simply has the
//! address from the start. Reservations must not collide with the dynamic
//! allocation range, since the pool would otherwise hand the same address
//! to a lease.

use std::net::Ipv4Addr;

use crate::dhcp::pool::AddressPool;
use crate::error::{Error, Result};
use crate::net::node::InterfaceConfig;
use crate::net::{Network, NodeId};

#[derive(Debug, Clone, Copy)]
pub struct StaticReservation {
    pub addr: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl StaticReservation {
    pub fn new(addr: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self { addr, mask }
    }

    /// Rejects reservations that fall inside the pool's dynamic range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservationCollision`] on overlap.
    pub fn validate_against(&self, pool: &AddressPool) -> Result<()> {
        if pool.contains(self.addr) {
            return Err(Error::ReservationCollision(self.addr));
        }
        Ok(())
    }

    /// Configures the reserved address on an interface. `forwarding` marks
    /// the node as a router at the same time, the common case for reserved
    /// addresses.
    pub fn apply(
        &self,
        net: &mut Network,
        node: NodeId,
        iface: usize,
        forwarding: bool,
    ) -> Result<()> {
        net.assign(node, iface, InterfaceConfig::new(self.addr, self.mask))?;
        net.set_forwarding(node, forwarding);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MASK_8: Ipv4Addr = Ipv4Addr::new(255, 0, 0, 0);

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    fn pool() -> AddressPool {
        AddressPool::new(addr(0), MASK_8, addr(1), addr(15), []).unwrap()
    }

    #[test]
    fn test_reservation_outside_range_is_valid() {
        let reservation = StaticReservation::new(addr(17), MASK_8);
        assert!(reservation.validate_against(&pool()).is_ok());
    }

    #[test]
    fn test_reservation_inside_range_collides() {
        let reservation = StaticReservation::new(addr(5), MASK_8);
        assert!(matches!(
            reservation.validate_against(&pool()),
            Err(Error::ReservationCollision(_))
        ));
    }

    #[test]
    fn test_apply_configures_interface_and_forwarding() {
        let mut net = Network::new();
        let router = net.add_node("r1");
        net.add_shared_segment(Duration::from_millis(2), &[router]);

        let reservation = StaticReservation::new(addr(17), MASK_8);
        reservation.apply(&mut net, router, 0, true).unwrap();

        assert_eq!(net.nodes[router].addr(0), Some(addr(17)));
        assert!(net.nodes[router].forwarding);
    }
}
