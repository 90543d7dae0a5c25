//! The dynamic address pool.
//!
//! The pool tracks a contiguous allocation range inside a network, a fixed
//! exclusion set, and the current claim on every address. Free addresses
//! live in a `BTreeSet` so allocation is deterministic first-fit; a client
//! that held an address before is handed the same one again while it is
//! still free (sticky allocation).

use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;

use crate::dhcp::ClientId;
use crate::error::{Error, Result};

/// Allocation state for one server's address range.
#[derive(Debug)]
pub struct AddressPool {
    network: Ipv4Addr,
    mask: Ipv4Addr,
    range_start: Ipv4Addr,
    range_end: Ipv4Addr,
    excluded: BTreeSet<Ipv4Addr>,
    free: BTreeSet<Ipv4Addr>,
    /// Live claims (offered or bound), by address.
    claimed: HashMap<Ipv4Addr, ClientId>,
    /// Reverse of `claimed`.
    by_client: HashMap<ClientId, Ipv4Addr>,
    /// Last address each client held, for sticky allocation.
    last_held: HashMap<ClientId, Ipv4Addr>,
}

fn in_network(addr: Ipv4Addr, network: Ipv4Addr, mask: Ipv4Addr) -> bool {
    u32::from(addr) & u32::from(mask) == u32::from(network) & u32::from(mask)
}

impl AddressPool {
    /// Builds a pool over `[range_start, range_end]` within `network`.
    ///
    /// Exclusions are fixed here and never handed out; excluded addresses
    /// outside the range are accepted silently (they were never allocatable
    /// to begin with).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the range is reversed, or
    /// [`Error::AddressOutOfRange`] when a range bound falls outside the
    /// network.
    pub fn new(
        network: Ipv4Addr,
        mask: Ipv4Addr,
        range_start: Ipv4Addr,
        range_end: Ipv4Addr,
        excluded: impl IntoIterator<Item = Ipv4Addr>,
    ) -> Result<Self> {
        if u32::from(range_start) > u32::from(range_end) {
            return Err(Error::InvalidConfig(
                "allocation range start must not exceed range end".to_string(),
            ));
        }
        for bound in [range_start, range_end] {
            if !in_network(bound, network, mask) {
                return Err(Error::AddressOutOfRange(bound));
            }
        }

        let excluded: BTreeSet<Ipv4Addr> = excluded.into_iter().collect();
        let mut free = BTreeSet::new();
        for raw in u32::from(range_start)..=u32::from(range_end) {
            let addr = Ipv4Addr::from(raw);
            if !excluded.contains(&addr) {
                free.insert(addr);
            }
        }

        Ok(Self {
            network,
            mask,
            range_start,
            range_end,
            excluded,
            free,
            claimed: HashMap::new(),
            by_client: HashMap::new(),
            last_held: HashMap::new(),
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn mask(&self) -> Ipv4Addr {
        self.mask
    }

    /// True if `addr` lies inside the allocation range.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        (u32::from(self.range_start)..=u32::from(self.range_end)).contains(&u32::from(addr))
    }

    pub fn is_excluded(&self, addr: Ipv4Addr) -> bool {
        self.excluded.contains(&addr)
    }

    /// Picks an address for a client without claiming it.
    ///
    /// Selection order: the client's outstanding claim (re-offer), the
    /// address it held last time if still free, then the lowest free
    /// address. Returns `None` when the pool is exhausted.
    pub fn allocate(&self, client: ClientId) -> Option<Ipv4Addr> {
        if let Some(&addr) = self.by_client.get(&client) {
            return Some(addr);
        }
        if let Some(&previous) = self.last_held.get(&client)
            && self.free.contains(&previous)
        {
            return Some(previous);
        }
        self.free.first().copied()
    }

    /// Marks an address OFFERED for a client. Reversible via [`release`].
    ///
    /// [`release`]: AddressPool::release
    ///
    /// # Errors
    ///
    /// Returns [`Error::AddressOutOfRange`] for addresses outside the range
    /// or in the exclusion set, and [`Error::Conflict`] when another client
    /// already claims the address.
    pub fn reserve_tentative(&mut self, addr: Ipv4Addr, client: ClientId) -> Result<()> {
        if !self.contains(addr) || self.is_excluded(addr) {
            return Err(Error::AddressOutOfRange(addr));
        }
        match self.claimed.get(&addr) {
            Some(&holder) if holder == client => Ok(()),
            Some(_) => Err(Error::Conflict { addr, client }),
            None => {
                self.free.remove(&addr);
                self.claimed.insert(addr, client);
                self.by_client.insert(client, addr);
                Ok(())
            }
        }
    }

    /// Promotes a claim to BOUND for lease-commit purposes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when the address is not currently
    /// reserved for that client.
    pub fn commit(&mut self, addr: Ipv4Addr, client: ClientId) -> Result<()> {
        match self.claimed.get(&addr) {
            Some(&holder) if holder == client => {
                self.last_held.insert(client, addr);
                Ok(())
            }
            _ => Err(Error::Conflict { addr, client }),
        }
    }

    /// Returns an address to the free set unconditionally.
    pub fn release(&mut self, addr: Ipv4Addr) {
        if let Some(client) = self.claimed.remove(&addr) {
            self.by_client.remove(&client);
        }
        if self.contains(addr) && !self.is_excluded(addr) {
            self.free.insert(addr);
        }
    }

    /// The client currently claiming `addr`, if any.
    pub fn holder(&self, addr: Ipv4Addr) -> Option<ClientId> {
        self.claimed.get(&addr).copied()
    }

    /// The address currently claimed by `client`, if any.
    pub fn claimed_by(&self, client: ClientId) -> Option<Ipv4Addr> {
        self.by_client.get(&client).copied()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
