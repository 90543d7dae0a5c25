//! Lease records and the server-side lease table.
//!
//! A lease moves OFFERED → BOUND → (EXPIRED | RELEASED). Offered records
//! carry a short confirmation deadline; bound records carry the renewal (T1)
//! and rebind (T2) deadlines plus full expiry, all on the simulated clock.
//! Expired and released records leave the table and land in the grant
//! archive, which exists so a finished run can be audited address by address.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::dhcp::ClientId;
use crate::sim::time::SimTime;

/// Renewal fires at this fraction of the lease duration.
pub const T1_FRACTION: f64 = 0.5;

/// Rebind fires at this fraction of the lease duration.
pub const T2_FRACTION: f64 = 0.875;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Offered,
    Bound,
    Expired,
    Released,
}

impl std::fmt::Display for LeaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LeaseState::Offered => "OFFERED",
            LeaseState::Bound => "BOUND",
            LeaseState::Expired => "EXPIRED",
            LeaseState::Released => "RELEASED",
        };
        f.write_str(label)
    }
}

/// One client's lease.
#[derive(Debug, Clone)]
pub struct LeaseRecord {
    pub client: ClientId,
    pub addr: Ipv4Addr,
    pub state: LeaseState,
    pub start: SimTime,
    pub duration: Duration,
    /// T1 deadline (renewal).
    pub renew_at: SimTime,
    /// T2 deadline (rebind).
    pub rebind_at: SimTime,
    pub expires_at: SimTime,
}

impl LeaseRecord {
    /// A fresh OFFERED record. `confirm_within` bounds how long the offer
    /// holds before the sweep reclaims it.
    pub fn offered(
        client: ClientId,
        addr: Ipv4Addr,
        now: SimTime,
        duration: Duration,
        confirm_within: Duration,
    ) -> Self {
        Self {
            client,
            addr,
            state: LeaseState::Offered,
            start: now,
            duration,
            renew_at: now,
            rebind_at: now,
            expires_at: now + confirm_within,
        }
    }

    /// Binds (or re-binds on renewal): lease start moves to `now` and the
    /// T1/T2/expiry deadlines are recomputed from the duration.
    pub fn bind(&mut self, now: SimTime, duration: Duration) {
        self.state = LeaseState::Bound;
        self.start = now;
        self.duration = duration;
        self.renew_at = now + duration.mul_f64(T1_FRACTION);
        self.rebind_at = now + duration.mul_f64(T2_FRACTION);
        self.expires_at = now + duration;
    }

    /// True once the record's deadline has passed (confirmation deadline for
    /// offers, full expiry for bound leases).
    pub fn is_due(&self, now: SimTime) -> bool {
        now >= self.expires_at
    }
}

/// The server's lease table: one live record per client.
#[derive(Debug, Default)]
pub struct LeaseTable {
    by_client: HashMap<ClientId, LeaseRecord>,
    archive: Vec<LeaseRecord>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, client: ClientId) -> Option<&LeaseRecord> {
        self.by_client.get(&client)
    }

    pub fn get_mut(&mut self, client: ClientId) -> Option<&mut LeaseRecord> {
        self.by_client.get_mut(&client)
    }

    /// Inserts an OFFERED record, replacing any previous record for the
    /// same client.
    pub fn insert_offer(&mut self, record: LeaseRecord) {
        debug_assert!(
            !self
                .by_client
                .values()
                .any(|other| other.addr == record.addr && other.client != record.client),
            "two live lease records for one address"
        );
        self.by_client.insert(record.client, record);
    }

    /// Archives a committed grant so the run can be audited afterwards.
    pub fn archive_grant(&mut self, record: LeaseRecord) {
        self.archive.push(record);
    }

    /// Removes the client's record, marking it RELEASED. Returns the
    /// released address.
    pub fn mark_released(&mut self, client: ClientId) -> Option<Ipv4Addr> {
        let mut record = self.by_client.remove(&client)?;
        record.state = LeaseState::Released;
        let addr = record.addr;
        self.archive.push(record);
        Some(addr)
    }

    /// Removes every record whose deadline has passed, marking it EXPIRED.
    /// Returns the removed records so the caller can return their addresses
    /// to the pool.
    pub fn expire_due(&mut self, now: SimTime) -> Vec<LeaseRecord> {
        let due: Vec<ClientId> = self
            .by_client
            .values()
            .filter(|record| record.is_due(now))
            .map(|record| record.client)
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for client in due {
            if let Some(mut record) = self.by_client.remove(&client) {
                record.state = LeaseState::Expired;
                self.archive.push(record.clone());
                expired.push(record);
            }
        }
        expired.sort_by_key(|record| record.addr);
        expired
    }

    /// Live records (offered and bound).
    pub fn live(&self) -> impl Iterator<Item = &LeaseRecord> {
        self.by_client.values()
    }

    pub fn bound_count(&self) -> usize {
        self.by_client
            .values()
            .filter(|record| record.state == LeaseState::Bound)
            .count()
    }

    /// Every grant ever committed plus expired/released records.
    pub fn archive(&self) -> &[LeaseRecord] {
        &self.archive
    }

    pub fn len(&self) -> usize {
        self.by_client.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_client.is_empty()
    }
}
