use std::collections::HashMap;
use std::net::Ipv4Addr;

use proptest::prelude::*;

use simlan::dhcp::{AddressPool, ClientId};

const NETWORK: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 0);
const MASK: Ipv4Addr = Ipv4Addr::new(255, 0, 0, 0);
const RANGE_START: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const RANGE_END: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 30);
const EXCLUDED: [Ipv4Addr; 3] = [
    Ipv4Addr::new(10, 0, 0, 1),
    Ipv4Addr::new(10, 0, 0, 12),
    Ipv4Addr::new(10, 0, 0, 25),
];

#[derive(Debug, Clone)]
enum Op {
    /// Allocate and tentatively reserve for a client.
    Claim(u64),
    /// Commit whatever the client currently claims.
    Commit(u64),
    /// Release whatever the client currently claims.
    Release(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..8).prop_map(Op::Claim),
        (0u64..8).prop_map(Op::Commit),
        (0u64..8).prop_map(Op::Release),
    ]
}

fn fresh_pool() -> AddressPool {
    AddressPool::new(NETWORK, MASK, RANGE_START, RANGE_END, EXCLUDED)
        .expect("static pool parameters are valid")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// No two clients ever hold the same address at the same time, no
    /// matter the interleaving of claims, commits, and releases.
    #[test]
    fn claims_stay_unique(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut pool = fresh_pool();
        let mut held: HashMap<u64, Ipv4Addr> = HashMap::new();

        for op in ops {
            match op {
                Op::Claim(id) => {
                    let client = ClientId(id);
                    if let Some(addr) = pool.allocate(client) {
                        pool.reserve_tentative(addr, client).expect("fresh allocation is reservable");
                        held.insert(id, addr);
                    }
                }
                Op::Commit(id) => {
                    if let Some(&addr) = held.get(&id) {
                        pool.commit(addr, ClientId(id)).expect("held claim is committable");
                    }
                }
                Op::Release(id) => {
                    if let Some(addr) = held.remove(&id) {
                        pool.release(addr);
                    }
                }
            }

            let mut seen = std::collections::HashSet::new();
            for (&id, &addr) in &held {
                prop_assert!(seen.insert(addr), "{} held by two clients", addr);
                prop_assert_eq!(pool.holder(addr), Some(ClientId(id)));
            }
        }
    }

    /// Every address the pool ever hands out lies inside the configured
    /// range and outside the exclusion set.
    #[test]
    fn allocations_respect_range_and_exclusions(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut pool = fresh_pool();
        let mut held: HashMap<u64, Ipv4Addr> = HashMap::new();

        for op in ops {
            match op {
                Op::Claim(id) => {
                    let client = ClientId(id);
                    if let Some(addr) = pool.allocate(client) {
                        prop_assert!(pool.contains(addr), "{addr} outside the range");
                        prop_assert!(!EXCLUDED.contains(&addr), "{addr} is excluded");
                        pool.reserve_tentative(addr, client).expect("fresh allocation is reservable");
                        held.insert(id, addr);
                    }
                }
                Op::Commit(id) => {
                    if let Some(&addr) = held.get(&id) {
                        pool.commit(addr, ClientId(id)).expect("held claim is committable");
                    }
                }
                Op::Release(id) => {
                    if let Some(addr) = held.remove(&id) {
                        pool.release(addr);
                    }
                }
            }
        }
    }

    /// Exhaustion is exact: with every in-range non-excluded address
    /// claimed, allocation for a new client yields nothing, and one
    /// release makes it succeed again.
    #[test]
    fn exhaustion_recovers_after_release(release_pick in 0usize..27) {
        let mut pool = fresh_pool();
        let mut held = Vec::new();
        for id in 0u64.. {
            let client = ClientId(id);
            match pool.allocate(client) {
                Some(addr) => {
                    pool.reserve_tentative(addr, client).expect("fresh allocation is reservable");
                    held.push(addr);
                }
                None => break,
            }
        }
        // 30 addresses in range, 3 excluded.
        prop_assert_eq!(held.len(), 27);
        prop_assert_eq!(pool.allocate(ClientId(1000)), None);

        let released = held[release_pick % held.len()];
        pool.release(released);
        prop_assert_eq!(pool.allocate(ClientId(1000)), Some(released));
    }
}
