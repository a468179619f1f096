//! # Overlay IP Allocator (§4.7)
//!
//! Allocates addresses from `10.225.0.0/16`, skipping the network address.
//! Allocation for a given machine is serialized by a per-machine
//! `tokio::sync::Mutex` held for the duration of the load-then-pick
//! sequence, matching spec §5's "IP allocation is serialized per machine:
//! two concurrent exchanges targeting the same machine will see disjoint
//! allocations."

use crate::store::Store;
use cilo_protocol::validate::OVERLAY_SUBNET;
use dashmap::DashMap;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const OVERLAY_SIZE: u32 = 1 << 16; // /16

/// The overlay subnet's network address, as a big-endian `u32` — the base
/// every candidate address is computed from. Parsed from the same
/// `OVERLAY_SUBNET` constant `cilo_protocol::validate` checks peer IPs
/// against, so the allocator and the validator can never disagree about
/// which `/16` is in play.
fn overlay_base() -> u32 {
    let net: Ipv4Net = OVERLAY_SUBNET.parse().expect("overlay subnet is valid");
    u32::from(net.network())
}

#[derive(Debug, thiserror::Error)]
pub enum AllocatorError {
    #[error("overlay subnet exhausted for this machine")]
    Exhausted,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct OverlayAllocator {
    store: Store,
    /// One lock per machine so unrelated machines never contend, while two
    /// exchanges against the same machine serialize.
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl OverlayAllocator {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            locks: Arc::new(DashMap::new()),
        }
    }

    fn lock_for(&self, machine_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(machine_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Loads every `assigned_ip` already held by a peer of `machine_id`,
    /// then scans upward from `10.225.0.1` for the first free address.
    pub async fn allocate(&self, machine_id: Uuid) -> Result<Ipv4Addr, AllocatorError> {
        let lock = self.lock_for(machine_id);
        let _guard = lock.lock().await;

        let taken: std::collections::HashSet<Ipv4Addr> = self
            .store
            .assigned_ips_for_machine(machine_id)
            .await?
            .into_iter()
            .collect();

        let base = overlay_base();
        for offset in 1..OVERLAY_SIZE {
            let candidate = Ipv4Addr::from(base + offset);
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(AllocatorError::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_free_skips_taken_addresses() {
        let base = overlay_base();
        let mut taken = std::collections::HashSet::new();
        for i in 1..=99u32 {
            taken.insert(Ipv4Addr::from(base + i));
        }
        let mut found = None;
        for offset in 1..OVERLAY_SIZE {
            let candidate = Ipv4Addr::from(base + offset);
            if !taken.contains(&candidate) {
                found = Some(candidate);
                break;
            }
        }
        assert_eq!(found, Some(Ipv4Addr::new(10, 225, 0, 100)));
    }

    #[test]
    fn sequential_allocation_from_a_custom_starting_point() {
        // Mirrors spec §8 scenario 2: three exchanges starting at
        // 10.225.0.100 return .100, .101, .102 in order.
        let base = overlay_base();
        let mut taken = std::collections::HashSet::new();
        let mut results = vec![];
        for _ in 0..3 {
            for offset in 100..OVERLAY_SIZE {
                let candidate = Ipv4Addr::from(base + offset);
                if !taken.contains(&candidate) {
                    taken.insert(candidate);
                    results.push(candidate);
                    break;
                }
            }
        }
        assert_eq!(
            results,
            vec![
                Ipv4Addr::new(10, 225, 0, 100),
                Ipv4Addr::new(10, 225, 0, 101),
                Ipv4Addr::new(10, 225, 0, 102),
            ]
        );
    }
}
