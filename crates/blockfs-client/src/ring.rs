//! Consistent-Hash Router
//!
//! Maps a file path to the one name-service host responsible for it. Each
//! host contributes ten virtual replicas to a ring of hash points; a path
//! is owned by the nearest clockwise replica. Membership changes remap only
//! the paths whose nearest replica moved, so adding or removing one host
//! disturbs a bounded fraction of the path space.
//!
//! The ring is the sole source of truth for routing. Volume configuration
//! never influences which host owns a path, only whether a file may be
//! created there.

use crate::error::{ClientError, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Virtual replicas per host.
const REPLICAS: usize = 10;

fn point(data: &str) -> u64 {
    let digest = Sha256::digest(data.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("sha256 yields 32 bytes"))
}

/// Consistent-hash ring over host ids. Safe for concurrent use; the watch
/// loop mutates it while request paths read.
#[derive(Default)]
pub struct HashRing {
    points: RwLock<BTreeMap<u64, String>>,
}

impl HashRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host's replicas. Idempotent.
    pub fn add(&self, host_id: &str) {
        let mut points = self.points.write().unwrap();
        for replica in 0..REPLICAS {
            points.insert(point(&format!("{host_id}:{replica}")), host_id.to_string());
        }
    }

    /// Remove a host's replicas. Idempotent.
    pub fn remove(&self, host_id: &str) {
        let mut points = self.points.write().unwrap();
        points.retain(|_, id| id != host_id);
    }

    /// The host responsible for `path`.
    pub fn get(&self, path: &str) -> Result<String> {
        let points = self.points.read().unwrap();
        if points.is_empty() {
            return Err(ClientError::EmptyRing);
        }

        let hash = point(path);
        let owner = points
            .range(hash..)
            .next()
            .or_else(|| points.iter().next())
            .map(|(_, id)| id.clone())
            .expect("non-empty ring has a successor");
        Ok(owner)
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_with(hosts: &[&str]) -> HashRing {
        let ring = HashRing::new();
        for host in hosts {
            ring.add(host);
        }
        ring
    }

    #[test]
    fn empty_ring_refuses_lookups() {
        let ring = HashRing::new();
        assert!(matches!(ring.get("/x"), Err(ClientError::EmptyRing)));
    }

    #[test]
    fn lookups_are_stable_without_membership_changes() {
        let ring = ring_with(&["h1", "h2", "h3"]);
        let owner = ring.get("/x/y/z").unwrap();
        for _ in 0..100 {
            assert_eq!(ring.get("/x/y/z").unwrap(), owner);
        }
    }

    #[test]
    fn removed_host_stops_owning_paths() {
        let ring = ring_with(&["h1", "h2", "h3"]);
        let owner = ring.get("/x/y/z").unwrap();

        ring.remove(&owner);
        let new_owner = ring.get("/x/y/z").unwrap();
        assert_ne!(new_owner, owner);

        // Stable again afterwards.
        for _ in 0..100 {
            assert_eq!(ring.get("/x/y/z").unwrap(), new_owner);
        }
    }

    #[test]
    fn adding_a_host_only_remaps_paths_onto_it() {
        let ring = ring_with(&["h1", "h2", "h3"]);
        let paths: Vec<String> = (0..200).map(|i| format!("/dir/file-{i}")).collect();
        let before: Vec<String> = paths.iter().map(|p| ring.get(p).unwrap()).collect();

        ring.add("h4");

        let mut remapped = 0;
        for (path, old_owner) in paths.iter().zip(&before) {
            let new_owner = ring.get(path).unwrap();
            if new_owner != *old_owner {
                assert_eq!(new_owner, "h4", "remapped path must land on the new host");
                remapped += 1;
            }
        }

        // Some paths move to the new host, but never all of them.
        assert!(remapped > 0);
        assert!(remapped < paths.len());
    }

    #[test]
    fn add_is_idempotent() {
        let ring = ring_with(&["h1", "h2"]);
        let owner = ring.get("/x").unwrap();
        ring.add("h1");
        ring.add("h2");
        assert_eq!(ring.get("/x").unwrap(), owner);
    }
}
