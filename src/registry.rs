//! The peer registry: a `(tenant, peer id) -> Proxier` directory.
//!
//! Guarded by a single shared/exclusive lock (§4.2): lookups and listing
//! take the shared side, registration and eviction take the exclusive side.
//! Every method here is a pure, non-blocking map operation — callers must
//! never hold the registry lock across Proxier I/O (§5), so this type
//! hands back an owned `Arc<Proxier>` rather than a guard.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::NoSuchPeer;
use crate::proxier::Proxier;

#[derive(Default)]
pub struct PeerRegistry {
    // tenant -> (peer id -> proxier)
    peers: RwLock<HashMap<String, HashMap<String, Arc<Proxier>>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits `proxier` under `(tenant, peer_id)`.
    ///
    /// Policy: last-writer-wins displacement (§4.2 open question). If a
    /// Proxier is already registered for this key, it is returned so the
    /// caller can close it — its own stream will observe the closure —
    /// while the new one takes its place. Exactly one Proxier is reachable
    /// per key at any time.
    pub fn register(&self, tenant: &str, peer_id: &str, proxier: Arc<Proxier>) -> Option<Arc<Proxier>> {
        let mut peers = self.peers.write().unwrap();
        let tenant_peers = peers.entry(tenant.to_string()).or_default();
        tenant_peers.insert(peer_id.to_string(), proxier)
    }

    /// Looks up the Proxier for `(tenant, peer_id)`.
    pub fn lookup(&self, tenant: &str, peer_id: &str) -> Result<Arc<Proxier>, NoSuchPeer> {
        let peers = self.peers.read().unwrap();
        peers
            .get(tenant)
            .and_then(|tenant_peers| tenant_peers.get(peer_id))
            .cloned()
            .ok_or_else(|| NoSuchPeer(peer_id.to_string()))
    }

    /// Lists peer identifiers for `tenant` in ascending lexicographic order.
    /// A tenant with no peers (or that was never registered) yields an
    /// empty vector, never an error.
    pub fn list(&self, tenant: &str) -> Vec<String> {
        let peers = self.peers.read().unwrap();
        let mut ids: Vec<String> = peers
            .get(tenant)
            .map(|tenant_peers| tenant_peers.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Removes `(tenant, peer_id)`. If the tenant's inner mapping becomes
    /// empty, the tenant key is dropped too. Returns the removed Proxier,
    /// if present, so the caller can finish closing it.
    pub fn evict(&self, tenant: &str, peer_id: &str) -> Option<Arc<Proxier>> {
        let mut peers = self.peers.write().unwrap();
        let Some(tenant_peers) = peers.get_mut(tenant) else {
            return None;
        };
        let removed = tenant_peers.remove(peer_id);
        if tenant_peers.is_empty() {
            peers.remove(tenant);
        }
        removed
    }

    /// Total number of registered peers across every tenant. Used by the
    /// admin readiness endpoint; not on any request hot path.
    pub fn total_peer_count(&self) -> usize {
        let peers = self.peers.read().unwrap();
        peers.values().map(|tenant_peers| tenant_peers.len()).sum()
    }

    /// Only evicts `peer_id` if it still maps to `proxier` (identity via
    /// `Arc::ptr_eq`). Used by the gateway-side registration task to avoid
    /// evicting a peer that has since been displaced by a newer
    /// registration of the same id (§3 invariant 4).
    pub fn evict_if_current(&self, tenant: &str, peer_id: &str, proxier: &Arc<Proxier>) {
        let mut peers = self.peers.write().unwrap();
        let Some(tenant_peers) = peers.get_mut(tenant) else {
            return;
        };
        if let Some(current) = tenant_peers.get(peer_id) {
            if Arc::ptr_eq(current, proxier) {
                tenant_peers.remove(peer_id);
            }
        }
        if tenant_peers.is_empty() {
            peers.remove(tenant);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxier::Proxier;

    fn proxier() -> Arc<Proxier> {
        let (p, _rx) = Proxier::new(16);
        Arc::new(p)
    }

    #[test]
    fn lookup_on_empty_registry_misses() {
        let reg = PeerRegistry::new();
        assert!(reg.lookup("none", "absent").is_err());
    }

    #[test]
    fn register_then_lookup_round_trips() {
        let reg = PeerRegistry::new();
        let p = proxier();
        reg.register("none", "test-id", p.clone());
        let found = reg.lookup("none", "test-id").unwrap();
        assert!(Arc::ptr_eq(&found, &p));
    }

    #[test]
    fn list_is_sorted_and_empty_is_not_an_error() {
        let reg = PeerRegistry::new();
        assert_eq!(reg.list("none"), Vec::<String>::new());

        reg.register("none", "zebra", proxier());
        reg.register("none", "alpha", proxier());
        reg.register("none", "mango", proxier());
        assert_eq!(reg.list("none"), vec!["alpha", "mango", "zebra"]);
    }

    #[test]
    fn tenants_are_isolated() {
        let reg = PeerRegistry::new();
        reg.register("tenant-a", "peer-1", proxier());
        reg.register("tenant-b", "peer-1", proxier());
        assert_eq!(reg.list("tenant-a"), vec!["peer-1"]);
        assert_eq!(reg.list("tenant-b"), vec!["peer-1"]);
        assert!(reg.lookup("tenant-a", "peer-1").is_ok());
    }

    #[test]
    fn register_displaces_prior_proxier() {
        let reg = PeerRegistry::new();
        let first = proxier();
        let second = proxier();
        let displaced = reg.register("none", "test-id", first.clone());
        assert!(displaced.is_none());

        let displaced = reg.register("none", "test-id", second.clone());
        assert!(Arc::ptr_eq(&displaced.unwrap(), &first));

        let found = reg.lookup("none", "test-id").unwrap();
        assert!(Arc::ptr_eq(&found, &second));
    }

    #[test]
    fn evict_drops_empty_tenant() {
        let reg = PeerRegistry::new();
        reg.register("none", "test-id", proxier());
        assert!(reg.evict("none", "test-id").is_some());
        assert!(reg.lookup("none", "test-id").is_err());
        assert_eq!(reg.list("none"), Vec::<String>::new());
    }

    #[test]
    fn total_peer_count_sums_across_tenants() {
        let reg = PeerRegistry::new();
        assert_eq!(reg.total_peer_count(), 0);
        reg.register("tenant-a", "peer-1", proxier());
        reg.register("tenant-b", "peer-1", proxier());
        reg.register("tenant-b", "peer-2", proxier());
        assert_eq!(reg.total_peer_count(), 3);
    }

    #[test]
    fn evict_if_current_ignores_stale_proxier() {
        let reg = PeerRegistry::new();
        let first = proxier();
        reg.register("none", "test-id", first.clone());
        let second = proxier();
        reg.register("none", "test-id", second.clone());

        // A stale cleanup task for `first` must not evict `second`.
        reg.evict_if_current("none", "test-id", &first);
        assert!(reg.lookup("none", "test-id").is_ok());

        reg.evict_if_current("none", "test-id", &second);
        assert!(reg.lookup("none", "test-id").is_err());
    }
}
