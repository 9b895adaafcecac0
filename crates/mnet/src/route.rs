//! Route table (spec §4.4): learned + static next-hop map with TTL eviction.
//!
//! Mirrors `styrene-rns-transport::transport::path_table::PathTable` —
//! a plain `HashMap` keyed by remote host, entries refreshed on traffic and
//! swept for staleness on tick, rather than owned/object-graph pointers
//! (spec §9's "cyclic reference" design note).

use crate::host::HostId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub device: String,
    pub address: String,
    pub last_seen: Instant,
}

pub struct RouteTable {
    route_cache: HashMap<HostId, RouteEntry>,
    static_routes: HashMap<HostId, RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self { route_cache: HashMap::new(), static_routes: HashMap::new() }
    }

    pub fn add_static(&mut self, host: HostId, device: impl Into<String>, address: impl Into<String>) {
        self.static_routes.insert(
            host,
            RouteEntry { device: device.into(), address: address.into(), last_seen: Instant::now() },
        );
    }

    pub fn static_routes(&self) -> &HashMap<HostId, RouteEntry> {
        &self.static_routes
    }

    /// Learns a route from an observed packet, unless a static route for
    /// this host already exists (spec §4.4: static routes always win).
    pub fn learn(&mut self, host: HostId, device: impl Into<String>, address: impl Into<String>) {
        if self.static_routes.contains_key(&host) {
            return;
        }
        self.route_cache.insert(
            host,
            RouteEntry { device: device.into(), address: address.into(), last_seen: Instant::now() },
        );
    }

    /// Lookup precedence: `routeCache` → `staticRoutes` (spec §4.4).
    /// Callers fall back to broadcasting on all devices if this returns `None`.
    pub fn lookup(&self, host: &HostId) -> Option<&RouteEntry> {
        self.route_cache.get(host).or_else(|| self.static_routes.get(host))
    }

    /// Evicts `routeCache` entries older than `route_time`. Static routes
    /// never expire.
    pub fn evict_expired(&mut self, route_time: Duration) {
        let now = Instant::now();
        self.route_cache.retain(|_, entry| now.duration_since(entry.last_seen) <= route_time);
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_routes_take_precedence_over_learned() {
        let mut table = RouteTable::new();
        let host = HostId::new("h2");
        table.add_static(host.clone(), "tunnel0", "addr-static");
        table.learn(host.clone(), "radio0", "addr-learned");
        assert_eq!(table.lookup(&host).unwrap().device, "tunnel0");
    }

    #[test]
    fn eviction_only_touches_route_cache() {
        let mut table = RouteTable::new();
        let host = HostId::new("h2");
        table.add_static(host.clone(), "tunnel0", "addr");
        table.learn(HostId::new("h3"), "radio0", "addr2");
        table.evict_expired(Duration::from_secs(0));
        assert!(table.lookup(&host).is_some());
        assert!(table.lookup(&HostId::new("h3")).is_none());
    }
}
