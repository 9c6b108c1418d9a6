//! External routing: resolves host + path to an internal address.
//!
//! Routes are grouped by host. Within a host the longest matching path
//! prefix wins; prefixes match whole path segments, so `/api` matches
//! `/api` and `/api/users` but not `/apix`.

use std::collections::HashMap;

use deck_core::{Resource, RouteSpec};
use tracing::debug;

use crate::error::ClusterResult;
use crate::plane::ControlPlane;

/// Where a request ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub route: String,
    pub address: String,
    pub port: u16,
}

impl RouteTarget {
    /// `address:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Default)]
pub struct RouteTable {
    hosts: HashMap<String, Vec<RouteSpec>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from every route the control plane holds.
    pub fn from_plane(plane: &dyn ControlPlane) -> ClusterResult<Self> {
        let mut table = Self::new();
        for resource in plane.list()? {
            if let Resource::Route(route) = resource {
                table.insert(route);
            }
        }
        Ok(table)
    }

    /// Add a route, replacing any route with the same name.
    pub fn insert(&mut self, route: RouteSpec) {
        for routes in self.hosts.values_mut() {
            routes.retain(|r| r.name != route.name);
        }
        self.hosts.retain(|_, routes| !routes.is_empty());

        let routes = self.hosts.entry(route.host.to_ascii_lowercase()).or_default();
        routes.push(route);
        // Longest prefix first; ties by name for a stable order.
        routes.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.name.cmp(&b.name))
        });
    }

    /// Resolve a request. `host` may carry a `:port` suffix.
    pub fn resolve(&self, host: &str, path: &str) -> Option<RouteTarget> {
        let host = host.split(':').next().unwrap_or(host).to_ascii_lowercase();
        let routes = self.hosts.get(&host)?;
        let route = routes.iter().find(|r| prefix_matches(&r.path, path))?;
        debug!(%host, path, route = %route.name, address = %route.address, "resolved route");
        Some(RouteTarget {
            route: route.name.clone(),
            address: route.address.clone(),
            port: route.port,
        })
    }

    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<_> = self.hosts.keys().cloned().collect();
        hosts.sort();
        hosts
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &str, host: &str, path: &str, address: &str, port: u16) -> RouteSpec {
        RouteSpec {
            name: name.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            address: address.to_string(),
            port,
        }
    }

    #[test]
    fn root_prefix_matches_everything_on_host() {
        let mut table = RouteTable::new();
        table.insert(route("web", "example.com", "/", "web", 8000));

        for path in ["/", "/admin", "/static/app.css"] {
            assert_eq!(
                table.resolve("example.com", path).unwrap().endpoint(),
                "web:8000"
            );
        }
        assert!(table.resolve("other.com", "/").is_none());
    }

    #[test]
    fn longest_prefix_wins_on_segment_boundaries() {
        let mut table = RouteTable::new();
        table.insert(route("web", "example.com", "/", "web", 8000));
        table.insert(route("api", "example.com", "/api/", "api", 9000));

        assert_eq!(table.resolve("example.com", "/api").unwrap().route, "api");
        assert_eq!(table.resolve("example.com", "/api/users").unwrap().route, "api");
        assert_eq!(table.resolve("example.com", "/apix").unwrap().route, "web");
    }

    #[test]
    fn host_is_case_insensitive_and_port_is_ignored() {
        let mut table = RouteTable::new();
        table.insert(route("web", "example.com", "/", "web", 8000));
        assert!(table.resolve("Example.COM:443", "/").is_some());
    }

    #[test]
    fn reinserting_a_route_replaces_it() {
        let mut table = RouteTable::new();
        table.insert(route("web", "example.com", "/", "web", 8000));
        table.insert(route("web", "example.com", "/", "web-v2", 8000));

        assert_eq!(table.resolve("example.com", "/").unwrap().address, "web-v2");
        assert_eq!(table.hosts(), vec!["example.com"]);
    }
}
