//! Subject alternative name profiles for service certificates.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Services issued by default.
pub const DEFAULT_SERVICES: [&str; 3] = ["postgres", "redis", "temporal"];

const LOOPBACK: [IpAddr; 2] = [
    IpAddr::V4(Ipv4Addr::LOCALHOST),
    IpAddr::V6(Ipv6Addr::LOCALHOST),
];

/// How services are named on the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformNaming {
    /// Namespace the services run in
    pub namespace: String,
    /// Prefix of per-service resource names, e.g. `api-forge-postgres`
    pub resource_prefix: String,
}

impl Default for PlatformNaming {
    fn default() -> Self {
        Self {
            namespace: "api-forge-prod".to_string(),
            resource_prefix: "api-forge".to_string(),
        }
    }
}

/// Names a service certificate is valid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanProfile {
    pub service: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
}

fn aliases(service: &str) -> Option<&'static [&'static str]> {
    match service {
        "postgres" => Some(&["postgres", "postgresql", "db"]),
        "redis" => Some(&["redis", "cache"]),
        "temporal" => Some(&["temporal", "temporal-frontend"]),
        _ => None,
    }
}

impl SanProfile {
    /// Profile for a service. Unknown services get [`Self::generic`].
    pub fn for_service(service: &str, naming: &PlatformNaming) -> Self {
        let Some(aliases) = aliases(service) else {
            return Self::generic(service);
        };

        let ns = &naming.namespace;
        let resource = format!("{}-{service}", naming.resource_prefix);

        let mut dns_names: Vec<String> = aliases.iter().map(ToString::to_string).collect();
        dns_names.extend([
            format!("{service}.local"),
            resource.clone(),
            format!("{resource}.{ns}"),
            format!("{resource}.{ns}.svc"),
            format!("{resource}.{ns}.svc.cluster.local"),
            format!("*.{ns}.svc"),
            format!("*.{ns}.svc.cluster.local"),
            "localhost".to_string(),
        ]);

        Self {
            service: service.to_string(),
            dns_names,
            ip_addresses: LOOPBACK.to_vec(),
        }
    }

    /// Service name, localhost and loopback only.
    pub fn generic(service: &str) -> Self {
        Self {
            service: service.to_string(),
            dns_names: vec![service.to_string(), "localhost".to_string()],
            ip_addresses: LOOPBACK.to_vec(),
        }
    }

    /// Subject common name, `<service>.local`.
    pub fn common_name(&self) -> String {
        format!("{}.local", self.service)
    }

    /// DNS names then IP literals, without duplicates.
    pub fn entries(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.dns_names.len() + self.ip_addresses.len());
        let all = self
            .dns_names
            .iter()
            .cloned()
            .chain(self.ip_addresses.iter().map(ToString::to_string));
        for entry in all {
            if !out.contains(&entry) {
                out.push(entry);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_service_profile() {
        let profile = SanProfile::for_service("postgres", &PlatformNaming::default());
        let entries = profile.entries();
        assert!(entries.contains(&"postgres".to_string()));
        assert!(entries.contains(&"api-forge-postgres".to_string()));
        assert!(entries.contains(&"api-forge-postgres.api-forge-prod.svc.cluster.local".to_string()));
        assert!(entries.contains(&"*.api-forge-prod.svc.cluster.local".to_string()));
        assert!(entries.contains(&"localhost".to_string()));
        assert!(entries.contains(&"127.0.0.1".to_string()));
        assert!(entries.contains(&"::1".to_string()));
        assert_eq!(profile.common_name(), "postgres.local");
    }

    #[test]
    fn test_unknown_service_falls_back() {
        let profile = SanProfile::for_service("minio", &PlatformNaming::default());
        assert_eq!(profile, SanProfile::generic("minio"));
        assert_eq!(profile.entries(), vec!["minio", "localhost", "127.0.0.1", "::1"]);
    }

    #[test]
    fn test_custom_namespace() {
        let naming = PlatformNaming {
            namespace: "staging".to_string(),
            resource_prefix: "shop".to_string(),
        };
        let entries = SanProfile::for_service("redis", &naming).entries();
        assert!(entries.contains(&"shop-redis.staging.svc".to_string()));
        assert!(!entries.iter().any(|e| e.contains("api-forge")));
    }

    #[test]
    fn test_entries_are_deduplicated() {
        let mut profile = SanProfile::generic("localhost");
        profile.dns_names.push("localhost".to_string());
        assert_eq!(profile.entries().iter().filter(|e| *e == "localhost").count(), 1);
    }
}
