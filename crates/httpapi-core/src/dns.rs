//! Hosted-zone lookup.
//!
//! Constructs that provision custom domains need the hosted zone the domain
//! lives in. The zone itself is managed outside the stack, so it is resolved
//! through a [`ZoneLookup`] supplied when the stack is created.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A managed DNS namespace.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HostedZone {
    /// Provider-assigned zone id (e.g. `Z0123456789ABC`).
    pub zone_id: String,

    /// Zone name without the trailing dot (e.g. `domain.com`).
    pub zone_name: String,
}

impl HostedZone {
    /// Create a hosted zone, normalizing the zone name.
    pub fn new(zone_id: impl Into<String>, zone_name: &str) -> Self {
        Self {
            zone_id: zone_id.into(),
            zone_name: normalize_zone_name(zone_name),
        }
    }
}

/// Resolves hosted zones by name.
///
/// A lookup that returns `None` means the zone does not exist.
pub trait ZoneLookup: Send + Sync {
    /// Look up the zone with the given name.
    fn lookup(&self, zone_name: &str) -> Option<HostedZone>;
}

impl<F> ZoneLookup for F
where
    F: Fn(&str) -> Option<HostedZone> + Send + Sync,
{
    fn lookup(&self, zone_name: &str) -> Option<HostedZone> {
        self(zone_name)
    }
}

/// A fixed set of known hosted zones.
#[derive(Debug, Clone, Default)]
pub struct StaticZoneLookup {
    zones: BTreeMap<String, HostedZone>,
}

impl StaticZoneLookup {
    /// Create an empty lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zone.
    #[must_use]
    pub fn with_zone(mut self, zone: HostedZone) -> Self {
        self.insert(zone);
        self
    }

    /// Add a zone, replacing any zone with the same name.
    pub fn insert(&mut self, zone: HostedZone) {
        self.zones
            .insert(normalize_zone_name(&zone.zone_name), zone);
    }

    /// Number of known zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Returns `true` if no zones are known.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

impl ZoneLookup for StaticZoneLookup {
    fn lookup(&self, zone_name: &str) -> Option<HostedZone> {
        self.zones.get(&normalize_zone_name(zone_name)).cloned()
    }
}

/// Lowercase a zone name and strip its trailing dot.
pub fn normalize_zone_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_lookup() {
        let lookup = StaticZoneLookup::new().with_zone(HostedZone::new("Z1", "domain.com"));

        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup.lookup("domain.com").unwrap().zone_id, "Z1");
        assert!(lookup.lookup("other.com").is_none());
    }

    #[test]
    fn test_lookup_ignores_trailing_dot_and_case() {
        let lookup = StaticZoneLookup::new().with_zone(HostedZone::new("Z1", "Domain.com."));

        assert_eq!(lookup.lookup("domain.com.").unwrap().zone_name, "domain.com");
        assert!(lookup.lookup("DOMAIN.COM").is_some());
    }

    #[test]
    fn test_closure_lookup() {
        let lookup = |name: &str| Some(HostedZone::new(format!("Z-{name}"), name));

        let zone = lookup.lookup("api.domain.com").unwrap();
        assert_eq!(zone.zone_id, "Z-api.domain.com");
        assert_eq!(zone.zone_name, "api.domain.com");
    }

    #[test]
    fn test_empty_lookup() {
        let lookup = StaticZoneLookup::default();
        assert!(lookup.is_empty());
        assert!(lookup.lookup("domain.com").is_none());
    }
}
