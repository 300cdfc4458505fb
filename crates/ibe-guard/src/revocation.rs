// revocation.rs — Time-bounded revocation registry.
//
// The registry is a snapshot: issued/expires bounds plus a map of revoked
// record id -> reason. Replacing it is atomic; a lookup reads one consistent
// snapshot. Outside its validity window (or before it is ever set) the
// registry is "not current" and callers decide whether that fails open.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A revocation list with its validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationSnapshot {
    pub issued: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    /// Revoked record id -> reason.
    #[serde(default)]
    pub revoked: HashMap<String, String>,
}

impl RevocationSnapshot {
    /// Whether the snapshot is authoritative at `now`.
    pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires
    }
}

/// Result of consulting the registry for a set of ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationLookup {
    /// No registry has been set.
    Unset,
    /// The registry lapsed at `expired_at`; its contents were not consulted.
    Stale { expired_at: DateTime<Utc> },
    /// The registry is current. `revoked` is the first listed id found
    /// revoked, with its reason.
    Current { revoked: Option<(String, String)> },
}

/// Shared, replaceable revocation registry.
#[derive(Debug, Default)]
pub struct RevocationRegistry {
    snapshot: RwLock<Option<RevocationSnapshot>>,
}

impl RevocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registry contents.
    pub fn set_registry(
        &self,
        issued: DateTime<Utc>,
        expires: DateTime<Utc>,
        revoked: HashMap<String, String>,
    ) {
        self.replace(RevocationSnapshot {
            issued,
            expires,
            revoked,
        });
    }

    /// Replace the registry with `snapshot`.
    pub fn replace(&self, snapshot: RevocationSnapshot) {
        tracing::info!(
            issued = %snapshot.issued,
            expires = %snapshot.expires,
            revoked = snapshot.revoked.len(),
            "revocation registry updated"
        );
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// Check `ids` in order against a single consistent snapshot.
    pub fn lookup(&self, ids: &[&str], now: DateTime<Utc>) -> RevocationLookup {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        let Some(snapshot) = guard.as_ref() else {
            return RevocationLookup::Unset;
        };
        if !snapshot.is_current_at(now) {
            return RevocationLookup::Stale {
                expired_at: snapshot.expires,
            };
        }
        let revoked = ids.iter().find_map(|id| {
            snapshot
                .revoked
                .get(*id)
                .map(|reason| (id.to_string(), reason.clone()))
        });
        RevocationLookup::Current { revoked }
    }

    /// Whether `id` is revoked by a current registry at `now`.
    pub fn is_revoked(&self, id: &str, now: DateTime<Utc>) -> bool {
        matches!(
            self.lookup(&[id], now),
            RevocationLookup::Current { revoked: Some(_) }
        )
    }

    /// A copy of the current snapshot, if any.
    pub fn snapshot(&self) -> Option<RevocationSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn revoked(ids: &[(&str, &str)]) -> HashMap<String, String> {
        ids.iter()
            .map(|(id, reason)| (id.to_string(), reason.to_string()))
            .collect()
    }

    #[test]
    fn unset_registry_reports_unset() {
        let registry = RevocationRegistry::new();
        assert_eq!(registry.lookup(&["a"], Utc::now()), RevocationLookup::Unset);
        assert!(!registry.is_revoked("a", Utc::now()));
    }

    #[test]
    fn current_registry_finds_first_revoked_id() {
        let registry = RevocationRegistry::new();
        let now = Utc::now();
        registry.set_registry(
            now,
            now + Duration::hours(1),
            revoked(&[("apa-1", "compromised"), ("uia-1", "withdrawn")]),
        );
        assert_eq!(
            registry.lookup(&["uia-1", "apa-1"], now),
            RevocationLookup::Current {
                revoked: Some(("uia-1".to_string(), "withdrawn".to_string()))
            }
        );
        assert_eq!(
            registry.lookup(&["other"], now),
            RevocationLookup::Current { revoked: None }
        );
    }

    #[test]
    fn expired_registry_is_stale_and_not_consulted() {
        let registry = RevocationRegistry::new();
        let now = Utc::now();
        let expires = now - Duration::seconds(1);
        registry.set_registry(now - Duration::hours(1), expires, revoked(&[("uia-1", "x")]));
        assert_eq!(
            registry.lookup(&["uia-1"], now),
            RevocationLookup::Stale { expired_at: expires }
        );
        assert!(!registry.is_revoked("uia-1", now));
    }

    #[test]
    fn expiry_instant_is_still_current() {
        let registry = RevocationRegistry::new();
        let now = Utc::now();
        registry.set_registry(now, now, revoked(&[("uia-1", "x")]));
        assert!(registry.is_revoked("uia-1", now));
    }

    #[test]
    fn replacement_discards_previous_entries() {
        let registry = RevocationRegistry::new();
        let now = Utc::now();
        let later = now + Duration::hours(1);
        registry.set_registry(now, later, revoked(&[("uia-1", "x")]));
        registry.set_registry(now, later, HashMap::new());
        assert!(!registry.is_revoked("uia-1", now));
        assert!(registry.snapshot().unwrap().revoked.is_empty());
    }

    #[test]
    fn snapshot_deserializes_from_json() {
        let snapshot: RevocationSnapshot = serde_json::from_str(
            r#"{"issued":"2030-01-01T00:00:00Z","expires":"2030-01-02T00:00:00Z","revoked":{"urn:uia:1":"withdrawn"}}"#,
        )
        .unwrap();
        assert_eq!(snapshot.revoked["urn:uia:1"], "withdrawn");
    }
}
