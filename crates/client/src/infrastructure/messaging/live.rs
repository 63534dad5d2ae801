//! Live-connection tracking.
//!
//! At most one live transport connection per `(userId, processId)` pair.
//! The registry is constructed by the caller and shared with every
//! `connect` call that must respect the rule.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

/// Identifies one divination process of one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessKey {
    pub user_id: String,
    pub process_id: String,
}

impl ProcessKey {
    pub fn new(user_id: impl Into<String>, process_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            process_id: process_id.into(),
        }
    }

    /// Both identifiers are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.user_id.is_empty() && !self.process_id.is_empty()
    }
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.process_id)
    }
}

/// Registry of live process connections.
#[derive(Debug, Clone, Default)]
pub struct LiveConnections {
    live: Arc<DashMap<ProcessKey, Uuid>>,
}

impl LiveConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` for a new connection.
    ///
    /// `None` when the pair already has a live connection.
    pub fn try_claim(&self, key: &ProcessKey) -> Option<ConnectionLease> {
        match self.live.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let connection_id = Uuid::new_v4();
                slot.insert(connection_id);
                Some(ConnectionLease {
                    live: Arc::clone(&self.live),
                    key: key.clone(),
                    connection_id,
                })
            }
        }
    }

    pub fn is_live(&self, key: &ProcessKey) -> bool {
        self.live.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Ownership of one live pair. Dropping it releases the pair.
#[derive(Debug)]
pub struct ConnectionLease {
    live: Arc<DashMap<ProcessKey, Uuid>>,
    key: ProcessKey,
    connection_id: Uuid,
}

impl ConnectionLease {
    pub fn key(&self) -> &ProcessKey {
        &self.key
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        let id = self.connection_id;
        if self.live.remove_if(&self.key, |_, owner| *owner == id).is_some() {
            tracing::debug!(
                user_id = %self.key.user_id,
                process_id = %self.key.process_id,
                connection_id = %id,
                "Released live connection"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_for_same_pair_is_refused() {
        let live = LiveConnections::new();
        let key = ProcessKey::new("u1", "p1");

        let lease = live.try_claim(&key).expect("first claim");
        assert!(live.try_claim(&key).is_none());
        assert!(live.is_live(&key));
        assert_eq!(lease.key(), &key);
    }

    #[test]
    fn different_pairs_are_independent() {
        let live = LiveConnections::new();

        let _a = live.try_claim(&ProcessKey::new("u1", "p1")).expect("a");
        let _b = live.try_claim(&ProcessKey::new("u1", "p2")).expect("b");
        let _c = live.try_claim(&ProcessKey::new("u2", "p1")).expect("c");

        assert_eq!(live.len(), 3);
    }

    #[test]
    fn dropping_the_lease_releases_the_pair() {
        let live = LiveConnections::new();
        let key = ProcessKey::new("u1", "p1");

        drop(live.try_claim(&key).expect("claim"));

        assert!(live.is_empty());
        assert!(live.try_claim(&key).is_some());
    }

    #[test]
    fn clones_share_the_same_registry() {
        let live = LiveConnections::new();
        let other = live.clone();
        let key = ProcessKey::new("u1", "p1");

        let _lease = live.try_claim(&key).expect("claim");

        assert!(other.try_claim(&key).is_none());
    }

    #[test]
    fn completeness_requires_both_ids() {
        assert!(ProcessKey::new("u", "p").is_complete());
        assert!(!ProcessKey::new("", "p").is_complete());
        assert!(!ProcessKey::new("u", "").is_complete());
    }
}
