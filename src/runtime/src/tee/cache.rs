//! Cache of verified certificate chains.
//!
//! Remembers chains that already passed link and root verification so that
//! repeated tokens from the same signer skip the X.509 work. The key is the
//! chain fingerprint (SHA-256 over every certificate DER). An entry is only
//! served while `now` lies inside the chain's own validity window (widened
//! by the clock skew) and the cache TTL.

use std::time::Duration;

use dashmap::DashMap;

use super::chain::{CertificateChain, PublicKey};

#[derive(Debug, Clone)]
struct CachedChain {
    leaf_key: PublicKey,
    valid_from: i64,
    valid_until: i64,
}

/// Concurrent cache of verified chains, keyed by chain fingerprint.
#[derive(Debug)]
pub struct ChainCache {
    entries: DashMap<[u8; 32], CachedChain>,
    ttl: Duration,
}

impl ChainCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Leaf key of a cached chain still valid at `now`.
    ///
    /// Entries past their end are evicted.
    pub fn get(&self, fingerprint: &[u8; 32], now: i64) -> Option<PublicKey> {
        let (expired, hit) = match self.entries.get(fingerprint) {
            Some(entry) if now > entry.valid_until => (true, None),
            Some(entry) if now < entry.valid_from => (false, None),
            Some(entry) => (false, Some(entry.leaf_key.clone())),
            None => (false, None),
        };
        if expired {
            self.entries
                .remove_if(fingerprint, |_, entry| now > entry.valid_until);
            tracing::debug!(
                fingerprint = %hex::encode(fingerprint),
                "Evicted expired chain cache entry"
            );
        }
        hit
    }

    /// Remember a chain that passed verification at `now`.
    pub fn insert(&self, chain: &CertificateChain, leaf_key: PublicKey, now: i64, skew_secs: i64) {
        let (not_before, not_after) = chain.validity_bounds();
        let ttl_secs = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let entry = CachedChain {
            leaf_key,
            valid_from: not_before.saturating_sub(skew_secs),
            valid_until: not_after
                .saturating_add(skew_secs)
                .min(now.saturating_add(ttl_secs)),
        };
        self.entries.insert(chain.fingerprint(), entry);
    }

    /// Drop every entry that has expired at `now`. Returns how many were
    /// removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.valid_until);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "Purged expired chain cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
