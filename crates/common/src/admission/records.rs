//! Per-identity state kept in the store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a user agent.
pub fn hash_user_agent(user_agent: &str) -> String {
    hex::encode(Sha256::digest(user_agent.as_bytes()))
}

/// Store paths for one (ip, user agent) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKeys {
    /// `<ns>:<ip>:<ua hash>`
    pub identity: String,
    /// `<ns>:ip:<ip>`
    pub ip: String,
    /// `<ns>:ban:<ip>`
    pub ban: String,
}

impl RecordKeys {
    pub fn new(namespace: &str, ip: &str, ua_hash: &str) -> Self {
        Self {
            identity: format!("{}:{}:{}", namespace, ip, ua_hash),
            ip: Self::ip_key(namespace, ip),
            ban: Self::ban_key(namespace, ip),
        }
    }

    pub fn ip_key(namespace: &str, ip: &str) -> String {
        format!("{}:ip:{}", namespace, ip)
    }

    pub fn ban_key(namespace: &str, ip: &str) -> String {
        format!("{}:ban:{}", namespace, ip)
    }
}

/// Request history for one (ip, user agent) identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Admitted request timestamps inside the long window, oldest first
    #[serde(default)]
    pub hits: Vec<u64>,
    /// Admitted request timestamps inside the burst window, oldest first
    #[serde(default)]
    pub burst: Vec<u64>,
    #[serde(default)]
    pub violations: u64,
    #[serde(default)]
    pub last_violation: u64,
}

impl IdentityRecord {
    /// Forgive a single violation once `decay_ms` has passed since the last
    /// one. Returns whether a violation was forgiven.
    pub fn decay(&mut self, now: u64, decay_ms: u64) -> bool {
        if self.violations > 0 && now.saturating_sub(self.last_violation) > decay_ms {
            self.violations -= 1;
            self.last_violation = now;
            return true;
        }
        false
    }

    /// Drop timestamps older than their window.
    pub fn prune(&mut self, now: u64, window_ms: u64, burst_window_ms: u64) {
        let window_start = now.saturating_sub(window_ms);
        let burst_start = now.saturating_sub(burst_window_ms);
        self.hits.retain(|ts| *ts >= window_start);
        self.burst.retain(|ts| *ts >= burst_start);
    }

    /// Record an admitted request costing `weight` slots.
    pub fn admit(&mut self, now: u64, weight: u64) {
        for _ in 0..weight {
            self.hits.push(now);
            self.burst.push(now);
        }
    }

    pub fn record_violation(&mut self, now: u64) {
        self.violations += 1;
        self.last_violation = now;
    }
}

/// User agents seen from one ip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRecord {
    #[serde(default)]
    pub uas: Vec<String>,
}

impl IpRecord {
    pub fn knows(&self, ua_hash: &str) -> bool {
        self.uas.iter().any(|h| h == ua_hash)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub banned_until: u64,
}

impl BanRecord {
    pub fn is_active(&self, now: u64) -> bool {
        self.banned_until > now
    }
}
