use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{Document, Store};

use super::clock::{Clock, SystemClock};
use super::config::{AdmissionConfig, AdmissionOptions, ConfigError};
use super::policy::{PolicyRequest, PolicyResolver};
use super::records::{hash_user_agent, BanRecord, IdentityRecord, IpRecord, RecordKeys};
use super::weight;

/// Why a request was admitted or restricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Ok,
    InvalidIdentity,
    AutoBan,
    UaRotation,
    BurstLimit,
    SlidingWindow,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Ok => "ok",
            Reason::InvalidIdentity => "invalid_identity",
            Reason::AutoBan => "auto_ban",
            Reason::UaRotation => "ua_rotation",
            Reason::BurstLimit => "burst_limit",
            Reason::SlidingWindow => "sliding_window",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub restricted: bool,
    pub reason: Reason,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            restricted: false,
            reason: Reason::Ok,
        }
    }

    pub fn restrict(reason: Reason) -> Self {
        Self {
            restricted: true,
            reason,
        }
    }

    pub fn is_allowed(&self) -> bool {
        !self.restricted
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// A record in the store does not have the expected shape
    #[error("invalid record at '{path}': {source}")]
    Record {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn read<T: DeserializeOwned>(doc: &Document, path: &str) -> Result<Option<T>, AdmissionError> {
    doc.get(path)
        .map(T::deserialize)
        .transpose()
        .map_err(|source| AdmissionError::Record {
            path: path.to_string(),
            source,
        })
}

fn write<T: Serialize>(doc: &mut Document, path: &str, record: &T) -> Result<(), AdmissionError> {
    let value = serde_json::to_value(record).map_err(|source| AdmissionError::Record {
        path: path.to_string(),
        source,
    })?;
    doc.set(path, value);
    Ok(())
}

/// Rate limiter, burst limiter and auto-ban in front of a request pipeline.
///
/// The controller keeps no state of its own: every decision is one
/// read-modify-write transaction against the injected [`Store`]. Because the
/// transaction holds the store lock, concurrent checks for the same identity
/// are serialized and cannot both claim the last slot in a window.
#[derive(Clone)]
pub struct AdmissionController {
    store: Store,
    config: AdmissionConfig,
    namespace: String,
    policies: Option<Arc<dyn PolicyResolver>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionController")
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .field("policies", &self.policies.is_some())
            .field("clock", &self.clock)
            .finish()
    }
}

impl AdmissionController {
    /// Build a controller on top of `store`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if `limit` or `window_ms` is absent or zero.
    pub fn new(store: Store, options: AdmissionOptions) -> Result<Self, ConfigError> {
        let config = AdmissionConfig::try_from(&options)?;
        Ok(Self {
            store,
            config,
            namespace: options.namespace().to_string(),
            policies: None,
            clock: Arc::new(SystemClock),
        })
    }

    /// Resolve per-request overrides with `resolver`.
    pub fn with_policy(mut self, resolver: impl PolicyResolver + 'static) -> Self {
        self.policies = Some(Arc::new(resolver));
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The base configuration, before any policy override.
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Effective weight of a request from `user_agent` under the base config.
    pub fn weight_for(&self, user_agent: &str) -> u64 {
        weight::request_weight(user_agent, self.config.weight_multiplier)
    }

    fn resolve_config(&self, request: &PolicyRequest<'_>) -> AdmissionConfig {
        match self
            .policies
            .as_ref()
            .and_then(|resolver| resolver.resolve(request))
        {
            Some(o) => self.config.merged(&o),
            None => self.config.clone(),
        }
    }

    /// Decide whether a request from (`ip`, `user_agent`) may proceed.
    ///
    /// Rules are evaluated in order and the first match wins: missing
    /// identity, active ban, user-agent rotation, burst window, sliding
    /// window. A missing identity is reported as a restricted [`Decision`],
    /// not as an error.
    pub async fn check(
        &self,
        ip: &str,
        user_agent: &str,
        context: Option<&Value>,
    ) -> Result<Decision, AdmissionError> {
        if ip.is_empty() || user_agent.is_empty() {
            return Ok(Decision::restrict(Reason::InvalidIdentity));
        }

        let now = self.clock.now_ms();
        let ua_hash = hash_user_agent(user_agent);
        let config = self.resolve_config(&PolicyRequest {
            ip,
            user_agent,
            context: context.unwrap_or(&Value::Null),
        });
        let keys = RecordKeys::new(&self.namespace, ip, &ua_hash);
        let weight = weight::request_weight(user_agent, config.weight_multiplier);

        let decision = self
            .store
            .transaction(|doc| evaluate(doc, &keys, &ua_hash, &config, weight, now))
            .await?;

        if decision.restricted {
            tracing::debug!(ip, weight, reason = %decision.reason, "request restricted");
        } else {
            tracing::trace!(ip, weight, "request admitted");
        }
        Ok(decision)
    }

    pub async fn identity_record(
        &self,
        ip: &str,
        user_agent: &str,
    ) -> Result<Option<IdentityRecord>, AdmissionError> {
        let keys = RecordKeys::new(&self.namespace, ip, &hash_user_agent(user_agent));
        self.store
            .transaction(|doc| read(doc, &keys.identity))
            .await
    }

    pub async fn ip_record(&self, ip: &str) -> Result<Option<IpRecord>, AdmissionError> {
        let key = RecordKeys::ip_key(&self.namespace, ip);
        self.store.transaction(|doc| read(doc, &key)).await
    }

    pub async fn ban_record(&self, ip: &str) -> Result<Option<BanRecord>, AdmissionError> {
        let key = RecordKeys::ban_key(&self.namespace, ip);
        self.store.transaction(|doc| read(doc, &key)).await
    }
}

fn evaluate(
    doc: &mut Document,
    keys: &RecordKeys,
    ua_hash: &str,
    config: &AdmissionConfig,
    weight: u64,
    now: u64,
) -> Result<Decision, AdmissionError> {
    if let Some(ban) = read::<BanRecord>(doc, &keys.ban)? {
        if ban.is_active(now) {
            return Ok(Decision::restrict(Reason::AutoBan));
        }
    }

    // a rejected user agent is not added to the rotation set
    let mut ip_record = read::<IpRecord>(doc, &keys.ip)?.unwrap_or_default();
    if !ip_record.knows(ua_hash) {
        if ip_record.uas.len() as u64 + 1 > config.ua_rotation_threshold {
            return Ok(Decision::restrict(Reason::UaRotation));
        }
        ip_record.uas.push(ua_hash.to_string());
        write(doc, &keys.ip, &ip_record)?;
    }

    let mut record = read::<IdentityRecord>(doc, &keys.identity)?.unwrap_or_default();
    record.decay(now, config.violation_decay_ms);
    record.prune(now, config.window_ms, config.burst_window_ms);

    // weight saturates at u64::MAX for extreme multipliers
    if (record.burst.len() as u64).saturating_add(weight) > config.burst_limit {
        record_violation(doc, keys, &mut record, config, now)?;
        return Ok(Decision::restrict(Reason::BurstLimit));
    }

    if (record.hits.len() as u64).saturating_add(weight) > config.limit {
        record_violation(doc, keys, &mut record, config, now)?;
        return Ok(Decision::restrict(Reason::SlidingWindow));
    }

    record.admit(now, weight);
    write(doc, &keys.identity, &record)?;
    Ok(Decision::allow())
}

fn record_violation(
    doc: &mut Document,
    keys: &RecordKeys,
    record: &mut IdentityRecord,
    config: &AdmissionConfig,
    now: u64,
) -> Result<(), AdmissionError> {
    record.record_violation(now);

    if record.violations >= config.ban_threshold {
        let ban = BanRecord {
            banned_until: now.saturating_add(config.ban_ms),
        };
        tracing::info!(
            key = %keys.ban,
            violations = record.violations,
            banned_until = ban.banned_until,
            "ban threshold reached"
        );
        write(doc, &keys.ban, &ban)?;
    }

    write(doc, &keys.identity, record)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reason_serde() {
        let decision = Decision::restrict(Reason::SlidingWindow);
        let json = serde_json::to_value(decision).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "restricted": true, "reason": "sliding_window" })
        );
        assert_eq!(Reason::UaRotation.to_string(), "ua_rotation");
    }

    #[test]
    fn test_evaluate_records_hits() {
        let mut doc = Document::new();
        let config = AdmissionConfig::try_from(&AdmissionOptions::new(3, 1_000)).unwrap();
        let keys = RecordKeys::new("ns", "1.1.1.1", "h");

        for _ in 0..3 {
            let decision = evaluate(&mut doc, &keys, "h", &config, 1, 10).unwrap();
            assert!(decision.is_allowed());
        }
        let decision = evaluate(&mut doc, &keys, "h", &config, 1, 10).unwrap();
        assert_eq!(decision.reason, Reason::SlidingWindow);

        let record: IdentityRecord = read(&doc, &keys.identity).unwrap().unwrap();
        assert_eq!(record.hits, vec![10, 10, 10]);
        assert_eq!(record.violations, 1);
    }

    #[test]
    fn test_evaluate_rejects_corrupt_record() {
        let mut doc = Document::new();
        let config = AdmissionConfig::try_from(&AdmissionOptions::new(3, 1_000)).unwrap();
        let keys = RecordKeys::new("ns", "2.2.2.2", "h");
        doc.set(&keys.ban, serde_json::json!("not a record"));

        let result = evaluate(&mut doc, &keys, "h", &config, 1, 10);
        assert!(matches!(result, Err(AdmissionError::Record { .. })));
    }
}
