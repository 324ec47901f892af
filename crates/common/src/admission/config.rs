use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "throttle";
pub const DEFAULT_BURST_LIMIT: u64 = 20;
pub const DEFAULT_BURST_WINDOW_MS: u64 = 1_000;
pub const DEFAULT_BAN_THRESHOLD: u64 = 5;
pub const DEFAULT_BAN_MS: u64 = 24 * 60 * 60 * 1_000;
pub const DEFAULT_VIOLATION_DECAY_MS: u64 = 60 * 60 * 1_000;
pub const DEFAULT_UA_ROTATION_THRESHOLD: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required and must be greater than zero")]
    Missing(&'static str),
}

/// Controller options as supplied by the caller.
///
/// Only `limit` and `window_ms` are required. Any other field that is absent
/// or zero falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdmissionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_window_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban_threshold: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation_decay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ua_rotation_threshold: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl AdmissionOptions {
    pub fn new(limit: u64, window_ms: u64) -> Self {
        Self {
            limit: Some(limit),
            window_ms: Some(window_ms),
            ..Self::default()
        }
    }

    pub fn namespace(&self) -> &str {
        self.namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE)
    }
}

fn or_default(value: Option<u64>, default: u64) -> u64 {
    value.filter(|v| *v > 0).unwrap_or(default)
}

/// Fully resolved limits used for a single decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    pub limit: u64,
    pub window_ms: u64,
    pub burst_limit: u64,
    pub burst_window_ms: u64,
    pub ban_threshold: u64,
    pub ban_ms: u64,
    pub violation_decay_ms: u64,
    pub ua_rotation_threshold: u64,
    pub weight_multiplier: Option<f64>,
}

impl TryFrom<&AdmissionOptions> for AdmissionConfig {
    type Error = ConfigError;

    fn try_from(options: &AdmissionOptions) -> Result<Self, Self::Error> {
        let limit = options
            .limit
            .filter(|v| *v > 0)
            .ok_or(ConfigError::Missing("limit"))?;
        let window_ms = options
            .window_ms
            .filter(|v| *v > 0)
            .ok_or(ConfigError::Missing("window_ms"))?;

        Ok(Self {
            limit,
            window_ms,
            burst_limit: or_default(options.burst_limit, DEFAULT_BURST_LIMIT),
            burst_window_ms: or_default(options.burst_window_ms, DEFAULT_BURST_WINDOW_MS),
            ban_threshold: or_default(options.ban_threshold, DEFAULT_BAN_THRESHOLD),
            ban_ms: or_default(options.ban_ms, DEFAULT_BAN_MS),
            violation_decay_ms: or_default(options.violation_decay_ms, DEFAULT_VIOLATION_DECAY_MS),
            ua_rotation_threshold: or_default(
                options.ua_rotation_threshold,
                DEFAULT_UA_ROTATION_THRESHOLD,
            ),
            weight_multiplier: options.weight_multiplier,
        })
    }
}

/// Per-request override returned by a policy resolver. Fields left `None`
/// keep the base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverride {
    pub limit: Option<u64>,
    pub window_ms: Option<u64>,
    pub burst_limit: Option<u64>,
    pub burst_window_ms: Option<u64>,
    pub ban_threshold: Option<u64>,
    pub ban_ms: Option<u64>,
    pub violation_decay_ms: Option<u64>,
    pub ua_rotation_threshold: Option<u64>,
    pub weight_multiplier: Option<f64>,
}

impl AdmissionConfig {
    pub fn merged(&self, o: &PolicyOverride) -> Self {
        Self {
            limit: o.limit.unwrap_or(self.limit),
            window_ms: o.window_ms.unwrap_or(self.window_ms),
            burst_limit: o.burst_limit.unwrap_or(self.burst_limit),
            burst_window_ms: o.burst_window_ms.unwrap_or(self.burst_window_ms),
            ban_threshold: o.ban_threshold.unwrap_or(self.ban_threshold),
            ban_ms: o.ban_ms.unwrap_or(self.ban_ms),
            violation_decay_ms: o.violation_decay_ms.unwrap_or(self.violation_decay_ms),
            ua_rotation_threshold: o.ua_rotation_threshold.unwrap_or(self.ua_rotation_threshold),
            weight_multiplier: o.weight_multiplier.or(self.weight_multiplier),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_required_fields() {
        assert_eq!(
            AdmissionConfig::try_from(&AdmissionOptions::default()),
            Err(ConfigError::Missing("limit"))
        );

        let options = AdmissionOptions {
            limit: Some(10),
            ..AdmissionOptions::default()
        };
        assert_eq!(
            AdmissionConfig::try_from(&options),
            Err(ConfigError::Missing("window_ms"))
        );

        let options = AdmissionOptions::new(0, 1_000);
        assert_eq!(
            AdmissionConfig::try_from(&options),
            Err(ConfigError::Missing("limit"))
        );
    }

    #[test]
    fn test_defaults() {
        let config = AdmissionConfig::try_from(&AdmissionOptions::new(10, 60_000)).unwrap();

        assert_eq!(config.burst_limit, DEFAULT_BURST_LIMIT);
        assert_eq!(config.burst_window_ms, DEFAULT_BURST_WINDOW_MS);
        assert_eq!(config.ban_threshold, DEFAULT_BAN_THRESHOLD);
        assert_eq!(config.ban_ms, DEFAULT_BAN_MS);
        assert_eq!(config.violation_decay_ms, DEFAULT_VIOLATION_DECAY_MS);
        assert_eq!(config.ua_rotation_threshold, DEFAULT_UA_ROTATION_THRESHOLD);
        assert_eq!(config.weight_multiplier, None);
        assert_eq!(AdmissionOptions::new(10, 60_000).namespace(), DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_merge_override() {
        let base = AdmissionConfig::try_from(&AdmissionOptions::new(10, 60_000)).unwrap();
        let merged = base.merged(&PolicyOverride {
            limit: Some(100),
            weight_multiplier: Some(2.0),
            ..PolicyOverride::default()
        });

        assert_eq!(merged.limit, 100);
        assert_eq!(merged.window_ms, 60_000);
        assert_eq!(merged.weight_multiplier, Some(2.0));
    }
}
