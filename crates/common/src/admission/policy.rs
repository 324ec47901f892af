//! Per-request policy resolution.

use serde_json::Value;

use super::config::PolicyOverride;

/// What a resolver gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct PolicyRequest<'a> {
    pub ip: &'a str,
    pub user_agent: &'a str,
    /// Caller-supplied context; `Value::Null` when none was given
    pub context: &'a Value,
}

/// Chooses limits for a request. Returning `None` keeps the base config.
///
/// Implemented for plain closures:
///
/// ```ignore
/// let controller = controller.with_policy(|req: &PolicyRequest<'_>| {
///     (req.ip == "10.0.0.1").then(|| PolicyOverride {
///         limit: Some(1_000),
///         ..PolicyOverride::default()
///     })
/// });
/// ```
pub trait PolicyResolver: Send + Sync {
    fn resolve(&self, request: &PolicyRequest<'_>) -> Option<PolicyOverride>;
}

impl<F> PolicyResolver for F
where
    F: Fn(&PolicyRequest<'_>) -> Option<PolicyOverride> + Send + Sync,
{
    fn resolve(&self, request: &PolicyRequest<'_>) -> Option<PolicyOverride> {
        self(request)
    }
}
