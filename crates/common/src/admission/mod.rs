//! Admission control backed by the encrypted state store
//!
//! [`AdmissionController::check`] decides, per (ip, user agent), whether a
//! request may proceed:
//!
//! 1. empty ip or user agent → `invalid_identity`
//! 2. active ban for the ip → `auto_ban`
//! 3. too many distinct user agents from the ip → `ua_rotation`
//! 4. one violation is forgiven if the last one is older than the decay period
//! 5. the request is weighted by user-agent class (automation 5, AI agents 10)
//! 6. burst window full → `burst_limit`
//! 7. sliding window full → `sliding_window`
//! 8. otherwise the request is recorded and admitted → `ok`
//!
//! Rejections at steps 6 and 7 count as violations; reaching the ban
//! threshold bans the ip for `ban_ms`.
//!
//! State lives in the store under `<namespace>:<ip>:<ua hash>`,
//! `<namespace>:ip:<ip>` and `<namespace>:ban:<ip>`. Records are never
//! evicted.

mod clock;
mod config;
mod controller;
mod policy;
mod records;
pub mod weight;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AdmissionConfig, AdmissionOptions, ConfigError, PolicyOverride, DEFAULT_BAN_MS,
    DEFAULT_BAN_THRESHOLD, DEFAULT_BURST_LIMIT, DEFAULT_BURST_WINDOW_MS, DEFAULT_NAMESPACE,
    DEFAULT_UA_ROTATION_THRESHOLD, DEFAULT_VIOLATION_DECAY_MS,
};
pub use controller::{AdmissionController, AdmissionError, Decision, Reason};
pub use policy::{PolicyRequest, PolicyResolver};
pub use records::{hash_user_agent, BanRecord, IdentityRecord, IpRecord, RecordKeys};
pub use weight::TrafficClass;
