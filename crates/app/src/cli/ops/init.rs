use clap::Args;

use common::admission::AdmissionOptions;
use common::crypto::KdfParams;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Requests allowed per window
    #[arg(long, default_value_t = 100)]
    pub limit: u64,

    /// Sliding window length in milliseconds
    #[arg(long, default_value_t = 60_000)]
    pub window_ms: u64,

    /// Requests allowed per burst window (default: 20)
    #[arg(long)]
    pub burst_limit: Option<u64>,

    /// Burst window length in milliseconds (default: 1000)
    #[arg(long)]
    pub burst_window_ms: Option<u64>,

    /// Violations before an ip is banned (default: 5)
    #[arg(long)]
    pub ban_threshold: Option<u64>,

    /// Ban duration in milliseconds (default: 24h)
    #[arg(long)]
    pub ban_ms: Option<u64>,

    /// Quiet period after which one violation is forgiven (default: 1h)
    #[arg(long)]
    pub violation_decay_ms: Option<u64>,

    /// Distinct user agents allowed per ip (default: 5)
    #[arg(long)]
    pub ua_rotation_threshold: Option<u64>,

    /// Scale every request weight by this factor
    #[arg(long)]
    pub weight_multiplier: Option<f64>,

    /// Key prefix for controller records (default: throttle)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Write coalescing delay in milliseconds
    #[arg(long, default_value_t = 50)]
    pub debounce_ms: u64,
}

impl Init {
    fn admission_options(&self) -> AdmissionOptions {
        AdmissionOptions {
            limit: Some(self.limit),
            window_ms: Some(self.window_ms),
            burst_limit: self.burst_limit,
            burst_window_ms: self.burst_window_ms,
            ban_threshold: self.ban_threshold,
            ban_ms: self.ban_ms,
            violation_decay_ms: self.violation_decay_ms,
            ua_rotation_threshold: self.ua_rotation_threshold,
            weight_multiplier: self.weight_multiplier,
            namespace: self.namespace.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            debounce_ms: self.debounce_ms,
            kdf: KdfParams::default(),
            admission: self.admission_options(),
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config)).await?;

        let output = format!(
            "Initialized warden directory at: {}\n\
             - State file: {}\n\
             - Config: {}\n\
             - Namespace: {}\n\
             - Limit: {} per {} ms",
            state.warden_dir.display(),
            state.state_path.display(),
            state.config_path.display(),
            state.config.admission.namespace(),
            self.limit,
            self.window_ms,
        );

        Ok(output)
    }
}
