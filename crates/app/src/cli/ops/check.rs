use clap::Args;
use serde_json::Value;

use common::admission::AdmissionError;
use common::store::StoreError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Check {
    /// Client ip address
    #[arg(long)]
    pub ip: String,

    /// Client user agent
    #[arg(long)]
    pub user_agent: String,

    /// Extra context passed to policy resolution, as JSON
    #[arg(long)]
    pub context: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("invalid context: {0}")]
    InvalidContext(serde_json::Error),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode decision: {0}")]
    Encode(serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Check {
    type Error = CheckError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let context = self
            .context
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()
            .map_err(CheckError::InvalidContext)?;

        let state = ctx.state()?;
        let store = state.open_store().await?;
        let controller = state.controller(store.clone())?;

        let decision = controller
            .check(&self.ip, &self.user_agent, context.as_ref())
            .await?;
        store.close().await?;

        tracing::info!(
            ip = %self.ip,
            weight = controller.weight_for(&self.user_agent),
            reason = %decision.reason,
            "checked request"
        );

        serde_json::to_string(&decision).map_err(CheckError::Encode)
    }
}
