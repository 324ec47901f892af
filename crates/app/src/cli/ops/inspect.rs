use clap::Args;
use serde_json::json;

use common::admission::AdmissionError;
use common::store::StoreError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Inspect {
    /// Client ip address
    #[arg(long)]
    pub ip: String,

    /// Also show the request history for this user agent
    #[arg(long)]
    pub user_agent: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode records: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Inspect {
    type Error = InspectError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let store = state.open_store().await?;
        let controller = state.controller(store.clone())?;

        let ban = controller.ban_record(&self.ip).await?;
        let ip = controller.ip_record(&self.ip).await?;
        let identity = match &self.user_agent {
            Some(ua) => controller.identity_record(&self.ip, ua).await?,
            None => None,
        };
        store.close().await?;

        let report = json!({
            "namespace": controller.namespace(),
            "ip": self.ip,
            "ban": ban,
            "user_agents": ip.map(|r| r.uas.len()).unwrap_or(0),
            "identity": identity,
        });
        Ok(serde_json::to_string_pretty(&report)?)
    }
}
