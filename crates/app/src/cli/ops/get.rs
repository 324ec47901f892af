use clap::Args;

use common::store::StoreError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Get {
    /// Dot-delimited path, e.g. `throttle:ban:10.0.0.1`
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error("nothing stored at '{0}'")]
    NotFound(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Get {
    type Error = GetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let store = ctx.state()?.open_store().await?;
        let value = store.get(&self.path).await;
        store.close().await?;

        match value {
            Some(value) => Ok(serde_json::to_string_pretty(&value)?),
            None => Err(GetError::NotFound(self.path.clone())),
        }
    }
}
