use clap::Args;
use serde_json::Value;

use common::store::StoreError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Set {
    /// Dot-delimited path
    pub path: String,

    /// JSON value to store; anything that does not parse is stored as a string
    pub value: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SetError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Set {
    fn parsed_value(&self) -> Value {
        serde_json::from_str(&self.value).unwrap_or_else(|_| Value::String(self.value.clone()))
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Set {
    type Error = SetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let store = ctx.state()?.open_store().await?;
        let value = store.set(&self.path, self.parsed_value()).await;
        store.close().await?;

        Ok(serde_json::to_string_pretty(&value)?)
    }
}
