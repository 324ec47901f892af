use clap::Args;

use common::store::StoreError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Delete {
    /// Dot-delimited path
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Delete {
    type Error = DeleteError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let store = ctx.state()?.open_store().await?;
        let removed = store.delete(&self.path).await;
        store.close().await?;

        if removed {
            Ok(format!("Deleted {}", self.path))
        } else {
            Ok(format!("Nothing stored at {}", self.path))
        }
    }
}
