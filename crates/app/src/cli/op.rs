use std::error::Error;
use std::path::PathBuf;

use crate::state::{AppState, StateError};

#[derive(Debug, Clone)]
pub struct OpContext {
    /// Optional custom config path (defaults to ~/.warden)
    pub config_path: Option<PathBuf>,
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    /// Load the initialized warden directory this context points at.
    pub fn state(&self) -> Result<AppState, StateError> {
        AppState::load(self.config_path.clone())
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Builds the top-level `Command` subcommand enum from `(Variant, OpType)`
/// pairs, along with `OpOutput` and `OpError` enums wrapping each op's
/// associated types.
///
/// Every command runs inside a `command` span named after its variant, so
/// store and admission logs carry the subcommand that produced them.
#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $op:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($op),)*
        }

        impl Command {
            /// Subcommand name as shown in logs
            pub fn name(&self) -> &'static str {
                match self {
                    $(Command::$variant(_) => stringify!($variant),)*
                }
            }
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$op as $crate::cli::op::Op>::Output),)*
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(OpOutput::$variant(out) => std::fmt::Display::fmt(out, f),)*
                }
            }
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$op as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(
                &self,
                ctx: &$crate::cli::op::OpContext,
            ) -> Result<Self::Output, Self::Error> {
                use tracing::Instrument as _;

                let span = tracing::info_span!("command", name = self.name());
                match self {
                    $(
                        Command::$variant(op) => op
                            .execute(ctx)
                            .instrument(span)
                            .await
                            .map(OpOutput::$variant)
                            .map_err(OpError::$variant),
                    )*
                }
            }
        }
    };
}
