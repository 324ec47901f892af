pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Admission control over an encrypted, machine-bound state file")]
pub struct Args {
    /// Path to the warden config directory (defaults to ~/.warden)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Default log level; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: crate::Command,
}
