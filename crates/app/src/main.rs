// CLI modules
mod cli;
mod logging;
mod state;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Check, Delete, Get, Init, Inspect, Set, Version};

command_enum! {
    (Init, Init),
    (Check, Check),
    (Get, Get),
    (Set, Set),
    (Delete, Delete),
    (Inspect, Inspect),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    logging::init_logging(args.log_level);

    let ctx = cli::op::OpContext::new(args.config_path);
    tracing::debug!(command = args.command.name(), "dispatching");

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            tracing::debug!(command = args.command.name(), error = ?e, "command failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
