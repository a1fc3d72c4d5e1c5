mod cli;
mod commands;
mod io;

use clap::Parser;
use cli::CliArgs;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    tracing::info!("rendkit v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = commands::run(args.command) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
