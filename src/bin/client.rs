use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use treemirror::{
    cli::ClientArgs, config::ClientConfig, relay::watch_and_relay, signal::shutdown_signal,
};

#[tokio::main]
async fn main() -> ExitCode {
    let args = ClientArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "treemirror=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ClientConfig::resolve(args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = watch_and_relay(config, shutdown_signal()).await {
        tracing::error!("Relay failed: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
