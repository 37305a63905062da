//! `backlog-feed` binary

mod cli;
mod commands;
mod config;

use clap::Parser;
use config::{AppConfig, Environment};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    let env = Environment::current();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(env.default_log_level())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = cli::Cli::parse();
    let config = AppConfig::from_env()?;
    cli.execute(config, env).await
}
