//! CLI argument parsing

use crate::commands;
use crate::config::{AppConfig, Environment};
use clap::{Args, Parser, Subcommand};

/// Backlog feed - streams backlog table changes to browsers over SSE
#[derive(Parser, Debug)]
#[command(name = "backlog-feed")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the source and serve the feed (default)
    Serve(ServeArgs),

    /// Run the query once and print the snapshot as JSON
    Check,
}

/// Arguments for the `serve` command
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to listen on, overrides BACKLOG_BIND_ADDR
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Poll interval in seconds, overrides BACKLOG_POLL_INTERVAL_SECS
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,
}

impl ServeArgs {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(self, mut config: AppConfig) -> AppConfig {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(interval) = self.interval {
            config.poll_interval_secs = interval;
        }
        config
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self, config: AppConfig, env: Environment) -> anyhow::Result<()> {
        match self.command {
            Some(Commands::Serve(args)) => commands::serve(args.apply(config), env).await,
            None => commands::serve(config, env).await,
            Some(Commands::Check) => commands::check(config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::parse_from(["backlog-feed", "serve", "--bind", "127.0.0.1:9000", "-i", "3"]);
        let Some(Commands::Serve(args)) = cli.command else {
            panic!("expected serve");
        };

        let config = args.apply(AppConfig::from_vars(Vec::new()).unwrap());
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.poll_interval_secs, 3);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(Cli::try_parse_from(["backlog-feed", "serve", "--interval", "0"]).is_err());
    }

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["backlog-feed"]);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["backlog-feed", "check"]);
        assert!(matches!(cli.command, Some(Commands::Check)));
    }
}
