//! CLI module for benchstream
//!
//! # Commands
//!
//! - `serve` - Run the streaming dashboard until interrupted
//! - `simulate` - Drive a synthetic benchmark through the dashboard
//!
//! # Example
//!
//! ```bash
//! # Serve the viewer on port 9000
//! benchstream serve --port 9000
//!
//! # Simulate two scenarios, failing every 10th request
//! benchstream simulate --scenario "D(100,100)" --scenario "N(480,240)/(300,150)" --error-every 10
//! ```

pub mod serve;
pub mod simulate;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// benchstream - live telemetry for generative AI benchmarks
#[derive(Parser, Debug)]
#[command(
    name = "benchstream",
    version,
    about = "Real-time streaming dashboard for benchmark runs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dashboard server until Ctrl+C
    Serve(ServeArgs),
    /// Run a synthetic benchmark against the dashboard
    Simulate(SimulateArgs),
}

/// Options shared by every command that loads configuration
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "benchstream.toml")]
    pub config: PathBuf,

    /// Override server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override server host
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Use the terminal dashboard instead of streaming
    #[arg(long)]
    pub no_streaming: bool,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Traffic scenario to run (repeatable)
    #[arg(short, long = "scenario", default_values_t = [
        "D(100,100)".to_string(),
        "N(480,240)/(300,150)".to_string(),
    ])]
    pub scenarios: Vec<String>,

    /// Requests per scenario
    #[arg(short, long, default_value = "50")]
    pub requests: u64,

    /// Delay between requests in milliseconds
    #[arg(short, long, default_value = "50")]
    pub delay_ms: u64,

    /// Fail every Nth request (0 = never)
    #[arg(long, default_value = "0")]
    pub error_every: u64,

    /// Keep the dashboard up this many seconds after the run completes
    #[arg(long, default_value = "0")]
    pub linger_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from([
            "benchstream",
            "serve",
            "--port",
            "9000",
            "-H",
            "127.0.0.1",
            "--no-streaming",
        ])
        .unwrap();

        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.config.port, Some(9000));
        assert_eq!(args.config.host.as_deref(), Some("127.0.0.1"));
        assert!(args.config.no_streaming);
    }

    #[test]
    fn test_parse_simulate_defaults() {
        let cli = Cli::try_parse_from(["benchstream", "simulate"]).unwrap();
        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.scenarios.len(), 2);
        assert_eq!(args.requests, 50);
        assert_eq!(args.error_every, 0);
    }

    #[test]
    fn test_parse_simulate_repeated_scenarios() {
        let cli = Cli::try_parse_from([
            "benchstream",
            "simulate",
            "--scenario",
            "D(10,10)",
            "--scenario",
            "D(20,20)",
            "--scenario",
            "D(30,30)",
        ])
        .unwrap();
        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.scenarios, vec!["D(10,10)", "D(20,20)", "D(30,30)"]);
    }
}
