use benchstream::cli::{Cli, Commands};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => benchstream::cli::serve::run_serve(args).await,
        Commands::Simulate(args) => benchstream::cli::simulate::run_simulate(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
