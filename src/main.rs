use clap::Parser;
use experimentation_decisions::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cli::serve::run().await,
        Command::Decide(args) => cli::decide::run(args).await,
    }
}
