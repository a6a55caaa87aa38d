use clap::Parser;

use searchcrabs::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    searchcrabs::cli::run(cli).await
}
