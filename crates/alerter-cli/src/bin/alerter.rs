use anyhow::Result;
use clap::Parser;

use alerter_cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
