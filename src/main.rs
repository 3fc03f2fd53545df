//! reactrpc - call methods on remote objects from the command line.

use anyhow::Result;
use reactrpc::cli::Cli;
use reactrpc::config::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse_args();
    cli.run().await
}
