mod cli;

use anyhow::Result;
use clap::Parser;

use cli::args::Cli;
use tagstore::config::Config;
use tagstore::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
        config.validate()?;
    }

    cli::run(cli.command, &config).await
}
