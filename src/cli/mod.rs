mod api;
pub mod args;
mod handlers;
mod print;
mod stores;

use anyhow::Result;

use args::Commands;
use tagstore::config::Config;

pub async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Recipes { action } => handlers::recipes(config, action).await,
        Commands::Users { action } => handlers::users(config, action).await,
        Commands::Session { action } => handlers::session(config, action).await,
        Commands::Counter { action } => handlers::counter(config, action).await,
    }
}
