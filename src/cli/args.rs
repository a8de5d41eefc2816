//! Command-line surface for `tagstore`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tagstore", version, about = "Cached recipes API client with persisted state", long_about = None)]
pub struct Cli {
    /// Config file (defaults to <config_dir>/tagstore/config.toml)
    #[arg(long, env = "TAGSTORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override `api.base_url`, e.g. <https://pwa.baby:8000/>
    #[arg(long, env = "TAGSTORE_BASE_URL")]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recipe listing and management
    Recipes {
        #[command(subcommand)]
        action: RecipesCmd,
    },
    /// User profiles and follows
    Users {
        #[command(subcommand)]
        action: UsersCmd,
    },
    /// Persisted access token
    Session {
        #[command(subcommand)]
        action: SessionCmd,
    },
    /// Persisted counter
    Counter {
        #[command(subcommand)]
        action: CounterCmd,
    },
}

#[derive(Subcommand, Debug)]
pub enum RecipesCmd {
    /// List all recipes
    List,
    /// Get a recipe by id
    Get { id: String },
    /// List recipes of a user
    ByUser { user_id: u64 },
    /// Create a recipe; cached recipe lists are refreshed afterwards
    Add {
        #[arg(long)]
        user_id: u64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        category: String,
        #[arg(long, default_value_t = 1)]
        servings: u32,
        #[arg(long)]
        cook_time: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Ingredient as `name=quantity`; repeatable
        #[arg(long = "ingredient", value_parser = parse_ingredient)]
        ingredients: Vec<(String, String)>,
        /// Preparation step; repeatable
        #[arg(long = "step")]
        steps: Vec<String>,
        #[arg(long)]
        image_url: Option<String>,
    },
    /// Delete a recipe by id
    Delete { id: u64 },
}

#[derive(Subcommand, Debug)]
pub enum UsersCmd {
    /// Show the logged-in user
    Me,
    /// Show a user by id
    Get { id: u64 },
    /// Follow a user
    Follow {
        #[arg(long)]
        follower_id: u64,
        #[arg(long)]
        following_id: u64,
    },
    /// Unfollow a user
    Unfollow {
        #[arg(long)]
        follower_id: u64,
        #[arg(long)]
        following_id: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCmd {
    /// Store an access token
    Login { token: String },
    /// Forget the stored access token
    Logout,
    /// Show whether a token is stored
    Show,
}

#[derive(Subcommand, Debug)]
pub enum CounterCmd {
    /// Add to the counter (negative values subtract)
    Increment {
        #[arg(allow_hyphen_values = true)]
        by: i64,
    },
    /// Set the counter back to zero
    Reset,
    /// Print the counter
    Show,
}

fn parse_ingredient(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, quantity)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), quantity.trim().to_string()))
        }
        _ => Err(format!("expected name=quantity, got '{raw}'")),
    }
}
