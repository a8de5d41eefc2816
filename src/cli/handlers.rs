//! Subcommand handlers.

use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::Value;

use tagstore::api::{SecureString, TokenSlot};
use tagstore::config::Config;

use super::api::{Api, CreateRecipeDto, Follower, RECIPES, USER_RECIPE};
use super::args::{CounterCmd, RecipesCmd, SessionCmd, UsersCmd};
use super::print::{print_json, settled};
use super::stores::{self, Persisted, Session};

/// API client authenticated with the persisted session token.
async fn connect(config: &Config) -> Result<(Api, Persisted<Session>)> {
    let session = stores::open_session(&config.persistence).await?;
    let token = TokenSlot::new();
    token.set(
        session
            .state
            .get()
            .and_then(|s| s.access_token)
            .map(SecureString::new),
    );
    let api = Api::new(&config.api, token)?;
    Ok((api, session))
}

pub async fn recipes(config: &Config, action: RecipesCmd) -> Result<()> {
    let (api, _session) = connect(config).await?;

    match action {
        RecipesCmd::List => {
            let recipes = settled(api.all_recipes.initiate(()).await)?;
            print_json(&*recipes)
        }
        RecipesCmd::Get { id } => {
            let recipe = settled(api.recipe.initiate(id).await)?;
            print_json(&*recipe)
        }
        RecipesCmd::ByUser { user_id } => {
            let recipes = settled(api.recipes_by_user.initiate(user_id).await)?;
            print_json(&*recipes)
        }
        RecipesCmd::Add {
            user_id,
            title,
            category,
            servings,
            cook_time,
            description,
            ingredients,
            steps,
            image_url,
        } => {
            // Warm the list caches so the invalidation below has something to refresh.
            let _ = api.all_recipes.initiate(()).await;
            let _ = api.recipes_by_user.initiate(user_id).await;

            let dto = CreateRecipeDto {
                image_url,
                user_id,
                title,
                category,
                servings,
                cook_time,
                description,
                ingredients: ingredients
                    .into_iter()
                    .map(|(name, quantity)| (name, Value::String(quantity)))
                    .collect::<BTreeMap<_, _>>(),
                steps,
            };
            let created = settled(api.add_recipe.trigger(dto).await)?;
            print_json(&*created)?;
            report_refreshed(&api);
            Ok(())
        }
        RecipesCmd::Delete { id } => {
            let _ = api.all_recipes.initiate(()).await;
            settled(api.delete_recipe.trigger(id).await)?;
            println!("Deleted recipe {id}");
            report_refreshed(&api);
            Ok(())
        }
    }
}

fn report_refreshed(api: &Api) {
    for tag in [RECIPES, USER_RECIPE] {
        for url in api.registry.urls(tag) {
            eprintln!("Refreshed {tag}: {url}");
        }
    }
}

pub async fn users(config: &Config, action: UsersCmd) -> Result<()> {
    let (api, session) = connect(config).await?;

    match action {
        UsersCmd::Me => {
            let me = settled(api.me.initiate(()).await)?;
            let username = me.username.clone();
            session.state.set_with(|current| Session {
                username: Some(username),
                ..current.cloned().unwrap_or_default()
            })?;
            session.writes.flush().await;
            print_json(&*me)
        }
        UsersCmd::Get { id } => {
            let user = settled(api.user.initiate(id).await)?;
            print_json(&*user)
        }
        UsersCmd::Follow {
            follower_id,
            following_id,
        } => {
            let dto = Follower {
                follower_id,
                following_id,
            };
            let user = settled(api.follow.trigger(dto).await)?;
            print_json(&*user)
        }
        UsersCmd::Unfollow {
            follower_id,
            following_id,
        } => {
            let dto = Follower {
                follower_id,
                following_id,
            };
            let user = settled(api.unfollow.trigger(dto).await)?;
            print_json(&*user)
        }
    }
}

pub async fn session(config: &Config, action: SessionCmd) -> Result<()> {
    let session = stores::open_session(&config.persistence).await?;

    match action {
        SessionCmd::Login { token } => {
            session.state.set_with(|current| Session {
                access_token: Some(token),
                ..current.cloned().unwrap_or_default()
            })?;
            session.writes.flush().await;
            println!("Token stored");
        }
        SessionCmd::Logout => {
            session.state.set(Session::default())?;
            session.writes.flush().await;
            println!("Token removed");
        }
        SessionCmd::Show => match session.state.get().and_then(|s| s.access_token) {
            Some(token) => println!("Token: {}", SecureString::new(token)),
            None => println!("No token stored"),
        },
    }
    Ok(())
}

pub async fn counter(config: &Config, action: CounterCmd) -> Result<()> {
    let counter = stores::open_counter(&config.persistence).await?;

    match action {
        CounterCmd::Increment { by } => {
            counter
                .state
                .set_with(|value| value.copied().unwrap_or(0) + by)?;
        }
        CounterCmd::Reset => counter.state.set(0)?,
        CounterCmd::Show => {}
    }
    counter.writes.flush().await;

    println!("{}", counter.state.get().unwrap_or(0));
    Ok(())
}
