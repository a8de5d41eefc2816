//! Recipes and users endpoints of the pwa.baby backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tagstore::api::{bearer_auth, ApiBuilder, ApiError, Endpoint, EndpointConfig, RequestSpec, TagRegistry, TokenSlot};
use tagstore::config::ApiSettings;

pub const RECIPES: &str = "RECIPES";
pub const RECIPE: &str = "RECIPE";
pub const USER_RECIPE: &str = "USER_RECIPE";
pub const USER_ME: &str = "USER_ME";
pub const USER: &str = "USER";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: u64,
    #[serde(default)]
    pub author: Value,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_id: u64,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub cook_time: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub ingredients: BTreeMap<String, Value>,
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecipeDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub user_id: u64,
    pub title: String,
    pub category: String,
    pub servings: u32,
    pub cook_time: String,
    pub description: String,
    pub ingredients: BTreeMap<String, Value>,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Follower {
    pub follower_id: u64,
    pub following_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub followers: Vec<Follower>,
    #[serde(default)]
    pub following: Vec<Follower>,
}

/// Every endpoint the CLI talks to, sharing one tag registry.
pub struct Api {
    pub registry: TagRegistry,
    pub all_recipes: Endpoint<(), Vec<Recipe>>,
    pub recipe: Endpoint<String, Recipe>,
    pub recipes_by_user: Endpoint<u64, Vec<Recipe>>,
    pub add_recipe: Endpoint<CreateRecipeDto, Recipe>,
    pub delete_recipe: Endpoint<u64, Value>,
    pub me: Endpoint<(), User>,
    pub user: Endpoint<u64, User>,
    pub follow: Endpoint<Follower, User>,
    pub unfollow: Endpoint<Follower, User>,
}

impl Api {
    pub fn new(settings: &ApiSettings, token: TokenSlot) -> Result<Self, ApiError> {
        let registry = TagRegistry::new();
        let api = ApiBuilder::from_settings(settings, registry.clone())?
            .with_prepare_headers(bearer_auth(token));

        Ok(Self {
            all_recipes: api.endpoint(
                EndpointConfig::new(|_: &()| RequestSpec::get("recipes"))
                    .tags([RECIPES])
                    .named("getAllRecipes"),
            ),
            recipe: api.endpoint(
                EndpointConfig::new(|id: &String| RequestSpec::get(format!("recipes/{id}")))
                    .tags([RECIPE])
                    .named("getRecipe"),
            ),
            recipes_by_user: api.endpoint(
                EndpointConfig::new(|user_id: &u64| {
                    RequestSpec::get(format!("recipes/users/{user_id}"))
                })
                .tags([USER_RECIPE])
                .named("getRecipeByUser"),
            ),
            add_recipe: api.endpoint(
                EndpointConfig::new(|dto: &CreateRecipeDto| RequestSpec::post("recipes").json(dto))
                    .invalid_tags([RECIPES, USER_RECIPE])
                    .named("addRecipe"),
            ),
            delete_recipe: api.endpoint(
                EndpointConfig::new(|id: &u64| RequestSpec::delete(format!("recipes/{id}")))
                    .invalid_tags([RECIPES, USER_RECIPE])
                    .named("deleteRecipe"),
            ),
            me: api.endpoint(
                EndpointConfig::new(|_: &()| RequestSpec::get("users/me"))
                    .tags([USER_ME])
                    .named("getMe"),
            ),
            user: api.endpoint(
                EndpointConfig::new(|id: &u64| RequestSpec::get(format!("users/{id}")))
                    .tags([USER])
                    .named("getUser"),
            ),
            follow: api.endpoint(
                EndpointConfig::new(|dto: &Follower| RequestSpec::post("followers/follow").json(dto))
                    .tags([USER])
                    .named("followUser"),
            ),
            unfollow: api.endpoint(
                EndpointConfig::new(|dto: &Follower| {
                    RequestSpec::delete("followers/unfollow").json(dto)
                })
                .tags([USER])
                .named("unfollowUser"),
            ),
            registry,
        })
    }
}
