//! Endpoint cache-or-fetch behaviour against a mock backend.

mod common;

use common::builder_for;
use common::mock_backend::{MockBackend, MockResponse};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tagstore::api::{
    bearer_auth, ApiBuilder, ApiError, Endpoint, EndpointConfig, QueryOptions, RequestSpec,
    SecureString, TagRegistry, TokenSlot,
};
use tagstore::state::WatchAdapter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Recipe {
    id: u64,
    title: String,
}

#[derive(Debug, Clone, Serialize)]
struct NewRecipe {
    title: String,
}

fn get_recipe(api: &ApiBuilder) -> Endpoint<String, Recipe> {
    api.endpoint(
        EndpointConfig::new(|id: &String| RequestSpec::get(format!("recipes/{id}")))
            .tags(["RECIPE"])
            .named("getRecipe"),
    )
}

fn get_all_recipes(api: &ApiBuilder) -> Endpoint<(), Vec<Recipe>> {
    api.endpoint(
        EndpointConfig::new(|_: &()| RequestSpec::get("recipes"))
            .tags(["RECIPES"])
            .named("getAllRecipes"),
    )
}

fn add_recipe(api: &ApiBuilder) -> Endpoint<NewRecipe, Recipe> {
    api.endpoint(
        EndpointConfig::new(|dto: &NewRecipe| RequestSpec::post("recipes").json(dto))
            .invalid_tags(["RECIPES", "USER_RECIPE"])
            .named("addRecipe"),
    )
}

#[tokio::test]
async fn test_get_recipe_success_populates_entry() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 7, "title": "Soup"}"#))
        .await;

    let (api, _registry) = builder_for(&mock.base_url());
    let endpoint = get_recipe(&api);
    assert_eq!(
        endpoint.url(&"7".to_string()),
        format!("{}recipes/7", mock.base_url())
    );

    let loading = Arc::new(Mutex::new(Vec::new()));
    let seen = loading.clone();
    let _subscription = endpoint
        .select(&"7".to_string())
        .subscribe(move |entry| seen.lock().push(entry.is_loading));

    let view = endpoint.initiate("7".to_string()).await;

    assert!(!view.is_loading);
    assert!(view.error.is_none());
    assert_eq!(
        view.data.as_deref(),
        Some(&Recipe {
            id: 7,
            title: "Soup".to_string()
        })
    );
    assert_eq!(*loading.lock(), vec![true, false]);

    let requests = mock.requests_to("GET", "/recipes/7").await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn test_get_recipe_server_error_sets_error() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::error(500, "boom")).await;

    let (api, registry) = builder_for(&mock.base_url());
    let endpoint = get_recipe(&api);

    let view = endpoint.initiate("7".to_string()).await;

    assert!(!view.is_loading);
    assert!(view.data.is_none());
    let error = view.error.expect("error should be set");
    assert_eq!(error.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(matches!(*error, ApiError::Status { .. }));

    // Failed fetches never register tags.
    assert!(registry.urls("RECIPE").is_empty());
}

#[tokio::test]
async fn test_invalid_json_is_decode_error() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json("not json")).await;

    let (api, _registry) = builder_for(&mock.base_url());
    let view = get_recipe(&api).initiate("1".to_string()).await;

    assert!(matches!(
        view.error.as_deref(),
        Some(ApiError::Decode { .. })
    ));
}

#[tokio::test]
async fn test_cache_hit_issues_single_request() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 1, "title": "Bread"}"#))
        .await;

    let (api, _registry) = builder_for(&mock.base_url());
    let endpoint = get_recipe(&api);

    let first = endpoint.initiate("1".to_string()).await;
    let second = endpoint.initiate("1".to_string()).await;

    assert_eq!(mock.captured_requests().await.len(), 1);
    assert!(Arc::ptr_eq(
        first.data.as_ref().unwrap(),
        second.data.as_ref().unwrap()
    ));
    assert!(!second.is_loading);
}

#[tokio::test]
async fn test_distinct_urls_are_cached_separately() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 1, "title": "Bread"}"#))
        .await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 2, "title": "Cake"}"#))
        .await;

    let (api, _registry) = builder_for(&mock.base_url());
    let endpoint = get_recipe(&api);

    endpoint.initiate("1".to_string()).await;
    endpoint.initiate("2".to_string()).await;

    assert_eq!(endpoint.entry(&"1".to_string()).data.unwrap().title, "Bread");
    assert_eq!(endpoint.entry(&"2".to_string()).data.unwrap().title, "Cake");
    assert!(endpoint.entry(&"3".to_string()).data.is_none());
}

#[tokio::test]
async fn test_refetch_twice_yields_same_value() {
    let mock = MockBackend::start().await;
    for _ in 0..3 {
        mock.enqueue_response(MockResponse::json(r#"{"id": 4, "title": "Pie"}"#))
            .await;
    }

    let (api, _registry) = builder_for(&mock.base_url());
    let endpoint = get_recipe(&api);

    endpoint.initiate("4".to_string()).await;
    let first = endpoint.refetch("4".to_string()).await;
    let second = endpoint.refetch("4".to_string()).await;

    assert_eq!(first.data, second.data);
    assert_eq!(mock.requests_to("GET", "/recipes/4").await.len(), 3);
}

#[tokio::test]
async fn test_view_handles_are_bound_to_url() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 5, "title": "Old"}"#))
        .await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 5, "title": "New"}"#))
        .await;

    let (api, _registry) = builder_for(&mock.base_url());
    let view = get_recipe(&api).initiate("5".to_string()).await;
    assert_eq!(view.data.as_ref().unwrap().title, "Old");

    // trigger on a cached URL is a cache hit; refetch always goes to the network.
    let triggered = view.trigger().await;
    assert_eq!(triggered.data.as_ref().unwrap().title, "Old");

    let refreshed = view.refetch().await;
    assert_eq!(refreshed.data.as_ref().unwrap().title, "New");
    assert_eq!(view.reload().data.as_ref().unwrap().title, "New");
    assert_eq!(mock.captured_requests().await.len(), 2);
}

#[tokio::test]
async fn test_add_recipe_refetches_tagged_list() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json(r#"[{"id": 1, "title": "Bread"}]"#))
        .await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 2, "title": "Cake"}"#))
        .await;
    mock.enqueue_response(MockResponse::json(
        r#"[{"id": 1, "title": "Bread"}, {"id": 2, "title": "Cake"}]"#,
    ))
    .await;

    let (api, registry) = builder_for(&mock.base_url());
    let all_recipes = get_all_recipes(&api);
    let add = add_recipe(&api);

    let list = all_recipes.initiate(()).await;
    assert_eq!(list.data.as_ref().unwrap().len(), 1);
    assert_eq!(registry.urls("RECIPES"), vec![format!("{}recipes", mock.base_url())]);

    let created = add
        .trigger(NewRecipe {
            title: "Cake".to_string(),
        })
        .await;
    assert_eq!(created.data.as_ref().unwrap().id, 2);

    // The list was refreshed before trigger returned, without re-subscribing.
    let list = all_recipes.entry(&());
    assert_eq!(list.data.as_ref().unwrap().len(), 2);
    assert!(!list.is_loading);

    assert_eq!(mock.requests_to("GET", "/recipes").await.len(), 2);
    let posts = mock.requests_to("POST", "/recipes").await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].json(), serde_json::json!({"title": "Cake"}));
}

#[tokio::test]
async fn test_invalidation_skips_untagged_endpoints() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 9, "title": "Tea"}"#))
        .await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 10, "title": "Jam"}"#))
        .await;

    let (api, _registry) = builder_for(&mock.base_url());
    let recipe = get_recipe(&api);
    let add = add_recipe(&api);

    recipe.initiate("9".to_string()).await;
    add.trigger(NewRecipe {
        title: "Jam".to_string(),
    })
    .await;

    // RECIPE is not among addRecipe's invalid tags.
    assert_eq!(mock.requests_to("GET", "/recipes/9").await.len(), 1);
    assert!(recipe.entry(&"9".to_string()).data.is_some());
}

#[tokio::test]
async fn test_explicit_invalidate_refetches_registered_urls() {
    let mock = MockBackend::start().await;
    for _ in 0..2 {
        mock.enqueue_response(MockResponse::json(r#"{"id": 1, "title": "Bread"}"#))
            .await;
    }
    let (api, registry) = builder_for(&mock.base_url());
    let recipe = get_recipe(&api);

    recipe.initiate("1".to_string()).await;
    recipe.initiate("1".to_string()).await;
    assert_eq!(registry.urls("RECIPE").len(), 1);

    let refetched = registry.invalidate(&["RECIPE"]).await;
    assert_eq!(refetched, 1);
    assert_eq!(mock.requests_to("GET", "/recipes/1").await.len(), 2);
}

#[tokio::test]
async fn test_registries_are_isolated() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json("[]")).await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 1, "title": "x"}"#))
        .await;
    let (api_a, registry_a) = builder_for(&mock.base_url());
    let registry_b = TagRegistry::new();
    let api_b = ApiBuilder::new(mock.base_url(), registry_b.clone());

    get_all_recipes(&api_a).initiate(()).await;
    add_recipe(&api_b)
        .trigger(NewRecipe {
            title: "x".to_string(),
        })
        .await;

    assert_eq!(registry_a.urls("RECIPES").len(), 1);
    assert!(registry_b.urls("RECIPES").is_empty());
    // Only the initial list fetch; the other registry had nothing to refresh.
    assert_eq!(mock.requests_to("GET", "/recipes").await.len(), 1);
}

#[tokio::test]
async fn test_prepare_headers_adds_bearer_token() {
    let mock = MockBackend::start().await;
    let slot = TokenSlot::new();
    slot.set(Some(SecureString::new("t0k")));

    let api = ApiBuilder::new(mock.base_url(), TagRegistry::new())
        .with_prepare_headers(bearer_auth(slot.clone()));
    let me: Endpoint<(), serde_json::Value> =
        api.endpoint(EndpointConfig::new(|_: &()| RequestSpec::get("users/me")));

    me.initiate(()).await;
    slot.set(None);
    me.refetch(()).await;

    let requests = mock.requests_to("GET", "/users/me").await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].header("authorization"), Some("Bearer t0k"));
    assert_eq!(requests[1].header("authorization"), None);
}

#[tokio::test]
async fn test_initiate_skips_url_already_loading() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 3, "title": "Slow"}"#).with_delay(100))
        .await;

    let (api, _registry) = builder_for(&mock.base_url());
    let endpoint = get_recipe(&api);

    let background = endpoint.clone();
    let first = tokio::spawn(async move { background.initiate("3".to_string()).await.data });

    let loading = endpoint.clone();
    assert!(
        common::wait_until(
            || loading.entry(&"3".to_string()).is_loading,
            Duration::from_secs(2)
        )
        .await
    );

    let second = endpoint.initiate("3".to_string()).await;
    assert!(second.is_loading);
    assert!(second.data.is_none());

    assert!(first.await.unwrap().is_some());
    assert_eq!(mock.captured_requests().await.len(), 1);
}

#[tokio::test]
async fn test_query_auto_fetches_get() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 8, "title": "Stew"}"#))
        .await;

    let (api, _registry) = builder_for(&mock.base_url());
    let endpoint = get_recipe(&api);

    let (adapter, receiver) = WatchAdapter::new();
    let mut query = endpoint.use_query("8".to_string(), QueryOptions::default());
    let _binding = query.selector().bind(adapter);
    assert!(receiver.borrow().as_ref().unwrap().data.is_none());

    query.settled().await;

    let view = query.view();
    assert_eq!(view.data.as_ref().unwrap().title, "Stew");
    assert_eq!(
        receiver.borrow().as_ref().unwrap().data.as_ref().unwrap().id,
        8
    );
}

#[tokio::test]
async fn test_query_skip_and_non_get_do_not_fetch() {
    let mock = MockBackend::start().await;
    let (api, _registry) = builder_for(&mock.base_url());

    let mut skipped = get_recipe(&api).use_query("1".to_string(), QueryOptions::skip(true));
    skipped.settled().await;

    let add = add_recipe(&api);
    let mut mutation = add.use_query(
        NewRecipe {
            title: "x".to_string(),
        },
        QueryOptions::default(),
    );
    mutation.settled().await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(mock.captured_requests().await.is_empty());
    assert!(skipped.view().data.is_none());
    assert!(!skipped.view().is_loading);
}

#[tokio::test]
async fn test_query_param_change_fetches_new_url() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 1, "title": "One"}"#))
        .await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 2, "title": "Two"}"#))
        .await;

    let (api, _registry) = builder_for(&mock.base_url());
    let endpoint = get_recipe(&api);

    let mut query = endpoint.use_query("1".to_string(), QueryOptions::default());
    query.settled().await;

    // Same URL and options: nothing new is fetched.
    query.set_params("1".to_string(), QueryOptions::default());
    query.settled().await;

    query.set_params("2".to_string(), QueryOptions::default());
    query.settled().await;

    assert_eq!(query.url(), format!("{}recipes/2", mock.base_url()));
    assert_eq!(query.view().data.as_ref().unwrap().title, "Two");
    assert_eq!(mock.captured_requests().await.len(), 2);
}

#[tokio::test]
async fn test_dropped_query_leaves_entry_idle() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 6, "title": "Late"}"#).with_delay(100))
        .await;

    let (api, _registry) = builder_for(&mock.base_url());
    let endpoint = get_recipe(&api);

    let query = endpoint.use_query("6".to_string(), QueryOptions::default());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(endpoint.entry(&"6".to_string()).is_loading);
    drop(query);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let entry = endpoint.entry(&"6".to_string());
    assert!(entry.data.is_none());
    assert!(!entry.is_loading);

    // The URL is not stuck "in flight": the next initiate goes to the network.
    mock.enqueue_response(MockResponse::json(r#"{"id": 6, "title": "Fresh"}"#))
        .await;
    let view = endpoint.initiate("6".to_string()).await;
    assert!(!view.is_loading);
    assert_eq!(view.data.as_ref().unwrap().title, "Fresh");
    assert_eq!(mock.requests_to("GET", "/recipes/6").await.len(), 2);
}

#[tokio::test]
async fn test_unmounted_query_can_be_initiated_again() {
    let mock = MockBackend::start().await;
    mock.enqueue_response(MockResponse::json(r#"{"id": 2, "title": "Slow"}"#).with_delay(100))
        .await;

    let (api, _registry) = builder_for(&mock.base_url());
    let endpoint = get_recipe(&api);

    let mut query = endpoint.use_query("2".to_string(), QueryOptions::default());
    tokio::time::sleep(Duration::from_millis(20)).await;
    query.unmount();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!query.view().is_loading);

    mock.enqueue_response(MockResponse::json(r#"{"id": 2, "title": "Quick"}"#))
        .await;
    let view = endpoint.initiate("2".to_string()).await;
    assert_eq!(view.data.as_ref().unwrap().title, "Quick");
}

#[tokio::test]
async fn test_endpoints_sharing_url_are_all_invalidated() {
    let mock = MockBackend::start().await;
    for _ in 0..4 {
        mock.enqueue_response(MockResponse::json(r#"{"id": 1, "title": "Bread"}"#))
            .await;
    }

    let (api, registry) = builder_for(&mock.base_url());
    let recipe = get_recipe(&api);
    let featured: Endpoint<String, Recipe> = api.endpoint(
        EndpointConfig::new(|id: &String| RequestSpec::get(format!("recipes/{id}")))
            .tags(["FEATURED"])
            .named("getFeatured"),
    );

    recipe.initiate("1".to_string()).await;
    featured.initiate("1".to_string()).await;
    assert_eq!(mock.requests_to("GET", "/recipes/1").await.len(), 2);

    let refetched = registry.invalidate(&["RECIPE", "FEATURED"]).await;
    assert_eq!(refetched, 2);
    assert_eq!(mock.requests_to("GET", "/recipes/1").await.len(), 4);
    assert!(recipe.entry(&"1".to_string()).data.is_some());
    assert!(featured.entry(&"1".to_string()).data.is_some());
}
