//! Entry point of the API layer: shared client settings plus an endpoint factory.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::endpoint::{Endpoint, EndpointConfig};
use super::error::ApiError;
use super::tags::TagRegistry;
use crate::config::ApiSettings;

/// Hook adding headers to every request, e.g. [`super::bearer_auth`].
pub type HeaderHook = Arc<dyn Fn(&mut HeaderMap) + Send + Sync>;

/// Settings shared by every endpoint of one builder.
pub(crate) struct ClientContext {
    pub(crate) base_url: String,
    pub(crate) client: Client,
    pub(crate) prepare_headers: Option<HeaderHook>,
    pub(crate) registry: TagRegistry,
}

/// Produces endpoints bound to one base URL and one tag registry.
#[derive(Clone)]
pub struct ApiBuilder {
    base_url: String,
    client: Client,
    prepare_headers: Option<HeaderHook>,
    registry: TagRegistry,
}

impl ApiBuilder {
    /// Builder with a default HTTP client.
    ///
    /// Request URLs are `base_url` followed by the built path, so
    /// `base_url` normally ends with `/`.
    pub fn new(base_url: impl Into<String>, registry: TagRegistry) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
            prepare_headers: None,
            registry,
        }
    }

    /// Builder using the `[api]` section of the configuration.
    pub fn from_settings(settings: &ApiSettings, registry: TagRegistry) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_seconds))
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self::new(settings.base_url.clone(), registry).with_client(client))
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Install the header preparation hook.
    pub fn with_prepare_headers<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut HeaderMap) + Send + Sync + 'static,
    {
        self.prepare_headers = Some(Arc::new(hook));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Declare an endpoint with its own cache.
    pub fn endpoint<P, R>(&self, config: EndpointConfig<P>) -> Endpoint<P, R>
    where
        P: Clone + Send + Sync + 'static,
        R: DeserializeOwned + Send + Sync + 'static,
    {
        let context = Arc::new(ClientContext {
            base_url: self.base_url.clone(),
            client: self.client.clone(),
            prepare_headers: self.prepare_headers.clone(),
            registry: self.registry.clone(),
        });
        Endpoint::new(context, config)
    }
}

impl std::fmt::Debug for ApiBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiBuilder")
            .field("base_url", &self.base_url)
            .field("prepare_headers", &self.prepare_headers.is_some())
            .finish()
    }
}
