//! Typed endpoints with a per-URL cache.
//!
//! # Cache-or-fetch cycle
//!
//! ```text
//! fetch(url)
//!   ├─ mark loading, clear error
//!   ├─ data cached? ──yes──→ mark idle (no request)
//!   └─ request ──ok──→ store data, register tags, invalidate invalid_tags
//!              ├─err─→ store error, keep previous data
//!              └─cancelled─→ mark idle, keep previous data
//! ```
//!
//! Entries live in the endpoint's private [`State`], keyed by resolved URL.
//! There is no TTL: data stays cached until `refetch` or a tag
//! invalidation clears it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use scopeguard::ScopeGuard;
use serde::de::DeserializeOwned;

use super::builder::ClientContext;
use super::entry::CacheEntry;
use super::error::ApiError;
use super::query::{Query, QueryOptions};
use super::request::RequestSpec;
use super::tags::RefetchFn;
use crate::state::{Selector, State};

type BuildFn<P> = Arc<dyn Fn(&P) -> RequestSpec + Send + Sync>;
type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);

/// Cache of one endpoint, keyed by resolved URL.
pub type CacheMap<R> = HashMap<String, CacheEntry<R>>;

/// Declaration of an endpoint: how to build its request and which tags it
/// provides or invalidates.
pub struct EndpointConfig<P> {
    build: BuildFn<P>,
    tags: Vec<String>,
    invalid_tags: Vec<String>,
    name: Option<String>,
}

impl<P> EndpointConfig<P> {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&P) -> RequestSpec + Send + Sync + 'static,
    {
        Self {
            build: Arc::new(build),
            tags: Vec::new(),
            invalid_tags: Vec::new(),
            name: None,
        }
    }

    /// Tags this endpoint's URLs are registered under after a successful fetch.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Tags refetched after each successful fetch of this endpoint.
    pub fn invalid_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalid_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Name used in log output.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A configured network operation paired with its own cache.
///
/// Cloning yields another handle to the same endpoint and cache.
pub struct Endpoint<P, R: Send + Sync + 'static> {
    inner: Arc<EndpointInner<P, R>>,
}

struct EndpointInner<P, R: Send + Sync + 'static> {
    id: u64,
    name: String,
    context: Arc<ClientContext>,
    build: BuildFn<P>,
    tags: Vec<String>,
    invalid_tags: Vec<String>,
    cache: State<CacheMap<R>>,
}

impl<P, R> Endpoint<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(context: Arc<ClientContext>, config: EndpointConfig<P>) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                id: NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed),
                name: config.name.unwrap_or_else(|| "endpoint".to_string()),
                context,
                build: config.build,
                tags: config.tags,
                invalid_tags: config.invalid_tags,
                cache: State::plain(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Request built for `params`.
    pub fn request(&self, params: &P) -> RequestSpec {
        (self.inner.build)(params)
    }

    /// Fully resolved URL for `params`.
    pub fn url(&self, params: &P) -> String {
        self.inner.resolve(params).0
    }

    /// The endpoint's cache store, for observers.
    pub fn cache(&self) -> &State<CacheMap<R>> {
        &self.inner.cache
    }

    /// Current entry for `params`; empty if the URL was never fetched.
    pub fn entry(&self, params: &P) -> CacheEntry<R> {
        let url = self.url(params);
        self.inner.entry(&url)
    }

    /// Current entry for `params` plus its trigger and refetch handles.
    pub fn view(&self, params: P) -> CacheView<P, R> {
        let url = self.url(&params);
        CacheView::new(self.clone(), params, url)
    }

    /// Equality-checked projection of the entry for `params`.
    pub fn select(&self, params: &P) -> Selector<CacheMap<R>, CacheEntry<R>> {
        let url = self.url(params);
        Selector::with_equality(
            &self.inner.cache,
            move |cache| {
                cache
                    .and_then(|entries| entries.get(&url).cloned())
                    .unwrap_or_default()
            },
            CacheEntry::same_as,
        )
    }

    /// One-shot fetch-or-return-cache.
    ///
    /// Does not start a request while the URL is already loading.
    pub async fn initiate(&self, params: P) -> CacheView<P, R> {
        let (url, spec) = self.inner.resolve(&params);
        if self.inner.entry(&url).is_loading {
            tracing::debug!(endpoint = %self.inner.name, url = %url, "Request already in flight");
        } else {
            Arc::clone(&self.inner)
                .fetch(params.clone(), url.clone(), spec)
                .await;
        }
        CacheView::new(self.clone(), params, url)
    }

    /// Run the cache-or-fetch cycle regardless of method.
    pub async fn trigger(&self, params: P) -> CacheView<P, R> {
        let (url, spec) = self.inner.resolve(&params);
        Arc::clone(&self.inner)
            .fetch(params.clone(), url.clone(), spec)
            .await;
        CacheView::new(self.clone(), params, url)
    }

    /// Clear cached data for `params` and fetch again.
    pub async fn refetch(&self, params: P) -> CacheView<P, R> {
        let url = self.url(&params);
        Arc::clone(&self.inner).refetch(params.clone()).await;
        CacheView::new(self.clone(), params, url)
    }

    /// Observation binding: auto-fetches GET requests unless skipped.
    pub fn use_query(&self, params: P, options: QueryOptions) -> Query<P, R> {
        Query::mount(self.clone(), params, options)
    }

    /// Start the cache-or-fetch cycle for `params` as a future.
    pub(crate) fn fetch_future(&self, params: P) -> BoxFuture {
        let (url, spec) = self.inner.resolve(&params);
        Arc::clone(&self.inner).fetch(params, url, spec)
    }
}

impl<P, R> EndpointInner<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: DeserializeOwned + Send + Sync + 'static,
{
    fn resolve(&self, params: &P) -> (String, RequestSpec) {
        let spec = (self.build)(params);
        let url = format!("{}{}", self.context.base_url, spec.path);
        (url, spec)
    }

    fn entry(&self, url: &str) -> CacheEntry<R> {
        self.cache
            .read(|entries| entries.and_then(|e| e.get(url).cloned()))
            .unwrap_or_default()
    }

    fn update_entry<F>(&self, url: &str, update: F)
    where
        F: FnOnce(&mut CacheEntry<R>),
    {
        let mut entry = self.entry(url);
        update(&mut entry);
        if let Err(err) = self.cache.merge(HashMap::from([(url.to_string(), entry)])) {
            tracing::error!(endpoint = %self.name, url = %url, error = %err, "Cache update rejected");
        }
    }

    fn refetch(self: Arc<Self>, params: P) -> BoxFuture {
        Box::pin(async move {
            let (url, spec) = self.resolve(&params);
            self.update_entry(&url, |entry| entry.data = None);
            self.fetch(params, url, spec).await;
        })
    }

    fn fetch(self: Arc<Self>, params: P, url: String, spec: RequestSpec) -> BoxFuture {
        Box::pin(async move {
            self.update_entry(&url, |entry| {
                entry.is_loading = true;
                entry.error = None;
            });

            if self.entry(&url).data.is_some() {
                tracing::debug!(endpoint = %self.name, url = %url, "Cache hit");
                self.update_entry(&url, |entry| entry.is_loading = false);
                return;
            }

            // Reset the entry if this future is dropped mid-request, e.g. an aborted query.
            let in_flight = scopeguard::guard((Arc::clone(&self), url.clone()), |(inner, url)| {
                tracing::debug!(endpoint = %inner.name, url = %url, "Request cancelled");
                inner.update_entry(&url, |entry| entry.is_loading = false);
            });
            let result = self.send(&url, &spec).await;
            drop(ScopeGuard::into_inner(in_flight));

            match result {
                Ok(data) => {
                    self.update_entry(&url, |entry| {
                        entry.data = Some(Arc::new(data));
                        entry.is_loading = false;
                        entry.error = None;
                    });

                    let registry = &self.context.registry;
                    for tag in &self.tags {
                        let refetch = refetch_hook(Arc::downgrade(&self), params.clone());
                        registry.register(tag, &url, self.id, refetch);
                    }
                    if !self.invalid_tags.is_empty() {
                        registry.invalidate(&self.invalid_tags).await;
                    }
                }
                Err(err) => {
                    tracing::warn!(endpoint = %self.name, url = %url, error = %err, "Request failed");
                    self.update_entry(&url, |entry| {
                        entry.error = Some(Arc::new(err));
                        entry.is_loading = false;
                    });
                }
            }
        })
    }

    async fn send(&self, url: &str, spec: &RequestSpec) -> Result<R, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(prepare) = &self.context.prepare_headers {
            prepare(&mut headers);
        }

        let mut request = self
            .context
            .client
            .request(spec.method.clone(), url)
            .headers(headers);
        if let Some(body) = &spec.body {
            request = request.json(body);
        }

        tracing::debug!(endpoint = %self.name, method = %spec.method, url = %url, "Sending request");
        let request_error = |source| ApiError::Request {
            url: url.to_string(),
            source,
        };
        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(request_error)?;

        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        // Bodiless success responses decode as JSON null.
        let body: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(body).map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

fn refetch_hook<P, R>(endpoint: Weak<EndpointInner<P, R>>, params: P) -> RefetchFn
where
    P: Clone + Send + Sync + 'static,
    R: DeserializeOwned + Send + Sync + 'static,
{
    Arc::new(move || -> BoxFuture {
        match endpoint.upgrade() {
            Some(inner) => inner.refetch(params.clone()),
            None => Box::pin(async {}),
        }
    })
}

impl<P, R: Send + Sync + 'static> Clone for Endpoint<P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, R: Send + Sync + 'static> fmt::Debug for Endpoint<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.inner.name)
            .field("tags", &self.inner.tags)
            .field("invalid_tags", &self.inner.invalid_tags)
            .finish()
    }
}

/// Snapshot of one URL's entry with handles bound to that URL.
///
/// Fields default to empty when the URL has no entry yet.
pub struct CacheView<P, R: Send + Sync + 'static> {
    pub url: String,
    pub data: Option<Arc<R>>,
    pub error: Option<Arc<ApiError>>,
    pub is_loading: bool,
    endpoint: Endpoint<P, R>,
    params: P,
}

impl<P, R> CacheView<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: DeserializeOwned + Send + Sync + 'static,
{
    fn new(endpoint: Endpoint<P, R>, params: P, url: String) -> Self {
        let entry = endpoint.inner.entry(&url);
        Self {
            url,
            data: entry.data,
            error: entry.error,
            is_loading: entry.is_loading,
            endpoint,
            params,
        }
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    /// Re-run the cache-or-fetch cycle for this URL.
    pub async fn trigger(&self) -> CacheView<P, R> {
        self.endpoint.trigger(self.params.clone()).await
    }

    /// Clear this URL's data and fetch it again.
    pub async fn refetch(&self) -> CacheView<P, R> {
        self.endpoint.refetch(self.params.clone()).await
    }

    /// Fresh snapshot of the same URL.
    pub fn reload(&self) -> CacheView<P, R> {
        CacheView::new(self.endpoint.clone(), self.params.clone(), self.url.clone())
    }
}

impl<P, R: fmt::Debug + Send + Sync + 'static> fmt::Debug for CacheView<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheView")
            .field("url", &self.url)
            .field("data", &self.data)
            .field("error", &self.error.as_ref().map(|e| e.to_string()))
            .field("is_loading", &self.is_loading)
            .finish()
    }
}
