//! Observation binding for endpoints.
//!
//! A [`Query`] stands for one mounted consumer of an endpoint. Mounting with
//! a GET request starts the cache-or-fetch cycle on the current runtime;
//! changing params, unmounting or dropping the query aborts that task.

use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::endpoint::{CacheMap, CacheView, Endpoint};
use super::entry::CacheEntry;
use crate::state::{Selector, Subscription};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Do not fetch automatically.
    pub skip: bool,
}

impl QueryOptions {
    pub fn skip(skip: bool) -> Self {
        Self { skip }
    }
}

pub struct Query<P, R: Send + Sync + 'static> {
    endpoint: Endpoint<P, R>,
    params: P,
    url: String,
    options: QueryOptions,
    task: Option<JoinHandle<()>>,
}

impl<P, R> Query<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn mount(endpoint: Endpoint<P, R>, params: P, options: QueryOptions) -> Self {
        let url = endpoint.url(&params);
        let mut query = Self {
            endpoint,
            params,
            url,
            options,
            task: None,
        };
        query.start();
        query
    }

    fn start(&mut self) {
        if self.options.skip || !self.endpoint.request(&self.params).is_get() {
            return;
        }
        match Handle::try_current() {
            Ok(runtime) => {
                let future = self.endpoint.fetch_future(self.params.clone());
                self.task = Some(runtime.spawn(future));
            }
            Err(_) => {
                tracing::warn!(
                    endpoint = %self.endpoint.name(),
                    url = %self.url,
                    "No tokio runtime; automatic fetch skipped"
                );
            }
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    /// Current entry for the mounted URL.
    pub fn view(&self) -> CacheView<P, R> {
        self.endpoint.view(self.params.clone())
    }

    /// Remount with new params or options.
    ///
    /// Nothing is refetched when the resolved URL and options are unchanged.
    pub fn set_params(&mut self, params: P, options: QueryOptions) {
        let url = self.endpoint.url(&params);
        self.params = params;
        if url == self.url && options == self.options {
            return;
        }
        self.unmount();
        self.url = url;
        self.options = options;
        self.start();
    }

    /// Abort the automatic fetch if it is still running.
    pub fn unmount(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Wait for the automatic fetch to finish.
    pub async fn settled(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn selector(&self) -> Selector<CacheMap<R>, CacheEntry<R>> {
        self.endpoint.select(&self.params)
    }

    /// Call `on_change` whenever the mounted URL's entry changes.
    pub fn subscribe<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&CacheEntry<R>) + Send + Sync + 'static,
    {
        self.selector().subscribe(on_change)
    }
}

impl<P, R: Send + Sync + 'static> Drop for Query<P, R> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
