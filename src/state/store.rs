//! The store entity: one boxed value, a middleware chain and subscribers.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::action::Action;
use super::middleware::{Flow, Middleware, MiddlewareError};
use super::shape::{self, StateShape, Update};

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    #[error("No tokio runtime available to resume a deferred dispatch")]
    NoRuntime,
}

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Loader<T> = Box<dyn Fn() -> Pin<Box<dyn Future<Output = T> + Send>> + Send + Sync>;

enum Initial<T> {
    Ready(T),
    Pending(Loader<T>),
}

/// A reactive container for a single value of type `T`.
///
/// Cloning a `State` yields another handle to the same store.
pub struct State<T: StateShape> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: StateShape> {
    value: RwLock<Option<T>>,
    initial: Initial<T>,
    middlewares: Vec<Box<dyn Middleware<T>>>,
    subscribers: Mutex<Vec<(u64, Subscriber<T>)>>,
    next_subscriber: AtomicU64,
    revision: watch::Sender<u64>,
}

/// Shorthand for [`State::new`].
pub fn create_state<T: StateShape>(
    initial: T,
    middlewares: Vec<Box<dyn Middleware<T>>>,
) -> Result<State<T>, StateError> {
    State::new(initial, middlewares)
}

impl<T: StateShape> State<T> {
    /// Create a store and dispatch its `init` action.
    ///
    /// # Errors
    /// Returns the error of any middleware that rejects the `init` action,
    /// or `NoRuntime` if a middleware defers outside a tokio runtime.
    pub fn new(initial: T, middlewares: Vec<Box<dyn Middleware<T>>>) -> Result<Self, StateError> {
        let state = Self::build(Initial::Ready(initial), middlewares);
        state.init()?;
        Ok(state)
    }

    /// Create a store whose initial value is produced by an async loader.
    ///
    /// The loader runs on the current tokio runtime; `get()` returns `None`
    /// until it resolves and the `init` action has gone through the chain.
    pub fn pending<F, Fut>(
        loader: F,
        middlewares: Vec<Box<dyn Middleware<T>>>,
    ) -> Result<Self, StateError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let loader: Loader<T> = Box::new(move || Box::pin(loader()));
        let state = Self::build(Initial::Pending(loader), middlewares);
        state.init()?;
        Ok(state)
    }

    /// Create a store without middlewares. Initialization cannot fail.
    pub fn plain(initial: T) -> Self {
        let state = Self::build(Initial::Ready(initial.clone()), Vec::new());
        state.inner.reduce(Action::init(initial));
        state
    }

    fn build(initial: Initial<T>, middlewares: Vec<Box<dyn Middleware<T>>>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(None),
                initial,
                middlewares,
                subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(0),
                revision,
            }),
        }
    }

    /// Dispatch an `init` action carrying the constructor's initial value.
    ///
    /// Called once by the constructors; calling it again re-seeds the store.
    pub fn init(&self) -> Result<(), StateError> {
        match &self.inner.initial {
            Initial::Ready(value) => self.dispatch(Action::init(value.clone())),
            Initial::Pending(loader) => {
                let runtime = Handle::try_current().map_err(|_| StateError::NoRuntime)?;
                let pending = loader();
                let state = self.clone();
                runtime.spawn(async move {
                    let value = pending.await;
                    // Let subscribers registered right after construction attach first.
                    tokio::task::yield_now().await;
                    if let Err(err) = state.dispatch(Action::init(value)) {
                        tracing::error!(error = %err, "Deferred init failed");
                    }
                });
                Ok(())
            }
        }
    }

    /// Current value, or `None` before the first `init` reaches the reducer.
    pub fn get(&self) -> Option<T> {
        self.inner.value.read().clone()
    }

    /// Borrow the current value without cloning it.
    ///
    /// `f` runs under the read lock and must not dispatch.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&T>) -> R,
    {
        f(self.inner.value.read().as_ref())
    }

    /// Replace the value.
    pub fn set(&self, value: T) -> Result<(), StateError> {
        self.dispatch(Action::set(Update::Replace(value)))
    }

    /// Replace the value with one computed from the current value.
    pub fn set_with<F>(&self, updater: F) -> Result<(), StateError>
    where
        F: FnOnce(Option<&T>) -> T,
    {
        let current = self.get();
        let next = updater(current.as_ref());
        self.set(next)
    }

    /// Shallow-merge fields over the current mapping.
    pub fn merge(&self, fields: T::Fields) -> Result<(), StateError> {
        self.dispatch(Action::set(Update::MergeFields(fields)))
    }

    /// Concatenate items after the current sequence.
    pub fn append(&self, items: T::Items) -> Result<(), StateError> {
        self.dispatch(Action::set(Update::Append(items)))
    }

    /// Dispatch a hand-built action.
    pub fn push_action(&self, action: Action<T>) -> Result<(), StateError> {
        self.dispatch(action)
    }

    /// Register a callback invoked with the new value after every reduction.
    ///
    /// Callbacks run synchronously, in registration order.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push((id, Arc::new(callback)));
        let inner: Arc<dyn SubscriberList> = self.inner.clone();
        Subscription {
            id,
            list: Arc::downgrade(&inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Receiver that ticks after every reduction.
    pub fn revisions(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Wait until the store holds a value.
    pub async fn initialized(&self) {
        let mut revisions = self.revisions();
        let inner = Arc::clone(&self.inner);
        // The sender lives as long as `inner`, so this only returns once the value is set.
        let _ = revisions
            .wait_for(|_| inner.value.read().is_some())
            .await;
    }

    fn dispatch(&self, action: Action<T>) -> Result<(), StateError> {
        let snapshot = self.get();
        Inner::run(&self.inner, 0, snapshot, action)
    }
}

impl<T: StateShape> Inner<T> {
    fn run(
        inner: &Arc<Self>,
        start: usize,
        snapshot: Option<T>,
        mut action: Action<T>,
    ) -> Result<(), StateError> {
        for index in start..inner.middlewares.len() {
            let middleware = &inner.middlewares[index];
            match middleware.handle(snapshot.as_ref(), action)? {
                Flow::Forward(next) => action = next,
                Flow::Suppress => {
                    tracing::trace!(middleware = middleware.name(), "Action suppressed");
                    return Ok(());
                }
                Flow::Defer(pending) => {
                    let runtime = Handle::try_current().map_err(|_| StateError::NoRuntime)?;
                    let inner = Arc::clone(inner);
                    let middleware = middleware.name();
                    runtime.spawn(async move {
                        let Some(action) = pending.await else {
                            tracing::trace!(middleware = middleware, "Deferred action dropped");
                            return;
                        };
                        if let Err(err) = Inner::run(&inner, index + 1, snapshot, action) {
                            tracing::error!(middleware = middleware, error = %err, "Deferred dispatch failed");
                        }
                    });
                    return Ok(());
                }
            }
        }

        inner.reduce(action);
        Ok(())
    }

    /// Terminal stage: the only place the boxed value changes.
    fn reduce(&self, action: Action<T>) {
        let next = {
            let mut value = self.value.write();
            let next = shape::apply(value.take(), action.update);
            *value = Some(next.clone());
            next
        };

        self.revision.send_modify(|revision| *revision += 1);

        let subscribers: Vec<Subscriber<T>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in subscribers {
            callback(&next);
        }
    }
}

trait SubscriberList: Send + Sync {
    fn remove(&self, id: u64) -> bool;
}

impl<T: StateShape> SubscriberList for Inner<T> {
    fn remove(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }
}

/// Handle returned by [`State::subscribe`].
///
/// The callback stays registered until [`Subscription::cancel`] is called.
pub struct Subscription {
    id: u64,
    list: Weak<dyn SubscriberList>,
}

impl Subscription {
    /// Remove the callback. Returns `false` if it was already removed.
    pub fn cancel(self) -> bool {
        self.list
            .upgrade()
            .map(|list| list.remove(self.id))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl<T: StateShape> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: StateShape + fmt::Debug> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("value", &*self.inner.value.read())
            .field("middlewares", &self.inner.middlewares.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
