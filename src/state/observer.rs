//! Observation binding between a store and a rendering layer.
//!
//! The core is [`Selector`]: a projection of a store's value plus an
//! equality check, re-emitting only when the projection actually changes.
//! Rendering systems plug in through [`ObserverAdapter`]; [`WatchAdapter`]
//! is the adapter for async consumers driven by a tokio `watch` channel.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::shape::StateShape;
use super::store::{State, Subscription};

type Transform<T, C> = Arc<dyn Fn(Option<&T>) -> C + Send + Sync>;
type Equality<C> = Arc<dyn Fn(&C, &C) -> bool + Send + Sync>;

/// A live, equality-checked projection of a store's value.
pub struct Selector<T: StateShape, C> {
    state: State<T>,
    transform: Transform<T, C>,
    equality: Equality<C>,
}

impl<T, C> Selector<T, C>
where
    T: StateShape,
    C: Clone + Send + Sync + 'static,
{
    /// Project with `transform`, comparing projections with `PartialEq`.
    pub fn new<F>(state: &State<T>, transform: F) -> Self
    where
        F: Fn(Option<&T>) -> C + Send + Sync + 'static,
        C: PartialEq,
    {
        Self::with_equality(state, transform, |a: &C, b: &C| a == b)
    }

    /// Project with `transform`, treating projections as unchanged while
    /// `equality(old, new)` holds.
    pub fn with_equality<F, E>(state: &State<T>, transform: F, equality: E) -> Self
    where
        F: Fn(Option<&T>) -> C + Send + Sync + 'static,
        E: Fn(&C, &C) -> bool + Send + Sync + 'static,
    {
        Self {
            state: state.clone(),
            transform: Arc::new(transform),
            equality: Arc::new(equality),
        }
    }

    /// The projection of the current value. Never blocks on initialization.
    pub fn get(&self) -> C {
        self.state.read(|value| (self.transform)(value))
    }

    /// Call `on_change` whenever the projection changes.
    pub fn subscribe<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&C) + Send + Sync + 'static,
    {
        let last = Mutex::new(self.get());
        let transform = Arc::clone(&self.transform);
        let equality = Arc::clone(&self.equality);
        self.state.subscribe(move |value| {
            let next = transform(Some(value));
            {
                let mut last = last.lock();
                if equality(&last, &next) {
                    return;
                }
                *last = next.clone();
            }
            on_change(&next);
        })
    }

    /// Drive `adapter` from this selector.
    pub fn bind<A>(&self, adapter: A) -> Subscription
    where
        A: ObserverAdapter<C> + 'static,
    {
        adapter.changed(&self.get());
        self.subscribe(move |value| adapter.changed(value))
    }
}

impl<T: StateShape, C> Clone for Selector<T, C> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            transform: Arc::clone(&self.transform),
            equality: Arc::clone(&self.equality),
        }
    }
}

/// Glue between a selector and a concrete rendering or observation system.
pub trait ObserverAdapter<C>: Send + Sync {
    /// Called with the initial projection on bind and with every change after.
    fn changed(&self, value: &C);
}

/// Publishes projections into a tokio `watch` channel.
pub struct WatchAdapter<C> {
    sender: watch::Sender<Option<C>>,
}

impl<C: Clone + Send + Sync + 'static> WatchAdapter<C> {
    pub fn new() -> (Self, watch::Receiver<Option<C>>) {
        let (sender, receiver) = watch::channel(None);
        (Self { sender }, receiver)
    }
}

impl<C: Clone + Send + Sync + 'static> ObserverAdapter<C> for WatchAdapter<C> {
    fn changed(&self, value: &C) {
        self.sender.send_replace(Some(value.clone()));
    }
}
