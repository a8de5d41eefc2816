//! Middleware chain primitives.
//!
//! A middleware sees an immutable snapshot of the store value taken when the
//! dispatch started, plus the action, and answers with a [`Flow`] telling the
//! store how to continue. The store's terminal reducer always runs last and
//! is not a middleware.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use super::action::{Action, ActionKind};
use super::shape::StateShape;

/// Future resolving to the action that continues the chain, or `None` to stop it.
pub type DeferredAction<T> = Pin<Box<dyn Future<Output = Option<Action<T>>> + Send>>;

/// Continuation returned by a middleware.
pub enum Flow<T: StateShape> {
    /// Pass this (possibly rewritten) action to the next stage.
    Forward(Action<T>),
    /// Stop here. Nothing downstream runs and subscribers are not notified.
    Suppress,
    /// Resume the chain at the next stage once the future resolves.
    ///
    /// The dispatch call returns immediately; the store spawns the future on
    /// the current tokio runtime.
    Defer(DeferredAction<T>),
}

impl<T: StateShape> fmt::Debug for Flow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Forward(action) => write!(f, "Forward({})", action.kind),
            Flow::Suppress => f.write_str("Suppress"),
            Flow::Defer(_) => f.write_str("Defer(..)"),
        }
    }
}

/// A middleware refused an action.
#[derive(Debug, Error)]
#[error("Middleware '{middleware}' failed on {action} action: {message}")]
pub struct MiddlewareError {
    pub middleware: &'static str,
    pub action: String,
    pub message: String,
}

impl MiddlewareError {
    pub fn new(middleware: &'static str, action: &ActionKind, message: impl Into<String>) -> Self {
        Self {
            middleware,
            action: action.to_string(),
            message: message.into(),
        }
    }
}

/// One stage of a store's dispatch chain.
pub trait Middleware<T: StateShape>: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Inspect or rewrite `action` and decide how the chain continues.
    ///
    /// Returning `Err` interrupts the chain; the error propagates to the
    /// caller of `set`/`init`.
    fn handle(&self, current: Option<&T>, action: Action<T>) -> Result<Flow<T>, MiddlewareError>;
}

/// Logs every snapshot/action pair at debug level and forwards unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Logger;

impl<T> Middleware<T> for Logger
where
    T: StateShape + fmt::Debug,
    T::Items: fmt::Debug,
    T::Fields: fmt::Debug,
{
    fn name(&self) -> &'static str {
        "logger"
    }

    fn handle(&self, current: Option<&T>, action: Action<T>) -> Result<Flow<T>, MiddlewareError> {
        tracing::debug!(state = ?current, action = ?action, "Dispatching action");
        Ok(Flow::Forward(action))
    }
}
