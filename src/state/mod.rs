//! Minimal reactive state container.
//!
//! # Architecture
//!
//! ```text
//! set / merge / append / push_action
//!        │
//!        ▼
//! Middleware ──→ Middleware ──→ ... ──→ terminal reducer ──→ subscribers
//!   (Forward | Suppress | Defer)          (three-way merge)
//! ```
//!
//! - **State**: one boxed value, changed only by the terminal reducer
//! - **Middleware**: ordered stages that may rewrite, suppress or defer actions
//! - **Selector**: equality-checked projection for observers

mod action;
mod middleware;
mod observer;
mod shape;
mod store;

pub use action::{Action, ActionKind};
pub use middleware::{DeferredAction, Flow, Logger, Middleware, MiddlewareError};
pub use observer::{ObserverAdapter, Selector, WatchAdapter};
pub use shape::{apply, reduce, StateShape, Update};
pub use store::{create_state, State, StateError, Subscription};
