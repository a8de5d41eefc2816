//! Reactive state container, storage-backed persistence middleware and a
//! request-caching API client with tag-based invalidation.

pub mod api;
pub mod config;
pub mod logging;
pub mod persistence;
pub mod state;
