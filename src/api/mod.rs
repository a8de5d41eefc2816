//! Request-caching API client with tag-based invalidation.
//!
//! # Architecture
//!
//! ```text
//! ApiBuilder (base URL, header hook, TagRegistry)
//!     │ endpoint(config)
//!     ▼
//! Endpoint<P, R> ── private State<HashMap<url, CacheEntry<R>>>
//!     │ initiate / trigger / refetch / use_query
//!     ▼
//! cache-or-fetch ──success──→ TagRegistry::register(tags)
//!                          └→ TagRegistry::invalidate(invalid_tags) ──→ other endpoints refetch
//! ```

mod builder;
mod credentials;
mod endpoint;
mod entry;
mod error;
mod query;
mod request;
mod tags;

pub use builder::{ApiBuilder, HeaderHook};
pub use credentials::{bearer_auth, SecureString, TokenSlot};
pub use endpoint::{CacheMap, CacheView, Endpoint, EndpointConfig};
pub use entry::CacheEntry;
pub use error::ApiError;
pub use query::{Query, QueryOptions};
pub use request::RequestSpec;
pub use tags::{RefetchFn, TagRegistry};
