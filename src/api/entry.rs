use std::fmt;
use std::sync::Arc;

use super::error::ApiError;

/// Cached state of one resolved URL.
///
/// Payloads and errors are shared behind `Arc`, so cloning an entry is
/// cheap and `R` does not need to be `Clone`.
pub struct CacheEntry<R> {
    /// Last successful payload.
    pub data: Option<Arc<R>>,
    pub is_loading: bool,
    /// Last failure; cleared when a new fetch starts.
    pub error: Option<Arc<ApiError>>,
}

impl<R> CacheEntry<R> {
    /// Identity comparison: same flags and the very same payload and error.
    pub fn same_as(&self, other: &Self) -> bool {
        fn same<X>(a: &Option<Arc<X>>, b: &Option<Arc<X>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
        }
        self.is_loading == other.is_loading
            && same(&self.data, &other.data)
            && same(&self.error, &other.error)
    }
}

impl<R> Default for CacheEntry<R> {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
        }
    }
}

impl<R> Clone for CacheEntry<R> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
        }
    }
}

impl<R: fmt::Debug> fmt::Debug for CacheEntry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("data", &self.data)
            .field("is_loading", &self.is_loading)
            .field("error", &self.error.as_ref().map(|e| e.to_string()))
            .finish()
    }
}
