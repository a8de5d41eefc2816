//! Tag registry for cross-endpoint cache invalidation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;

/// Callback that clears one cached URL and fetches it again.
pub type RefetchFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Clone)]
struct TagRecord {
    owner: u64,
    url: String,
    refetch: RefetchFn,
}

impl TagRecord {
    fn same_slot(&self, other: &TagRecord) -> bool {
        self.owner == other.owner && self.url == other.url
    }
}

/// Mapping from tag name to the URLs whose endpoints declared that tag.
///
/// Records are keyed by owning endpoint and URL, so two endpoints resolving
/// the same URL are both refetched. Cloning yields another handle to the
/// same registry.
#[derive(Clone, Default)]
pub struct TagRegistry {
    tags: Arc<Mutex<HashMap<String, Vec<TagRecord>>>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `url` of endpoint `owner` under `tag`.
    ///
    /// The first registration of an owner and URL wins; repeats are ignored.
    pub fn register(&self, tag: &str, url: &str, owner: u64, refetch: RefetchFn) {
        let mut tags = self.tags.lock();
        let records = tags.entry(tag.to_string()).or_default();
        if records.iter().any(|r| r.owner == owner && r.url == url) {
            return;
        }
        tracing::debug!(tag = %tag, url = %url, owner, "Registered tag");
        records.push(TagRecord {
            owner,
            url: url.to_string(),
            refetch,
        });
    }

    /// URLs currently registered under `tag`, in registration order.
    ///
    /// A URL shared by several endpoints is listed once per endpoint.
    pub fn urls(&self, tag: &str) -> Vec<String> {
        self.tags
            .lock()
            .get(tag)
            .map(|records| records.iter().map(|r| r.url.clone()).collect())
            .unwrap_or_default()
    }

    /// Names of all tags with at least one registered URL.
    pub fn tags(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tags.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Refetch every URL registered under any of `tags`.
    ///
    /// An endpoint URL listed under several of the given tags is refetched
    /// once. Returns the number of refetches performed.
    pub async fn invalidate<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        let records: Vec<TagRecord> = {
            let registered = self.tags.lock();
            let mut seen: Vec<TagRecord> = Vec::new();
            for tag in tags {
                for record in registered.get(tag.as_ref()).into_iter().flatten() {
                    if !seen.iter().any(|r| r.same_slot(record)) {
                        seen.push(record.clone());
                    }
                }
            }
            seen
        };

        if records.is_empty() {
            return 0;
        }

        tracing::info!(
            tags = ?tags.iter().map(|t| t.as_ref()).collect::<Vec<&str>>(),
            count = records.len(),
            "Invalidating tags"
        );
        for record in &records {
            (record.refetch)().await;
        }
        records.len()
    }
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags = self.tags.lock();
        let mut map = f.debug_map();
        for (tag, records) in tags.iter() {
            map.entry(tag, &records.iter().map(|r| r.url.as_str()).collect::<Vec<_>>());
        }
        map.finish()
    }
}
