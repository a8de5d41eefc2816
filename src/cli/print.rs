use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;

use tagstore::api::CacheView;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Payload of a settled view, or its error.
pub fn settled<P, R: Send + Sync + 'static>(view: CacheView<P, R>) -> Result<Arc<R>> {
    if let Some(err) = view.error {
        return Err(anyhow!("{err}"));
    }
    view.data
        .ok_or_else(|| anyhow!("No data cached for {}", view.url))
}
