//! Persisted stores of the CLI: the access-token session and the counter.

use std::convert::Infallible;
use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use tagstore::config::PersistenceSettings;
use tagstore::persistence::{FileStorage, PersistHandle, Persistence, PersistenceOptions};
use tagstore::state::{Logger, Middleware, State, StateError, StateShape};

pub const SESSION_KEY: &str = "session";
pub const COUNTER_KEY: &str = "counter";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: Option<String>,
    /// Username of the last `users me` call; not persisted.
    pub username: Option<String>,
}

impl StateShape for Session {
    type Items = Infallible;
    type Fields = Infallible;

    fn append(&mut self, items: Infallible) {
        match items {}
    }

    fn merge_fields(&mut self, fields: Infallible) {
        match fields {}
    }
}

/// A hydrated store plus the handle that flushes its pending writes.
pub struct Persisted<T: StateShape> {
    pub state: State<T>,
    pub writes: PersistHandle,
}

/// Open a store whose value survives across runs.
///
/// With persistence disabled in the config the store only holds `initial`.
pub async fn open<T>(
    key: &str,
    initial: T,
    settings: &PersistenceSettings,
    options: PersistenceOptions,
) -> Result<Persisted<T>, StateError>
where
    T: StateShape + Serialize + DeserializeOwned + fmt::Debug,
    T::Items: fmt::Debug,
    T::Fields: fmt::Debug,
{
    let mut chain: Vec<Box<dyn Middleware<T>>> = vec![Box::new(Logger)];
    let mut writes = PersistHandle::default();

    if let Some(storage) = FileStorage::from_settings(settings) {
        let persistence = Persistence::new(key, options.with_storage(storage));
        writes = persistence.flusher();
        chain.push(Box::new(persistence));
    }

    let state = State::new(initial, chain)?;
    state.initialized().await;
    Ok(Persisted { state, writes })
}

pub async fn open_session(settings: &PersistenceSettings) -> Result<Persisted<Session>, StateError> {
    let options = PersistenceOptions::default().whitelist(["access_token"]);
    open(SESSION_KEY, Session::default(), settings, options).await
}

pub async fn open_counter(settings: &PersistenceSettings) -> Result<Persisted<i64>, StateError> {
    open(COUNTER_KEY, 0i64, settings, PersistenceOptions::default()).await
}
