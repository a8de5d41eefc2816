//! Storage-backed persistence as a store middleware.
//!
//! On `init` the middleware defers the chain until the record under its key
//! has been read, then substitutes the hydrated value into the action. On
//! `set` it computes the value the reducer is about to produce, filters and
//! serializes it, queues the write, and forwards the original action.

mod error;
mod storage;

pub use error::StorageError;
pub use storage::{FileStorage, MemoryStorage, Storage};

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::state::{reduce, Action, ActionKind, Flow, Middleware, MiddlewareError, StateShape, Update};

/// Custom serializer applied after key filtering.
pub type SerializeFn = Arc<dyn Fn(&Value) -> Result<String, serde_json::Error> + Send + Sync>;
/// Custom deserializer applied to the raw stored text.
pub type DeserializeFn = Arc<dyn Fn(&str) -> Result<Value, serde_json::Error> + Send + Sync>;

static STORAGE_WARNING: Once = Once::new();

/// Options for [`Persistence`].
///
/// Leaving `storage` unset selects [`FileStorage`] in the platform data
/// directory, unless `no_storage` is set. `whitelist` takes precedence over
/// `blacklist`.
#[derive(Default, Clone)]
pub struct PersistenceOptions {
    pub storage: Option<Arc<dyn Storage>>,
    /// Run without any backend, as when no data directory exists.
    pub no_storage: bool,
    pub serialize: Option<SerializeFn>,
    pub deserialize: Option<DeserializeFn>,
    pub whitelist: Option<Vec<String>>,
    pub blacklist: Option<Vec<String>>,
}

impl PersistenceOptions {
    pub fn with_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Arc::new(storage));
        self.no_storage = false;
        self
    }

    /// Turn the middleware into a pass-through.
    pub fn without_storage(mut self) -> Self {
        self.storage = None;
        self.no_storage = true;
        self
    }

    /// Persist only these top-level keys.
    pub fn whitelist<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Persist everything except these top-level keys.
    pub fn blacklist<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn serialize_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Result<String, serde_json::Error> + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(f));
        self
    }

    pub fn deserialize_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<Value, serde_json::Error> + Send + Sync + 'static,
    {
        self.deserialize = Some(Arc::new(f));
        self
    }
}

/// Middleware persisting a store's value under `key`.
pub struct Persistence<T> {
    key: String,
    backend: Option<Backend>,
    _marker: PhantomData<fn() -> T>,
}

struct Backend {
    serialize: Option<SerializeFn>,
    deserialize: Option<DeserializeFn>,
    whitelist: Option<Vec<String>>,
    blacklist: Option<Vec<String>>,
    writer: Arc<Writer>,
}

/// Serializes writes for one key through a single background task.
struct Writer {
    key: String,
    storage: Arc<dyn Storage>,
    disabled: AtomicBool,
    queue: Mutex<Option<mpsc::UnboundedSender<WriteCommand>>>,
}

enum WriteCommand {
    Write(String),
    Flush(oneshot::Sender<()>),
}

/// Handle for awaiting queued writes after the middleware moved into a store.
#[derive(Clone, Default)]
pub struct PersistHandle {
    writer: Option<Arc<Writer>>,
}

/// Persistence with default options.
pub fn persistence<T>(key: impl Into<String>) -> Persistence<T> {
    Persistence::new(key, PersistenceOptions::default())
}

impl<T> Persistence<T> {
    pub fn new(key: impl Into<String>, options: PersistenceOptions) -> Self {
        let key = key.into();
        let storage = match options.storage {
            Some(storage) => Some(storage),
            None if options.no_storage => None,
            None => FileStorage::default_location()
                .map(|dir| Arc::new(FileStorage::new(dir)) as Arc<dyn Storage>),
        };

        let Some(storage) = storage else {
            STORAGE_WARNING.call_once(|| {
                tracing::warn!("Storage unavailable. Persistence disabled.");
            });
            return Self {
                key,
                backend: None,
                _marker: PhantomData,
            };
        };

        let writer = Arc::new(Writer {
            key: key.clone(),
            storage,
            disabled: AtomicBool::new(false),
            queue: Mutex::new(None),
        });

        Self {
            key,
            backend: Some(Backend {
                serialize: options.serialize,
                deserialize: options.deserialize,
                whitelist: options.whitelist,
                blacklist: options.blacklist,
                writer,
            }),
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// False when no backend was available or the backend failed.
    pub fn is_enabled(&self) -> bool {
        self.active().is_some()
    }

    /// Handle for flushing this middleware's writes.
    pub fn flusher(&self) -> PersistHandle {
        PersistHandle {
            writer: self.backend.as_ref().map(|b| Arc::clone(&b.writer)),
        }
    }

    fn active(&self) -> Option<&Backend> {
        self.backend
            .as_ref()
            .filter(|b| !b.writer.disabled.load(Ordering::Relaxed))
    }
}

impl<T> Middleware<T> for Persistence<T>
where
    T: StateShape + Serialize + DeserializeOwned,
{
    fn name(&self) -> &'static str {
        "persistence"
    }

    fn handle(&self, current: Option<&T>, action: Action<T>) -> Result<Flow<T>, MiddlewareError> {
        let Some(backend) = self.active() else {
            return Ok(Flow::Forward(action));
        };

        match action.kind {
            ActionKind::Init => Ok(self.hydrate(backend, action)),
            ActionKind::Set => {
                let next = reduce(current, action.update.clone());
                match encode(&self.key, &next, backend) {
                    Ok(text) => backend.writer.enqueue(text),
                    Err(err) => {
                        tracing::warn!(key = %self.key, error = %err, "Skipping persistence write");
                    }
                }
                Ok(Flow::Forward(action))
            }
            ActionKind::Custom(_) => Ok(Flow::Forward(action)),
        }
    }
}

impl<T> Persistence<T>
where
    T: StateShape + Serialize + DeserializeOwned,
{
    fn hydrate(&self, backend: &Backend, action: Action<T>) -> Flow<T> {
        let Update::Replace(default) = &action.update else {
            return Flow::Forward(action);
        };
        let default = default.clone();
        let writer = Arc::clone(&backend.writer);
        let deserialize = backend.deserialize.clone();

        Flow::Defer(Box::pin(async move {
            match load(&writer, deserialize.as_ref(), &default).await {
                Ok(Some(value)) => {
                    tracing::debug!(key = %writer.key, "Hydrated state from storage");
                    Some(Action::new(action.kind, Update::Replace(value)))
                }
                Ok(None) => Some(action),
                Err(err) => {
                    if err.is_backend_failure() {
                        writer.disable(&err);
                    } else {
                        tracing::warn!(key = %writer.key, error = %err, "Ignoring unreadable record");
                    }
                    Some(action)
                }
            }
        }))
    }
}

impl Writer {
    fn enqueue(self: &Arc<Self>, text: String) {
        let mut queue = self.queue.lock();
        if let Some(sender) = queue.as_ref() {
            match sender.send(WriteCommand::Write(text)) {
                Ok(()) => return,
                // The runtime that hosted the writer task is gone; start a new one.
                Err(mpsc::error::SendError(command)) => {
                    *queue = None;
                    drop(queue);
                    if let WriteCommand::Write(text) = command {
                        self.enqueue(text);
                    }
                    return;
                }
            }
        }

        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(key = %self.key, "No tokio runtime; persistence write skipped");
            return;
        };
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(WriteCommand::Write(text));
        *queue = Some(sender);
        runtime.spawn(Arc::clone(self).run(receiver));
    }

    async fn run(self: Arc<Self>, mut receiver: mpsc::UnboundedReceiver<WriteCommand>) {
        while let Some(command) = receiver.recv().await {
            match command {
                WriteCommand::Write(text) => {
                    if self.disabled.load(Ordering::Relaxed) {
                        continue;
                    }
                    if let Err(err) = self.storage.set_item(&self.key, &text).await {
                        if err.is_backend_failure() {
                            self.disable(&err);
                        } else {
                            tracing::warn!(key = %self.key, error = %err, "Persistence write failed");
                        }
                    }
                }
                WriteCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
    }

    fn disable(&self, err: &StorageError) {
        if !self.disabled.swap(true, Ordering::Relaxed) {
            tracing::warn!(key = %self.key, error = %err, "Storage failed. Persistence disabled.");
        }
    }
}

impl PersistHandle {
    /// Wait until every write queued so far has reached storage.
    pub async fn flush(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (done, finished) = oneshot::channel();
        let sent = writer
            .queue
            .lock()
            .as_ref()
            .map(|sender| sender.send(WriteCommand::Flush(done)).is_ok())
            .unwrap_or(false);
        if sent {
            let _ = finished.await;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer
            .as_ref()
            .map(|w| !w.disabled.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

async fn load<T>(
    writer: &Writer,
    deserialize: Option<&DeserializeFn>,
    default: &T,
) -> Result<Option<T>, StorageError>
where
    T: Serialize + DeserializeOwned,
{
    let Some(text) = writer.storage.get_item(&writer.key).await? else {
        return Ok(None);
    };

    let decode_error = |source| StorageError::Deserialize {
        key: writer.key.clone(),
        source,
    };
    let stored = match deserialize {
        Some(f) => f(&text),
        None => serde_json::from_str(&text),
    }
    .map_err(decode_error)?;

    // Filtered records only hold some keys; the rest come from the default.
    let merged = match (serde_json::to_value(default), stored) {
        (Ok(Value::Object(mut base)), Value::Object(stored)) => {
            base.extend(stored);
            Value::Object(base)
        }
        (_, stored) => stored,
    };

    serde_json::from_value(merged).map(Some).map_err(decode_error)
}

fn encode<T: Serialize>(key: &str, value: &T, backend: &Backend) -> Result<String, StorageError> {
    let serialize_error = |source| StorageError::Serialize {
        key: key.to_string(),
        source,
    };
    let value = serde_json::to_value(value).map_err(serialize_error)?;
    let value = filter_keys(value, backend.whitelist.as_deref(), backend.blacklist.as_deref());
    match &backend.serialize {
        Some(f) => f(&value),
        None => serde_json::to_string(&value),
    }
    .map_err(serialize_error)
}

fn filter_keys(value: Value, whitelist: Option<&[String]>, blacklist: Option<&[String]>) -> Value {
    let Value::Object(map) = value else {
        return value;
    };
    let map = if let Some(allowed) = whitelist {
        map.into_iter().filter(|(k, _)| allowed.contains(k)).collect()
    } else if let Some(denied) = blacklist {
        map.into_iter().filter(|(k, _)| !denied.contains(k)).collect()
    } else {
        map
    };
    Value::Object(map)
}
