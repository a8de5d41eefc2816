use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

/// What an endpoint's `build` function produces for a set of params.
///
/// `path` is appended to the builder's base URL as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub path: String,
    pub method: Method,
    pub body: Option<Value>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// A body that fails to serialize is logged and left unset.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.body = Some(value),
            Err(e) => tracing::warn!(path = %self.path, error = %e, "Dropping unserializable request body"),
        }
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self::get("")
    }
}
