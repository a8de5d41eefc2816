//! Access-token handling for request headers.
//!
//! The token obtained by a login flow lives in a [`TokenSlot`]; the
//! [`bearer_auth`] hook reads it on every request, so a token set after the
//! builder was created is still picked up.

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

/// Wrapper for sensitive strings that prevents accidental logging.
///
/// The inner value is never exposed via Debug or Display traits.
/// Use `expose()` to access the actual value when building headers.
#[derive(Clone, PartialEq, Eq)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the inner value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureString(••••••••)")
    }
}

impl std::fmt::Display for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "••••••••")
    }
}

/// Shared, replaceable access token.
#[derive(Debug, Clone, Default)]
pub struct TokenSlot {
    token: Arc<RwLock<Option<SecureString>>>,
}

impl TokenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<SecureString>) {
        *self.token.write() = token.filter(|t| !t.expose().is_empty());
    }

    pub fn get(&self) -> Option<SecureString> {
        self.token.read().clone()
    }
}

/// Header hook adding `Authorization: Bearer <token>` while a token is set.
pub fn bearer_auth(slot: TokenSlot) -> impl Fn(&mut HeaderMap) + Send + Sync + 'static {
    move |headers| {
        let Some(token) = slot.get() else {
            return;
        };
        match HeaderValue::from_str(&format!("Bearer {}", token.expose())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("Access token contains invalid header characters"),
        }
    }
}
