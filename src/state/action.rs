use std::fmt;

use super::shape::{StateShape, Update};

/// Kind of an action flowing through the middleware chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Seeds the store with its initial value.
    Init,
    /// A regular state change.
    Set,
    /// Integration-defined action, dispatched through `State::push_action`.
    Custom(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Init => "init",
            ActionKind::Set => "set",
            ActionKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action: what happened, and the update it carries.
#[derive(Clone)]
pub struct Action<T: StateShape> {
    pub kind: ActionKind,
    pub update: Update<T>,
}

impl<T: StateShape> Action<T> {
    pub fn new(kind: ActionKind, update: Update<T>) -> Self {
        Self { kind, update }
    }

    pub fn init(value: T) -> Self {
        Self::new(ActionKind::Init, Update::Replace(value))
    }

    pub fn set(update: Update<T>) -> Self {
        Self::new(ActionKind::Set, update)
    }

    pub fn custom(name: impl Into<String>, update: Update<T>) -> Self {
        Self::new(ActionKind::Custom(name.into()), update)
    }

    pub fn is_init(&self) -> bool {
        self.kind == ActionKind::Init
    }
}

impl<T> fmt::Debug for Action<T>
where
    T: StateShape + fmt::Debug,
    T::Items: fmt::Debug,
    T::Fields: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("kind", &self.kind)
            .field("update", &self.update)
            .finish()
    }
}
