//! Update shapes and the three-way merge rule.
//!
//! Every state mutation is one of three operations, chosen by the caller:
//!
//! - `Replace`: the value replaces the state outright
//! - `Append`: the items are concatenated after the current sequence
//! - `MergeFields`: the fields are shallow-merged over the current mapping
//!
//! Which operations a state type supports is decided by its [`StateShape`]
//! impl. Scalars use [`Infallible`] for both associated types, so an
//! `Append` or `MergeFields` update for them cannot be constructed.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;

use serde_json::{Map, Value};

/// Describes how a state type combines with incoming updates.
///
/// `Default` seeds the state when an `Append` or `MergeFields` update
/// reaches a store that has not been initialized yet.
pub trait StateShape: Clone + Default + Send + Sync + 'static {
    /// Payload of an `Append` update.
    type Items: Clone + Send + Sync + 'static;
    /// Payload of a `MergeFields` update.
    type Fields: Clone + Send + Sync + 'static;

    /// Concatenate `items` after the current contents.
    fn append(&mut self, items: Self::Items);

    /// Shallow-merge `fields` over the current contents.
    fn merge_fields(&mut self, fields: Self::Fields);
}

/// The value carried by an action.
#[derive(Clone)]
pub enum Update<T: StateShape> {
    Replace(T),
    Append(T::Items),
    MergeFields(T::Fields),
}

impl<T> fmt::Debug for Update<T>
where
    T: StateShape + fmt::Debug,
    T::Items: fmt::Debug,
    T::Fields: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Update::Append(items) => f.debug_tuple("Append").field(items).finish(),
            Update::MergeFields(fields) => f.debug_tuple("MergeFields").field(fields).finish(),
        }
    }
}

/// Apply `update` to `current` and return the next value.
///
/// This is the single merge rule shared by the terminal reducer and the
/// persistence middleware. It is not a deep merge.
pub fn reduce<T: StateShape>(current: Option<&T>, update: Update<T>) -> T {
    match update {
        Update::Replace(value) => value,
        other => apply(current.cloned(), other),
    }
}

/// Owned variant of [`reduce`], used by the terminal reducer.
pub fn apply<T: StateShape>(current: Option<T>, update: Update<T>) -> T {
    match update {
        Update::Replace(value) => value,
        Update::Append(items) => {
            let mut next = current.unwrap_or_default();
            next.append(items);
            next
        }
        Update::MergeFields(fields) => {
            let mut next = current.unwrap_or_default();
            next.merge_fields(fields);
            next
        }
    }
}

macro_rules! scalar_shape {
    ($($ty:ty),* $(,)?) => {
        $(
            impl StateShape for $ty {
                type Items = Infallible;
                type Fields = Infallible;

                fn append(&mut self, items: Infallible) {
                    match items {}
                }

                fn merge_fields(&mut self, fields: Infallible) {
                    match fields {}
                }
            }
        )*
    };
}

scalar_shape!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, String,
);

impl<I> StateShape for Vec<I>
where
    I: Clone + Send + Sync + 'static,
{
    type Items = Vec<I>;
    type Fields = Infallible;

    fn append(&mut self, items: Vec<I>) {
        self.extend(items);
    }

    fn merge_fields(&mut self, fields: Infallible) {
        match fields {}
    }
}

impl<K, V> StateShape for HashMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Items = Infallible;
    type Fields = HashMap<K, V>;

    fn append(&mut self, items: Infallible) {
        match items {}
    }

    fn merge_fields(&mut self, fields: HashMap<K, V>) {
        self.extend(fields);
    }
}

impl<K, V> StateShape for BTreeMap<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Items = Infallible;
    type Fields = BTreeMap<K, V>;

    fn append(&mut self, items: Infallible) {
        match items {}
    }

    fn merge_fields(&mut self, fields: BTreeMap<K, V>) {
        self.extend(fields);
    }
}

/// Dynamic JSON keeps the runtime rule: arrays concatenate, objects merge,
/// anything else is replaced by the incoming sequence or mapping.
impl StateShape for Value {
    type Items = Vec<Value>;
    type Fields = Map<String, Value>;

    fn append(&mut self, items: Vec<Value>) {
        match self {
            Value::Array(current) => current.extend(items),
            other => *other = Value::Array(items),
        }
    }

    fn merge_fields(&mut self, fields: Map<String, Value>) {
        match self {
            Value::Object(current) => current.extend(fields),
            other => *other = Value::Object(fields),
        }
    }
}
