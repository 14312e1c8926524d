//! Dynamic Values
//!
//! Reactive state in Sprig is stored as [`Value`]s inside [`RawObject`]s.
//! A raw object is a plain, shared, mutable property map. It has identity:
//! cloning a `RawObject` clones the handle, not the map, and two handles are
//! "the same object" only if they point at the same map.
//!
//! # Identity Equality
//!
//! [`Value::same`] is the equality used for change detection everywhere in
//! the runtime. It compares:
//!
//! - numbers with same-value semantics (`NaN` equals `NaN`, `0.0` differs
//!   from `-0.0`),
//! - strings by content,
//! - lists, objects and reactive wrappers by pointer.
//!
//! Structurally equal but distinct objects are *not* the same.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};

use super::deps;
use super::object::ReactiveObject;

/// Identity of a raw object, used to key the dependency store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Backing storage of a raw object.
struct ObjectCell {
    id: TargetId,
    props: RwLock<IndexMap<String, Value>>,
}

impl Drop for ObjectCell {
    fn drop(&mut self) {
        // The object is unreachable, so nothing can read or write it again.
        deps::retire_target(self.id);
    }
}

/// A plain mutable object with reference identity.
///
/// Reads and writes through a `RawObject` are untracked. Wrap it with
/// [`crate::reactive::reactive`] to get dependency tracking.
#[derive(Clone)]
pub struct RawObject {
    cell: Arc<ObjectCell>,
}

impl RawObject {
    /// Create a new, empty object.
    pub fn new() -> Self {
        Self {
            cell: Arc::new(ObjectCell {
                id: TargetId::next(),
                props: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Build an object from key/value pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let object = Self::new();
        {
            let mut props = object.cell.props.write();
            for (key, value) in pairs {
                props.insert(key.into(), value.into().into_raw());
            }
        }
        object
    }

    pub fn id(&self) -> TargetId {
        self.cell.id
    }

    /// Check whether two handles refer to the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Read a property without tracking.
    pub fn get(&self, key: &str) -> Value {
        self.cell.props.read().get(key).cloned().unwrap_or(Value::Null)
    }

    /// Write a property without triggering. Returns the previous value, if any.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let value = value.into().into_raw();
        self.cell.props.write().insert(key.into(), value)
    }

    /// Remove a property without triggering.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.cell.props.write().shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.cell.props.read().contains_key(key)
    }

    /// Property names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.cell.props.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.cell.props.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell.props.read().is_empty()
    }

    /// Snapshot of all properties in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.cell
            .props
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl Default for RawObject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawObject")
            .field("id", &self.id())
            .field("keys", &self.keys())
            .finish()
    }
}

/// A dynamically typed reactive value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    /// An immutable list. Replace the whole list to change it.
    List(Arc<[Value]>),
    Object(RawObject),
    Reactive(ReactiveObject),
}

impl Value {
    /// Identity equality. See the module docs.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Reactive(a), Value::Reactive(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Strip a reactive wrapper, yielding the raw object underneath.
    pub fn into_raw(self) -> Value {
        match self {
            Value::Reactive(object) => Value::Object(object.to_raw()),
            other => other,
        }
    }

    /// Whether this value is a plain or wrapped object.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Reactive(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64()
            .filter(|n| n.fract() == 0.0)
            .map(|n| n as i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&ReactiveObject> {
        match self {
            Value::Reactive(object) => Some(object),
            _ => None,
        }
    }

    /// The raw object behind an `Object` or `Reactive` value.
    pub fn as_raw_object(&self) -> Option<RawObject> {
        match self {
            Value::Object(object) => Some(object.clone()),
            Value::Reactive(object) => Some(object.to_raw()),
            _ => None,
        }
    }

    /// Render the value as display text, the way a text node would show it.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            other => other.to_json().to_string(),
        }
    }

    /// Convert to JSON without tracking. Cyclic references become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut seen = HashSet::new();
        self.to_json_inner(&mut seen)
    }

    fn to_json_inner(&self, seen: &mut HashSet<TargetId>) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.to_string()),
            Value::List(items) => {
                Json::Array(items.iter().map(|item| item.to_json_inner(seen)).collect())
            }
            Value::Object(_) | Value::Reactive(_) => {
                let Some(object) = self.as_raw_object() else {
                    return Json::Null;
                };
                if !seen.insert(object.id()) {
                    return Json::Null;
                }
                let map = object
                    .entries()
                    .into_iter()
                    .map(|(key, value)| (key, value.to_json_inner(seen)))
                    .collect();
                seen.remove(&object.id());
                Json::Object(map)
            }
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => f.debug_tuple("List").field(&items.len()).finish(),
            Value::Object(object) => write!(f, "Object({})", object.id()),
            Value::Reactive(object) => write!(f, "Reactive({})", object.id()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(Arc::from(value))
    }
}

impl From<RawObject> for Value {
    fn from(value: RawObject) -> Self {
        Value::Object(value)
    }
}

impl From<ReactiveObject> for Value {
    fn from(value: ReactiveObject) -> Self {
        Value::Reactive(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// JSON objects become fresh raw objects; arrays become lists.
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match value {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::from(s),
            Json::Array(items) => Value::from(items.into_iter().map(Value::from).collect::<Vec<_>>()),
            Json::Object(map) => Value::Object(RawObject::from_pairs(
                map.into_iter().map(|(key, value)| (key, Value::from(value))),
            )),
        }
    }
}
