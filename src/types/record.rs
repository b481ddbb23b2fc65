use std::collections::HashMap;

use super::value::Scalar;

/// Read-only view of a live record value.
///
/// The engine never sees the host's value representation: it walks a
/// compiled path through these accessors. Every method that is reachable
/// after a successful type check should answer in the shape the schema
/// promised; a mismatch surfaces as
/// [`Error::RecordShapeMismatch`](crate::Error::RecordShapeMismatch).
pub trait Record {
    /// The value of a named field, or `None` if the record has no such field.
    fn field(&self, name: &str) -> Option<Node<'_>>;
}

/// A position inside a record reached by following a path.
#[derive(Clone, Copy)]
pub enum Node<'a> {
    Scalar(Scalar<'a>),
    Record(&'a dyn Record),
    List(&'a dyn ListAccess),
    Set(&'a dyn SetAccess),
    Map(&'a dyn MapAccess),
}

impl Node<'_> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Node::Scalar(_) => "scalar",
            Node::Record(_) => "record",
            Node::List(_) => "list",
            Node::Set(_) => "set",
            Node::Map(_) => "map",
        }
    }
}

/// Ordered, indexable container (`list<P>` or `list<record>`).
pub trait ListAccess {
    fn len(&self) -> usize;

    /// Element at `index`, or `None` when out of range.
    fn at(&self, index: usize) -> Option<Node<'_>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unordered container of unique primitives (`set<P>`).
pub trait SetAccess {
    fn len(&self) -> usize;

    fn contains(&self, elem: &Scalar<'_>) -> bool;

    /// All elements, in no particular order. Used by the case-insensitive verbs.
    fn elements(&self) -> Box<dyn Iterator<Item = Scalar<'_>> + '_>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keyed container (`map<K,V>`).
pub trait MapAccess {
    fn len(&self) -> usize;

    fn get(&self, key: &Scalar<'_>) -> Option<Scalar<'_>>;

    fn contains_key(&self, key: &Scalar<'_>) -> bool {
        self.get(key).is_some()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Owned record values
// ---------------------------------------------------------------------------

/// Owned, dynamically typed value used by [`RecordValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    List(ListValue),
    Set(SetValue),
    Map(MapValue),
    Record(RecordValue),
}

impl Value {
    fn as_node(&self) -> Node<'_> {
        match self {
            Value::Bool(v) => Node::Scalar(Scalar::Bool(*v)),
            Value::I32(v) => Node::Scalar(Scalar::I32(*v)),
            Value::U32(v) => Node::Scalar(Scalar::U32(*v)),
            Value::I64(v) => Node::Scalar(Scalar::I64(*v)),
            Value::U64(v) => Node::Scalar(Scalar::U64(*v)),
            Value::F32(v) => Node::Scalar(Scalar::F32(*v)),
            Value::F64(v) => Node::Scalar(Scalar::F64(*v)),
            Value::Str(v) => Node::Scalar(Scalar::Str(v)),
            Value::List(v) => Node::List(v),
            Value::Set(v) => Node::Set(v),
            Value::Map(v) => Node::Map(v),
            Value::Record(v) => Node::Record(v),
        }
    }

    fn as_scalar(&self) -> Option<Scalar<'_>> {
        match self.as_node() {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Str,
    ListValue => List,
    SetValue => Set,
    MapValue => Map,
    RecordValue => Record,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

/// A map key held by [`MapValue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Str(String),
}

impl KeyValue {
    fn from_scalar(key: &Scalar<'_>) -> Option<Self> {
        Some(match key {
            Scalar::I32(v) => KeyValue::I32(*v),
            Scalar::U32(v) => KeyValue::U32(*v),
            Scalar::I64(v) => KeyValue::I64(*v),
            Scalar::U64(v) => KeyValue::U64(*v),
            Scalar::Str(v) => KeyValue::Str((*v).to_owned()),
            _ => return None,
        })
    }
}

macro_rules! key_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for KeyValue {
            fn from(v: $ty) -> Self {
                KeyValue::$variant(v)
            }
        })*
    };
}

key_from! {
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    String => Str,
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Str(v.to_owned())
    }
}

/// Owned list of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListValue(Vec<Value>);

impl ListValue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(mut self, value: impl Into<Value>) -> Self {
        self.0.push(value.into());
        self
    }
}

impl<T: Into<Value>> FromIterator<T> for ListValue {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl ListAccess for ListValue {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn at(&self, index: usize) -> Option<Node<'_>> {
        self.0.get(index).map(Value::as_node)
    }
}

/// Owned set of primitive values. Inserting a duplicate is a no-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetValue(Vec<Value>);

impl SetValue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn insert(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !self.0.contains(&value) {
            self.0.push(value);
        }
        self
    }
}

impl<T: Into<Value>> FromIterator<T> for SetValue {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |set, v| set.insert(v))
    }
}

impl SetAccess for SetValue {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn contains(&self, elem: &Scalar<'_>) -> bool {
        self.0
            .iter()
            .filter_map(Value::as_scalar)
            .any(|s| s.matches(elem, false))
    }

    fn elements(&self) -> Box<dyn Iterator<Item = Scalar<'_>> + '_> {
        Box::new(self.0.iter().filter_map(Value::as_scalar))
    }
}

/// Owned map from primitive keys to primitive values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapValue(HashMap<KeyValue, Value>);

impl MapValue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn insert(mut self, key: impl Into<KeyValue>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl MapAccess for MapValue {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn get(&self, key: &Scalar<'_>) -> Option<Scalar<'_>> {
        self.0
            .get(&KeyValue::from_scalar(key)?)
            .and_then(Value::as_scalar)
    }
}

/// Owned record mapping field names to [`Value`]s.
///
/// Supports dot-separated paths in [`set()`](Self::set), creating
/// intermediate records as needed.
///
/// # Example
///
/// ```
/// use ooroo_expr::RecordValue;
///
/// let trade = RecordValue::new()
///     .set("symbol", "IBM")
///     .set("price", 150.0_f64)
///     .set("desk.region", "emea");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordValue {
    fields: HashMap<String, Value>,
}

impl RecordValue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value at a dot-separated path.
    #[must_use]
    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.insert(path, value.into());
        self
    }

    /// Insert a value at a dot-separated path (mutable reference version).
    pub fn insert(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        Self::insert_recursive(&mut self.fields, &segments, value);
    }

    /// Look up a value by dot-separated path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            match current {
                Value::Record(record) => current = record.fields.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    fn insert_recursive(fields: &mut HashMap<String, Value>, segments: &[&str], value: Value) {
        match segments {
            [] => {}
            [last] => {
                fields.insert((*last).to_owned(), value);
            }
            [first, rest @ ..] => {
                let entry = fields
                    .entry((*first).to_owned())
                    .or_insert_with(|| Value::Record(RecordValue::new()));
                if !matches!(entry, Value::Record(_)) {
                    *entry = Value::Record(RecordValue::new());
                }
                if let Value::Record(nested) = entry {
                    Self::insert_recursive(&mut nested.fields, rest, value);
                }
            }
        }
    }
}

impl Record for RecordValue {
    fn field(&self, name: &str) -> Option<Node<'_>> {
        self.fields.get(name).map(Value::as_node)
    }
}
