use std::fmt;
use std::sync::OnceLock;

/// Primitive leaf types a record field, container element, or literal can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Primitive {
    Bool,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Str,
}

impl Primitive {
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Primitive::I32 | Primitive::U32 | Primitive::I64 | Primitive::U64
        )
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    fn tag(self) -> u8 {
        match self {
            Primitive::Bool => 0x01,
            Primitive::I32 => 0x02,
            Primitive::U32 => 0x03,
            Primitive::I64 => 0x04,
            Primitive::U64 => 0x05,
            Primitive::F32 => 0x06,
            Primitive::F64 => 0x07,
            Primitive::Str => 0x08,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Primitive::Bool => "bool",
            Primitive::I32 => "i32",
            Primitive::U32 => "u32",
            Primitive::I64 => "i64",
            Primitive::U64 => "u64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::Str => "str",
        };
        f.write_str(name)
    }
}

/// Types allowed as map keys. Booleans and floats are excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub enum MapKey {
    I32,
    U32,
    I64,
    U64,
    Str,
}

impl MapKey {
    #[must_use]
    pub fn primitive(self) -> Primitive {
        match self {
            MapKey::I32 => Primitive::I32,
            MapKey::U32 => Primitive::U32,
            MapKey::I64 => Primitive::I64,
            MapKey::U64 => Primitive::U64,
            MapKey::Str => Primitive::Str,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.primitive(), f)
    }
}

/// Static shape of a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Primitive(Primitive),
    Set(Primitive),
    List(Primitive),
    ListOfRecords(RecordSchema),
    Map(MapKey, Primitive),
    Record(RecordSchema),
}

impl Schema {
    pub const BOOL: Schema = Schema::Primitive(Primitive::Bool);
    pub const I32: Schema = Schema::Primitive(Primitive::I32);
    pub const U32: Schema = Schema::Primitive(Primitive::U32);
    pub const I64: Schema = Schema::Primitive(Primitive::I64);
    pub const U64: Schema = Schema::Primitive(Primitive::U64);
    pub const F32: Schema = Schema::Primitive(Primitive::F32);
    pub const F64: Schema = Schema::Primitive(Primitive::F64);
    pub const STR: Schema = Schema::Primitive(Primitive::Str);

    /// The primitive type, if this is a primitive leaf.
    #[must_use]
    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Schema::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Schema::Set(_) | Schema::List(_) | Schema::ListOfRecords(_) | Schema::Map(..)
        )
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Schema::Primitive(p) => out.push(p.tag()),
            Schema::Set(p) => {
                out.push(0x10);
                out.push(p.tag());
            }
            Schema::List(p) => {
                out.push(0x11);
                out.push(p.tag());
            }
            Schema::ListOfRecords(record) => {
                out.push(0x12);
                record.encode(out);
            }
            Schema::Map(k, v) => {
                out.push(0x13);
                out.push(k.primitive().tag());
                out.push(v.tag());
            }
            Schema::Record(record) => record.encode(out),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Primitive(p) => write!(f, "{p}"),
            Schema::Set(p) => write!(f, "set<{p}>"),
            Schema::List(p) => write!(f, "list<{p}>"),
            Schema::ListOfRecords(r) => write!(f, "list<{r}>"),
            Schema::Map(k, v) => write!(f, "map<{k},{v}>"),
            Schema::Record(r) => write!(f, "{r}"),
        }
    }
}

/// An ordered set of uniquely named fields.
///
/// Built with [`RecordSchema::field()`]. Re-declaring a field name replaces
/// its type in place, so field names are always unique.
///
/// # Example
///
/// ```
/// use ooroo_expr::{RecordSchema, Schema};
///
/// let schema = RecordSchema::new()
///     .field("symbol", Schema::STR)
///     .field("price", Schema::F64);
/// assert_eq!(schema.to_string(), "{symbol: str, price: f64}");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordSchema {
    fields: Vec<(String, Schema)>,
    fingerprint: OnceLock<Fingerprint>,
}

impl RecordSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field.
    #[must_use]
    pub fn field(mut self, name: &str, schema: Schema) -> Self {
        self.fingerprint = OnceLock::new();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| n == name) {
            slot.1 = schema;
        } else {
            self.fields.push((name.to_owned(), schema));
        }
        self
    }

    /// Look up a field's schema by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.fields
            .iter()
            .find_map(|(n, s)| (n == name).then_some(s))
    }

    /// Iterate over `(name, schema)` pairs in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Schema)> {
        self.fields.iter().map(|(n, s)| (n.as_str(), s))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Canonical byte encoding of this schema tree. Computed once and memoised.
    pub fn fingerprint(&self) -> &Fingerprint {
        self.fingerprint.get_or_init(|| {
            let mut bytes = Vec::new();
            self.encode(&mut bytes);
            Fingerprint::from_bytes(bytes)
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(0x20);
        out.extend_from_slice(&(self.fields.len() as u32).to_le_bytes());
        for (name, schema) in &self.fields {
            out.extend_from_slice(&(name.len() as u32).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            schema.encode(out);
        }
    }
}

impl PartialEq for RecordSchema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Display for RecordSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, schema)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {schema}")?;
        }
        write!(f, "}}")
    }
}

/// Canonical bytewise encoding of a schema tree (pre-order, field names
/// included, container kinds tagged). Used as half of the compile cache key.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Fingerprint {
    bytes: Vec<u8>,
}

impl Fingerprint {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Short BLAKE3 digest of the encoding, for display and tracing.
    #[must_use]
    pub fn digest(&self) -> String {
        let hash = blake3::hash(&self.bytes);
        hash.to_hex()[..16].to_owned()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.digest())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade() -> RecordSchema {
        RecordSchema::new()
            .field("symbol", Schema::STR)
            .field("price", Schema::F64)
            .field("quantity", Schema::I32)
            .field("buyOrSell", Schema::BOOL)
    }

    #[test]
    fn field_lookup() {
        let schema = trade();
        assert_eq!(schema.get("price"), Some(&Schema::F64));
        assert_eq!(schema.get("missing"), None);
        assert_eq!(schema.len(), 4);
    }

    #[test]
    fn redeclared_field_replaces_in_place() {
        let schema = trade().field("symbol", Schema::I64);
        assert_eq!(schema.len(), 4);
        assert_eq!(schema.fields().next(), Some(("symbol", &Schema::I64)));
    }

    #[test]
    fn equal_shapes_share_fingerprint() {
        assert_eq!(trade().fingerprint(), trade().fingerprint());
    }

    #[test]
    fn field_order_changes_fingerprint() {
        let a = RecordSchema::new()
            .field("a", Schema::I32)
            .field("b", Schema::I32);
        let b = RecordSchema::new()
            .field("b", Schema::I32)
            .field("a", Schema::I32);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn container_kind_changes_fingerprint() {
        let set = RecordSchema::new().field("x", Schema::Set(Primitive::Str));
        let list = RecordSchema::new().field("x", Schema::List(Primitive::Str));
        assert_ne!(set.fingerprint(), list.fingerprint());
    }

    #[test]
    fn field_name_boundaries_are_encoded() {
        // "ab" + "c" must not collide with "a" + "bc"
        let a = RecordSchema::new()
            .field("ab", Schema::I32)
            .field("c", Schema::I32);
        let b = RecordSchema::new()
            .field("a", Schema::I32)
            .field("bc", Schema::I32);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_resets_after_mutation() {
        let schema = trade();
        let before = schema.fingerprint().clone();
        let schema = schema.field("extra", Schema::U64);
        assert_ne!(&before, schema.fingerprint());
    }

    #[test]
    fn digest_is_short_hex() {
        let digest = trade().fingerprint().digest();
        assert_eq!(digest.len(), 16);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn display() {
        let schema = RecordSchema::new()
            .field("tags", Schema::Set(Primitive::Str))
            .field("counts", Schema::Map(MapKey::Str, Primitive::I32))
            .field(
                "rows",
                Schema::ListOfRecords(RecordSchema::new().field("id", Schema::U32)),
            );
        assert_eq!(
            schema.to_string(),
            "{tags: set<str>, counts: map<str,i32>, rows: list<{id: u32}>}"
        );
    }
}
