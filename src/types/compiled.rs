use std::fmt;

use crate::Error;
use crate::trace::{TraceSink, Tracer};

use super::expr::{Group, PNode, Subexpr};
use super::record::Record;
use super::schema::Fingerprint;

/// An expression validated against one schema shape, ready to evaluate.
///
/// Immutable once built. Subexpression ids are dense, start at 1, and follow
/// source order; every group of [`tree()`](Self::tree) uses one connective.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    pub(crate) source: String,
    pub(crate) subexprs: Vec<Subexpr>,
    pub(crate) tree: Group,
    pub(crate) fingerprint: Fingerprint,
}

impl CompiledExpression {
    /// The expression text this was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Subexpressions in source order. `subexprs()[i].id() == i + 1`.
    #[must_use]
    pub fn subexprs(&self) -> &[Subexpr] {
        &self.subexprs
    }

    /// Root of the parenthesization tree.
    #[must_use]
    pub fn tree(&self) -> &Group {
        &self.tree
    }

    /// Fingerprint of the schema this was compiled for.
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Evaluate against a record whose shape matches the compiled schema.
    ///
    /// # Errors
    ///
    /// Returns an evaluation-stage [`Error`] carrying the id of the first
    /// subexpression (in source order) that failed.
    pub fn evaluate(
        &self,
        record: &dyn Record,
        sink: Option<&mut dyn TraceSink>,
    ) -> Result<bool, Error> {
        crate::evaluate::evaluate(self, record, &mut Tracer::new(sink))
    }

    fn fmt_group(&self, group: &Group, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = group.connective.map(|c| format!(" {c} ")).unwrap_or_default();
        let mut first = true;
        for child in &group.children {
            match child {
                PNode::Subexprs { first: lo, last: hi } => {
                    let range = *lo..=*hi;
                    for se in self.subexprs.iter().filter(|se| range.contains(&se.id)) {
                        if !first {
                            f.write_str(&sep)?;
                        }
                        first = false;
                        write!(f, "{se}")?;
                    }
                }
                PNode::Group(inner) => {
                    if !first {
                        f.write_str(&sep)?;
                    }
                    first = false;
                    f.write_str("(")?;
                    self.fmt_group(inner, f)?;
                    f.write_str(")")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(feature = "binary-cache")]
impl CompiledExpression {
    /// Encode this compiled form, header included.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::SerializeError) if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, crate::SerializeError> {
        crate::serial::encode(self)
    }

    /// Decode a compiled form produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::DeserializeError) on format,
    /// integrity, or validation failure.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::DeserializeError> {
        crate::serial::decode(bytes)
    }

    /// Encode this compiled form into `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::SerializeError) on encoding or I/O
    /// failure.
    pub fn write_to(&self, mut writer: impl std::io::Write) -> Result<(), crate::SerializeError> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    /// Read everything from `reader` and decode it.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::DeserializeError) on I/O, format,
    /// integrity, or validation failure.
    pub fn read_from(mut reader: impl std::io::Read) -> Result<Self, crate::DeserializeError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }
}

/// Canonical rendering: single spaces, redundant parentheses kept.
impl fmt::Display for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_group(&self.tree, f)
    }
}

#[cfg(test)]
mod tests {
    use crate::types::{RecordSchema, RecordValue, Schema};
    use crate::{RecordingSink, compile};

    fn schema() -> RecordSchema {
        RecordSchema::new()
            .field("a", Schema::I32)
            .field("b", Schema::STR)
    }

    #[test]
    fn display_is_canonical() {
        let compiled = compile("( a==1&&b=='x' )||((a>2))", &schema()).unwrap();
        assert_eq!(
            compiled.to_string(),
            r#"(a == 1 && b == "x") || ((a > 2))"#
        );
        assert_eq!(compiled.source(), "( a==1&&b=='x' )||((a>2))");
    }

    #[test]
    fn rendered_form_compiles_to_same_tree() {
        let compiled = compile("a % 2 == 0 || (b startsWith 'x' && b != \"y\")", &schema()).unwrap();
        let again = compile(&compiled.to_string(), &schema()).unwrap();
        assert_eq!(again.tree(), compiled.tree());
        assert_eq!(again.to_string(), compiled.to_string());
    }

    #[test]
    fn evaluate_directly_with_sink() {
        let compiled = compile("a == 1 || b == 'z'", &schema()).unwrap();
        let record = RecordValue::new().set("a", 1_i32).set("b", "q");
        let mut sink = RecordingSink::new();
        assert_eq!(compiled.evaluate(&record, Some(&mut sink)), Ok(true));
        assert_eq!(sink.evaluated(), vec![1]);
        assert_eq!(compiled.evaluate(&record, None), Ok(true));
    }

    #[test]
    fn subexpr_ids_are_dense() {
        let compiled = compile("(a == 1 && a == 2) || (b == 'x' || b == 'y')", &schema()).unwrap();
        let ids: Vec<u32> = compiled.subexprs().iter().map(|se| se.id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }
}
