use std::fmt;

use super::schema::{Primitive, Schema};
use super::value::{Literal, Scalar};

/// Relational operators: `==, !=, <, <=, >, >=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Arithmetic operators: `+, -, *, /, %`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Named operators. The spelling in source text is the variant name with a
/// lowercase first letter (`startsWith`, `notEqualsCI`, `sizeGE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Verb {
    Contains,
    StartsWith,
    EndsWith,
    In,
    NotContains,
    NotStartsWith,
    NotEndsWith,
    ContainsCI,
    StartsWithCI,
    EndsWithCI,
    InCI,
    EqualsCI,
    NotContainsCI,
    NotStartsWithCI,
    NotEndsWithCI,
    NotEqualsCI,
    SizeEQ,
    SizeNE,
    SizeLT,
    SizeLE,
    SizeGT,
    SizeGE,
}

/// What a verb tests, with negation and case folding stripped off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbKind {
    Contains,
    StartsWith,
    EndsWith,
    In,
    Equals,
    Size(RelOp),
}

const VERBS: &[(&str, Verb)] = &[
    ("contains", Verb::Contains),
    ("startsWith", Verb::StartsWith),
    ("endsWith", Verb::EndsWith),
    ("in", Verb::In),
    ("notContains", Verb::NotContains),
    ("notStartsWith", Verb::NotStartsWith),
    ("notEndsWith", Verb::NotEndsWith),
    ("containsCI", Verb::ContainsCI),
    ("startsWithCI", Verb::StartsWithCI),
    ("endsWithCI", Verb::EndsWithCI),
    ("inCI", Verb::InCI),
    ("equalsCI", Verb::EqualsCI),
    ("notContainsCI", Verb::NotContainsCI),
    ("notStartsWithCI", Verb::NotStartsWithCI),
    ("notEndsWithCI", Verb::NotEndsWithCI),
    ("notEqualsCI", Verb::NotEqualsCI),
    ("sizeEQ", Verb::SizeEQ),
    ("sizeNE", Verb::SizeNE),
    ("sizeLT", Verb::SizeLT),
    ("sizeLE", Verb::SizeLE),
    ("sizeGT", Verb::SizeGT),
    ("sizeGE", Verb::SizeGE),
];

impl Verb {
    /// Reserved-word lookup.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Verb> {
        VERBS.iter().find_map(|(n, v)| (*n == name).then_some(*v))
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        VERBS
            .iter()
            .find_map(|(n, v)| (*v == self).then_some(*n))
            .unwrap_or("?")
    }

    #[must_use]
    pub fn kind(self) -> VerbKind {
        match self {
            Verb::Contains | Verb::NotContains | Verb::ContainsCI | Verb::NotContainsCI => {
                VerbKind::Contains
            }
            Verb::StartsWith
            | Verb::NotStartsWith
            | Verb::StartsWithCI
            | Verb::NotStartsWithCI => VerbKind::StartsWith,
            Verb::EndsWith | Verb::NotEndsWith | Verb::EndsWithCI | Verb::NotEndsWithCI => {
                VerbKind::EndsWith
            }
            Verb::In | Verb::InCI => VerbKind::In,
            Verb::EqualsCI | Verb::NotEqualsCI => VerbKind::Equals,
            Verb::SizeEQ => VerbKind::Size(RelOp::Eq),
            Verb::SizeNE => VerbKind::Size(RelOp::Ne),
            Verb::SizeLT => VerbKind::Size(RelOp::Lt),
            Verb::SizeLE => VerbKind::Size(RelOp::Le),
            Verb::SizeGT => VerbKind::Size(RelOp::Gt),
            Verb::SizeGE => VerbKind::Size(RelOp::Ge),
        }
    }

    #[must_use]
    pub fn negated(self) -> bool {
        matches!(
            self,
            Verb::NotContains
                | Verb::NotStartsWith
                | Verb::NotEndsWith
                | Verb::NotContainsCI
                | Verb::NotStartsWithCI
                | Verb::NotEndsWithCI
                | Verb::NotEqualsCI
        )
    }

    #[must_use]
    pub fn case_insensitive(self) -> bool {
        matches!(
            self,
            Verb::ContainsCI
                | Verb::StartsWithCI
                | Verb::EndsWithCI
                | Verb::InCI
                | Verb::EqualsCI
                | Verb::NotContainsCI
                | Verb::NotStartsWithCI
                | Verb::NotEndsWithCI
                | Verb::NotEqualsCI
        )
    }
}

/// Logical connective between siblings of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Connective {
    And,
    Or,
}

/// The operation a subexpression applies to its left-hand side.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Operator {
    /// `lhs REL rhs`
    Relational(RelOp),
    /// `lhs ARITH operand REL rhs`
    Arithmetic {
        op: ArithOp,
        operand: Literal,
        relation: RelOp,
    },
    /// `lhs VERB rhs`
    Verb(Verb),
}

/// Right-hand side of a subexpression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Rhs {
    Literal(Literal),
    /// `{a, b, c}`, used by `in` and by list prefix/suffix verbs.
    Set(Vec<Literal>),
}

/// A map key bound to the map's key type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyLiteral {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Str(String),
}

impl KeyLiteral {
    pub(crate) fn as_scalar(&self) -> Scalar<'_> {
        match self {
            KeyLiteral::I32(v) => Scalar::I32(*v),
            KeyLiteral::U32(v) => Scalar::U32(*v),
            KeyLiteral::I64(v) => Scalar::I64(*v),
            KeyLiteral::U64(v) => Scalar::U64(*v),
            KeyLiteral::Str(v) => Scalar::Str(v),
        }
    }
}

/// One step of a resolved attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub enum PathStep {
    Field(String),
    Index(i32),
    Key(KeyLiteral),
}

/// A non-empty path from the record root, paired with the type at its leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub(crate) steps: Vec<PathStep>,
    pub(crate) leaf: Schema,
}

impl ResolvedPath {
    #[must_use]
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Schema of the value the path lands on.
    #[must_use]
    pub fn leaf(&self) -> &Schema {
        &self.leaf
    }
}

/// A single `LHS op RHS` unit of a compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Subexpr {
    pub(crate) id: u32,
    pub(crate) offset: usize,
    pub(crate) lhs: ResolvedPath,
    pub(crate) op: Operator,
    pub(crate) rhs: Rhs,
    pub(crate) rhs_type: Primitive,
    pub(crate) connective: Option<Connective>,
}

impl Subexpr {
    /// Dense, 1-based, in source order.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Byte offset of the left-hand side in the source text.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn lhs(&self) -> &ResolvedPath {
        &self.lhs
    }

    #[must_use]
    pub fn op(&self) -> &Operator {
        &self.op
    }

    #[must_use]
    pub fn rhs(&self) -> &Rhs {
        &self.rhs
    }

    #[must_use]
    pub fn rhs_type(&self) -> Primitive {
        self.rhs_type
    }

    /// Connective to the next sibling inside the same group, if any.
    #[must_use]
    pub fn connective(&self) -> Option<Connective> {
        self.connective
    }
}

/// A node of the parenthesization tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub enum PNode {
    /// A run of consecutive subexpressions, by id (inclusive).
    Subexprs { first: u32, last: u32 },
    Group(Group),
}

/// A parenthesized (or the top-level) group. All children share one
/// connective; a single-child group has none.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Group {
    pub(crate) connective: Option<Connective>,
    pub(crate) children: Vec<PNode>,
}

impl Group {
    #[must_use]
    pub fn connective(&self) -> Option<Connective> {
        self.connective
    }

    #[must_use]
    pub fn children(&self) -> &[PNode] {
        &self.children
    }

    /// Append a subexpression id, extending the trailing range when contiguous.
    pub(crate) fn push_subexpr(&mut self, id: u32) {
        if let Some(PNode::Subexprs { last, .. }) = self.children.last_mut()
            && *last + 1 == id
        {
            *last = id;
            return;
        }
        self.children.push(PNode::Subexprs { first: id, last: id });
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        })
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        })
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Connective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Connective::And => "&&",
            Connective::Or => "||",
        })
    }
}

impl fmt::Display for KeyLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyLiteral::I32(v) => write!(f, "{v}"),
            KeyLiteral::U32(v) => write!(f, "{v}"),
            KeyLiteral::I64(v) => write!(f, "{v}"),
            KeyLiteral::U64(v) => write!(f, "{v}"),
            KeyLiteral::Str(v) => write!(f, "{v:?}"),
        }
    }
}

/// Renders a (possibly partial) step sequence as `rows[2].tags["Main"]`.
pub(crate) struct StepsDisplay<'a>(pub(crate) &'a [PathStep]);

impl fmt::Display for StepsDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            match step {
                PathStep::Field(name) if i == 0 => write!(f, "{name}")?,
                PathStep::Field(name) => write!(f, ".{name}")?,
                PathStep::Index(idx) => write!(f, "[{idx}]")?,
                PathStep::Key(key) => write!(f, "[{key}]")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&StepsDisplay(&self.steps), f)
    }
}

impl fmt::Display for Rhs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rhs::Literal(lit) => write!(f, "{lit}"),
            Rhs::Set(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for Subexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            Operator::Relational(op) => write!(f, "{} {op} {}", self.lhs, self.rhs),
            Operator::Arithmetic {
                op,
                operand,
                relation,
            } => write!(f, "{} {op} {operand} {relation} {}", self.lhs, self.rhs),
            Operator::Verb(verb) => write!(f, "{} {verb} {}", self.lhs, self.rhs),
        }
    }
}
