use std::fmt;

use super::expr::RelOp;
use super::schema::Primitive;

/// A typed immediate value, produced when a source literal is bound to the
/// width of the operand it is compared against.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "binary-cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Literal {
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
}

impl Literal {
    #[must_use]
    pub fn primitive(&self) -> Primitive {
        match self {
            Literal::Bool(_) => Primitive::Bool,
            Literal::I32(_) => Primitive::I32,
            Literal::U32(_) => Primitive::U32,
            Literal::I64(_) => Primitive::I64,
            Literal::U64(_) => Primitive::U64,
            Literal::F32(_) => Primitive::F32,
            Literal::F64(_) => Primitive::F64,
            Literal::Str(_) => Primitive::Str,
        }
    }

    /// Borrow this literal as a [`Scalar`] for comparison with record values.
    #[must_use]
    pub fn as_scalar(&self) -> Scalar<'_> {
        match self {
            Literal::Bool(v) => Scalar::Bool(*v),
            Literal::I32(v) => Scalar::I32(*v),
            Literal::U32(v) => Scalar::U32(*v),
            Literal::I64(v) => Scalar::I64(*v),
            Literal::U64(v) => Scalar::U64(*v),
            Literal::F32(v) => Scalar::F32(*v),
            Literal::F64(v) => Scalar::F64(*v),
            Literal::Str(v) => Scalar::Str(v),
        }
    }

    pub(crate) fn is_zero(&self) -> bool {
        match self {
            Literal::I32(v) => *v == 0,
            Literal::U32(v) => *v == 0,
            Literal::I64(v) => *v == 0,
            Literal::U64(v) => *v == 0,
            Literal::F32(v) => *v == 0.0,
            Literal::F64(v) => *v == 0.0,
            Literal::Bool(_) | Literal::Str(_) => false,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_scalar(), f)
    }
}

/// A borrowed primitive read out of a record or a literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar<'a> {
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(&'a str),
}

impl<'a> Scalar<'a> {
    #[must_use]
    pub fn primitive(&self) -> Primitive {
        match self {
            Scalar::Bool(_) => Primitive::Bool,
            Scalar::I32(_) => Primitive::I32,
            Scalar::U32(_) => Primitive::U32,
            Scalar::I64(_) => Primitive::I64,
            Scalar::U64(_) => Primitive::U64,
            Scalar::F32(_) => Primitive::F32,
            Scalar::F64(_) => Primitive::F64,
            Scalar::Str(_) => Primitive::Str,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Scalar::I32(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Scalar::U32(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::I64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Scalar::U64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Scalar::F32(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::F64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Scalar::Str(v) => Some(*v),
            _ => None,
        }
    }

    /// Compare with another scalar of the same primitive type using `op`.
    ///
    /// Floats follow IEEE-754: every ordered comparison and `==` involving NaN
    /// is false, `!=` is true. Strings compare bytewise. Returns `None` when the
    /// two scalars have different types.
    #[must_use]
    pub fn compare(&self, op: RelOp, other: &Scalar<'_>) -> Option<bool> {
        Some(match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => op.apply(a, b),
            (Scalar::I32(a), Scalar::I32(b)) => op.apply(a, b),
            (Scalar::U32(a), Scalar::U32(b)) => op.apply(a, b),
            (Scalar::I64(a), Scalar::I64(b)) => op.apply(a, b),
            (Scalar::U64(a), Scalar::U64(b)) => op.apply(a, b),
            (Scalar::F32(a), Scalar::F32(b)) => op.apply(a, b),
            (Scalar::F64(a), Scalar::F64(b)) => op.apply(a, b),
            (Scalar::Str(a), Scalar::Str(b)) => op.apply(a.as_bytes(), b.as_bytes()),
            _ => return None,
        })
    }

    /// Equality used by membership verbs. `ci` folds ASCII letters only.
    #[must_use]
    pub fn matches(&self, other: &Scalar<'_>, ci: bool) -> bool {
        match (self, other) {
            (Scalar::Str(a), Scalar::Str(b)) if ci => a.eq_ignore_ascii_case(b),
            _ => self.compare(RelOp::Eq, other).unwrap_or(false),
        }
    }

    #[must_use]
    pub fn to_literal(&self) -> Literal {
        match self {
            Scalar::Bool(v) => Literal::Bool(*v),
            Scalar::I32(v) => Literal::I32(*v),
            Scalar::U32(v) => Literal::U32(*v),
            Scalar::I64(v) => Literal::I64(*v),
            Scalar::U64(v) => Literal::U64(*v),
            Scalar::F32(v) => Literal::F32(*v),
            Scalar::F64(v) => Literal::F64(*v),
            Scalar::Str(v) => Literal::Str((*v).to_owned()),
        }
    }
}

impl fmt::Display for Scalar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::I32(v) => write!(f, "{v}"),
            Scalar::U32(v) => write!(f, "{v}"),
            Scalar::I64(v) => write!(f, "{v}"),
            Scalar::U64(v) => write!(f, "{v}"),
            Scalar::F32(v) => write!(f, "{v:?}"),
            Scalar::F64(v) => write!(f, "{v:?}"),
            Scalar::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl RelOp {
    pub(crate) fn apply<T: PartialOrd + ?Sized>(self, a: &T, b: &T) -> bool {
        match self {
            RelOp::Eq => a == b,
            RelOp::Ne => a != b,
            RelOp::Lt => a < b,
            RelOp::Le => a <= b,
            RelOp::Gt => a > b,
            RelOp::Ge => a >= b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_primitive() {
        assert_eq!(Literal::I32(1).primitive(), Primitive::I32);
        assert_eq!(Literal::Str("x".into()).primitive(), Primitive::Str);
        assert_eq!(Literal::F32(1.0).primitive(), Primitive::F32);
    }

    #[test]
    fn display() {
        assert_eq!(Literal::I64(42).to_string(), "42");
        assert_eq!(Literal::F64(140.5).to_string(), "140.5");
        assert_eq!(Literal::F64(3.0).to_string(), "3.0");
        assert_eq!(Literal::Bool(true).to_string(), "true");
        assert_eq!(Literal::Str("IBM".into()).to_string(), "\"IBM\"");
    }

    #[test]
    fn typed_readers() {
        let s = Scalar::U64(7);
        assert_eq!(s.as_u64(), Some(7));
        assert_eq!(s.as_i64(), None);
        assert_eq!(Scalar::Str("a").as_str(), Some("a"));
        assert_eq!(Scalar::F32(1.5).as_f32(), Some(1.5));
        assert_eq!(Scalar::Bool(true).as_bool(), Some(true));
    }

    #[test]
    fn compare_int() {
        let a = Scalar::I32(10);
        let b = Scalar::I32(20);
        assert_eq!(a.compare(RelOp::Eq, &b), Some(false));
        assert_eq!(a.compare(RelOp::Ne, &b), Some(true));
        assert_eq!(a.compare(RelOp::Lt, &b), Some(true));
        assert_eq!(a.compare(RelOp::Le, &a), Some(true));
        assert_eq!(a.compare(RelOp::Gt, &b), Some(false));
        assert_eq!(a.compare(RelOp::Ge, &a), Some(true));
    }

    #[test]
    fn compare_nan_follows_ieee() {
        let nan = Scalar::F64(f64::NAN);
        assert_eq!(nan.compare(RelOp::Eq, &nan), Some(false));
        assert_eq!(nan.compare(RelOp::Lt, &Scalar::F64(1.0)), Some(false));
        assert_eq!(nan.compare(RelOp::Ge, &Scalar::F64(1.0)), Some(false));
        assert_eq!(nan.compare(RelOp::Ne, &nan), Some(true));
    }

    #[test]
    fn compare_strings_bytewise() {
        let upper = Scalar::Str("Z");
        let lower = Scalar::Str("a");
        assert_eq!(upper.compare(RelOp::Lt, &lower), Some(true));
    }

    #[test]
    fn compare_width_mismatch_returns_none() {
        assert_eq!(Scalar::I32(1).compare(RelOp::Eq, &Scalar::I64(1)), None);
        assert_eq!(Scalar::Str("1").compare(RelOp::Eq, &Scalar::I32(1)), None);
    }

    #[test]
    fn matches_case_insensitive_is_ascii_only() {
        assert!(Scalar::Str("JAVA").matches(&Scalar::Str("java"), true));
        assert!(!Scalar::Str("JAVA").matches(&Scalar::Str("java"), false));
        assert!(!Scalar::Str("É").matches(&Scalar::Str("é"), true));
    }

    #[test]
    fn zero_detection() {
        assert!(Literal::I32(0).is_zero());
        assert!(Literal::F64(-0.0).is_zero());
        assert!(!Literal::U64(3).is_zero());
        assert!(!Literal::Str(String::new()).is_zero());
    }

    #[test]
    fn relop_apply() {
        assert!(RelOp::Ge.apply(&3_u64, &3));
        assert!(RelOp::Gt.apply(&4_u64, &3));
        assert!(!RelOp::Lt.apply(&3_u64, &3));
    }
}
