use std::fmt;

use thiserror::Error;

/// Numeric status reported to hosts when evaluation succeeds.
pub const OK_CODE: u16 = 0;

/// Pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Lex,
    Parse,
    Resolve,
    TypeCheck,
    Eval,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Lex => "lex",
            Stage::Parse => "parse",
            Stage::Resolve => "resolve",
            Stage::TypeCheck => "typecheck",
            Stage::Eval => "eval",
        })
    }
}

/// Stable error codes. The numeric values are part of the external interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    LexUnterminatedString = 100,
    LexBadNumber = 101,
    LexUnknownChar = 102,

    ParseUnbalancedParens = 120,
    ParseMissingOperator = 121,
    ParseMixedLogicalOpsInGroup = 122,
    ParseEmptyGroup = 123,
    ParseEmptyExpression = 124,
    ParseUnexpectedToken = 125,
    ParseMissingOperand = 126,
    ParseMissingLogicalOp = 127,

    ResolveUnknownField = 140,
    ResolveNotARecord = 141,
    ResolveNotIndexable = 142,
    ResolveKeyTypeMismatch = 143,

    TypeCheckTypeMismatch = 160,
    TypeCheckOperatorNotDefined = 161,
    TypeCheckWidthMismatch = 162,
    TypeCheckUnsupportedContainerVerb = 163,
    TypeCheckDivisionByZeroLiteral = 164,

    EvalIndexOutOfRange = 180,
    EvalKeyNotFound = 181,
    EvalDivZero = 182,
    EvalArithmeticOverflow = 183,
    EvalRecordShapeMismatch = 184,
}

impl ErrorCode {
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    #[must_use]
    pub fn stage(self) -> Stage {
        match self.as_u16() {
            100..=119 => Stage::Lex,
            120..=139 => Stage::Parse,
            140..=159 => Stage::Resolve,
            160..=179 => Stage::TypeCheck,
            _ => Stage::Eval,
        }
    }

    /// Stable symbolic name, e.g. `"EVAL_INDEX_OUT_OF_RANGE"`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::LexUnterminatedString => "LEX_UNTERMINATED_STRING",
            ErrorCode::LexBadNumber => "LEX_BAD_NUMBER",
            ErrorCode::LexUnknownChar => "LEX_UNKNOWN_CHAR",
            ErrorCode::ParseUnbalancedParens => "PARSE_UNBALANCED_PARENS",
            ErrorCode::ParseMissingOperator => "PARSE_MISSING_OPERATOR",
            ErrorCode::ParseMixedLogicalOpsInGroup => "PARSE_MIXED_LOGICAL_OPS_IN_GROUP",
            ErrorCode::ParseEmptyGroup => "PARSE_EMPTY_GROUP",
            ErrorCode::ParseEmptyExpression => "PARSE_EMPTY_EXPRESSION",
            ErrorCode::ParseUnexpectedToken => "PARSE_UNEXPECTED_TOKEN",
            ErrorCode::ParseMissingOperand => "PARSE_MISSING_OPERAND",
            ErrorCode::ParseMissingLogicalOp => "PARSE_MISSING_LOGICAL_OP",
            ErrorCode::ResolveUnknownField => "RESOLVE_UNKNOWN_FIELD",
            ErrorCode::ResolveNotARecord => "RESOLVE_NOT_A_RECORD",
            ErrorCode::ResolveNotIndexable => "RESOLVE_NOT_INDEXABLE",
            ErrorCode::ResolveKeyTypeMismatch => "RESOLVE_KEY_TYPE_MISMATCH",
            ErrorCode::TypeCheckTypeMismatch => "TYPECHECK_TYPE_MISMATCH",
            ErrorCode::TypeCheckOperatorNotDefined => "TYPECHECK_OPERATOR_NOT_DEFINED",
            ErrorCode::TypeCheckWidthMismatch => "TYPECHECK_WIDTH_MISMATCH",
            ErrorCode::TypeCheckUnsupportedContainerVerb => "TYPECHECK_UNSUPPORTED_CONTAINER_VERB",
            ErrorCode::TypeCheckDivisionByZeroLiteral => "TYPECHECK_DIVISION_BY_ZERO_LITERAL",
            ErrorCode::EvalIndexOutOfRange => "EVAL_INDEX_OUT_OF_RANGE",
            ErrorCode::EvalKeyNotFound => "EVAL_KEY_NOT_FOUND",
            ErrorCode::EvalDivZero => "EVAL_DIV_ZERO",
            ErrorCode::EvalArithmeticOverflow => "EVAL_ARITHMETIC_OVERFLOW",
            ErrorCode::EvalRecordShapeMismatch => "EVAL_RECORD_SHAPE_MISMATCH",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u16())
    }
}

/// Every way compiling or evaluating an expression can fail.
///
/// Compile-time variants carry the byte `offset` of the offending token;
/// type-check variants also carry the subexpression id `se`; evaluation
/// variants carry `se` only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("malformed number '{text}' at offset {offset}")]
    BadNumber { offset: usize, text: String },

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnknownChar { offset: usize, ch: char },

    #[error("unbalanced parenthesis at offset {offset}")]
    UnbalancedParens { offset: usize },

    #[error("expected an operator or verb after '{lhs}' at offset {offset}")]
    MissingOperator { offset: usize, lhs: String },

    #[error("'{found}' at offset {offset} mixes logical operators in a group that uses '{group}'; add parentheses")]
    MixedLogicalOps {
        offset: usize,
        group: String,
        found: String,
    },

    #[error("empty parentheses at offset {offset}")]
    EmptyGroup { offset: usize },

    #[error("expression is empty")]
    EmptyExpression,

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        offset: usize,
        found: String,
        expected: &'static str,
    },

    #[error("missing operand after '{after}' at offset {offset}")]
    MissingOperand { offset: usize, after: String },

    #[error("missing '&&' or '||' before offset {offset}")]
    MissingLogicalOp { offset: usize },

    #[error("unknown field '{field}' at offset {offset}")]
    UnknownField { offset: usize, field: String },

    #[error("'{path}' at offset {offset} is {found}, not a record")]
    NotARecord {
        offset: usize,
        path: String,
        found: String,
    },

    #[error("'{path}' at offset {offset} has type {found} and cannot be subscripted")]
    NotIndexable {
        offset: usize,
        path: String,
        found: String,
    },

    #[error("subscript {key} at offset {offset} does not fit key type {expected}")]
    KeyTypeMismatch {
        offset: usize,
        key: String,
        expected: String,
    },

    #[error("type mismatch in subexpression {se} at offset {offset}: {detail}")]
    TypeMismatch {
        offset: usize,
        se: u32,
        detail: String,
    },

    #[error("operator '{op}' is not defined on {lhs} in subexpression {se} at offset {offset}")]
    OperatorNotDefined {
        offset: usize,
        se: u32,
        op: String,
        lhs: String,
    },

    #[error("literal {literal} does not fit {expected} in subexpression {se} at offset {offset}")]
    WidthMismatch {
        offset: usize,
        se: u32,
        literal: String,
        expected: String,
    },

    #[error("verb '{verb}' is not supported on {container} in subexpression {se} at offset {offset}")]
    UnsupportedContainerVerb {
        offset: usize,
        se: u32,
        verb: String,
        container: String,
    },

    #[error("literal zero divisor in subexpression {se} at offset {offset}")]
    DivisionByZeroLiteral { offset: usize, se: u32 },

    #[error("index {index} out of range for list of length {len} in subexpression {se}")]
    IndexOutOfRange { se: u32, index: i32, len: usize },

    #[error("key {key} not found in subexpression {se}")]
    KeyNotFound { se: u32, key: String },

    #[error("integer division by zero in subexpression {se}")]
    DivZero { se: u32 },

    #[error("arithmetic overflow in subexpression {se}")]
    ArithmeticOverflow { se: u32 },

    #[error("record does not match schema at '{path}' in subexpression {se}: {detail}")]
    RecordShapeMismatch {
        se: u32,
        path: String,
        detail: String,
    },
}

impl Error {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::UnterminatedString { .. } => ErrorCode::LexUnterminatedString,
            Error::BadNumber { .. } => ErrorCode::LexBadNumber,
            Error::UnknownChar { .. } => ErrorCode::LexUnknownChar,
            Error::UnbalancedParens { .. } => ErrorCode::ParseUnbalancedParens,
            Error::MissingOperator { .. } => ErrorCode::ParseMissingOperator,
            Error::MixedLogicalOps { .. } => ErrorCode::ParseMixedLogicalOpsInGroup,
            Error::EmptyGroup { .. } => ErrorCode::ParseEmptyGroup,
            Error::EmptyExpression => ErrorCode::ParseEmptyExpression,
            Error::UnexpectedToken { .. } => ErrorCode::ParseUnexpectedToken,
            Error::MissingOperand { .. } => ErrorCode::ParseMissingOperand,
            Error::MissingLogicalOp { .. } => ErrorCode::ParseMissingLogicalOp,
            Error::UnknownField { .. } => ErrorCode::ResolveUnknownField,
            Error::NotARecord { .. } => ErrorCode::ResolveNotARecord,
            Error::NotIndexable { .. } => ErrorCode::ResolveNotIndexable,
            Error::KeyTypeMismatch { .. } => ErrorCode::ResolveKeyTypeMismatch,
            Error::TypeMismatch { .. } => ErrorCode::TypeCheckTypeMismatch,
            Error::OperatorNotDefined { .. } => ErrorCode::TypeCheckOperatorNotDefined,
            Error::WidthMismatch { .. } => ErrorCode::TypeCheckWidthMismatch,
            Error::UnsupportedContainerVerb { .. } => {
                ErrorCode::TypeCheckUnsupportedContainerVerb
            }
            Error::DivisionByZeroLiteral { .. } => ErrorCode::TypeCheckDivisionByZeroLiteral,
            Error::IndexOutOfRange { .. } => ErrorCode::EvalIndexOutOfRange,
            Error::KeyNotFound { .. } => ErrorCode::EvalKeyNotFound,
            Error::DivZero { .. } => ErrorCode::EvalDivZero,
            Error::ArithmeticOverflow { .. } => ErrorCode::EvalArithmeticOverflow,
            Error::RecordShapeMismatch { .. } => ErrorCode::EvalRecordShapeMismatch,
        }
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.code().stage()
    }

    /// Byte offset into the expression text, for compile-time errors.
    #[must_use]
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::UnterminatedString { offset }
            | Error::BadNumber { offset, .. }
            | Error::UnknownChar { offset, .. }
            | Error::UnbalancedParens { offset }
            | Error::MissingOperator { offset, .. }
            | Error::MixedLogicalOps { offset, .. }
            | Error::EmptyGroup { offset }
            | Error::UnexpectedToken { offset, .. }
            | Error::MissingOperand { offset, .. }
            | Error::MissingLogicalOp { offset }
            | Error::UnknownField { offset, .. }
            | Error::NotARecord { offset, .. }
            | Error::NotIndexable { offset, .. }
            | Error::KeyTypeMismatch { offset, .. }
            | Error::TypeMismatch { offset, .. }
            | Error::OperatorNotDefined { offset, .. }
            | Error::WidthMismatch { offset, .. }
            | Error::UnsupportedContainerVerb { offset, .. }
            | Error::DivisionByZeroLiteral { offset, .. } => Some(*offset),
            Error::EmptyExpression
            | Error::IndexOutOfRange { .. }
            | Error::KeyNotFound { .. }
            | Error::DivZero { .. }
            | Error::ArithmeticOverflow { .. }
            | Error::RecordShapeMismatch { .. } => None,
        }
    }

    /// Id of the subexpression at fault, for type-check and evaluation errors.
    #[must_use]
    pub fn subexpr(&self) -> Option<u32> {
        match self {
            Error::TypeMismatch { se, .. }
            | Error::OperatorNotDefined { se, .. }
            | Error::WidthMismatch { se, .. }
            | Error::UnsupportedContainerVerb { se, .. }
            | Error::DivisionByZeroLiteral { se, .. }
            | Error::IndexOutOfRange { se, .. }
            | Error::KeyNotFound { se, .. }
            | Error::DivZero { se }
            | Error::ArithmeticOverflow { se }
            | Error::RecordShapeMismatch { se, .. } => Some(*se),
            _ => None,
        }
    }
}
