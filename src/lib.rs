//! Boolean rule expressions over typed, nested records.
//!
//! An expression such as `symbol == "IBM" && price > 140.5` is compiled once
//! per record schema (tokenize, parse, resolve field paths, type-check) and
//! cached; later calls with the same text and an equal schema shape reuse the
//! compiled form and only evaluate it.
//!
//! ```
//! use ooroo_expr::{ErrorCode, RecordSchema, RecordValue, Schema, ListValue, Primitive};
//!
//! let schema = RecordSchema::new()
//!     .field("symbol", Schema::STR)
//!     .field("price", Schema::F64)
//!     .field("roadwayNumbers", Schema::List(Primitive::I32));
//! let record = RecordValue::new()
//!     .set("symbol", "IBM")
//!     .set("price", 150.0_f64)
//!     .set("roadwayNumbers", ListValue::from_iter([1_i32, 2, 3]));
//!
//! assert_eq!(ooroo_expr::eval(r#"symbol == "IBM" && price > 140.5"#, &record, &schema, false), Ok(true));
//!
//! let err = ooroo_expr::eval("roadwayNumbers[4] > 6", &record, &schema, false).unwrap_err();
//! assert_eq!(err.code(), ErrorCode::EvalIndexOutOfRange);
//! assert_eq!(err.subexpr(), Some(1));
//! ```

mod cache;
mod compile;
mod engine;
mod error;
mod evaluate;
mod parse;
#[cfg(feature = "binary-cache")]
mod serial;
mod trace;
mod types;

pub use cache::CacheStats;
pub use engine::Engine;
pub use error::{Error, ErrorCode, OK_CODE, Stage};
#[cfg(feature = "binary-cache")]
pub use serial::{DeserializeError, SerializeError};
pub use trace::{RecordingSink, TraceEvent, TraceSink, TracingSink};
pub use types::{
    ArithOp, CompiledExpression, Connective, Fingerprint, Group, KeyLiteral, KeyValue, ListAccess,
    ListValue, Literal, MapAccess, MapKey, MapValue, Node, Operator, PNode, PathStep, Primitive,
    Record, RecordSchema, RecordValue, RelOp, ResolvedPath, Rhs, Scalar, Schema, SetAccess,
    SetValue, Subexpr, Value, Verb, VerbKind,
};

/// Evaluate `expr` against `record` using the process-wide [`Engine`].
///
/// With `trace` set, every compile and evaluation step is forwarded to the
/// `tracing` crate at TRACE level through [`TracingSink`].
///
/// # Errors
///
/// Returns the first compile error, or the evaluation error of the first
/// subexpression in source order that failed. [`Error::code()`] gives the
/// stable numeric code.
pub fn eval(expr: &str, record: &dyn Record, schema: &RecordSchema, trace: bool) -> Result<bool, Error> {
    let engine = Engine::global();
    if trace {
        engine.eval_traced(expr, record, schema, &mut TracingSink)
    } else {
        engine.eval(expr, record, schema)
    }
}

/// Compile `expr` for `schema` without consulting or filling any cache.
///
/// # Errors
///
/// Returns a lex, parse, resolve, or type-check [`Error`].
pub fn compile(expr: &str, schema: &RecordSchema) -> Result<CompiledExpression, Error> {
    compile::compile(expr, schema, &mut trace::Tracer::off())
}
