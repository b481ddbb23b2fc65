mod compiled;
mod expr;
mod record;
mod schema;
mod value;

pub use compiled::CompiledExpression;
pub(crate) use expr::StepsDisplay;
pub use expr::{
    ArithOp, Connective, Group, KeyLiteral, Operator, PNode, PathStep, RelOp, ResolvedPath, Rhs,
    Subexpr, Verb, VerbKind,
};
pub use record::{
    KeyValue, ListAccess, ListValue, MapAccess, MapValue, Node, Record, RecordValue, SetAccess,
    SetValue, Value,
};
pub use schema::{Fingerprint, MapKey, Primitive, RecordSchema, Schema};
pub use value::{Literal, Scalar};
