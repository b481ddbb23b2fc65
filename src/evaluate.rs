use crate::Error;
use crate::trace::{TraceEvent, Tracer};
use crate::types::{
    ArithOp, CompiledExpression, Connective, Group, Literal, Node, Operator, PNode, PathStep,
    Record, RelOp, ResolvedPath, Rhs, Scalar, StepsDisplay, Subexpr, Verb, VerbKind,
};

pub(crate) fn evaluate(
    compiled: &CompiledExpression,
    record: &dyn Record,
    tracer: &mut Tracer<'_>,
) -> Result<bool, Error> {
    let result = eval_group(&compiled.tree, &compiled.subexprs, record, tracer)?;
    tracer.emit(|| TraceEvent::Outcome { result });
    Ok(result)
}

/// Evaluate a group's members in source order, stopping at the first member
/// that decides the group (`false` under `&&`, `true` under `||`).
fn eval_group(
    group: &Group,
    subexprs: &[Subexpr],
    record: &dyn Record,
    tracer: &mut Tracer<'_>,
) -> Result<bool, Error> {
    let decisive = group.connective == Some(Connective::Or);
    let count = group.children.len();

    for (i, child) in group.children.iter().enumerate() {
        match child {
            PNode::Subexprs { first, last } => {
                for id in *first..=*last {
                    let se = &subexprs[id as usize - 1];
                    if eval_subexpr(se, record, tracer)? == decisive {
                        let short_circuited = id < *last || i + 1 < count;
                        return Ok(combined(group, decisive, short_circuited, tracer));
                    }
                }
            }
            PNode::Group(inner) => {
                if eval_group(inner, subexprs, record, tracer)? == decisive {
                    return Ok(combined(group, decisive, i + 1 < count, tracer));
                }
            }
        }
    }

    Ok(combined(group, !decisive, false, tracer))
}

fn combined(group: &Group, result: bool, short_circuited: bool, tracer: &mut Tracer<'_>) -> bool {
    tracer.emit(|| TraceEvent::GroupCombined {
        connective: group.connective,
        result,
        short_circuited,
    });
    result
}

fn eval_subexpr(se: &Subexpr, record: &dyn Record, tracer: &mut Tracer<'_>) -> Result<bool, Error> {
    let node = walk(se.id, &se.lhs, record)?;

    let result = match &se.op {
        Operator::Relational(op) => {
            let lhs = scalar(se, node)?;
            compare(se, lhs, *op, rhs_literal(se)?)?
        }
        Operator::Arithmetic {
            op,
            operand,
            relation,
        } => {
            let lhs = scalar(se, node)?;
            let value = arithmetic(se, lhs, *op, operand)?;
            compare(se, value.as_scalar(), *relation, rhs_literal(se)?)?
        }
        Operator::Verb(verb) => eval_verb(se, *verb, node)?,
    };

    tracer.emit(|| TraceEvent::SubexprEvaluated {
        id: se.id,
        lhs: describe(node),
        rhs: se.rhs.to_string(),
        result,
    });
    Ok(result)
}

// -- Paths ------------------------------------------------------------------

/// Follow a compiled path through the live record.
fn walk<'r>(se: u32, path: &ResolvedPath, record: &'r dyn Record) -> Result<Node<'r>, Error> {
    let mut node = Node::Record(record);
    for (i, step) in path.steps.iter().enumerate() {
        node = match (step, node) {
            (PathStep::Field(name), Node::Record(r)) => r
                .field(name)
                .ok_or_else(|| shape(se, &path.steps[..=i], "field is missing".to_owned()))?,
            (PathStep::Index(index), Node::List(list)) => usize::try_from(*index)
                .ok()
                .and_then(|i| list.at(i))
                .ok_or(Error::IndexOutOfRange {
                    se,
                    index: *index,
                    len: list.len(),
                })?,
            (PathStep::Key(key), Node::Map(map)) => map
                .get(&key.as_scalar())
                .map(Node::Scalar)
                .ok_or_else(|| Error::KeyNotFound {
                    se,
                    key: key.to_string(),
                })?,
            (step, other) => {
                let expected = match step {
                    PathStep::Field(_) => "record",
                    PathStep::Index(_) => "list",
                    PathStep::Key(_) => "map",
                };
                return Err(shape(
                    se,
                    &path.steps[..i],
                    format!("expected {expected}, found {}", other.kind()),
                ));
            }
        };
    }
    Ok(node)
}

fn shape(se: u32, steps: &[PathStep], detail: String) -> Error {
    Error::RecordShapeMismatch {
        se,
        path: StepsDisplay(steps).to_string(),
        detail,
    }
}

fn mismatch(se: &Subexpr, detail: String) -> Error {
    shape(se.id, &se.lhs.steps, detail)
}

fn scalar<'r>(se: &Subexpr, node: Node<'r>) -> Result<Scalar<'r>, Error> {
    match node {
        Node::Scalar(s) => Ok(s),
        other => Err(mismatch(
            se,
            format!("expected {}, found {}", se.rhs_type, other.kind()),
        )),
    }
}

fn describe(node: Node<'_>) -> String {
    match node {
        Node::Scalar(s) => s.to_string(),
        Node::Record(_) => "record".to_owned(),
        Node::List(list) => format!("list(len={})", list.len()),
        Node::Set(set) => format!("set(len={})", set.len()),
        Node::Map(map) => format!("map(len={})", map.len()),
    }
}

// -- Operators --------------------------------------------------------------

fn rhs_literal(se: &Subexpr) -> Result<&Literal, Error> {
    match &se.rhs {
        Rhs::Literal(literal) => Ok(literal),
        Rhs::Set(_) => Err(mismatch(se, "expected a single right-hand literal".to_owned())),
    }
}

fn compare(se: &Subexpr, lhs: Scalar<'_>, op: RelOp, rhs: &Literal) -> Result<bool, Error> {
    lhs.compare(op, &rhs.as_scalar()).ok_or_else(|| {
        mismatch(
            se,
            format!("expected {}, found {}", rhs.primitive(), lhs.primitive()),
        )
    })
}

macro_rules! checked_int {
    ($se:expr, $op:expr, $a:expr, $b:expr, $variant:ident) => {{
        let (a, b) = ($a, $b);
        let value = match $op {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Sub => a.checked_sub(b),
            ArithOp::Mul => a.checked_mul(b),
            ArithOp::Div if b == 0 => return Err(Error::DivZero { se: $se }),
            ArithOp::Rem if b == 0 => return Err(Error::DivZero { se: $se }),
            ArithOp::Div => a.checked_div(b),
            ArithOp::Rem => a.checked_rem(b),
        };
        value
            .map(Literal::$variant)
            .ok_or(Error::ArithmeticOverflow { se: $se })
    }};
}

macro_rules! ieee {
    ($op:expr, $a:expr, $b:expr, $variant:ident) => {{
        let (a, b) = ($a, $b);
        Ok(Literal::$variant(match $op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Rem => a % b,
        }))
    }};
}

/// Integer arithmetic is checked; float arithmetic follows IEEE-754.
fn arithmetic(se: &Subexpr, lhs: Scalar<'_>, op: ArithOp, operand: &Literal) -> Result<Literal, Error> {
    let id = se.id;
    match (lhs, operand) {
        (Scalar::I32(a), Literal::I32(b)) => checked_int!(id, op, a, *b, I32),
        (Scalar::U32(a), Literal::U32(b)) => checked_int!(id, op, a, *b, U32),
        (Scalar::I64(a), Literal::I64(b)) => checked_int!(id, op, a, *b, I64),
        (Scalar::U64(a), Literal::U64(b)) => checked_int!(id, op, a, *b, U64),
        (Scalar::F32(a), Literal::F32(b)) => ieee!(op, a, *b, F32),
        (Scalar::F64(a), Literal::F64(b)) => ieee!(op, a, *b, F64),
        (lhs, operand) => Err(mismatch(
            se,
            format!(
                "expected {}, found {}",
                operand.primitive(),
                lhs.primitive()
            ),
        )),
    }
}

// -- Verbs ------------------------------------------------------------------

fn eval_verb(se: &Subexpr, verb: Verb, node: Node<'_>) -> Result<bool, Error> {
    let ci = verb.case_insensitive();

    let hit = match (verb.kind(), node) {
        (VerbKind::Size(op), node) => {
            let len = match node {
                Node::List(list) => list.len(),
                Node::Set(set) => set.len(),
                Node::Map(map) => map.len(),
                other => {
                    return Err(mismatch(
                        se,
                        format!("expected a container, found {}", other.kind()),
                    ));
                }
            };
            let Literal::U64(n) = rhs_literal(se)? else {
                return Err(mismatch(se, "size bound is not u64".to_owned()));
            };
            op.apply(&(len as u64), n)
        }
        (VerbKind::In, Node::Scalar(lhs)) => match &se.rhs {
            Rhs::Set(items) => items.iter().any(|item| lhs.matches(&item.as_scalar(), ci)),
            Rhs::Literal(item) => lhs.matches(&item.as_scalar(), ci),
        },
        (kind, Node::Scalar(Scalar::Str(haystack))) => {
            let needle = match rhs_literal(se)? {
                Literal::Str(s) => s.as_str(),
                other => {
                    return Err(mismatch(
                        se,
                        format!("expected str, found {}", other.primitive()),
                    ));
                }
            };
            match kind {
                VerbKind::Contains => contains_str(haystack, needle, ci),
                VerbKind::StartsWith => starts_with(haystack.as_bytes(), needle.as_bytes(), ci),
                VerbKind::EndsWith => ends_with(haystack.as_bytes(), needle.as_bytes(), ci),
                _ => haystack.as_bytes().eq_ignore_ascii_case(needle.as_bytes()),
            }
        }
        (VerbKind::Contains, Node::Set(set)) => {
            let element = rhs_literal(se)?.as_scalar();
            if ci {
                set.elements().any(|e| e.matches(&element, true))
            } else {
                set.contains(&element)
            }
        }
        (VerbKind::Contains, Node::List(list)) => {
            let element = rhs_literal(se)?.as_scalar();
            (0..list.len()).any(|i| {
                matches!(list.at(i), Some(Node::Scalar(e)) if e.matches(&element, ci))
            })
        }
        (VerbKind::Contains, Node::Map(map)) => map.contains_key(&rhs_literal(se)?.as_scalar()),
        (kind @ (VerbKind::StartsWith | VerbKind::EndsWith), Node::List(list)) => {
            let sequence = match &se.rhs {
                Rhs::Literal(item) => std::slice::from_ref(item),
                Rhs::Set(items) => items.as_slice(),
            };
            let len = list.len();
            if sequence.len() > len {
                false
            } else {
                let start = if kind == VerbKind::StartsWith {
                    0
                } else {
                    len - sequence.len()
                };
                sequence.iter().enumerate().all(|(i, item)| {
                    matches!(list.at(start + i), Some(Node::Scalar(e)) if e.matches(&item.as_scalar(), ci))
                })
            }
        }
        (_, other) => {
            return Err(mismatch(
                se,
                format!("verb '{verb}' cannot apply to {}", other.kind()),
            ));
        }
    };

    Ok(hit != verb.negated())
}

fn contains_str(haystack: &str, needle: &str, ci: bool) -> bool {
    if !ci {
        return haystack.contains(needle);
    }
    let needle = needle.as_bytes();
    needle.is_empty()
        || haystack
            .as_bytes()
            .windows(needle.len())
            .any(|window| window.eq_ignore_ascii_case(needle))
}

fn starts_with(haystack: &[u8], prefix: &[u8], ci: bool) -> bool {
    haystack.len() >= prefix.len() && {
        let head = &haystack[..prefix.len()];
        if ci {
            head.eq_ignore_ascii_case(prefix)
        } else {
            head == prefix
        }
    }
}

fn ends_with(haystack: &[u8], suffix: &[u8], ci: bool) -> bool {
    haystack.len() >= suffix.len() && {
        let tail = &haystack[haystack.len() - suffix.len()..];
        if ci {
            tail.eq_ignore_ascii_case(suffix)
        } else {
            tail == suffix
        }
    }
}
