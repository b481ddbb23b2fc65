use crate::Error;
use crate::parse::{self, LiteralText, RawLiteral, RawOp, RawRhs, RawStep, RawSubexpr};
use crate::trace::{TraceEvent, Tracer};
use crate::types::{
    ArithOp, CompiledExpression, KeyLiteral, Literal, MapKey, Operator, PathStep, Primitive,
    RecordSchema, RelOp, ResolvedPath, Rhs, Schema, StepsDisplay, Subexpr, Verb, VerbKind,
};

/// Lex, parse, resolve and type-check `source` against `schema`.
pub(crate) fn compile(
    source: &str,
    schema: &RecordSchema,
    tracer: &mut Tracer<'_>,
) -> Result<CompiledExpression, Error> {
    let tokens = parse::tokenize(source)?;
    for token in &tokens {
        tracer.emit(|| TraceEvent::Token {
            offset: token.offset,
            text: token.text.to_owned(),
        });
    }

    let syntax = parse::parse(source, &tokens)?;

    let mut subexprs = Vec::with_capacity(syntax.subexprs.len());
    for (raw, id) in syntax.subexprs.iter().zip(1_u32..) {
        let lhs = resolve(&raw.lhs, schema)?;
        let se = check(id, raw, lhs)?;
        tracer.emit(|| TraceEvent::SubexprFormed {
            id,
            description: se.to_string(),
        });
        subexprs.push(se);
    }

    Ok(CompiledExpression {
        source: source.to_owned(),
        subexprs,
        tree: syntax.tree,
        fingerprint: schema.fingerprint().clone(),
    })
}

// -- Path resolution --------------------------------------------------------

/// Position reached while walking a path through the schema.
#[derive(Clone, Copy)]
enum Cursor<'a> {
    Record(&'a RecordSchema),
    Node(&'a Schema),
    Element(Primitive),
}

impl<'a> Cursor<'a> {
    fn of(schema: &'a Schema) -> Self {
        match schema {
            Schema::Record(record) => Cursor::Record(record),
            other => Cursor::Node(other),
        }
    }

    fn describe(self) -> String {
        match self {
            Cursor::Record(record) => record.to_string(),
            Cursor::Node(schema) => schema.to_string(),
            Cursor::Element(p) => p.to_string(),
        }
    }

    fn into_schema(self) -> Schema {
        match self {
            Cursor::Record(record) => Schema::Record(record.clone()),
            Cursor::Node(schema) => schema.clone(),
            Cursor::Element(p) => Schema::Primitive(p),
        }
    }
}

fn resolve(steps: &[(usize, RawStep<'_>)], schema: &RecordSchema) -> Result<ResolvedPath, Error> {
    let mut resolved: Vec<PathStep> = Vec::with_capacity(steps.len());
    let mut cursor = Cursor::Record(schema);

    for (offset, step) in steps {
        let offset = *offset;
        cursor = match step {
            RawStep::Field(name) => {
                let Cursor::Record(record) = cursor else {
                    return Err(Error::NotARecord {
                        offset,
                        path: StepsDisplay(&resolved).to_string(),
                        found: cursor.describe(),
                    });
                };
                let Some(field) = record.get(name) else {
                    let field = if resolved.is_empty() {
                        (*name).to_owned()
                    } else {
                        format!("{}.{name}", StepsDisplay(&resolved))
                    };
                    return Err(Error::UnknownField { offset, field });
                };
                resolved.push(PathStep::Field((*name).to_owned()));
                Cursor::of(field)
            }
            RawStep::Subscript(key) => {
                let (step, next) = match cursor {
                    Cursor::Node(Schema::List(p)) => (index_step(key)?, Cursor::Element(*p)),
                    Cursor::Node(Schema::ListOfRecords(record)) => {
                        (index_step(key)?, Cursor::Record(record))
                    }
                    Cursor::Node(Schema::Map(k, v)) => (key_step(key, *k)?, Cursor::Element(*v)),
                    _ => {
                        return Err(Error::NotIndexable {
                            offset,
                            path: StepsDisplay(&resolved).to_string(),
                            found: cursor.describe(),
                        });
                    }
                };
                resolved.push(step);
                next
            }
        };
    }

    Ok(ResolvedPath {
        steps: resolved,
        leaf: cursor.into_schema(),
    })
}

fn index_step(key: &RawLiteral<'_>) -> Result<PathStep, Error> {
    let index = match &key.value {
        LiteralText::Int(text) => text.parse().map(PathStep::Index).ok(),
        _ => None,
    };
    index.ok_or_else(|| Error::KeyTypeMismatch {
        offset: key.offset,
        key: key.value.to_string(),
        expected: Primitive::I32.to_string(),
    })
}

fn key_step(key: &RawLiteral<'_>, key_type: MapKey) -> Result<PathStep, Error> {
    let literal = match (&key.value, key_type) {
        (LiteralText::Str(s), MapKey::Str) => Some(KeyLiteral::Str(s.clone())),
        (LiteralText::Int(text), MapKey::I32) => text.parse().map(KeyLiteral::I32).ok(),
        (LiteralText::Int(text), MapKey::U32) => text.parse().map(KeyLiteral::U32).ok(),
        (LiteralText::Int(text), MapKey::I64) => text.parse().map(KeyLiteral::I64).ok(),
        (LiteralText::Int(text), MapKey::U64) => text.parse().map(KeyLiteral::U64).ok(),
        _ => None,
    };
    literal.map(PathStep::Key).ok_or_else(|| Error::KeyTypeMismatch {
        offset: key.offset,
        key: key.value.to_string(),
        expected: key_type.to_string(),
    })
}

// -- Type checking ----------------------------------------------------------

/// Bind a source literal to `target`, choosing its width.
fn cast(id: u32, literal: &RawLiteral<'_>, target: Primitive) -> Result<Literal, Error> {
    let width = || Error::WidthMismatch {
        offset: literal.offset,
        se: id,
        literal: literal.value.to_string(),
        expected: target.to_string(),
    };
    match (&literal.value, target) {
        (LiteralText::Bool(b), Primitive::Bool) => Ok(Literal::Bool(*b)),
        (LiteralText::Str(s), Primitive::Str) => Ok(Literal::Str(s.clone())),
        (LiteralText::Int(text), Primitive::I32) => {
            text.parse().map(Literal::I32).map_err(|_| width())
        }
        (LiteralText::Int(text), Primitive::U32) => {
            text.parse().map(Literal::U32).map_err(|_| width())
        }
        (LiteralText::Int(text), Primitive::I64) => {
            text.parse().map(Literal::I64).map_err(|_| width())
        }
        (LiteralText::Int(text), Primitive::U64) => {
            text.parse().map(Literal::U64).map_err(|_| width())
        }
        (LiteralText::Int(text) | LiteralText::Float(text), Primitive::F32) => text
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Literal::F32)
            .ok_or_else(width),
        (LiteralText::Int(text) | LiteralText::Float(text), Primitive::F64) => text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Literal::F64)
            .ok_or_else(width),
        (LiteralText::Float(_), p) if p.is_integer() => Err(width()),
        (value, _) => Err(Error::TypeMismatch {
            offset: literal.offset,
            se: id,
            detail: format!("expected {target} literal, found {} {value}", value.kind()),
        }),
    }
}

fn cast_all(id: u32, items: &[RawLiteral<'_>], target: Primitive) -> Result<Vec<Literal>, Error> {
    items.iter().map(|item| cast(id, item, target)).collect()
}

fn single<'r, 's>(id: u32, raw: &'r RawSubexpr<'s>) -> Result<&'r RawLiteral<'s>, Error> {
    match &raw.rhs {
        RawRhs::Literal(literal) => Ok(literal),
        RawRhs::Set(_) => Err(Error::TypeMismatch {
            offset: raw.rhs_offset,
            se: id,
            detail: "expected a single literal, found a {...} set".to_owned(),
        }),
    }
}

fn set_items<'r, 's>(id: u32, raw: &'r RawSubexpr<'s>) -> Result<&'r [RawLiteral<'s>], Error> {
    match &raw.rhs {
        RawRhs::Set(items) => Ok(items),
        RawRhs::Literal(literal) => Err(Error::TypeMismatch {
            offset: raw.rhs_offset,
            se: id,
            detail: format!("expected a {{...}} set, found {} {}", literal.value.kind(), literal.value),
        }),
    }
}

fn not_defined(id: u32, raw: &RawSubexpr<'_>, op: impl ToString, lhs: &Schema) -> Error {
    Error::OperatorNotDefined {
        offset: raw.op_offset,
        se: id,
        op: op.to_string(),
        lhs: lhs.to_string(),
    }
}

fn unsupported(id: u32, raw: &RawSubexpr<'_>, verb: Verb, container: &Schema) -> Error {
    Error::UnsupportedContainerVerb {
        offset: raw.op_offset,
        se: id,
        verb: verb.to_string(),
        container: container.to_string(),
    }
}

fn check(id: u32, raw: &RawSubexpr<'_>, lhs: ResolvedPath) -> Result<Subexpr, Error> {
    let (op, rhs, rhs_type) = match &raw.op {
        RawOp::Rel(op) => check_relational(id, raw, *op, &lhs.leaf)?,
        RawOp::Arith {
            op,
            operand,
            relation,
        } => check_arithmetic(id, raw, *op, operand, *relation, &lhs.leaf)?,
        RawOp::Verb(verb) => check_verb(id, raw, *verb, &lhs.leaf)?,
    };
    Ok(Subexpr {
        id,
        offset: raw.offset,
        lhs,
        op,
        rhs,
        rhs_type,
        connective: raw.connective,
    })
}

type Checked = (Operator, Rhs, Primitive);

fn check_relational(
    id: u32,
    raw: &RawSubexpr<'_>,
    op: RelOp,
    leaf: &Schema,
) -> Result<Checked, Error> {
    let Some(p) = leaf.as_primitive() else {
        return Err(not_defined(id, raw, op, leaf));
    };
    if p == Primitive::Bool && !matches!(op, RelOp::Eq | RelOp::Ne) {
        return Err(not_defined(id, raw, op, leaf));
    }
    let rhs = cast(id, single(id, raw)?, p)?;
    Ok((Operator::Relational(op), Rhs::Literal(rhs), p))
}

fn check_arithmetic(
    id: u32,
    raw: &RawSubexpr<'_>,
    op: ArithOp,
    operand: &RawLiteral<'_>,
    relation: RelOp,
    leaf: &Schema,
) -> Result<Checked, Error> {
    let Some(p) = leaf.as_primitive().filter(|p| p.is_numeric()) else {
        return Err(not_defined(id, raw, op, leaf));
    };
    if op == ArithOp::Rem && p.is_float() {
        return Err(not_defined(id, raw, op, leaf));
    }
    let operand_value = cast(id, operand, p)?;
    if p.is_integer() && matches!(op, ArithOp::Div | ArithOp::Rem) && operand_value.is_zero() {
        return Err(Error::DivisionByZeroLiteral {
            offset: operand.offset,
            se: id,
        });
    }
    let rhs = cast(id, single(id, raw)?, p)?;
    Ok((
        Operator::Arithmetic {
            op,
            operand: operand_value,
            relation,
        },
        Rhs::Literal(rhs),
        p,
    ))
}

fn check_verb(id: u32, raw: &RawSubexpr<'_>, verb: Verb, leaf: &Schema) -> Result<Checked, Error> {
    let ci = verb.case_insensitive();
    let op = Operator::Verb(verb);

    match (verb.kind(), leaf) {
        (VerbKind::Size(_), container) if container.is_container() => {
            let n = cast(id, single(id, raw)?, Primitive::U64)?;
            Ok((op, Rhs::Literal(n), Primitive::U64))
        }
        (VerbKind::Size(_), other) => Err(unsupported(id, raw, verb, other)),
        (VerbKind::In, Schema::Primitive(p)) => {
            if ci && *p != Primitive::Str {
                return Err(not_defined(id, raw, verb, leaf));
            }
            let items = cast_all(id, set_items(id, raw)?, *p)?;
            Ok((op, Rhs::Set(items), *p))
        }
        (
            VerbKind::Equals | VerbKind::Contains | VerbKind::StartsWith | VerbKind::EndsWith,
            Schema::Primitive(Primitive::Str),
        ) => {
            let needle = cast(id, single(id, raw)?, Primitive::Str)?;
            Ok((op, Rhs::Literal(needle), Primitive::Str))
        }
        (VerbKind::Contains, Schema::Set(p) | Schema::List(p)) => {
            if ci && *p != Primitive::Str {
                return Err(not_defined(id, raw, verb, leaf));
            }
            let element = cast(id, single(id, raw)?, *p)?;
            Ok((op, Rhs::Literal(element), *p))
        }
        (VerbKind::StartsWith | VerbKind::EndsWith, Schema::List(p)) => {
            if ci && *p != Primitive::Str {
                return Err(not_defined(id, raw, verb, leaf));
            }
            let rhs = match &raw.rhs {
                RawRhs::Literal(element) => Rhs::Literal(cast(id, element, *p)?),
                RawRhs::Set(items) => Rhs::Set(cast_all(id, items, *p)?),
            };
            Ok((op, rhs, *p))
        }
        (VerbKind::Contains, Schema::Map(k, _)) if !ci => {
            let key = cast(id, single(id, raw)?, k.primitive())?;
            Ok((op, Rhs::Literal(key), k.primitive()))
        }
        (_, Schema::Primitive(_) | Schema::Record(_)) => Err(not_defined(id, raw, verb, leaf)),
        (_, container) => Err(unsupported(id, raw, verb, container)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use crate::types::{Group, PNode};

    fn schema() -> RecordSchema {
        RecordSchema::new()
            .field("symbol", Schema::STR)
            .field("price", Schema::F64)
            .field("quantity", Schema::I32)
            .field("volume", Schema::U64)
            .field("buyOrSell", Schema::BOOL)
            .field("ratio", Schema::F32)
            .field("skills", Schema::Set(Primitive::Str))
            .field("ids", Schema::Set(Primitive::I64))
            .field("roadwayNumbers", Schema::List(Primitive::I32))
            .field("names", Schema::List(Primitive::Str))
            .field("housingNumbers", Schema::Map(MapKey::Str, Primitive::I32))
            .field("byId", Schema::Map(MapKey::U32, Primitive::Str))
            .field(
                "employee",
                Schema::Record(
                    RecordSchema::new()
                        .field("id", Schema::I32)
                        .field("name", Schema::STR),
                ),
            )
            .field(
                "rows",
                Schema::ListOfRecords(
                    RecordSchema::new()
                        .field("id", Schema::U32)
                        .field("tags", Schema::Map(MapKey::Str, Primitive::I64)),
                ),
            )
    }

    fn compiled(source: &str) -> CompiledExpression {
        compile(source, &schema(), &mut Tracer::off())
            .unwrap_or_else(|e| panic!("{source}: {e}"))
    }

    fn code(source: &str) -> ErrorCode {
        compile(source, &schema(), &mut Tracer::off())
            .expect_err(source)
            .code()
    }

    #[test]
    fn simple_comparison() {
        let c = compiled(r#"symbol == "IBM" && price > 140.5"#);
        assert_eq!(c.subexprs().len(), 2);
        let se = &c.subexprs()[1];
        assert_eq!(se.id(), 2);
        assert_eq!(se.lhs().leaf(), &Schema::F64);
        assert_eq!(se.rhs(), &Rhs::Literal(Literal::F64(140.5)));
        assert_eq!(se.rhs_type(), Primitive::F64);
        assert_eq!(c.source(), r#"symbol == "IBM" && price > 140.5"#);
        assert_eq!(c.fingerprint(), schema().fingerprint());
    }

    #[test]
    fn integer_literal_takes_lhs_width() {
        let c = compiled("volume >= 10 && price > 3 && ratio < 1");
        assert_eq!(c.subexprs()[0].rhs(), &Rhs::Literal(Literal::U64(10)));
        assert_eq!(c.subexprs()[1].rhs(), &Rhs::Literal(Literal::F64(3.0)));
        assert_eq!(c.subexprs()[2].rhs(), &Rhs::Literal(Literal::F32(1.0)));
    }

    #[test]
    fn nested_and_indexed_paths() {
        let c = compiled(r#"rows[1].tags["Main"] > 0 && employee.name startsWith "A""#);
        let path = c.subexprs()[0].lhs();
        assert_eq!(
            path.steps(),
            &[
                PathStep::Field("rows".into()),
                PathStep::Index(1),
                PathStep::Field("tags".into()),
                PathStep::Key(KeyLiteral::Str("Main".into())),
            ]
        );
        assert_eq!(path.leaf(), &Schema::I64);
        assert_eq!(c.subexprs()[1].lhs().leaf(), &Schema::STR);
    }

    #[test]
    fn map_key_width() {
        let c = compiled(r#"byId[7] == "seven""#);
        assert_eq!(
            c.subexprs()[0].lhs().steps()[1],
            PathStep::Key(KeyLiteral::U32(7))
        );
        assert_eq!(code(r#"byId[-1] == "x""#), ErrorCode::ResolveKeyTypeMismatch);
        assert_eq!(code(r#"byId["7"] == "x""#), ErrorCode::ResolveKeyTypeMismatch);
        assert_eq!(code(r#"housingNumbers[1] == 1"#), ErrorCode::ResolveKeyTypeMismatch);
    }

    #[test]
    fn negative_list_index_compiles() {
        let c = compiled("roadwayNumbers[-1] > 6");
        assert_eq!(c.subexprs()[0].lhs().steps()[1], PathStep::Index(-1));
    }

    #[test]
    fn resolution_errors() {
        let err = compile("employee.salary > 1", &schema(), &mut Tracer::off()).unwrap_err();
        assert_eq!(
            err,
            Error::UnknownField {
                offset: 9,
                field: "employee.salary".into()
            }
        );
        assert_eq!(code("missing == 1"), ErrorCode::ResolveUnknownField);
        assert_eq!(code("price.currency == 1"), ErrorCode::ResolveNotARecord);
        assert_eq!(code("rows.id == 1"), ErrorCode::ResolveNotARecord);
        assert_eq!(code(r#"skills["a"] == 1"#), ErrorCode::ResolveNotIndexable);
        assert_eq!(code("price[0] == 1"), ErrorCode::ResolveNotIndexable);
        assert_eq!(code("employee[0] == 1"), ErrorCode::ResolveNotIndexable);
        assert_eq!(code(r#"roadwayNumbers["x"] == 1"#), ErrorCode::ResolveKeyTypeMismatch);
        assert_eq!(code("roadwayNumbers[1.5] == 1"), ErrorCode::ResolveKeyTypeMismatch);
        assert_eq!(
            code("roadwayNumbers[3000000000] == 1"),
            ErrorCode::ResolveKeyTypeMismatch
        );
    }

    #[test]
    fn relational_typing() {
        assert_eq!(code(r#"quantity == "ten""#), ErrorCode::TypeCheckTypeMismatch);
        assert_eq!(code("symbol == 1"), ErrorCode::TypeCheckTypeMismatch);
        assert_eq!(code("buyOrSell == 1"), ErrorCode::TypeCheckTypeMismatch);
        assert_eq!(code("buyOrSell < true"), ErrorCode::TypeCheckOperatorNotDefined);
        assert_eq!(code("skills == 1"), ErrorCode::TypeCheckOperatorNotDefined);
        assert_eq!(code("employee == 1"), ErrorCode::TypeCheckOperatorNotDefined);
        assert_eq!(code("quantity == 1.5"), ErrorCode::TypeCheckWidthMismatch);
        assert_eq!(code("quantity == 3000000000"), ErrorCode::TypeCheckWidthMismatch);
        assert_eq!(code("volume > -1"), ErrorCode::TypeCheckWidthMismatch);
        assert_eq!(code("ratio > 1e39"), ErrorCode::TypeCheckWidthMismatch);
        assert_eq!(code("quantity == {1, 2}"), ErrorCode::TypeCheckTypeMismatch);
        compiled(r#"symbol < "M" && buyOrSell != false"#);
    }

    #[test]
    fn type_errors_carry_subexpr_and_offset() {
        let err = compile(
            r#"symbol == "IBM" && quantity == "x""#,
            &schema(),
            &mut Tracer::off(),
        )
        .unwrap_err();
        assert_eq!(err.subexpr(), Some(2));
        assert_eq!(err.offset(), Some(31));
    }

    #[test]
    fn arithmetic_typing() {
        let c = compiled("quantity % 8 == 0 && price * 2 > 100");
        assert_eq!(
            c.subexprs()[0].op(),
            &Operator::Arithmetic {
                op: ArithOp::Rem,
                operand: Literal::I32(8),
                relation: RelOp::Eq,
            }
        );
        assert_eq!(code("quantity / 0 == 1"), ErrorCode::TypeCheckDivisionByZeroLiteral);
        assert_eq!(code("volume % 0 == 1"), ErrorCode::TypeCheckDivisionByZeroLiteral);
        assert_eq!(code("price % 2 == 1"), ErrorCode::TypeCheckOperatorNotDefined);
        assert_eq!(code(r#"symbol + 1 == 2"#), ErrorCode::TypeCheckOperatorNotDefined);
        assert_eq!(code("buyOrSell + 1 == 2"), ErrorCode::TypeCheckOperatorNotDefined);
        compiled("price / 0 > 1");
    }

    #[test]
    fn string_verbs() {
        compiled(r#"symbol contains "B" && symbol notStartsWithCI "x" && symbol equalsCI "ibm""#);
        assert_eq!(code("symbol contains 1"), ErrorCode::TypeCheckTypeMismatch);
        assert_eq!(code(r#"quantity contains "1""#), ErrorCode::TypeCheckOperatorNotDefined);
        assert_eq!(code(r#"quantity equalsCI "1""#), ErrorCode::TypeCheckOperatorNotDefined);
        assert_eq!(code(r#"symbol contains {"a"}"#), ErrorCode::TypeCheckTypeMismatch);
    }

    #[test]
    fn container_verbs() {
        let c = compiled(r#"skills containsCI "java" && ids notContains 7"#);
        assert_eq!(c.subexprs()[1].rhs(), &Rhs::Literal(Literal::I64(7)));
        assert_eq!(c.subexprs()[1].rhs_type(), Primitive::I64);

        compiled(r#"names startsWith {"a", "b"} && roadwayNumbers endsWith 3"#);
        compiled(r#"housingNumbers contains "Main""#);

        assert_eq!(code("ids containsCI 7"), ErrorCode::TypeCheckOperatorNotDefined);
        assert_eq!(code(r#"skills startsWith "a""#), ErrorCode::TypeCheckUnsupportedContainerVerb);
        assert_eq!(code(r#"housingNumbers containsCI "a""#), ErrorCode::TypeCheckUnsupportedContainerVerb);
        assert_eq!(code(r#"housingNumbers endsWith "a""#), ErrorCode::TypeCheckUnsupportedContainerVerb);
        assert_eq!(code("rows contains 1"), ErrorCode::TypeCheckUnsupportedContainerVerb);
        assert_eq!(code(r#"skills equalsCI "a""#), ErrorCode::TypeCheckUnsupportedContainerVerb);
        assert_eq!(code(r#"skills in {"a"}"#), ErrorCode::TypeCheckUnsupportedContainerVerb);
        assert_eq!(code(r#"skills contains 1"#), ErrorCode::TypeCheckTypeMismatch);
    }

    #[test]
    fn in_verbs() {
        let c = compiled(r#"symbol inCI {"ibm", "msft"} && quantity in {1, 2, 3}"#);
        assert_eq!(
            c.subexprs()[1].rhs(),
            &Rhs::Set(vec![Literal::I32(1), Literal::I32(2), Literal::I32(3)])
        );
        assert_eq!(code("quantity inCI {1}"), ErrorCode::TypeCheckOperatorNotDefined);
        assert_eq!(code("quantity in 1"), ErrorCode::TypeCheckTypeMismatch);
        assert_eq!(code(r#"quantity in {1, "2"}"#), ErrorCode::TypeCheckTypeMismatch);
    }

    #[test]
    fn size_verbs() {
        let c = compiled("skills sizeGE 3 && rows sizeEQ 0 && housingNumbers sizeLT 2");
        assert_eq!(c.subexprs()[0].rhs(), &Rhs::Literal(Literal::U64(3)));
        assert_eq!(code("symbol sizeGT 1"), ErrorCode::TypeCheckUnsupportedContainerVerb);
        assert_eq!(code("skills sizeGT -1"), ErrorCode::TypeCheckWidthMismatch);
        assert_eq!(code(r#"skills sizeGT "1""#), ErrorCode::TypeCheckTypeMismatch);
    }

    #[test]
    fn tree_is_carried_through() {
        let c = compiled("(quantity == 1 && price > 2) || symbol == \"x\"");
        let [PNode::Group(inner), PNode::Subexprs { first: 3, last: 3 }] = c.tree().children()
        else {
            panic!("unexpected tree {:?}", c.tree());
        };
        assert_eq!(inner.children(), &[PNode::Subexprs { first: 1, last: 2 }]);
        assert_ne!(c.tree(), &Group::default());
    }

    #[test]
    fn display_renders_canonically() {
        let c = compiled("( quantity%8==0&&price>2 )||symbol=='x'");
        assert_eq!(
            c.to_string(),
            r#"(quantity % 8 == 0 && price > 2.0) || symbol == "x""#
        );
    }

    #[test]
    fn compile_twice_is_structurally_equal() {
        let source = r#"(symbol == "IBM" && price > 140.5) || skills sizeGE 2"#;
        assert_eq!(compiled(source), compiled(source));
    }

    #[test]
    fn trace_reports_tokens_and_subexprs() {
        let mut sink = crate::RecordingSink::new();
        let mut tracer = Tracer::new(Some(&mut sink));
        compile("quantity > 1", &schema(), &mut tracer).unwrap();
        drop(tracer);
        let events = sink.into_events();
        assert_eq!(
            events,
            vec![
                TraceEvent::Token {
                    offset: 0,
                    text: "quantity".into()
                },
                TraceEvent::Token {
                    offset: 9,
                    text: ">".into()
                },
                TraceEvent::Token {
                    offset: 11,
                    text: "1".into()
                },
                TraceEvent::SubexprFormed {
                    id: 1,
                    description: "quantity > 1".into()
                },
            ]
        );
    }
}
