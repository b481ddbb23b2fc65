use std::fmt;

use crate::Error;
use crate::types::{ArithOp, Connective, Group, PNode, RelOp, Verb};

use super::lexer::{Token, TokenKind};

/// An unbound literal as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LiteralText<'s> {
    Int(&'s str),
    Float(&'s str),
    Str(String),
    Bool(bool),
}

impl LiteralText<'_> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            LiteralText::Int(_) => "integer",
            LiteralText::Float(_) => "float",
            LiteralText::Str(_) => "string",
            LiteralText::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for LiteralText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralText::Int(text) | LiteralText::Float(text) => f.write_str(text),
            LiteralText::Str(s) => write!(f, "{s:?}"),
            LiteralText::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A literal and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawLiteral<'s> {
    pub(crate) offset: usize,
    pub(crate) value: LiteralText<'s>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawStep<'s> {
    Field(&'s str),
    Subscript(RawLiteral<'s>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawOp<'s> {
    Rel(RelOp),
    Arith {
        op: ArithOp,
        operand: RawLiteral<'s>,
        relation: RelOp,
    },
    Verb(Verb),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawRhs<'s> {
    Literal(RawLiteral<'s>),
    Set(Vec<RawLiteral<'s>>),
}

/// A subexpression before its path is bound to a schema.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawSubexpr<'s> {
    pub(crate) offset: usize,
    pub(crate) lhs: Vec<(usize, RawStep<'s>)>,
    pub(crate) op_offset: usize,
    pub(crate) op: RawOp<'s>,
    pub(crate) rhs_offset: usize,
    pub(crate) rhs: RawRhs<'s>,
    pub(crate) connective: Option<Connective>,
}

/// Parser output: subexpressions in source order plus the parenthesization tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Syntax<'s> {
    pub(crate) subexprs: Vec<RawSubexpr<'s>>,
    pub(crate) tree: Group,
}

/// A group that is still open on the parser stack.
struct Frame {
    /// Offset of the `(` that opened it. `None` for the top level.
    open: Option<usize>,
    group: Group,
    members: usize,
    /// Index of the subexpression most recently appended, if it was the last member.
    trailing_subexpr: Option<usize>,
}

impl Frame {
    fn new(open: Option<usize>) -> Self {
        Self {
            open,
            group: Group::default(),
            members: 0,
            trailing_subexpr: None,
        }
    }

    fn join(&mut self, connective: Connective, offset: usize) -> Result<(), Error> {
        match self.group.connective {
            None => self.group.connective = Some(connective),
            Some(existing) if existing != connective => {
                return Err(Error::MixedLogicalOps {
                    offset,
                    group: existing.to_string(),
                    found: connective.to_string(),
                });
            }
            Some(_) => {}
        }
        Ok(())
    }
}

struct Parser<'t, 's> {
    source: &'s str,
    tokens: &'t [Token<'s>],
    pos: usize,
}

impl<'t, 's> Parser<'t, 's> {
    fn peek(&self) -> Option<&'t Token<'s>> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'t Token<'s>> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn end_offset(&self) -> usize {
        self.source.len()
    }

    fn unexpected(&self, token: Option<&Token<'_>>, expected: &'static str) -> Error {
        match token {
            Some(t) => Error::UnexpectedToken {
                offset: t.offset,
                found: t.kind.to_string(),
                expected,
            },
            None => Error::UnexpectedToken {
                offset: self.end_offset(),
                found: "end of input".to_owned(),
                expected,
            },
        }
    }

    fn literal(&mut self, after: &Token<'_>) -> Result<RawLiteral<'s>, Error> {
        let Some(token) = self.peek() else {
            return Err(Error::MissingOperand {
                offset: self.end_offset(),
                after: after.text.to_owned(),
            });
        };
        let value = match &token.kind {
            TokenKind::Int(text) => LiteralText::Int(*text),
            TokenKind::Float(text) => LiteralText::Float(*text),
            TokenKind::Str(s) => LiteralText::Str(s.clone()),
            TokenKind::Bool(b) => LiteralText::Bool(*b),
            TokenKind::Logical(_) | TokenKind::RParen => {
                return Err(Error::MissingOperand {
                    offset: token.offset,
                    after: after.text.to_owned(),
                });
            }
            _ => return Err(self.unexpected(Some(token), "a literal")),
        };
        self.pos += 1;
        Ok(RawLiteral {
            offset: token.offset,
            value,
        })
    }

    fn rhs(&mut self, after: &Token<'_>) -> Result<RawRhs<'s>, Error> {
        if !matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LBrace)) {
            return self.literal(after).map(RawRhs::Literal);
        }
        let Some(open) = self.bump() else {
            return Err(self.unexpected(None, "'{'"));
        };
        let mut items = vec![self.literal(open)?];
        loop {
            match self.bump() {
                Some(
                    comma @ Token {
                        kind: TokenKind::Comma,
                        ..
                    },
                ) => items.push(self.literal(comma)?),
                Some(Token {
                    kind: TokenKind::RBrace,
                    ..
                }) => return Ok(RawRhs::Set(items)),
                other => return Err(self.unexpected(other, "',' or '}'")),
            }
        }
    }

    fn lhs(&mut self) -> Result<Vec<(usize, RawStep<'s>)>, Error> {
        let mut steps = Vec::new();
        match self.bump() {
            Some(Token {
                kind: TokenKind::Ident(name),
                offset,
                ..
            }) => steps.push((*offset, RawStep::Field(*name))),
            other => return Err(self.unexpected(other, "a field name")),
        }
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Dot) => {
                    self.pos += 1;
                    match self.bump() {
                        Some(Token {
                            kind: TokenKind::Ident(name),
                            offset,
                            ..
                        }) => steps.push((*offset, RawStep::Field(*name))),
                        other => return Err(self.unexpected(other, "a field name after '.'")),
                    }
                }
                Some(TokenKind::LBrack) => {
                    let Some(open) = self.bump() else {
                        return Err(self.unexpected(None, "'['"));
                    };
                    let key = self.literal(open)?;
                    steps.push((open.offset, RawStep::Subscript(key)));
                    match self.bump() {
                        Some(Token {
                            kind: TokenKind::RBrack,
                            ..
                        }) => {}
                        other => return Err(self.unexpected(other, "']'")),
                    }
                }
                _ => return Ok(steps),
            }
        }
    }

    fn subexpr(&mut self) -> Result<RawSubexpr<'s>, Error> {
        let start = self.pos;
        let lhs = self.lhs()?;
        let offset = self.tokens[start].offset;
        let lhs_end = self.tokens[self.pos - 1].end();

        let Some(op_token) = self.bump() else {
            return Err(Error::MissingOperator {
                offset: self.end_offset(),
                lhs: self.source[offset..lhs_end].to_owned(),
            });
        };
        let op = match &op_token.kind {
            TokenKind::Rel(op) => RawOp::Rel(*op),
            TokenKind::Verb(verb) => RawOp::Verb(*verb),
            TokenKind::Arith(op) => {
                let operand = self.literal(op_token)?;
                let relation = match self.bump() {
                    Some(Token {
                        kind: TokenKind::Rel(relation),
                        ..
                    }) => *relation,
                    other => return Err(self.unexpected(other, "a relational operator")),
                };
                RawOp::Arith {
                    op: *op,
                    operand,
                    relation,
                }
            }
            _ => {
                return Err(Error::MissingOperator {
                    offset: op_token.offset,
                    lhs: self.source[offset..lhs_end].to_owned(),
                });
            }
        };

        let tokens = self.tokens;
        let before_rhs = &tokens[self.pos - 1];
        let rhs_offset = self.peek().map_or(self.end_offset(), |t| t.offset);
        let rhs = self.rhs(before_rhs)?;

        Ok(RawSubexpr {
            offset,
            lhs,
            op_offset: op_token.offset,
            op,
            rhs_offset,
            rhs,
            connective: None,
        })
    }
}

/// Build the subexpression list and parenthesization tree from a token stream.
///
/// Every group (the top level included) must use a single logical connective
/// between its members; mixing `&&` and `||` requires explicit parentheses.
pub(crate) fn parse<'s>(source: &'s str, tokens: &[Token<'s>]) -> Result<Syntax<'s>, Error> {
    if tokens.is_empty() {
        return Err(Error::EmptyExpression);
    }

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let mut subexprs: Vec<RawSubexpr<'s>> = Vec::new();
    let mut stack = vec![Frame::new(None)];
    let mut expect_operand = true;

    loop {
        let token = parser.peek();
        let Some(top) = stack.last_mut() else {
            return Err(Error::EmptyExpression);
        };

        if expect_operand {
            match token.map(|t| (&t.kind, t.offset)) {
                Some((TokenKind::LParen, offset)) => {
                    parser.pos += 1;
                    stack.push(Frame::new(Some(offset)));
                }
                Some((TokenKind::RParen, offset)) => {
                    return Err(match top.open {
                        Some(open) if top.members == 0 => Error::EmptyGroup { offset: open },
                        None if top.members == 0 => Error::UnbalancedParens { offset },
                        _ => Error::MissingOperand {
                            offset,
                            after: parser.tokens[parser.pos - 1].text.to_owned(),
                        },
                    });
                }
                Some((TokenKind::Ident(_), _)) => {
                    let se = parser.subexpr()?;
                    subexprs.push(se);
                    let id = u32::try_from(subexprs.len()).map_err(|_| {
                        parser.unexpected(parser.peek(), "a shorter expression")
                    })?;
                    top.group.push_subexpr(id);
                    top.members += 1;
                    top.trailing_subexpr = Some(subexprs.len() - 1);
                    expect_operand = false;
                }
                Some(_) => return Err(parser.unexpected(token, "a field name or '('")),
                None => {
                    return Err(match parser.tokens.last() {
                        Some(last) => Error::MissingOperand {
                            offset: parser.end_offset(),
                            after: last.text.to_owned(),
                        },
                        None => Error::EmptyExpression,
                    });
                }
            }
            continue;
        }

        match token.map(|t| (&t.kind, t.offset)) {
            Some((TokenKind::Logical(connective), offset)) => {
                top.join(*connective, offset)?;
                if let Some(index) = top.trailing_subexpr {
                    subexprs[index].connective = Some(*connective);
                }
                parser.pos += 1;
                expect_operand = true;
            }
            Some((TokenKind::RParen, offset)) => {
                let Some(frame) = stack.pop() else {
                    return Err(Error::UnbalancedParens { offset });
                };
                let Some(parent) = stack.last_mut() else {
                    return Err(Error::UnbalancedParens { offset });
                };
                parent.group.children.push(PNode::Group(frame.group));
                parent.members += 1;
                parent.trailing_subexpr = None;
                parser.pos += 1;
            }
            Some((TokenKind::LParen | TokenKind::Ident(_), offset)) => {
                return Err(Error::MissingLogicalOp { offset });
            }
            Some(_) => return Err(parser.unexpected(token, "'&&', '||' or ')'")),
            None => break,
        }
    }

    let Some(root) = stack.pop() else {
        return Err(Error::EmptyExpression);
    };
    if let Some(open) = root.open {
        return Err(Error::UnbalancedParens { offset: open });
    }

    Ok(Syntax {
        subexprs,
        tree: root.group,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::lexer::tokenize;

    fn syntax(source: &str) -> Result<Syntax<'_>, Error> {
        let tokens = tokenize(source)?;
        parse(source, &tokens)
    }

    fn range(first: u32, last: u32) -> PNode {
        PNode::Subexprs { first, last }
    }

    #[test]
    fn single_comparison() {
        let s = syntax("price > 140.5").unwrap();
        assert_eq!(s.subexprs.len(), 1);
        let se = &s.subexprs[0];
        assert_eq!(se.lhs, vec![(0, RawStep::Field("price"))]);
        assert_eq!(se.op, RawOp::Rel(RelOp::Gt));
        assert_eq!(se.op_offset, 6);
        assert_eq!(
            se.rhs,
            RawRhs::Literal(RawLiteral {
                offset: 8,
                value: LiteralText::Float("140.5")
            })
        );
        assert_eq!(se.connective, None);
        assert_eq!(s.tree.connective, None);
        assert_eq!(s.tree.children, vec![range(1, 1)]);
    }

    #[test]
    fn flat_conjunction_records_connectives() {
        let s = syntax(r#"symbol == "IBM" && price > 140.5 && qty < 5"#).unwrap();
        assert_eq!(s.tree.connective, Some(Connective::And));
        assert_eq!(s.tree.children, vec![range(1, 3)]);
        let connectives: Vec<_> = s.subexprs.iter().map(|se| se.connective).collect();
        assert_eq!(
            connectives,
            vec![Some(Connective::And), Some(Connective::And), None]
        );
    }

    #[test]
    fn nested_groups() {
        let s = syntax("(a == 1 && b == 2) || (c == 3 && (d == 4 || e == 5))").unwrap();
        assert_eq!(s.subexprs.len(), 5);
        assert_eq!(s.tree.connective, Some(Connective::Or));
        let [PNode::Group(left), PNode::Group(right)] = s.tree.children.as_slice() else {
            panic!("expected two groups, got {:?}", s.tree.children);
        };
        assert_eq!(left.connective, Some(Connective::And));
        assert_eq!(left.children, vec![range(1, 2)]);
        assert_eq!(right.connective, Some(Connective::And));
        assert_eq!(right.children[0], range(3, 3));
        let PNode::Group(inner) = &right.children[1] else {
            panic!("expected nested group");
        };
        assert_eq!(inner.connective, Some(Connective::Or));
        assert_eq!(inner.children, vec![range(4, 5)]);
        // connective of a subexpression followed by a closing paren is not set
        assert_eq!(s.subexprs[1].connective, None);
        assert_eq!(s.subexprs[2].connective, Some(Connective::And));
    }

    #[test]
    fn redundant_parentheses_are_kept() {
        let s = syntax("((x == 1))").unwrap();
        let [PNode::Group(outer)] = s.tree.children.as_slice() else {
            panic!("expected one group");
        };
        assert_eq!(outer.connective, None);
        let [PNode::Group(inner)] = outer.children.as_slice() else {
            panic!("expected nested group");
        };
        assert_eq!(inner.children, vec![range(1, 1)]);
    }

    #[test]
    fn paths_with_subscripts() {
        let s = syntax(r#"rows[0].tags["Main"] sizeGE 1"#).unwrap();
        let steps: Vec<_> = s.subexprs[0].lhs.iter().map(|(_, step)| step.clone()).collect();
        assert_eq!(
            steps,
            vec![
                RawStep::Field("rows"),
                RawStep::Subscript(RawLiteral {
                    offset: 5,
                    value: LiteralText::Int("0")
                }),
                RawStep::Field("tags"),
                RawStep::Subscript(RawLiteral {
                    offset: 13,
                    value: LiteralText::Str("Main".into())
                }),
            ]
        );
        assert_eq!(s.subexprs[0].op, RawOp::Verb(Verb::SizeGE));
    }

    #[test]
    fn arithmetic_form() {
        let s = syntax("quantity % 8 == 0").unwrap();
        assert_eq!(
            s.subexprs[0].op,
            RawOp::Arith {
                op: ArithOp::Rem,
                operand: RawLiteral {
                    offset: 11,
                    value: LiteralText::Int("8")
                },
                relation: RelOp::Eq,
            }
        );
    }

    #[test]
    fn set_rhs() {
        let s = syntax("lang in {'go', 'rust'}").unwrap();
        let RawRhs::Set(items) = &s.subexprs[0].rhs else {
            panic!("expected set literal");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].value, LiteralText::Str("rust".into()));
    }

    #[test]
    fn mixed_connectives_rejected() {
        let err = syntax("a == 1 && b == 2 || c == 3").unwrap_err();
        assert_eq!(
            err,
            Error::MixedLogicalOps {
                offset: 17,
                group: "&&".into(),
                found: "||".into(),
            }
        );
        assert!(syntax("(a == 1 && b == 2) || c == 3").is_ok());
    }

    #[test]
    fn mixed_connectives_inside_group_rejected() {
        let err = syntax("x == 0 || (a == 1 || b == 2 && c == 3)").unwrap_err();
        assert!(matches!(err, Error::MixedLogicalOps { offset: 28, .. }));
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(syntax(""), Err(Error::EmptyExpression));
        assert_eq!(syntax("   "), Err(Error::EmptyExpression));
        assert_eq!(syntax("()"), Err(Error::EmptyGroup { offset: 0 }));
        assert_eq!(
            syntax("a == 1 && ( )"),
            Err(Error::EmptyGroup { offset: 10 })
        );
    }

    #[test]
    fn unbalanced_parentheses() {
        assert_eq!(
            syntax("(a == 1"),
            Err(Error::UnbalancedParens { offset: 0 })
        );
        assert_eq!(
            syntax("a == 1)"),
            Err(Error::UnbalancedParens { offset: 6 })
        );
        assert_eq!(syntax(")"), Err(Error::UnbalancedParens { offset: 0 }));
    }

    #[test]
    fn missing_pieces() {
        assert!(matches!(
            syntax("price"),
            Err(Error::MissingOperator { offset: 5, ref lhs }) if lhs == "price"
        ));
        assert!(matches!(
            syntax("price 5"),
            Err(Error::MissingOperator { offset: 6, .. })
        ));
        assert!(matches!(
            syntax("price >"),
            Err(Error::MissingOperand { offset: 7, .. })
        ));
        assert!(matches!(
            syntax("price > && a == 1"),
            Err(Error::MissingOperand { offset: 8, .. })
        ));
        assert!(matches!(
            syntax("a == 1 &&"),
            Err(Error::MissingOperand { offset: 9, .. })
        ));
        assert_eq!(
            syntax("a == 1 b == 2"),
            Err(Error::MissingLogicalOp { offset: 7 })
        );
        assert_eq!(
            syntax("(a == 1) (b == 2)"),
            Err(Error::MissingLogicalOp { offset: 9 })
        );
    }

    #[test]
    fn unexpected_tokens() {
        assert!(matches!(
            syntax("== 1"),
            Err(Error::UnexpectedToken { offset: 0, .. })
        ));
        assert!(matches!(
            syntax("a == b"),
            Err(Error::UnexpectedToken { offset: 5, .. })
        ));
        assert!(matches!(
            syntax("a in {1, 2"),
            Err(Error::UnexpectedToken { offset: 10, .. })
        ));
        assert!(matches!(
            syntax("a. == 1"),
            Err(Error::UnexpectedToken { offset: 3, .. })
        ));
        assert!(matches!(
            syntax("a + 1 2"),
            Err(Error::UnexpectedToken { offset: 6, .. })
        ));
    }
}
