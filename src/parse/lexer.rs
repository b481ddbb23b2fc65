use std::fmt;

use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, opt};
use winnow::error::ModalResult;
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use crate::Error;
use crate::types::{ArithOp, Connective, RelOp, Verb};

/// Lexical category of a token, with its payload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind<'s> {
    Ident(&'s str),
    /// Integer literal text, sign included. Width is chosen at resolution.
    Int(&'s str),
    /// Float literal text, sign included.
    Float(&'s str),
    Str(String),
    Bool(bool),
    Verb(Verb),
    Rel(RelOp),
    Arith(ArithOp),
    Logical(Connective),
    LParen,
    RParen,
    LBrack,
    RBrack,
    LBrace,
    RBrace,
    Comma,
    Dot,
}

impl TokenKind<'_> {
    /// Whether a token of this kind can be the last token of an operand.
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Ident(_)
                | TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::Bool(_)
                | TokenKind::RParen
                | TokenKind::RBrack
                | TokenKind::RBrace
        )
    }
}

impl fmt::Display for TokenKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier '{name}'"),
            TokenKind::Int(text) | TokenKind::Float(text) => write!(f, "number {text}"),
            TokenKind::Str(s) => write!(f, "string {s:?}"),
            TokenKind::Bool(b) => write!(f, "'{b}'"),
            TokenKind::Verb(v) => write!(f, "verb '{v}'"),
            TokenKind::Rel(op) => write!(f, "'{op}'"),
            TokenKind::Arith(op) => write!(f, "'{op}'"),
            TokenKind::Logical(c) => write!(f, "'{c}'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::LBrack => f.write_str("'['"),
            TokenKind::RBrack => f.write_str("']'"),
            TokenKind::LBrace => f.write_str("'{'"),
            TokenKind::RBrace => f.write_str("'}'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Dot => f.write_str("'.'"),
        }
    }
}

/// A token with its byte offset and raw source text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token<'s> {
    pub(crate) kind: TokenKind<'s>,
    pub(crate) offset: usize,
    pub(crate) text: &'s str,
}

impl Token<'_> {
    pub(crate) fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

// -- Whitespace -------------------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    multispace0.void().parse_next(input)
}

// -- Words ------------------------------------------------------------------

fn word<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn classify(word: &str) -> TokenKind<'_> {
    match word {
        "true" => TokenKind::Bool(true),
        "false" => TokenKind::Bool(false),
        _ => Verb::from_name(word).map_or(TokenKind::Ident(word), TokenKind::Verb),
    }
}

// -- Numbers ----------------------------------------------------------------

fn number<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    (
        opt('-'),
        digit1,
        opt(('.', digit1)),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)),
    )
        .take()
        .parse_next(input)
}

fn number_tail<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.').parse_next(input)
}

fn lex_number<'s>(input: &mut &'s str, offset: usize) -> Result<TokenKind<'s>, Error> {
    let start = *input;
    let bad = |len: usize| Error::BadNumber {
        offset,
        text: start[..len].to_owned(),
    };

    let text = number.parse_next(input).map_err(|_| bad(1))?;
    let tail = number_tail.parse_next(input).map_err(|_| bad(text.len()))?;
    if !tail.is_empty() {
        return Err(bad(text.len() + tail.len()));
    }

    if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().map_err(|_| bad(text.len()))?;
        Ok(TokenKind::Float(text))
    } else {
        text.parse::<i128>().map_err(|_| bad(text.len()))?;
        Ok(TokenKind::Int(text))
    }
}

// -- Strings ----------------------------------------------------------------

fn string_literal(input: &mut &str) -> ModalResult<String> {
    let quote = one_of(['"', '\'']).parse_next(input)?;
    let mut s = String::new();
    loop {
        match any.parse_next(input)? {
            c if c == quote => return Ok(s),
            '\\' => match any.parse_next(input)? {
                '\\' => s.push('\\'),
                '"' => s.push('"'),
                '\'' => s.push('\''),
                'n' => s.push('\n'),
                't' => s.push('\t'),
                'r' => s.push('\r'),
                other => {
                    s.push('\\');
                    s.push(other);
                }
            },
            c => s.push(c),
        }
    }
}

// -- Symbols ----------------------------------------------------------------

fn punct<'s>(input: &mut &str) -> ModalResult<TokenKind<'s>> {
    alt((
        '('.value(TokenKind::LParen),
        ')'.value(TokenKind::RParen),
        '['.value(TokenKind::LBrack),
        ']'.value(TokenKind::RBrack),
        '{'.value(TokenKind::LBrace),
        '}'.value(TokenKind::RBrace),
        ','.value(TokenKind::Comma),
        '.'.value(TokenKind::Dot),
    ))
    .parse_next(input)
}

fn operator<'s>(input: &mut &str) -> ModalResult<TokenKind<'s>> {
    alt((
        "==".value(TokenKind::Rel(RelOp::Eq)),
        "!=".value(TokenKind::Rel(RelOp::Ne)),
        "<=".value(TokenKind::Rel(RelOp::Le)),
        ">=".value(TokenKind::Rel(RelOp::Ge)),
        '<'.value(TokenKind::Rel(RelOp::Lt)),
        '>'.value(TokenKind::Rel(RelOp::Gt)),
        "&&".value(TokenKind::Logical(Connective::And)),
        "||".value(TokenKind::Logical(Connective::Or)),
        '+'.value(TokenKind::Arith(ArithOp::Add)),
        '-'.value(TokenKind::Arith(ArithOp::Sub)),
        '*'.value(TokenKind::Arith(ArithOp::Mul)),
        '/'.value(TokenKind::Arith(ArithOp::Div)),
        '%'.value(TokenKind::Arith(ArithOp::Rem)),
    ))
    .parse_next(input)
}

// -- Driver -----------------------------------------------------------------

/// Split an expression into tokens. Whitespace outside string literals is
/// skipped.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token<'_>>, Error> {
    let mut input = source;
    let mut tokens: Vec<Token<'_>> = Vec::new();

    loop {
        let _ = ws.parse_next(&mut input);
        let offset = source.len() - input.len();
        let Some(c) = input.chars().next() else {
            break;
        };

        let after_operand = tokens.last().is_some_and(|t| t.kind.ends_operand());
        let signed_number = c == '-'
            && !after_operand
            && input[1..].starts_with(|d: char| d.is_ascii_digit());

        let kind = match c {
            '"' | '\'' => string_literal
                .map(TokenKind::Str)
                .parse_next(&mut input)
                .map_err(|_| Error::UnterminatedString { offset })?,
            c if c.is_ascii_digit() || signed_number => lex_number(&mut input, offset)?,
            c if c.is_ascii_alphabetic() || c == '_' => {
                let w = word
                    .parse_next(&mut input)
                    .map_err(|_| Error::UnknownChar { offset, ch: c })?;
                classify(w)
            }
            _ => alt((punct, operator))
                .parse_next(&mut input)
                .map_err(|_| Error::UnknownChar { offset, ch: c })?,
        };

        let end = source.len() - input.len();
        tokens.push(Token {
            kind,
            offset,
            text: &source[offset..end],
        });
    }

    Ok(tokens)
}
