//! Tokenizer and group-stack parser for the expression language.

mod grammar;
mod lexer;

pub(crate) use grammar::{LiteralText, RawLiteral, RawOp, RawRhs, RawStep, RawSubexpr, parse};
pub(crate) use lexer::tokenize;
