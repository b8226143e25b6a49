//! Expression text to parse tree
//!
//! The grammar knows nothing about functions, numeric modes or contexts. It
//! produces an [`Expression`] that the [`AstBuilder`](crate::builder::AstBuilder)
//! turns into evaluable [`Node`](crate::node::Node)s.

mod parser;
mod syntax;

pub use parser::{Lexer, Parser, Token, parse};
pub use syntax::{BinaryOperator, ExprKind, Expression, UnaryOperator};
