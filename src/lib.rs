//! A small symbolic algebra engine.
//!
//! Text is parsed into an [`Expression`] tree which can then be evaluated,
//! differentiated and simplified.
//!
//! ```rust
//! use symalg::Expression;
//!
//! let expr: Expression = "7x^9".parse().unwrap();
//! let derivative = expr.diff("x").unwrap().simplify().unwrap();
//!
//! assert_eq!(derivative.to_string(), "(63 * (x ^ 8))");
//! assert_eq!(derivative.eval(&[("x", 1.0)]).unwrap(), 63.0);
//! ```

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub mod codegen;
mod expr;
pub mod ops;
mod parse;

pub use expr::Expression;
pub use ops::{Context, EvaluationError};
pub use parse::{
    parse, tokenize, ParseError, Parser, Token, TokenKind, DEFAULT_MAX_DEPTH,
};
