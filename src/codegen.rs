//! Hooks for turning an [`Expression`] into code for some other backend.

use crate::Expression;
use smol_str::SmolStr;
use std::fmt::{self, Display, Formatter};

/// A bottom-up fold over an [`Expression`] tree.
///
/// Children are visited left to right and each method receives the results
/// of visiting its node's children.
pub trait Visitor {
    type Output;

    fn visit_const(&mut self, value: f64) -> Self::Output;
    fn visit_var(&mut self, name: &str) -> Self::Output;
    fn visit_neg(&mut self, operand: Self::Output) -> Self::Output;
    fn visit_add(&mut self, terms: Vec<Self::Output>) -> Self::Output;
    fn visit_mul(&mut self, factors: Vec<Self::Output>) -> Self::Output;
    fn visit_div(
        &mut self,
        numerator: Self::Output,
        denominator: Self::Output,
    ) -> Self::Output;
    fn visit_pow(
        &mut self,
        base: Self::Output,
        exponent: Self::Output,
    ) -> Self::Output;
}

impl Expression {
    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Expression::Const(value) => visitor.visit_const(*value),
            Expression::Var(name) => visitor.visit_var(name),
            Expression::Neg(operand) => {
                let operand = operand.accept(visitor);
                visitor.visit_neg(operand)
            },
            Expression::Add(terms) => {
                let terms = terms.iter().map(|t| t.accept(visitor)).collect();
                visitor.visit_add(terms)
            },
            Expression::Mul(factors) => {
                let factors =
                    factors.iter().map(|f| f.accept(visitor)).collect();
                visitor.visit_mul(factors)
            },
            Expression::Div {
                numerator,
                denominator,
            } => {
                let numerator = numerator.accept(visitor);
                let denominator = denominator.accept(visitor);
                visitor.visit_div(numerator, denominator)
            },
            Expression::Pow { base, exponent } => {
                let base = base.accept(visitor);
                let exponent = exponent.accept(visitor);
                visitor.visit_pow(base, exponent)
            },
        }
    }
}

/// An [`Expression`] rendered as Rust source code.
#[derive(Debug, Clone, PartialEq)]
pub struct RustSource {
    /// The free variables, in the order they first appear.
    pub parameters: Vec<SmolStr>,
    /// An `f64` expression using each parameter as a local variable.
    pub body: String,
}

impl RustSource {
    pub fn new(expr: &Expression) -> Self {
        let mut writer = SourceWriter::default();
        let body = expr.accept(&mut writer);

        RustSource {
            parameters: writer.parameters,
            body,
        }
    }

    /// Wrap the body in a closure taking each parameter as an `f64`.
    pub fn closure(&self) -> String {
        let parameters: Vec<_> = self
            .parameters
            .iter()
            .map(|name| format!("{}: f64", name))
            .collect();

        format!("|{}| -> f64 {{ {} }}", parameters.join(", "), self.body)
    }
}

impl Display for RustSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.closure())
    }
}

#[derive(Debug, Default)]
struct SourceWriter {
    parameters: Vec<SmolStr>,
}

impl Visitor for SourceWriter {
    type Output = String;

    fn visit_const(&mut self, value: f64) -> String {
        if value.is_nan() {
            String::from("f64::NAN")
        } else if value.is_infinite() {
            if value > 0.0 {
                String::from("f64::INFINITY")
            } else {
                String::from("f64::NEG_INFINITY")
            }
        } else if value.is_sign_negative() {
            format!("({:?}_f64)", value)
        } else {
            format!("{:?}_f64", value)
        }
    }

    fn visit_var(&mut self, name: &str) -> String {
        if !self.parameters.iter().any(|p| p == name) {
            self.parameters.push(name.into());
        }

        name.to_string()
    }

    fn visit_neg(&mut self, operand: String) -> String {
        format!("(-{})", operand)
    }

    fn visit_add(&mut self, terms: Vec<String>) -> String {
        if terms.is_empty() {
            String::from("0.0_f64")
        } else {
            format!("({})", terms.join(" + "))
        }
    }

    fn visit_mul(&mut self, factors: Vec<String>) -> String {
        if factors.is_empty() {
            String::from("1.0_f64")
        } else {
            format!("({})", factors.join(" * "))
        }
    }

    fn visit_div(&mut self, numerator: String, denominator: String) -> String {
        format!("({} / {})", numerator, denominator)
    }

    fn visit_pow(&mut self, base: String, exponent: String) -> String {
        format!("({}).powf({})", base, exponent)
    }
}
