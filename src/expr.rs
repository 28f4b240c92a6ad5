use smol_str::SmolStr;
use std::{
    fmt::{self, Display, Formatter},
    ops,
};

/// An expression tree.
///
/// Trees are immutable once built. Every operation ([`Expression::eval()`],
/// [`Expression::diff()`], [`Expression::simplify()`]) creates a new tree
/// instead of modifying the existing one.
///
/// The [`Debug`] representation shows the raw structure (variant names and
/// children) while [`Display`] gives the canonical, fully parenthesized infix
/// form.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A numeric literal.
    Const(f64),
    /// A named variable.
    Var(SmolStr),
    /// Negate the expression.
    Neg(Box<Expression>),
    /// The sum of zero or more terms.
    Add(Vec<Expression>),
    /// The product of zero or more factors.
    Mul(Vec<Expression>),
    /// A quotient. The parser never produces this (`a/b` is read as
    /// `a * b^-1`), it only shows up in trees built programmatically.
    Div {
        numerator: Box<Expression>,
        denominator: Box<Expression>,
    },
    /// Raise `base` to the power of `exponent`.
    Pow {
        base: Box<Expression>,
        exponent: Box<Expression>,
    },
}

impl Expression {
    pub fn var<S: Into<SmolStr>>(name: S) -> Self {
        Expression::Var(name.into())
    }

    pub fn pow(self, exponent: Expression) -> Self {
        Expression::Pow {
            base: Box::new(self),
            exponent: Box::new(exponent),
        }
    }

    /// Is this the literal constant, `value`?
    pub(crate) fn is_const(&self, value: f64) -> bool {
        match self {
            Expression::Const(c) => *c == value,
            _ => false,
        }
    }

    /// The names of every free variable, in the order they first appear
    /// when reading the expression left to right.
    pub fn variables(&self) -> Vec<SmolStr> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut Vec<SmolStr>) {
        match self {
            Expression::Const(_) => {},
            Expression::Var(name) => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            },
            Expression::Neg(operand) => operand.collect_variables(names),
            Expression::Add(operands) | Expression::Mul(operands) => {
                for operand in operands {
                    operand.collect_variables(names);
                }
            },
            Expression::Div {
                numerator,
                denominator,
            } => {
                numerator.collect_variables(names);
                denominator.collect_variables(names);
            },
            Expression::Pow { base, exponent } => {
                base.collect_variables(names);
                exponent.collect_variables(names);
            },
        }
    }

    /// The number of nodes on the longest path from the root to a leaf.
    pub fn depth(&self) -> usize {
        let children = match self {
            Expression::Const(_) | Expression::Var(_) => 0,
            Expression::Neg(operand) => operand.depth(),
            Expression::Add(operands) | Expression::Mul(operands) => {
                operands.iter().map(Expression::depth).max().unwrap_or(0)
            },
            Expression::Div {
                numerator,
                denominator,
            } => numerator.depth().max(denominator.depth()),
            Expression::Pow { base, exponent } => {
                base.depth().max(exponent.depth())
            },
        };

        children + 1
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Expression { Expression::Const(value) }
}

impl From<&str> for Expression {
    fn from(name: &str) -> Expression { Expression::var(name) }
}

// define some operator overloads to make constructing an expression easier.

impl ops::Add for Expression {
    type Output = Expression;

    fn add(self, rhs: Expression) -> Expression {
        Expression::Add(vec![self, rhs])
    }
}

impl ops::Sub for Expression {
    type Output = Expression;

    fn sub(self, rhs: Expression) -> Expression {
        Expression::Add(vec![self, -rhs])
    }
}

impl ops::Mul for Expression {
    type Output = Expression;

    fn mul(self, rhs: Expression) -> Expression {
        Expression::Mul(vec![self, rhs])
    }
}

impl ops::Div for Expression {
    type Output = Expression;

    fn div(self, rhs: Expression) -> Expression {
        Expression::Div {
            numerator: Box::new(self),
            denominator: Box::new(rhs),
        }
    }
}

impl ops::Neg for Expression {
    type Output = Expression;

    fn neg(self) -> Self::Output { Expression::Neg(Box::new(self)) }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            // a bare `-2 ^ x` would parse back as `-(2 ^ x)`
            Expression::Const(value) if value.is_sign_negative() => {
                write!(f, "(-{})", -value)
            },
            Expression::Const(value) => write!(f, "{}", value),
            Expression::Var(name) => write!(f, "{}", name),
            Expression::Neg(operand) => write!(f, "(-{})", operand),
            Expression::Add(operands) => write_joined(operands, " + ", f),
            Expression::Mul(operands) => write_joined(operands, " * ", f),
            Expression::Div {
                numerator,
                denominator,
            } => write!(f, "({} / {})", numerator, denominator),
            Expression::Pow { base, exponent } => {
                write!(f, "({} ^ {})", base, exponent)
            },
        }
    }
}

fn write_joined(
    operands: &[Expression],
    separator: &str,
    f: &mut Formatter<'_>,
) -> fmt::Result {
    write!(f, "(")?;

    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", separator)?;
        }
        write!(f, "{}", operand)?;
    }

    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expression { Expression::var("x") }

    fn c(value: f64) -> Expression { Expression::Const(value) }

    #[test]
    fn display() {
        let inputs = vec![
            (c(3.0), "3"),
            (c(0.5), "0.5"),
            (x(), "x"),
            (-c(5.0), "(-5)"),
            (c(-2.0), "(-2)"),
            (c(-0.0), "(-0)"),
            (c(-2.0).pow(x()), "((-2) ^ x)"),
            (Expression::Mul(vec![c(-1.5), x()]), "((-1.5) * x)"),
            (x().pow(c(-1.0)), "(x ^ (-1))"),
            (c(1.0) + c(1.0), "(1 + 1)"),
            (c(1.0) - x(), "(1 + (-x))"),
            (c(2.0) * x(), "(2 * x)"),
            (
                Expression::Mul(vec![c(2.0), x(), Expression::var("y")]),
                "(2 * x * y)",
            ),
            (c(1.0) / x(), "(1 / x)"),
            (x().pow(c(2.0)), "(x ^ 2)"),
            ((c(1.0) + c(2.0)) / c(3.0), "((1 + 2) / 3)"),
            (Expression::Add(Vec::new()), "()"),
        ];

        for (expr, should_be) in inputs {
            let got = expr.to_string();
            assert_eq!(got, should_be);
        }
    }

    #[test]
    fn debug_shows_the_raw_structure() {
        let expr = -(x() * c(2.0));

        let got = format!("{:?}", expr);

        assert_eq!(got, "Neg(Mul([Var(\"x\"), Const(2.0)]))");
    }

    #[test]
    fn variables_are_listed_in_order_of_first_appearance() {
        let y = Expression::var("y");
        let expr = y.clone() * x().pow(y) + c(3.0) / x()
            - Expression::var("z");

        let got = expr.variables();

        let should_be: Vec<SmolStr> =
            vec!["y".into(), "x".into(), "z".into()];
        assert_eq!(got, should_be);
    }

    #[test]
    fn depth_of_nested_expressions() {
        assert_eq!(c(1.0).depth(), 1);
        assert_eq!((x() + c(1.0)).depth(), 2);
        assert_eq!((-(x() * x()).pow(c(2.0))).depth(), 4);
    }
}
