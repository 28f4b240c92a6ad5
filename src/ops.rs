//! [`Expression`] operations.

use crate::Expression;
use smol_str::SmolStr;
use std::{
    borrow::Borrow,
    collections::{BTreeMap, HashMap},
    error::Error,
    fmt::{self, Display, Formatter},
    hash::{BuildHasher, Hash},
};

/// Contextual information used when evaluating an [`Expression`].
pub trait Context {
    /// Get the value bound to a variable, if there is one.
    fn value_of(&self, name: &str) -> Option<f64>;
}

impl<'a, C: Context + ?Sized> Context for &'a C {
    fn value_of(&self, name: &str) -> Option<f64> { (**self).value_of(name) }
}

impl<K, S> Context for HashMap<K, f64, S>
where
    K: Borrow<str> + Hash + Eq,
    S: BuildHasher,
{
    fn value_of(&self, name: &str) -> Option<f64> { self.get(name).copied() }
}

impl<K> Context for BTreeMap<K, f64>
where
    K: Borrow<str> + Ord,
{
    fn value_of(&self, name: &str) -> Option<f64> { self.get(name).copied() }
}

impl<K: AsRef<str>> Context for [(K, f64)] {
    fn value_of(&self, name: &str) -> Option<f64> {
        self.iter()
            .find(|(key, _)| key.as_ref() == name)
            .map(|&(_, value)| value)
    }
}

impl<K: AsRef<str>, const N: usize> Context for [(K, f64); N] {
    fn value_of(&self, name: &str) -> Option<f64> {
        self[..].value_of(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationError {
    UnboundVariable { name: SmolStr },
    DivisionByZero,
    /// The result of `base^exponent` isn't a real number.
    Domain { base: f64, exponent: f64 },
    /// Only powers with a constant exponent can be differentiated.
    UnsupportedDifferentiation { exponent: Expression },
    /// Simplifying produced an infinite or NaN constant, which has no
    /// written form.
    NonFinite { value: f64 },
}

impl Display for EvaluationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationError::UnboundVariable { name } => {
                write!(f, "No value was provided for \"{}\"", name)
            },
            EvaluationError::DivisionByZero => write!(f, "Division by zero"),
            EvaluationError::Domain { base, exponent } => write!(
                f,
                "{}^{} is not a real number",
                base, exponent
            ),
            EvaluationError::UnsupportedDifferentiation { exponent } => write!(
                f,
                "Unable to differentiate a power with the non-constant \
                 exponent, {}",
                exponent
            ),
            EvaluationError::NonFinite { value } => {
                write!(f, "The constant, {}, is not a finite number", value)
            },
        }
    }
}

impl Error for EvaluationError {}

impl Expression {
    /// Calculate this expression's value, looking variables up in `ctx`.
    pub fn eval<C>(&self, ctx: &C) -> Result<f64, EvaluationError>
    where
        C: Context + ?Sized,
    {
        evaluate(self, ctx)
    }

    /// The derivative of this expression with respect to a variable.
    ///
    /// The result isn't simplified.
    pub fn diff(&self, name: &str) -> Result<Expression, EvaluationError> {
        tracing::debug!(expr = %self, variable = name, "Differentiating");
        differentiate(self, name)
    }

    /// Rewrite this expression in its canonical form.
    pub fn simplify(&self) -> Result<Expression, EvaluationError> {
        simplify(self)
    }
}

/// Evaluate an [`Expression`] to a single number.
pub fn evaluate<C>(expr: &Expression, ctx: &C) -> Result<f64, EvaluationError>
where
    C: Context + ?Sized,
{
    match expr {
        Expression::Const(value) => Ok(*value),
        Expression::Var(name) => ctx.value_of(name).ok_or_else(|| {
            EvaluationError::UnboundVariable { name: name.clone() }
        }),
        Expression::Neg(operand) => Ok(-evaluate(operand, ctx)?),
        Expression::Add(terms) => {
            terms.iter().map(|term| evaluate(term, ctx)).sum()
        },
        Expression::Mul(factors) => {
            factors.iter().map(|factor| evaluate(factor, ctx)).product()
        },
        Expression::Div {
            numerator,
            denominator,
        } => {
            let numerator = evaluate(numerator, ctx)?;
            let denominator = evaluate(denominator, ctx)?;
            divide(numerator, denominator)
        },
        Expression::Pow { base, exponent } => {
            power(evaluate(base, ctx)?, evaluate(exponent, ctx)?)
        },
    }
}

fn divide(numerator: f64, denominator: f64) -> Result<f64, EvaluationError> {
    if denominator == 0.0 {
        Err(EvaluationError::DivisionByZero)
    } else {
        Ok(numerator / denominator)
    }
}

/// Real exponentiation, where `0^0 = 1` and a negative power of zero is a
/// division by zero.
fn power(base: f64, exponent: f64) -> Result<f64, EvaluationError> {
    if base == 0.0 {
        if exponent < 0.0 {
            return Err(EvaluationError::DivisionByZero);
        } else if exponent == 0.0 {
            return Ok(1.0);
        }
    }

    let value = base.powf(exponent);

    if value.is_nan() && !base.is_nan() && !exponent.is_nan() {
        Err(EvaluationError::Domain { base, exponent })
    } else {
        Ok(value)
    }
}

/// Constants left behind by [`simplify()`] must be finite, otherwise they
/// can't be displayed and parsed back.
fn finite(value: f64) -> Result<Expression, EvaluationError> {
    if value.is_finite() {
        Ok(Expression::Const(value))
    } else {
        Err(EvaluationError::NonFinite { value })
    }
}

/// Calculate an [`Expression`]'s derivative with respect to a particular
/// variable.
pub fn differentiate(
    expr: &Expression,
    name: &str,
) -> Result<Expression, EvaluationError> {
    let got = match expr {
        Expression::Const(_) => Expression::Const(0.0),
        Expression::Var(var) => {
            if var == name {
                Expression::Const(1.0)
            } else {
                Expression::Const(0.0)
            }
        },
        Expression::Neg(operand) => -differentiate(operand, name)?,
        Expression::Add(terms) => Expression::Add(
            terms
                .iter()
                .map(|term| differentiate(term, name))
                .collect::<Result<_, _>>()?,
        ),
        Expression::Mul(factors) => match factors.as_slice() {
            [] => Expression::Const(0.0),
            [factor] => differentiate(factor, name)?,
            _ => product_rule(factors, name)?,
        },
        Expression::Div {
            numerator,
            denominator,
        } => {
            // The quotient rule
            let d_top = differentiate(numerator, name)?;
            let d_bottom = differentiate(denominator, name)?;
            let top = Expression::clone(numerator);
            let bottom = Expression::clone(denominator);

            (d_top * bottom.clone() + -(top * d_bottom))
                / (bottom.clone() * bottom)
        },
        Expression::Pow { base, exponent } => match **exponent {
            // The power rule
            Expression::Const(n) => {
                let d_base = differentiate(base, name)?;
                let base = Expression::clone(base);

                Expression::Const(n) * base.pow(Expression::Const(n - 1.0))
                    * d_base
            },
            ref other => {
                return Err(EvaluationError::UnsupportedDifferentiation {
                    exponent: other.clone(),
                })
            },
        },
    };

    Ok(got)
}

/// `(f g h)' = f' g h + f g' h + f g h'`
fn product_rule(
    factors: &[Expression],
    name: &str,
) -> Result<Expression, EvaluationError> {
    let mut terms = Vec::with_capacity(factors.len());

    for i in 0..factors.len() {
        let term = factors
            .iter()
            .enumerate()
            .map(|(j, factor)| {
                if i == j {
                    differentiate(factor, name)
                } else {
                    Ok(factor.clone())
                }
            })
            .collect::<Result<_, _>>()?;

        terms.push(Expression::Mul(term));
    }

    Ok(Expression::Add(terms))
}

/// Differentiate an expression `n` times, simplifying after each step.
pub fn nth_derivative(
    expr: &Expression,
    name: &str,
    n: usize,
) -> Result<Expression, EvaluationError> {
    let mut current = expr.clone();

    for _ in 0..n {
        current = simplify(&differentiate(&current, name)?)?;
    }

    Ok(current)
}

/// Rewrite an [`Expression`] into its canonical form by folding constants,
/// removing identities and flattening nested sums and products.
///
/// Simplification is idempotent. A constant which is (or folds to) an
/// infinity or NaN is rejected with [`EvaluationError::NonFinite`].
pub fn simplify(expr: &Expression) -> Result<Expression, EvaluationError> {
    match expr {
        Expression::Const(value) => finite(*value),
        Expression::Var(_) => Ok(expr.clone()),
        Expression::Neg(operand) => Ok(match simplify(operand)? {
            Expression::Const(value) if value == 0.0 => Expression::Const(0.0),
            // double negative
            Expression::Neg(inner) => *inner,
            other => -other,
        }),
        Expression::Add(terms) => simplify_sum(terms),
        Expression::Mul(factors) => simplify_product(factors),
        Expression::Div {
            numerator,
            denominator,
        } => simplify_quotient(numerator, denominator),
        Expression::Pow { base, exponent } => simplify_power(base, exponent),
    }
}

fn simplify_sum(terms: &[Expression]) -> Result<Expression, EvaluationError> {
    let mut remaining = Vec::with_capacity(terms.len());
    let mut sum = 0.0;

    for term in simplify_and_flatten(terms, as_sum)? {
        match term {
            Expression::Const(value) => sum += value,
            other => remaining.push(other),
        }
    }

    if sum != 0.0 {
        remaining.push(finite(sum)?);
    }

    Ok(collapse(remaining, 0.0, Expression::Add))
}

fn simplify_product(
    factors: &[Expression],
) -> Result<Expression, EvaluationError> {
    let mut remaining = Vec::with_capacity(factors.len());
    let mut product = 1.0;

    for factor in simplify_and_flatten(factors, as_product)? {
        match factor {
            Expression::Const(value) => {
                product *= value;
                // 0 * x = 0
                if product == 0.0 {
                    return Ok(Expression::Const(0.0));
                }
            },
            other => remaining.push(other),
        }
    }

    // the coefficient goes first
    if product != 1.0 {
        remaining.insert(0, finite(product)?);
    }

    Ok(collapse(remaining, 1.0, Expression::Mul))
}

fn as_sum(expr: Expression) -> Result<Vec<Expression>, Expression> {
    match expr {
        Expression::Add(terms) => Ok(terms),
        other => Err(other),
    }
}

fn as_product(expr: Expression) -> Result<Vec<Expression>, Expression> {
    match expr {
        Expression::Mul(factors) => Ok(factors),
        other => Err(other),
    }
}

/// Simplify each operand, splicing in the operands of any child that
/// simplified to the same kind of node.
fn simplify_and_flatten<F>(
    operands: &[Expression],
    mut same_kind: F,
) -> Result<Vec<Expression>, EvaluationError>
where
    F: FnMut(Expression) -> Result<Vec<Expression>, Expression>,
{
    let mut flat = Vec::with_capacity(operands.len());

    for operand in operands {
        match same_kind(simplify(operand)?) {
            Ok(nested) => flat.extend(nested),
            Err(other) => flat.push(other),
        }
    }

    Ok(flat)
}

/// Turn an operand list back into a single node, unwrapping the trivial
/// cases.
fn collapse<F>(
    mut operands: Vec<Expression>,
    identity: f64,
    wrap: F,
) -> Expression
where
    F: FnOnce(Vec<Expression>) -> Expression,
{
    match operands.len() {
        0 => Expression::Const(identity),
        1 => operands.remove(0),
        _ => wrap(operands),
    }
}

fn simplify_quotient(
    numerator: &Expression,
    denominator: &Expression,
) -> Result<Expression, EvaluationError> {
    let numerator = simplify(numerator)?;
    let denominator = simplify(denominator)?;

    // x / 0 is an error, even when x is also 0
    if denominator.is_const(0.0) {
        return Err(EvaluationError::DivisionByZero);
    }

    match (numerator, denominator) {
        // 0 / x = 0
        (numerator, _) if numerator.is_const(0.0) => {
            Ok(Expression::Const(0.0))
        },
        // x / 1 = x
        (numerator, denominator) if denominator.is_const(1.0) => {
            Ok(numerator)
        },
        (Expression::Const(top), Expression::Const(bottom)) => {
            finite(divide(top, bottom)?)
        },
        (numerator, denominator) => Ok(numerator / denominator),
    }
}

fn simplify_power(
    base: &Expression,
    exponent: &Expression,
) -> Result<Expression, EvaluationError> {
    let base = simplify(base)?;
    let exponent = simplify(exponent)?;

    match (base, exponent) {
        // Evaluate in-place. This comes first so 0^0 follows the numeric
        // convention.
        (Expression::Const(base), Expression::Const(exponent)) => {
            finite(power(base, exponent)?)
        },
        // 0^x = 0
        (base, _) if base.is_const(0.0) => Ok(Expression::Const(0.0)),
        // x^0 = 1
        (_, exponent) if exponent.is_const(0.0) => Ok(Expression::Const(1.0)),
        // 1^x = 1
        (base, _) if base.is_const(1.0) => Ok(Expression::Const(1.0)),
        // x^1 = x
        (base, exponent) if exponent.is_const(1.0) => Ok(base),
        (base, exponent) => Ok(base.pow(exponent)),
    }
}

/// Replace all references to a variable with an [`Expression`].
pub fn substitute(
    expression: &Expression,
    name: &str,
    value: &Expression,
) -> Expression {
    match expression {
        Expression::Var(var) if var == name => value.clone(),
        Expression::Const(_) | Expression::Var(_) => expression.clone(),
        Expression::Neg(inner) => -substitute(inner, name, value),
        Expression::Add(terms) => Expression::Add(
            terms
                .iter()
                .map(|term| substitute(term, name, value))
                .collect(),
        ),
        Expression::Mul(factors) => Expression::Mul(
            factors
                .iter()
                .map(|factor| substitute(factor, name, value))
                .collect(),
        ),
        Expression::Div {
            numerator,
            denominator,
        } => {
            substitute(numerator, name, value)
                / substitute(denominator, name, value)
        },
        Expression::Pow { base, exponent } => substitute(base, name, value)
            .pow(substitute(exponent, name, value)),
    }
}
