use crate::{ops::EvaluationError, Expression};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    iter::Peekable,
    ops::Range,
    str::FromStr,
    vec,
};

/// The deepest expression tree [`parse()`] will build before giving up with
/// [`ParseError::TooDeep`].
///
/// Evaluation, differentiation and simplification all recurse over the tree,
/// so this keeps pathological input from overflowing the stack.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// How tightly a prefix `-` binds to its operand.
///
/// This sits between `*` and `^`, so `-x^2` is `-(x^2)` while `-x*y` is
/// `(-x)*y`.
const UNARY_MINUS_BINDING_POWER: u8 = 25;

/// The `(left, right)` binding power of each binary operator.
///
/// An operator with a right binding power lower than its left one is right
/// associative.
const BINDING_POWERS: &[(TokenKind, u8, u8)] = &[
    (TokenKind::Plus, 10, 11),
    (TokenKind::Minus, 10, 11),
    (TokenKind::Times, 20, 21),
    (TokenKind::Divide, 20, 21),
    (TokenKind::Caret, 30, 29),
];

const BINARY_OPERATORS: &[TokenKind] = &[
    TokenKind::Plus,
    TokenKind::Minus,
    TokenKind::Times,
    TokenKind::Divide,
    TokenKind::Caret,
];

const OPERAND_STARTS: &[TokenKind] = &[
    TokenKind::Number,
    TokenKind::Variable,
    TokenKind::Minus,
    TokenKind::OpenParen,
];

/// Parse an [`Expression`] tree from some text and simplify it.
pub fn parse(s: &str) -> Result<Expression, ParseError> {
    let tokens = tokenize(s)?;
    let raw = Parser::new(tokens).parse()?;
    let simplified = raw.simplify()?;

    tracing::debug!(src = s, expr = %simplified, "Parsed an expression");

    Ok(simplified)
}

impl FromStr for Expression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { parse(s) }
}

/// Split some text into [`Token`]s.
///
/// Juxtaposed operands are multiplied, so a synthetic [`TokenKind::Times`]
/// (with an empty span) is inserted between a number, variable or `)` and a
/// following number, variable or `(`. That's how `5y`, `4x^2` and `(a)(b)`
/// are read as products.
///
/// Whitespace is any Unicode whitespace ([`char::is_whitespace`]), not just
/// ASCII spaces and tabs.
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, ParseError> {
    let mut tokens: Vec<Token<'_>> = Vec::new();

    for token in Tokens::new(src) {
        let token = token?;

        let implicit_times = tokens.last().map_or(false, |previous| {
            previous.kind.ends_operand() && token.kind.starts_operand()
        });

        if implicit_times {
            tracing::trace!(
                index = token.span.start,
                "Inserting an implicit multiplication"
            );
            tokens.push(Token::implicit_times(token.span.start));
        }

        tokens.push(token);
    }

    Ok(tokens)
}

/// A precedence climbing ("Pratt") parser for converting a stream of tokens
/// into an expression tree.
///
/// The grammar:
///
/// ```text
/// primary            := NUMBER
///                     | VARIABLE
///                     | "-" primary
///                     | "(" expression ")"
///
/// expression(min_bp) := primary { binary_op expression(right_bp) }*
///                       while left_bp(binary_op) >= min_bp
/// ```
///
/// The resulting tree is exactly what was written, [`parse()`] is what runs
/// the simplifier over it.
#[derive(Debug, Clone)]
pub struct Parser<'a> {
    tokens: Peekable<vec::IntoIter<Token<'a>>>,
    max_depth: usize,
    nesting: usize,
}

/// A partially parsed tree and its depth.
#[derive(Debug, Clone, PartialEq)]
struct Parsed {
    expr: Expression,
    depth: usize,
}

impl Parsed {
    fn leaf(expr: Expression) -> Self { Parsed { expr, depth: 1 } }
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
            max_depth: DEFAULT_MAX_DEPTH,
            nesting: 0,
        }
    }

    pub fn with_max_depth(self, max_depth: usize) -> Self {
        Parser { max_depth, ..self }
    }

    pub fn parse(mut self) -> Result<Expression, ParseError> {
        let parsed = self.expression(0)?;

        match self.tokens.next() {
            None => Ok(parsed.expr),
            Some(Token { kind, span, .. }) => Err(ParseError::UnexpectedToken {
                found: kind,
                span,
                expected: BINARY_OPERATORS,
            }),
        }
    }

    fn peek(&mut self) -> Option<TokenKind> {
        self.tokens.peek().map(|tok| tok.kind)
    }

    fn advance(&mut self) -> Result<Token<'a>, ParseError> {
        self.tokens.next().ok_or(ParseError::UnexpectedEndOfInput)
    }

    fn expression(&mut self, min_bp: u8) -> Result<Parsed, ParseError> {
        self.nesting += 1;
        if self.nesting > self.max_depth {
            return Err(ParseError::TooDeep {
                max_depth: self.max_depth,
            });
        }

        let mut left = self.primary()?;

        while let Some(kind) = self.peek() {
            let (left_bp, right_bp) = match kind.binding_power() {
                Some(bp) => bp,
                None => break,
            };

            if left_bp < min_bp {
                break;
            }

            // skip past the operator
            let _ = self.advance()?;
            // and parse the second bit
            let right = self.expression(right_bp)?;

            left = self.check_depth(binary_op(kind, left, right))?;
        }

        self.nesting -= 1;
        Ok(left)
    }

    fn primary(&mut self) -> Result<Parsed, ParseError> {
        let token = self.advance()?;

        match token.kind {
            TokenKind::Number => {
                let value = token.text.parse().map_err(|_| {
                    ParseError::InvalidNumber {
                        span: token.span.clone(),
                    }
                })?;
                Ok(Parsed::leaf(Expression::Const(value)))
            },
            TokenKind::Variable => {
                Ok(Parsed::leaf(Expression::var(token.text)))
            },
            TokenKind::Minus => {
                let operand = self.expression(UNARY_MINUS_BINDING_POWER)?;
                self.check_depth(Parsed {
                    depth: operand.depth + 1,
                    expr: -operand.expr,
                })
            },
            TokenKind::OpenParen => {
                let inner = self.expression(0)?;

                match self.tokens.next() {
                    Some(Token {
                        kind: TokenKind::CloseParen,
                        ..
                    }) => Ok(inner),
                    Some(Token { kind, span, .. }) => {
                        Err(ParseError::UnexpectedToken {
                            found: kind,
                            span,
                            expected: &[TokenKind::CloseParen],
                        })
                    },
                    None => Err(ParseError::UnclosedParenthesis {
                        span: token.span,
                    }),
                }
            },
            other => Err(ParseError::UnexpectedToken {
                found: other,
                span: token.span,
                expected: OPERAND_STARTS,
            }),
        }
    }

    fn check_depth(&self, parsed: Parsed) -> Result<Parsed, ParseError> {
        if parsed.depth > self.max_depth {
            Err(ParseError::TooDeep {
                max_depth: self.max_depth,
            })
        } else {
            Ok(parsed)
        }
    }
}

/// Combine two operands using the node the operator maps to.
fn binary_op(kind: TokenKind, left: Parsed, right: Parsed) -> Parsed {
    let Parsed {
        expr: left,
        depth: left_depth,
    } = left;
    let Parsed {
        expr: right,
        depth: right_depth,
    } = right;

    let (expr, right_depth) = match kind {
        TokenKind::Plus => (left + right, right_depth),
        TokenKind::Minus => (left - right, right_depth + 1),
        TokenKind::Times => (left * right, right_depth),
        // division is multiplication by the reciprocal
        TokenKind::Divide => (
            left * right.pow(Expression::Const(-1.0)),
            right_depth + 1,
        ),
        TokenKind::Caret => (left.pow(right), right_depth),
        other => unreachable!("{:?} is not a binary op", other),
    };

    Parsed {
        expr,
        depth: left_depth.max(right_depth) + 1,
    }
}

/// Possible errors that may occur while parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    InvalidCharacter {
        character: char,
        index: usize,
    },
    InvalidNumber {
        span: Range<usize>,
    },
    UnexpectedEndOfInput,
    UnexpectedToken {
        found: TokenKind,
        span: Range<usize>,
        expected: &'static [TokenKind],
    },
    UnclosedParenthesis {
        span: Range<usize>,
    },
    TooDeep {
        max_depth: usize,
    },
    /// The expression was parsed, but simplifying it failed (e.g. `1/0`).
    Simplification(EvaluationError),
}

impl From<EvaluationError> for ParseError {
    fn from(e: EvaluationError) -> Self { ParseError::Simplification(e) }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidCharacter { character, index } => write!(
                f,
                "Unexpected character, {:?}, at index {}",
                character, index
            ),
            ParseError::InvalidNumber { span } => {
                write!(f, "Invalid number at {}..{}", span.start, span.end)
            },
            ParseError::UnexpectedEndOfInput => {
                write!(f, "Unexpected end of input")
            },
            ParseError::UnexpectedToken {
                found,
                span,
                expected,
            } => {
                write!(
                    f,
                    "Found {} at {}..{} but expected ",
                    found, span.start, span.end
                )?;

                for (i, kind) in expected.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    write!(f, "{}", kind)?;
                }

                Ok(())
            },
            ParseError::UnclosedParenthesis { span } => write!(
                f,
                "The \"(\" at index {} is never closed",
                span.start
            ),
            ParseError::TooDeep { max_depth } => write!(
                f,
                "The expression is nested more than {} levels deep",
                max_depth
            ),
            ParseError::Simplification(_) => {
                write!(f, "Unable to simplify the expression")
            },
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParseError::Simplification(inner) => Some(inner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Tokens<'a> {
    src: &'a str,
    cursor: usize,
}

impl<'a> Tokens<'a> {
    fn new(src: &'a str) -> Self { Tokens { src, cursor: 0 } }

    fn rest(&self) -> &'a str { &self.src[self.cursor..] }

    fn peek(&self) -> Option<char> { self.rest().chars().next() }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.cursor += c.len_utf8();
        Some(c)
    }

    fn chomp(
        &mut self,
        kind: TokenKind,
    ) -> Option<Result<Token<'a>, ParseError>> {
        let start = self.cursor;
        self.advance()?;
        let end = self.cursor;

        Some(Ok(Token::from_text(self.src, start..end, kind)))
    }

    fn skip_digits(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }

            self.advance();
        }
    }

    fn chomp_number(&mut self) -> Token<'a> {
        let start = self.cursor;
        self.skip_digits();

        if self.peek() == Some('.') {
            // skip past the decimal
            self.advance();
            self.skip_digits();
        }

        let end = self.cursor;

        Token::from_text(self.src, start..end, TokenKind::Number)
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Result<Token<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.peek()? {
                space if space.is_whitespace() => {
                    self.advance();
                    continue;
                },
                '0'..='9' => Some(Ok(self.chomp_number())),
                // variables are always a single letter
                'a'..='z' | 'A'..='Z' => self.chomp(TokenKind::Variable),
                '^' => self.chomp(TokenKind::Caret),
                '*' => self.chomp(TokenKind::Times),
                '/' => self.chomp(TokenKind::Divide),
                '+' => self.chomp(TokenKind::Plus),
                '-' => self.chomp(TokenKind::Minus),
                '(' => self.chomp(TokenKind::OpenParen),
                ')' => self.chomp(TokenKind::CloseParen),
                other => Some(Err(ParseError::InvalidCharacter {
                    character: other,
                    index: self.cursor,
                })),
            };
        }
    }
}

/// A single lexeme.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub span: Range<usize>,
    pub kind: TokenKind,
}

impl<'a> Token<'a> {
    fn from_text(
        original_source: &'a str,
        span: Range<usize>,
        kind: TokenKind,
    ) -> Self {
        Token {
            text: &original_source[span.clone()],
            span,
            kind,
        }
    }

    fn implicit_times(index: usize) -> Self {
        Token {
            text: "*",
            span: index..index,
            kind: TokenKind::Times,
        }
    }
}

/// The kinds of token that can appear in an [`Expression`]'s text form.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TokenKind {
    Number,
    Variable,
    Caret,
    Times,
    Divide,
    Plus,
    Minus,
    OpenParen,
    CloseParen,
}

impl TokenKind {
    fn binding_power(self) -> Option<(u8, u8)> {
        BINDING_POWERS
            .iter()
            .find(|(kind, _, _)| *kind == self)
            .map(|&(_, left, right)| (left, right))
    }

    fn ends_operand(self) -> bool {
        match self {
            TokenKind::Number | TokenKind::Variable | TokenKind::CloseParen => {
                true
            },
            _ => false,
        }
    }

    fn starts_operand(self) -> bool {
        match self {
            TokenKind::Number | TokenKind::Variable | TokenKind::OpenParen => {
                true
            },
            _ => false,
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number => write!(f, "a number"),
            TokenKind::Variable => write!(f, "a variable"),
            TokenKind::Caret => write!(f, "\"^\""),
            TokenKind::Times => write!(f, "\"*\""),
            TokenKind::Divide => write!(f, "\"/\""),
            TokenKind::Plus => write!(f, "\"+\""),
            TokenKind::Minus => write!(f, "\"-\""),
            TokenKind::OpenParen => write!(f, "\"(\""),
            TokenKind::CloseParen => write!(f, "\")\""),
        }
    }
}


#[cfg(test)]
mod parser_tests {
    use super::*;

    fn parse_raw(src: &str) -> Result<Expression, ParseError> {
        Parser::new(tokenize(src)?).parse()
    }

    macro_rules! parser_test {
        ($name:ident, $src:expr, $should_be:expr) => {
            #[test]
            fn $name() {
                let got = parse_raw($src).unwrap();

                let displayed = got.to_string();
                assert_eq!(displayed, $should_be);
            }
        };
    }

    parser_test!(simple_integer, "1", "1");
    parser_test!(simple_decimal, "2.5", "2.5");
    parser_test!(variable, "x", "x");
    parser_test!(one_plus_one, "1 + 1", "(1 + 1)");
    parser_test!(subtraction_adds_the_negation, "1 - x", "(1 + (-x))");
    parser_test!(one_plus_one_times_three, "1 + 1*3", "(1 + (1 * 3))");
    parser_test!(one_plus_one_all_times_three, "(1 + 1)*3", "((1 + 1) * 3)");
    parser_test!(number_in_parens, "(1)", "1");
    parser_test!(addition_is_left_associative, "1 + 2 + 3", "((1 + 2) + 3)");
    parser_test!(
        division_is_multiplication_by_the_reciprocal,
        "x / y",
        "(x * (y ^ (-1)))"
    );
    parser_test!(
        division_is_left_associative,
        "8/4/2",
        "((8 * (4 ^ (-1))) * (2 ^ (-1)))"
    );
    parser_test!(exponents_are_right_associative, "2^3^2", "(2 ^ (3 ^ 2))");
    parser_test!(negation_wraps_the_power, "-x^2", "(-(x ^ 2))");
    parser_test!(negation_binds_tighter_than_times, "-x*y", "((-x) * y)");
    parser_test!(double_negation, "--x", "(-(-x))");
    parser_test!(negative_exponent, "x^-2", "(x ^ (-2))");
    parser_test!(
        power_before_product,
        "4x^2",
        "(4 * (x ^ 2))"
    );
    parser_test!(
        bimdas,
        "1*2 + 3*4/(5 - 2)*1 - 3",
        "(((1 * 2) + (((3 * 4) * ((5 + (-2)) ^ (-1))) * 1)) + (-3))"
    );

    #[test]
    fn structure_of_a_negated_power() {
        let got = parse_raw("-x^2").unwrap();

        let should_be = -Expression::var("x").pow(Expression::Const(2.0));
        assert_eq!(got, should_be);
    }

    #[test]
    fn parse_simplifies_the_result() {
        let got = parse("2 + 3 * 4").unwrap();

        assert_eq!(got, Expression::Const(14.0));
    }

    #[test]
    fn expression_implements_from_str() {
        let got: Expression = "x * 1".parse().unwrap();

        assert_eq!(got, Expression::var("x"));
    }

    #[test]
    fn syntax_errors() {
        let inputs = vec![
            ("", ParseError::UnexpectedEndOfInput),
            ("1 +", ParseError::UnexpectedEndOfInput),
            ("-", ParseError::UnexpectedEndOfInput),
            ("(1 + 2", ParseError::UnclosedParenthesis { span: 0..1 }),
            (
                "*2",
                ParseError::UnexpectedToken {
                    found: TokenKind::Times,
                    span: 0..1,
                    expected: OPERAND_STARTS,
                },
            ),
            (
                "1 + )",
                ParseError::UnexpectedToken {
                    found: TokenKind::CloseParen,
                    span: 4..5,
                    expected: OPERAND_STARTS,
                },
            ),
            (
                "1 + 2)",
                ParseError::UnexpectedToken {
                    found: TokenKind::CloseParen,
                    span: 5..6,
                    expected: BINARY_OPERATORS,
                },
            ),
            (
                "(1 + 2 ^)",
                ParseError::UnexpectedToken {
                    found: TokenKind::CloseParen,
                    span: 8..9,
                    expected: OPERAND_STARTS,
                },
            ),
        ];

        for (src, should_be) in inputs {
            let got = parse_raw(src).unwrap_err();
            assert_eq!(got, should_be, "{}", src);
        }
    }

    #[test]
    fn division_by_a_constant_zero_is_caught_while_simplifying() {
        let got = parse("1/0").unwrap_err();

        assert_eq!(
            got,
            ParseError::Simplification(EvaluationError::DivisionByZero)
        );
    }

    #[test]
    fn deeply_nested_parentheses_are_rejected() {
        let src = format!("{}x{}", "(".repeat(10_000), ")".repeat(10_000));

        let got = parse(&src).unwrap_err();

        assert_eq!(got, ParseError::TooDeep {
            max_depth: DEFAULT_MAX_DEPTH
        });
    }

    #[test]
    fn long_chains_are_rejected() {
        let src = vec!["x"; 1_000].join(" + ");

        let got = parse(&src).unwrap_err();

        assert_eq!(got, ParseError::TooDeep {
            max_depth: DEFAULT_MAX_DEPTH
        });
    }

    #[test]
    fn the_depth_limit_is_configurable() {
        let tokens = tokenize("1 + 2 + 3").unwrap();

        let got = Parser::new(tokens).with_max_depth(2).parse().unwrap_err();

        assert_eq!(got, ParseError::TooDeep { max_depth: 2 });
    }

    #[test]
    fn errors_can_be_displayed() {
        let got = parse("1 + *").unwrap_err().to_string();

        assert_eq!(
            got,
            concat!(
                "Found \"*\" at 4..5 but expected a number or a variable ",
                "or \"-\" or \"(\"",
            )
        );
    }
}
