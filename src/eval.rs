use std::{borrow::Cow, fmt::Display, io::Write};

use miette::{Diagnostic, IntoDiagnostic, SourceSpan, WrapErr};
use thiserror::Error;

use crate::{
    lex::{Literal, Token, TokenKind},
    parse::Expr,
    report::Reporter,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Value<'de> {
    Number(f64),
    Bool(bool),
    Str(Cow<'de, str>),
    Nil,
}

impl Value<'_> {
    /// Only `nil` and `false` are falsey.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Equality as seen by `==` and `!=`: every `NaN` equals every other `NaN`,
    /// and `0` differs from `-0`. Mismatched types are simply unequal.
    pub fn is_equal(&self, other: &Value<'_>) -> bool {
        match (self, other) {
            (Value::Number(lhs), Value::Number(rhs)) => {
                (lhs.is_nan() && rhs.is_nan()) || lhs.to_bits() == rhs.to_bits()
            }
            (Value::Bool(lhs), Value::Bool(rhs)) => lhs == rhs,
            (Value::Str(lhs), Value::Str(rhs)) => lhs == rhs,
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

impl<'de> From<Literal<'de>> for Value<'de> {
    fn from(literal: Literal<'de>) -> Self {
        match literal {
            Literal::Number(n) => Value::Number(n),
            Literal::Str(s) => Value::Str(Cow::Borrowed(s)),
            Literal::Bool(b) => Value::Bool(b),
            Literal::Nil => Value::Nil,
        }
    }
}

impl Display for Value<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) if n.is_infinite() => {
                write!(f, "{}Infinity", if *n < 0.0 { "-" } else { "" })
            }
            // Very large and very small magnitudes use `1.5E300` style.
            Value::Number(n) if *n != 0.0 && (n.abs() >= 1e7 || n.abs() < 1e-3) => {
                let scientific = format!("{n:e}");
                let (mantissa, exponent) = scientific
                    .split_once('e')
                    .unwrap_or((scientific.as_str(), "0"));
                if mantissa.contains('.') {
                    write!(f, "{mantissa}E{exponent}")
                } else {
                    write!(f, "{mantissa}.0E{exponent}")
                }
            }
            // `f64` already prints `3` rather than `3.0`.
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Nil => write!(f, "nil"),
        }
    }
}

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
    pub operator: String,
    pub line: usize,

    #[label("this operator")]
    pub span: SourceSpan,
}

impl RuntimeError {
    pub fn new(operator: &Token<'_>, message: impl Into<String>) -> Self {
        RuntimeError {
            message: message.into(),
            operator: operator.lexeme.to_string(),
            line: operator.line,
            span: operator.span(),
        }
    }
}

pub struct Interpreter<W> {
    out: W,
}

impl<W: Write> Interpreter<W> {
    pub fn new(out: W) -> Self {
        Interpreter { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Evaluates `expr` and writes the result, or hands a runtime error to
    /// `reporter`. Only failing to write is an error here.
    pub fn interpret(&mut self, expr: &Expr<'_>, reporter: &mut Reporter) -> miette::Result<()> {
        match self.evaluate(expr) {
            Ok(value) => writeln!(self.out, "{value}")
                .into_diagnostic()
                .wrap_err("writing result failed"),
            Err(e) => {
                reporter.runtime_error(e);
                Ok(())
            }
        }
    }

    pub fn evaluate<'de>(&self, expr: &Expr<'de>) -> Result<Value<'de>, RuntimeError> {
        Ok(match expr {
            Expr::Literal(literal) => Value::from(*literal),
            Expr::Grouping(inner) => self.evaluate(inner)?,
            Expr::Unary { operator, operand } => {
                let operand = self.evaluate(operand)?;
                match (operator.kind, operand) {
                    (TokenKind::Bang, operand) => Value::Bool(!operand.is_truthy()),
                    (TokenKind::Minus, Value::Number(n)) => Value::Number(-n),
                    (TokenKind::Minus, _) => {
                        return Err(RuntimeError::new(operator, "Operand must be a number."));
                    }
                    _ => return Err(RuntimeError::new(operator, "Unknown unary operator.")),
                }
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(operator, left, right)?
            }
            Expr::Ternary {
                predicate,
                if_true,
                if_false,
            } => {
                if self.evaluate(predicate)?.is_truthy() {
                    self.evaluate(if_true)?
                } else {
                    self.evaluate(if_false)?
                }
            }
        })
    }
}

fn binary<'de>(
    operator: &Token<'_>,
    left: Value<'de>,
    right: Value<'de>,
) -> Result<Value<'de>, RuntimeError> {
    use TokenKind::*;

    Ok(match (operator.kind, left, right) {
        // The left operand has already been evaluated for its effects.
        (Comma, _, right) => right,
        (EqualEqual, lhs, rhs) => Value::Bool(lhs.is_equal(&rhs)),
        (BangEqual, lhs, rhs) => Value::Bool(!lhs.is_equal(&rhs)),
        (Plus, Value::Number(lhs), Value::Number(rhs)) => Value::Number(lhs + rhs),
        (Plus, Value::Str(lhs), Value::Str(rhs)) => {
            Value::Str(Cow::Owned(lhs.into_owned() + &*rhs))
        }
        (Plus, _, _) => {
            return Err(RuntimeError::new(
                operator,
                "Operands must be two numbers or two strings.",
            ));
        }
        (Minus, Value::Number(lhs), Value::Number(rhs)) => Value::Number(lhs - rhs),
        (Star, Value::Number(lhs), Value::Number(rhs)) => Value::Number(lhs * rhs),
        (Slash, Value::Number(lhs), Value::Number(rhs)) => Value::Number(lhs / rhs),
        (Greater, Value::Number(lhs), Value::Number(rhs)) => Value::Bool(lhs > rhs),
        (GreaterEqual, Value::Number(lhs), Value::Number(rhs)) => Value::Bool(lhs >= rhs),
        (Less, Value::Number(lhs), Value::Number(rhs)) => Value::Bool(lhs < rhs),
        (LessEqual, Value::Number(lhs), Value::Number(rhs)) => Value::Bool(lhs <= rhs),
        (Minus | Star | Slash | Greater | GreaterEqual | Less | LessEqual, _, _) => {
            return Err(RuntimeError::new(operator, "Operands must be numbers."));
        }
        _ => return Err(RuntimeError::new(operator, "Unknown binary operator.")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, parse::Parser};

    fn eval(source: &str) -> Result<Value<'_>, RuntimeError> {
        let mut reporter = Reporter::new(None, source);
        let tokens = Lexer::new(source).scan(&mut reporter);
        let expr = Parser::new(tokens)
            .parse_reporting(&mut reporter)
            .unwrap_or_else(|| panic!("`{source}` should parse: {:?}", reporter.headlines()));
        Interpreter::new(Vec::<u8>::new()).evaluate(&expr)
    }

    fn shown(source: &str) -> String {
        match eval(source) {
            Ok(value) => value.to_string(),
            Err(e) => panic!("`{source}` failed: {e}"),
        }
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Ok(Value::Number(7.0)));
        assert_eq!(eval("1 - 2 - 3"), Ok(Value::Number(-4.0)));
        assert_eq!(eval("(1 - 2) * -3"), Ok(Value::Number(3.0)));
        assert_eq!(eval("7 / 2"), Ok(Value::Number(3.5)));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            eval("\"foo\" + \"bar\""),
            Ok(Value::Str(Cow::Owned("foobar".to_string())))
        );
    }

    #[test]
    fn truthiness() {
        assert_eq!(eval("!nil"), Ok(Value::Bool(true)));
        assert_eq!(eval("!false"), Ok(Value::Bool(false)));
        assert_eq!(eval("!0"), Ok(Value::Bool(false)));
        assert_eq!(eval("!\"\""), Ok(Value::Bool(false)));
        assert_eq!(eval("!!true"), Ok(Value::Bool(true)));
    }

    #[test]
    fn equality_never_fails_on_mixed_types() {
        assert_eq!(eval("nil == nil"), Ok(Value::Bool(true)));
        assert_eq!(eval("nil == false"), Ok(Value::Bool(false)));
        assert_eq!(eval("1 == \"1\""), Ok(Value::Bool(false)));
        assert_eq!(eval("\"a\" != \"a\""), Ok(Value::Bool(false)));
        assert_eq!(eval("1 == 1.0"), Ok(Value::Bool(true)));
    }

    #[test]
    fn number_equality_is_bitwise_with_one_nan() {
        assert_eq!(eval("(0/0) == (0/0)"), Ok(Value::Bool(true)));
        assert_eq!(eval("(0/0) != (0/0)"), Ok(Value::Bool(false)));
        assert_eq!(eval("0 == -0"), Ok(Value::Bool(false)));
        assert_eq!(eval("0 != -0"), Ok(Value::Bool(true)));
        assert_eq!(eval("(1/0) == (2/0)"), Ok(Value::Bool(true)));
        assert_eq!(eval("0.1 + 0.2 == 0.3"), Ok(Value::Bool(false)));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("1 < 2"), Ok(Value::Bool(true)));
        assert_eq!(eval("2 <= 2"), Ok(Value::Bool(true)));
        assert_eq!(eval("1 > 2"), Ok(Value::Bool(false)));
        assert_eq!(eval("3 >= 4"), Ok(Value::Bool(false)));
    }

    #[test]
    fn ternary_evaluates_one_branch() {
        assert_eq!(eval("true ? 1 : false ? 2 : 3"), Ok(Value::Number(1.0)));
        assert_eq!(eval("false ? 1 : true ? 2 : 3"), Ok(Value::Number(2.0)));
        assert_eq!(eval("true ? 1 : -\"x\""), Ok(Value::Number(1.0)));
        assert_eq!(eval("nil ? -\"x\" : 2"), Ok(Value::Number(2.0)));
        assert_eq!(eval("0 ? \"yes\" : \"no\""), Ok(Value::Str(Cow::Borrowed("yes"))));
    }

    #[test]
    fn comma_yields_rightmost() {
        assert_eq!(eval("1, 2, 3"), Ok(Value::Number(3.0)));
        // The discarded operand is still evaluated.
        assert!(eval("-nil, 2").is_err());
    }

    #[test]
    fn division_follows_ieee() {
        assert_eq!(shown("1 / 0"), "Infinity");
        assert_eq!(shown("-1 / 0"), "-Infinity");
        assert_eq!(shown("0 / 0"), "NaN");
        assert_eq!(shown("true ? 1 : (1/0)"), "1");
    }

    #[test]
    fn type_errors_name_the_operator() {
        let error = eval("1 + \"a\"").expect_err("should fail");
        assert_eq!(error.message, "Operands must be two numbers or two strings.");
        assert_eq!(error.operator, "+");
        assert_eq!(error.span, SourceSpan::from(2..3));

        let error = eval("-\"a\"").expect_err("should fail");
        assert_eq!(error.message, "Operand must be a number.");
        assert_eq!(error.operator, "-");

        let error = eval("\"x\" < 1").expect_err("should fail");
        assert_eq!(error.message, "Operands must be numbers.");
        assert_eq!(error.operator, "<");

        let error = eval("1 +\n(2 * nil)").expect_err("should fail");
        assert_eq!(error.operator, "*");
        assert_eq!(error.line, 2);
    }

    #[test]
    fn display_strips_integral_fraction() {
        assert_eq!(shown("3.0"), "3");
        assert_eq!(shown("2.5"), "2.5");
        assert_eq!(shown("nil"), "nil");
        assert_eq!(shown("true"), "true");
        assert_eq!(shown("\"hi\""), "hi");
        assert_eq!(shown("-0"), "-0");
    }

    #[test]
    fn extreme_magnitudes_use_exponents() {
        assert_eq!(shown("9999999"), "9999999");
        assert_eq!(shown("10000000"), "1.0E7");
        assert_eq!(shown("12345678.5"), "1.23456785E7");
        assert_eq!(shown("10000000 * 10000000 * 10000000"), "1.0E21");
        assert_eq!(shown("-10000000"), "-1.0E7");
        assert_eq!(shown("0.001"), "0.001");
        assert_eq!(shown("0.00015"), "1.5E-4");
        assert_eq!(shown("0"), "0");
    }

    #[test]
    fn evaluation_is_repeatable() {
        let source = "(1 + 2) * 3 == 9 ? \"a\" + \"b\" : nil";
        let mut reporter = Reporter::new(None, source);
        let tokens = Lexer::new(source).scan(&mut reporter);
        let expr = Parser::new(tokens).parse().expect("should parse");
        let snapshot = expr.clone();
        let interpreter = Interpreter::new(Vec::<u8>::new());
        let first = interpreter.evaluate(&expr);
        let second = interpreter.evaluate(&expr);
        assert_eq!(first, second);
        assert_eq!(expr, snapshot);
    }

    #[test]
    fn interpret_writes_or_reports() {
        let source = "2 * 21, -\"a\"";
        let mut reporter = Reporter::new(None, source);
        let tokens = Lexer::new(source).scan(&mut reporter);
        let expr = Parser::new(tokens).parse().expect("should parse");
        let mut interpreter = Interpreter::new(Vec::<u8>::new());
        interpreter
            .interpret(&expr, &mut reporter)
            .expect("writing to a Vec");
        assert!(interpreter.into_inner().is_empty());
        assert!(reporter.had_runtime_error());
        assert_eq!(
            reporter.headlines(),
            vec!["Operand must be a number.\n[line 1]"]
        );

        let source = "2 * 21";
        reporter.reset(source);
        let tokens = Lexer::new(source).scan(&mut reporter);
        let expr = Parser::new(tokens).parse().expect("should parse");
        let mut interpreter = Interpreter::new(Vec::<u8>::new());
        interpreter
            .interpret(&expr, &mut reporter)
            .expect("writing to a Vec");
        assert_eq!(interpreter.into_inner(), b"42\n");
        assert!(!reporter.had_runtime_error());
    }

    #[test]
    fn hand_built_trees_with_foreign_operators_fail_cleanly() {
        let source = "1 ; 2";
        let mut reporter = Reporter::new(None, source);
        let tokens = Lexer::new(source).scan(&mut reporter);
        let expr = Expr::Binary {
            left: Box::new(Expr::Literal(Literal::Number(1.0))),
            operator: tokens[1],
            right: Box::new(Expr::Literal(Literal::Number(2.0))),
        };
        let error = Interpreter::new(Vec::<u8>::new())
            .evaluate(&expr)
            .expect_err("should fail");
        assert_eq!(error.message, "Unknown binary operator.");
    }
}
