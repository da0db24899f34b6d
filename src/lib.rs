pub mod eval;
pub mod lex;
pub mod parse;
pub mod report;

pub use eval::{Interpreter, RuntimeError, Value};
pub use lex::{LexError, Lexer, Literal, Token, TokenKind};
pub use parse::{Expr, ParseError, ParseFailure, Parser, ReversePolish};
pub use report::Reporter;

/// Scans `source` into tokens ending with [`TokenKind::Eof`]. Lexical errors go
/// to `reporter` and never stop the scan.
pub fn scan<'de>(source: &'de str, reporter: &mut Reporter) -> Vec<Token<'de>> {
    Lexer::new(source).scan(reporter)
}

/// Parses one expression. `None` means at least one error was reported.
pub fn parse<'de>(tokens: Vec<Token<'de>>, reporter: &mut Reporter) -> Option<Expr<'de>> {
    Parser::new(tokens).parse_reporting(reporter)
}

pub fn evaluate<'de>(expr: &Expr<'de>) -> Result<Value<'de>, RuntimeError> {
    Interpreter::new(std::io::sink()).evaluate(expr)
}
