// comma_expr → expr ( "," expr )* ;
// expr       → ternary ;
// ternary    → equality ( "?" ternary ":" ternary )? ;
// equality   → comparison ( ( "!=" | "==" ) comparison )* ;
// comparison → term ( ( ">" | ">=" | "<" | "<=" ) term )* ;
// term       → factor ( ( "-" | "+" ) factor )* ;
// factor     → unary ( ( "/" | "*" ) unary )* ;
// unary      → ( "!" | "-" ) unary | primary ;
// primary    → NUMBER | STRING | "true" | "false" | "nil" | "(" expr ")" ;

use std::fmt::Display;

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::{
    lex::{Literal, Token, TokenKind},
    report::Reporter,
};

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub lexeme: String,
    pub line: usize,
    pub at_end: bool,

    #[label("here")]
    pub span: SourceSpan,
}

impl ParseError {
    pub fn at(token: &Token<'_>, message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
            lexeme: token.lexeme.to_string(),
            line: token.line,
            at_end: token.kind == TokenKind::Eof,
            span: token.span(),
        }
    }

    /// Where the error sits, as shown in the one-line headline.
    pub fn location(&self) -> String {
        if self.at_end {
            " at end".to_string()
        } else {
            format!(" at '{}'", self.lexeme)
        }
    }
}

/// Every error produced by one failed parse, in the order they were found.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
#[error("could not parse expression")]
#[diagnostic(help("fix the errors below and try again"))]
pub struct ParseFailure {
    #[related]
    pub errors: Vec<ParseError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr<'de> {
    Literal(Literal<'de>),
    Grouping(Box<Expr<'de>>),
    Unary {
        operator: Token<'de>,
        operand: Box<Expr<'de>>,
    },
    Binary {
        left: Box<Expr<'de>>,
        operator: Token<'de>,
        right: Box<Expr<'de>>,
    },
    Ternary {
        predicate: Box<Expr<'de>>,
        if_true: Box<Expr<'de>>,
        if_false: Box<Expr<'de>>,
    },
}

impl Display for Expr<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(literal) => write!(f, "{literal}"),
            Expr::Grouping(inner) => write!(f, "(group {inner})"),
            Expr::Unary { operator, operand } => write!(f, "({} {operand})", operator.lexeme),
            Expr::Binary {
                left,
                operator,
                right,
            } => write!(f, "({} {left} {right})", operator.lexeme),
            Expr::Ternary {
                predicate,
                if_true,
                if_false,
            } => write!(f, "(?: {predicate} {if_true} {if_false})"),
        }
    }
}

/// Prints an expression in postfix order: `1.0 2.0 + 4.0 3.0 - *`.
pub struct ReversePolish<'a, 'de>(pub &'a Expr<'de>);

impl Display for ReversePolish<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Expr::Literal(literal) => write!(f, "{literal}"),
            Expr::Grouping(inner) => write!(f, "{}", ReversePolish(inner)),
            Expr::Unary { operator, operand } => {
                write!(f, "{} {}", ReversePolish(operand), operator.lexeme)
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => write!(
                f,
                "{} {} {}",
                ReversePolish(left),
                ReversePolish(right),
                operator.lexeme
            ),
            Expr::Ternary {
                predicate,
                if_true,
                if_false,
            } => write!(
                f,
                "{} {} {} ?:",
                ReversePolish(predicate),
                ReversePolish(if_true),
                ReversePolish(if_false)
            ),
        }
    }
}

/// How deep an expression tree may grow, counting every node on the longest path.
pub const MAX_DEPTH: usize = 128;

pub struct Parser<'de> {
    tokens: Vec<Token<'de>>,
    current: usize,
    /// Open groupings, unary operators and ternaries being parsed.
    nesting: usize,
    /// Depth of the subtree most recently produced.
    height: usize,
}

impl<'de> Parser<'de> {
    pub fn new(mut tokens: Vec<Token<'de>>) -> Self {
        if tokens.last().is_none_or(|token| token.kind != TokenKind::Eof) {
            let (line, offset) = tokens
                .last()
                .map_or((1, 0), |token| (token.line, token.offset + token.lexeme.len()));
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: "",
                literal: None,
                line,
                offset,
            });
        }
        Parser {
            tokens,
            current: 0,
            nesting: 0,
            height: 0,
        }
    }

    pub fn parse(mut self) -> Result<Expr<'de>, ParseFailure> {
        self.comma_expr()
            .map_err(|error| ParseFailure { errors: vec![error] })
    }

    /// Parses and hands every error to `reporter`; `None` means nothing usable was
    /// produced.
    pub fn parse_reporting(self, reporter: &mut Reporter) -> Option<Expr<'de>> {
        match self.parse() {
            Ok(expr) => Some(expr),
            Err(failure) => {
                for error in failure.errors {
                    reporter.parse_error(error);
                }
                None
            }
        }
    }

    fn comma_expr(&mut self) -> Result<Expr<'de>, ParseError> {
        let mut expr = self.expression()?;

        while self.matches(&[TokenKind::Comma]) {
            let operator = self.previous();
            let left_height = self.height;
            let right = self.expression()?;
            self.grow(left_height.max(self.height) + 1, &operator)?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn expression(&mut self) -> Result<Expr<'de>, ParseError> {
        self.ternary()
    }

    fn ternary(&mut self) -> Result<Expr<'de>, ParseError> {
        let expr = self.equality()?;

        if self.matches(&[TokenKind::Question]) {
            let question = self.previous();
            let predicate_height = self.height;
            self.enter()?;
            let if_true = self.ternary()?;
            let if_true_height = self.height;
            self.consume(
                TokenKind::Colon,
                "Expect ':' after '?' in ternary operator.",
            )?;
            let if_false = self.ternary()?;
            self.nesting -= 1;
            let height = predicate_height.max(if_true_height).max(self.height) + 1;
            self.grow(height, &question)?;
            return Ok(Expr::Ternary {
                predicate: Box::new(expr),
                if_true: Box::new(if_true),
                if_false: Box::new(if_false),
            });
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr<'de>, ParseError> {
        if self.matches(&[
            TokenKind::BangEqual,
            TokenKind::EqualEqual,
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
            TokenKind::Plus,
        ]) {
            let operator = self.previous();
            // Keep the cursor past the orphaned right operand; only the missing
            // operand is reported.
            let _ = self.comparison();
            return Err(ParseError::at(
                &operator,
                format!(
                    "Binary operator '{}' requires a left-hand operand.",
                    operator.lexeme
                ),
            ));
        }

        self.binary(
            Self::comparison,
            &[TokenKind::BangEqual, TokenKind::EqualEqual],
        )
    }

    fn comparison(&mut self) -> Result<Expr<'de>, ParseError> {
        self.binary(
            Self::term,
            &[
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
            ],
        )
    }

    fn term(&mut self) -> Result<Expr<'de>, ParseError> {
        self.binary(Self::factor, &[TokenKind::Minus, TokenKind::Plus])
    }

    fn factor(&mut self) -> Result<Expr<'de>, ParseError> {
        self.binary(Self::unary, &[TokenKind::Slash, TokenKind::Star])
    }

    /// One left-associative level: `operand ( op operand )*`.
    fn binary(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr<'de>, ParseError>,
        operators: &[TokenKind],
    ) -> Result<Expr<'de>, ParseError> {
        let mut expr = operand(self)?;

        while self.matches(operators) {
            let operator = self.previous();
            let left_height = self.height;
            let right = operand(self)?;
            self.grow(left_height.max(self.height) + 1, &operator)?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr<'de>, ParseError> {
        if self.matches(&[TokenKind::Bang, TokenKind::Minus]) {
            let operator = self.previous();
            self.enter()?;
            let operand = self.unary()?;
            self.nesting -= 1;
            self.grow(self.height + 1, &operator)?;
            return Ok(Expr::Unary {
                operator,
                operand: Box::new(operand),
            });
        }

        self.primary()
    }

    fn primary(&mut self) -> Result<Expr<'de>, ParseError> {
        let token = self.peek();
        let literal = match token.kind {
            TokenKind::True => Literal::Bool(true),
            TokenKind::False => Literal::Bool(false),
            TokenKind::Nil => Literal::Nil,
            TokenKind::Number | TokenKind::String => match token.literal {
                Some(literal) => literal,
                None => return Err(ParseError::at(&token, "Expect expression.")),
            },
            TokenKind::LeftParen => {
                self.advance();
                self.enter()?;
                let expr = self.expression()?;
                self.consume(TokenKind::RightParen, "Expect ')' after expression.")?;
                self.nesting -= 1;
                self.grow(self.height + 1, &token)?;
                return Ok(Expr::Grouping(Box::new(expr)));
            }
            _ => return Err(ParseError::at(&token, "Expect expression.")),
        };

        self.advance();
        self.height = 1;
        Ok(Expr::Literal(literal))
    }

    /// Guards recursion into a nested operand.
    fn enter(&mut self) -> Result<(), ParseError> {
        self.nesting += 1;
        if self.nesting > MAX_DEPTH {
            return Err(ParseError::at(&self.peek(), "Too much nesting."));
        }
        Ok(())
    }

    /// Records the depth of a freshly built node.
    fn grow(&mut self, height: usize, at: &Token<'de>) -> Result<(), ParseError> {
        if height > MAX_DEPTH {
            return Err(ParseError::at(at, "Too much nesting."));
        }
        self.height = height;
        Ok(())
    }

    /// Discards tokens until just after a `;` or just before a token that starts a
    /// statement.
    pub fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }

            match self.peek().kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }

            self.advance();
        }
    }

    fn matches(&mut self, kinds: &[TokenKind]) -> bool {
        if kinds.iter().any(|kind| self.check(*kind)) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token<'de>, ParseError> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        Err(ParseError::at(&self.peek(), message))
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end() && self.peek().kind == kind
    }

    fn advance(&mut self) -> Token<'de> {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> Token<'de> {
        self.tokens[self.current]
    }

    fn previous(&self) -> Token<'de> {
        self.tokens[self.current.saturating_sub(1)]
    }
}
