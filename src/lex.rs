use std::fmt::Display;

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::report::Reporter;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum LexError {
    #[error("Unexpected character.")]
    #[diagnostic(help("remove or correct this character"))]
    UnexpectedCharacter {
        token: char,
        #[label("this character")]
        span: SourceSpan,
        line: usize,
    },

    #[error("Unterminated string.")]
    #[diagnostic(help("add a closing `\"` to terminate the string literal"))]
    UnterminatedString {
        #[label("string literal starts here")]
        span: SourceSpan,
        line: usize,
    },

    #[error("Unterminated comment block.")]
    #[diagnostic(help("every `/*` needs a matching `*/`, including nested ones"))]
    UnterminatedComment {
        #[label("comment block opened here")]
        span: SourceSpan,
        line: usize,
    },

    #[error("Malformed number literal.")]
    #[diagnostic(code(lox::lex::number))]
    MalformedNumber {
        #[label("this numeric literal")]
        span: SourceSpan,
        line: usize,
    },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            LexError::UnexpectedCharacter { line, .. }
            | LexError::UnterminatedString { line, .. }
            | LexError::UnterminatedComment { line, .. }
            | LexError::MalformedNumber { line, .. } => *line,
        }
    }
}

/// A constant carried by a token or a literal expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal<'de> {
    Number(f64),
    Str(&'de str),
    Bool(bool),
    Nil,
}

impl Display for Literal<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Number(n) => {
                if n.is_finite() && *n == n.trunc() {
                    write!(f, "{n}.0")
                } else {
                    write!(f, "{n}")
                }
            }
            Literal::Str(s) => write!(f, "{s}"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Nil => write!(f, "nil"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub lexeme: &'de str,
    pub literal: Option<Literal<'de>>,
    pub line: usize,
    /// Byte offset of the lexeme in the scanned source.
    pub offset: usize,
}

impl Token<'_> {
    pub fn span(&self) -> SourceSpan {
        SourceSpan::from(self.offset..self.offset + self.lexeme.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Star,
    Question,
    Colon,
    BangEqual,
    EqualEqual,
    GreaterEqual,
    LessEqual,
    Greater,
    Less,
    Slash,
    Bang,
    Equal,
    String,
    Ident,
    Number,
    And,
    Class,
    Else,
    False,
    For,
    Fun,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,
    Eof,
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.lexeme;
        match self.kind {
            TokenKind::LeftParen => write!(f, "LEFT_PAREN {lit} null"),
            TokenKind::RightParen => write!(f, "RIGHT_PAREN {lit} null"),
            TokenKind::LeftBrace => write!(f, "LEFT_BRACE {lit} null"),
            TokenKind::RightBrace => write!(f, "RIGHT_BRACE {lit} null"),
            TokenKind::Comma => write!(f, "COMMA {lit} null"),
            TokenKind::Dot => write!(f, "DOT {lit} null"),
            TokenKind::Minus => write!(f, "MINUS {lit} null"),
            TokenKind::Plus => write!(f, "PLUS {lit} null"),
            TokenKind::Semicolon => write!(f, "SEMICOLON {lit} null"),
            TokenKind::Star => write!(f, "STAR {lit} null"),
            TokenKind::Question => write!(f, "QUESTION {lit} null"),
            TokenKind::Colon => write!(f, "COLON {lit} null"),
            TokenKind::BangEqual => write!(f, "BANG_EQUAL {lit} null"),
            TokenKind::EqualEqual => write!(f, "EQUAL_EQUAL {lit} null"),
            TokenKind::GreaterEqual => write!(f, "GREATER_EQUAL {lit} null"),
            TokenKind::LessEqual => write!(f, "LESS_EQUAL {lit} null"),
            TokenKind::Greater => write!(f, "GREATER {lit} null"),
            TokenKind::Less => write!(f, "LESS {lit} null"),
            TokenKind::Slash => write!(f, "SLASH {lit} null"),
            TokenKind::Bang => write!(f, "BANG {lit} null"),
            TokenKind::Equal => write!(f, "EQUAL {lit} null"),
            TokenKind::String | TokenKind::Number => {
                let name = if self.kind == TokenKind::String {
                    "STRING"
                } else {
                    "NUMBER"
                };
                match self.literal {
                    Some(literal) => write!(f, "{name} {lit} {literal}"),
                    None => write!(f, "{name} {lit} null"),
                }
            }
            TokenKind::Ident => write!(f, "IDENTIFIER {lit} null"),
            TokenKind::And => write!(f, "AND {lit} null"),
            TokenKind::Class => write!(f, "CLASS {lit} null"),
            TokenKind::Else => write!(f, "ELSE {lit} null"),
            TokenKind::False => write!(f, "FALSE {lit} null"),
            TokenKind::For => write!(f, "FOR {lit} null"),
            TokenKind::Fun => write!(f, "FUN {lit} null"),
            TokenKind::If => write!(f, "IF {lit} null"),
            TokenKind::Nil => write!(f, "NIL {lit} null"),
            TokenKind::Or => write!(f, "OR {lit} null"),
            TokenKind::Print => write!(f, "PRINT {lit} null"),
            TokenKind::Return => write!(f, "RETURN {lit} null"),
            TokenKind::Super => write!(f, "SUPER {lit} null"),
            TokenKind::This => write!(f, "THIS {lit} null"),
            TokenKind::True => write!(f, "TRUE {lit} null"),
            TokenKind::Var => write!(f, "VAR {lit} null"),
            TokenKind::While => write!(f, "WHILE {lit} null"),
            TokenKind::Eof => write!(f, "EOF {lit} null"),
        }
    }
}

pub struct Lexer<'de> {
    whole: &'de str,
    rest: &'de str,
    byte: usize,
    line: usize,
}

impl<'de> Lexer<'de> {
    pub fn new(input: &'de str) -> Self {
        Lexer {
            whole: input,
            rest: input,
            byte: 0,
            line: 1,
        }
    }

    /// The terminal token, placed at the line the lexer has reached.
    pub fn eof(&self) -> Token<'de> {
        Token {
            kind: TokenKind::Eof,
            lexeme: "",
            literal: None,
            line: self.line,
            offset: self.whole.len(),
        }
    }

    /// Drains the lexer, handing every error to `reporter`, and terminates the
    /// sequence with [`TokenKind::Eof`].
    pub fn scan(mut self, reporter: &mut Reporter) -> Vec<Token<'de>> {
        let mut tokens = Vec::new();
        for token in self.by_ref() {
            match token {
                Ok(token) => tokens.push(token),
                Err(e) => reporter.lex_error(e),
            }
        }
        tokens.push(self.eof());
        tokens
    }

    fn skip(&mut self, bytes: usize) {
        self.rest = &self.rest[bytes..];
        self.byte += bytes;
    }

    fn block_comment(&mut self, start: usize) -> Result<(), LexError> {
        let rest = self.rest.as_bytes();
        let mut depth = 1usize;
        let mut consumed = 0;
        while depth > 0 {
            match (rest.get(consumed), rest.get(consumed + 1)) {
                (None, _) => {
                    self.skip(consumed);
                    return Err(LexError::UnterminatedComment {
                        span: SourceSpan::from(start..start + 2),
                        line: self.line,
                    });
                }
                (Some(b'/'), Some(b'*')) => {
                    depth += 1;
                    consumed += 2;
                }
                (Some(b'*'), Some(b'/')) => {
                    depth -= 1;
                    consumed += 2;
                }
                (Some(b'\n'), _) => {
                    self.line += 1;
                    consumed += 1;
                }
                _ => consumed += 1,
            }
        }
        // `consumed` ends right after an ASCII `*/`, so it sits on a char boundary.
        self.skip(consumed);
        Ok(())
    }
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Result<Token<'de>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut chars = self.rest.chars();
            let c = chars.next()?;
            let start = self.byte;
            let lexeme = &self.rest[..c.len_utf8()];
            let cur = self.rest;
            self.rest = chars.as_str();
            self.byte += c.len_utf8();

            enum Started {
                String,
                Slash,
                Ident,
                Number,
                IfEqualElse(TokenKind, TokenKind),
            }

            let line = self.line;
            let process = |kind: TokenKind| {
                Some(Ok(Token {
                    kind,
                    lexeme,
                    literal: None,
                    line,
                    offset: start,
                }))
            };

            let started = match c {
                '(' => return process(TokenKind::LeftParen),
                ')' => return process(TokenKind::RightParen),
                '{' => return process(TokenKind::LeftBrace),
                '}' => return process(TokenKind::RightBrace),
                ',' => return process(TokenKind::Comma),
                '.' => return process(TokenKind::Dot),
                '-' => return process(TokenKind::Minus),
                '+' => return process(TokenKind::Plus),
                ';' => return process(TokenKind::Semicolon),
                '*' => return process(TokenKind::Star),
                '?' => return process(TokenKind::Question),
                ':' => return process(TokenKind::Colon),
                '/' => Started::Slash,
                '!' => Started::IfEqualElse(TokenKind::BangEqual, TokenKind::Bang),
                '=' => Started::IfEqualElse(TokenKind::EqualEqual, TokenKind::Equal),
                '>' => Started::IfEqualElse(TokenKind::GreaterEqual, TokenKind::Greater),
                '<' => Started::IfEqualElse(TokenKind::LessEqual, TokenKind::Less),
                'a'..='z' | 'A'..='Z' | '_' => Started::Ident,
                '0'..='9' => Started::Number,
                '"' => Started::String,
                ' ' | '\r' | '\t' => continue,
                '\n' => {
                    self.line += 1;
                    continue;
                }
                c => {
                    return Some(Err(LexError::UnexpectedCharacter {
                        token: c,
                        span: SourceSpan::from(start..self.byte),
                        line: self.line,
                    }));
                }
            };

            match started {
                Started::String => {
                    let rest = self.rest;
                    let Some(end) = rest.find('"') else {
                        self.line += rest.matches('\n').count();
                        self.skip(rest.len());
                        return Some(Err(LexError::UnterminatedString {
                            span: SourceSpan::from(start..self.byte),
                            line: self.line,
                        }));
                    };
                    let literal = &rest[..end];
                    self.line += literal.matches('\n').count();
                    self.skip(end + 1);
                    return Some(Ok(Token {
                        kind: TokenKind::String,
                        lexeme: &cur[..end + 2],
                        literal: Some(Literal::Str(literal)),
                        line: self.line,
                        offset: start,
                    }));
                }
                Started::Slash => {
                    if self.rest.starts_with('/') {
                        let new_line = self.rest.find('\n').unwrap_or(self.rest.len());
                        self.skip(new_line);
                        continue;
                    } else if self.rest.starts_with('*') {
                        self.skip(1);
                        if let Err(e) = self.block_comment(start) {
                            return Some(Err(e));
                        }
                        continue;
                    } else {
                        return process(TokenKind::Slash);
                    }
                }
                Started::Ident => {
                    let first_non_ident = cur
                        .find(|c| !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_'))
                        .unwrap_or(cur.len());

                    let lexeme = &cur[..first_non_ident];
                    self.skip(lexeme.len() - c.len_utf8());

                    let kind = match lexeme {
                        "and" => TokenKind::And,
                        "class" => TokenKind::Class,
                        "else" => TokenKind::Else,
                        "false" => TokenKind::False,
                        "for" => TokenKind::For,
                        "fun" => TokenKind::Fun,
                        "if" => TokenKind::If,
                        "nil" => TokenKind::Nil,
                        "or" => TokenKind::Or,
                        "print" => TokenKind::Print,
                        "return" => TokenKind::Return,
                        "super" => TokenKind::Super,
                        "this" => TokenKind::This,
                        "true" => TokenKind::True,
                        "var" => TokenKind::Var,
                        "while" => TokenKind::While,
                        _ => TokenKind::Ident,
                    };

                    return Some(Ok(Token {
                        kind,
                        lexeme,
                        literal: None,
                        line: self.line,
                        offset: start,
                    }));
                }
                Started::Number => {
                    let digits = |s: &str| s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());

                    let mut len = digits(cur);
                    // The fraction only counts when a digit follows the dot.
                    if let Some(fraction) = cur[len..].strip_prefix('.') {
                        let fraction_len = digits(fraction);
                        if fraction_len > 0 {
                            len += 1 + fraction_len;
                        }
                    }

                    let lexeme = &cur[..len];
                    self.skip(len - c.len_utf8());

                    let Ok(n) = lexeme.parse::<f64>() else {
                        return Some(Err(LexError::MalformedNumber {
                            span: SourceSpan::from(start..self.byte),
                            line: self.line,
                        }));
                    };

                    return Some(Ok(Token {
                        kind: TokenKind::Number,
                        lexeme,
                        literal: Some(Literal::Number(n)),
                        line: self.line,
                        offset: start,
                    }));
                }
                Started::IfEqualElse(yes, no) => {
                    if self.rest.starts_with('=') {
                        self.skip(1);
                        return Some(Ok(Token {
                            kind: yes,
                            lexeme: &cur[..c.len_utf8() + 1],
                            literal: None,
                            line: self.line,
                            offset: start,
                        }));
                    } else {
                        return process(no);
                    }
                }
            }
        }
    }
}
