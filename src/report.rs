use miette::{Diagnostic, NamedSource, Report};

use crate::{eval::RuntimeError, lex::LexError, parse::ParseError};

/// One reported error: the classic one-line headline plus the full diagnostic.
#[derive(Debug)]
pub struct Reported {
    pub headline: String,
    pub report: Report,
}

/// Collects errors from scanning, parsing and evaluation.
///
/// The flags are only ever set by the core; clearing them is up to the driver.
#[derive(Debug)]
pub struct Reporter {
    filename: String,
    source: String,
    had_lex_error: bool,
    had_parse_error: bool,
    had_runtime_error: bool,
    reported: Vec<Reported>,
}

impl Reporter {
    pub fn new(filename: Option<&str>, source: &str) -> Self {
        Reporter {
            filename: filename.unwrap_or("<input>").to_string(),
            source: source.to_string(),
            had_lex_error: false,
            had_parse_error: false,
            had_runtime_error: false,
            reported: Vec::new(),
        }
    }

    pub fn lex_error(&mut self, error: LexError) {
        self.had_lex_error = true;
        let headline = format!("[line {}] Error: {error}", error.line());
        self.record(headline, error);
    }

    pub fn parse_error(&mut self, error: ParseError) {
        self.had_parse_error = true;
        let headline = format!("[line {}] Error{}: {error}", error.line, error.location());
        self.record(headline, error);
    }

    pub fn runtime_error(&mut self, error: RuntimeError) {
        self.had_runtime_error = true;
        let headline = format!("{error}\n[line {}]", error.line);
        self.record(headline, error);
    }

    fn record(&mut self, headline: String, error: impl Diagnostic + Send + Sync + 'static) {
        let report = Report::new(error)
            .with_source_code(NamedSource::new(&self.filename, self.source.clone()));
        self.reported.push(Reported { headline, report });
    }

    /// Set by any lexical or syntax error.
    pub fn had_error(&self) -> bool {
        self.had_lex_error || self.had_parse_error
    }

    pub fn had_lex_error(&self) -> bool {
        self.had_lex_error
    }

    pub fn had_parse_error(&self) -> bool {
        self.had_parse_error
    }

    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error
    }

    /// Clears the flags and drops everything reported so far, and points the
    /// reporter at a new source buffer.
    pub fn reset(&mut self, source: &str) {
        self.source = source.to_string();
        self.had_lex_error = false;
        self.had_parse_error = false;
        self.had_runtime_error = false;
        self.reported.clear();
    }

    pub fn headlines(&self) -> Vec<&str> {
        self.reported
            .iter()
            .map(|reported| reported.headline.as_str())
            .collect()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Reported> + '_ {
        self.reported.drain(..)
    }
}
