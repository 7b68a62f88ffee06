//! Diagnostic codes and the error sink contract.
//!
//! The generator never aborts on a reportable condition: every diagnostic is
//! forwarded to an [`ErrorSink`] supplied by the caller and generation runs
//! to completion, so the full conflict set of a grammar can be observed in a
//! single pass.

use std::fmt;

/// The kinds of diagnostics produced while compiling a grammar.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed grammar source. Mostly raised by the external grammar
    /// parser; the grammar builder raises it for invalid identifiers.
    Syntax,
    /// A literal in the grammar source was not closed before the end of the
    /// line. Raised by the external grammar parser and only relayed here.
    UnterminatedLiteral,
    /// A nonterminal was referenced but never appears as the left-hand side
    /// of a production.
    UndefinedSymbol,
    /// One lexeme was used both as a terminal and as a production left-hand
    /// side.
    SymbolKindConflict,
    /// The grammar declares no productions.
    EmptyGrammar,
    /// A shift/reduce or reduce/reduce conflict that precedence could not
    /// resolve. A default action is still installed.
    ParseTableConflict,
    /// A nonterminal is unreachable from the start symbol.
    UnusedSymbol,
}

impl ErrorCode {
    /// Warnings do not count towards the error total.
    pub fn is_warning(self) -> bool {
        matches!(self, Self::UnusedSymbol)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "SYNTAX",
            Self::UnterminatedLiteral => "UNTERMINATED_LITERAL",
            Self::UndefinedSymbol => "UNDEFINED_SYMBOL",
            Self::SymbolKindConflict => "SYMBOL_KIND_CONFLICT",
            Self::EmptyGrammar => "EMPTY_GRAMMAR",
            Self::ParseTableConflict => "PARSE_TABLE_CONFLICT",
            Self::UnusedSymbol => "UNUSED_SYMBOL",
        })
    }
}

/// Receiver for diagnostics emitted during grammar compilation.
pub trait ErrorSink {
    fn report(&mut self, line: u32, column: u32, code: ErrorCode, message: &str);
}

/// A single reported diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub code: ErrorCode,
    pub message: String,
}

impl Diagnostic {
    pub(crate) fn new(line: u32, column: u32, code: ErrorCode, message: String) -> Self {
        Self {
            line,
            column,
            code,
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {}", self.line, self.code, self.message)
    }
}

/// An [`ErrorSink`] that collects everything it receives.
#[derive(Debug, Default)]
pub struct Diagnostics {
    reports: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn reports(&self) -> &[Diagnostic] {
        &self.reports
    }

    /// The number of reported errors, warnings excluded.
    pub fn error_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|d| !d.code.is_warning())
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.reports.iter().filter(|d| d.code.is_warning()).count()
    }
}

impl ErrorSink for Diagnostics {
    fn report(&mut self, line: u32, column: u32, code: ErrorCode, message: &str) {
        self.reports
            .push(Diagnostic::new(line, column, code, message.to_owned()));
    }
}
