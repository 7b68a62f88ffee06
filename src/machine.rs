//! The frozen state machine handed to downstream consumers.

use crate::grammar::{Grammar, Production, ProductionID, Symbol, SymbolID};
use crate::lr0::StateID;
use crate::table::{ParseTable, Row};
use std::fmt;

/// Everything a parser runtime (and the companion lexer builder) needs:
/// the symbol and production tables, the ACTION/GOTO rows, and the
/// distinguished indices. Write-once; all views borrow.
#[derive(Debug)]
pub struct StateMachine {
    grammar: Grammar,
    table: ParseTable,
}

impl StateMachine {
    pub(crate) fn new(grammar: Grammar, table: ParseTable) -> Self {
        Self { grammar, table }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn table(&self) -> &ParseTable {
        &self.table
    }

    pub fn start_state(&self) -> StateID {
        self.table.start_state()
    }

    /// The end-of-input marker `$`.
    pub fn end_symbol(&self) -> SymbolID {
        SymbolID::END
    }

    /// The `error` pseudo terminal.
    pub fn error_symbol(&self) -> SymbolID {
        SymbolID::ERROR
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.grammar.symbols()
    }

    pub fn productions(&self) -> impl Iterator<Item = (ProductionID, &Production)> + '_ {
        self.grammar.productions()
    }

    pub fn row(&self, state: StateID) -> &Row {
        self.table.row(state)
    }

    /// The literal and regex terminals the lexer builder has to compile,
    /// with their precedence classes attached to the symbols.
    pub fn lexical_symbols(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.grammar
            .symbols()
            .filter(|(_, sym)| sym.kind.is_lexical())
    }

    /// The `%whitespace` patterns for the lexer builder.
    pub fn whitespace(&self) -> &[String] {
        self.grammar.whitespace()
    }
}

impl fmt::Display for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.grammar)?;
        write!(f, "{}", self.table.display(&self.grammar))
    }
}
