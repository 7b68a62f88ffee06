//! An LALR(1) parser generator core.
//!
//! The pipeline turns a grammar built through [`grammar::GrammarDef`] into
//! a deterministic shift/reduce [`machine::StateMachine`]:
//!
//! 1. the grammar model is validated and frozen,
//! 2. nullable flags and FIRST sets are computed,
//! 3. the canonical LR(0) item sets and the goto function are constructed,
//! 4. LALR(1) lookaheads are propagated onto the kernel items,
//! 5. the ACTION/GOTO tables are emitted, resolving shift/reduce conflicts
//!    by precedence and reporting the rest.
//!
//! All diagnostics flow through a caller-supplied [`report::ErrorSink`];
//! the generator never aborts once the grammar is structurally valid, so a
//! single run surfaces the complete conflict set. Everything is plain data
//! keyed by dense integer indices, and the generator keeps no global state,
//! so independent grammars can be compiled concurrently.

pub mod first_sets;
pub mod grammar;
pub mod lalr;
pub mod lr0;
pub mod machine;
pub mod report;
pub mod table;

mod types;
mod util;

use crate::first_sets::FirstSets;
use crate::grammar::Grammar;
use crate::machine::StateMachine;
use crate::report::{ErrorCode, ErrorSink};

/// Derive the parse tables for a frozen grammar.
///
/// Runs the full pipeline and always produces a state machine; unresolved
/// conflicts and unused-symbol warnings are reported through `sink`.
pub fn generate(grammar: Grammar, sink: &mut dyn ErrorSink) -> StateMachine {
    let span = tracing::debug_span!("generate", grammar = %grammar.name());
    let _entered = span.enter();

    let firsts = FirstSets::new(&grammar);
    report_unused_symbols(&grammar, sink);

    let mut graph = lr0::build_states(&grammar);
    lalr::propagate_lookaheads(&grammar, &firsts, &mut graph);

    let table = table::emit_tables(&grammar, &graph, sink);
    StateMachine::new(grammar, table)
}

/// Warn about nonterminals that no derivation from the start symbol can
/// reach. Their productions stay in the output so indices never shift.
fn report_unused_symbols(g: &Grammar, sink: &mut dyn ErrorSink) {
    let reachable = g.reachable_symbols();
    for (id, symbol) in g.symbols() {
        if symbol.is_nonterminal() && id != g.accept_symbol() && !reachable.contains(&id) {
            sink.report(
                symbol.line,
                0,
                ErrorCode::UnusedSymbol,
                &format!("'{}' is unreachable from the start symbol", symbol.name),
            );
        }
    }
}
